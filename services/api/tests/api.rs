//! End-to-end tests of the HTTP surface over in-memory adapters.

use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use chrono::Duration;
use nexus_api::config::Config;
use nexus_api::web::{router, state::AppState};
use nexus_core::domain::DocumentCategory;
use nexus_core::testing::{FakeIdentityProvider, InMemoryDatabase, InMemoryStorage};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "nexus-test-boundary";

struct TestApp {
    app: Router,
    state: Arc<AppState>,
    db: Arc<InMemoryDatabase>,
    identity: Arc<FakeIdentityProvider>,
    storage: Arc<InMemoryStorage>,
}

fn test_config() -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        database_url: "postgres://unused".to_string(),
        log_level: tracing::Level::INFO,
        supabase_url: "https://backend.test".to_string(),
        supabase_anon_key: "anon".to_string(),
        supabase_service_key: None,
        storage_bucket: "documents".to_string(),
        site_url: "http://localhost:5173/".to_string(),
        cors_origin: "http://localhost:5173".to_string(),
        pending_upload_ttl: std::time::Duration::from_secs(3600),
    }
}

impl TestApp {
    fn new() -> Self {
        Self::with_config(test_config())
    }

    fn with_config(config: Config) -> Self {
        let db = Arc::new(InMemoryDatabase::default());
        let identity = Arc::new(FakeIdentityProvider::default());
        let storage = Arc::new(InMemoryStorage::default());
        let state = Arc::new(AppState::new(
            db.clone(),
            identity.clone(),
            storage.clone(),
            Arc::new(config),
        ));
        Self {
            app: router(state.clone()),
            state,
            db,
            identity,
            storage,
        }
    }

    /// Creates an account and returns a live access token for it.
    fn token_for(&self, email: &str, admin: bool) -> String {
        let identity = self.identity.add_account(email, "hemmeligt");
        if admin {
            self.db.grant_admin(identity.id);
        }
        self.identity.issue(&identity, Duration::hours(1)).access_token
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = self.app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, headers, body)
    }
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

fn send_json(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn multipart_upload(token: &str, files: &[(&str, &str)], title: Option<&str>) -> Request<Body> {
    let mut body = String::new();
    for (name, mime) in files {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\nContent-Type: {mime}\r\n\r\ncontents of {name}\r\n"
        ));
    }
    if let Some(title) = title {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\n{title}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));

    Request::post("/uploads")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

//=========================================================================================
// Guards
//=========================================================================================

#[tokio::test]
async fn admin_routes_reject_anonymous_and_non_admin_callers() {
    let app = TestApp::new();
    let user_token = app.token_for("kunde@example.dk", false);

    let (status, _, _) = app.send(get("/finance/summary", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = app.send(get("/finance/summary", Some("forged"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = app.send(get("/finance/summary", Some(&user_token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, body) = app.send(get("/auth/me", Some(&user_token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_admin"], json!(false));
}

#[tokio::test]
async fn revoked_admin_role_takes_effect_on_the_next_request() {
    let app = TestApp::new();
    let token = app.token_for("admin@nordstack.dk", true);

    let (status, _, _) = app.send(get("/messages", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);

    let (_, _, me) = app.send(get("/auth/me", Some(&token))).await;
    let user_id = me["user_id"].as_str().unwrap().parse().unwrap();
    app.db.revoke_admin(user_id);

    let (status, _, _) = app.send(get("/messages", Some(&token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn failing_role_lookup_denies_admin_access() {
    let app = TestApp::new();
    let token = app.token_for("admin@nordstack.dk", true);
    app.db.fail_role_lookups(true);

    let (status, _, _) = app.send(get("/documents", Some(&token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

//=========================================================================================
// Auth Endpoints
//=========================================================================================

#[tokio::test]
async fn admin_login_sets_a_session_cookie() {
    let app = TestApp::new();
    let identity = app.identity.add_account("admin@nordstack.dk", "hemmeligt");
    app.db.grant_admin(identity.id);

    let (status, headers, body) = app
        .send(send_json(
            "POST",
            "/auth/admin/login",
            None,
            json!({ "email": "admin@nordstack.dk", "password": "hemmeligt" }),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_admin"], json!(true));
    let cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    let token = body["access_token"].as_str().unwrap();
    assert!(cookie.starts_with(&format!("session={}", token)));

    let cookie_request = Request::get("/auth/session")
        .header(header::COOKIE, format!("session={}", token))
        .body(Body::empty())
        .unwrap();
    let (_, _, session) = app.send(cookie_request).await;
    assert_eq!(session["authenticated"], json!(true));
    assert_eq!(session["is_admin"], json!(true));
}

#[tokio::test]
async fn admin_login_without_role_is_refused_and_revoked() {
    let app = TestApp::new();
    app.identity.add_account("kunde@example.dk", "hemmeligt");

    let (status, headers, body) = app
        .send(send_json(
            "POST",
            "/auth/admin/login",
            None,
            json!({ "email": "kunde@example.dk", "password": "hemmeligt" }),
        ))
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!("Du har ikke adminrettigheder"));
    assert!(headers.get(header::SET_COOKIE).is_none());
    assert_eq!(app.identity.revoked().len(), 1);
}

#[tokio::test]
async fn admin_login_with_failing_role_check_is_refused() {
    let app = TestApp::new();
    app.identity.add_account("admin@nordstack.dk", "hemmeligt");
    app.db.fail_role_lookups(true);

    let (status, _, body) = app
        .send(send_json(
            "POST",
            "/auth/admin/login",
            None,
            json!({ "email": "admin@nordstack.dk", "password": "hemmeligt" }),
        ))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!("Fejl ved tjek af admin-rolle"));
    assert_eq!(app.identity.revoked().len(), 1);
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let app = TestApp::new();
    app.identity.add_account("kunde@example.dk", "hemmeligt");

    let (status, _, body) = app
        .send(send_json(
            "POST",
            "/auth/login",
            None,
            json!({ "email": "kunde@example.dk", "password": "forkert" }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!("Ugyldige legitimationsoplysninger"));
}

#[tokio::test]
async fn logout_revokes_the_token_and_clears_the_cookie() {
    let app = TestApp::new();
    let token = app.token_for("kunde@example.dk", false);

    let (status, headers, _) = app
        .send(send_json("POST", "/auth/logout", Some(&token), json!({})))
        .await;
    assert_eq!(status, StatusCode::OK);
    let cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cookie.contains("Max-Age=0"));

    let (status, _, _) = app.send(get("/auth/me", Some(&token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn signup_then_login() {
    let app = TestApp::new();

    let (status, _, _) = app
        .send(send_json(
            "POST",
            "/auth/signup",
            None,
            json!({ "email": "ny@example.dk", "password": "hemmeligt", "full_name": "Ny Kunde" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _, body) = app
        .send(send_json(
            "POST",
            "/auth/login",
            None,
            json!({ "email": "ny@example.dk", "password": "hemmeligt" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_admin"], json!(false));
}

//=========================================================================================
// Finance
//=========================================================================================

#[tokio::test]
async fn finance_summary_reflects_recorded_entries() {
    let app = TestApp::new();
    let token = app.token_for("admin@nordstack.dk", true);

    let (status, _, product) = app
        .send(send_json(
            "POST",
            "/finance/products",
            Some(&token),
            json!({ "name": "Website", "price": 100.0 }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let product_id = product["id"].as_str().unwrap().to_string();

    let (status, _, _) = app
        .send(send_json(
            "POST",
            "/finance/expenses",
            Some(&token),
            json!({ "product_id": product_id, "amount": 30.0, "description": "Hosting", "date": "2024-02-01" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _, created) = app
        .send(send_json(
            "POST",
            "/finance/revenues",
            Some(&token),
            json!({ "product_id": product_id, "amount": 125.0, "date": "2024-02-15", "vat_inclusive": true }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["revenue"]["amount"], json!(100.0));
    assert_eq!(created["vat_amount"], json!(25.0));

    let (status, _, summary) = app.send(get("/finance/summary", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["lifetime_revenue"], json!(100.0));
    assert_eq!(summary["lifetime_profit"], json!(70.0));
    assert_eq!(summary["total_vat_owed"], json!(25.0));
    assert_eq!(summary["per_product"][0]["margin_percent"], json!(70.0));
    assert_eq!(summary["quarterly_vat"][0]["key"], json!("2024-Q1"));
}

#[tokio::test]
async fn negative_amounts_are_rejected() {
    let app = TestApp::new();
    let token = app.token_for("admin@nordstack.dk", true);

    let (status, _, _) = app
        .send(send_json(
            "POST",
            "/finance/products",
            Some(&token),
            json!({ "name": "Logo", "price": -1.0 }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

//=========================================================================================
// Documents & Uploads
//=========================================================================================

#[tokio::test]
async fn staged_batch_can_be_recategorized_and_confirmed() {
    let app = TestApp::new();
    let token = app.token_for("admin@nordstack.dk", true);

    let (status, _, staged) = app
        .send(multipart_upload(
            &token,
            &[("faktura 7.pdf", "application/pdf"), ("logo.png", "image/png")],
            Some("ignored for multi-file batches"),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(staged["summary"], json!("Billeder: 1, Faktura: 1"));
    let batch_id = staged["batch_id"].as_str().unwrap().to_string();
    let logo_id = staged["files"][1]["id"].as_str().unwrap().to_string();

    let (status, _, updated) = app
        .send(send_json(
            "PUT",
            &format!("/uploads/{}/files/{}", batch_id, logo_id),
            Some(&token),
            json!({ "category": "Andre" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["summary"], json!("Faktura: 1, Andre: 1"));

    let (status, _, confirmed) = app
        .send(send_json(
            "POST",
            &format!("/uploads/{}/confirm", batch_id),
            Some(&token),
            json!({}),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(confirmed["documents"].as_array().unwrap().len(), 2);
    assert_eq!(confirmed["documents"][0]["title"], json!("faktura 7.pdf"));
    assert!(app.state.pending_uploads.is_empty());

    let paths = app.storage.paths();
    assert!(paths[0].starts_with("documents/Faktura/"));
    assert!(paths[0].ends_with("-faktura_7.pdf"));
    assert!(paths[1].starts_with("documents/Andre/"));

    let (_, _, folders) = app.send(get("/documents/folders", Some(&token))).await;
    let faktura = folders
        .as_array()
        .unwrap()
        .iter()
        .find(|f| f["category"] == json!("Faktura"))
        .unwrap();
    assert_eq!(faktura["count"], json!(1));
}

#[tokio::test]
async fn cancelled_batch_stores_nothing() {
    let app = TestApp::new();
    let token = app.token_for("admin@nordstack.dk", true);

    let (_, _, staged) = app
        .send(multipart_upload(&token, &[("kontrakt.docx", "application/msword")], None))
        .await;
    assert_eq!(staged["files"][0]["category"], json!("Kontrakt"));
    let batch_id = staged["batch_id"].as_str().unwrap().to_string();

    let cancel = Request::delete(format!("/uploads/{}", batch_id))
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = app.send(cancel).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, _) = app
        .send(send_json(
            "POST",
            &format!("/uploads/{}/confirm", batch_id),
            Some(&token),
            json!({}),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(app.storage.paths().is_empty());
    assert!(app.db.documents().is_empty());
}

#[tokio::test]
async fn single_file_batch_uses_form_title() {
    let app = TestApp::new();
    let token = app.token_for("admin@nordstack.dk", true);

    let (_, _, staged) = app
        .send(multipart_upload(&token, &[("scan.pdf", "application/pdf")], Some("Rammeaftale")))
        .await;
    let batch_id = staged["batch_id"].as_str().unwrap().to_string();

    let (status, _, confirmed) = app
        .send(send_json(
            "POST",
            &format!("/uploads/{}/confirm", batch_id),
            Some(&token),
            json!({}),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(confirmed["documents"][0]["title"], json!("Rammeaftale"));
    assert_eq!(app.db.documents()[0].category, DocumentCategory::Faktura);
}

#[tokio::test]
async fn abandoned_batch_expires() {
    let app = TestApp::with_config(Config {
        pending_upload_ttl: std::time::Duration::from_millis(20),
        ..test_config()
    });
    let token = app.token_for("admin@nordstack.dk", true);

    let (status, _, staged) = app
        .send(multipart_upload(&token, &[("logo.png", "image/png")], None))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let batch_id = staged["batch_id"].as_str().unwrap().to_string();

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let (status, _, _) = app
        .send(send_json(
            "POST",
            &format!("/uploads/{}/confirm", batch_id),
            Some(&token),
            json!({}),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(app.state.pending_uploads.is_empty());
    assert!(app.storage.paths().is_empty());
}

#[tokio::test]
async fn batches_are_private_to_the_admin_who_staged_them() {
    let app = TestApp::new();
    let first = app.token_for("admin@nordstack.dk", true);
    let second = app.token_for("partner@nordstack.dk", true);

    let (_, _, staged) = app
        .send(multipart_upload(&first, &[("a.txt", "text/plain")], None))
        .await;
    let batch_id = staged["batch_id"].as_str().unwrap().to_string();

    let (status, _, _) = app
        .send(send_json(
            "POST",
            &format!("/uploads/{}/confirm", batch_id),
            Some(&second),
            json!({}),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(app.state.pending_uploads.len(), 1);
}

#[tokio::test]
async fn failed_upload_keeps_earlier_files() {
    let app = TestApp::new();
    let token = app.token_for("admin@nordstack.dk", true);
    app.storage.fail_after(1);

    let (_, _, staged) = app
        .send(multipart_upload(
            &token,
            &[("one.jpg", "image/jpeg"), ("two.jpg", "image/jpeg")],
            None,
        ))
        .await;
    let batch_id = staged["batch_id"].as_str().unwrap().to_string();

    let (status, _, _) = app
        .send(send_json(
            "POST",
            &format!("/uploads/{}/confirm", batch_id),
            Some(&token),
            json!({}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(app.db.documents().len(), 1);
}

#[tokio::test]
async fn unknown_folder_is_not_found() {
    let app = TestApp::new();
    let token = app.token_for("admin@nordstack.dk", true);

    let (status, _, _) = app.send(get("/documents/folders/Receipts", Some(&token))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, page) = app
        .send(get("/documents/folders/faktura?page=4", Some(&token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["page"], json!(1));
    assert_eq!(page["total_pages"], json!(1));
}

//=========================================================================================
// Contact Messages
//=========================================================================================

#[tokio::test]
async fn contact_form_is_validated_and_reaches_the_inbox() {
    let app = TestApp::new();
    let token = app.token_for("admin@nordstack.dk", true);

    let (status, _, body) = app
        .send(send_json(
            "POST",
            "/contact",
            None,
            json!({ "name": "", "email": "a@b.dk", "message": "Hej" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!("Navn mangler"));

    let (status, _, stored) = app
        .send(send_json(
            "POST",
            "/contact",
            None,
            json!({ "name": "Mette", "email": "mette@firma.dk", "company": "", "message": "Vi vil gerne have en ny hjemmeside" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(stored["company"], Value::Null);
    let id = stored["id"].as_str().unwrap().to_string();

    let (status, _, _) = app
        .send(send_json("POST", &format!("/messages/{}/read", id), Some(&token), json!({})))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, _, inbox) = app.send(get("/messages", Some(&token))).await;
    assert_eq!(inbox[0]["is_read"], json!(true));
}
