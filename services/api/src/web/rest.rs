//! services/api/src/web/rest.rs
//!
//! The master definition for the OpenAPI specification and the router that
//! mounts every REST endpoint behind its guard.

use crate::web::{auth, contact, documents, finance, middleware, state::AppState};
use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use utoipa::OpenApi;

/// Uploads may carry several files per request.
const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::admin_login_handler,
        auth::refresh_handler,
        auth::logout_handler,
        auth::session_handler,
        auth::me_handler,
        contact::submit_contact_handler,
        contact::list_messages_handler,
        contact::mark_read_handler,
        finance::list_products_handler,
        finance::create_product_handler,
        finance::delete_product_handler,
        finance::list_expenses_handler,
        finance::create_expense_handler,
        finance::delete_expense_handler,
        finance::list_revenues_handler,
        finance::create_revenue_handler,
        finance::delete_revenue_handler,
        finance::summary_handler,
        documents::list_documents_handler,
        documents::folders_handler,
        documents::folder_page_handler,
        documents::delete_document_handler,
        documents::stage_upload_handler,
        documents::set_file_category_handler,
        documents::apply_category_handler,
        documents::cancel_upload_handler,
        documents::confirm_upload_handler,
    ),
    components(
        schemas(
            auth::SignupRequest,
            auth::LoginRequest,
            auth::RefreshRequest,
            auth::MessageResponse,
            auth::AuthResponse,
            auth::SessionResponse,
            contact::ContactRequest,
            finance::CreateProductRequest,
            finance::CreateExpenseRequest,
            finance::CreateRevenueRequest,
            documents::FolderSummary,
            documents::StagedFile,
            documents::StagedBatchResponse,
            documents::CategoryRequest,
        )
    ),
    tags(
        (name = "NordStack Nexus API", description = "Back-office API for the agency site: auth, finance, documents, and contact messages.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Router
//=========================================================================================

/// Builds the API router. CORS and the Swagger UI are layered on by the binary.
pub fn router(app_state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/admin/login", post(auth::admin_login_handler))
        .route("/auth/refresh", post(auth::refresh_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/session", get(auth::session_handler))
        .route("/contact", post(contact::submit_contact_handler));

    // Signed-in routes
    let user_routes = Router::new()
        .route("/auth/me", get(auth::me_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            middleware::require_auth,
        ));

    // Admin routes (admin role required, checked per request)
    let admin_routes = Router::new()
        .route(
            "/finance/products",
            get(finance::list_products_handler).post(finance::create_product_handler),
        )
        .route("/finance/products/{id}", delete(finance::delete_product_handler))
        .route(
            "/finance/expenses",
            get(finance::list_expenses_handler).post(finance::create_expense_handler),
        )
        .route("/finance/expenses/{id}", delete(finance::delete_expense_handler))
        .route(
            "/finance/revenues",
            get(finance::list_revenues_handler).post(finance::create_revenue_handler),
        )
        .route("/finance/revenues/{id}", delete(finance::delete_revenue_handler))
        .route("/finance/summary", get(finance::summary_handler))
        .route("/documents", get(documents::list_documents_handler))
        .route("/documents/folders", get(documents::folders_handler))
        .route("/documents/folders/{category}", get(documents::folder_page_handler))
        .route("/documents/{id}", delete(documents::delete_document_handler))
        .route("/uploads", post(documents::stage_upload_handler))
        .route("/uploads/{batch_id}", delete(documents::cancel_upload_handler))
        .route("/uploads/{batch_id}/category", put(documents::apply_category_handler))
        .route(
            "/uploads/{batch_id}/files/{file_id}",
            put(documents::set_file_category_handler),
        )
        .route("/uploads/{batch_id}/confirm", post(documents::confirm_upload_handler))
        .route("/messages", get(contact::list_messages_handler))
        .route("/messages/{id}/read", post(contact::mark_read_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            middleware::require_admin,
        ));

    Router::new()
        .merge(public_routes)
        .merge(user_routes)
        .merge(admin_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(app_state)
}
