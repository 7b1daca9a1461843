//! services/api/src/web/documents.rs
//!
//! The admin document archive: category folders, paging, deletion, and the
//! two-step upload flow (stage a batch, adjust categories, then confirm).

use axum::{
    extract::{Extension, Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bytes::Bytes;
use chrono::Utc;
use nexus_core::documents::{self, FolderPage};
use nexus_core::domain::{Document, DocumentCategory};
use nexus_core::uploads::{self, PendingFile, PendingUploadBatch, SelectedFile, UploadError, UploadMeta};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::web::middleware::CurrentUser;
use crate::web::port_failure;
use crate::web::state::AppState;

type HandlerError = (StatusCode, String);

static UNSAFE_FILE_NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9.\-_]").expect("file name pattern is valid"));

/// Replaces every character outside `[a-zA-Z0-9._-]` with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    UNSAFE_FILE_NAME_CHARS.replace_all(name, "_").into_owned()
}

/// `documents/{category}/{millis}-{nonce}-{sanitized name}`.
pub fn object_path(file: &PendingFile) -> String {
    let nonce = Uuid::new_v4().simple().to_string();
    format!(
        "documents/{}/{}-{}-{}",
        file.category,
        Utc::now().timestamp_millis(),
        &nonce[..8],
        sanitize_file_name(&file.file_name)
    )
}

fn parse_category(label: &str) -> Result<DocumentCategory, HandlerError> {
    DocumentCategory::ALL
        .into_iter()
        .find(|c| c.as_str().eq_ignore_ascii_case(label))
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Unknown category '{}'", label)))
}

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct FolderSummary {
    pub category: String,
    pub count: usize,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// 1-based; out-of-range pages are clamped.
    pub page: Option<usize>,
}

#[derive(Serialize, ToSchema)]
pub struct StagedFile {
    pub id: Uuid,
    pub file_name: String,
    pub mime_type: String,
    pub size: u64,
    pub size_label: String,
    pub category: String,
}

#[derive(Serialize, ToSchema)]
pub struct StagedBatchResponse {
    pub batch_id: Uuid,
    pub files: Vec<StagedFile>,
    /// e.g. `"Billeder: 2, Faktura: 1"`.
    pub summary: String,
}

impl StagedBatchResponse {
    fn new(batch: &PendingUploadBatch) -> Self {
        Self {
            batch_id: batch.id(),
            files: batch
                .files()
                .iter()
                .map(|f| StagedFile {
                    id: f.id,
                    file_name: f.file_name.clone(),
                    mime_type: f.mime_type.clone(),
                    size: f.data.len() as u64,
                    size_label: documents::format_file_size(f.data.len() as u64),
                    category: f.category.to_string(),
                })
                .collect(),
            summary: batch.summary_line(),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CategoryRequest {
    pub category: String,
}

#[derive(Serialize)]
pub struct ConfirmedUpload {
    pub message: String,
    pub documents: Vec<Document>,
}

//=========================================================================================
// Archive
//=========================================================================================

#[utoipa::path(
    get,
    path = "/documents",
    responses((status = 200, description = "All documents, newest first"))
)]
pub async fn list_documents_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HandlerError> {
    let documents = state
        .db
        .list_documents()
        .await
        .map_err(|e| port_failure("Failed to list documents", e))?;
    Ok(Json(documents))
}

#[utoipa::path(
    get,
    path = "/documents/folders",
    responses((status = 200, description = "Document count per category folder", body = [FolderSummary]))
)]
pub async fn folders_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<FolderSummary>>, HandlerError> {
    let all = state
        .db
        .list_documents()
        .await
        .map_err(|e| port_failure("Failed to list documents", e))?;
    let counts = documents::category_counts(&all);

    Ok(Json(
        DocumentCategory::ALL
            .into_iter()
            .map(|category| FolderSummary {
                category: category.to_string(),
                count: counts.get(&category).copied().unwrap_or(0),
            })
            .collect(),
    ))
}

#[utoipa::path(
    get,
    path = "/documents/folders/{category}",
    params(("category" = String, Path, description = "Billeder, Faktura, Kontrakt, or Andre"), PageQuery),
    responses(
        (status = 200, description = "One page of the folder"),
        (status = 404, description = "Unknown category")
    )
)]
pub async fn folder_page_handler(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<FolderPage>, HandlerError> {
    let category = parse_category(&category)?;
    let all = state
        .db
        .list_documents()
        .await
        .map_err(|e| port_failure("Failed to list documents", e))?;
    Ok(Json(documents::folder_page(&all, category, query.page.unwrap_or(1))))
}

#[utoipa::path(
    delete,
    path = "/documents/{id}",
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 204, description = "Document deleted"),
        (status = 404, description = "No such document")
    )
)]
pub async fn delete_document_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, HandlerError> {
    state
        .db
        .delete_document(id)
        .await
        .map_err(|e| port_failure("Failed to delete document", e))?;
    info!(document_id = %id, "Document deleted");
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Uploads
//=========================================================================================

/// Stage the selected files as a pending batch.
///
/// Accepts `multipart/form-data` with one or more file parts plus optional
/// `title` and `description` text parts. Title and description are only used
/// when exactly one file is uploaded.
#[utoipa::path(
    post,
    path = "/uploads",
    request_body(content_type = "multipart/form-data", description = "Files plus optional title and description."),
    responses(
        (status = 201, description = "Batch staged with suggested categories", body = StagedBatchResponse),
        (status = 400, description = "No files in the request")
    )
)]
pub async fn stage_upload_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, HandlerError> {
    let mut selected = Vec::new();
    let mut title = None;
    let mut description = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Failed to read multipart data: {}", e),
        )
    })? {
        let name = field.name().unwrap_or_default().to_string();
        if let Some(file_name) = field.file_name().map(str::to_string) {
            let mime_type = field.content_type().unwrap_or_default().to_string();
            let data: Bytes = field.bytes().await.map_err(|e| {
                (
                    StatusCode::BAD_REQUEST,
                    format!("Failed to read file bytes: {}", e),
                )
            })?;
            selected.push(SelectedFile {
                file_name,
                mime_type,
                data,
            });
            continue;
        }

        let text = field.text().await.map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("Failed to read form field: {}", e),
            )
        })?;
        match name.as_str() {
            "title" => title = Some(text),
            "description" => description = Some(text),
            _ => {}
        }
    }

    let meta = (title.is_some() || description.is_some()).then(|| UploadMeta {
        title: title.unwrap_or_default(),
        description: description.unwrap_or_default(),
    });
    let batch = PendingUploadBatch::new(selected, meta).map_err(|e| match e {
        UploadError::Empty => (StatusCode::BAD_REQUEST, "Ingen filer valgt".to_string()),
        other => (StatusCode::BAD_REQUEST, other.to_string()),
    })?;

    let response = StagedBatchResponse::new(&batch);
    info!(batch_id = %batch.id(), files = batch.files().len(), "Upload batch staged: {}", response.summary);
    state.pending_uploads.insert(user.identity.id, batch);
    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    put,
    path = "/uploads/{batch_id}/files/{file_id}",
    params(
        ("batch_id" = Uuid, Path, description = "Staged batch id"),
        ("file_id" = Uuid, Path, description = "File id within the batch")
    ),
    request_body = CategoryRequest,
    responses(
        (status = 200, description = "Category changed", body = StagedBatchResponse),
        (status = 404, description = "No such batch or file")
    )
)]
pub async fn set_file_category_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path((batch_id, file_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<CategoryRequest>,
) -> Result<Json<StagedBatchResponse>, HandlerError> {
    let category = parse_category(&req.category)?;
    state
        .pending_uploads
        .with_batch(user.identity.id, batch_id, |batch| {
            batch
                .set_category(file_id, category)
                .map(|()| StagedBatchResponse::new(batch))
        })
        .ok_or_else(|| batch_not_found(batch_id))?
        .map(Json)
        .map_err(|e| (StatusCode::NOT_FOUND, e.to_string()))
}

#[utoipa::path(
    put,
    path = "/uploads/{batch_id}/category",
    params(("batch_id" = Uuid, Path, description = "Staged batch id")),
    request_body = CategoryRequest,
    responses(
        (status = 200, description = "Category applied to every file", body = StagedBatchResponse),
        (status = 404, description = "No such batch")
    )
)]
pub async fn apply_category_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(batch_id): Path<Uuid>,
    Json(req): Json<CategoryRequest>,
) -> Result<Json<StagedBatchResponse>, HandlerError> {
    let category = parse_category(&req.category)?;
    state
        .pending_uploads
        .with_batch(user.identity.id, batch_id, |batch| {
            batch.apply_to_all(category);
            StagedBatchResponse::new(batch)
        })
        .map(Json)
        .ok_or_else(|| batch_not_found(batch_id))
}

#[utoipa::path(
    delete,
    path = "/uploads/{batch_id}",
    params(("batch_id" = Uuid, Path, description = "Staged batch id")),
    responses(
        (status = 204, description = "Batch discarded; nothing was stored"),
        (status = 404, description = "No such batch")
    )
)]
pub async fn cancel_upload_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(batch_id): Path<Uuid>,
) -> Result<StatusCode, HandlerError> {
    state
        .pending_uploads
        .take(user.identity.id, batch_id)
        .ok_or_else(|| batch_not_found(batch_id))?;
    info!(%batch_id, "Upload batch cancelled");
    Ok(StatusCode::NO_CONTENT)
}

/// Store every file of the batch and record it in the archive.
///
/// Files are processed in order and the first failure stops the batch. Files
/// stored before the failure stay stored; the batch is consumed either way.
#[utoipa::path(
    post,
    path = "/uploads/{batch_id}/confirm",
    params(("batch_id" = Uuid, Path, description = "Staged batch id")),
    responses(
        (status = 201, description = "All files uploaded"),
        (status = 404, description = "No such batch"),
        (status = 502, description = "A file failed; earlier files were kept")
    )
)]
pub async fn confirm_upload_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(batch_id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    let batch = state
        .pending_uploads
        .take(user.identity.id, batch_id)
        .ok_or_else(|| batch_not_found(batch_id))?;

    match uploads::commit_batch(
        batch,
        state.storage.as_ref(),
        state.db.as_ref(),
        user.identity.id,
        object_path,
    )
    .await
    {
        Ok(documents) => {
            let message = format!("{} fil(er) er blevet uploadet", documents.len());
            Ok((StatusCode::CREATED, Json(ConfirmedUpload { message, documents })))
        }
        Err(e) => {
            error!(%batch_id, "Upload batch failed: {}", e);
            Err((StatusCode::BAD_GATEWAY, format!("Fejl ved upload: {}", e)))
        }
    }
}

fn batch_not_found(batch_id: Uuid) -> HandlerError {
    (
        StatusCode::NOT_FOUND,
        format!("Upload batch {} not found", batch_id),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsafe_characters_become_underscores() {
        assert_eq!(sanitize_file_name("Min faktura (1).pdf"), "Min_faktura__1_.pdf");
        assert_eq!(sanitize_file_name("kontrakt-v2_final.docx"), "kontrakt-v2_final.docx");
        assert_eq!(sanitize_file_name("æøå.png"), "___.png");
    }

    #[test]
    fn object_paths_are_filed_by_category() {
        let file = PendingFile {
            id: Uuid::new_v4(),
            file_name: "scan 1.jpg".to_string(),
            mime_type: "image/jpeg".to_string(),
            data: Bytes::from_static(b"x"),
            category: DocumentCategory::Billeder,
        };
        let path = object_path(&file);
        assert!(path.starts_with("documents/Billeder/"));
        assert!(path.ends_with("-scan_1.jpg"));

        let stamp_and_nonce = path
            .trim_start_matches("documents/Billeder/")
            .trim_end_matches("-scan_1.jpg");
        let (millis, nonce) = stamp_and_nonce.split_once('-').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(nonce.len(), 8);
        assert_ne!(object_path(&file), path);
    }

    #[test]
    fn category_labels_are_case_insensitive() {
        assert_eq!(parse_category("faktura").unwrap(), DocumentCategory::Faktura);
        assert_eq!(parse_category("Unknown").unwrap_err().0, StatusCode::NOT_FOUND);
    }
}
