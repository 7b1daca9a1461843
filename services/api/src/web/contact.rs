//! services/api/src/web/contact.rs
//!
//! The public contact form and the admin inbox.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use nexus_core::domain::NewContactMessage;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::port_failure;
use crate::web::state::AppState;

type HandlerError = (StatusCode, String);

/// The contact form as posted by the public site.
#[derive(serde::Deserialize, ToSchema)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub subject: Option<String>,
    pub message: String,
}

impl From<ContactRequest> for NewContactMessage {
    fn from(req: ContactRequest) -> Self {
        let blank_to_none = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        NewContactMessage {
            name: req.name,
            email: req.email,
            phone: blank_to_none(req.phone),
            company: blank_to_none(req.company),
            subject: blank_to_none(req.subject),
            message: req.message,
        }
    }
}

#[utoipa::path(
    post,
    path = "/contact",
    request_body = ContactRequest,
    responses(
        (status = 201, description = "Message received"),
        (status = 400, description = "A required field is missing or invalid")
    )
)]
pub async fn submit_contact_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ContactRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let message = NewContactMessage::from(req);
    message
        .validate()
        .map_err(|reason| (StatusCode::BAD_REQUEST, reason))?;

    let stored = state
        .db
        .create_message(message)
        .await
        .map_err(|e| port_failure("Failed to store contact message", e))?;
    info!(message_id = %stored.id, "Contact message received");
    Ok((StatusCode::CREATED, Json(stored)))
}

#[utoipa::path(
    get,
    path = "/messages",
    responses((status = 200, description = "All contact messages, newest first"))
)]
pub async fn list_messages_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HandlerError> {
    let messages = state
        .db
        .list_messages()
        .await
        .map_err(|e| port_failure("Failed to list messages", e))?;
    Ok(Json(messages))
}

#[utoipa::path(
    post,
    path = "/messages/{id}/read",
    params(("id" = Uuid, Path, description = "Message id")),
    responses(
        (status = 204, description = "Message marked as read"),
        (status = 404, description = "No such message")
    )
)]
pub async fn mark_read_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, HandlerError> {
    state
        .db
        .mark_message_read(id)
        .await
        .map_err(|e| port_failure("Failed to update message", e))?;
    Ok(StatusCode::NO_CONTENT)
}
