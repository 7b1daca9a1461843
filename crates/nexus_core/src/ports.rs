//! crates/nexus_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture: the hosted
//! backend's auth service, its tables, and its object storage all sit behind them.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use uuid::Uuid;

use crate::domain::{
    ContactMessage, Document, Expense, Identity, NewContactMessage, NewDocument, NewExpense,
    NewProduct, NewRevenue, Product, Revenue, Role, Session,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Invalid login credentials")]
    InvalidCredentials,
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// The auth-state-changed feed. Each item is the new session, or `None` after sign-out
/// or expiry. Dropping the stream unsubscribes.
pub type AuthEventStream = Pin<Box<dyn Stream<Item = Option<Session>> + Send>>;

/// Extra data sent along with a sign-up request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignUpOptions {
    /// Where the confirmation email should send the user back to.
    pub redirect_to: Option<String>,
    pub full_name: Option<String>,
}

//=========================================================================================
// Auth Ports
//=========================================================================================

/// Stateless calls against the hosted identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str, options: SignUpOptions) -> PortResult<()>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<Session>;

    async fn refresh_session(&self, refresh_token: &str) -> PortResult<Session>;

    /// Revokes every token of the session's user (global scope).
    async fn sign_out(&self, access_token: &str) -> PortResult<()>;

    /// Resolves an access token to the identity it was issued for.
    async fn get_user(&self, access_token: &str) -> PortResult<Identity>;
}

/// The client-side auth contract consumed by the session store and auth actions.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Returns the current session, if one exists. May hang on a slow backend.
    async fn get_session(&self) -> PortResult<Option<Session>>;

    async fn sign_up(&self, email: &str, password: &str, options: SignUpOptions) -> PortResult<()>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<Session>;

    async fn sign_out(&self) -> PortResult<()>;

    /// Registers for auth-state-changed notifications.
    fn subscribe(&self) -> AuthEventStream;
}

//=========================================================================================
// Data Ports
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Roles ---
    /// Existence check on `user_roles` for the given user and role.
    async fn has_role(&self, user_id: Uuid, role: Role) -> PortResult<bool>;

    // --- Finance ---
    async fn create_product(&self, product: NewProduct) -> PortResult<Product>;

    async fn list_products(&self) -> PortResult<Vec<Product>>;

    async fn delete_product(&self, id: Uuid) -> PortResult<()>;

    async fn create_expense(&self, expense: NewExpense) -> PortResult<Expense>;

    async fn list_expenses(&self, product_id: Option<Uuid>) -> PortResult<Vec<Expense>>;

    async fn delete_expense(&self, id: Uuid) -> PortResult<()>;

    async fn create_revenue(&self, revenue: NewRevenue) -> PortResult<Revenue>;

    async fn list_revenues(&self, product_id: Option<Uuid>) -> PortResult<Vec<Revenue>>;

    async fn delete_revenue(&self, id: Uuid) -> PortResult<()>;

    // --- Documents ---
    async fn create_document(&self, document: NewDocument) -> PortResult<Document>;

    /// All documents, newest first.
    async fn list_documents(&self) -> PortResult<Vec<Document>>;

    async fn delete_document(&self, id: Uuid) -> PortResult<()>;

    // --- Contact Messages ---
    async fn create_message(&self, message: NewContactMessage) -> PortResult<ContactMessage>;

    /// All messages, newest first.
    async fn list_messages(&self) -> PortResult<Vec<ContactMessage>>;

    async fn mark_message_read(&self, id: Uuid) -> PortResult<()>;
}

#[async_trait]
pub trait StorageService: Send + Sync {
    async fn upload(&self, path: &str, data: Bytes, content_type: &str) -> PortResult<()>;

    fn public_url(&self, path: &str) -> String;
}

//=========================================================================================
// Notifications
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationVariant {
    Default,
    Destructive,
}

/// A user-facing toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub variant: NotificationVariant,
}

impl Notification {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: NotificationVariant::Default,
        }
    }

    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: NotificationVariant::Destructive,
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}
