pub mod auth;
pub mod auth_client;
pub mod documents;
pub mod domain;
pub mod finance;
pub mod guards;
pub mod ports;
pub mod roles;
pub mod session;
pub mod testing;
pub mod uploads;

pub use auth::{AuthActions, AuthError, AuthResult};
pub use auth_client::AuthClient;
pub use domain::{
    ContactMessage, Document, DocumentCategory, Expense, Identity, NewContactMessage, NewDocument,
    NewExpense, NewProduct, NewRevenue, Product, Revenue, Role, Session,
};
pub use guards::{GuardDecision, GuardPolicy};
pub use ports::{
    AuthService, DatabaseService, IdentityProvider, Notification, Notifier, PortError, PortResult,
    StorageService,
};
pub use roles::RoleResolver;
pub use session::{SessionSnapshot, SessionState, SessionStore, SessionStoreOptions};
