//! In-memory fakes of the core ports.
//!
//! Used by the unit tests in this crate and by the `nexus_api` integration tests,
//! so neither needs a network connection or a database.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::auth_client::auth_event_stream;
use crate::domain::{
    ContactMessage, Document, Expense, Identity, NewContactMessage, NewDocument, NewExpense,
    NewProduct, NewRevenue, Product, Revenue, Role, Session,
};
use crate::ports::{
    AuthEventStream, AuthService, DatabaseService, IdentityProvider, Notification, Notifier,
    PortError, PortResult, SignUpOptions, StorageService,
};

/// Builds an identity with a fresh id.
pub fn identity(email: &str) -> Identity {
    Identity {
        id: Uuid::new_v4(),
        email: Some(email.to_string()),
        full_name: None,
    }
}

/// Builds a session valid for one hour.
pub fn session_for(identity: &Identity) -> Session {
    Session {
        access_token: format!("access-{}", Uuid::new_v4()),
        refresh_token: format!("refresh-{}", Uuid::new_v4()),
        expires_at: Utc::now() + ChronoDuration::hours(1),
        identity: identity.clone(),
    }
}

//=========================================================================================
// Database
//=========================================================================================

#[derive(Default)]
struct Tables {
    admins: HashSet<Uuid>,
    products: Vec<Product>,
    expenses: Vec<Expense>,
    revenues: Vec<Revenue>,
    documents: Vec<Document>,
    messages: Vec<ContactMessage>,
}

#[derive(Default)]
pub struct InMemoryDatabase {
    tables: Mutex<Tables>,
    role_delays: Mutex<HashMap<Uuid, Duration>>,
    fail_roles: AtomicBool,
    fail_document_inserts_after: Mutex<Option<usize>>,
    role_queries: AtomicUsize,
}

impl InMemoryDatabase {
    pub fn grant_admin(&self, user_id: Uuid) {
        self.tables.lock().admins.insert(user_id);
    }

    pub fn revoke_admin(&self, user_id: Uuid) {
        self.tables.lock().admins.remove(&user_id);
    }

    /// Makes every role lookup return an error.
    pub fn fail_role_lookups(&self, fail: bool) {
        self.fail_roles.store(fail, Ordering::SeqCst);
    }

    /// Delays role lookups for one user, to reorder concurrent checks.
    pub fn delay_role_lookup(&self, user_id: Uuid, delay: Duration) {
        self.role_delays.lock().insert(user_id, delay);
    }

    /// Lets `n` document inserts succeed, then fails the rest.
    pub fn fail_document_inserts_after(&self, n: usize) {
        *self.fail_document_inserts_after.lock() = Some(n);
    }

    pub fn role_queries(&self) -> usize {
        self.role_queries.load(Ordering::SeqCst)
    }

    pub fn documents(&self) -> Vec<Document> {
        self.tables.lock().documents.clone()
    }
}

#[async_trait]
impl DatabaseService for InMemoryDatabase {
    async fn has_role(&self, user_id: Uuid, role: Role) -> PortResult<bool> {
        self.role_queries.fetch_add(1, Ordering::SeqCst);
        let delay = self.role_delays.lock().get(&user_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_roles.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable("user_roles".to_string()));
        }
        Ok(role == Role::Admin && self.tables.lock().admins.contains(&user_id))
    }

    async fn create_product(&self, product: NewProduct) -> PortResult<Product> {
        let product = Product {
            id: Uuid::new_v4(),
            name: product.name,
            price: product.price,
            description: product.description,
        };
        self.tables.lock().products.push(product.clone());
        Ok(product)
    }

    async fn list_products(&self) -> PortResult<Vec<Product>> {
        Ok(self.tables.lock().products.clone())
    }

    async fn delete_product(&self, id: Uuid) -> PortResult<()> {
        self.tables.lock().products.retain(|p| p.id != id);
        Ok(())
    }

    async fn create_expense(&self, expense: NewExpense) -> PortResult<Expense> {
        let expense = Expense {
            id: Uuid::new_v4(),
            product_id: expense.product_id,
            amount: expense.amount,
            description: expense.description,
            date: expense.date,
        };
        self.tables.lock().expenses.push(expense.clone());
        Ok(expense)
    }

    async fn list_expenses(&self, product_id: Option<Uuid>) -> PortResult<Vec<Expense>> {
        Ok(self
            .tables
            .lock()
            .expenses
            .iter()
            .filter(|e| product_id.map_or(true, |id| e.product_id == id))
            .cloned()
            .collect())
    }

    async fn delete_expense(&self, id: Uuid) -> PortResult<()> {
        self.tables.lock().expenses.retain(|e| e.id != id);
        Ok(())
    }

    async fn create_revenue(&self, revenue: NewRevenue) -> PortResult<Revenue> {
        let revenue = Revenue {
            id: Uuid::new_v4(),
            product_id: revenue.product_id,
            amount: revenue.amount,
            description: revenue.description,
            date: revenue.date,
        };
        self.tables.lock().revenues.push(revenue.clone());
        Ok(revenue)
    }

    async fn list_revenues(&self, product_id: Option<Uuid>) -> PortResult<Vec<Revenue>> {
        Ok(self
            .tables
            .lock()
            .revenues
            .iter()
            .filter(|r| product_id.map_or(true, |id| r.product_id == id))
            .cloned()
            .collect())
    }

    async fn delete_revenue(&self, id: Uuid) -> PortResult<()> {
        self.tables.lock().revenues.retain(|r| r.id != id);
        Ok(())
    }

    async fn create_document(&self, document: NewDocument) -> PortResult<Document> {
        {
            let mut remaining = self.fail_document_inserts_after.lock();
            if let Some(n) = remaining.as_mut() {
                if *n == 0 {
                    return Err(PortError::Unexpected("documents insert rejected".to_string()));
                }
                *n -= 1;
            }
        }
        let document = Document {
            id: Uuid::new_v4(),
            title: document.title,
            description: document.description,
            file_name: document.file_name,
            file_type: document.file_type,
            file_size: document.file_size,
            download_count: 0,
            is_public: document.is_public,
            created_at: Utc::now(),
            category: document.category,
            file_url: document.file_url,
            uploaded_by: Some(document.uploaded_by),
        };
        self.tables.lock().documents.push(document.clone());
        Ok(document)
    }

    async fn list_documents(&self) -> PortResult<Vec<Document>> {
        let mut docs = self.tables.lock().documents.clone();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(docs)
    }

    async fn delete_document(&self, id: Uuid) -> PortResult<()> {
        let mut tables = self.tables.lock();
        let before = tables.documents.len();
        tables.documents.retain(|d| d.id != id);
        if tables.documents.len() == before {
            return Err(PortError::NotFound(format!("Document {} not found", id)));
        }
        Ok(())
    }

    async fn create_message(&self, message: NewContactMessage) -> PortResult<ContactMessage> {
        let message = ContactMessage {
            id: Uuid::new_v4(),
            name: message.name,
            email: message.email,
            phone: message.phone,
            company: message.company,
            subject: message.subject,
            message: message.message,
            is_read: false,
            created_at: Utc::now(),
        };
        self.tables.lock().messages.push(message.clone());
        Ok(message)
    }

    async fn list_messages(&self) -> PortResult<Vec<ContactMessage>> {
        let mut messages = self.tables.lock().messages.clone();
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(messages)
    }

    async fn mark_message_read(&self, id: Uuid) -> PortResult<()> {
        let mut tables = self.tables.lock();
        match tables.messages.iter_mut().find(|m| m.id == id) {
            Some(m) => {
                m.is_read = true;
                Ok(())
            }
            None => Err(PortError::NotFound(format!("Message {} not found", id))),
        }
    }
}

//=========================================================================================
// Auth
//=========================================================================================

struct Account {
    password: String,
    identity: Identity,
}

/// A fake of the hosted auth client: a credential table, a current session,
/// and an auth-state-changed broadcast.
pub struct FakeAuth {
    accounts: Mutex<HashMap<String, Account>>,
    current: Mutex<Option<Session>>,
    events: broadcast::Sender<Option<Session>>,
    get_session_delay: Mutex<Option<Duration>>,
    sign_out_delay: Mutex<Option<Duration>>,
    fail_sign_out: AtomicBool,
    sign_out_calls: AtomicUsize,
    subscriptions: AtomicUsize,
}

impl Default for FakeAuth {
    fn default() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            accounts: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
            events,
            get_session_delay: Mutex::new(None),
            sign_out_delay: Mutex::new(None),
            fail_sign_out: AtomicBool::new(false),
            sign_out_calls: AtomicUsize::new(0),
            subscriptions: AtomicUsize::new(0),
        }
    }
}

impl FakeAuth {
    pub fn add_account(&self, email: &str, password: &str) -> Identity {
        let identity = identity(email);
        self.accounts.lock().insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                identity: identity.clone(),
            },
        );
        identity
    }

    /// Seeds an existing session, as if restored from session storage.
    pub fn restore(&self, session: Session) {
        *self.current.lock() = Some(session);
    }

    pub fn delay_get_session(&self, delay: Duration) {
        *self.get_session_delay.lock() = Some(delay);
    }

    pub fn delay_sign_out(&self, delay: Duration) {
        *self.sign_out_delay.lock() = Some(delay);
    }

    pub fn fail_sign_out(&self, fail: bool) {
        self.fail_sign_out.store(fail, Ordering::SeqCst);
    }

    /// Pushes an auth-state-changed event to every subscriber.
    pub fn emit(&self, session: Option<Session>) {
        *self.current.lock() = session.clone();
        let _ = self.events.send(session);
    }

    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }

    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    /// Live subscribers of the auth-state-changed feed.
    pub fn active_subscribers(&self) -> usize {
        self.events.receiver_count()
    }
}

#[async_trait]
impl AuthService for FakeAuth {
    async fn get_session(&self) -> PortResult<Option<Session>> {
        let delay = *self.get_session_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.current.lock().clone())
    }

    async fn sign_up(&self, email: &str, password: &str, options: SignUpOptions) -> PortResult<()> {
        let mut accounts = self.accounts.lock();
        if accounts.contains_key(email) {
            return Err(PortError::Unexpected("User already registered".to_string()));
        }
        let mut identity = identity(email);
        identity.full_name = options.full_name;
        accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                identity,
            },
        );
        Ok(())
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<Session> {
        let identity = {
            let accounts = self.accounts.lock();
            match accounts.get(email) {
                Some(account) if account.password == password => account.identity.clone(),
                _ => return Err(PortError::InvalidCredentials),
            }
        };
        let session = session_for(&identity);
        self.emit(Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> PortResult<()> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.sign_out_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable("auth".to_string()));
        }
        self.emit(None);
        Ok(())
    }

    fn subscribe(&self) -> AuthEventStream {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        auth_event_stream(self.events.subscribe())
    }
}

/// A fake identity provider with a single account per email.
#[derive(Default)]
pub struct FakeIdentityProvider {
    accounts: Mutex<HashMap<String, Account>>,
    tokens: Mutex<HashMap<String, Identity>>,
    refresh_tokens: Mutex<HashMap<String, Identity>>,
    refreshes: AtomicUsize,
    refresh_delay: Mutex<Option<Duration>>,
    revoked: Mutex<Vec<String>>,
}

impl FakeIdentityProvider {
    pub fn add_account(&self, email: &str, password: &str) -> Identity {
        let identity = identity(email);
        self.accounts.lock().insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                identity: identity.clone(),
            },
        );
        identity
    }

    /// Issues a session for `identity` that expires at the given offset from now.
    pub fn issue(&self, identity: &Identity, expires_in: ChronoDuration) -> Session {
        let mut session = session_for(identity);
        session.expires_at = Utc::now() + expires_in;
        self.tokens
            .lock()
            .insert(session.access_token.clone(), identity.clone());
        self.refresh_tokens
            .lock()
            .insert(session.refresh_token.clone(), identity.clone());
        session
    }

    /// Holds every refresh for `delay` before the token is checked.
    pub fn delay_refresh(&self, delay: Duration) {
        *self.refresh_delay.lock() = Some(delay);
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn revoked(&self) -> Vec<String> {
        self.revoked.lock().clone()
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn sign_up(&self, email: &str, password: &str, _options: SignUpOptions) -> PortResult<()> {
        self.add_account(email, password);
        Ok(())
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<Session> {
        let identity = match self.accounts.lock().get(email) {
            Some(account) if account.password == password => account.identity.clone(),
            _ => return Err(PortError::InvalidCredentials),
        };
        Ok(self.issue(&identity, ChronoDuration::hours(1)))
    }

    async fn refresh_session(&self, refresh_token: &str) -> PortResult<Session> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        let delay = *self.refresh_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let identity = self
            .refresh_tokens
            .lock()
            .remove(refresh_token)
            .ok_or(PortError::Unauthorized)?;
        Ok(self.issue(&identity, ChronoDuration::hours(1)))
    }

    async fn sign_out(&self, access_token: &str) -> PortResult<()> {
        self.tokens.lock().remove(access_token);
        self.revoked.lock().push(access_token.to_string());
        Ok(())
    }

    async fn get_user(&self, access_token: &str) -> PortResult<Identity> {
        self.tokens
            .lock()
            .get(access_token)
            .cloned()
            .ok_or(PortError::Unauthorized)
    }
}

//=========================================================================================
// Storage & Notifications
//=========================================================================================

#[derive(Default)]
pub struct InMemoryStorage {
    objects: Mutex<Vec<(String, usize)>>,
    fail_after: Mutex<Option<usize>>,
}

impl InMemoryStorage {
    /// Lets `n` uploads succeed, then fails the rest.
    pub fn fail_after(&self, n: usize) {
        *self.fail_after.lock() = Some(n);
    }

    pub fn paths(&self) -> Vec<String> {
        self.objects.lock().iter().map(|(p, _)| p.clone()).collect()
    }
}

#[async_trait]
impl StorageService for InMemoryStorage {
    async fn upload(&self, path: &str, data: Bytes, _content_type: &str) -> PortResult<()> {
        {
            let mut remaining = self.fail_after.lock();
            if let Some(n) = remaining.as_mut() {
                if *n == 0 {
                    return Err(PortError::Unexpected("storage rejected upload".to_string()));
                }
                *n -= 1;
            }
        }
        self.objects.lock().push((path.to_string(), data.len()));
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("https://storage.test/object/public/{}", path)
    }
}

/// Collects every notification for later assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn all(&self) -> Vec<Notification> {
        self.seen.lock().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.seen.lock().iter().map(|n| n.title.clone()).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.seen.lock().push(notification);
    }
}
