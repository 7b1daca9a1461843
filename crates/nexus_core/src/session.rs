//! crates/nexus_core/src/session.rs
//!
//! The session store: the single source of truth for who is logged in and
//! whether they are an admin.
//!
//! State moves `Uninitialized -> Loading -> {Authenticated | Anonymous}` during
//! startup. After that, auth-state-changed events move directly between settled
//! states without passing through `Loading` again.
//!
//! Two mechanisms keep late results from clobbering newer state:
//! - a [`CancellationToken`] that `teardown` cancels; nothing mutates the store afterwards.
//! - an identity epoch bumped on every identity change; role checks and the startup
//!   fetch only publish if the epoch they started under is still current.

use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{Identity, Session};
use crate::ports::{AuthService, PortResult};
use crate::roles::RoleResolver;

/// How long startup waits for the existing session before rendering as anonymous.
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_millis(300);

//=========================================================================================
// Public State Types
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Loading,
    Authenticated { identity: Identity, is_admin: bool },
    Anonymous,
}

impl SessionState {
    pub fn is_loading(&self) -> bool {
        matches!(self, SessionState::Uninitialized | SessionState::Loading)
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionState::Authenticated { identity, .. } => Some(identity),
            _ => None,
        }
    }

    /// Always `false` without an identity.
    pub fn is_admin(&self) -> bool {
        matches!(self, SessionState::Authenticated { is_admin: true, .. })
    }
}

/// What the surrounding UI observes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub signing_out: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionStoreOptions {
    pub init_timeout: Duration,
}

impl Default for SessionStoreOptions {
    fn default() -> Self {
        Self {
            init_timeout: DEFAULT_INIT_TIMEOUT,
        }
    }
}

//=========================================================================================
// SessionStore
//=========================================================================================

/// Cheap to clone; every clone shares the same state.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

struct Inner {
    auth: Arc<dyn AuthService>,
    roles: RoleResolver,
    options: SessionStoreOptions,
    tx: watch::Sender<SessionSnapshot>,
    /// Guards the live session together with epoch checks and publishing.
    session: Mutex<Option<Session>>,
    epoch: AtomicU64,
    alive: CancellationToken,
    started: AtomicBool,
}

impl SessionStore {
    pub fn new(
        auth: Arc<dyn AuthService>,
        roles: RoleResolver,
        options: SessionStoreOptions,
    ) -> Self {
        let (tx, _) = watch::channel(SessionSnapshot {
            state: SessionState::Uninitialized,
            signing_out: false,
        });
        Self {
            inner: Arc::new(Inner {
                auth,
                roles,
                options,
                tx,
                session: Mutex::new(None),
                epoch: AtomicU64::new(0),
                alive: CancellationToken::new(),
                started: AtomicBool::new(false),
            }),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.tx.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        self.inner.tx.borrow().state.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.tx.subscribe()
    }

    /// The live session, including its tokens.
    pub fn current_session(&self) -> Option<Session> {
        self.inner.session.lock().clone()
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.alive.is_cancelled()
    }

    pub(crate) fn auth(&self) -> Arc<dyn AuthService> {
        self.inner.auth.clone()
    }

    pub(crate) fn roles(&self) -> &RoleResolver {
        &self.inner.roles
    }

    /// Subscribes to auth-state-changed events and resolves the existing session.
    ///
    /// Returns once the store has settled or the startup timeout elapsed, whichever
    /// comes first. The timeout covers both the session fetch and the role check
    /// for a restored session. A session that arrives late still updates the store
    /// unless a newer auth event superseded it, and a role check that outlives the
    /// timeout leaves the restored identity as non-admin until it completes.
    /// Calling this twice is a no-op.
    pub async fn initialize(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            warn!("Session store already initialized");
            return;
        }
        self.publish_state(SessionState::Loading);

        // Subscribe before fetching so no event between the two is lost.
        self.spawn_listener();

        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        let timeout = self.inner.options.init_timeout;
        let deadline = tokio::time::Instant::now() + timeout;
        let (result_tx, mut result_rx) = oneshot::channel::<PortResult<Option<Session>>>();
        let auth = self.inner.auth.clone();
        tokio::spawn(async move {
            let _ = result_tx.send(auth.get_session().await);
        });

        let raced = tokio::select! {
            _ = self.inner.alive.cancelled() => return,
            raced = tokio::time::timeout_at(deadline, &mut result_rx) => raced,
        };

        let session = match raced {
            Ok(Ok(result)) => startup_session(result),
            Ok(Err(_)) => {
                warn!("Session fetch task ended without a result");
                None
            }
            Err(_) => {
                warn!(
                    "Session fetch exceeded {:?}, rendering as anonymous until it arrives",
                    timeout
                );
                self.publish_if_current(epoch, SessionState::Anonymous);

                let store = self.clone();
                tokio::spawn(async move {
                    if let Ok(result) = result_rx.await {
                        debug!("Late session fetch completed");
                        store.settle_startup(epoch, result).await;
                    }
                });
                return;
            }
        };

        let Some(session) = session else {
            self.publish_if_current(epoch, SessionState::Anonymous);
            return;
        };

        let user_id = session.identity.id;
        let (role_tx, mut role_rx) = oneshot::channel::<bool>();
        let roles = self.inner.roles.clone();
        tokio::spawn(async move {
            let _ = role_tx.send(roles.is_admin(user_id).await);
        });

        let raced = tokio::select! {
            _ = self.inner.alive.cancelled() => return,
            raced = tokio::time::timeout_at(deadline, &mut role_rx) => raced,
        };

        match raced {
            Ok(Ok(is_admin)) => self.restore_session(epoch, session, is_admin),
            Ok(Err(_)) => {
                warn!(%user_id, "Role check task ended without a result");
                self.restore_session(epoch, session, false);
            }
            Err(_) => {
                warn!(
                    %user_id,
                    "Role check exceeded the startup timeout, continuing as non-admin until it completes"
                );
                self.restore_session(epoch, session, false);

                let store = self.clone();
                tokio::spawn(async move {
                    if let Ok(is_admin) = role_rx.await {
                        store.apply_role(epoch, user_id, is_admin);
                    }
                });
            }
        }
    }

    /// Applies an auth-state-changed event.
    ///
    /// Never re-enters `Loading` once settled. A new identity starts as non-admin
    /// until the role round-trip confirms; the same identity (token refresh) keeps
    /// its cached flag while it is re-verified in the background.
    pub fn on_change(&self, session: Option<Session>) {
        if self.is_torn_down() {
            return;
        }
        let mut live = self.inner.session.lock();
        let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        let Some(session) = session else {
            debug!("Auth state changed: signed out");
            *live = None;
            self.publish_state(SessionState::Anonymous);
            return;
        };

        let identity = session.identity.clone();
        let user_id = identity.id;
        let current = self.state();
        *live = Some(session);

        match current {
            // Startup has not settled yet; the role check below settles it.
            SessionState::Uninitialized | SessionState::Loading => {}
            SessionState::Authenticated {
                identity: previous,
                is_admin,
            } if previous.id == user_id => {
                self.publish_state(SessionState::Authenticated { identity, is_admin });
            }
            _ => {
                info!(%user_id, "Auth state changed: new identity");
                self.publish_state(SessionState::Authenticated {
                    identity,
                    is_admin: false,
                });
            }
        }
        drop(live);

        self.spawn_role_check(epoch, user_id);
    }

    /// Stops listening for auth events and freezes the store. Idempotent.
    pub fn teardown(&self) {
        if !self.inner.alive.is_cancelled() {
            debug!("Tearing down session store");
            self.inner.alive.cancel();
        }
    }

    //=====================================================================================
    // Mutations used by the auth actions
    //=====================================================================================

    /// Installs a session whose admin status was already confirmed.
    pub(crate) fn set_authenticated(&self, session: Session, is_admin: bool) {
        if self.is_torn_down() {
            return;
        }
        let mut live = self.inner.session.lock();
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        let identity = session.identity.clone();
        *live = Some(session);
        self.publish_state(SessionState::Authenticated { identity, is_admin });
    }

    /// Forgets the identity unconditionally.
    pub(crate) fn clear(&self) {
        if self.is_torn_down() {
            return;
        }
        let mut live = self.inner.session.lock();
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        *live = None;
        self.publish_state(SessionState::Anonymous);
    }

    pub(crate) fn set_signing_out(&self, signing_out: bool) {
        self.inner.tx.send_if_modified(|snapshot| {
            if snapshot.signing_out == signing_out {
                return false;
            }
            snapshot.signing_out = signing_out;
            true
        });
    }

    //=====================================================================================
    // Internals
    //=====================================================================================

    fn spawn_listener(&self) {
        let mut events = self.inner.auth.subscribe();
        let store = self.clone();
        let alive = self.inner.alive.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = alive.cancelled() => break,
                    event = events.next() => match event {
                        Some(session) => store.on_change(session),
                        None => break,
                    },
                }
            }
            // Dropping the stream here is the one and only unsubscribe.
            drop(events);
            debug!("Auth subscription closed");
        });
    }

    fn spawn_role_check(&self, epoch: u64, user_id: Uuid) {
        let store = self.clone();
        tokio::spawn(async move {
            let is_admin = tokio::select! {
                _ = store.inner.alive.cancelled() => return,
                is_admin = store.inner.roles.is_admin(user_id) => is_admin,
            };
            store.apply_role(epoch, user_id, is_admin);
        });
    }

    /// Publishes a role check result if no identity change happened since `epoch`.
    fn apply_role(&self, epoch: u64, user_id: Uuid, is_admin: bool) {
        let live = self.inner.session.lock();
        if self.inner.epoch.load(Ordering::SeqCst) != epoch || self.is_torn_down() {
            debug!(%user_id, "Discarding stale role check");
            return;
        }
        if let Some(session) = live.as_ref() {
            self.publish_state(SessionState::Authenticated {
                identity: session.identity.clone(),
                is_admin,
            });
        }
    }

    /// Applies a late startup session fetch, unless an auth event superseded it.
    async fn settle_startup(&self, epoch: u64, result: PortResult<Option<Session>>) {
        let Some(session) = startup_session(result) else {
            self.publish_if_current(epoch, SessionState::Anonymous);
            return;
        };

        let is_admin = tokio::select! {
            _ = self.inner.alive.cancelled() => return,
            is_admin = self.inner.roles.is_admin(session.identity.id) => is_admin,
        };
        self.restore_session(epoch, session, is_admin);
    }

    /// Installs the session found at startup. Leaves the epoch alone so a role
    /// check started for it can still publish.
    fn restore_session(&self, epoch: u64, session: Session, is_admin: bool) {
        let user_id = session.identity.id;
        let mut live = self.inner.session.lock();
        if self.inner.epoch.load(Ordering::SeqCst) != epoch || self.is_torn_down() {
            debug!(%user_id, "Discarding superseded startup session");
            return;
        }
        let identity = session.identity.clone();
        *live = Some(session);
        info!(%user_id, is_admin, "Restored existing session");
        self.publish_state(SessionState::Authenticated { identity, is_admin });
    }

    fn publish_if_current(&self, epoch: u64, state: SessionState) {
        let mut live = self.inner.session.lock();
        if self.inner.epoch.load(Ordering::SeqCst) != epoch || self.is_torn_down() {
            return;
        }
        if matches!(state, SessionState::Anonymous) {
            *live = None;
        }
        self.publish_state(state);
    }

    fn publish_state(&self, state: SessionState) {
        if self.is_torn_down() {
            return;
        }
        self.inner.tx.send_if_modified(|snapshot| {
            if snapshot.state == state {
                return false;
            }
            snapshot.state = state;
            true
        });
    }
}

fn startup_session(result: PortResult<Option<Session>>) -> Option<Session> {
    match result {
        Ok(session) => session,
        Err(e) => {
            warn!("Failed to fetch existing session, continuing as anonymous: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{session_for, FakeAuth, InMemoryDatabase};

    fn store_with(
        auth: Arc<FakeAuth>,
        db: Arc<InMemoryDatabase>,
        init_timeout: Duration,
    ) -> SessionStore {
        SessionStore::new(
            auth,
            RoleResolver::new(db),
            SessionStoreOptions { init_timeout },
        )
    }

    async fn wait_for(store: &SessionStore, pred: impl Fn(&SessionState) -> bool) -> SessionState {
        let mut rx = store.subscribe();
        let snapshot = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| pred(&s.state)))
            .await
            .expect("timed out waiting for session state")
            .expect("store dropped");
        snapshot.state.clone()
    }

    #[tokio::test]
    async fn starts_uninitialized_and_settles_anonymous_without_session() {
        let store = store_with(
            Arc::new(FakeAuth::default()),
            Arc::new(InMemoryDatabase::default()),
            DEFAULT_INIT_TIMEOUT,
        );
        assert_eq!(store.state(), SessionState::Uninitialized);
        assert!(store.state().is_loading());

        store.initialize().await;
        assert_eq!(store.state(), SessionState::Anonymous);
        store.teardown();
    }

    #[tokio::test]
    async fn restores_existing_admin_session() {
        let auth = Arc::new(FakeAuth::default());
        let db = Arc::new(InMemoryDatabase::default());
        let identity = auth.add_account("admin@nordstack.dk", "pw");
        db.grant_admin(identity.id);
        auth.restore(session_for(&identity));

        let store = store_with(auth, db, DEFAULT_INIT_TIMEOUT);
        store.initialize().await;

        assert_eq!(
            store.state(),
            SessionState::Authenticated {
                identity,
                is_admin: true
            }
        );
        store.teardown();
    }

    #[tokio::test]
    async fn slow_session_fetch_falls_back_to_anonymous_then_self_corrects() {
        let auth = Arc::new(FakeAuth::default());
        let identity = auth.add_account("kunde@example.dk", "pw");
        auth.restore(session_for(&identity));
        auth.delay_get_session(Duration::from_millis(150));

        let store = store_with(auth, Arc::new(InMemoryDatabase::default()), Duration::from_millis(20));
        store.initialize().await;
        assert_eq!(store.state(), SessionState::Anonymous);

        let settled = wait_for(&store, |s| s.identity().is_some()).await;
        assert_eq!(settled.identity(), Some(&identity));
        store.teardown();
    }

    #[tokio::test]
    async fn slow_role_check_does_not_hold_up_startup() {
        let auth = Arc::new(FakeAuth::default());
        let db = Arc::new(InMemoryDatabase::default());
        let identity = auth.add_account("admin@nordstack.dk", "pw");
        db.grant_admin(identity.id);
        db.delay_role_lookup(identity.id, Duration::from_millis(200));
        auth.restore(session_for(&identity));

        let store = store_with(auth, db, Duration::from_millis(20));
        tokio::time::timeout(Duration::from_secs(1), store.initialize())
            .await
            .expect("initialize must return within the startup timeout");
        assert_eq!(
            store.state(),
            SessionState::Authenticated {
                identity: identity.clone(),
                is_admin: false
            }
        );

        let state = wait_for(&store, |s| s.is_admin()).await;
        assert_eq!(state.identity(), Some(&identity));
        store.teardown();
    }

    #[tokio::test]
    async fn late_role_result_loses_to_newer_event() {
        let auth = Arc::new(FakeAuth::default());
        let db = Arc::new(InMemoryDatabase::default());
        let admin = auth.add_account("admin@nordstack.dk", "pw");
        let visitor = auth.add_account("visitor@example.dk", "pw");
        db.grant_admin(admin.id);
        db.delay_role_lookup(admin.id, Duration::from_millis(100));
        auth.restore(session_for(&admin));

        let store = store_with(auth, db, Duration::from_millis(20));
        store.initialize().await;
        store.on_change(Some(session_for(&visitor)));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(
            store.state(),
            SessionState::Authenticated {
                identity: visitor,
                is_admin: false
            }
        );
        store.teardown();
    }

    #[tokio::test]
    async fn late_startup_session_loses_to_newer_event() {
        let auth = Arc::new(FakeAuth::default());
        let stale = auth.add_account("old@example.dk", "pw");
        let fresh = auth.add_account("new@example.dk", "pw");
        auth.restore(session_for(&stale));
        auth.delay_get_session(Duration::from_millis(100));

        let store = store_with(auth.clone(), Arc::new(InMemoryDatabase::default()), Duration::from_millis(10));
        store.initialize().await;

        store.on_change(Some(session_for(&fresh)));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(store.state().identity(), Some(&fresh));
        store.teardown();
    }

    #[tokio::test]
    async fn on_change_never_reenters_loading() {
        let auth = Arc::new(FakeAuth::default());
        let db = Arc::new(InMemoryDatabase::default());
        let identity = auth.add_account("a@example.dk", "pw");
        let store = store_with(auth, db, DEFAULT_INIT_TIMEOUT);
        store.initialize().await;

        let mut rx = store.subscribe();
        store.on_change(Some(session_for(&identity)));
        store.on_change(None);

        let mut seen = vec![rx.borrow_and_update().state.clone()];
        while let Ok(Ok(())) = tokio::time::timeout(Duration::from_millis(50), rx.changed()).await {
            seen.push(rx.borrow_and_update().state.clone());
        }
        assert!(seen.iter().all(|s| !s.is_loading()), "saw {:?}", seen);
        assert_eq!(store.state(), SessionState::Anonymous);
        store.teardown();
    }

    #[tokio::test]
    async fn subscription_event_resolves_admin_in_background() {
        let auth = Arc::new(FakeAuth::default());
        let db = Arc::new(InMemoryDatabase::default());
        let identity = auth.add_account("admin@nordstack.dk", "pw");
        db.grant_admin(identity.id);

        let store = store_with(auth.clone(), db, DEFAULT_INIT_TIMEOUT);
        store.initialize().await;

        auth.emit(Some(session_for(&identity)));
        let state = wait_for(&store, |s| s.is_admin()).await;
        assert_eq!(state.identity(), Some(&identity));
        store.teardown();
    }

    #[tokio::test]
    async fn stale_role_result_is_discarded() {
        let auth = Arc::new(FakeAuth::default());
        let db = Arc::new(InMemoryDatabase::default());
        let admin = auth.add_account("admin@nordstack.dk", "pw");
        let visitor = auth.add_account("visitor@example.dk", "pw");
        db.grant_admin(admin.id);
        db.delay_role_lookup(admin.id, Duration::from_millis(80));

        let store = store_with(auth, db, DEFAULT_INIT_TIMEOUT);
        store.initialize().await;

        store.on_change(Some(session_for(&admin)));
        store.on_change(Some(session_for(&visitor)));
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(
            store.state(),
            SessionState::Authenticated {
                identity: visitor,
                is_admin: false
            }
        );
        store.teardown();
    }

    #[tokio::test]
    async fn revoked_role_is_picked_up_on_next_identity_event() {
        let auth = Arc::new(FakeAuth::default());
        let db = Arc::new(InMemoryDatabase::default());
        let admin = auth.add_account("admin@nordstack.dk", "pw");
        db.grant_admin(admin.id);
        auth.restore(session_for(&admin));

        let store = store_with(auth.clone(), db.clone(), DEFAULT_INIT_TIMEOUT);
        store.initialize().await;
        assert!(store.state().is_admin());

        db.revoke_admin(admin.id);
        auth.emit(Some(session_for(&admin)));
        let state = wait_for(&store, |s| !s.is_admin()).await;
        assert_eq!(state.identity(), Some(&admin));
        store.teardown();
    }

    #[tokio::test]
    async fn teardown_unsubscribes_once_and_freezes_state() {
        let auth = Arc::new(FakeAuth::default());
        let identity = auth.add_account("a@example.dk", "pw");
        let store = store_with(auth.clone(), Arc::new(InMemoryDatabase::default()), DEFAULT_INIT_TIMEOUT);
        store.initialize().await;
        assert_eq!(auth.subscriptions(), 1);
        assert_eq!(auth.active_subscribers(), 1);

        store.teardown();
        store.teardown();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(auth.active_subscribers(), 0);

        store.on_change(Some(session_for(&identity)));
        assert_eq!(store.state(), SessionState::Anonymous);
    }

    #[tokio::test]
    async fn second_initialize_is_ignored() {
        let auth = Arc::new(FakeAuth::default());
        let store = store_with(auth.clone(), Arc::new(InMemoryDatabase::default()), DEFAULT_INIT_TIMEOUT);
        store.initialize().await;
        store.initialize().await;
        assert_eq!(auth.subscriptions(), 1);
        store.teardown();
    }
}
