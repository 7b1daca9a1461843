//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the staging area for upload
//! batches awaiting confirmation.

use crate::config::Config;
use nexus_core::ports::{DatabaseService, IdentityProvider, StorageService};
use nexus_core::roles::RoleResolver;
use nexus_core::uploads::PendingUploadBatch;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub identity: Arc<dyn IdentityProvider>,
    pub storage: Arc<dyn StorageService>,
    pub roles: RoleResolver,
    pub config: Arc<Config>,
    pub pending_uploads: Arc<PendingUploads>,
}

impl AppState {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        identity: Arc<dyn IdentityProvider>,
        storage: Arc<dyn StorageService>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            roles: RoleResolver::new(db.clone()),
            db,
            identity,
            storage,
            pending_uploads: Arc::new(PendingUploads::new(config.pending_upload_ttl)),
            config,
        }
    }
}

//=========================================================================================
// PendingUploads (Batches Between Selection and Confirmation)
//=========================================================================================

/// Upload batches that have been selected but not yet confirmed or cancelled.
/// Each batch belongs to the admin who staged it.
///
/// Batches abandoned without a cancel expire after `ttl`. Expired batches are
/// swept on every access, so they behave as if they were never staged.
pub struct PendingUploads {
    ttl: Duration,
    batches: Mutex<HashMap<Uuid, StagedBatch>>,
}

struct StagedBatch {
    owner: Uuid,
    staged_at: Instant,
    batch: PendingUploadBatch,
}

impl PendingUploads {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            batches: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, owner: Uuid, batch: PendingUploadBatch) {
        let mut batches = self.batches.lock();
        self.evict_expired(&mut batches);
        batches.insert(
            batch.id(),
            StagedBatch {
                owner,
                staged_at: Instant::now(),
                batch,
            },
        );
    }

    /// Runs `f` against a batch owned by `owner`. `None` if no such batch exists.
    pub fn with_batch<R>(
        &self,
        owner: Uuid,
        batch_id: Uuid,
        f: impl FnOnce(&mut PendingUploadBatch) -> R,
    ) -> Option<R> {
        let mut batches = self.batches.lock();
        self.evict_expired(&mut batches);
        match batches.get_mut(&batch_id) {
            Some(staged) if staged.owner == owner => Some(f(&mut staged.batch)),
            _ => None,
        }
    }

    /// Removes and returns a batch owned by `owner`.
    pub fn take(&self, owner: Uuid, batch_id: Uuid) -> Option<PendingUploadBatch> {
        let mut batches = self.batches.lock();
        self.evict_expired(&mut batches);
        match batches.get(&batch_id) {
            Some(staged) if staged.owner == owner => {
                batches.remove(&batch_id).map(|staged| staged.batch)
            }
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        let mut batches = self.batches.lock();
        self.evict_expired(&mut batches);
        batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_expired(&self, batches: &mut HashMap<Uuid, StagedBatch>) {
        let ttl = self.ttl;
        batches.retain(|batch_id, staged| {
            let expired = staged.staged_at.elapsed() >= ttl;
            if expired {
                info!(%batch_id, owner = %staged.owner, "Discarding abandoned upload batch");
            }
            !expired
        });
    }
}
