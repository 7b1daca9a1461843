//! crates/nexus_core/src/roles.rs
//!
//! Answers "does this identity hold the `admin` role" with a single round-trip
//! against the `user_roles` table.

use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::Role;
use crate::ports::{DatabaseService, PortResult};

#[derive(Clone)]
pub struct RoleResolver {
    db: Arc<dyn DatabaseService>,
}

impl RoleResolver {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self { db }
    }

    /// Returns `true` only when an `admin` row exists for `user_id`.
    ///
    /// Lookup errors are logged and reported as `false`.
    pub async fn is_admin(&self, user_id: Uuid) -> bool {
        match self.db.has_role(user_id, Role::Admin).await {
            Ok(is_admin) => {
                debug!(%user_id, is_admin, "Role check completed");
                is_admin
            }
            Err(e) => {
                warn!(%user_id, "Role check failed, treating as non-admin: {}", e);
                false
            }
        }
    }

    /// Like [`RoleResolver::is_admin`], but surfaces lookup errors so the admin
    /// login path can tell "not an admin" apart from "could not check".
    pub async fn check_admin(&self, user_id: Uuid) -> PortResult<bool> {
        self.db.has_role(user_id, Role::Admin).await
    }
}
