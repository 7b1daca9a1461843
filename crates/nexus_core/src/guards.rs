//! crates/nexus_core/src/guards.rs
//!
//! Route guard policies. Each one is a pure decision over the session state;
//! callers re-evaluate on every store update, so a mounted admin page reacts to
//! an identity change (and to a role revoked on the next re-check).

use futures::Stream;
use tokio::sync::watch;

use crate::session::{SessionSnapshot, SessionState};

pub const LOGIN_PATH: &str = "/auth";
pub const HOME_PATH: &str = "/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardPolicy {
    /// Login and sign-up pages.
    PublicOnly,
    Authenticated,
    AdminOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Render,
    /// Render nothing while the session is loading.
    RenderNothing,
    /// Render a loading indicator while the session is loading.
    ShowLoading,
    Redirect(&'static str),
}

pub fn evaluate(policy: GuardPolicy, state: &SessionState) -> GuardDecision {
    match policy {
        GuardPolicy::PublicOnly => {
            if state.is_loading() {
                GuardDecision::RenderNothing
            } else if state.identity().is_some() {
                GuardDecision::Redirect(HOME_PATH)
            } else {
                GuardDecision::Render
            }
        }
        GuardPolicy::Authenticated => {
            if state.is_loading() {
                GuardDecision::RenderNothing
            } else if state.identity().is_none() {
                GuardDecision::Redirect(LOGIN_PATH)
            } else {
                GuardDecision::Render
            }
        }
        GuardPolicy::AdminOnly => {
            if state.is_loading() {
                GuardDecision::ShowLoading
            } else if state.identity().is_none() {
                GuardDecision::Redirect(LOGIN_PATH)
            } else if !state.is_admin() {
                GuardDecision::Redirect(HOME_PATH)
            } else {
                GuardDecision::Render
            }
        }
    }
}

/// Emits a fresh decision every time the session store publishes, starting with
/// the current one. Consecutive duplicates are skipped.
pub fn watch_decisions(
    policy: GuardPolicy,
    rx: watch::Receiver<SessionSnapshot>,
) -> impl Stream<Item = GuardDecision> + Send {
    futures::stream::unfold((rx, None), move |(mut rx, last)| async move {
        loop {
            if last.is_some() {
                rx.changed().await.ok()?;
            }
            let decision = evaluate(policy, &rx.borrow_and_update().state);
            if last != Some(decision) {
                return Some((decision, (rx, Some(decision))));
            }
        }
    })
}
