//! Session Registry Listener
//!
//! Subscribes to real-time updates of the user's profile/session record
//! and runs the invalidation/removal detection algorithm. The removal
//! check is suppressed for a grace period after login to absorb
//! registration propagation delay; the invalidation check never is.

use super::logout::LogoutDispatcher;
use super::store::LocalSessionStore;
use super::types::{ForcedLogoutPayload, UserDocument};
use crate::auth::{user_document_path, DocumentEvent, DocumentStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Timed suppression window for the removal check.
///
/// Registration and the remote write it causes are not guaranteed to have
/// propagated to the listener by the time it next fires; during the grace
/// window a missing registry entry is staleness, not revocation.
#[derive(Debug, Clone, Copy)]
pub struct GracePeriod {
    deadline: Instant,
}

impl GracePeriod {
    /// Start a grace window of the given length from now
    pub fn start(duration: Duration) -> Self {
        Self {
            deadline: Instant::now() + duration,
        }
    }

    /// Whether the window has passed
    pub fn elapsed(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Handle for one listener attachment.
///
/// Detaching flips the active token and aborts the task, so snapshots
/// already buffered in the subscription are never processed afterwards.
pub struct ListenerHandle {
    active: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Detach immediately; no further callbacks run after this returns
    pub fn detach(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.task.abort();
        debug!("Registry listener detached");
    }

    /// Whether this attachment is still live
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        self.task.abort();
    }
}

/// Real-time listener over the per-user session registry
pub struct RegistryListener;

impl RegistryListener {
    /// Attach to the user's record and start evaluating snapshots
    pub fn attach(
        store: Arc<dyn DocumentStore>,
        local: Arc<LocalSessionStore>,
        dispatcher: Arc<LogoutDispatcher>,
        user_id: &str,
        grace: GracePeriod,
    ) -> ListenerHandle {
        let path = user_document_path(user_id);
        let mut receiver = store.subscribe(&path);
        let active = Arc::new(AtomicBool::new(true));
        let token = active.clone();

        info!(user_id, "Attaching session registry listener");

        let task = tokio::spawn(async move {
            loop {
                let event = match receiver.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        // Skipped snapshots are fine, the next one carries
                        // the full record
                        debug!(skipped, "Registry listener lagged behind snapshots");
                        continue;
                    }
                    Err(RecvError::Closed) => {
                        debug!("Registry subscription closed");
                        break;
                    }
                };

                if !token.load(Ordering::SeqCst) {
                    break;
                }

                match event {
                    DocumentEvent::Snapshot(value) => {
                        Self::evaluate_snapshot(value, &local, &dispatcher, &grace).await;
                    }
                    DocumentEvent::PermissionDenied => {
                        // Mid-logout access revocation; detach quietly
                        debug!("Registry access revoked, detaching listener");
                        token.store(false, Ordering::SeqCst);
                        break;
                    }
                }
            }
        });

        ListenerHandle { active, task }
    }

    /// Run the detection algorithm for one snapshot
    async fn evaluate_snapshot(
        value: serde_json::Value,
        local: &LocalSessionStore,
        dispatcher: &LogoutDispatcher,
        grace: &GracePeriod,
    ) {
        let document: UserDocument = match serde_json::from_value(value) {
            Ok(document) => document,
            Err(e) => {
                warn!(error = %e, "Skipping unparseable registry snapshot");
                return;
            }
        };

        let record = match local.load_record() {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Could not read local session record, skipping snapshot");
                return;
            }
        };

        // Invalidation is honored immediately, inside or outside the
        // grace window
        if document.invalidates(record.issued_at) {
            info!(
                session_id = %record.session_id,
                "Session revoked by invalidation marker"
            );
            dispatcher.force_logout(ForcedLogoutPayload::invalidated()).await;
            return;
        }

        if grace.elapsed() && !document.contains_session(&record.session_id) {
            info!(
                session_id = %record.session_id,
                "Session no longer present in registry"
            );
            dispatcher.force_logout(ForcedLogoutPayload::removed()).await;
        }
    }
}
