//! Session Registration Gateway
//!
//! Asks the host-supplied registration function to record this device as
//! an active session, exactly once per principal lifetime. When the
//! function is unavailable or fails, the request is queued (deduplicated
//! by user id) and a `RegistrationRequested` event is raised so an
//! external retry loop can act.

use super::types::{PendingRegistration, SessionEvent};
use super::SharedFlags;
use crate::events::EventBus;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Host-supplied registration function. May be wired in after startup.
#[async_trait]
pub trait SessionRegistrar: Send + Sync {
    /// Register the current device as an active session for the user.
    /// Returns true on success.
    async fn register_session(&self, user_id: &str) -> bool;
}

/// Idempotent gateway in front of the host's registration function
pub struct RegistrationGateway {
    /// Installable registration function (absent until the host wires it)
    registrar: RwLock<Option<Arc<dyn SessionRegistrar>>>,
    /// Queued retries, deduplicated by user id
    pending: Mutex<HashMap<String, PendingRegistration>>,
    flags: SharedFlags,
    events: EventBus,
}

impl RegistrationGateway {
    pub fn new(flags: SharedFlags, events: EventBus) -> Self {
        Self {
            registrar: RwLock::new(None),
            pending: Mutex::new(HashMap::new()),
            flags,
            events,
        }
    }

    /// Install (or replace) the host registration function
    pub async fn install_registrar(&self, registrar: Arc<dyn SessionRegistrar>) {
        let mut slot = self.registrar.write().await;
        *slot = Some(registrar);
        info!("Session registrar installed");
    }

    /// Register this device for the given user, at most once per
    /// principal lifetime. Failures queue a deduplicated retry request.
    pub async fn ensure_registered(&self, user_id: &str) {
        {
            let flags = self.flags.lock().await;
            if flags.registered {
                debug!(user_id, "Registration already completed for this principal lifetime");
                return;
            }
        }

        let registrar = { self.registrar.read().await.clone() };

        match registrar {
            Some(registrar) => {
                if registrar.register_session(user_id).await {
                    let mut flags = self.flags.lock().await;
                    flags.registered = true;
                    drop(flags);

                    self.pending.lock().await.remove(user_id);
                    info!(user_id, "Device session registered");
                } else {
                    warn!(user_id, "Registration function returned failure, queueing retry");
                    self.queue_request(user_id, Some("registration returned false".to_string()))
                        .await;
                }
            }
            None => {
                debug!(user_id, "No registrar installed yet, queueing request");
                self.queue_request(user_id, None).await;
            }
        }
    }

    /// Replay queued registrations. Intended for the host's retry loop,
    /// typically after installing the registrar.
    pub async fn retry_pending(&self) {
        let user_ids: Vec<String> = {
            let pending = self.pending.lock().await;
            pending.keys().cloned().collect()
        };

        for user_id in user_ids {
            self.ensure_registered(&user_id).await;
        }
    }

    /// Number of queued registration requests
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    async fn queue_request(&self, user_id: &str, last_error: Option<String>) {
        {
            let mut pending = self.pending.lock().await;
            match pending.get_mut(user_id) {
                Some(existing) => {
                    // Repeated failures never stack; only the latest error
                    // is kept
                    existing.last_error = last_error;
                }
                None => {
                    pending.insert(
                        user_id.to_string(),
                        PendingRegistration::new(user_id.to_string(), last_error),
                    );
                }
            }
        }

        self.events.publish(SessionEvent::RegistrationRequested {
            user_id: user_id.to_string(),
        });
    }
}
