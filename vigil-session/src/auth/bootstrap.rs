//! Bootstrap State Machine
//!
//! Drives INIT → WAITING → ANONYMOUS | AUTHENTICATED and back. Exposes a
//! readiness signal that settles exactly once so dependent code can await
//! "auth is settled" instead of polling, guarded by a timeout independent
//! of the identity provider.

use crate::auth::profile::ProfileCache;
use crate::auth::{DocumentStore, IdentityProvider, Principal};
use crate::events::EventBus;
use crate::session::listener::{GracePeriod, ListenerHandle, RegistryListener};
use crate::session::logout::LogoutDispatcher;
use crate::session::registration::RegistrationGateway;
use crate::session::store::LocalSessionStore;
use crate::session::types::{LocalSessionRecord, SessionEvent};
use crate::session::SharedFlags;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

/// One-shot readiness signal; the first resolve wins, later resolves are
/// no-ops, and any number of waiters observe the settled value.
#[derive(Debug)]
pub struct Readiness {
    state: std::sync::Mutex<Option<Option<Principal>>>,
    notify: Notify,
}

impl Readiness {
    pub fn new() -> Self {
        Self {
            state: std::sync::Mutex::new(None),
            notify: Notify::new(),
        }
    }

    /// Settle the signal. Returns true when this call was the one that
    /// resolved it.
    pub fn resolve(&self, principal: Option<Principal>) -> bool {
        let mut state = self.state.lock().expect("readiness lock poisoned");
        if state.is_some() {
            return false;
        }
        *state = Some(principal);
        drop(state);

        self.notify.notify_waiters();
        true
    }

    /// Whether the signal has settled
    pub fn is_resolved(&self) -> bool {
        self.state
            .lock()
            .expect("readiness lock poisoned")
            .is_some()
    }

    /// Await the settled principal
    pub async fn wait(&self) -> Option<Principal> {
        loop {
            let notified = self.notify.notified();
            if let Some(settled) = self
                .state
                .lock()
                .expect("readiness lock poisoned")
                .clone()
            {
                return settled;
            }
            notified.await;
        }
    }
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

/// Bootstrap driver: consumes the provider subscription and runs the
/// authenticated-entry pipeline (profile sync, registration, grace
/// period, listener attach).
pub struct AuthBootstrap {
    provider: Arc<dyn IdentityProvider>,
    doc_store: Arc<dyn DocumentStore>,
    local: Arc<LocalSessionStore>,
    profile: ProfileCache,
    gateway: Arc<RegistrationGateway>,
    dispatcher: Arc<LogoutDispatcher>,
    events: EventBus,
    flags: SharedFlags,
    readiness: Arc<Readiness>,
    listener: Mutex<Option<ListenerHandle>>,
    grace_period: Duration,
    bootstrap_timeout: Duration,
}

impl AuthBootstrap {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        doc_store: Arc<dyn DocumentStore>,
        local: Arc<LocalSessionStore>,
        profile: ProfileCache,
        gateway: Arc<RegistrationGateway>,
        dispatcher: Arc<LogoutDispatcher>,
        events: EventBus,
        flags: SharedFlags,
        readiness: Arc<Readiness>,
        grace_period: Duration,
        bootstrap_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            doc_store,
            local,
            profile,
            gateway,
            dispatcher,
            events,
            flags,
            readiness,
            listener: Mutex::new(None),
            grace_period,
            bootstrap_timeout,
        }
    }

    /// Subscribe to the provider and spawn the bootstrap task
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let mut receiver = self.provider.subscribe();

        tokio::spawn(async move {
            // Guard against a provider that never calls back at all. A
            // late real callback is still processed by the loop below.
            match timeout(self.bootstrap_timeout, receiver.recv()).await {
                Ok(Ok(principal)) => self.handle_change(principal).await,
                Ok(Err(RecvError::Closed)) => {
                    warn!("Identity provider subscription closed before any callback");
                    self.readiness.resolve(None);
                    return;
                }
                Ok(Err(RecvError::Lagged(_))) => {}
                Err(_) => {
                    warn!(
                        timeout_ms = self.bootstrap_timeout.as_millis() as u64,
                        "Identity provider never called back, resolving readiness without a principal"
                    );
                    self.readiness.resolve(None);
                }
            }

            loop {
                match receiver.recv().await {
                    Ok(principal) => self.handle_change(principal).await,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Bootstrap lagged behind principal transitions");
                        continue;
                    }
                    Err(RecvError::Closed) => {
                        debug!("Identity provider subscription closed");
                        break;
                    }
                }
            }
        })
    }

    /// Process one principal transition
    async fn handle_change(&self, principal: Option<Principal>) {
        match principal {
            None => self.enter_waiting().await,
            Some(principal) if principal.is_anonymous => {
                info!(user_id = %principal.id, "Anonymous principal settled");

                // An anonymous principal ends any authenticated lifetime:
                // the listener goes, and the next login registers afresh
                self.detach_listener().await;
                {
                    let mut flags = self.flags.lock().await;
                    flags.registered = false;
                }

                self.readiness.resolve(Some(principal.clone()));
                self.events.publish(SessionEvent::AuthStateChanged {
                    principal: Some(principal),
                    ready: true,
                });
                // Anonymous principals are not subject to multi-device
                // session control; no listener is attached.
            }
            Some(principal) => {
                info!(user_id = %principal.id, "Authenticated principal settled");
                self.readiness.resolve(Some(principal.clone()));
                self.events.publish(SessionEvent::AuthStateChanged {
                    principal: Some(principal.clone()),
                    ready: true,
                });
                self.enter_authenticated(&principal).await;
            }
        }
    }

    /// Principal became null: detach, reset, try anonymous sign-in
    async fn enter_waiting(&self) {
        debug!("Principal cleared, returning to waiting state");

        self.detach_listener().await;
        {
            let mut flags = self.flags.lock().await;
            flags.registered = false;
        }

        self.events.publish(SessionEvent::AuthStateChanged {
            principal: None,
            ready: self.readiness.is_resolved(),
        });

        match self.provider.sign_in_anonymously().await {
            Ok(_) => {
                // The subsequent subscription callback handles the
                // anonymous principal
                debug!("Anonymous sign-in requested");
            }
            Err(e) => {
                warn!(error = %e, "Anonymous sign-in failed, resolving readiness without a principal");
                self.readiness.resolve(None);
            }
        }
    }

    /// Authenticated entry: profile, registration, grace period, listener
    async fn enter_authenticated(&self, principal: &Principal) {
        // Re-entrant auth changes must not leave a stale listener behind
        self.detach_listener().await;

        if let Err(e) = self.profile.sync(principal).await {
            warn!(user_id = %principal.id, error = %e, "Profile sync failed, continuing login flow");
        }

        // A fresh login gets exactly one local session record
        match self.local.load_record() {
            Ok(Some(record)) => {
                debug!(session_id = %record.session_id, "Reusing existing local session record");
            }
            Ok(None) => {
                let record = LocalSessionRecord::new();
                if let Err(e) = self.local.save_record(&record) {
                    warn!(error = %e, "Failed to persist local session record");
                } else {
                    info!(session_id = %record.session_id, "Created local session record");
                }
            }
            Err(e) => {
                warn!(error = %e, "Could not read local session record");
            }
        }

        self.gateway.ensure_registered(&principal.id).await;

        let grace = GracePeriod::start(self.grace_period);
        let handle = RegistryListener::attach(
            self.doc_store.clone(),
            self.local.clone(),
            self.dispatcher.clone(),
            &principal.id,
            grace,
        );
        *self.listener.lock().await = Some(handle);

        // Bootstrap completed for a fresh authenticated principal; the
        // forced-logout single-flight guard re-arms here and only here
        {
            let mut flags = self.flags.lock().await;
            flags.logout_in_progress = false;
        }
    }

    /// Drop the current registry listener, if any
    pub async fn detach_listener(&self) {
        if let Some(handle) = self.listener.lock().await.take() {
            handle.detach();
        }
    }
}
