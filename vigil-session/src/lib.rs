//! Vigil Session - Session and identity lifecycle management
//!
//! Reconciles three independently-changing sources of truth without false
//! logouts in either direction:
//!
//! - the device-local session record,
//! - the remote, eventually-updated per-user session registry,
//! - the identity provider's own current-principal state.
//!
//! ## Architecture
//!
//! - **auth**: identity/document boundaries, bootstrap state machine,
//!   profile normalization, compensated provisioning
//! - **session**: local store, registration gateway, registry listener
//!   with grace period, forced-logout dispatcher
//! - **events**: broadcast bus consumed by the UI layer

pub mod auth;
pub mod events;
pub mod session;

pub use auth::{
    AuthBootstrap, DocumentEvent, DocumentStore, IdentityProvider, Principal, ProfileCache,
    ProvisionedAccount, ProvisioningService, Readiness, SecondaryProviderFactory,
};
pub use events::EventBus;
pub use session::{
    ForcedLogoutPayload, GracePeriod, LocalSessionRecord, LocalSessionStore, LogoutDispatcher,
    LogoutReason, RegistrationGateway, SessionEvent, SessionRegistrar, UserDocument, UserProfile,
};

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::Duration;
use tracing::info;
use vigil_core::VigilConfig;

/// Provisioning failure classification, surfaced so the UI can show a
/// targeted message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningErrorKind {
    /// The target email is already registered
    DuplicateAccount,
    /// The identity provider rejected the creation
    AccountCreation,
    /// The compensating delete after a failed profile write did not
    /// complete
    Rollback,
}

impl std::fmt::Display for ProvisioningErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProvisioningErrorKind::DuplicateAccount => write!(f, "duplicate-account"),
            ProvisioningErrorKind::AccountCreation => write!(f, "account-creation"),
            ProvisioningErrorKind::Rollback => write!(f, "rollback"),
        }
    }
}

/// Application-level error type
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Core error: {0}")]
    Core(#[from] vigil_core::VigilError),

    #[error("Session error: {message}")]
    Session { message: String },

    #[error("Provisioning error ({kind}): {message}")]
    Provisioning {
        kind: ProvisioningErrorKind,
        message: String,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;

impl SessionError {
    /// Create a session error
    pub fn session<S: Into<String>>(message: S) -> Self {
        Self::Session {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// The provisioning failure kind, when this is a provisioning error
    pub fn provisioning_kind(&self) -> Option<ProvisioningErrorKind> {
        match self {
            SessionError::Provisioning { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Main session lifecycle service.
///
/// Wires the bootstrap state machine, profile cache, registration gateway,
/// registry listener and logout dispatcher around host-supplied identity
/// and document-store boundaries.
pub struct SessionLifecycle {
    local: Arc<LocalSessionStore>,
    events: EventBus,
    gateway: Arc<RegistrationGateway>,
    bootstrap: Arc<AuthBootstrap>,
    readiness: Arc<Readiness>,
    provider: Arc<dyn IdentityProvider>,
    provisioning: Option<Arc<ProvisioningService>>,
    task: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

/// Builder for SessionLifecycle to simplify initialization
pub struct SessionLifecycleBuilder {
    provider: Arc<dyn IdentityProvider>,
    doc_store: Arc<dyn DocumentStore>,
    config: VigilConfig,
    registrar: Option<Arc<dyn SessionRegistrar>>,
    secondary_factory: Option<SecondaryProviderFactory>,
    storage_dir: Option<std::path::PathBuf>,
}

impl SessionLifecycleBuilder {
    /// Create a builder around the two consumed boundaries
    pub fn new(provider: Arc<dyn IdentityProvider>, doc_store: Arc<dyn DocumentStore>) -> Self {
        Self {
            provider,
            doc_store,
            config: VigilConfig::default(),
            registrar: None,
            secondary_factory: None,
            storage_dir: None,
        }
    }

    /// Use the given configuration
    pub fn with_config(mut self, config: VigilConfig) -> Self {
        self.config = config;
        self
    }

    /// Install the host registration function up front
    pub fn with_registrar(mut self, registrar: Arc<dyn SessionRegistrar>) -> Self {
        self.registrar = Some(registrar);
        self
    }

    /// Enable account provisioning through an isolated secondary provider
    pub fn with_secondary_provider(mut self, factory: SecondaryProviderFactory) -> Self {
        self.secondary_factory = Some(factory);
        self
    }

    /// Override the grace period
    pub fn with_grace_period(mut self, period: Duration) -> Self {
        self.config.grace_period_ms = period.as_millis() as u64;
        self
    }

    /// Override the bootstrap guard timeout
    pub fn with_bootstrap_timeout(mut self, timeout: Duration) -> Self {
        self.config.bootstrap_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Override the local storage namespace directory
    pub fn with_storage_dir<P: Into<std::path::PathBuf>>(mut self, dir: P) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    /// Build the SessionLifecycle
    pub async fn build(self) -> SessionResult<SessionLifecycle> {
        self.config
            .validate()
            .map_err(|e| SessionError::config(e.to_string()))?;

        let storage_dir = self
            .storage_dir
            .unwrap_or_else(|| std::path::PathBuf::from(&self.config.storage_dir));
        let local = Arc::new(LocalSessionStore::new(storage_dir)?);

        let events = EventBus::new(self.config.event_capacity);
        let flags = session::new_shared_flags();
        let readiness = Arc::new(Readiness::new());

        let gateway = Arc::new(RegistrationGateway::new(flags.clone(), events.clone()));
        if let Some(registrar) = self.registrar {
            gateway.install_registrar(registrar).await;
        }

        let dispatcher = Arc::new(LogoutDispatcher::new(
            self.provider.clone(),
            local.clone(),
            events.clone(),
            flags.clone(),
        ));

        let profile = ProfileCache::new(self.doc_store.clone(), local.clone(), events.clone());

        let bootstrap = Arc::new(AuthBootstrap::new(
            self.provider.clone(),
            self.doc_store.clone(),
            local.clone(),
            profile,
            gateway.clone(),
            dispatcher,
            events.clone(),
            flags,
            readiness.clone(),
            Duration::from_millis(self.config.grace_period_ms),
            Duration::from_millis(self.config.bootstrap_timeout_ms),
        ));

        let provisioning = self
            .secondary_factory
            .map(|factory| Arc::new(ProvisioningService::new(self.provider.clone(), factory)));

        Ok(SessionLifecycle {
            local,
            events,
            gateway,
            bootstrap,
            readiness,
            provider: self.provider,
            provisioning,
            task: std::sync::Mutex::new(None),
        })
    }
}

impl SessionLifecycle {
    /// Create a builder around the consumed boundaries
    pub fn builder(
        provider: Arc<dyn IdentityProvider>,
        doc_store: Arc<dyn DocumentStore>,
    ) -> SessionLifecycleBuilder {
        SessionLifecycleBuilder::new(provider, doc_store)
    }

    /// Start the bootstrap state machine
    pub fn start(&self) {
        let handle = self.bootstrap.clone().spawn();
        let mut task = self.task.lock().expect("lifecycle task lock poisoned");
        if let Some(previous) = task.replace(handle) {
            previous.abort();
        }
        info!("Session lifecycle started");
    }

    /// Await "auth is settled": resolves exactly once, with the settled
    /// principal or None
    pub async fn ready(&self) -> Option<Principal> {
        self.readiness.wait().await
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Voluntary logout: clear device-local state, then sign out
    pub async fn sign_out(&self) -> SessionResult<()> {
        self.bootstrap.detach_listener().await;
        self.local.clear()?;
        self.provider.sign_out().await.map_err(SessionError::Core)?;
        info!("Voluntary sign-out completed");
        Ok(())
    }

    /// Install the host registration function after startup
    pub async fn install_registrar(&self, registrar: Arc<dyn SessionRegistrar>) {
        self.gateway.install_registrar(registrar).await;
    }

    /// Replay queued registration requests
    pub async fn retry_pending_registrations(&self) {
        self.gateway.retry_pending().await;
    }

    /// The account provisioning service, when a secondary provider was
    /// configured
    pub fn provisioning(&self) -> Option<Arc<ProvisioningService>> {
        self.provisioning.clone()
    }

    /// The cached profile for fast UI reads
    pub fn cached_profile(&self) -> SessionResult<Option<UserProfile>> {
        self.local.load_profile_cache()
    }

    /// The current device-local session record
    pub fn local_record(&self) -> SessionResult<Option<LocalSessionRecord>> {
        self.local.load_record()
    }
}

impl Drop for SessionLifecycle {
    fn drop(&mut self) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use super::{
        DocumentStore, EventBus, ForcedLogoutPayload, IdentityProvider, LogoutReason, Principal,
        SessionError, SessionEvent, SessionLifecycle, SessionRegistrar, SessionResult,
    };
}
