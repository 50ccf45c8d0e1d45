//! Session Management Module
//!
//! Device-local session state, the registration gateway with its pending
//! queue, the registry listener with grace-period suppression, and the
//! forced-logout dispatcher.

pub mod listener;
pub mod logout;
pub mod registration;
pub mod store;
pub mod types;

pub use listener::{GracePeriod, ListenerHandle, RegistryListener};
pub use logout::LogoutDispatcher;
pub use registration::{RegistrationGateway, SessionRegistrar};
pub use store::LocalSessionStore;
pub use types::*;

use std::sync::Arc;
use tokio::sync::Mutex;

/// Process-wide lifecycle flags.
///
/// `registered` is true once registration succeeded for the current
/// principal lifetime and resets when the principal becomes null or
/// anonymous. `logout_in_progress` makes forced logout single-flight and
/// resets only when a later authenticated bootstrap completes. Held in one
/// mutex so every mutation is serialized regardless of which callback
/// path performs it.
#[derive(Debug, Default)]
pub struct SessionFlags {
    pub registered: bool,
    pub logout_in_progress: bool,
}

/// Shared handle to the lifecycle flags
pub type SharedFlags = Arc<Mutex<SessionFlags>>;

/// Create a fresh flag state
pub fn new_shared_flags() -> SharedFlags {
    Arc::new(Mutex::new(SessionFlags::default()))
}
