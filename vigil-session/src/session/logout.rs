//! Forced-Logout Dispatcher
//!
//! Single-flight execution of the terminal logout transition: publish the
//! payload for the UI, clear device-local state, sign the provider out.
//! The in-progress flag resets only when a later authenticated bootstrap
//! completes, not immediately after dispatch.

use super::store::LocalSessionStore;
use super::types::{ForcedLogoutPayload, SessionEvent};
use super::SharedFlags;
use crate::auth::IdentityProvider;
use crate::events::EventBus;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Dispatches forced logout exactly once per detected trigger
pub struct LogoutDispatcher {
    provider: Arc<dyn IdentityProvider>,
    local: Arc<LocalSessionStore>,
    events: EventBus,
    flags: SharedFlags,
}

impl LogoutDispatcher {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        local: Arc<LocalSessionStore>,
        events: EventBus,
        flags: SharedFlags,
    ) -> Self {
        Self {
            provider,
            local,
            events,
            flags,
        }
    }

    /// Execute a forced logout. The first concurrent trigger wins; later
    /// ones are no-ops until a fresh authenticated bootstrap resets the
    /// flag.
    pub async fn force_logout(&self, payload: ForcedLogoutPayload) {
        {
            let mut flags = self.flags.lock().await;
            if flags.logout_in_progress {
                debug!(reason = %payload.reason, "Forced logout already in progress, ignoring trigger");
                return;
            }
            flags.logout_in_progress = true;
        }

        info!(reason = %payload.reason, "Executing forced logout");

        // Try the bus first so the UI can show the message and navigate;
        // with no subscribers the direct cleanup below is the only path
        if !self
            .events
            .publish(SessionEvent::ForcedLogout(payload.clone()))
        {
            warn!(reason = %payload.reason, "No forced-logout subscribers, running direct cleanup only");
        }

        if let Err(e) = self.local.clear() {
            warn!(error = %e, "Failed to clear local session state during forced logout");
        }

        if let Err(e) = self.provider.sign_out().await {
            warn!(error = %e, "Provider sign-out failed during forced logout");
        }
    }
}
