//! Profile Cache & Normalizer
//!
//! On every authenticated principal change: fetch the remote profile,
//! default a missing or malformed application PIN, write the correction
//! back without blocking the login flow, mirror the merged record into the
//! local cache, and notify the UI layer.

use crate::auth::{user_document_path, DocumentStore, Principal};
use crate::events::EventBus;
use crate::session::store::LocalSessionStore;
use crate::session::types::{SessionEvent, UserProfile};
use crate::SessionResult;
use futures::FutureExt;
use std::sync::Arc;
use tracing::{debug, warn};
use vigil_core::{retry_async, with_timeout, RetryConfig};

/// Upper bound on the fire-and-forget PIN correction write
const PIN_WRITE_BACK_TIMEOUT_MS: u64 = 10_000;

/// Fetches, normalizes and locally mirrors the user profile
pub struct ProfileCache {
    store: Arc<dyn DocumentStore>,
    local: Arc<LocalSessionStore>,
    events: EventBus,
}

impl ProfileCache {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        local: Arc<LocalSessionStore>,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            local,
            events,
        }
    }

    /// Synchronize the profile for an authenticated principal.
    ///
    /// The PIN write-back is fire-and-forget; its failure never blocks the
    /// rest of the login flow.
    pub async fn sync(&self, principal: &Principal) -> SessionResult<UserProfile> {
        let path = user_document_path(&principal.id);

        // The fetch is the one remote read the login flow depends on;
        // transient store failures get the standard backoff
        let store = self.store.clone();
        let fetch_path = path.clone();
        let fetched = retry_async(
            move || {
                let store = store.clone();
                let path = fetch_path.clone();
                async move { store.get_document(&path).await }.boxed()
            },
            RetryConfig::default(),
            "profile_fetch",
        )
        .await?;

        let mut profile = match fetched {
            Some(value) => match serde_json::from_value::<UserProfile>(value) {
                Ok(profile) => profile,
                Err(e) => {
                    warn!(user_id = %principal.id, error = %e, "Profile record unparseable, starting from defaults");
                    UserProfile::default()
                }
            },
            None => {
                debug!(user_id = %principal.id, "No profile record yet, starting from defaults");
                UserProfile::default()
            }
        };

        if profile.normalize_pin() {
            let store = self.store.clone();
            let pin = profile.application_pin.clone();
            let user_id = principal.id.clone();

            tokio::spawn(async move {
                let result = with_timeout(
                    store.set_field(
                        &user_document_path(&user_id),
                        "application_pin",
                        serde_json::json!(pin),
                    ),
                    PIN_WRITE_BACK_TIMEOUT_MS,
                    "pin_write_back",
                )
                .await
                .and_then(|written| written);
                if let Err(e) = result {
                    warn!(user_id = %user_id, error = %e, "PIN normalization write-back failed");
                }
            });
        }

        if let Err(e) = self.local.save_profile_cache(&profile) {
            warn!(user_id = %principal.id, error = %e, "Failed to cache profile locally");
        }

        self.events.publish(SessionEvent::ProfileUpdated {
            user_id: principal.id.clone(),
            profile: profile.clone(),
        });

        debug!(user_id = %principal.id, "Profile synchronized");
        Ok(profile)
    }
}
