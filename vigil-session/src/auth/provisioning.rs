//! Secondary Identity Context & Compensated Provisioning
//!
//! Account creation auto-signs-in on most identity providers, which would
//! replace the administrator's own principal. Creation therefore runs
//! inside an isolated secondary provider client, and the caller completes
//! the two-phase protocol: write the profile, then `finalize()` on
//! success or `rollback()` on failure so no identity-only account is left
//! orphaned.

use crate::auth::{IdentityProvider, Principal};
use crate::{ProvisioningErrorKind, SessionError, SessionResult};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// Factory producing the isolated secondary provider client, invoked
/// lazily on the first provisioning call
pub type SecondaryProviderFactory = Arc<dyn Fn() -> Arc<dyn IdentityProvider> + Send + Sync>;

/// Admin-facing account provisioning service.
///
/// Creations are serialized across the whole create → finalize/rollback
/// window because the secondary context can hold only one session at a
/// time.
pub struct ProvisioningService {
    primary: Arc<dyn IdentityProvider>,
    factory: SecondaryProviderFactory,
    secondary: OnceCell<Arc<dyn IdentityProvider>>,
    serialize: Arc<Mutex<()>>,
}

impl ProvisioningService {
    pub fn new(primary: Arc<dyn IdentityProvider>, factory: SecondaryProviderFactory) -> Self {
        Self {
            primary,
            factory,
            secondary: OnceCell::new(),
            serialize: Arc::new(Mutex::new(())),
        }
    }

    async fn secondary(&self) -> Arc<dyn IdentityProvider> {
        self.secondary
            .get_or_init(|| async {
                debug!("Constructing secondary identity context");
                (self.factory)()
            })
            .await
            .clone()
    }

    /// Create an account without disturbing the admin's primary session.
    ///
    /// The returned handle holds the serialization guard; the caller must
    /// write the profile record for `user.id` and then call `finalize()`,
    /// or `rollback()` if that write failed, before propagating.
    pub async fn create_user(
        &self,
        email: &str,
        password: &str,
    ) -> SessionResult<ProvisionedAccount> {
        let guard = self.serialize.clone().lock_owned().await;
        let secondary = self.secondary().await;

        // Idempotent pre-clean: a lingering session from an aborted
        // earlier creation must not leak into this one
        if secondary.current_principal().await.is_some() {
            if let Err(e) = secondary.sign_out().await {
                warn!(error = %e, "Secondary context pre-clean sign-out failed");
            }
        }

        // Fail fast on a known duplicate before creating anything
        match secondary.email_exists(email).await {
            Ok(true) => {
                return Err(SessionError::Provisioning {
                    kind: ProvisioningErrorKind::DuplicateAccount,
                    message: format!("An account already exists for {}", email),
                });
            }
            Ok(false) => {}
            Err(e) => {
                // Pre-check is best-effort; creation itself still rejects
                // duplicates
                warn!(error = %e, "Duplicate pre-check failed, proceeding with creation");
            }
        }

        let user = secondary
            .create_account(email, password)
            .await
            .map_err(|e| SessionError::Provisioning {
                kind: ProvisioningErrorKind::AccountCreation,
                message: format!("Account creation failed: {}", e),
            })?;

        info!(user_id = %user.id, "Account created in secondary context");

        // Some providers perturb unrelated token state during creation;
        // refresh the admin's token so the primary session stays valid
        if let Err(e) = self.primary.refresh_token().await {
            warn!(error = %e, "Primary token refresh after creation failed");
        }

        Ok(ProvisionedAccount {
            user,
            secondary,
            _guard: guard,
        })
    }
}

/// Handle to a just-created account awaiting its profile write.
///
/// Holds the provisioning serialization guard until finalized or rolled
/// back.
pub struct ProvisionedAccount {
    /// The newly created principal; the caller writes the profile record
    /// under this id
    pub user: Principal,
    secondary: Arc<dyn IdentityProvider>,
    _guard: OwnedMutexGuard<()>,
}

impl std::fmt::Debug for ProvisionedAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisionedAccount")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl ProvisionedAccount {
    /// The profile write succeeded: leave the secondary context clean for
    /// the next creation
    pub async fn finalize(self) -> SessionResult<()> {
        if let Err(e) = self.secondary.sign_out().await {
            warn!(error = %e, "Secondary context sign-out during finalize failed");
        }
        debug!(user_id = %self.user.id, "Provisioning finalized");
        Ok(())
    }

    /// The profile write failed: compensate by deleting the created
    /// account, then sign the secondary context out
    pub async fn rollback(self) -> SessionResult<()> {
        info!(user_id = %self.user.id, "Rolling back account creation");

        let delete_result = self.secondary.delete_account(&self.user).await;

        if let Err(e) = self.secondary.sign_out().await {
            warn!(error = %e, "Secondary context sign-out during rollback failed");
        }

        delete_result.map_err(|e| SessionError::Provisioning {
            kind: ProvisioningErrorKind::Rollback,
            message: format!("Failed to delete account during rollback: {}", e),
        })
    }
}
