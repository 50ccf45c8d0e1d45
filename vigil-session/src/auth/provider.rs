//! Identity and document-store boundaries
//!
//! The core never implements these; it consumes them. The identity
//! provider's subscription fires once per actual principal transition, and
//! `sign_out` eventually causes a `None` on that subscription. Document
//! records are addressable by a stable user id.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use vigil_core::VigilResult;

/// The current authenticated or anonymous identity, as reported by the
/// identity provider. Owned by the provider; read-only everywhere else.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    /// Stable user identifier
    pub id: String,
    /// Whether this is a temporary anonymous identity
    pub is_anonymous: bool,
    /// Email address, present for authenticated principals
    pub email: Option<String>,
}

impl Principal {
    /// Create an anonymous principal
    pub fn anonymous(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_anonymous: true,
            email: None,
        }
    }

    /// Create an authenticated principal
    pub fn authenticated(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_anonymous: false,
            email: Some(email.into()),
        }
    }
}

/// Identity provider boundary.
///
/// `subscribe` returns a broadcast receiver carrying the new principal
/// (or `None` after sign-out) once per transition.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Subscribe to principal transitions
    fn subscribe(&self) -> broadcast::Receiver<Option<Principal>>;

    /// The provider's current principal, if any
    async fn current_principal(&self) -> Option<Principal>;

    /// Sign in with a temporary anonymous identity
    async fn sign_in_anonymously(&self) -> VigilResult<Principal>;

    /// Sign in with email and password
    async fn sign_in(&self, email: &str, password: &str) -> VigilResult<Principal>;

    /// Sign the current principal out
    async fn sign_out(&self) -> VigilResult<()>;

    /// Create a new account (used only through the secondary context)
    async fn create_account(&self, email: &str, password: &str) -> VigilResult<Principal>;

    /// Delete an account (used by provisioning rollback)
    async fn delete_account(&self, principal: &Principal) -> VigilResult<()>;

    /// Refresh the current principal's token
    async fn refresh_token(&self) -> VigilResult<()>;

    /// Whether an account already exists for the given email
    async fn email_exists(&self, email: &str) -> VigilResult<bool>;
}

/// One update pushed to a document subscription
#[derive(Debug, Clone)]
pub enum DocumentEvent {
    /// A fresh snapshot of the subscribed record
    Snapshot(serde_json::Value),
    /// Access was revoked mid-subscription; the listener detaches quietly
    PermissionDenied,
}

/// Document store boundary
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a record, or None when absent
    async fn get_document(&self, path: &str) -> VigilResult<Option<serde_json::Value>>;

    /// Patch a single field of a record
    async fn set_field(&self, path: &str, field: &str, value: serde_json::Value)
        -> VigilResult<()>;

    /// Subscribe to real-time updates of a record
    fn subscribe(&self, path: &str) -> broadcast::Receiver<DocumentEvent>;
}

/// Path of the per-user profile/session record
pub fn user_document_path(user_id: &str) -> String {
    format!("users/{}", user_id)
}
