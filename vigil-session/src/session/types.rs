//! Session Types and Structures
//!
//! Defines the device-local session record, the remote per-user session
//! registry shapes, and the lifecycle events emitted to the host.

use crate::auth::Principal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default PIN written when a profile record has none (or a malformed one)
pub const DEFAULT_APPLICATION_PIN: &str = "0000";

/// Device-local session record, persisted on this device only.
///
/// The session id is generated once per login and never reused; the
/// issuance timestamp is what the invalidation marker is compared against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalSessionRecord {
    pub session_id: String,
    pub issued_at: DateTime<Utc>,
}

impl LocalSessionRecord {
    /// Create a fresh record for a new login
    pub fn new() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            issued_at: Utc::now(),
        }
    }
}

impl Default for LocalSessionRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Remote-owned user profile, mirrored into the local cache after
/// normalization
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    /// 4-digit application PIN; defaulted when absent or malformed
    #[serde(default)]
    pub application_pin: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl UserProfile {
    /// Check whether a PIN value is a 4-digit string
    pub fn pin_is_valid(pin: &str) -> bool {
        pin.len() == 4 && pin.chars().all(|c| c.is_ascii_digit())
    }

    /// Default the PIN if it is missing or malformed.
    ///
    /// Returns true when the record was changed and needs a write-back.
    pub fn normalize_pin(&mut self) -> bool {
        match &self.application_pin {
            Some(pin) if Self::pin_is_valid(pin) => false,
            _ => {
                self.application_pin = Some(DEFAULT_APPLICATION_PIN.to_string());
                true
            }
        }
    }
}

/// History entry type inside a registry entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum SessionHistoryKind {
    Login,
    Logout,
    ForceLogout,
    ForceLogoutHandled,
}

/// One recorded session transition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionHistoryEvent {
    #[serde(rename = "type")]
    pub kind: SessionHistoryKind,
    pub at: DateTime<Utc>,
}

/// One active device session inside the user's remote record, keyed by
/// session id. Created by the host's registration function; mutated by
/// device heartbeats; removed by an administrator's close-all action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRegistryEntry {
    #[serde(default)]
    pub device_label: Option<String>,
    #[serde(default)]
    pub device_mac: Option<String>,
    #[serde(default)]
    pub last_login_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_active_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub history: Vec<SessionHistoryEvent>,
}

/// Deserialized shape of the remote per-user record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserDocument {
    #[serde(flatten)]
    pub profile: UserProfile,
    /// Active device sessions, keyed by session id
    #[serde(default)]
    pub sessions: HashMap<String, SessionRegistryEntry>,
    /// Coarse invalidation marker: every session issued at or before this
    /// instant is revoked, including one registered between the marker's
    /// write and its propagation to this device. A session issued after
    /// the marker is untouched because its issuance timestamp exceeds it.
    #[serde(default)]
    pub sessions_invalidated_at: Option<DateTime<Utc>>,
}

impl UserDocument {
    /// Whether the invalidation marker revokes a session issued at the
    /// given instant
    pub fn invalidates(&self, issued_at: DateTime<Utc>) -> bool {
        match self.sessions_invalidated_at {
            Some(marker) => marker >= issued_at,
            None => false,
        }
    }

    /// Whether the registry still carries the given session id
    pub fn contains_session(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }
}

/// Queued registration request, deduplicated by user id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRegistration {
    pub user_id: String,
    pub requested_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl PendingRegistration {
    pub fn new(user_id: String, last_error: Option<String>) -> Self {
        Self {
            user_id,
            requested_at: Utc::now(),
            last_error,
        }
    }
}

/// Why a forced logout fired
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LogoutReason {
    SessionInvalidated,
    SessionRemoved,
}

impl std::fmt::Display for LogoutReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogoutReason::SessionInvalidated => write!(f, "session-invalidated"),
            LogoutReason::SessionRemoved => write!(f, "session-removed"),
        }
    }
}

/// Host-observable forced-logout notification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForcedLogoutPayload {
    pub reason: LogoutReason,
    pub message: String,
    pub kind: String,
    pub redirect: String,
}

impl ForcedLogoutPayload {
    /// Payload for a bulk invalidation (log out everywhere)
    pub fn invalidated() -> Self {
        Self {
            reason: LogoutReason::SessionInvalidated,
            message: "Your session was ended by an administrator. Please sign in again."
                .to_string(),
            kind: "warning".to_string(),
            redirect: "/login".to_string(),
        }
    }

    /// Payload for a removed registry entry
    pub fn removed() -> Self {
        Self {
            reason: LogoutReason::SessionRemoved,
            message: "This device's session is no longer active. Please sign in again."
                .to_string(),
            kind: "warning".to_string(),
            redirect: "/login".to_string(),
        }
    }
}

/// Lifecycle events emitted on the session event bus
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The merged profile was refreshed and cached locally
    ProfileUpdated {
        user_id: String,
        profile: UserProfile,
    },
    /// Registration could not complete; an external retry loop should act
    RegistrationRequested { user_id: String },
    /// A forced logout executed on this device
    ForcedLogout(ForcedLogoutPayload),
    /// The current principal changed
    AuthStateChanged {
        principal: Option<Principal>,
        ready: bool,
    },
}
