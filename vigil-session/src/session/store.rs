//! Local Session Store - Device-local persistence
//!
//! Holds the two session scalars (session id, issuance timestamp) and the
//! denormalized profile cache under a fixed storage namespace. No network
//! access here.

use super::types::{LocalSessionRecord, UserProfile};
use crate::{SessionError, SessionResult};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

const SESSION_FILE: &str = "session.json";
const PROFILE_CACHE_FILE: &str = "profile.json";

/// Device-local storage for the session record and cached profile
#[derive(Debug)]
pub struct LocalSessionStore {
    /// Namespace directory for this device's state
    storage_dir: PathBuf,
    /// Serializes clear-vs-write so a logout never leaves half a record
    write_lock: Mutex<()>,
}

impl LocalSessionStore {
    /// Create a store rooted at the given namespace directory
    pub fn new<P: AsRef<Path>>(storage_dir: P) -> SessionResult<Self> {
        let storage_dir = storage_dir.as_ref().to_path_buf();

        std::fs::create_dir_all(&storage_dir).map_err(SessionError::Io)?;

        info!("Local session store initialized at: {}", storage_dir.display());

        Ok(Self {
            storage_dir,
            write_lock: Mutex::new(()),
        })
    }

    fn session_path(&self) -> PathBuf {
        self.storage_dir.join(SESSION_FILE)
    }

    fn profile_path(&self) -> PathBuf {
        self.storage_dir.join(PROFILE_CACHE_FILE)
    }

    /// Persist the session record for the current login
    pub fn save_record(&self, record: &LocalSessionRecord) -> SessionResult<()> {
        let _guard = self.write_lock.lock().expect("local store lock poisoned");

        let json_data =
            serde_json::to_string_pretty(record).map_err(SessionError::Serialization)?;
        std::fs::write(self.session_path(), json_data).map_err(SessionError::Io)?;

        debug!(session_id = %record.session_id, "Saved local session record");
        Ok(())
    }

    /// Load the session record, or None when this device has no login
    pub fn load_record(&self) -> SessionResult<Option<LocalSessionRecord>> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }

        let json_data = std::fs::read_to_string(&path).map_err(SessionError::Io)?;
        match serde_json::from_str(&json_data) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                // A corrupt record is treated as no login rather than a
                // permanently wedged device
                warn!(error = %e, "Discarding unreadable local session record");
                Ok(None)
            }
        }
    }

    /// Mirror the normalized profile for fast UI reads
    pub fn save_profile_cache(&self, profile: &UserProfile) -> SessionResult<()> {
        let _guard = self.write_lock.lock().expect("local store lock poisoned");

        let json_data =
            serde_json::to_string_pretty(profile).map_err(SessionError::Serialization)?;
        std::fs::write(self.profile_path(), json_data).map_err(SessionError::Io)?;

        debug!("Saved profile cache");
        Ok(())
    }

    /// Load the cached profile, or None when nothing is cached
    pub fn load_profile_cache(&self) -> SessionResult<Option<UserProfile>> {
        let path = self.profile_path();
        if !path.exists() {
            return Ok(None);
        }

        let json_data = std::fs::read_to_string(&path).map_err(SessionError::Io)?;
        let profile = serde_json::from_str(&json_data).map_err(SessionError::Serialization)?;
        Ok(Some(profile))
    }

    /// Clear all local state for this login (record first, then cache)
    pub fn clear(&self) -> SessionResult<()> {
        let _guard = self.write_lock.lock().expect("local store lock poisoned");

        for path in [self.session_path(), self.profile_path()] {
            if path.exists() {
                std::fs::remove_file(&path).map_err(SessionError::Io)?;
                debug!("Removed {}", path.display());
            }
        }

        info!("Cleared local session state");
        Ok(())
    }
}
