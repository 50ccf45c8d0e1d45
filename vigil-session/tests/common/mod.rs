//! Shared mock collaborators for lifecycle tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use vigil_core::{ErrorContext, VigilError, VigilResult};
use vigil_session::session::SessionRegistrar;
use vigil_session::{DocumentEvent, DocumentStore, IdentityProvider, Principal, SessionEvent};

/// Let spawned lifecycle tasks run until they block again
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

/// Collect every event currently buffered on a subscription
pub fn drain(receiver: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

/// The forced-logout payloads among the buffered events
pub fn forced_logouts(
    receiver: &mut broadcast::Receiver<SessionEvent>,
) -> Vec<vigil_session::ForcedLogoutPayload> {
    drain(receiver)
        .into_iter()
        .filter_map(|event| match event {
            SessionEvent::ForcedLogout(payload) => Some(payload),
            _ => None,
        })
        .collect()
}

/// Scripted identity provider
pub struct MockIdentityProvider {
    tx: broadcast::Sender<Option<Principal>>,
    current: Mutex<Option<Principal>>,
    pub anonymous_calls: AtomicUsize,
    pub sign_out_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub created_accounts: Mutex<Vec<Principal>>,
    pub deleted_accounts: Mutex<Vec<String>>,
    pub existing_emails: Mutex<HashSet<String>>,
    pub fail_anonymous: AtomicBool,
    pub fail_create: AtomicBool,
    pub auto_emit_anonymous: AtomicBool,
}

impl MockIdentityProvider {
    pub fn new() -> Arc<Self> {
        let (tx, _) = broadcast::channel(16);
        Arc::new(Self {
            tx,
            current: Mutex::new(None),
            anonymous_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            created_accounts: Mutex::new(Vec::new()),
            deleted_accounts: Mutex::new(Vec::new()),
            existing_emails: Mutex::new(HashSet::new()),
            fail_anonymous: AtomicBool::new(false),
            fail_create: AtomicBool::new(false),
            auto_emit_anonymous: AtomicBool::new(false),
        })
    }

    /// Drive a principal transition, as the real provider would
    pub fn emit(&self, principal: Option<Principal>) {
        *self.current.lock().unwrap() = principal.clone();
        let _ = self.tx.send(principal);
    }

    fn identity_error(message: &str) -> VigilError {
        VigilError::Identity {
            message: message.to_string(),
            source: None,
            context: ErrorContext::new("mock_provider"),
        }
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    fn subscribe(&self) -> broadcast::Receiver<Option<Principal>> {
        self.tx.subscribe()
    }

    async fn current_principal(&self) -> Option<Principal> {
        self.current.lock().unwrap().clone()
    }

    async fn sign_in_anonymously(&self) -> VigilResult<Principal> {
        self.anonymous_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_anonymous.load(Ordering::SeqCst) {
            return Err(Self::identity_error("anonymous sign-in unavailable"));
        }

        let principal = Principal::anonymous(format!("anon-{}", uuid::Uuid::new_v4()));
        if self.auto_emit_anonymous.load(Ordering::SeqCst) {
            self.emit(Some(principal.clone()));
        } else {
            *self.current.lock().unwrap() = Some(principal.clone());
        }
        Ok(principal)
    }

    async fn sign_in(&self, email: &str, _password: &str) -> VigilResult<Principal> {
        let principal = Principal::authenticated(format!("user-{}", uuid::Uuid::new_v4()), email);
        self.emit(Some(principal.clone()));
        Ok(principal)
    }

    async fn sign_out(&self) -> VigilResult<()> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        *self.current.lock().unwrap() = None;
        Ok(())
    }

    async fn create_account(&self, email: &str, _password: &str) -> VigilResult<Principal> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Self::identity_error("account creation rejected"));
        }

        let principal = Principal::authenticated(format!("user-{}", uuid::Uuid::new_v4()), email);
        self.created_accounts.lock().unwrap().push(principal.clone());
        // Providers auto-sign-in on creation
        *self.current.lock().unwrap() = Some(principal.clone());
        Ok(principal)
    }

    async fn delete_account(&self, principal: &Principal) -> VigilResult<()> {
        self.deleted_accounts
            .lock()
            .unwrap()
            .push(principal.id.clone());
        self.created_accounts
            .lock()
            .unwrap()
            .retain(|p| p.id != principal.id);
        Ok(())
    }

    async fn refresh_token(&self) -> VigilResult<()> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn email_exists(&self, email: &str) -> VigilResult<bool> {
        if self.existing_emails.lock().unwrap().contains(email) {
            return Ok(true);
        }
        Ok(self
            .created_accounts
            .lock()
            .unwrap()
            .iter()
            .any(|p| p.email.as_deref() == Some(email)))
    }
}

/// In-memory document store with scriptable subscriptions
pub struct MockDocumentStore {
    docs: Mutex<HashMap<String, serde_json::Value>>,
    subs: Mutex<HashMap<String, broadcast::Sender<DocumentEvent>>>,
    pub set_field_calls: Mutex<Vec<(String, String, serde_json::Value)>>,
    pub subscribe_count: AtomicUsize,
    pub get_calls: AtomicUsize,
    /// Fail this many upcoming reads before serving them again
    pub fail_gets_remaining: AtomicUsize,
}

impl MockDocumentStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            docs: Mutex::new(HashMap::new()),
            subs: Mutex::new(HashMap::new()),
            set_field_calls: Mutex::new(Vec::new()),
            subscribe_count: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            fail_gets_remaining: AtomicUsize::new(0),
        })
    }

    fn sender_for(&self, path: &str) -> broadcast::Sender<DocumentEvent> {
        let mut subs = self.subs.lock().unwrap();
        subs.entry(path.to_string())
            .or_insert_with(|| broadcast::channel(16).0)
            .clone()
    }

    pub fn insert_document(&self, path: &str, value: serde_json::Value) {
        self.docs.lock().unwrap().insert(path.to_string(), value);
    }

    /// Push a real-time snapshot to subscribers of the path
    pub fn push_snapshot(&self, path: &str, value: serde_json::Value) {
        let _ = self.sender_for(path).send(DocumentEvent::Snapshot(value));
    }

    /// Simulate mid-subscription access revocation
    pub fn push_permission_denied(&self, path: &str) {
        let _ = self.sender_for(path).send(DocumentEvent::PermissionDenied);
    }
}

#[async_trait]
impl DocumentStore for MockDocumentStore {
    async fn get_document(&self, path: &str) -> VigilResult<Option<serde_json::Value>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_gets_remaining.load(Ordering::SeqCst) > 0 {
            self.fail_gets_remaining.fetch_sub(1, Ordering::SeqCst);
            return Err(VigilError::Store {
                message: "document store unavailable".to_string(),
                source: None,
                context: ErrorContext::new("mock_store"),
            });
        }
        Ok(self.docs.lock().unwrap().get(path).cloned())
    }

    async fn set_field(
        &self,
        path: &str,
        field: &str,
        value: serde_json::Value,
    ) -> VigilResult<()> {
        self.set_field_calls.lock().unwrap().push((
            path.to_string(),
            field.to_string(),
            value.clone(),
        ));

        let mut docs = self.docs.lock().unwrap();
        let doc = docs
            .entry(path.to_string())
            .or_insert_with(|| serde_json::json!({}));
        if let Some(object) = doc.as_object_mut() {
            object.insert(field.to_string(), value);
        }
        Ok(())
    }

    fn subscribe(&self, path: &str) -> broadcast::Receiver<DocumentEvent> {
        self.subscribe_count.fetch_add(1, Ordering::SeqCst);
        self.sender_for(path).subscribe()
    }
}

/// Counting registrar with a switchable outcome
pub struct MockRegistrar {
    pub calls: AtomicUsize,
    pub succeed: AtomicBool,
}

impl MockRegistrar {
    pub fn new(succeed: bool) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            succeed: AtomicBool::new(succeed),
        })
    }
}

#[async_trait]
impl SessionRegistrar for MockRegistrar {
    async fn register_session(&self, _user_id: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.succeed.load(Ordering::SeqCst)
    }
}
