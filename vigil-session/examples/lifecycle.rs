//! End-to-end lifecycle walkthrough against in-memory boundaries.
//!
//! Signs a user in, then simulates an administrator ending every session
//! and prints the resulting forced logout.
//!
//! Run with: cargo run -p vigil-session --example lifecycle

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::time::{timeout, Duration};
use vigil_core::{init_logging, LoggingConfig, VigilResult};
use vigil_session::prelude::*;
use vigil_session::DocumentEvent;

struct DemoProvider {
    tx: broadcast::Sender<Option<Principal>>,
    current: Mutex<Option<Principal>>,
}

impl DemoProvider {
    fn new() -> Arc<Self> {
        let (tx, _) = broadcast::channel(16);
        Arc::new(Self {
            tx,
            current: Mutex::new(None),
        })
    }

    fn emit(&self, principal: Option<Principal>) {
        *self.current.lock().unwrap() = principal.clone();
        let _ = self.tx.send(principal);
    }
}

#[async_trait]
impl IdentityProvider for DemoProvider {
    fn subscribe(&self) -> broadcast::Receiver<Option<Principal>> {
        self.tx.subscribe()
    }

    async fn current_principal(&self) -> Option<Principal> {
        self.current.lock().unwrap().clone()
    }

    async fn sign_in_anonymously(&self) -> VigilResult<Principal> {
        let principal = Principal::anonymous("demo-anon");
        self.emit(Some(principal.clone()));
        Ok(principal)
    }

    async fn sign_in(&self, email: &str, _password: &str) -> VigilResult<Principal> {
        let principal = Principal::authenticated("demo-user", email);
        self.emit(Some(principal.clone()));
        Ok(principal)
    }

    async fn sign_out(&self) -> VigilResult<()> {
        self.emit(None);
        Ok(())
    }

    async fn create_account(&self, email: &str, _password: &str) -> VigilResult<Principal> {
        Ok(Principal::authenticated("demo-created", email))
    }

    async fn delete_account(&self, _principal: &Principal) -> VigilResult<()> {
        Ok(())
    }

    async fn refresh_token(&self) -> VigilResult<()> {
        Ok(())
    }

    async fn email_exists(&self, _email: &str) -> VigilResult<bool> {
        Ok(false)
    }
}

struct DemoDocs {
    docs: Mutex<HashMap<String, serde_json::Value>>,
    subs: Mutex<HashMap<String, broadcast::Sender<DocumentEvent>>>,
}

impl DemoDocs {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            docs: Mutex::new(HashMap::new()),
            subs: Mutex::new(HashMap::new()),
        })
    }

    fn sender_for(&self, path: &str) -> broadcast::Sender<DocumentEvent> {
        let mut subs = self.subs.lock().unwrap();
        subs.entry(path.to_string())
            .or_insert_with(|| broadcast::channel(16).0)
            .clone()
    }

    fn push_snapshot(&self, path: &str, value: serde_json::Value) {
        let _ = self.sender_for(path).send(DocumentEvent::Snapshot(value));
    }
}

#[async_trait]
impl DocumentStore for DemoDocs {
    async fn get_document(&self, path: &str) -> VigilResult<Option<serde_json::Value>> {
        Ok(self.docs.lock().unwrap().get(path).cloned())
    }

    async fn set_field(
        &self,
        path: &str,
        field: &str,
        value: serde_json::Value,
    ) -> VigilResult<()> {
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
        self.sender_for(path).subscribe()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_logging(&LoggingConfig::default())?;

    let provider = DemoProvider::new();
    let docs = DemoDocs::new();
    docs.docs.lock().unwrap().insert(
        "users/demo-user".to_string(),
        serde_json::json!({ "first_name": "Ada", "application_pin": "badpin" }),
    );

    let lifecycle = SessionLifecycle::builder(provider.clone(), docs.clone())
        .with_storage_dir(std::env::temp_dir().join("vigil-demo"))
        .build()
        .await?;

    let mut events = lifecycle.subscribe();
    lifecycle.start();

    provider.sign_in("ada@example.com", "s3cret").await?;
    println!("settled principal: {:?}", lifecycle.ready().await);

    // Let the login pipeline finish, then end every session remotely
    tokio::time::sleep(Duration::from_millis(100)).await;
    let record = lifecycle.local_record()?.expect("record after login");
    println!("local session: {}", record.session_id);

    docs.push_snapshot(
        "users/demo-user",
        serde_json::json!({
            "sessions": {},
            "sessions_invalidated_at": chrono::Utc::now(),
        }),
    );

    while let Ok(Ok(event)) = timeout(Duration::from_secs(2), events.recv()).await {
        println!("event: {:?}", event);
        if matches!(event, SessionEvent::ForcedLogout(_)) {
            break;
        }
    }

    Ok(())
}
