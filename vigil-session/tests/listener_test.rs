//! Registry listener and forced-logout integration tests

mod common;

use chrono::{DateTime, Utc};
use common::*;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::time::Duration;
use vigil_session::session::new_shared_flags;
use vigil_session::{
    EventBus, ForcedLogoutPayload, LocalSessionRecord, LocalSessionStore, LogoutDispatcher,
    LogoutReason, Principal, SessionLifecycle,
};

const USER_DOC: &str = "users/user-1";

/// Build a remote record carrying the given session ids and marker
fn registry_snapshot(session_ids: &[&str], marker: Option<DateTime<Utc>>) -> serde_json::Value {
    let mut sessions = serde_json::Map::new();
    for id in session_ids {
        sessions.insert(
            id.to_string(),
            serde_json::json!({ "device_label": "office laptop", "active": true }),
        );
    }

    let mut doc = serde_json::json!({ "sessions": sessions });
    if let Some(marker) = marker {
        doc["sessions_invalidated_at"] = serde_json::json!(marker);
    }
    doc
}

/// Start a lifecycle and drive it to an authenticated login
async fn login(
    provider: &Arc<MockIdentityProvider>,
    store: &Arc<MockDocumentStore>,
    dir: &tempfile::TempDir,
) -> (SessionLifecycle, LocalSessionRecord) {
    let lifecycle = SessionLifecycle::builder(provider.clone(), store.clone())
        .with_storage_dir(dir.path())
        .build()
        .await
        .expect("lifecycle should build");

    lifecycle.start();
    settle().await;

    provider.emit(Some(Principal::authenticated("user-1", "ada@example.com")));
    settle().await;

    let record = lifecycle
        .local_record()
        .unwrap()
        .expect("record after login");
    (lifecycle, record)
}

#[tokio::test(start_paused = true)]
async fn invalidation_marker_is_honored_inside_the_grace_window() {
    let provider = MockIdentityProvider::new();
    let store = MockDocumentStore::new();
    let dir = tempfile::tempdir().unwrap();
    let (lifecycle, record) = login(&provider, &store, &dir).await;
    let mut rx = lifecycle.subscribe();

    // Still well inside the 8s grace window: an admin invalidation lands
    // immediately, it is never deferred
    store.push_snapshot(
        USER_DOC,
        registry_snapshot(&[&record.session_id], Some(record.issued_at)),
    );
    settle().await;

    let logouts = forced_logouts(&mut rx);
    assert_eq!(logouts.len(), 1);
    assert_eq!(logouts[0].reason, LogoutReason::SessionInvalidated);
    assert!(lifecycle.local_record().unwrap().is_none());
    assert_eq!(provider.sign_out_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn grace_window_absorbs_registration_propagation_delay() {
    let provider = MockIdentityProvider::new();
    let store = MockDocumentStore::new();
    let dir = tempfile::tempdir().unwrap();
    let (lifecycle, _record) = login(&provider, &store, &dir).await;
    let mut rx = lifecycle.subscribe();

    // 2s after login the registry write has not propagated yet; the
    // missing entry is staleness, not revocation
    tokio::time::advance(Duration::from_secs(2)).await;
    store.push_snapshot(USER_DOC, registry_snapshot(&["other-device"], None));
    settle().await;

    assert!(forced_logouts(&mut rx).is_empty());
    assert!(lifecycle.local_record().unwrap().is_some());

    // 9s after login the window has passed; the same shape now means the
    // entry was removed
    tokio::time::advance(Duration::from_secs(7)).await;
    store.push_snapshot(USER_DOC, registry_snapshot(&["other-device"], None));
    settle().await;

    let logouts = forced_logouts(&mut rx);
    assert_eq!(logouts.len(), 1);
    assert_eq!(logouts[0].reason, LogoutReason::SessionRemoved);
    assert!(lifecycle.local_record().unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn present_session_survives_past_the_grace_window() {
    let provider = MockIdentityProvider::new();
    let store = MockDocumentStore::new();
    let dir = tempfile::tempdir().unwrap();
    let (lifecycle, record) = login(&provider, &store, &dir).await;
    let mut rx = lifecycle.subscribe();

    tokio::time::advance(Duration::from_secs(10)).await;
    store.push_snapshot(
        USER_DOC,
        registry_snapshot(&[&record.session_id, "other-device"], None),
    );
    settle().await;

    assert!(forced_logouts(&mut rx).is_empty());
    assert!(lifecycle.local_record().unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn session_issued_after_the_marker_is_untouched() {
    let provider = MockIdentityProvider::new();
    let store = MockDocumentStore::new();
    let dir = tempfile::tempdir().unwrap();
    let (lifecycle, record) = login(&provider, &store, &dir).await;
    let mut rx = lifecycle.subscribe();

    // Marker predates this session's issuance: a previous close-all that
    // this login already postdates
    let stale_marker = record.issued_at - chrono::Duration::seconds(1);
    store.push_snapshot(
        USER_DOC,
        registry_snapshot(&[&record.session_id], Some(stale_marker)),
    );
    settle().await;

    assert!(forced_logouts(&mut rx).is_empty());
    assert!(lifecycle.local_record().unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn admin_close_all_logs_the_device_out_exactly_once() {
    let provider = MockIdentityProvider::new();
    let store = MockDocumentStore::new();
    let dir = tempfile::tempdir().unwrap();
    let (lifecycle, record) = login(&provider, &store, &dir).await;
    let mut rx = lifecycle.subscribe();

    // Admin ends every session half a second after this login
    let marker = record.issued_at + chrono::Duration::milliseconds(500);
    let snapshot = registry_snapshot(&[&record.session_id], Some(marker));

    // The registry typically re-delivers the snapshot while the logout is
    // still underway
    store.push_snapshot(USER_DOC, snapshot.clone());
    store.push_snapshot(USER_DOC, snapshot);
    settle().await;

    let logouts = forced_logouts(&mut rx);
    assert_eq!(logouts.len(), 1);
    assert_eq!(logouts[0].reason, LogoutReason::SessionInvalidated);
    assert_eq!(provider.sign_out_calls.load(Ordering::SeqCst), 1);
    assert!(lifecycle.local_record().unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn permission_denied_detaches_quietly() {
    let provider = MockIdentityProvider::new();
    let store = MockDocumentStore::new();
    let dir = tempfile::tempdir().unwrap();
    let (lifecycle, record) = login(&provider, &store, &dir).await;
    let mut rx = lifecycle.subscribe();

    store.push_permission_denied(USER_DOC);
    settle().await;

    // Whatever arrives afterwards is never evaluated
    store.push_snapshot(
        USER_DOC,
        registry_snapshot(&[&record.session_id], Some(Utc::now())),
    );
    settle().await;

    assert!(forced_logouts(&mut rx).is_empty());
    assert!(lifecycle.local_record().unwrap().is_some());
    assert_eq!(provider.sign_out_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn unparseable_snapshot_is_skipped() {
    let provider = MockIdentityProvider::new();
    let store = MockDocumentStore::new();
    let dir = tempfile::tempdir().unwrap();
    let (lifecycle, record) = login(&provider, &store, &dir).await;
    let mut rx = lifecycle.subscribe();

    store.push_snapshot(
        USER_DOC,
        serde_json::json!({ "sessions": "definitely not a map" }),
    );
    settle().await;

    assert!(forced_logouts(&mut rx).is_empty());
    assert!(lifecycle.local_record().unwrap().is_some());

    // The subscription itself stays live for the next good snapshot
    store.push_snapshot(
        USER_DOC,
        registry_snapshot(&[&record.session_id], Some(record.issued_at)),
    );
    settle().await;
    assert_eq!(forced_logouts(&mut rx).len(), 1);
}

#[tokio::test]
async fn forced_logout_is_single_flight() {
    let provider = MockIdentityProvider::new();
    let dir = tempfile::tempdir().unwrap();
    let local = Arc::new(LocalSessionStore::new(dir.path()).unwrap());
    local.save_record(&LocalSessionRecord::new()).unwrap();

    let events = EventBus::new(16);
    let mut rx = events.subscribe();
    let dispatcher = LogoutDispatcher::new(
        provider.clone(),
        local.clone(),
        events.clone(),
        new_shared_flags(),
    );

    // Both detection paths fire for the same trigger; only the first runs
    tokio::join!(
        dispatcher.force_logout(ForcedLogoutPayload::invalidated()),
        dispatcher.force_logout(ForcedLogoutPayload::removed()),
    );

    let logouts = forced_logouts(&mut rx);
    assert_eq!(logouts.len(), 1);
    assert_eq!(provider.sign_out_calls.load(Ordering::SeqCst), 1);
    assert!(local.load_record().unwrap().is_none());
}

#[tokio::test]
async fn forced_logout_cleans_up_even_without_subscribers() {
    let provider = MockIdentityProvider::new();
    let dir = tempfile::tempdir().unwrap();
    let local = Arc::new(LocalSessionStore::new(dir.path()).unwrap());
    local.save_record(&LocalSessionRecord::new()).unwrap();

    let dispatcher = LogoutDispatcher::new(
        provider.clone(),
        local.clone(),
        EventBus::new(16),
        new_shared_flags(),
    );

    dispatcher
        .force_logout(ForcedLogoutPayload::invalidated())
        .await;

    assert!(local.load_record().unwrap().is_none());
    assert_eq!(provider.sign_out_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn single_flight_guard_rearms_on_the_next_login() {
    let provider = MockIdentityProvider::new();
    let store = MockDocumentStore::new();
    let dir = tempfile::tempdir().unwrap();
    let (lifecycle, record) = login(&provider, &store, &dir).await;
    let mut rx = lifecycle.subscribe();

    store.push_snapshot(
        USER_DOC,
        registry_snapshot(&[&record.session_id], Some(record.issued_at)),
    );
    settle().await;
    assert_eq!(forced_logouts(&mut rx).len(), 1);

    // The user signs back in; a fresh trigger must fire again
    provider.emit(Some(Principal::authenticated("user-1", "ada@example.com")));
    settle().await;
    let next = lifecycle.local_record().unwrap().expect("record after relogin");
    assert_ne!(next.session_id, record.session_id);

    store.push_snapshot(
        USER_DOC,
        registry_snapshot(&[&next.session_id], Some(next.issued_at)),
    );
    settle().await;

    assert_eq!(forced_logouts(&mut rx).len(), 1);
    assert_eq!(provider.sign_out_calls.load(Ordering::SeqCst), 2);
}
