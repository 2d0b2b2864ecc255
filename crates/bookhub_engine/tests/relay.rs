mod common;

use std::sync::Arc;

use bookhub_core::{
    Ack, Collection, EnrichRequest, MetadataSource, Snapshot, SurfaceRecord, SurfaceResponse,
    SyncFinished, SyncTrigger,
};
use bookhub_engine::{
    relay_channel, with_auto_sync, Coordinator, LocalEnricher, MemorySnapshotStore, RelayClient,
    RelayError, SnapshotStore,
};
use chrono::{TimeZone, Utc};
use common::{book, init_logging, FakeHost, HostCall};
use pretty_assertions::assert_eq;
use serde_json::json;
use url::Url;

struct Harness {
    client: RelayClient,
    host: Arc<FakeHost>,
    store: Arc<MemorySnapshotStore>,
    coordinator: Arc<Coordinator>,
}

fn library_url() -> Url {
    Url::parse("https://read.amazon.co.jp/kindle-library").expect("url")
}

fn start(host: FakeHost) -> Harness {
    init_logging();
    let host = Arc::new(host);
    let store = Arc::new(MemorySnapshotStore::new());
    let coordinator = Arc::new(Coordinator::new(
        host.clone(),
        Arc::new(LocalEnricher),
        store.clone(),
        with_auto_sync(&library_url()),
    ));
    let (client, rx) = relay_channel();
    tokio::spawn(coordinator.clone().serve(rx));
    Harness {
        client,
        host,
        store,
        coordinator,
    }
}

#[tokio::test]
async fn get_snapshot_before_any_session_is_null() {
    let harness = start(FakeHost::new());

    assert_eq!(harness.client.get_snapshot().await, Ok(None));
    let raw = harness
        .client
        .send_raw(json!({"type": "bookhub:get-snapshot", "payload": {}}))
        .await
        .expect("response");
    assert_eq!(raw, serde_json::Value::Null);
}

#[tokio::test]
async fn get_snapshot_returns_the_stored_snapshot() {
    let harness = start(FakeHost::new());
    let collection: Collection = vec![book("B0AAAAAAA1", "Stored")].into_iter().collect();
    let snapshot = Snapshot::capture(
        &collection,
        library_url().to_string(),
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    );
    harness.store.write(&snapshot).await.expect("write");

    assert_eq!(harness.client.get_snapshot().await, Ok(Some(snapshot)));
}

#[tokio::test]
async fn sync_finished_for_an_untracked_tab_is_acknowledged_without_closing() {
    let harness = start(FakeHost::new());

    let ack = harness
        .client
        .for_tab(42)
        .sync_finished(SyncFinished::succeeded(3))
        .await
        .expect("ack");

    assert_eq!(ack, Ack { ok: true });
    assert!(harness.host.closes().is_empty());
}

#[tokio::test]
async fn start_sync_opens_a_tracked_surface_at_the_sync_url() {
    let harness = start(FakeHost::new());

    let response = harness.client.start_sync().await.expect("response");

    assert_eq!(response, SurfaceResponse::opened(1));
    assert_eq!(
        harness.host.calls(),
        vec![
            HostCall::Open(
                "https://read.amazon.co.jp/kindle-library?bookhub_sync=1".to_string()
            ),
            HostCall::KeepAlive(1),
        ]
    );
    assert_eq!(
        harness.coordinator.tracked_surfaces(),
        vec![SurfaceRecord {
            tab_id: 1,
            window_id: Some(101),
        }]
    );
}

#[tokio::test]
async fn finishing_a_tracked_surface_closes_its_window_and_forgets_it() {
    let harness = start(FakeHost::new());
    let opened = harness
        .client
        .open_surface(SyncTrigger::Page)
        .await
        .expect("open");
    let tab_id = opened.surface_id.expect("surface id");

    let ack = harness
        .client
        .for_tab(tab_id)
        .sync_finished(SyncFinished::succeeded(10))
        .await
        .expect("ack");

    assert!(ack.ok);
    assert_eq!(harness.host.closes(), vec![HostCall::CloseWindow(101)]);
    assert!(harness.coordinator.tracked_surfaces().is_empty());
}

#[tokio::test]
async fn surfaces_without_a_window_are_closed_by_tab() {
    let harness = start(FakeHost::windowless());
    harness.client.start_sync().await.expect("open");

    harness
        .client
        .for_tab(1)
        .sync_finished(SyncFinished::failed("boom"))
        .await
        .expect("ack");

    assert_eq!(harness.host.closes(), vec![HostCall::CloseTab(1)]);
}

#[tokio::test]
async fn explicit_keep_open_wins_over_tracking() {
    let harness = start(FakeHost::new());
    harness.client.start_sync().await.expect("open");

    harness
        .client
        .for_tab(1)
        .sync_finished(SyncFinished::succeeded(1).with_auto_close(Some(false)))
        .await
        .expect("ack");

    assert!(harness.host.closes().is_empty());
    assert!(harness.coordinator.tracked_surfaces().is_empty());
}

#[tokio::test]
async fn removal_before_completion_leaves_nothing_to_close() {
    let harness = start(FakeHost::new());
    harness.client.start_sync().await.expect("open");

    harness.coordinator.surface_removed(1);
    harness.coordinator.surface_removed(1);
    harness
        .client
        .for_tab(1)
        .sync_finished(SyncFinished::succeeded(2))
        .await
        .expect("ack");

    assert!(harness.host.closes().is_empty());
    assert!(harness.coordinator.tracked_surfaces().is_empty());
}

#[tokio::test]
async fn surface_open_failures_become_error_responses() {
    let harness = start(FakeHost::failing());

    let response = harness.client.start_sync().await.expect("response");

    assert_eq!(response, SurfaceResponse::failed("window limit reached"));
    assert!(harness.coordinator.tracked_surfaces().is_empty());
    let raw = serde_json::to_value(&response).expect("json");
    assert_eq!(raw, json!({"ok": false, "error": "window limit reached"}));
}

#[tokio::test]
async fn enrich_always_answers_with_a_record() {
    let harness = start(FakeHost::new());

    let record = harness
        .client
        .enrich(EnrichRequest {
            title: "【期間限定】 Sample   Title 第4巻".to_string(),
            identifier: Some("B0AAAAAAA1".to_string()),
            image_url: None,
        })
        .await
        .expect("record");

    assert_eq!(record.source, MetadataSource::Dom);
    assert_eq!(record.normalized_title.as_deref(), Some("Sample Title 第4巻"));
    assert_eq!(record.volume, Some(4));
}

#[tokio::test]
async fn malformed_messages_are_dropped_without_a_response() {
    let harness = start(FakeHost::new());

    let unknown = harness
        .client
        .send_raw(json!({"type": "bookhub:self-destruct", "payload": {}}))
        .await;
    assert_eq!(unknown, Err(RelayError::Dropped));

    let missing_payload = harness
        .client
        .send_raw(json!({"type": "bookhub:enrich-record"}))
        .await;
    assert_eq!(missing_payload, Err(RelayError::Dropped));

    // The coordinator keeps serving afterwards.
    assert_eq!(harness.client.get_snapshot().await, Ok(None));
}

#[tokio::test]
async fn requests_fail_with_closed_once_the_coordinator_is_gone() {
    let (client, rx) = relay_channel();
    drop(rx);

    assert_eq!(client.start_sync().await, Err(RelayError::Closed));
}
