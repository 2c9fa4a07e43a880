//! End-to-end: remote store -> sync engine -> mirror + broker -> forwarder.

use std::sync::Arc;

use bytes::Bytes;
use kv_mirror::ApiConfig;
use kv_mirror::BackoffPolicy;
use kv_mirror::BrokerConfig;
use kv_mirror::EngineState;
use kv_mirror::EventBroker;
use kv_mirror::Frame;
use kv_mirror::LeaseSweeper;
use kv_mirror::Mirror;
use kv_mirror::MirrorService;
use kv_mirror::RemoteError;
use kv_mirror::RemoteStore;
use kv_mirror::RetryPolicies;
use kv_mirror::SweeperConfig;
use kv_mirror::SyncEngine;
use serde_json::json;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::watch;

use crate::commons::eventually;
use crate::commons::within;
use crate::commons::FakeStore;
use crate::enable_logger;

fn retry() -> RetryPolicies {
    let policy = BackoffPolicy {
        max_retries: 5,
        timeout_ms: 1000,
        base_delay_ms: 20,
        max_delay_ms: 200,
    };
    RetryPolicies {
        load: policy,
        watch: policy,
    }
}

async fn next_json(rx: &mut mpsc::Receiver<Frame>) -> Value {
    loop {
        match within("frame", rx.recv()).await {
            Some(Frame::Text(text)) => return serde_json::from_str(&text).unwrap(),
            Some(Frame::Ping) => continue,
            None => panic!("sink closed"),
        }
    }
}

#[tokio::test]
async fn test_mirror_follows_remote_store() {
    enable_logger();
    let store = Arc::new(FakeStore::new());
    store.put("app/a", Bytes::from_static(b"1"), None).await.unwrap();
    store.put("app/b", Bytes::from_static(b"2"), None).await.unwrap();

    let mirror = Arc::new(Mirror::new());
    let broker = EventBroker::new(&BrokerConfig::default());
    broker.start();
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    let engine = SyncEngine::new(store.clone(), mirror.clone(), broker.clone(), "", retry());
    let mut state = engine.state();
    let engine_task = tokio::spawn(engine.run(shutdown_rx));
    within(
        "engine watching",
        state.wait_for(|s| matches!(s, EngineState::Watching { .. })),
    )
    .await
    .unwrap();

    // initial load
    let listing = mirror.list_subtree("app/");
    assert_eq!(listing.revision, 2);
    let segments: Vec<_> = listing.entries.iter().map(|e| e.segment.as_str()).collect();
    assert_eq!(segments, vec!["a", "b"]);

    let service = MirrorService::new(
        store.clone(),
        mirror.clone(),
        broker.clone(),
        ApiConfig {
            editable: true,
            ..Default::default()
        },
    );
    assert_eq!(service.get_value("app/b").await.unwrap(), Bytes::from_static(b"2"));

    // live subscriber interested in app/c
    let (sink_tx, mut sink_rx) = mpsc::channel(16);
    let (client_tx, client_rx) = mpsc::channel(16);
    let forwarder = tokio::spawn(service.subscribe(sink_tx, client_rx).run());
    client_tx.send(Bytes::from_static(br#"{"key":"app/c"}"#)).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let rev = service.put_value("app/c", Bytes::from_static(b"3")).await.unwrap();
    assert_eq!(rev, 3);
    assert_eq!(next_json(&mut sink_rx).await, json!({"key": "app/c", "value": "3", "rev": 3}));
    assert!(mirror.contains("app/c"));

    service.delete_value("app/a").await.unwrap();
    assert_eq!(next_json(&mut sink_rx).await, json!({"key": "app/a", "deleted": 1, "rev": 4}));
    assert!(!mirror.contains("app/a"));

    // a leased key whose expiry notification never arrives
    store.grant_lease(77, 30);
    store.put("session/x", Bytes::from_static(b"v"), Some(77)).await.unwrap();
    assert_eq!(next_json(&mut sink_rx).await, json!({"key": "session/x", "rev": 5}));
    assert!(mirror.contains("session/x"));

    store.expire_lease_silently(77);
    let sweeper = LeaseSweeper::new(store.clone(), mirror.clone(), broker.clone(), SweeperConfig::default());
    assert_eq!(sweeper.sweep_once().await, vec!["session/x".to_string()]);
    assert!(!mirror.contains("session/x"));
    assert!(mirror.list_subtree("session/").entries.is_empty());
    assert_eq!(
        next_json(&mut sink_rx).await,
        json!({"key": "session/x", "deleted": 1, "rev": 5})
    );

    shutdown_tx.send(()).unwrap();
    assert!(within("engine stop", engine_task).await.unwrap().is_ok());

    // stopping the broker ends every forwarder
    broker.stop().await;
    assert!(within("forwarder stop", forwarder).await.unwrap().is_ok());
}

#[tokio::test]
async fn test_watch_resumes_after_compaction() {
    enable_logger();
    let store = Arc::new(FakeStore::new());
    store.put("k", Bytes::from_static(b"1"), None).await.unwrap();
    store.fail_next_watch(RemoteError::Compacted { compact_revision: 10 });
    store.advance_revision(10);

    let mirror = Arc::new(Mirror::new());
    let broker = EventBroker::new(&BrokerConfig::default());
    broker.start();
    let mut sub = broker.subscribe();
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    let engine = SyncEngine::new(store.clone(), mirror.clone(), broker.clone(), "", retry());
    let engine_task = tokio::spawn(engine.run(shutdown_rx));

    let watcher = store.clone();
    eventually("watch resumed", || watcher.watch_starts().len() >= 2).await;
    // loaded at revision 10, first watch from 11 is refused as compacted at 10
    assert_eq!(store.watch_starts(), vec![11, 11]);

    store.put("k", Bytes::from_static(b"2"), None).await.unwrap();
    let event = within("event", sub.recv()).await.unwrap();
    assert_eq!(event.key, "k");
    assert_eq!(event.rev, 11);
    assert_eq!(mirror.revision(), 11);

    shutdown_tx.send(()).unwrap();
    assert!(within("engine stop", engine_task).await.unwrap().is_ok());
}

#[tokio::test]
async fn test_compaction_ahead_of_resume_point_skips_forward() {
    enable_logger();
    let store = Arc::new(FakeStore::new());
    store.put("k", Bytes::from_static(b"1"), None).await.unwrap();
    // history up to 50 is gone
    store.fail_next_watch(RemoteError::Compacted { compact_revision: 50 });

    let mirror = Arc::new(Mirror::new());
    let broker = EventBroker::new(&BrokerConfig::default());
    broker.start();
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    let engine = SyncEngine::new(store.clone(), mirror.clone(), broker.clone(), "", retry());
    let mut state = engine.state();
    let engine_task = tokio::spawn(engine.run(shutdown_rx));

    let watcher = store.clone();
    eventually("watch resumed", || watcher.watch_starts().len() >= 2).await;
    assert_eq!(store.watch_starts(), vec![2, 50]);
    assert_ne!(*state.borrow_and_update(), EngineState::Fatal);

    shutdown_tx.send(()).unwrap();
    assert!(within("engine stop", engine_task).await.unwrap().is_ok());
}
