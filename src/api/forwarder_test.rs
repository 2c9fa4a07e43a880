use std::time::Duration;

use bytes::Bytes;
use serde_json::json;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::*;
use crate::test_utils::enable_logger;
use crate::ApiConfig;
use crate::BrokerConfig;
use crate::ChangeEvent;
use crate::Error;
use crate::EventBroker;

fn config() -> ApiConfig {
    ApiConfig {
        ping_period_secs: 240,
        write_timeout_secs: 10,
        ..Default::default()
    }
}

fn started_broker() -> EventBroker {
    let broker = EventBroker::new(&BrokerConfig::default());
    broker.start();
    broker
}

async fn next_frame(rx: &mut mpsc::Receiver<Frame>) -> Frame {
    timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("frame within deadline")
        .expect("sink open")
}

fn text(frame: Frame) -> Value {
    match frame {
        Frame::Text(text) => serde_json::from_str(&text).unwrap(),
        Frame::Ping => panic!("expected text frame"),
    }
}

#[tokio::test]
async fn test_updates_follow_key_of_interest() {
    enable_logger();
    let broker = started_broker();
    let (sink_tx, mut sink_rx) = mpsc::channel(16);
    let (client_tx, client_rx) = mpsc::channel(16);
    let forwarder = Forwarder::new(broker.subscribe(), sink_tx, client_rx, config());
    let task = tokio::spawn(forwarder.run());

    client_tx.send(Bytes::from_static(br#"{"key":"a"}"#)).await.unwrap();
    // let the forwarder take the key before publishing
    tokio::time::sleep(Duration::from_millis(10)).await;

    broker.publish(ChangeEvent::put("a", "1", 5, None));
    broker.publish(ChangeEvent::put("b", "2", 6, None));
    broker.publish(ChangeEvent::delete("b", 7));

    assert_eq!(text(next_frame(&mut sink_rx).await), json!({"key": "a", "value": "1", "rev": 5}));
    assert_eq!(text(next_frame(&mut sink_rx).await), json!({"key": "b", "rev": 6}));
    assert_eq!(text(next_frame(&mut sink_rx).await), json!({"key": "b", "deleted": 1, "rev": 7}));

    // client leaves: forwarder ends and releases its subscription
    drop(client_tx);
    assert!(task.await.unwrap().is_ok());
    assert_eq!(broker.subscriber_count().await, 0);
}

#[tokio::test]
async fn test_malformed_client_message_keeps_connection() {
    enable_logger();
    let broker = started_broker();
    let (sink_tx, mut sink_rx) = mpsc::channel(16);
    let (client_tx, client_rx) = mpsc::channel(16);
    let forwarder = Forwarder::new(broker.subscribe(), sink_tx, client_rx, config());
    let task = tokio::spawn(forwarder.run());

    client_tx.send(Bytes::from_static(br#"{"key":"a"}"#)).await.unwrap();
    client_tx.send(Bytes::from_static(b"{{garbage")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    broker.publish(ChangeEvent::put("a", "1", 5, None));
    // the earlier key of interest survives the bad message
    assert_eq!(text(next_frame(&mut sink_rx).await), json!({"key": "a", "value": "1", "rev": 5}));
    assert!(!task.is_finished());

    drop(client_tx);
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_idle_subscription_emits_heartbeat() {
    enable_logger();
    let broker = started_broker();
    let (sink_tx, mut sink_rx) = mpsc::channel(16);
    let (_client_tx, client_rx) = mpsc::channel(16);
    let forwarder = Forwarder::new(broker.subscribe(), sink_tx, client_rx, config());
    let _task = tokio::spawn(forwarder.run());

    // paused clock jumps straight to the next deadline
    assert_eq!(sink_rx.recv().await, Some(Frame::Ping));
    assert_eq!(sink_rx.recv().await, Some(Frame::Ping));
}

#[tokio::test]
async fn test_broker_stop_ends_forwarder() {
    enable_logger();
    let broker = started_broker();
    let (sink_tx, _sink_rx) = mpsc::channel::<Frame>(16);
    let (_client_tx, client_rx) = mpsc::channel(16);
    let forwarder = Forwarder::new(broker.subscribe(), sink_tx, client_rx, config());
    let task = tokio::spawn(forwarder.run());

    broker.stop().await;
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_failed_write_ends_forwarder_and_unsubscribes() {
    enable_logger();
    let broker = started_broker();
    let mut sink = MockUpdateSink::new();
    sink.expect_send().times(1).returning(|_| Err(Error::SinkClosed));
    let (_client_tx, client_rx) = mpsc::channel(16);
    let forwarder = Forwarder::new(broker.subscribe(), sink, client_rx, config());
    let task = tokio::spawn(forwarder.run());

    broker.publish(ChangeEvent::put("a", "1", 5, None));

    assert!(matches!(task.await.unwrap(), Err(Error::SinkClosed)));
    assert_eq!(broker.subscriber_count().await, 0);
}
