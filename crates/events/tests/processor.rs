//! Event processor behaviour with in-test sinks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use stockpile_core::asset::Asset;
use stockpile_core::event::{event_channel, AssetEvent, EventKind};
use stockpile_core::types::Document;
use stockpile_events::{EventProcessor, EventSink, LogSink, SinkError};
use tokio::sync::Mutex;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RecordingSink {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl EventSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn deliver(&self, event: &AssetEvent) -> Result<(), SinkError> {
        self.seen.lock().await.push(event.event_type.clone());
        Ok(())
    }
}

#[derive(Default)]
struct FailingSink {
    attempts: AtomicUsize,
}

#[async_trait]
impl EventSink for FailingSink {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn deliver(&self, _event: &AssetEvent) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(SinkError::Rejected("unavailable".into()))
    }
}

fn asset(id: &str) -> Asset {
    Asset::new("server", id, Document::new())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delivers_in_order_and_stops_when_senders_drop() {
    let recorder = Arc::new(RecordingSink::default());
    let processor = EventProcessor::new(vec![
        recorder.clone() as Arc<dyn EventSink>,
        Arc::new(LogSink),
    ]);
    assert_eq!(processor.sink_count(), 2);

    let (tx, rx) = event_channel(4);
    let handle = tokio::spawn(processor.run(rx));

    tx.publish(AssetEvent::for_type(EventKind::Created, "server"))
        .await;
    tx.publish(AssetEvent::for_asset(EventKind::Created, &asset("srv1")))
        .await;
    tx.publish(AssetEvent::for_asset(EventKind::Deleted, &asset("srv1")))
        .await;
    drop(tx);

    let processed = handle.await.unwrap();
    assert_eq!(processed, 3);
    assert_eq!(
        *recorder.seen.lock().await,
        vec!["created.server", "created.server.srv1", "deleted.server.srv1"]
    );
}

#[tokio::test]
async fn failing_sink_does_not_block_others() {
    let failing = Arc::new(FailingSink::default());
    let recorder = Arc::new(RecordingSink::default());
    let processor = EventProcessor::new(vec![
        failing.clone() as Arc<dyn EventSink>,
        recorder.clone(),
    ]);

    let (tx, rx) = event_channel(1);
    let handle = tokio::spawn(processor.run(rx));

    for id in ["a", "b", "c"] {
        tx.publish(AssetEvent::for_asset(EventKind::Updated, &asset(id)))
            .await;
    }
    drop(tx);

    assert_eq!(handle.await.unwrap(), 3);
    assert_eq!(failing.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(recorder.seen.lock().await.len(), 3);
}

#[tokio::test]
async fn publish_after_processor_exit_is_dropped() {
    let (tx, rx) = event_channel(1);
    drop(rx);
    // Must return instead of waiting on a closed queue.
    tx.publish(AssetEvent::for_type(EventKind::Created, "server"))
        .await;
}
