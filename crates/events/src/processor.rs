//! Single consumer of the asset event queue.
//!
//! [`EventProcessor`] runs as a long-lived background task. It forwards each
//! received event to every configured sink in order and exits once all
//! senders are dropped and the queue is drained.

use std::sync::Arc;

use stockpile_core::event::AssetEvent;
use tokio::sync::mpsc;

use crate::sink::EventSink;

pub struct EventProcessor {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl EventProcessor {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    /// Number of configured sinks.
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Drain `receiver` until the queue closes. Returns the number of events
    /// processed.
    pub async fn run(self, mut receiver: mpsc::Receiver<AssetEvent>) -> u64 {
        let sink_names: Vec<&str> = self.sinks.iter().map(|s| s.name()).collect();
        tracing::info!(sinks = ?sink_names, "Event processor started");

        let mut processed = 0u64;
        while let Some(event) = receiver.recv().await {
            self.dispatch(&event).await;
            processed += 1;
        }

        tracing::info!(processed, "Event queue closed, processor shutting down");
        processed
    }

    async fn dispatch(&self, event: &AssetEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.deliver(event).await {
                tracing::error!(
                    sink = sink.name(),
                    event_type = %event.event_type,
                    error = %e,
                    "Failed to deliver event"
                );
            }
        }
    }
}
