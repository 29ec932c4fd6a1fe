//! Stockpile event delivery.
//!
//! The repository publishes [`AssetEvent`]s onto a bounded queue (see
//! [`stockpile_core::event`]). This crate provides the single consumer:
//!
//! - [`EventProcessor`]: drains the queue and hands every event to its sinks.
//! - [`EventSink`]: a delivery target.
//! - [`LogSink`]: writes each event to the tracing log.
//! - [`PersistenceSink`]: stores each event in the `asset_events` table.

pub mod processor;
pub mod sink;

pub use processor::EventProcessor;
pub use sink::{EventSink, LogSink, PersistenceSink, SinkError};
pub use stockpile_core::event::AssetEvent;
