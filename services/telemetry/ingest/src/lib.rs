//! MQTT uplink consumer and idempotent ingestion pipeline.
//!
//! Three long-lived tasks share one store handle:
//!
//! - the [consumer] subscribes to broker topics, decodes and decrypts
//!   envelopes, and feeds survivors into a bounded channel,
//! - the [processor] drains that channel one envelope at a time and commits
//!   packet, sighting, and enrichment rows with dedup guarantees,
//! - the [retention] sweep periodically deletes rows past a maximum age.
//!
//! The processor and the retention sweep serialize on a shared async lock so
//! a bulk delete never interleaves with an in-flight envelope commit. All
//! tasks watch a shutdown signal checked at every suspension point.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod consumer;
pub mod processor;
pub mod retention;

pub use consumer::{run_consumer, ConsumerSettings, EnvelopeEvent};
pub use processor::Processor;
pub use retention::{run_retention, RetentionSettings};

use telemetry_storage::StorageError;
use thiserror::Error;

/// Ingestion pipeline errors.
#[derive(Error, Debug)]
pub enum IngestError {
    /// A storage operation failed; aborts the current envelope only.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
