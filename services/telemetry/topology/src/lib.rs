//! On-demand topology reconstruction from stored mesh evidence.
//!
//! Three independent, noisy, partially-overlapping evidence sources are
//! reconciled into one directed weighted graph:
//!
//! - completed and in-flight traceroute paths (`traceroute` edges),
//! - neighbor table broadcasts (`neighbor` edges),
//! - zero-hop sightings by uplinking gateways (`sni` edges).
//!
//! The builder is pull-based: it runs per request over a lookback window,
//! holds no state between calls, and only reads from the store. An optional
//! root node restricts the result to a bounded-depth reachability subgraph
//! with traversal-local edge weights.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod graph;

pub use graph::{build_topology, Edge, EdgeKind, GraphNode, TopologyGraph, TopologyQuery};

use telemetry_storage::StorageError;
use thiserror::Error;

/// Topology builder errors.
#[derive(Error, Debug)]
pub enum TopologyError {
    /// The store could not be read.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
