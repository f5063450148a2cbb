//! Normalized event history for telemetry: nodes, packets, sightings, and
//! traceroutes, behind a pluggable storage boundary.
//!
//! The ingester needs four guarantees from its store, not a particular
//! engine: point lookup by key, insert-or-ignore by unique key, filtered
//! range scan ordered by timestamp, and upsert-by-key. The [`Store`] trait
//! captures exactly that boundary; the in-memory backend implements it for
//! development and tests.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod models;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

pub use backend::mem::MemoryStore;
pub use models::{Node, Packet, PacketSeen, Traceroute};

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Data corruption detected
    #[error("Data corruption: {0}")]
    Corruption(String),
    /// Backend-specific error
    #[error("Backend error: {0}")]
    Backend(String),
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Filters for packet range scans. Unset fields match everything.
#[derive(Clone, Debug, Default)]
pub struct PacketFilter {
    /// Only packets on this application port.
    pub portnum: Option<i32>,
    /// Only packets sent from or to this node address.
    pub node_id: Option<u64>,
    /// Only packets on this channel label.
    pub channel: Option<String>,
    /// Only packets imported after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Cap on returned rows (newest first).
    pub limit: Option<usize>,
}

/// Filters for node listings. Unset fields match everything.
#[derive(Clone, Debug, Default)]
pub struct NodeFilter {
    /// Only nodes with this role name.
    pub role: Option<String>,
    /// Only nodes last heard on this channel.
    pub channel: Option<String>,
    /// Only nodes with this hardware model name.
    pub hw_model: Option<String>,
}

/// Row counts removed by a retention sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PurgeStats {
    /// Packet rows deleted.
    pub packets: usize,
    /// Sighting rows deleted.
    pub seen: usize,
    /// Traceroute rows deleted.
    pub traceroutes: usize,
}

/// The storage boundary consumed by the ingester and the topology builder.
///
/// Uniqueness guarantees: at most one [`Packet`] per message id, at most one
/// [`Node`] per user-id string, at most one [`PacketSeen`] per
/// (packet, node, rx_time) triple. Writers serialize per envelope; readers
/// see committed rows only.
#[async_trait]
pub trait Store: Send + Sync {
    /// Point lookup of a node by its user-id string (the primary key).
    async fn get_node(&self, user_id: &str) -> Result<Option<Node>, StorageError>;

    /// Point lookup of a node by its numeric radio address.
    async fn get_node_by_addr(&self, node_id: u64) -> Result<Option<Node>, StorageError>;

    /// Upsert a node by user-id string.
    async fn put_node(&self, node: Node) -> Result<(), StorageError>;

    /// List nodes matching a filter.
    async fn get_nodes(&self, filter: NodeFilter) -> Result<Vec<Node>, StorageError>;

    /// Insert-or-ignore a packet keyed on message id.
    ///
    /// Returns whether a new row was created. Concurrent duplicate delivery
    /// must resolve to exactly one row with no error to either caller.
    async fn insert_packet(&self, packet: Packet) -> Result<bool, StorageError>;

    /// Point lookup of a packet by message id.
    async fn get_packet(&self, id: u64) -> Result<Option<Packet>, StorageError>;

    /// Range scan of packets matching a filter, newest first.
    async fn get_packets(&self, filter: PacketFilter) -> Result<Vec<Packet>, StorageError>;

    /// Whether a sighting with this composite key already exists.
    async fn seen_exists(
        &self,
        packet_id: u64,
        node_id: u64,
        rx_time: u64,
    ) -> Result<bool, StorageError>;

    /// Insert a sighting row.
    async fn insert_seen(&self, seen: PacketSeen) -> Result<(), StorageError>;

    /// All sightings of one packet.
    async fn get_packets_seen(&self, packet_id: u64) -> Result<Vec<PacketSeen>, StorageError>;

    /// Sightings received with their full hop budget intact (hop_limit ==
    /// hop_start != 0, i.e. heard directly), joined with their packet.
    async fn zero_hop_seen_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<(PacketSeen, Packet)>, StorageError>;

    /// Insert a traceroute row.
    async fn insert_traceroute(&self, traceroute: Traceroute) -> Result<(), StorageError>;

    /// All traceroute rows tied to one packet.
    async fn get_traceroutes_for(&self, packet_id: u64)
        -> Result<Vec<Traceroute>, StorageError>;

    /// Traceroute rows imported after an instant, oldest first.
    async fn traceroutes_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Traceroute>, StorageError>;

    /// Delete packet/sighting/traceroute rows older than the cutoff.
    /// Nodes are never purged.
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<PurgeStats, StorageError>;
}

/// Storage backend configuration
#[derive(Clone, Debug, Default)]
pub enum StorageMode {
    /// In-memory storage (dev/tests and small deployments)
    #[default]
    InMemory,
}

impl StorageMode {
    /// Create a store from configuration.
    pub fn open(&self) -> Result<Arc<dyn Store>, StorageError> {
        match self {
            StorageMode::InMemory => Ok(Arc::new(MemoryStore::new())),
        }
    }
}
