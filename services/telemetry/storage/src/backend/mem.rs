//! In-memory storage backend.

use crate::models::{Node, Packet, PacketSeen, Traceroute};
use crate::{NodeFilter, PacketFilter, PurgeStats, StorageError, Store};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory [`Store`] implementation.
pub struct MemoryStore {
    /// Nodes keyed by user-id string.
    nodes: DashMap<String, Node>,
    /// Numeric address -> user-id index for nodes with a known address.
    addr_index: DashMap<u64, String>,
    /// Packets keyed by message id.
    packets: DashMap<u64, Packet>,
    /// Sightings keyed by (packet id, node address, rx_time).
    seen: DashMap<(u64, u64, u64), PacketSeen>,
    /// Traceroute rows in insertion (import) order.
    traceroutes: RwLock<Vec<Traceroute>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            nodes: DashMap::new(),
            addr_index: DashMap::new(),
            packets: DashMap::new(),
            seen: DashMap::new(),
            traceroutes: RwLock::new(Vec::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_node(&self, user_id: &str) -> Result<Option<Node>, StorageError> {
        Ok(self.nodes.get(user_id).map(|n| n.clone()))
    }

    async fn get_node_by_addr(&self, node_id: u64) -> Result<Option<Node>, StorageError> {
        let Some(user_id) = self.addr_index.get(&node_id).map(|id| id.clone()) else {
            return Ok(None);
        };
        Ok(self.nodes.get(&user_id).map(|n| n.clone()))
    }

    async fn put_node(&self, node: Node) -> Result<(), StorageError> {
        debug!(id = %node.id, addr = ?node.node_id, "node upsert");
        if let Some(addr) = node.node_id {
            self.addr_index.insert(addr, node.id.clone());
        }
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    async fn get_nodes(&self, filter: NodeFilter) -> Result<Vec<Node>, StorageError> {
        let mut nodes: Vec<Node> = self
            .nodes
            .iter()
            .filter(|n| {
                filter.role.as_ref().map_or(true, |r| n.role.as_deref() == Some(r.as_str()))
                    && filter
                        .channel
                        .as_ref()
                        .map_or(true, |c| n.channel.as_deref() == Some(c.as_str()))
                    && filter
                        .hw_model
                        .as_ref()
                        .map_or(true, |h| n.hw_model.as_deref() == Some(h.as_str()))
            })
            .map(|n| n.clone())
            .collect();
        nodes.sort_by(|a, b| b.last_update.cmp(&a.last_update));
        Ok(nodes)
    }

    async fn insert_packet(&self, packet: Packet) -> Result<bool, StorageError> {
        // The entry API makes the insert-or-ignore atomic; a relay racing on
        // the same message id sees Occupied and backs off without error.
        match self.packets.entry(packet.id) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                debug!(id = packet.id, portnum = ?packet.portnum, "packet stored");
                slot.insert(packet);
                Ok(true)
            }
        }
    }

    async fn get_packet(&self, id: u64) -> Result<Option<Packet>, StorageError> {
        Ok(self.packets.get(&id).map(|p| p.clone()))
    }

    async fn get_packets(&self, filter: PacketFilter) -> Result<Vec<Packet>, StorageError> {
        let mut packets: Vec<Packet> = self
            .packets
            .iter()
            .filter(|p| {
                filter.portnum.map_or(true, |port| p.portnum == Some(port))
                    && filter
                        .node_id
                        .map_or(true, |n| p.from_node_id == n || p.to_node_id == n)
                    && filter.channel.as_ref().map_or(true, |c| &p.channel == c)
                    && filter.since.map_or(true, |t| p.import_time > t)
            })
            .map(|p| p.clone())
            .collect();
        packets.sort_by(|a, b| b.import_time.cmp(&a.import_time));
        if let Some(limit) = filter.limit {
            packets.truncate(limit);
        }
        Ok(packets)
    }

    async fn seen_exists(
        &self,
        packet_id: u64,
        node_id: u64,
        rx_time: u64,
    ) -> Result<bool, StorageError> {
        Ok(self.seen.contains_key(&(packet_id, node_id, rx_time)))
    }

    async fn insert_seen(&self, seen: PacketSeen) -> Result<(), StorageError> {
        let key = (seen.packet_id, seen.node_id, seen.rx_time);
        self.seen.insert(key, seen);
        Ok(())
    }

    async fn get_packets_seen(&self, packet_id: u64) -> Result<Vec<PacketSeen>, StorageError> {
        let mut rows: Vec<PacketSeen> = self
            .seen
            .iter()
            .filter(|s| s.packet_id == packet_id)
            .map(|s| s.clone())
            .collect();
        rows.sort_by_key(|s| s.rx_time);
        Ok(rows)
    }

    async fn zero_hop_seen_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<(PacketSeen, Packet)>, StorageError> {
        let mut rows = Vec::new();
        for entry in self.seen.iter() {
            let s = entry.value();
            if s.hop_start != 0 && s.hop_limit == s.hop_start && s.import_time > since {
                if let Some(packet) = self.packets.get(&s.packet_id) {
                    rows.push((s.clone(), packet.clone()));
                }
            }
        }
        Ok(rows)
    }

    async fn insert_traceroute(&self, traceroute: Traceroute) -> Result<(), StorageError> {
        debug!(
            packet_id = traceroute.packet_id,
            done = traceroute.done,
            "traceroute stored"
        );
        self.traceroutes.write().await.push(traceroute);
        Ok(())
    }

    async fn get_traceroutes_for(
        &self,
        packet_id: u64,
    ) -> Result<Vec<Traceroute>, StorageError> {
        Ok(self
            .traceroutes
            .read()
            .await
            .iter()
            .filter(|t| t.packet_id == packet_id)
            .cloned()
            .collect())
    }

    async fn traceroutes_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Traceroute>, StorageError> {
        Ok(self
            .traceroutes
            .read()
            .await
            .iter()
            .filter(|t| t.import_time > since)
            .cloned()
            .collect())
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<PurgeStats, StorageError> {
        let mut stats = PurgeStats::default();

        let before = self.packets.len();
        self.packets.retain(|_, p| p.import_time >= cutoff);
        stats.packets = before - self.packets.len();

        let before = self.seen.len();
        self.seen.retain(|_, s| s.import_time >= cutoff);
        stats.seen = before - self.seen.len();

        let mut traceroutes = self.traceroutes.write().await;
        let before = traceroutes.len();
        traceroutes.retain(|t| t.import_time >= cutoff);
        stats.traceroutes = before - traceroutes.len();

        Ok(stats)
    }
}
