//! Row types for the normalized event history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A mesh participant.
///
/// Identity is the user-id string; the numeric radio address may be learned
/// after first contact and is unique when present.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Stable identity string, conventionally `!<8-hex-digit>`.
    pub id: String,
    /// Numeric radio address, absent until first node-info or map-report.
    pub node_id: Option<u64>,
    /// Full display name.
    pub long_name: Option<String>,
    /// Short display name.
    pub short_name: Option<String>,
    /// Hardware model name (or `unknown(code)` sentinel).
    pub hw_model: Option<String>,
    /// Firmware version string.
    pub firmware: Option<String>,
    /// Device role name (or `unknown(code)` sentinel).
    pub role: Option<String>,
    /// Last known latitude × 1e7.
    pub last_lat: Option<i64>,
    /// Last known longitude × 1e7.
    pub last_long: Option<i64>,
    /// Channel label the node was last heard on.
    pub channel: Option<String>,
    /// When the node was first recorded.
    pub first_seen: DateTime<Utc>,
    /// When the node record was last updated.
    pub last_update: DateTime<Utc>,
}

impl Node {
    /// A fresh node record carrying only its identity.
    pub fn new(id: String, node_id: Option<u64>) -> Self {
        let now = Utc::now();
        Self {
            id,
            node_id,
            long_name: None,
            short_name: None,
            hw_model: None,
            firmware: None,
            role: None,
            last_lat: None,
            last_long: None,
            channel: None,
            first_seen: now,
            last_update: now,
        }
    }
}

/// One uniquely-identified mesh message. Immutable once stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    /// Message id assigned by the originating radio.
    pub id: u64,
    /// Application port number of the decoded section, if any.
    pub portnum: Option<i32>,
    /// Originating node address.
    pub from_node_id: u64,
    /// Destination node address.
    pub to_node_id: u64,
    /// The serialized mesh frame as received.
    pub payload: Vec<u8>,
    /// When the packet was first stored (microsecond precision).
    pub import_time: DateTime<Utc>,
    /// Channel label from the envelope.
    pub channel: String,
}

/// One observation of a packet by one uplinking node. Immutable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PacketSeen {
    /// The observed packet's message id.
    pub packet_id: u64,
    /// Observing (gateway) node address.
    pub node_id: u64,
    /// Receive time (epoch seconds) as reported by the observing node.
    pub rx_time: u64,
    /// Remaining hop budget when observed.
    pub hop_limit: u32,
    /// Hop budget the packet started with.
    pub hop_start: u32,
    /// Channel label from the envelope.
    pub channel: String,
    /// Signal-to-noise ratio at the observer.
    pub rx_snr: f32,
    /// Signal strength at the observer.
    pub rx_rssi: i32,
    /// Topic the envelope arrived on.
    pub topic: String,
    /// When the sighting was stored.
    pub import_time: DateTime<Utc>,
}

impl PacketSeen {
    /// Hops actually traversed before this observation, when derivable.
    pub fn hop_count(&self) -> Option<u32> {
        (self.hop_start != 0).then(|| self.hop_start.saturating_sub(self.hop_limit))
    }
}

/// One recorded route-discovery traversal tied to a packet. Immutable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Traceroute {
    /// The packet this traversal belongs to.
    pub packet_id: u64,
    /// The node that uplinked this traceroute event.
    pub gateway_node_id: u64,
    /// Serialized ordered hop list (a `RouteDiscovery` frame).
    pub route: Vec<u8>,
    /// True for a completed reply, false for an in-flight discovery probe.
    pub done: bool,
    /// When the row was stored.
    pub import_time: DateTime<Utc>,
}
