//! Mesh wire protocol types, packet cipher, and payload decoding for telemetry.
//!
//! This crate provides the low-level wire layer for the telemetry ingester:
//! the protobuf envelope and mesh packet types carried over the MQTT uplink,
//! the AES-128-CTR cipher used for the default-channel encrypted section,
//! and the port-number dispatch that turns raw payload bytes into typed
//! application records.
//!
//! ## Envelope format
//!
//! ```text
//! ServiceEnvelope
//! ├── gateway_id   "!<8-hex-digit>" uplinking node
//! ├── channel_id   channel label
//! └── MeshPacket
//!     ├── id / from / to / rx metadata
//!     └── one of:
//!         ├── Data      plaintext decoded section (portnum + payload)
//!         └── encrypted opaque byte section (AES-128-CTR)
//! ```
//!
//! Decode failures at any layer are expected background noise on a public
//! broker and are surfaced as `None`, never as errors.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod addr;
pub mod cipher;
pub mod names;
pub mod payload;
pub mod proto;

pub use addr::{node_id_from_user_id, node_id_to_user_id};
pub use cipher::{decrypt, encrypt_data, packet_nonce, DEFAULT_CHANNEL_KEY};
pub use names::{hw_model_name, role_name};
pub use payload::{decode, decode_payload, Payload};
pub use proto::{
    mesh_packet, routing, telemetry, Data, DeviceMetrics, EnvironmentMetrics, MapReport,
    MeshPacket, Neighbor, NeighborInfo, PortNum, Position, RouteDiscovery, Routing,
    ServiceEnvelope, Telemetry, User,
};
