//! Protobuf message definitions for the mesh wire format.
//!
//! The messages are declared directly with `prost` derives rather than
//! generated from `.proto` files, so the crate builds without a protoc
//! toolchain. Field tags follow the radio firmware's assignments; only the
//! fields this ingester reads are declared (protobuf skips unknown fields,
//! so real traffic with a richer schema still decodes).

/// Application port numbers identifying the payload type inside a decoded
/// mesh packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum PortNum {
    /// No payload / unset.
    UnknownApp = 0,
    /// Raw UTF-8 text message.
    TextMessageApp = 1,
    /// Position fix.
    PositionApp = 3,
    /// Node identity (user record).
    NodeinfoApp = 4,
    /// Routing acknowledgement / error.
    RoutingApp = 5,
    /// Device and environment telemetry.
    TelemetryApp = 67,
    /// Route discovery (traceroute).
    TracerouteApp = 70,
    /// Neighbor table broadcast.
    NeighborinfoApp = 71,
    /// Self-reported map presence record.
    MapReportApp = 73,
}

/// Outer transport envelope wrapping a mesh packet plus routing metadata.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServiceEnvelope {
    /// The wrapped mesh packet.
    #[prost(message, optional, tag = "1")]
    pub packet: ::core::option::Option<MeshPacket>,
    /// Channel label the packet was heard on.
    #[prost(string, tag = "3")]
    pub channel_id: ::prost::alloc::string::String,
    /// Uplinking gateway node, formatted `!<8-hex-digit-lowercase>`.
    #[prost(string, tag = "4")]
    pub gateway_id: ::prost::alloc::string::String,
}

/// One radio-layer mesh message.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MeshPacket {
    /// Originating node address.
    #[prost(uint32, tag = "1")]
    pub from: u32,
    /// Destination node address (broadcast when all-ones).
    #[prost(uint32, tag = "2")]
    pub to: u32,
    /// Channel index on the originating radio.
    #[prost(uint32, tag = "3")]
    pub channel: u32,
    /// Message id assigned by the originating radio. Zero means unset.
    #[prost(uint64, tag = "6")]
    pub id: u64,
    /// Receive time (epoch seconds) as reported by the gateway radio.
    #[prost(uint32, tag = "7")]
    pub rx_time: u32,
    /// Signal-to-noise ratio at the gateway radio.
    #[prost(float, tag = "8")]
    pub rx_snr: f32,
    /// Remaining hop budget when received.
    #[prost(uint32, tag = "9")]
    pub hop_limit: u32,
    /// Whether the sender requested an acknowledgement.
    #[prost(bool, tag = "10")]
    pub want_ack: bool,
    /// Received signal strength at the gateway radio.
    #[prost(int32, tag = "12")]
    pub rx_rssi: i32,
    /// Hop budget the packet started with.
    #[prost(uint32, tag = "15")]
    pub hop_start: u32,
    /// Either a plaintext decoded section or an opaque encrypted section.
    #[prost(oneof = "mesh_packet::PayloadVariant", tags = "4, 5")]
    pub payload_variant: ::core::option::Option<mesh_packet::PayloadVariant>,
}

/// Nested types for [`MeshPacket`].
pub mod mesh_packet {
    /// Payload carried by a mesh packet.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum PayloadVariant {
        /// Plaintext application section.
        #[prost(message, tag = "4")]
        Decoded(super::Data),
        /// AES-128-CTR encrypted application section.
        #[prost(bytes, tag = "5")]
        Encrypted(::prost::alloc::vec::Vec<u8>),
    }
}

impl MeshPacket {
    /// The decoded application section, if present.
    pub fn decoded(&self) -> Option<&Data> {
        match &self.payload_variant {
            Some(mesh_packet::PayloadVariant::Decoded(data)) => Some(data),
            _ => None,
        }
    }
}

/// Decoded application section of a mesh packet.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Data {
    /// Payload type tag.
    #[prost(enumeration = "PortNum", tag = "1")]
    pub portnum: i32,
    /// Raw application payload bytes.
    #[prost(bytes = "vec", tag = "2")]
    pub payload: ::prost::alloc::vec::Vec<u8>,
    /// For traceroute: whether this is an outbound discovery probe.
    #[prost(bool, tag = "3")]
    pub want_response: bool,
    /// Original destination for multi-hop responses.
    #[prost(fixed32, tag = "4")]
    pub dest: u32,
    /// Original source for multi-hop responses.
    #[prost(fixed32, tag = "5")]
    pub source: u32,
    /// Message id of the request this payload answers, if any.
    #[prost(uint64, tag = "6")]
    pub request_id: u64,
}

/// Position fix. Coordinates are fixed-point integers scaled by 1e-7;
/// zero means "no fix", not the equator/meridian.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Position {
    /// Latitude × 1e7.
    #[prost(sfixed32, tag = "1")]
    pub latitude_i: i32,
    /// Longitude × 1e7.
    #[prost(sfixed32, tag = "2")]
    pub longitude_i: i32,
    /// Altitude in meters.
    #[prost(int32, tag = "3")]
    pub altitude: i32,
    /// Fix time (epoch seconds).
    #[prost(uint32, tag = "4")]
    pub time: u32,
}

/// One entry in a neighbor table broadcast.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Neighbor {
    /// Address of the heard neighbor.
    #[prost(uint32, tag = "1")]
    pub node_id: u32,
    /// SNR the neighbor was heard at.
    #[prost(float, tag = "2")]
    pub snr: f32,
}

/// Neighbor table broadcast: the set of nodes the sender hears directly.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NeighborInfo {
    /// Address of the broadcasting node.
    #[prost(uint32, tag = "1")]
    pub node_id: u32,
    /// Address of the node this table was last relayed by.
    #[prost(uint32, tag = "2")]
    pub last_sent_by_id: u32,
    /// Broadcast interval in seconds.
    #[prost(uint32, tag = "3")]
    pub node_broadcast_interval_secs: u32,
    /// Directly heard neighbors.
    #[prost(message, repeated, tag = "4")]
    pub neighbors: ::prost::alloc::vec::Vec<Neighbor>,
}

/// Node identity record.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct User {
    /// Stable identity string, conventionally `!<8-hex-digit>`.
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
    /// Full display name.
    #[prost(string, tag = "2")]
    pub long_name: ::prost::alloc::string::String,
    /// Short (up to 4 char) display name.
    #[prost(string, tag = "3")]
    pub short_name: ::prost::alloc::string::String,
    /// Hardware model enumeration code.
    #[prost(int32, tag = "5")]
    pub hw_model: i32,
    /// Device role enumeration code.
    #[prost(int32, tag = "7")]
    pub role: i32,
}

/// Device metrics carried in telemetry.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeviceMetrics {
    /// Battery charge percent (101 = powered).
    #[prost(uint32, tag = "1")]
    pub battery_level: u32,
    /// Supply voltage.
    #[prost(float, tag = "2")]
    pub voltage: f32,
    /// Fraction of airtime the channel was busy.
    #[prost(float, tag = "3")]
    pub channel_utilization: f32,
    /// Fraction of airtime this node spent transmitting.
    #[prost(float, tag = "4")]
    pub air_util_tx: f32,
    /// Seconds since boot.
    #[prost(uint32, tag = "5")]
    pub uptime_seconds: u32,
}

/// Environment metrics carried in telemetry.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EnvironmentMetrics {
    /// Temperature in °C.
    #[prost(float, tag = "1")]
    pub temperature: f32,
    /// Relative humidity percent.
    #[prost(float, tag = "2")]
    pub relative_humidity: f32,
    /// Barometric pressure in hPa.
    #[prost(float, tag = "3")]
    pub barometric_pressure: f32,
}

/// Periodic telemetry report.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Telemetry {
    /// Measurement time (epoch seconds).
    #[prost(uint32, tag = "1")]
    pub time: u32,
    /// The carried metric set.
    #[prost(oneof = "telemetry::Variant", tags = "2, 3")]
    pub variant: ::core::option::Option<telemetry::Variant>,
}

/// Nested types for [`Telemetry`].
pub mod telemetry {
    /// Metric set carried by one telemetry report.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Variant {
        /// Device health metrics.
        #[prost(message, tag = "2")]
        DeviceMetrics(super::DeviceMetrics),
        /// Environmental sensor metrics.
        #[prost(message, tag = "3")]
        EnvironmentMetrics(super::EnvironmentMetrics),
    }
}

/// Route discovery record: the relay addresses accumulated so far.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RouteDiscovery {
    /// Ordered relay hop addresses, origin and destination excluded.
    #[prost(fixed32, repeated, tag = "1")]
    pub route: ::prost::alloc::vec::Vec<u32>,
}

/// Routing control payload: acknowledgement, reply, or error.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Routing {
    /// The routing event.
    #[prost(oneof = "routing::Variant", tags = "1, 2, 3")]
    pub variant: ::core::option::Option<routing::Variant>,
}

/// Nested types for [`Routing`].
pub mod routing {
    /// Reasons a routing request failed.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Error {
        /// Delivered without error.
        None = 0,
        /// No route to destination.
        NoRoute = 1,
        /// Got a NAK back.
        GotNak = 2,
        /// Timed out waiting for a response.
        Timeout = 3,
    }

    /// Routing event carried by one payload.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Variant {
        /// A route request being forwarded.
        #[prost(message, tag = "1")]
        RouteRequest(super::RouteDiscovery),
        /// A completed route reply.
        #[prost(message, tag = "2")]
        RouteReply(super::RouteDiscovery),
        /// A delivery error report.
        #[prost(enumeration = "Error", tag = "3")]
        ErrorReason(i32),
    }
}

/// Self-reported map presence record, richer than a node-info broadcast.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MapReport {
    /// Full display name.
    #[prost(string, tag = "1")]
    pub long_name: ::prost::alloc::string::String,
    /// Short display name.
    #[prost(string, tag = "2")]
    pub short_name: ::prost::alloc::string::String,
    /// Device role enumeration code.
    #[prost(int32, tag = "3")]
    pub role: i32,
    /// Hardware model enumeration code.
    #[prost(int32, tag = "4")]
    pub hw_model: i32,
    /// Firmware version string.
    #[prost(string, tag = "5")]
    pub firmware_version: ::prost::alloc::string::String,
    /// LoRa region code.
    #[prost(uint32, tag = "6")]
    pub region: u32,
    /// Modem preset code.
    #[prost(uint32, tag = "7")]
    pub modem_preset: u32,
    /// Whether the default channel is enabled.
    #[prost(bool, tag = "8")]
    pub has_default_channel: bool,
    /// Latitude × 1e7, zero when unset.
    #[prost(sfixed32, tag = "9")]
    pub latitude_i: i32,
    /// Longitude × 1e7, zero when unset.
    #[prost(sfixed32, tag = "10")]
    pub longitude_i: i32,
    /// Altitude in meters.
    #[prost(int32, tag = "11")]
    pub altitude: i32,
    /// Reported position precision.
    #[prost(uint32, tag = "12")]
    pub position_precision: u32,
    /// Nodes heard locally in the last report interval.
    #[prost(uint32, tag = "13")]
    pub num_online_local_nodes: u32,
}
