//! Port-number dispatch from raw payload bytes to typed records.

use prost::Message;
use tracing::debug;

use crate::proto::{
    Data, MapReport, MeshPacket, NeighborInfo, PortNum, Position, RouteDiscovery, Routing,
    Telemetry, User,
};

/// A decoded application payload, one variant per supported port.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// Raw UTF-8 text message.
    Text(String),
    /// Position fix.
    Position(Position),
    /// Node identity record.
    NodeInfo(User),
    /// Routing acknowledgement / error.
    Routing(Routing),
    /// Device or environment telemetry.
    Telemetry(Telemetry),
    /// Route discovery (traceroute) hop list.
    Traceroute(RouteDiscovery),
    /// Neighbor table broadcast.
    NeighborInfo(NeighborInfo),
    /// Self-reported map presence record.
    MapReport(MapReport),
}

impl Payload {
    /// The port this payload arrived on.
    pub fn portnum(&self) -> PortNum {
        match self {
            Payload::Text(_) => PortNum::TextMessageApp,
            Payload::Position(_) => PortNum::PositionApp,
            Payload::NodeInfo(_) => PortNum::NodeinfoApp,
            Payload::Routing(_) => PortNum::RoutingApp,
            Payload::Telemetry(_) => PortNum::TelemetryApp,
            Payload::Traceroute(_) => PortNum::TracerouteApp,
            Payload::NeighborInfo(_) => PortNum::NeighborinfoApp,
            Payload::MapReport(_) => PortNum::MapReportApp,
        }
    }
}

/// Decode raw payload bytes according to their port number.
///
/// Unknown ports and decode failures (truncated protobuf, invalid UTF-8)
/// yield `None`; they never propagate and never abort a batch.
pub fn decode_payload(portnum: i32, payload: &[u8]) -> Option<Payload> {
    let port = PortNum::try_from(portnum).ok()?;
    let decoded = match port {
        PortNum::TextMessageApp => match std::str::from_utf8(payload) {
            Ok(text) => Some(Payload::Text(text.to_string())),
            Err(_) => None,
        },
        PortNum::PositionApp => Position::decode(payload).ok().map(Payload::Position),
        PortNum::NodeinfoApp => User::decode(payload).ok().map(Payload::NodeInfo),
        PortNum::RoutingApp => Routing::decode(payload).ok().map(Payload::Routing),
        PortNum::TelemetryApp => Telemetry::decode(payload).ok().map(Payload::Telemetry),
        PortNum::TracerouteApp => RouteDiscovery::decode(payload).ok().map(Payload::Traceroute),
        PortNum::NeighborinfoApp => NeighborInfo::decode(payload).ok().map(Payload::NeighborInfo),
        PortNum::MapReportApp => MapReport::decode(payload).ok().map(Payload::MapReport),
        PortNum::UnknownApp => None,
    };
    if decoded.is_none() {
        debug!(portnum, len = payload.len(), "undecodable payload dropped");
    }
    decoded
}

/// Parse a stored raw mesh frame and decode its inner payload.
///
/// Returns `(None, None)` when the frame itself is corrupt, and
/// `(Some(frame), None)` when the frame parsed but its payload did not.
pub fn decode(raw_frame: &[u8]) -> (Option<MeshPacket>, Option<Payload>) {
    let packet = match MeshPacket::decode(raw_frame) {
        Ok(packet) => packet,
        Err(_) => return (None, None),
    };

    let payload = packet
        .decoded()
        .and_then(|data: &Data| decode_payload(data.portnum, &data.payload));

    (Some(packet), payload)
}
