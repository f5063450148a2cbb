//! Per-envelope ingestion with idempotent admission and enrichment.

use std::sync::Arc;

use chrono::Utc;
use prost::Message;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use telemetry_storage::{Node, Packet, PacketSeen, StorageError, Store, Traceroute};
use telemetry_wire::proto::{Data, MeshPacket, ServiceEnvelope};
use telemetry_wire::{
    decode_payload, hw_model_name, node_id_from_user_id, node_id_to_user_id, role_name, Payload,
    PortNum,
};

use crate::consumer::EnvelopeEvent;
use crate::IngestError;

/// Serialized ingestion of decoded envelopes into the store.
///
/// Envelopes are committed strictly one at a time in arrival order; the
/// dedup guarantees rely on that, not on backend locking. The write lock is
/// shared with the retention sweep so a bulk delete never interleaves with
/// an in-flight envelope.
pub struct Processor {
    store: Arc<dyn Store>,
    write_lock: Arc<Mutex<()>>,
}

impl Processor {
    /// Wire a processor to its store and the shared write lock.
    pub fn new(store: Arc<dyn Store>, write_lock: Arc<Mutex<()>>) -> Self {
        Self { store, write_lock }
    }

    /// Drain the envelope channel until it closes or shutdown fires.
    ///
    /// A failed envelope is logged and dropped; it never stops the loop.
    pub async fn run(
        &self,
        mut rx: mpsc::Receiver<EnvelopeEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("processor shutting down");
                        return;
                    }
                }
                event = rx.recv() => match event {
                    Some(event) => {
                        if let Err(err) =
                            self.process_envelope(&event.topic, &event.envelope).await
                        {
                            warn!(error = %err, "envelope processing failed");
                        }
                    }
                    None => {
                        info!("consumer gone, processor stopping");
                        return;
                    }
                }
            }
        }
    }

    /// Commit one envelope: map-report branch, packet admission, sighting
    /// admission, then port-specific enrichment.
    ///
    /// Enrichment failures are caught per branch and never block the packet
    /// or sighting commits. A storage error on the admission path aborts
    /// this envelope only.
    pub async fn process_envelope(
        &self,
        topic: &str,
        envelope: &ServiceEnvelope,
    ) -> Result<(), IngestError> {
        let Some(packet) = envelope.packet.as_ref() else {
            return Ok(());
        };
        let Some(data) = packet.decoded() else {
            return Ok(());
        };

        let _guard = self.write_lock.lock().await;

        // Map reports often arrive with a zero message id, so this branch
        // runs before the id gate below.
        if data.portnum == PortNum::MapReportApp as i32 {
            if let Err(err) = self.apply_map_report(packet, data, envelope).await {
                warn!(from = packet.from, error = %err, "map-report enrichment failed");
            }
        }

        if packet.id == 0 {
            debug!(from = packet.from, "packet without message id skipped");
            return Ok(());
        }

        let created = self
            .store
            .insert_packet(Packet {
                id: packet.id,
                portnum: Some(data.portnum),
                from_node_id: u64::from(packet.from),
                to_node_id: u64::from(packet.to),
                payload: packet.encode_to_vec(),
                import_time: Utc::now(),
                channel: envelope.channel_id.clone(),
            })
            .await?;
        if created {
            debug!(id = packet.id, portnum = data.portnum, "packet admitted");
        }

        self.record_sighting(topic, envelope, packet).await?;

        match PortNum::try_from(data.portnum) {
            Ok(PortNum::NodeinfoApp) => {
                if let Err(err) = self.apply_node_info(data, envelope).await {
                    warn!(id = packet.id, error = %err, "node-info enrichment failed");
                }
            }
            Ok(PortNum::PositionApp) => {
                if let Err(err) = self.apply_position(packet, data).await {
                    warn!(id = packet.id, error = %err, "position enrichment failed");
                }
            }
            Ok(PortNum::TracerouteApp) => {
                if let Err(err) = self.apply_traceroute(packet, data, envelope).await {
                    warn!(id = packet.id, error = %err, "traceroute enrichment failed");
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Check-then-insert one sighting keyed on (packet, gateway, rx_time).
    async fn record_sighting(
        &self,
        topic: &str,
        envelope: &ServiceEnvelope,
        packet: &MeshPacket,
    ) -> Result<(), IngestError> {
        let Some(gateway) = node_id_from_user_id(&envelope.gateway_id) else {
            // Every well-formed uplink carries a gateway id; its absence
            // points at a misconfigured gateway, not a normal empty case.
            warn!(
                id = packet.id,
                gateway = %envelope.gateway_id,
                "missing or malformed gateway id, sighting skipped"
            );
            return Ok(());
        };

        let rx_time = u64::from(packet.rx_time);
        if self.store.seen_exists(packet.id, gateway, rx_time).await? {
            return Ok(());
        }
        self.store
            .insert_seen(PacketSeen {
                packet_id: packet.id,
                node_id: gateway,
                rx_time,
                hop_limit: packet.hop_limit,
                hop_start: packet.hop_start,
                channel: envelope.channel_id.clone(),
                rx_snr: packet.rx_snr,
                rx_rssi: packet.rx_rssi,
                topic: topic.to_string(),
                import_time: Utc::now(),
            })
            .await?;
        Ok(())
    }

    /// Upsert the reporting node from a map report, resolving it by numeric
    /// address and deriving an identity string when it was never seen.
    async fn apply_map_report(
        &self,
        packet: &MeshPacket,
        data: &Data,
        envelope: &ServiceEnvelope,
    ) -> Result<(), StorageError> {
        let Some(Payload::MapReport(report)) = decode_payload(data.portnum, &data.payload)
        else {
            return Ok(());
        };

        let addr = u64::from(packet.from);
        let mut node = match self.store.get_node_by_addr(addr).await? {
            Some(node) => node,
            None => Node::new(node_id_to_user_id(addr), Some(addr)),
        };

        if !report.long_name.is_empty() {
            node.long_name = Some(report.long_name);
        }
        if !report.short_name.is_empty() {
            node.short_name = Some(report.short_name);
        }
        node.hw_model = Some(hw_model_name(report.hw_model));
        node.role = Some(role_name(report.role));
        if !report.firmware_version.is_empty() {
            node.firmware = Some(report.firmware_version);
        }
        if report.latitude_i != 0 && report.longitude_i != 0 {
            node.last_lat = Some(i64::from(report.latitude_i));
            node.last_long = Some(i64::from(report.longitude_i));
        }
        node.channel = Some(envelope.channel_id.clone());
        node.last_update = Utc::now();
        self.store.put_node(node).await
    }

    /// Upsert a node from its identity broadcast, keyed on the identity
    /// string. The numeric address follows the `!<hex>` convention when it
    /// parses and stays absent otherwise.
    async fn apply_node_info(
        &self,
        data: &Data,
        envelope: &ServiceEnvelope,
    ) -> Result<(), StorageError> {
        let Some(Payload::NodeInfo(user)) = decode_payload(data.portnum, &data.payload) else {
            return Ok(());
        };
        if user.id.is_empty() {
            return Ok(());
        }

        let addr = node_id_from_user_id(&user.id);
        let mut node = match self.store.get_node(&user.id).await? {
            Some(node) => node,
            None => Node::new(user.id.clone(), addr),
        };

        node.node_id = addr;
        node.long_name = Some(user.long_name);
        node.short_name = Some(user.short_name);
        node.hw_model = Some(hw_model_name(user.hw_model));
        node.role = Some(role_name(user.role));
        node.channel = Some(envelope.channel_id.clone());
        node.last_update = Utc::now();
        self.store.put_node(node).await
    }

    /// Update the origin node's last position. Zero latitude or longitude
    /// means "no fix" and is ignored.
    async fn apply_position(
        &self,
        packet: &MeshPacket,
        data: &Data,
    ) -> Result<(), StorageError> {
        let Some(Payload::Position(position)) = decode_payload(data.portnum, &data.payload)
        else {
            return Ok(());
        };
        if position.latitude_i == 0 || position.longitude_i == 0 {
            return Ok(());
        }
        let Some(mut node) = self.store.get_node_by_addr(u64::from(packet.from)).await? else {
            return Ok(());
        };

        node.last_lat = Some(i64::from(position.latitude_i));
        node.last_long = Some(i64::from(position.longitude_i));
        node.last_update = Utc::now();
        self.store.put_node(node).await
    }

    /// Record a route-discovery event.
    ///
    /// An outbound probe (want_response) is keyed to its own packet. A reply
    /// is keyed to the request it answers, and only stored when that request
    /// packet exists; otherwise the first leg of a reply chain would be
    /// recorded as a fresh unrelated traceroute.
    async fn apply_traceroute(
        &self,
        packet: &MeshPacket,
        data: &Data,
        envelope: &ServiceEnvelope,
    ) -> Result<(), StorageError> {
        let packet_id = if data.want_response {
            packet.id
        } else if self.store.get_packet(data.request_id).await?.is_some() {
            data.request_id
        } else {
            debug!(
                id = packet.id,
                request_id = data.request_id,
                "reply without stored request, traceroute skipped"
            );
            return Ok(());
        };
        let Some(gateway) = node_id_from_user_id(&envelope.gateway_id) else {
            return Ok(());
        };

        self.store
            .insert_traceroute(Traceroute {
                packet_id,
                gateway_node_id: gateway,
                route: data.payload.clone(),
                done: !data.want_response,
                import_time: Utc::now(),
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry_storage::{MemoryStore, PacketFilter};
    use telemetry_wire::proto::{
        mesh_packet::PayloadVariant, MapReport, Position, RouteDiscovery, User,
    };

    fn processor(store: &Arc<MemoryStore>) -> Processor {
        Processor::new(store.clone(), Arc::new(Mutex::new(())))
    }

    fn envelope(id: u64, from: u32, data: Data, gateway: &str) -> ServiceEnvelope {
        ServiceEnvelope {
            packet: Some(MeshPacket {
                id,
                from,
                to: 0xffffffff,
                rx_time: 1_700_000_000,
                hop_limit: 3,
                hop_start: 3,
                payload_variant: Some(PayloadVariant::Decoded(data)),
                ..Default::default()
            }),
            channel_id: "LongFast".to_string(),
            gateway_id: gateway.to_string(),
        }
    }

    fn text_envelope(id: u64, from: u32, gateway: &str) -> ServiceEnvelope {
        envelope(
            id,
            from,
            Data {
                portnum: PortNum::TextMessageApp as i32,
                payload: b"hi".to_vec(),
                ..Default::default()
            },
            gateway,
        )
    }

    #[tokio::test]
    async fn test_duplicate_envelope_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let proc = processor(&store);
        let env = text_envelope(42, 10, "!00000064");

        proc.process_envelope("msh/US", &env).await.unwrap();
        proc.process_envelope("msh/US", &env).await.unwrap();

        let packets = store.get_packets(PacketFilter::default()).await.unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(store.get_packets_seen(42).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_three_gateways_one_packet_three_sightings() {
        let store = Arc::new(MemoryStore::new());
        let proc = processor(&store);

        for (gateway, rx_time) in [
            ("!00000064", 1000u32),
            ("!000000c8", 1001),
            ("!0000012c", 1002),
        ] {
            let mut env = text_envelope(42, 10, gateway);
            env.packet.as_mut().unwrap().rx_time = rx_time;
            proc.process_envelope("msh/US", &env).await.unwrap();
        }

        let packets = store.get_packets(PacketFilter::default()).await.unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(store.get_packets_seen(42).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_zero_id_packet_not_admitted() {
        let store = Arc::new(MemoryStore::new());
        let proc = processor(&store);

        proc.process_envelope("msh/US", &text_envelope(0, 10, "!00000064"))
            .await
            .unwrap();

        assert!(store
            .get_packets(PacketFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_missing_gateway_skips_sighting_only() {
        let store = Arc::new(MemoryStore::new());
        let proc = processor(&store);

        proc.process_envelope("msh/US", &text_envelope(42, 10, ""))
            .await
            .unwrap();

        assert!(store.get_packet(42).await.unwrap().is_some());
        assert!(store.get_packets_seen(42).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_map_report_creates_node_with_derived_identity() {
        let store = Arc::new(MemoryStore::new());
        let proc = processor(&store);
        let report = MapReport {
            long_name: "Ridge Repeater".to_string(),
            short_name: "RDGE".to_string(),
            role: 2,
            hw_model: 9,
            firmware_version: "2.5.3".to_string(),
            latitude_i: 374_000_000,
            longitude_i: -1_220_000_000,
            ..Default::default()
        };
        // Map reports commonly carry a zero message id.
        let env = envelope(
            0,
            10,
            Data {
                portnum: PortNum::MapReportApp as i32,
                payload: report.encode_to_vec(),
                ..Default::default()
            },
            "!00000064",
        );

        proc.process_envelope("msh/US", &env).await.unwrap();

        let node = store.get_node("!0000000a").await.unwrap().unwrap();
        assert_eq!(node.node_id, Some(10));
        assert_eq!(node.long_name.as_deref(), Some("Ridge Repeater"));
        assert_eq!(node.firmware.as_deref(), Some("2.5.3"));
        assert_eq!(node.hw_model.as_deref(), Some("RAK4631"));
        assert_eq!(node.role.as_deref(), Some("ROUTER"));
        assert_eq!(node.last_lat, Some(374_000_000));
        assert_eq!(node.last_long, Some(-1_220_000_000));
        assert!(store
            .get_packets(PacketFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_node_info_upserts_by_identity_string() {
        let store = Arc::new(MemoryStore::new());
        let proc = processor(&store);
        let user = User {
            id: "!0000000a".to_string(),
            long_name: "Base Camp".to_string(),
            short_name: "BASE".to_string(),
            hw_model: 4,
            role: 99,
            ..Default::default()
        };
        let env = envelope(
            42,
            10,
            Data {
                portnum: PortNum::NodeinfoApp as i32,
                payload: user.encode_to_vec(),
                ..Default::default()
            },
            "!00000064",
        );

        proc.process_envelope("msh/US", &env).await.unwrap();

        let node = store.get_node("!0000000a").await.unwrap().unwrap();
        assert_eq!(node.node_id, Some(10));
        assert_eq!(node.hw_model.as_deref(), Some("TBEAM"));
        assert_eq!(node.role.as_deref(), Some("unknown(99)"));
        assert!(store.get_node_by_addr(10).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_position_updates_known_node() {
        let store = Arc::new(MemoryStore::new());
        let proc = processor(&store);
        store
            .put_node(Node::new("!0000000a".to_string(), Some(10)))
            .await
            .unwrap();

        let position = Position {
            latitude_i: 374_000_000,
            longitude_i: -1_220_000_000,
            ..Default::default()
        };
        let env = envelope(
            42,
            10,
            Data {
                portnum: PortNum::PositionApp as i32,
                payload: position.encode_to_vec(),
                ..Default::default()
            },
            "!00000064",
        );
        proc.process_envelope("msh/US", &env).await.unwrap();

        let node = store.get_node("!0000000a").await.unwrap().unwrap();
        assert_eq!(node.last_lat, Some(374_000_000));
        assert_eq!(node.last_long, Some(-1_220_000_000));
    }

    #[tokio::test]
    async fn test_position_without_fix_ignored() {
        let store = Arc::new(MemoryStore::new());
        let proc = processor(&store);
        store
            .put_node(Node::new("!0000000a".to_string(), Some(10)))
            .await
            .unwrap();

        let position = Position {
            latitude_i: 374_000_000,
            longitude_i: 0,
            ..Default::default()
        };
        let env = envelope(
            42,
            10,
            Data {
                portnum: PortNum::PositionApp as i32,
                payload: position.encode_to_vec(),
                ..Default::default()
            },
            "!00000064",
        );
        proc.process_envelope("msh/US", &env).await.unwrap();

        let node = store.get_node("!0000000a").await.unwrap().unwrap();
        assert_eq!(node.last_lat, None);
    }

    #[tokio::test]
    async fn test_traceroute_probe_keyed_to_own_packet() {
        let store = Arc::new(MemoryStore::new());
        let proc = processor(&store);
        let route = RouteDiscovery { route: vec![] };
        let env = envelope(
            42,
            10,
            Data {
                portnum: PortNum::TracerouteApp as i32,
                payload: route.encode_to_vec(),
                want_response: true,
                ..Default::default()
            },
            "!00000064",
        );

        proc.process_envelope("msh/US", &env).await.unwrap();

        let rows = store.get_traceroutes_for(42).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].done);
        assert_eq!(rows[0].gateway_node_id, 100);
    }

    #[tokio::test]
    async fn test_traceroute_reply_requires_stored_request() {
        let store = Arc::new(MemoryStore::new());
        let proc = processor(&store);
        let route = RouteDiscovery { route: vec![20, 30] };
        let reply = |id: u64| {
            envelope(
                id,
                40,
                Data {
                    portnum: PortNum::TracerouteApp as i32,
                    payload: route.encode_to_vec(),
                    want_response: false,
                    request_id: 42,
                    ..Default::default()
                },
                "!00000064",
            )
        };

        // No request packet stored yet: the reply is dropped.
        proc.process_envelope("msh/US", &reply(50)).await.unwrap();
        assert!(store.get_traceroutes_for(42).await.unwrap().is_empty());

        // Ingest the request, then the reply again under a fresh packet id.
        proc.process_envelope(
            "msh/US",
            &envelope(
                42,
                10,
                Data {
                    portnum: PortNum::TracerouteApp as i32,
                    payload: RouteDiscovery { route: vec![] }.encode_to_vec(),
                    want_response: true,
                    ..Default::default()
                },
                "!00000064",
            ),
        )
        .await
        .unwrap();
        proc.process_envelope("msh/US", &reply(51)).await.unwrap();

        let rows = store.get_traceroutes_for(42).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().any(|t| t.done));
        assert!(rows.iter().any(|t| !t.done));
    }
}
