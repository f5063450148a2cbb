//! Evidence reconciliation, edge aggregation, and root-scoped traversal.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use telemetry_storage::{PacketFilter, Store};
use telemetry_wire::{decode, decode_payload, node_id_to_user_id, Payload, PortNum};

use crate::TopologyError;

/// Default traversal depth when a root is given without one.
pub const DEFAULT_DEPTH: usize = 5;

/// Weight floor so rare edges stay visible after normalization.
const MIN_EDGE_WEIGHT: f64 = 0.25;

/// Evidence source an edge was derived from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// Consecutive hop pair from a route-discovery path.
    Traceroute,
    /// Entry in a neighbor table broadcast.
    Neighbor,
    /// Zero-hop sighting by an uplinking gateway.
    Sni,
}

/// Parameters for one topology build.
#[derive(Clone, Debug)]
pub struct TopologyQuery {
    /// Only evidence imported after this instant is considered.
    pub since: DateTime<Utc>,
    /// Restrict the graph to nodes reachable from this root.
    pub root: Option<u64>,
    /// Traversal depth when a root is given.
    pub depth: usize,
}

impl TopologyQuery {
    /// Unscoped query over a lookback window ending now.
    pub fn new(since: DateTime<Utc>) -> Self {
        Self {
            since,
            root: None,
            depth: DEFAULT_DEPTH,
        }
    }

    /// Scope the graph to `depth` levels around `root`.
    pub fn rooted(mut self, root: u64, depth: usize) -> Self {
        self.root = Some(root);
        self.depth = depth;
        self
    }
}

/// One node referenced by a retained edge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Numeric radio address.
    pub id: u64,
    /// Display label: `[SHRT] Long Name` when known, else the `!hex` form.
    pub label: String,
}

/// One aggregated directed edge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Source node address.
    pub from: u64,
    /// Destination node address.
    pub to: u64,
    /// Evidence source.
    #[serde(rename = "type")]
    pub kind: EdgeKind,
    /// Raw observation count.
    pub count: u64,
    /// Count normalized against the max in this selection, floored.
    pub weight: f64,
    /// The reverse edge exists with the same kind; rendered once.
    pub bidirectional: bool,
}

/// The builder's output contract, ready for external rendering.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyGraph {
    /// Nodes referenced by at least one retained edge.
    pub nodes: Vec<GraphNode>,
    /// Aggregated edges with type tags and normalized weights.
    pub edges: Vec<Edge>,
}

/// Reconstruct the observation graph from stored evidence.
///
/// Self-loops (origin equals destination) are preserved as observed; some
/// radios echo their own packets and filtering them here would hide that.
pub async fn build_topology(
    store: &dyn Store,
    query: &TopologyQuery,
) -> Result<TopologyGraph, TopologyError> {
    let mut counts: HashMap<(u64, u64), u64> = HashMap::new();
    let mut kinds: HashMap<(u64, u64), EdgeKind> = HashMap::new();

    collect_sighting_edges(store, query, &mut counts, &mut kinds).await?;
    collect_neighbor_edges(store, query, &mut counts, &mut kinds).await?;
    // Traceroute evidence last: where sources overlap on a pair, the
    // explicit path observation wins the type tag.
    collect_traceroute_edges(store, query, &mut counts, &mut kinds).await?;

    if let Some(root) = query.root {
        counts = scope_to_root(&counts, root, query.depth);
    }

    debug!(
        edges = counts.len(),
        root = ?query.root,
        "topology evidence aggregated"
    );

    assemble(store, counts, &kinds).await
}

async fn collect_sighting_edges(
    store: &dyn Store,
    query: &TopologyQuery,
    counts: &mut HashMap<(u64, u64), u64>,
    kinds: &mut HashMap<(u64, u64), EdgeKind>,
) -> Result<(), TopologyError> {
    for (seen, packet) in store.zero_hop_seen_since(query.since).await? {
        let pair = (packet.from_node_id, seen.node_id);
        *counts.entry(pair).or_default() += 1;
        kinds.insert(pair, EdgeKind::Sni);
    }
    Ok(())
}

async fn collect_neighbor_edges(
    store: &dyn Store,
    query: &TopologyQuery,
    counts: &mut HashMap<(u64, u64), u64>,
    kinds: &mut HashMap<(u64, u64), EdgeKind>,
) -> Result<(), TopologyError> {
    let packets = store
        .get_packets(PacketFilter {
            portnum: Some(PortNum::NeighborinfoApp as i32),
            since: Some(query.since),
            ..Default::default()
        })
        .await?;

    for packet in packets {
        let (_, payload) = decode(&packet.payload);
        let Some(Payload::NeighborInfo(info)) = payload else {
            continue;
        };
        for neighbor in info.neighbors {
            // The table lists who the origin hears, so evidence flows
            // neighbor -> origin.
            let pair = (u64::from(neighbor.node_id), packet.from_node_id);
            *counts.entry(pair).or_default() += 1;
            kinds.insert(pair, EdgeKind::Neighbor);
        }
    }
    Ok(())
}

async fn collect_traceroute_edges(
    store: &dyn Store,
    query: &TopologyQuery,
    counts: &mut HashMap<(u64, u64), u64>,
    kinds: &mut HashMap<(u64, u64), EdgeKind>,
) -> Result<(), TopologyError> {
    // Many relays uplink the same completed reply; count each finished
    // traversal once per packet id. Partial (not-done) observations are all
    // distinct evidence and are kept.
    let mut done_counted: HashSet<u64> = HashSet::new();

    for traceroute in store.traceroutes_since(query.since).await? {
        if traceroute.done && !done_counted.insert(traceroute.packet_id) {
            continue;
        }
        let Some(packet) = store.get_packet(traceroute.packet_id).await? else {
            continue;
        };
        let Some(Payload::Traceroute(route)) =
            decode_payload(PortNum::TracerouteApp as i32, &traceroute.route)
        else {
            continue;
        };

        let path = reconstruct_path(
            packet.from_node_id,
            &route.route,
            packet.to_node_id,
            traceroute.gateway_node_id,
            traceroute.done,
        );
        for pair in path.windows(2) {
            let pair = (pair[0], pair[1]);
            *counts.entry(pair).or_default() += 1;
            kinds.insert(pair, EdgeKind::Traceroute);
        }
    }
    Ok(())
}

/// Rebuild the full traversal path from a stored hop list.
///
/// A completed reply ends at the destination. An in-flight probe ends where
/// it was uplinked; some nodes add themselves to the hop list before
/// uplinking, so the gateway is only appended when not already terminal.
pub fn reconstruct_path(
    from: u64,
    hops: &[u32],
    to: u64,
    gateway: u64,
    done: bool,
) -> Vec<u64> {
    let mut path = Vec::with_capacity(hops.len() + 2);
    path.push(from);
    path.extend(hops.iter().map(|&hop| u64::from(hop)));
    if done {
        path.push(to);
    } else if path.last() != Some(&gateway) {
        path.push(gateway);
    }
    path
}

/// Bounded breadth-first restriction around a root.
///
/// Both edge directions are explored so the subgraph covers who the root
/// hears and who hears the root. Edge weights are re-derived from the
/// discoveries made during this traversal, not copied from the unscoped
/// counts.
fn scope_to_root(
    counts: &HashMap<(u64, u64), u64>,
    root: u64,
    depth: usize,
) -> HashMap<(u64, u64), u64> {
    let mut outgoing: HashMap<u64, Vec<u64>> = HashMap::new();
    let mut incoming: HashMap<u64, Vec<u64>> = HashMap::new();
    for &(src, dst) in counts.keys() {
        outgoing.entry(src).or_default().push(dst);
        incoming.entry(dst).or_default().push(src);
    }

    let mut scoped: HashMap<(u64, u64), u64> = HashMap::new();
    let mut visited: HashSet<u64> = HashSet::new();
    visited.insert(root);
    let mut queue = vec![root];

    for _ in 0..depth {
        let mut next = Vec::new();
        for node in queue {
            for &dst in outgoing.get(&node).map(Vec::as_slice).unwrap_or(&[]) {
                *scoped.entry((node, dst)).or_default() += 1;
                if visited.insert(dst) {
                    next.push(dst);
                }
            }
            for &src in incoming.get(&node).map(Vec::as_slice).unwrap_or(&[]) {
                *scoped.entry((src, node)).or_default() += 1;
                if visited.insert(src) {
                    next.push(src);
                }
            }
        }
        if next.is_empty() {
            break;
        }
        queue = next;
    }

    scoped
}

async fn assemble(
    store: &dyn Store,
    counts: HashMap<(u64, u64), u64>,
    kinds: &HashMap<(u64, u64), EdgeKind>,
) -> Result<TopologyGraph, TopologyError> {
    let max_count = counts.values().copied().max().unwrap_or(1);
    let size_ratio = 2.0 / max_count as f64;

    let mut pairs: Vec<((u64, u64), u64)> = counts.into_iter().collect();
    pairs.sort_unstable();

    let mut merged: HashSet<(u64, u64)> = HashSet::new();
    let mut edges = Vec::with_capacity(pairs.len());
    let mut node_ids: HashSet<u64> = HashSet::new();

    let pair_kinds: HashMap<(u64, u64), EdgeKind> = pairs
        .iter()
        .filter_map(|&(pair, _)| kinds.get(&pair).map(|&k| (pair, k)))
        .collect();

    for ((src, dst), count) in pairs {
        if merged.contains(&(src, dst)) {
            continue;
        }
        let Some(&kind) = pair_kinds.get(&(src, dst)) else {
            continue;
        };
        // A reverse edge of the same kind renders as one bidirectional edge
        // rather than two overlapping arrows.
        let bidirectional =
            src != dst && pair_kinds.get(&(dst, src)) == Some(&kind);
        if bidirectional {
            merged.insert((dst, src));
        }

        node_ids.insert(src);
        node_ids.insert(dst);
        edges.push(Edge {
            from: src,
            to: dst,
            kind,
            count,
            weight: (size_ratio * count as f64).max(MIN_EDGE_WEIGHT),
            bidirectional,
        });
    }

    let mut nodes = Vec::with_capacity(node_ids.len());
    for id in node_ids {
        nodes.push(GraphNode {
            id,
            label: node_label(store, id).await?,
        });
    }
    nodes.sort_by_key(|n| n.id);

    Ok(TopologyGraph { nodes, edges })
}

async fn node_label(store: &dyn Store, id: u64) -> Result<String, TopologyError> {
    if let Some(node) = store.get_node_by_addr(id).await? {
        if let (Some(short), Some(long)) = (&node.short_name, &node.long_name) {
            return Ok(format!("[{short}] {long}"));
        }
    }
    Ok(node_id_to_user_id(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use prost::Message;
    use telemetry_storage::{
        MemoryStore, Node, Packet, PacketSeen, Traceroute,
    };
    use telemetry_wire::proto::{
        mesh_packet::PayloadVariant, Data, MeshPacket, Neighbor, NeighborInfo, RouteDiscovery,
    };

    fn since() -> DateTime<Utc> {
        Utc::now() - Duration::hours(24)
    }

    fn raw_frame(id: u64, from: u64, to: u64, portnum: PortNum, payload: Vec<u8>) -> Vec<u8> {
        MeshPacket {
            id,
            from: from as u32,
            to: to as u32,
            payload_variant: Some(PayloadVariant::Decoded(Data {
                portnum: portnum as i32,
                payload,
                ..Default::default()
            })),
            ..Default::default()
        }
        .encode_to_vec()
    }

    fn stored_packet(id: u64, from: u64, to: u64, portnum: PortNum, payload: Vec<u8>) -> Packet {
        Packet {
            id,
            portnum: Some(portnum as i32),
            from_node_id: from,
            to_node_id: to,
            payload: raw_frame(id, from, to, portnum, payload),
            import_time: Utc::now(),
            channel: "LongFast".to_string(),
        }
    }

    async fn insert_traceroute(
        store: &MemoryStore,
        packet_id: u64,
        from: u64,
        to: u64,
        hops: &[u32],
        gateway: u64,
        done: bool,
    ) {
        let route = RouteDiscovery {
            route: hops.to_vec(),
        };
        store
            .insert_packet(stored_packet(
                packet_id,
                from,
                to,
                PortNum::TracerouteApp,
                route.encode_to_vec(),
            ))
            .await
            .unwrap();
        store
            .insert_traceroute(Traceroute {
                packet_id,
                gateway_node_id: gateway,
                route: route.encode_to_vec(),
                done,
                import_time: Utc::now(),
            })
            .await
            .unwrap();
    }

    fn edge_set(graph: &TopologyGraph) -> HashMap<(u64, u64), &Edge> {
        graph.edges.iter().map(|e| ((e.from, e.to), e)).collect()
    }

    #[tokio::test]
    async fn test_traceroute_path_reconstruction() {
        // Hop list [A, B], origin O, destination D, done -> O, A, B, D.
        assert_eq!(
            reconstruct_path(100, &[200, 300], 400, 999, true),
            vec![100, 200, 300, 400]
        );
    }

    #[tokio::test]
    async fn test_partial_traceroute_ends_at_gateway() {
        assert_eq!(
            reconstruct_path(100, &[200], 400, 555, false),
            vec![100, 200, 555]
        );
        // Gateway already terminal in the hop list: not appended twice.
        assert_eq!(
            reconstruct_path(100, &[200, 555], 400, 555, false),
            vec![100, 200, 555]
        );
    }

    #[tokio::test]
    async fn test_traceroute_edges_in_graph() {
        let store = MemoryStore::new();
        insert_traceroute(&store, 1, 100, 400, &[200, 300], 999, true).await;

        let graph = build_topology(&store, &TopologyQuery::new(since()))
            .await
            .unwrap();
        let edges = edge_set(&graph);
        assert_eq!(edges.len(), 3);
        for pair in [(100, 200), (200, 300), (300, 400)] {
            let edge = edges.get(&pair).expect("path edge present");
            assert_eq!(edge.kind, EdgeKind::Traceroute);
            assert_eq!(edge.count, 1);
        }
    }

    #[tokio::test]
    async fn test_done_traceroutes_deduplicated_by_packet() {
        let store = MemoryStore::new();
        // Three relays uplink the same completed reply.
        for gateway in [901, 902, 903] {
            insert_traceroute(&store, 1, 100, 400, &[200], gateway, true).await;
        }

        let graph = build_topology(&store, &TopologyQuery::new(since()))
            .await
            .unwrap();
        let edges = edge_set(&graph);
        assert_eq!(edges[&(100, 200)].count, 1);
        assert_eq!(edges[&(200, 400)].count, 1);
    }

    #[tokio::test]
    async fn test_neighbor_edges_point_at_origin() {
        let store = MemoryStore::new();
        let info = NeighborInfo {
            node_id: 100,
            neighbors: vec![
                Neighbor { node_id: 200, snr: 5.0 },
                Neighbor { node_id: 300, snr: -2.0 },
            ],
            ..Default::default()
        };
        store
            .insert_packet(stored_packet(
                1,
                100,
                0xffffffff,
                PortNum::NeighborinfoApp,
                info.encode_to_vec(),
            ))
            .await
            .unwrap();

        let graph = build_topology(&store, &TopologyQuery::new(since()))
            .await
            .unwrap();
        let edges = edge_set(&graph);
        assert_eq!(edges[&(200, 100)].kind, EdgeKind::Neighbor);
        assert_eq!(edges[&(300, 100)].kind, EdgeKind::Neighbor);
    }

    #[tokio::test]
    async fn test_sni_edges_from_zero_hop_sightings() {
        let store = MemoryStore::new();
        store
            .insert_packet(stored_packet(1, 100, 0xffffffff, PortNum::TextMessageApp, vec![]))
            .await
            .unwrap();
        store
            .insert_seen(PacketSeen {
                packet_id: 1,
                node_id: 500,
                rx_time: 1000,
                hop_limit: 3,
                hop_start: 3,
                channel: "LongFast".to_string(),
                rx_snr: 6.0,
                rx_rssi: -90,
                topic: "msh/US".to_string(),
                import_time: Utc::now(),
            })
            .await
            .unwrap();

        let graph = build_topology(&store, &TopologyQuery::new(since()))
            .await
            .unwrap();
        let edges = edge_set(&graph);
        assert_eq!(edges[&(100, 500)].kind, EdgeKind::Sni);
    }

    #[tokio::test]
    async fn test_bfs_depth_bound() {
        let store = MemoryStore::new();
        // Chain O -> A -> B -> C as three separate traceroute legs.
        insert_traceroute(&store, 1, 10, 20, &[], 20, true).await; // O -> A
        insert_traceroute(&store, 2, 20, 30, &[], 30, true).await; // A -> B
        insert_traceroute(&store, 3, 30, 40, &[], 40, true).await; // B -> C

        let query = TopologyQuery::new(since()).rooted(10, 2);
        let graph = build_topology(&store, &query).await.unwrap();

        let ids: HashSet<u64> = graph.nodes.iter().map(|n| n.id).collect();
        assert!(ids.contains(&10));
        assert!(ids.contains(&20));
        assert!(ids.contains(&30));
        assert!(!ids.contains(&40));
    }

    #[tokio::test]
    async fn test_bidirectional_edges_merge() {
        let store = MemoryStore::new();
        insert_traceroute(&store, 1, 100, 200, &[], 200, true).await;
        insert_traceroute(&store, 2, 200, 100, &[], 100, true).await;

        let graph = build_topology(&store, &TopologyQuery::new(since()))
            .await
            .unwrap();
        assert_eq!(graph.edges.len(), 1);
        assert!(graph.edges[0].bidirectional);
    }

    #[tokio::test]
    async fn test_weight_normalization() {
        let store = MemoryStore::new();
        // Two observations of one pair, one of another.
        insert_traceroute(&store, 1, 100, 200, &[], 200, true).await;
        insert_traceroute(&store, 2, 100, 200, &[], 200, true).await;
        insert_traceroute(&store, 3, 300, 400, &[], 400, true).await;

        let graph = build_topology(&store, &TopologyQuery::new(since()))
            .await
            .unwrap();
        let edges = edge_set(&graph);
        assert_eq!(edges[&(100, 200)].count, 2);
        assert!((edges[&(100, 200)].weight - 2.0).abs() < f64::EPSILON);
        assert!((edges[&(300, 400)].weight - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_node_labels_use_known_names() {
        let store = MemoryStore::new();
        let mut node = Node::new("!00000064".to_string(), Some(100));
        node.short_name = Some("BASE".to_string());
        node.long_name = Some("Base Camp".to_string());
        store.put_node(node).await.unwrap();
        insert_traceroute(&store, 1, 100, 200, &[], 200, true).await;

        let graph = build_topology(&store, &TopologyQuery::new(since()))
            .await
            .unwrap();
        let labels: HashMap<u64, &str> = graph
            .nodes
            .iter()
            .map(|n| (n.id, n.label.as_str()))
            .collect();
        assert_eq!(labels[&100], "[BASE] Base Camp");
        assert_eq!(labels[&200], "!000000c8");
    }

    #[tokio::test]
    async fn test_self_loops_preserved() {
        let store = MemoryStore::new();
        // A node that lists itself in its own neighbor table.
        let info = NeighborInfo {
            node_id: 100,
            neighbors: vec![Neighbor { node_id: 100, snr: 0.0 }],
            ..Default::default()
        };
        store
            .insert_packet(stored_packet(
                1,
                100,
                0xffffffff,
                PortNum::NeighborinfoApp,
                info.encode_to_vec(),
            ))
            .await
            .unwrap();

        let graph = build_topology(&store, &TopologyQuery::new(since()))
            .await
            .unwrap();
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].from, 100);
        assert_eq!(graph.edges[0].to, 100);
        assert!(!graph.edges[0].bidirectional);
    }
}
