//! One-pass aggregation over a capture file.
//!
//! Produces the statistics, protocol mix, top flows, connection graph and
//! per-second timeline consumed by the analysis endpoints. The whole pass
//! holds only counters in memory, never the packets themselves.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::packet::{decode, Protocol};
use super::parser::{PacketRecord, TraceError, TraceReader};

const TOP_TALKERS: usize = 10;
const TOP_FLOWS: usize = 50;
const TOP_LINKS: usize = 100;

/// Everything one analysis run produces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullAnalysis {
    pub statistics: Statistics,
    pub protocols: Vec<ProtocolCount>,
    pub flows: Vec<FlowEntry>,
    pub attack_path: AttackPathGraph,
    pub timeline: Vec<TimelineBucket>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistics {
    pub total_packets: u64,
    pub total_bytes: u64,
    pub duration: f64,
    pub packets_per_second: f64,
    pub top_talkers: Vec<TalkerEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TalkerEntry {
    pub ip: String,
    pub packets: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolCount {
    pub name: String,
    pub value: u64,
}

/// Aggregated unidirectional flow. Ports are not part of the flow key, so
/// they render as wildcards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowEntry {
    pub src_ip: String,
    pub src_port: String,
    pub dst_ip: String,
    pub dst_port: String,
    pub protocol: String,
    pub packets: u64,
    pub bytes: u64,
}

/// Node-link graph of who talked to whom, shaped for direct rendering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackPathGraph {
    pub nodes: Vec<GraphNode>,
    pub links: Vec<GraphLink>,
    pub categories: Vec<GraphCategory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub name: String,
    #[serde(rename = "symbolSize")]
    pub symbol_size: u32,
    pub category: u32,
    pub label: GraphLabel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphLabel {
    pub show: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphLink {
    pub source: String,
    pub target: String,
    pub value: u64,
    #[serde(rename = "lineStyle")]
    pub line_style: GraphLineStyle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphLineStyle {
    pub width: f64,
    pub curveness: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphCategory {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineBucket {
    pub time: i64,
    pub packets: u64,
    pub bytes: u64,
}

/// Per-protocol and endpoint breakdown for the trace detail endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceDetails {
    pub total_packets: u64,
    pub duration: f64,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    pub protocols: HashMap<String, u64>,
    pub top_src_ips: Vec<TalkerEntry>,
    pub top_dst_ips: Vec<TalkerEntry>,
    pub top_src_ports: Vec<PortCount>,
    pub top_dst_ports: Vec<PortCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortCount {
    pub port: u16,
    pub count: u64,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct FlowKey {
    src: Ipv4Addr,
    dst: Ipv4Addr,
    protocol: Protocol,
}

#[derive(Default)]
struct FlowStats {
    packets: u64,
    bytes: u64,
}

/// Streaming aggregator; feed every packet, then finish
pub struct Analyzer {
    link_type: u16,
    total_packets: u64,
    total_bytes: u64,
    first_ts: Option<f64>,
    last_ts: Option<f64>,
    protocols: HashMap<&'static str, u64>,
    arp_packets: u64,
    src_ips: HashMap<Ipv4Addr, u64>,
    dst_ips: HashMap<Ipv4Addr, u64>,
    src_ports: HashMap<u16, u64>,
    dst_ports: HashMap<u16, u64>,
    flows: HashMap<FlowKey, FlowStats>,
    connections: HashMap<(Ipv4Addr, Ipv4Addr), u64>,
    timeline: HashMap<i64, (u64, u64)>,
}

impl Analyzer {
    pub fn new(link_type: u16) -> Self {
        Self {
            link_type,
            total_packets: 0,
            total_bytes: 0,
            first_ts: None,
            last_ts: None,
            protocols: HashMap::new(),
            arp_packets: 0,
            src_ips: HashMap::new(),
            dst_ips: HashMap::new(),
            src_ports: HashMap::new(),
            dst_ports: HashMap::new(),
            flows: HashMap::new(),
            connections: HashMap::new(),
            timeline: HashMap::new(),
        }
    }

    pub fn feed(&mut self, record: &PacketRecord) {
        let bytes = record.orig_len as u64;
        self.total_packets += 1;
        self.total_bytes += bytes;

        if let Some(ts) = record.ts {
            if self.first_ts.is_none() {
                self.first_ts = Some(ts);
            }
            self.last_ts = Some(ts);
            let bucket = self.timeline.entry(ts.floor() as i64).or_insert((0, 0));
            bucket.0 += 1;
            bucket.1 += bytes;
        }

        let summary = decode(self.link_type, &record.data);

        // Protocol mix distinguishes IP sub-protocols; everything without an
        // IPv4 header lands in one bucket
        let bucket = match summary.protocol {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Icmp => "ICMP",
            Protocol::Other if summary.is_ip() => "Other",
            _ => "Non-IP",
        };
        *self.protocols.entry(bucket).or_insert(0) += 1;

        if summary.protocol == Protocol::Arp {
            self.arp_packets += 1;
        }

        let (src, dst) = match (summary.src, summary.dst) {
            (Some(src), Some(dst)) => (src, dst),
            _ => return,
        };

        *self.src_ips.entry(src).or_insert(0) += 1;
        *self.dst_ips.entry(dst).or_insert(0) += 1;
        *self.connections.entry((src, dst)).or_insert(0) += 1;

        if let Some(port) = summary.src_port {
            *self.src_ports.entry(port).or_insert(0) += 1;
        }
        if let Some(port) = summary.dst_port {
            *self.dst_ports.entry(port).or_insert(0) += 1;
        }

        if matches!(summary.protocol, Protocol::Tcp | Protocol::Udp) {
            let key = FlowKey {
                src,
                dst,
                protocol: summary.protocol,
            };
            let stats = self.flows.entry(key).or_default();
            stats.packets += 1;
            stats.bytes += bytes;
        }
    }

    pub fn finish(self) -> FullAnalysis {
        let duration = match (self.first_ts, self.last_ts) {
            (Some(first), Some(last)) if last > first => last - first,
            _ => 0.0,
        };
        let packets_per_second = if duration > 0.0 {
            self.total_packets as f64 / duration
        } else {
            0.0
        };

        let top_talkers = top_n(&self.src_ips, TOP_TALKERS)
            .into_iter()
            .map(|(ip, packets)| TalkerEntry {
                ip: ip.to_string(),
                packets,
            })
            .collect();

        let mut protocols: Vec<ProtocolCount> = self
            .protocols
            .iter()
            .map(|(name, value)| ProtocolCount {
                name: name.to_string(),
                value: *value,
            })
            .collect();
        protocols.sort_by(|a, b| b.value.cmp(&a.value).then_with(|| a.name.cmp(&b.name)));

        let mut flow_entries: Vec<(FlowKey, FlowStats)> = self.flows.into_iter().collect();
        flow_entries.sort_by(|a, b| {
            b.1.packets
                .cmp(&a.1.packets)
                .then_with(|| a.0.src.cmp(&b.0.src))
                .then_with(|| a.0.dst.cmp(&b.0.dst))
        });
        flow_entries.truncate(TOP_FLOWS);
        let flows = flow_entries
            .into_iter()
            .map(|(key, stats)| FlowEntry {
                src_ip: key.src.to_string(),
                src_port: "*".to_string(),
                dst_ip: key.dst.to_string(),
                dst_port: "*".to_string(),
                protocol: key.protocol.as_str().to_string(),
                packets: stats.packets,
                bytes: stats.bytes,
            })
            .collect();

        let attack_path = build_graph(&self.connections, &self.src_ips);

        let mut timeline: Vec<TimelineBucket> = self
            .timeline
            .into_iter()
            .map(|(time, (packets, bytes))| TimelineBucket {
                time,
                packets,
                bytes,
            })
            .collect();
        timeline.sort_by_key(|b| b.time);

        FullAnalysis {
            statistics: Statistics {
                total_packets: self.total_packets,
                total_bytes: self.total_bytes,
                duration,
                packets_per_second,
                top_talkers,
            },
            protocols,
            flows,
            attack_path,
            timeline,
        }
    }

    fn finish_details(self) -> TraceDetails {
        let duration = match (self.first_ts, self.last_ts) {
            (Some(first), Some(last)) if last > first => last - first,
            _ => 0.0,
        };

        // The detail view keys protocols differently: every IPv4 packet
        // counts toward "IP" on top of its sub-protocol, and ARP gets its
        // own bucket
        let mut protocols: HashMap<String, u64> = HashMap::new();
        let ip_total: u64 = self.src_ips.values().sum();
        if ip_total > 0 {
            protocols.insert("IP".to_string(), ip_total);
        }
        for (name, value) in &self.protocols {
            match *name {
                "TCP" | "UDP" | "ICMP" => {
                    protocols.insert(name.to_string(), *value);
                }
                _ => {}
            }
        }
        if self.arp_packets > 0 {
            protocols.insert("ARP".to_string(), self.arp_packets);
        }

        TraceDetails {
            total_packets: self.total_packets,
            duration,
            start_time: self.first_ts,
            end_time: self.last_ts,
            protocols,
            top_src_ips: ip_entries(&self.src_ips),
            top_dst_ips: ip_entries(&self.dst_ips),
            top_src_ports: port_entries(&self.src_ports),
            top_dst_ports: port_entries(&self.dst_ports),
        }
    }
}

fn top_n<K: Copy + Ord>(counts: &HashMap<K, u64>, n: usize) -> Vec<(K, u64)> {
    let mut entries: Vec<(K, u64)> = counts.iter().map(|(k, v)| (*k, *v)).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.truncate(n);
    entries
}

fn ip_entries(counts: &HashMap<Ipv4Addr, u64>) -> Vec<TalkerEntry> {
    top_n(counts, TOP_TALKERS)
        .into_iter()
        .map(|(ip, packets)| TalkerEntry {
            ip: ip.to_string(),
            packets,
        })
        .collect()
}

fn port_entries(counts: &HashMap<u16, u64>) -> Vec<PortCount> {
    top_n(counts, TOP_TALKERS)
        .into_iter()
        .map(|(port, count)| PortCount { port, count })
        .collect()
}

/// Heaviest source-destination pairs as a renderable node-link graph.
/// Node category and size scale with how much the host sent.
fn build_graph(
    connections: &HashMap<(Ipv4Addr, Ipv4Addr), u64>,
    src_ips: &HashMap<Ipv4Addr, u64>,
) -> AttackPathGraph {
    let mut pairs: Vec<((Ipv4Addr, Ipv4Addr), u64)> =
        connections.iter().map(|(k, v)| (*k, *v)).collect();
    pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    pairs.truncate(TOP_LINKS);

    let mut links = Vec::with_capacity(pairs.len());
    let mut seen: Vec<Ipv4Addr> = Vec::new();
    for ((src, dst), count) in &pairs {
        links.push(GraphLink {
            source: src.to_string(),
            target: dst.to_string(),
            value: *count,
            line_style: GraphLineStyle {
                width: (*count as f64 / 5.0).min(5.0),
                curveness: 0.2,
            },
        });
        if !seen.contains(src) {
            seen.push(*src);
        }
        if !seen.contains(dst) {
            seen.push(*dst);
        }
    }

    let nodes = seen
        .into_iter()
        .map(|ip| {
            let sent = src_ips.get(&ip).copied().unwrap_or(0);
            let category = if sent > 1000 {
                2
            } else if sent > 100 {
                1
            } else {
                0
            };
            GraphNode {
                id: ip.to_string(),
                name: ip.to_string(),
                symbol_size: 20 + category * 10,
                category,
                label: GraphLabel { show: true },
            }
        })
        .collect();

    AttackPathGraph {
        nodes,
        links,
        categories: vec![
            GraphCategory {
                name: "Normal".to_string(),
            },
            GraphCategory {
                name: "Active".to_string(),
            },
            GraphCategory {
                name: "High frequency".to_string(),
            },
        ],
    }
}

/// Run the full analysis over a capture file
pub fn analyze_file(path: &Path) -> Result<FullAnalysis, TraceError> {
    let mut reader = TraceReader::open(path)?;
    let mut analyzer = Analyzer::new(reader.link_type());
    while let Some(record) = reader.next_packet()? {
        analyzer.feed(&record);
    }
    Ok(analyzer.finish())
}

/// Compute the endpoint and protocol breakdown for a capture file
pub fn trace_details(path: &Path) -> Result<TraceDetails, TraceError> {
    let mut reader = TraceReader::open(path)?;
    let mut analyzer = Analyzer::new(reader.link_type());
    while let Some(record) = reader.next_packet()? {
        analyzer.feed(&record);
    }
    Ok(analyzer.finish_details())
}
