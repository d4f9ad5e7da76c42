//! Core data types for trace and flow analysis.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Simulation timestamp in seconds since the start of the simulation
pub type SimTime = f64;

/// Trace event kind from the first column of a trace line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TraceEvent {
    /// `t` - packet transmitted
    #[serde(alias = "transmit", alias = "t")]
    Transmit,
    /// `r` - packet received
    #[serde(alias = "receive", alias = "r")]
    Receive,
}

impl TraceEvent {
    /// Parse the single-character event marker used by ns-3 ASCII traces
    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "t" => Some(TraceEvent::Transmit),
            "r" => Some(TraceEvent::Receive),
            _ => None,
        }
    }
}

impl std::str::FromStr for TraceEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "t" | "transmit" => Ok(TraceEvent::Transmit),
            "r" | "receive" => Ok(TraceEvent::Receive),
            _ => Err(format!("Unknown trace event: {}", s)),
        }
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEvent::Transmit => write!(f, "t"),
            TraceEvent::Receive => write!(f, "r"),
        }
    }
}

/// Transport protocol carried by a network-layer header
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum L4Protocol {
    #[serde(alias = "udp")]
    Udp,
    #[serde(alias = "tcp")]
    Tcp,
    /// A protocol number other than UDP or TCP
    #[serde(alias = "other")]
    Other,
    /// No protocol number could be read
    #[serde(alias = "unknown")]
    Unknown,
}

impl L4Protocol {
    /// Classify an IP protocol number
    pub fn from_number(protocol: u8) -> Self {
        match protocol {
            17 => L4Protocol::Udp,
            6 => L4Protocol::Tcp,
            _ => L4Protocol::Other,
        }
    }
}

impl fmt::Display for L4Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            L4Protocol::Udp => write!(f, "UDP"),
            L4Protocol::Tcp => write!(f, "TCP"),
            L4Protocol::Other => write!(f, "OTHER"),
            L4Protocol::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl std::str::FromStr for L4Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "udp" => Ok(L4Protocol::Udp),
            "tcp" => Ok(L4Protocol::Tcp),
            "other" => Ok(L4Protocol::Other),
            "unknown" => Ok(L4Protocol::Unknown),
            _ => Err(format!("Unknown protocol: {}", s)),
        }
    }
}

/// One parsed line of a trace file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub event: TraceEvent,
    pub time: SimTime,
    pub node: Option<u32>,
    pub layer4_protocol: L4Protocol,
    pub source_address: Option<String>,
    pub dest_address: Option<String>,
    pub source_port: Option<u16>,
    pub dest_port: Option<u16>,
    /// IPv4 identification field, shared by all observations of one packet
    pub packet_id: Option<u32>,
    pub byte_length: Option<u64>,
    pub tunneled: bool,
    /// GTP-U tunnel endpoint id, when the tunnel header was printed
    pub tunnel_id: Option<u32>,
    /// Trace source token such as `Tx`, `Rx` or `Drop`
    pub direction: Option<String>,
    pub phy_rate: Option<String>,
    pub mac_type: Option<String>,
    pub mac_retry: Option<bool>,
    pub source_file: Option<String>,
}

impl TraceRecord {
    /// Flow key of this record, if both endpoint addresses are known
    pub fn flow_key(&self) -> Option<FlowKey> {
        Some(FlowKey {
            source_address: self.source_address.clone()?,
            dest_address: self.dest_address.clone()?,
            dest_port: self.dest_port,
        })
    }

    /// Check whether this record belongs to `key` without allocating
    pub fn matches_flow(&self, key: &FlowKey) -> bool {
        self.source_address.as_deref() == Some(key.source_address.as_str())
            && self.dest_address.as_deref() == Some(key.dest_address.as_str())
            && self.dest_port == key.dest_port
    }
}

/// Flow aggregation key: (source address, destination address, destination port)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlowKey {
    pub source_address: String,
    pub dest_address: String,
    pub dest_port: Option<u16>,
}

impl FlowKey {
    pub fn new(source_address: &str, dest_address: &str, dest_port: Option<u16>) -> Self {
        Self {
            source_address: source_address.to_string(),
            dest_address: dest_address.to_string(),
            dest_port,
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.dest_port {
            Some(port) => write!(f, "{} > {}:{}", self.source_address, self.dest_address, port),
            None => write!(f, "{} > {}", self.source_address, self.dest_address),
        }
    }
}

/// Per-flow statistics computed from trace records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowStats {
    pub source_address: String,
    pub dest_address: String,
    pub dest_port: Option<u16>,
    pub transmitted_count: u64,
    pub received_count: u64,
    pub delivery_ratio: f64,
    pub total_bytes: u64,
    pub duration_seconds: f64,
    pub throughput_mbps: f64,
}

impl FlowStats {
    pub fn key(&self) -> FlowKey {
        FlowKey::new(&self.source_address, &self.dest_address, self.dest_port)
    }
}

/// Per-tunnel statistics, keyed by GTP-U tunnel endpoint id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunnelStats {
    pub tunnel_id: u32,
    pub transmitted_count: u64,
    pub received_count: u64,
    pub delivery_ratio: f64,
    pub total_bytes: u64,
    pub duration_seconds: f64,
    pub throughput_mbps: f64,
}

/// Reconstructed hop sequence of one packet within a flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEntry {
    pub packet_id: u32,
    pub source_address: String,
    pub dest_address: String,
    pub dest_port: Option<u16>,
    /// Node ids joined with "->", e.g. "2->5->9"
    pub hops: String,
    pub hop_count: usize,
}

/// Most frequent hop sequence of a flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DominantPath {
    pub hops: String,
    pub hop_count: usize,
    /// Number of packets that took this path
    pub occurrences: usize,
    /// Number of packets with a reconstructed path
    pub total_packets: usize,
}

/// Path reconstruction result for one requested flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowPathReport {
    pub flow: FlowKey,
    pub dominant_path: Option<DominantPath>,
    pub paths: Vec<PathEntry>,
}

/// One `<Flow>` entry of a FlowMonitor XML file, times in seconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowMonitorFlow {
    pub flow_id: u32,
    pub protocol: Option<L4Protocol>,
    pub source_address: Option<String>,
    pub dest_address: Option<String>,
    pub source_port: Option<u16>,
    pub dest_port: Option<u16>,
    pub time_first_tx_packet: f64,
    pub time_first_rx_packet: f64,
    pub time_last_tx_packet: f64,
    pub time_last_rx_packet: f64,
    pub delay_sum: f64,
    pub jitter_sum: f64,
    pub last_delay: f64,
    pub max_delay: f64,
    pub min_delay: f64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub lost_packets: u64,
    pub times_forwarded: u64,
}

/// Derived metrics for one FlowMonitor flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowMonitorStats {
    pub flow_id: u32,
    pub protocol: Option<L4Protocol>,
    pub source_address: Option<String>,
    pub dest_address: Option<String>,
    pub dest_port: Option<u16>,
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub lost_packets: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub avg_delay_ms: f64,
    pub avg_jitter_ms: f64,
    pub min_delay_ms: f64,
    pub max_delay_ms: f64,
    pub loss_rate: f64,
    pub throughput_mbps: f64,
    pub times_forwarded: u64,
}

/// Totals across all FlowMonitor flows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowMonitorTotals {
    pub total_flows: usize,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub lost_packets: u64,
    pub loss_rate: f64,
    /// Flows that delivered nothing
    pub failed_flows: usize,
}

/// One row of a packet-capture derived table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRow {
    pub time: SimTime,
    pub source_address: String,
    pub dest_address: String,
    pub source_port: u16,
    pub dest_port: u16,
    pub stream_id: u64,
    pub length: u64,
    pub flags: String,
}

/// Per-stream statistics from capture rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamStats {
    pub stream_id: u64,
    pub source_address: String,
    pub dest_address: String,
    pub source_port: u16,
    pub dest_port: u16,
    pub packet_count: u64,
    pub total_bytes: u64,
    pub duration_seconds: f64,
    pub throughput_mbps: f64,
}

/// Whole-trace counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceSummary {
    pub total_records: usize,
    pub transmitted_count: u64,
    pub received_count: u64,
    pub delivery_ratio: f64,
    pub udp_records: usize,
    pub tcp_records: usize,
    pub other_records: usize,
    pub unknown_records: usize,
    pub tunneled_records: usize,
    pub unique_nodes: usize,
    pub last_timestamp: SimTime,
    /// Bytes seen per UDP destination port
    pub udp_bytes_by_port: BTreeMap<u16, u64>,
    /// Frames per PHY rate label
    pub frames_by_rate: BTreeMap<String, u64>,
    pub data_frames_transmitted: u64,
    pub data_frames_received: u64,
    /// Received over transmitted QoS data frames
    pub data_delivery_ratio: f64,
    pub data_retry_rate: f64,
}

/// Bytes observed in one fixed-width time bin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputBin {
    /// Protocol the series was restricted to, if any
    pub protocol: Option<L4Protocol>,
    pub start: SimTime,
    pub end: SimTime,
    pub bytes: u64,
    pub mbps: f64,
}

// ============================================================================
// Report Types
// ============================================================================

/// FlowMonitor section of the report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowMonitorReport {
    pub source: String,
    pub totals: FlowMonitorTotals,
    pub flows: Vec<FlowMonitorStats>,
}

/// Complete analysis report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub metadata: AnalysisMetadata,
    pub summary: TraceSummary,
    pub flows: Vec<FlowStats>,
    pub tunnels: Vec<TunnelStats>,
    pub paths: Vec<FlowPathReport>,
    pub throughput: Vec<ThroughputBin>,
    pub flowmon: Option<FlowMonitorReport>,
    pub streams: Vec<StreamStats>,
}

/// Report metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub analysis_timestamp: String,
    pub trace_files: Vec<String>,
    pub missing_inputs: Vec<String>,
    pub total_records: usize,
    pub skipped_lines: usize,
    pub protocol_filter: Option<L4Protocol>,
    pub throughput_event: Option<TraceEvent>,
    pub throughput_bin_seconds: f64,
}

/// Errors that can occur while opening an input source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Input not found: {path}")]
    NotFound { path: String },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl SourceError {
    /// Classify an I/O error from opening `path`
    pub fn from_io(path: &std::path::Path, err: std::io::Error) -> Self {
        let path = path.display().to_string();
        if err.kind() == std::io::ErrorKind::NotFound {
            SourceError::NotFound { path }
        } else {
            SourceError::Io { path, source: err }
        }
    }
}

/// Guarded ratio: zero when the denominator is zero
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Throughput in Mbit/s over `duration_seconds`, zero for an empty window
pub fn throughput_mbps(bytes: u64, duration_seconds: f64) -> f64 {
    ratio(bytes as f64 * 8.0 / 1e6, duration_seconds)
}
