//! Header grammars for ns-3 ASCII trace flavors.
//!
//! A [`TraceGrammar`] bundles the patterns needed to read one trace flavor:
//! the line header (event, time and per-line metadata), the network-layer
//! header, the transport headers and the tunnel header. The parser is
//! driven entirely by this table, so a new flavor only needs a new grammar.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::types::L4Protocol;

/// Built-in trace flavors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TraceFormat {
    /// `Ipv4L3Protocol` Tx/Rx traces: `t 1.0 /NodeList/0/$ns3::Ipv4L3Protocol/Tx(1) ...`
    Ipv4L3,
    /// Wi-Fi MAC traces: `t 1.0 OfdmRate6Mbps ns3::WifiMacHeader (...) ...`
    WifiMac,
}

impl TraceFormat {
    pub const ALL: [TraceFormat; 2] = [TraceFormat::Ipv4L3, TraceFormat::WifiMac];

    /// Compiled grammar for this format
    pub fn grammar(self) -> &'static TraceGrammar {
        match self {
            TraceFormat::Ipv4L3 => &IPV4_L3,
            TraceFormat::WifiMac => &WIFI_MAC,
        }
    }
}

impl fmt::Display for TraceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceFormat::Ipv4L3 => write!(f, "ipv4-l3"),
            TraceFormat::WifiMac => write!(f, "wifi-mac"),
        }
    }
}

impl FromStr for TraceFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ipv4-l3" | "ipv4" => Ok(TraceFormat::Ipv4L3),
            "wifi-mac" | "wifi" => Ok(TraceFormat::WifiMac),
            _ => Err(format!("Unknown trace format: {}", s)),
        }
    }
}

/// A transport header pattern and the protocol it identifies.
///
/// The pattern must capture `src_port` and `dst_port`.
#[derive(Debug, Clone)]
pub struct TransportPattern {
    pub protocol: L4Protocol,
    pub regex: Regex,
}

/// Patterns describing one trace flavor
#[derive(Debug, Clone)]
pub struct TraceGrammar {
    pub format: TraceFormat,
    /// Line header. Must capture `event` and `time`; may capture `node`,
    /// `direction`, `rate` and `mac`.
    pub line_header: Regex,
    /// File-name pattern capturing `node`, for formats that keep the node
    /// id out of the line itself
    pub node_from_filename: Option<Regex>,
    /// Network-layer header. Must capture `body`, `length`, `src` and `dst`.
    pub network_header: Regex,
    /// Transport headers, tried in order
    pub transport_headers: Vec<TransportPattern>,
    /// Tunnel header, may capture `teid`
    pub tunnel_header: Regex,
}

// Header fields read from the captured body of a network-layer header. ns-3
// prints `id` before `protocol`, other tools the other way round.
static IPV4_PROTOCOL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bprotocol\s+(\d+)").expect("Invalid protocol regex"));
static IPV4_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bid\s+(\d+)").expect("Invalid id regex"));

// MAC summary fields of Wi-Fi traces
static MAC_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\w+)").expect("Invalid mac type regex"));
static MAC_RETRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Retry=([01])").expect("Invalid retry regex"));

/// Read the IP protocol number from a network header body
pub fn header_protocol(body: &str) -> Option<u8> {
    IPV4_PROTOCOL.captures(body)?.get(1)?.as_str().parse().ok()
}

/// Read the IPv4 identification from a network header body
pub fn header_packet_id(body: &str) -> Option<u32> {
    IPV4_ID.captures(body)?.get(1)?.as_str().parse().ok()
}

/// Read the frame type (first word, e.g. `QOSDATA`) from a MAC summary
pub fn mac_type(summary: &str) -> Option<String> {
    MAC_TYPE.captures(summary)?.get(1).map(|m| m.as_str().to_string())
}

/// Read the retry flag from a MAC summary
pub fn mac_retry(summary: &str) -> Option<bool> {
    MAC_RETRY.captures(summary)?.get(1).map(|m| m.as_str() == "1")
}

const NETWORK_HEADER: &str = r"ns3::Ipv4Header\s+\((?P<body>.*?)length:\s*(?P<length>\d+)\s+(?P<src>\d+\.\d+\.\d+\.\d+)\s*>\s*(?P<dst>\d+\.\d+\.\d+\.\d+)\s*\)";
const UDP_HEADER: &str = r"ns3::UdpHeader\s+\(length:\s*\d+\s+(?P<src_port>\d+)\s*>\s*(?P<dst_port>\d+)\s*\)";
const TCP_HEADER: &str = r"ns3::TcpHeader\s+\(\s*(?P<src_port>\d+)\s*>\s*(?P<dst_port>\d+)";
const TCP_HEADER_FIELDS: &str = r"ns3::TcpHeader\s+\([^)]*?SrcPort=\s*(?P<src_port>\d+),\s*DstPort=\s*(?P<dst_port>\d+)";
const GTPU_HEADER: &str = r"ns3::GtpuHeader\s+\(.*?teid=(?P<teid>\d+)";

fn transport_headers() -> Vec<TransportPattern> {
    vec![
        TransportPattern {
            protocol: L4Protocol::Udp,
            regex: Regex::new(UDP_HEADER).expect("Invalid udp header regex"),
        },
        TransportPattern {
            protocol: L4Protocol::Tcp,
            regex: Regex::new(TCP_HEADER).expect("Invalid tcp header regex"),
        },
        TransportPattern {
            protocol: L4Protocol::Tcp,
            regex: Regex::new(TCP_HEADER_FIELDS).expect("Invalid tcp fields regex"),
        },
    ]
}

impl TraceGrammar {
    /// Grammar for `Ipv4L3Protocol` Tx/Rx/Drop traces
    pub fn ipv4_l3() -> Self {
        Self {
            format: TraceFormat::Ipv4L3,
            line_header: Regex::new(
                r"^(?P<event>[tr])\s+(?P<time>\d+(?:\.\d*)?(?:[eE][-+]?\d+)?)\s+/NodeList/(?P<node>\d+)/\S*?(?P<direction>\w+)\(\d*\)"
            ).expect("Invalid ipv4-l3 line regex"),
            node_from_filename: None,
            network_header: Regex::new(NETWORK_HEADER).expect("Invalid network header regex"),
            transport_headers: transport_headers(),
            tunnel_header: Regex::new(GTPU_HEADER).expect("Invalid tunnel header regex"),
        }
    }

    /// Grammar for Wi-Fi MAC level traces with the node id in the file name
    pub fn wifi_mac() -> Self {
        Self {
            format: TraceFormat::WifiMac,
            line_header: Regex::new(
                r"^(?P<event>[tr])\s+(?P<time>\d+(?:\.\d*)?(?:[eE][-+]?\d+)?)\s+(?P<rate>\S+)\s+ns3::WifiMacHeader\s+\((?P<mac>[^)]*)\)"
            ).expect("Invalid wifi-mac line regex"),
            node_from_filename: Some(
                Regex::new(r"ascii_traces-(?P<node>\d+)-").expect("Invalid file name regex"),
            ),
            network_header: Regex::new(NETWORK_HEADER).expect("Invalid network header regex"),
            transport_headers: transport_headers(),
            tunnel_header: Regex::new(GTPU_HEADER).expect("Invalid tunnel header regex"),
        }
    }

    /// Node id encoded in a trace file name, if this format has one
    pub fn node_from_filename(&self, file_name: &str) -> Option<u32> {
        self.node_from_filename
            .as_ref()?
            .captures(file_name)?
            .name("node")?
            .as_str()
            .parse()
            .ok()
    }
}

static IPV4_L3: LazyLock<TraceGrammar> = LazyLock::new(TraceGrammar::ipv4_l3);
static WIFI_MAC: LazyLock<TraceGrammar> = LazyLock::new(TraceGrammar::wifi_mac);
