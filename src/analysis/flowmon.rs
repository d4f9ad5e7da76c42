//! FlowMonitor XML reader.
//!
//! ns-3 FlowMonitor serializes one `<Flow>` element per flow under
//! `<FlowStats>`, and one more per flow under `<Ipv4FlowClassifier>` (or
//! `<Ipv6FlowClassifier>`) carrying the five-tuple. Both are matched by
//! `flowId`. Time attributes carry a unit suffix such as `+2.0e+09ns` and are
//! normalized to seconds.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use super::types::*;
use crate::utils::duration::time_or_zero;

// Opening or self-closing <Flow ...> tags; attribute values never contain '>'
static FLOW_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<Flow\s+([^>]*?)/?>").expect("Invalid flow tag regex"));

static ATTRIBUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(\w+)\s*=\s*"([^"]*)""#).expect("Invalid attribute regex"));

type Attributes<'a> = HashMap<&'a str, &'a str>;

fn attributes(tag_body: &str) -> Attributes<'_> {
    ATTRIBUTE
        .captures_iter(tag_body)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str();
            let value = caps.get(2)?.as_str();
            Some((name, value))
        })
        .collect()
}

fn count(attrs: &Attributes, name: &str) -> u64 {
    attrs
        .get(name)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

fn seconds(attrs: &Attributes, name: &str) -> f64 {
    time_or_zero(attrs.get(name).copied())
}

fn statistics_flow(flow_id: u32, attrs: &Attributes) -> FlowMonitorFlow {
    FlowMonitorFlow {
        flow_id,
        time_first_tx_packet: seconds(attrs, "timeFirstTxPacket"),
        time_first_rx_packet: seconds(attrs, "timeFirstRxPacket"),
        time_last_tx_packet: seconds(attrs, "timeLastTxPacket"),
        time_last_rx_packet: seconds(attrs, "timeLastRxPacket"),
        delay_sum: seconds(attrs, "delaySum"),
        jitter_sum: seconds(attrs, "jitterSum"),
        last_delay: seconds(attrs, "lastDelay"),
        max_delay: seconds(attrs, "maxDelay"),
        min_delay: seconds(attrs, "minDelay"),
        tx_bytes: count(attrs, "txBytes"),
        rx_bytes: count(attrs, "rxBytes"),
        tx_packets: count(attrs, "txPackets"),
        rx_packets: count(attrs, "rxPackets"),
        lost_packets: count(attrs, "lostPackets"),
        times_forwarded: count(attrs, "timesForwarded"),
        ..Default::default()
    }
}

fn apply_classifier(flow: &mut FlowMonitorFlow, attrs: &Attributes) {
    flow.protocol = attrs
        .get("protocol")
        .and_then(|p| p.trim().parse::<u8>().ok())
        .map(L4Protocol::from_number);
    flow.source_address = attrs.get("sourceAddress").map(|s| s.to_string());
    flow.dest_address = attrs.get("destinationAddress").map(|s| s.to_string());
    flow.source_port = attrs.get("sourcePort").and_then(|p| p.trim().parse().ok());
    flow.dest_port = attrs.get("destinationPort").and_then(|p| p.trim().parse().ok());
}

/// Parse FlowMonitor XML text into flows ordered by flow id.
///
/// Flows without a numeric `flowId` are skipped; malformed numeric or time
/// attributes read as 0.
pub fn parse_flowmon_str(xml: &str) -> Vec<FlowMonitorFlow> {
    let mut flows: BTreeMap<u32, FlowMonitorFlow> = BTreeMap::new();
    let mut classifiers: Vec<(u32, Attributes)> = Vec::new();

    for tag in FLOW_TAG.captures_iter(xml) {
        let Some(body) = tag.get(1) else {
            continue;
        };
        let attrs = attributes(body.as_str());
        let Some(flow_id) = attrs.get("flowId").and_then(|v| v.trim().parse::<u32>().ok()) else {
            log::debug!("Skipping <Flow> without a valid flowId");
            continue;
        };

        if attrs.contains_key("txPackets") || attrs.contains_key("rxPackets") {
            flows.insert(flow_id, statistics_flow(flow_id, &attrs));
        } else if attrs.contains_key("sourceAddress") {
            classifiers.push((flow_id, attrs));
        }
    }

    // Classifier entries may precede or follow the statistics section
    for (flow_id, attrs) in &classifiers {
        match flows.get_mut(flow_id) {
            Some(flow) => apply_classifier(flow, attrs),
            None => log::debug!("Classifier entry for unknown flow {}", flow_id),
        }
    }

    flows.into_values().collect()
}

/// Parse a FlowMonitor XML file
pub fn parse_flowmon_file(path: &Path) -> Result<Vec<FlowMonitorFlow>, SourceError> {
    let bytes = fs::read(path).map_err(|e| SourceError::from_io(path, e))?;
    let flows = parse_flowmon_str(&String::from_utf8_lossy(&bytes));
    log::info!("Parsed {} FlowMonitor flows from {}", flows.len(), path.display());
    Ok(flows)
}

/// Derive delay, jitter, loss and throughput for one flow
pub fn flow_stats(flow: &FlowMonitorFlow) -> FlowMonitorStats {
    let rx = flow.rx_packets as f64;
    let receive_window = flow.time_last_rx_packet - flow.time_first_rx_packet;

    FlowMonitorStats {
        flow_id: flow.flow_id,
        protocol: flow.protocol,
        source_address: flow.source_address.clone(),
        dest_address: flow.dest_address.clone(),
        dest_port: flow.dest_port,
        tx_packets: flow.tx_packets,
        rx_packets: flow.rx_packets,
        lost_packets: flow.lost_packets,
        tx_bytes: flow.tx_bytes,
        rx_bytes: flow.rx_bytes,
        avg_delay_ms: ratio(flow.delay_sum, rx) * 1000.0,
        avg_jitter_ms: ratio(flow.jitter_sum, rx) * 1000.0,
        min_delay_ms: flow.min_delay * 1000.0,
        max_delay_ms: flow.max_delay * 1000.0,
        loss_rate: ratio(
            flow.lost_packets as f64,
            (flow.tx_packets + flow.lost_packets) as f64,
        ),
        throughput_mbps: throughput_mbps(flow.rx_bytes, receive_window),
        times_forwarded: flow.times_forwarded,
    }
}

/// Derived statistics for every flow
pub fn flowmon_stats(flows: &[FlowMonitorFlow]) -> Vec<FlowMonitorStats> {
    flows.iter().map(flow_stats).collect()
}

/// Totals and overall loss rate across all flows
pub fn flowmon_totals(flows: &[FlowMonitorFlow]) -> FlowMonitorTotals {
    let mut totals = FlowMonitorTotals {
        total_flows: flows.len(),
        ..Default::default()
    };

    for flow in flows {
        totals.tx_bytes += flow.tx_bytes;
        totals.rx_bytes += flow.rx_bytes;
        totals.tx_packets += flow.tx_packets;
        totals.rx_packets += flow.rx_packets;
        totals.lost_packets += flow.lost_packets;
        if flow.rx_packets == 0 {
            totals.failed_flows += 1;
        }
    }
    totals.loss_rate = ratio(
        totals.lost_packets as f64,
        (totals.tx_packets + totals.lost_packets) as f64,
    );
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FLOWMON_XML: &str = r#"<?xml version="1.0" ?>
<FlowMonitor>
  <FlowStats>
    <Flow flowId="1" timeFirstTxPacket="+2.0e+09ns" timeFirstRxPacket="+2.025e+09ns" timeLastTxPacket="+3.0e+09ns" timeLastRxPacket="+4.025e+09ns" delaySum="+250ms" jitterSum="+20000000ns" lastDelay="+25ms" maxDelay="+30ms" minDelay="+20ms" txBytes="10000" rxBytes="9000" txPackets="10" rxPackets="10" lostPackets="0" timesForwarded="20">
      <delayHistogram nBins="1" >
        <bin index="0" start="0" width="0.001" count="10" />
      </delayHistogram>
    </Flow>
    <Flow flowId="2" timeFirstTxPacket="+1.5s" timeFirstRxPacket="+0ns" timeLastTxPacket="+2.5s" timeLastRxPacket="+0ns" delaySum="+0ns" jitterSum="+0ns" lastDelay="+0ns" txBytes="5000" rxBytes="0" txPackets="5" rxPackets="0" lostPackets="5" timesForwarded="0">
    </Flow>
    <Flow flowId="x" txPackets="1" />
  </FlowStats>
  <Ipv4FlowClassifier>
    <Flow flowId="1" sourceAddress="10.0.0.1" destinationAddress="10.0.0.10" protocol="17" sourcePort="49153" destinationPort="5000" />
    <Flow flowId="2" sourceAddress="10.0.0.2" destinationAddress="10.0.0.10" protocol="6" sourcePort="49154" destinationPort="8080" />
  </Ipv4FlowClassifier>
</FlowMonitor>
"#;

    #[test]
    fn test_parse_flows_and_classifier() {
        let flows = parse_flowmon_str(FLOWMON_XML);
        assert_eq!(flows.len(), 2);

        let flow = &flows[0];
        assert_eq!(flow.flow_id, 1);
        assert_eq!(flow.time_first_tx_packet, 2.0);
        assert_eq!(flow.delay_sum, 0.25);
        assert_eq!(flow.jitter_sum, 0.02);
        assert_eq!(flow.min_delay, 0.02);
        assert_eq!(flow.protocol, Some(L4Protocol::Udp));
        assert_eq!(flow.source_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(flow.dest_port, Some(5000));

        assert_eq!(flows[1].protocol, Some(L4Protocol::Tcp));
        assert_eq!(flows[1].time_first_tx_packet, 1.5);
        // Missing attributes read as zero
        assert_eq!(flows[1].max_delay, 0.0);
    }

    #[test]
    fn test_malformed_attribute_reads_zero() {
        let xml = r#"<Flow flowId="3" delaySum="soon" txPackets="many" rxPackets="2" />"#;
        let flows = parse_flowmon_str(xml);
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].delay_sum, 0.0);
        assert_eq!(flows[0].tx_packets, 0);
        assert_eq!(flows[0].rx_packets, 2);
    }

    #[test]
    fn test_flow_stats() {
        let flows = parse_flowmon_str(FLOWMON_XML);
        let stats = flowmon_stats(&flows);

        assert!((stats[0].avg_delay_ms - 25.0).abs() < 1e-9);
        assert!((stats[0].avg_jitter_ms - 2.0).abs() < 1e-9);
        assert!((stats[0].max_delay_ms - 30.0).abs() < 1e-9);
        assert_eq!(stats[0].loss_rate, 0.0);
        // 9000 bytes over a 2 s receive window
        assert!((stats[0].throughput_mbps - 0.036).abs() < 1e-9);

        // Nothing received: all guarded values are zero, not NaN
        assert_eq!(stats[1].avg_delay_ms, 0.0);
        assert_eq!(stats[1].throughput_mbps, 0.0);
        assert_eq!(stats[1].loss_rate, 0.5);
    }

    #[test]
    fn test_totals() {
        let flows = parse_flowmon_str(FLOWMON_XML);
        let totals = flowmon_totals(&flows);
        assert_eq!(totals.total_flows, 2);
        assert_eq!(totals.tx_packets, 15);
        assert_eq!(totals.lost_packets, 5);
        assert_eq!(totals.failed_flows, 1);
        assert!((totals.loss_rate - 0.25).abs() < 1e-12);

        assert_eq!(flowmon_totals(&[]), FlowMonitorTotals::default());
    }

    #[test]
    fn test_parse_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(FLOWMON_XML.as_bytes()).unwrap();
        assert_eq!(parse_flowmon_file(file.path()).unwrap().len(), 2);

        let missing = parse_flowmon_file(Path::new("/nonexistent/flowmon.xml"));
        assert!(matches!(missing, Err(SourceError::NotFound { .. })));
    }
}
