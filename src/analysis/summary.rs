//! Whole-trace counters and binned throughput.

use std::collections::{BTreeMap, BTreeSet};

use super::types::*;

/// MAC frame type of Wi-Fi QoS data frames
const QOS_DATA: &str = "QOSDATA";

/// Longest series emitted with empty bins filled in
const MAX_DENSE_BINS: u64 = 1_000_000;

/// Count records by event, protocol, node, UDP port and PHY rate
pub fn summarize(records: &[TraceRecord]) -> TraceSummary {
    let mut summary = TraceSummary {
        total_records: records.len(),
        ..Default::default()
    };
    let mut nodes: BTreeSet<u32> = BTreeSet::new();
    let mut retries: u64 = 0;

    for record in records {
        match record.event {
            TraceEvent::Transmit => summary.transmitted_count += 1,
            TraceEvent::Receive => summary.received_count += 1,
        }
        match record.layer4_protocol {
            L4Protocol::Udp => summary.udp_records += 1,
            L4Protocol::Tcp => summary.tcp_records += 1,
            L4Protocol::Other => summary.other_records += 1,
            L4Protocol::Unknown => summary.unknown_records += 1,
        }
        if record.tunneled {
            summary.tunneled_records += 1;
        }
        if let Some(node) = record.node {
            nodes.insert(node);
        }
        summary.last_timestamp = summary.last_timestamp.max(record.time);

        if record.layer4_protocol == L4Protocol::Udp {
            if let Some(port) = record.dest_port {
                *summary.udp_bytes_by_port.entry(port).or_insert(0) +=
                    record.byte_length.unwrap_or(0);
            }
        }
        if let Some(ref rate) = record.phy_rate {
            *summary.frames_by_rate.entry(rate.clone()).or_insert(0) += 1;
        }

        if record.mac_type.as_deref() == Some(QOS_DATA) {
            match record.event {
                TraceEvent::Transmit => summary.data_frames_transmitted += 1,
                TraceEvent::Receive => summary.data_frames_received += 1,
            }
            if record.mac_retry == Some(true) {
                retries += 1;
            }
        }
    }

    summary.unique_nodes = nodes.len();
    summary.delivery_ratio = ratio(
        summary.received_count as f64,
        summary.transmitted_count as f64,
    );
    summary.data_delivery_ratio = ratio(
        summary.data_frames_received as f64,
        summary.data_frames_transmitted as f64,
    );
    summary.data_retry_rate = ratio(
        retries as f64,
        (summary.data_frames_transmitted + summary.data_frames_received) as f64,
    );
    summary
}

/// Bin the bytes of matching records into fixed-width windows starting at 0.
///
/// Windows run up to the last one holding a matching record, empty windows
/// included. A series longer than `MAX_DENSE_BINS` keeps only its non-empty
/// windows. Records with a negative or out-of-range time are left out.
/// Returns nothing for a non-positive bin width.
pub fn throughput_series(
    records: &[TraceRecord],
    protocol: Option<L4Protocol>,
    event: Option<TraceEvent>,
    bin_seconds: f64,
) -> Vec<ThroughputBin> {
    if !(bin_seconds > 0.0 && bin_seconds.is_finite()) {
        return Vec::new();
    }

    let matching = records.iter().filter(|r| {
        protocol.map_or(true, |p| r.layer4_protocol == p) && event.map_or(true, |e| r.event == e)
    });

    let mut bytes_per_bin: BTreeMap<u64, u64> = BTreeMap::new();
    let mut out_of_range = 0usize;
    for record in matching {
        let index = (record.time / bin_seconds).floor();
        // NaN fails both comparisons
        if !(index >= 0.0 && index < u64::MAX as f64) {
            out_of_range += 1;
            continue;
        }
        *bytes_per_bin.entry(index as u64).or_insert(0) += record.byte_length.unwrap_or(0);
    }
    if out_of_range > 0 {
        log::warn!("{} records outside the binnable time range", out_of_range);
    }

    let bin = |index: u64, bytes: u64| ThroughputBin {
        protocol,
        start: index as f64 * bin_seconds,
        end: (index as f64 + 1.0) * bin_seconds,
        bytes,
        mbps: throughput_mbps(bytes, bin_seconds),
    };

    let last_index = bytes_per_bin.keys().next_back().copied();
    match last_index {
        None => Vec::new(),
        Some(last) if last < MAX_DENSE_BINS => (0..=last)
            .map(|i| bin(i, bytes_per_bin.get(&i).copied().unwrap_or(0)))
            .collect(),
        Some(last) => {
            log::warn!(
                "Throughput series spans {} bins of {}s, writing non-empty bins only",
                last.saturating_add(1),
                bin_seconds
            );
            bytes_per_bin.into_iter().map(|(i, bytes)| bin(i, bytes)).collect()
        }
    }
}

/// One throughput series per protocol: the filtered one, else UDP then TCP
pub fn throughput_by_protocol(
    records: &[TraceRecord],
    protocol: Option<L4Protocol>,
    event: Option<TraceEvent>,
    bin_seconds: f64,
) -> Vec<ThroughputBin> {
    let protocols = match protocol {
        Some(p) => vec![p],
        None => vec![L4Protocol::Udp, L4Protocol::Tcp],
    };
    protocols
        .into_iter()
        .flat_map(|p| throughput_series(records, Some(p), event, bin_seconds))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(event: TraceEvent, time: f64, protocol: L4Protocol, bytes: u64) -> TraceRecord {
        TraceRecord {
            event,
            time,
            node: None,
            layer4_protocol: protocol,
            source_address: Some("10.0.0.1".to_string()),
            dest_address: Some("10.0.0.10".to_string()),
            source_port: None,
            dest_port: Some(5000),
            packet_id: None,
            byte_length: Some(bytes),
            tunneled: false,
            tunnel_id: None,
            direction: None,
            phy_rate: None,
            mac_type: None,
            mac_retry: None,
            source_file: None,
        }
    }

    fn wifi(event: TraceEvent, node: u32, rate: &str, retry: bool) -> TraceRecord {
        TraceRecord {
            node: Some(node),
            phy_rate: Some(rate.to_string()),
            mac_type: Some(QOS_DATA.to_string()),
            mac_retry: Some(retry),
            ..record(event, 1.0, L4Protocol::Udp, 1052)
        }
    }

    #[test]
    fn test_summarize_counts() {
        let mut tunneled = record(TraceEvent::Receive, 2.5, L4Protocol::Tcp, 60);
        tunneled.tunneled = true;
        let records = vec![
            record(TraceEvent::Transmit, 1.0, L4Protocol::Udp, 100),
            record(TraceEvent::Transmit, 1.5, L4Protocol::Udp, 100),
            record(TraceEvent::Receive, 2.0, L4Protocol::Udp, 100),
            tunneled,
        ];
        let summary = summarize(&records);
        assert_eq!(summary.total_records, 4);
        assert_eq!(summary.transmitted_count, 2);
        assert_eq!(summary.received_count, 2);
        assert_eq!(summary.delivery_ratio, 1.0);
        assert_eq!(summary.udp_records, 3);
        assert_eq!(summary.tcp_records, 1);
        assert_eq!(summary.tunneled_records, 1);
        assert_eq!(summary.last_timestamp, 2.5);
        assert_eq!(summary.udp_bytes_by_port.get(&5000), Some(&300));
        assert_eq!(summary.unique_nodes, 0);
    }

    #[test]
    fn test_summarize_wifi_frames() {
        let records = vec![
            wifi(TraceEvent::Transmit, 0, "OfdmRate6Mbps", false),
            wifi(TraceEvent::Transmit, 0, "OfdmRate6Mbps", true),
            wifi(TraceEvent::Receive, 1, "OfdmRate12Mbps", false),
            wifi(TraceEvent::Receive, 2, "OfdmRate6Mbps", false),
        ];
        let summary = summarize(&records);
        assert_eq!(summary.unique_nodes, 3);
        assert_eq!(summary.data_frames_transmitted, 2);
        assert_eq!(summary.data_frames_received, 2);
        assert_eq!(summary.data_delivery_ratio, 1.0);
        assert_eq!(summary.data_retry_rate, 0.25);
        assert_eq!(summary.frames_by_rate.get("OfdmRate6Mbps"), Some(&3));
    }

    #[test]
    fn test_summarize_empty() {
        let summary = summarize(&[]);
        assert_eq!(summary, TraceSummary::default());
    }

    #[test]
    fn test_throughput_series() {
        let records = vec![
            record(TraceEvent::Receive, 0.1, L4Protocol::Udp, 1000),
            record(TraceEvent::Receive, 0.4, L4Protocol::Udp, 1000),
            record(TraceEvent::Receive, 1.2, L4Protocol::Udp, 500),
            record(TraceEvent::Transmit, 0.2, L4Protocol::Udp, 9999),
            record(TraceEvent::Receive, 0.3, L4Protocol::Tcp, 9999),
        ];
        let bins = throughput_series(&records, Some(L4Protocol::Udp), Some(TraceEvent::Receive), 0.5);
        assert_eq!(bins.len(), 3);
        assert_eq!(bins[0].bytes, 2000);
        assert_eq!(bins[1].bytes, 0);
        assert_eq!(bins[2].bytes, 500);
        assert_eq!(bins[2].start, 1.0);
        assert!((bins[0].mbps - 0.032).abs() < 1e-12);
        assert_eq!(bins[0].protocol, Some(L4Protocol::Udp));

        assert!(throughput_series(&records, None, None, 0.0).is_empty());
        assert!(throughput_series(&[], None, None, 0.5).is_empty());
    }

    #[test]
    fn test_data_delivery_ratio_counts_qos_frames_only() {
        let mut beacon = wifi(TraceEvent::Transmit, 0, "OfdmRate6Mbps", false);
        beacon.mac_type = Some("MGT_BEACON".to_string());
        let records = vec![
            wifi(TraceEvent::Transmit, 0, "OfdmRate6Mbps", false),
            wifi(TraceEvent::Transmit, 0, "OfdmRate6Mbps", false),
            wifi(TraceEvent::Transmit, 0, "OfdmRate6Mbps", false),
            wifi(TraceEvent::Receive, 1, "OfdmRate6Mbps", false),
            beacon,
        ];
        let summary = summarize(&records);
        assert!((summary.data_delivery_ratio - 1.0 / 3.0).abs() < 1e-12);
        assert!((summary.delivery_ratio - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_throughput_series_extreme_times() {
        let records = vec![
            record(TraceEvent::Transmit, 1e300, L4Protocol::Udp, 100),
            record(TraceEvent::Transmit, -1.0, L4Protocol::Udp, 100),
            record(TraceEvent::Transmit, f64::INFINITY, L4Protocol::Udp, 100),
        ];
        assert!(throughput_series(&records, None, None, 0.5).is_empty());
    }

    #[test]
    fn test_throughput_series_sparse_when_too_long() {
        let records = vec![
            record(TraceEvent::Transmit, 0.2, L4Protocol::Udp, 100),
            record(TraceEvent::Transmit, 1e9, L4Protocol::Udp, 300),
        ];
        let bins = throughput_series(&records, None, None, 0.5);
        assert_eq!(bins.len(), 2);
        assert_eq!(bins[0].start, 0.0);
        assert_eq!(bins[1].bytes, 300);
        assert_eq!(bins[1].start, 1e9);
        assert_eq!(bins[1].end, 1e9 + 0.5);
    }

    #[test]
    fn test_throughput_by_protocol() {
        let records = vec![
            record(TraceEvent::Transmit, 0.1, L4Protocol::Udp, 1000),
            record(TraceEvent::Receive, 0.2, L4Protocol::Udp, 7777),
            record(TraceEvent::Transmit, 0.6, L4Protocol::Tcp, 60),
            record(TraceEvent::Transmit, 0.3, L4Protocol::Other, 5555),
        ];
        let bins = throughput_by_protocol(&records, None, Some(TraceEvent::Transmit), 0.5);
        assert_eq!(bins.len(), 3);
        assert_eq!(bins[0].protocol, Some(L4Protocol::Udp));
        assert_eq!(bins[0].bytes, 1000);
        assert_eq!(bins[1].protocol, Some(L4Protocol::Tcp));
        assert_eq!(bins[1].bytes, 0);
        assert_eq!(bins[2].bytes, 60);

        let tcp_only = throughput_by_protocol(&records, Some(L4Protocol::Tcp), None, 0.5);
        assert!(tcp_only.iter().all(|b| b.protocol == Some(L4Protocol::Tcp)));
        assert_eq!(tcp_only.len(), 2);
    }
}
