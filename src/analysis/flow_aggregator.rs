//! Per-flow and per-tunnel statistics from parsed trace records.
//!
//! Records are grouped in ordered maps and accumulated in input order, so
//! re-running an aggregation on the same records gives bit-identical output.

use std::collections::BTreeMap;

use super::types::*;

/// Running counters for one group of records
#[derive(Debug, Clone, Copy)]
struct Counters {
    transmitted: u64,
    received: u64,
    bytes: u64,
    first_time: SimTime,
    last_time: SimTime,
}

impl Counters {
    fn new() -> Self {
        Self {
            transmitted: 0,
            received: 0,
            bytes: 0,
            first_time: f64::INFINITY,
            last_time: f64::NEG_INFINITY,
        }
    }

    fn add(&mut self, record: &TraceRecord) {
        match record.event {
            TraceEvent::Transmit => self.transmitted += 1,
            TraceEvent::Receive => self.received += 1,
        }
        self.bytes += record.byte_length.unwrap_or(0);
        self.first_time = self.first_time.min(record.time);
        self.last_time = self.last_time.max(record.time);
    }

    fn delivery_ratio(&self) -> f64 {
        ratio(self.received as f64, self.transmitted as f64)
    }

    fn duration(&self) -> f64 {
        if self.last_time > self.first_time {
            self.last_time - self.first_time
        } else {
            0.0
        }
    }
}

/// Aggregate records into per-flow statistics, ordered by flow key.
///
/// Records without both endpoint addresses cannot be attributed to a flow
/// and are ignored. With `filter_protocol` set, only records of that
/// protocol take part.
pub fn aggregate_flows(
    records: &[TraceRecord],
    filter_protocol: Option<L4Protocol>,
) -> Vec<FlowStats> {
    let mut flows: BTreeMap<FlowKey, Counters> = BTreeMap::new();

    for record in records {
        if filter_protocol.is_some_and(|p| record.layer4_protocol != p) {
            continue;
        }
        let Some(key) = record.flow_key() else {
            continue;
        };
        flows.entry(key).or_insert_with(Counters::new).add(record);
    }

    log::debug!("Aggregated {} records into {} flows", records.len(), flows.len());

    flows
        .into_iter()
        .map(|(key, counters)| {
            let duration = counters.duration();
            FlowStats {
                source_address: key.source_address,
                dest_address: key.dest_address,
                dest_port: key.dest_port,
                transmitted_count: counters.transmitted,
                received_count: counters.received,
                delivery_ratio: counters.delivery_ratio(),
                total_bytes: counters.bytes,
                duration_seconds: duration,
                throughput_mbps: throughput_mbps(counters.bytes, duration),
            }
        })
        .collect()
}

/// Aggregate tunneled records by GTP-U tunnel endpoint id
pub fn aggregate_tunnels(records: &[TraceRecord]) -> Vec<TunnelStats> {
    let mut tunnels: BTreeMap<u32, Counters> = BTreeMap::new();

    for record in records.iter().filter(|r| r.tunneled) {
        if let Some(teid) = record.tunnel_id {
            tunnels.entry(teid).or_insert_with(Counters::new).add(record);
        }
    }

    tunnels
        .into_iter()
        .map(|(tunnel_id, counters)| {
            let duration = counters.duration();
            TunnelStats {
                tunnel_id,
                transmitted_count: counters.transmitted,
                received_count: counters.received,
                delivery_ratio: counters.delivery_ratio(),
                total_bytes: counters.bytes,
                duration_seconds: duration,
                throughput_mbps: throughput_mbps(counters.bytes, duration),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(event: TraceEvent, time: f64, src: &str, dst: &str, port: Option<u16>) -> TraceRecord {
        TraceRecord {
            event,
            time,
            node: Some(0),
            layer4_protocol: L4Protocol::Udp,
            source_address: Some(src.to_string()),
            dest_address: Some(dst.to_string()),
            source_port: port.map(|_| 4000),
            dest_port: port,
            packet_id: None,
            byte_length: Some(100),
            tunneled: false,
            tunnel_id: None,
            direction: None,
            phy_rate: None,
            mac_type: None,
            mac_retry: None,
            source_file: None,
        }
    }

    #[test]
    fn test_two_record_flow() {
        let records = vec![
            record(TraceEvent::Transmit, 1.0, "10.0.0.1", "10.0.0.10", Some(5000)),
            record(TraceEvent::Receive, 1.2, "10.0.0.1", "10.0.0.10", Some(5000)),
        ];
        let flows = aggregate_flows(&records, None);
        assert_eq!(flows.len(), 1);
        let flow = &flows[0];
        assert_eq!(flow.key(), FlowKey::new("10.0.0.1", "10.0.0.10", Some(5000)));
        assert_eq!(flow.transmitted_count, 1);
        assert_eq!(flow.received_count, 1);
        assert_eq!(flow.delivery_ratio, 1.0);
        assert_eq!(flow.total_bytes, 200);
        assert!((flow.duration_seconds - 0.2).abs() < 1e-9);
        assert!((flow.throughput_mbps - 0.008).abs() < 1e-9);
    }

    #[test]
    fn test_receive_only_flow_has_zero_ratio() {
        let records = vec![
            record(TraceEvent::Receive, 1.0, "10.0.0.1", "10.0.0.10", Some(5000)),
            record(TraceEvent::Receive, 2.0, "10.0.0.1", "10.0.0.10", Some(5000)),
        ];
        let flow = &aggregate_flows(&records, None)[0];
        assert_eq!(flow.transmitted_count, 0);
        assert_eq!(flow.delivery_ratio, 0.0);
        assert!(flow.delivery_ratio.is_finite());
    }

    #[test]
    fn test_single_record_has_zero_throughput() {
        let records = vec![record(TraceEvent::Transmit, 3.5, "10.0.0.1", "10.0.0.10", None)];
        let flow = &aggregate_flows(&records, None)[0];
        assert_eq!(flow.duration_seconds, 0.0);
        assert_eq!(flow.throughput_mbps, 0.0);
        assert_eq!(flow.dest_port, None);
    }

    #[test]
    fn test_excludes_records_without_addresses() {
        let mut orphan = record(TraceEvent::Transmit, 1.0, "10.0.0.1", "10.0.0.10", Some(5000));
        orphan.dest_address = None;
        assert!(aggregate_flows(&[orphan], None).is_empty());
        assert!(aggregate_flows(&[], None).is_empty());
    }

    #[test]
    fn test_protocol_filter() {
        let mut tcp = record(TraceEvent::Transmit, 1.0, "10.0.0.2", "10.0.0.10", Some(80));
        tcp.layer4_protocol = L4Protocol::Tcp;
        let records = vec![
            record(TraceEvent::Transmit, 1.0, "10.0.0.1", "10.0.0.10", Some(5000)),
            tcp,
        ];
        assert_eq!(aggregate_flows(&records, None).len(), 2);
        let udp = aggregate_flows(&records, Some(L4Protocol::Udp));
        assert_eq!(udp.len(), 1);
        assert_eq!(udp[0].dest_port, Some(5000));
    }

    #[test]
    fn test_order_independent_and_deterministic() {
        let records = vec![
            record(TraceEvent::Receive, 2.4, "10.0.0.3", "10.0.0.10", Some(5000)),
            record(TraceEvent::Transmit, 1.1, "10.0.0.1", "10.0.0.10", Some(5000)),
            record(TraceEvent::Transmit, 2.0, "10.0.0.3", "10.0.0.10", Some(5000)),
            record(TraceEvent::Receive, 1.7, "10.0.0.1", "10.0.0.10", Some(5000)),
        ];
        let first = aggregate_flows(&records, None);
        let second = aggregate_flows(&records, None);
        assert_eq!(first, second);
        assert_eq!(first[0].source_address, "10.0.0.1");
        assert_eq!(first[1].source_address, "10.0.0.3");
        assert!((first[1].duration_seconds - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_tunnels() {
        let mut a = record(TraceEvent::Transmit, 1.0, "1.0.0.2", "7.0.0.2", Some(1234));
        a.tunneled = true;
        a.tunnel_id = Some(3);
        let mut b = a.clone();
        b.event = TraceEvent::Receive;
        b.time = 1.5;
        let mut untagged = a.clone();
        untagged.tunnel_id = None;

        let tunnels = aggregate_tunnels(&[a, b, untagged]);
        assert_eq!(tunnels.len(), 1);
        assert_eq!(tunnels[0].tunnel_id, 3);
        assert_eq!(tunnels[0].delivery_ratio, 1.0);
        assert_eq!(tunnels[0].total_bytes, 200);
        assert!((tunnels[0].throughput_mbps - 0.0032).abs() < 1e-9);
    }
}
