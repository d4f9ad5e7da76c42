//! Multi-hop path reconstruction.
//!
//! Every node that receives a packet logs it with the same IPv4
//! identification, so ordering a flow's receive events by time and grouping
//! them by packet id gives the sequence of nodes each packet visited.

use std::collections::{BTreeMap, HashMap};

use super::types::*;

/// Reconstruct the hop sequence of every packet of `flow`.
///
/// Only receive events with both a packet id and a node id are used.
/// Entries are ordered by hop count, then packet id.
pub fn reconstruct_paths(records: &[TraceRecord], flow: &FlowKey) -> Vec<PathEntry> {
    let mut receives: Vec<&TraceRecord> = records
        .iter()
        .filter(|r| r.event == TraceEvent::Receive && r.matches_flow(flow))
        .filter(|r| r.packet_id.is_some() && r.node.is_some())
        .collect();
    // Stable, so equal timestamps keep their input order
    receives.sort_by(|a, b| a.time.total_cmp(&b.time));

    let mut hops_by_packet: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    for record in receives {
        let (Some(packet_id), Some(node)) = (record.packet_id, record.node) else {
            continue;
        };
        let hops = hops_by_packet.entry(packet_id).or_default();
        if hops.last() != Some(&node) {
            hops.push(node);
        }
    }

    let mut entries: Vec<PathEntry> = hops_by_packet
        .into_iter()
        .map(|(packet_id, hops)| PathEntry {
            packet_id,
            source_address: flow.source_address.clone(),
            dest_address: flow.dest_address.clone(),
            dest_port: flow.dest_port,
            hops: format_hops(&hops),
            hop_count: hops.len(),
        })
        .collect();
    entries.sort_by_key(|e| (e.hop_count, e.packet_id));

    log::debug!("Reconstructed {} packet paths for flow {}", entries.len(), flow);
    entries
}

/// Join node ids as "2->5->9"
pub fn format_hops(hops: &[u32]) -> String {
    hops.iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join("->")
}

/// Most frequent hop sequence among `entries`.
///
/// Ties go to the sequence that appears first in `entries`.
pub fn dominant_path(entries: &[PathEntry]) -> Option<DominantPath> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for entry in entries {
        *counts.entry(entry.hops.as_str()).or_insert(0) += 1;
    }

    let mut best: Option<(&PathEntry, usize)> = None;
    for entry in entries {
        let count = counts[entry.hops.as_str()];
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((entry, count));
        }
    }

    best.map(|(entry, occurrences)| DominantPath {
        hops: entry.hops.clone(),
        hop_count: entry.hop_count,
        occurrences,
        total_packets: entries.len(),
    })
}

/// Paths and dominant path for one flow
pub fn flow_path_report(records: &[TraceRecord], flow: &FlowKey) -> FlowPathReport {
    let paths = reconstruct_paths(records, flow);
    FlowPathReport {
        flow: flow.clone(),
        dominant_path: dominant_path(&paths),
        paths,
    }
}
