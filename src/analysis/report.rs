//! Report generation for trace and flow analysis.
//!
//! Writes flat CSV tables for downstream plotting, plus JSON and
//! human-readable text reports.

use std::fs;
use std::path::Path;

use color_eyre::eyre::{Context, Result};
use serde::Serialize;

use super::types::*;

/// Write rows as a CSV table with a header taken from the row type.
///
/// An empty slice produces an empty file.
pub fn write_csv<T: Serialize>(rows: &[T], output_path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("Failed to write row to {}", output_path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to flush {}", output_path.display()))?;

    log::debug!("Wrote {} rows to {}", rows.len(), output_path.display());
    Ok(())
}

/// Write every table of the report into `output_dir`
pub fn write_tables(report: &AnalysisReport, records: &[TraceRecord], output_dir: &Path) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

    write_csv(records, &output_dir.join("trace_records.csv"))?;
    write_csv(&report.flows, &output_dir.join("flow_stats.csv"))?;
    write_csv(&report.tunnels, &output_dir.join("tunnel_stats.csv"))?;
    write_csv(&report.throughput, &output_dir.join("throughput.csv"))?;

    let paths: Vec<&PathEntry> = report.paths.iter().flat_map(|p| &p.paths).collect();
    write_csv(&paths, &output_dir.join("paths.csv"))?;

    if let Some(ref flowmon) = report.flowmon {
        write_csv(&flowmon.flows, &output_dir.join("flowmon_stats.csv"))?;
    }
    if !report.streams.is_empty() {
        write_csv(&report.streams, &output_dir.join("capture_streams.csv"))?;
    }

    log::info!("Tables written to {}", output_dir.display());
    Ok(())
}

/// Generate JSON report
pub fn generate_json_report(report: &AnalysisReport, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)
        .context("Failed to serialize report to JSON")?;

    fs::write(output_path, json)
        .with_context(|| format!("Failed to write JSON report to {}", output_path.display()))?;

    log::info!("JSON report written to {}", output_path.display());
    Ok(())
}

fn port_label(port: Option<u16>) -> String {
    port.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string())
}

fn section(lines: &mut Vec<String>, title: &str) {
    lines.push("=".repeat(80));
    lines.push(format!("{:^80}", title));
    lines.push("=".repeat(80));
    lines.push(String::new());
}

/// Render the text report
pub fn render_text_report(report: &AnalysisReport) -> String {
    let mut lines: Vec<String> = Vec::new();

    section(&mut lines, "NETWORK TRACE FLOW ANALYSIS");

    // Metadata
    lines.push(format!("Analysis Date: {}", report.metadata.analysis_timestamp));
    lines.push(format!("Trace Files: {}", report.metadata.trace_files.len()));
    for file in &report.metadata.trace_files {
        lines.push(format!("  {}", file));
    }
    if !report.metadata.missing_inputs.is_empty() {
        lines.push(format!("Missing Inputs: {}", report.metadata.missing_inputs.join(", ")));
    }
    lines.push(format!("Records: {}", report.metadata.total_records));
    lines.push(format!("Skipped Lines: {}", report.metadata.skipped_lines));
    if let Some(protocol) = report.metadata.protocol_filter {
        lines.push(format!("Protocol Filter: {}", protocol));
    }
    lines.push(String::new());

    // Trace summary
    let summary = &report.summary;
    section(&mut lines, "TRACE SUMMARY");
    lines.push(format!(
        "Events: {} transmitted, {} received (delivery ratio {:.3})",
        summary.transmitted_count, summary.received_count, summary.delivery_ratio
    ));
    lines.push(format!(
        "Protocols: UDP {}, TCP {}, other {}, unknown {}",
        summary.udp_records, summary.tcp_records, summary.other_records, summary.unknown_records
    ));
    lines.push(format!("Tunneled Records: {}", summary.tunneled_records));
    lines.push(format!("Nodes Observed: {}", summary.unique_nodes));
    lines.push(format!("Last Timestamp: {:.6}s", summary.last_timestamp));
    if !summary.udp_bytes_by_port.is_empty() {
        lines.push("UDP Bytes by Destination Port:".to_string());
        for (port, bytes) in &summary.udp_bytes_by_port {
            lines.push(format!("  {:>5}: {}", port, bytes));
        }
    }
    if !summary.frames_by_rate.is_empty() {
        lines.push("Frames by PHY Rate:".to_string());
        for (rate, frames) in &summary.frames_by_rate {
            lines.push(format!("  {}: {}", rate, frames));
        }
        lines.push(format!(
            "QoS Data Frames: {} tx, {} rx (delivery ratio {:.3}), retry rate {:.1}%",
            summary.data_frames_transmitted,
            summary.data_frames_received,
            summary.data_delivery_ratio,
            summary.data_retry_rate * 100.0
        ));
    }
    lines.push(String::new());

    // Flows
    section(&mut lines, "FLOW STATISTICS");
    if report.flows.is_empty() {
        lines.push("No flows found.".to_string());
    } else {
        lines.push(format!(
            "{:<16} {:<16} {:>6} {:>8} {:>8} {:>7} {:>12} {:>10} {:>10}",
            "Source", "Destination", "Port", "Tx", "Rx", "Ratio", "Bytes", "Duration", "Mbps"
        ));
        for flow in &report.flows {
            lines.push(format!(
                "{:<16} {:<16} {:>6} {:>8} {:>8} {:>7.3} {:>12} {:>10.3} {:>10.4}",
                flow.source_address,
                flow.dest_address,
                port_label(flow.dest_port),
                flow.transmitted_count,
                flow.received_count,
                flow.delivery_ratio,
                flow.total_bytes,
                flow.duration_seconds,
                flow.throughput_mbps
            ));
        }
    }
    lines.push(String::new());

    if !report.tunnels.is_empty() {
        lines.push("Tunnels:".to_string());
        for tunnel in &report.tunnels {
            lines.push(format!(
                "  TEID {}: {} tx, {} rx, {} bytes, {:.4} Mbps",
                tunnel.tunnel_id,
                tunnel.transmitted_count,
                tunnel.received_count,
                tunnel.total_bytes,
                tunnel.throughput_mbps
            ));
        }
        lines.push(String::new());
    }

    // Paths
    if !report.paths.is_empty() {
        section(&mut lines, "PACKET PATHS");
        for flow_paths in &report.paths {
            lines.push(format!("Flow {}:", flow_paths.flow));
            match flow_paths.dominant_path {
                Some(ref dominant) => lines.push(format!(
                    "  Dominant path: {} ({} hops, {} of {} packets)",
                    dominant.hops, dominant.hop_count, dominant.occurrences, dominant.total_packets
                )),
                None => lines.push("  No packets with a reconstructable path.".to_string()),
            }
        }
        lines.push(String::new());
    }

    // FlowMonitor
    if let Some(ref flowmon) = report.flowmon {
        section(&mut lines, "FLOWMONITOR");
        let totals = &flowmon.totals;
        lines.push(format!("Source: {}", flowmon.source));
        lines.push(format!(
            "Flows: {} ({} delivered nothing)",
            totals.total_flows, totals.failed_flows
        ));
        lines.push(format!(
            "Packets: {} tx, {} rx, {} lost (loss rate {:.2}%)",
            totals.tx_packets,
            totals.rx_packets,
            totals.lost_packets,
            totals.loss_rate * 100.0
        ));
        for flow in &flowmon.flows {
            lines.push(format!(
                "  Flow {} {} > {}:{}  delay {:.2}ms  jitter {:.2}ms  loss {:.2}%  {:.4} Mbps",
                flow.flow_id,
                flow.source_address.as_deref().unwrap_or("?"),
                flow.dest_address.as_deref().unwrap_or("?"),
                port_label(flow.dest_port),
                flow.avg_delay_ms,
                flow.avg_jitter_ms,
                flow.loss_rate * 100.0,
                flow.throughput_mbps
            ));
        }
        lines.push(String::new());
    }

    // Captures
    if !report.streams.is_empty() {
        section(&mut lines, "CAPTURED STREAMS");
        for stream in &report.streams {
            lines.push(format!(
                "  Stream {}: {}:{} > {}:{}  {} packets, {} bytes, {:.3}s, {:.4} Mbps",
                stream.stream_id,
                stream.source_address,
                stream.source_port,
                stream.dest_address,
                stream.dest_port,
                stream.packet_count,
                stream.total_bytes,
                stream.duration_seconds,
                stream.throughput_mbps
            ));
        }
        lines.push(String::new());
    }

    // Footer
    lines.push("=".repeat(80));
    lines.join("\n")
}

/// Generate human-readable text report
pub fn generate_text_report(report: &AnalysisReport, output_path: &Path) -> Result<()> {
    fs::write(output_path, render_text_report(report))
        .with_context(|| format!("Failed to write text report to {}", output_path.display()))?;

    log::info!("Text report written to {}", output_path.display());
    Ok(())
}

/// Print a summary to stdout
pub fn print_summary(report: &AnalysisReport) {
    println!("\n=== TRACE FLOW ANALYSIS SUMMARY ===\n");
    println!("Records: {}", report.metadata.total_records);
    println!("Skipped lines: {}", report.metadata.skipped_lines);
    println!("Flows: {}", report.flows.len());

    if let Some(best) = report
        .flows
        .iter()
        .max_by(|a, b| a.throughput_mbps.total_cmp(&b.throughput_mbps))
    {
        println!(
            "Top flow: {} ({:.4} Mbps, delivery {:.1}%)",
            best.key(),
            best.throughput_mbps,
            best.delivery_ratio * 100.0
        );
    }

    for flow_paths in &report.paths {
        if let Some(ref dominant) = flow_paths.dominant_path {
            println!("Dominant path for {}: {}", flow_paths.flow, dominant.hops);
        }
    }

    if let Some(ref flowmon) = report.flowmon {
        println!("\nFlowMonitor:");
        println!("  Flows: {}", flowmon.totals.total_flows);
        println!("  Loss rate: {:.2}%", flowmon.totals.loss_rate * 100.0);
    }

    if !report.streams.is_empty() {
        println!("\nCaptured streams: {}", report.streams.len());
    }

    println!();
}
