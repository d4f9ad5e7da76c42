//! Analysis orchestrator.
//!
//! This module coordinates one analysis run, from expanding the configured
//! inputs through parsing and aggregation to writing the reports.

use std::path::Path;

use color_eyre::eyre::{Context, Result};

use crate::analysis::{
    self, AnalysisMetadata, AnalysisReport, FlowMonitorReport, SourceError, TraceRecord,
};
use crate::config::Config;
use crate::config_loader::{expand_pattern, expand_patterns, trace_sources};

/// Result of an analysis run
#[derive(Debug, Clone)]
pub struct AnalysisRun {
    pub report: AnalysisReport,
    pub records: Vec<TraceRecord>,
}

/// Parse every configured input and compute all derived tables.
///
/// Missing inputs are listed in the report metadata and otherwise ignored,
/// so a run always produces a (possibly empty) report.
pub fn analyze(config: &Config) -> AnalysisRun {
    let analysis_config = &config.analysis;
    let bin_seconds = analysis_config.throughput_bin.as_secs_f64();

    // Traces
    let sources = trace_sources(&config.inputs.traces);
    let parsed = analysis::parse_trace_sources(&sources);
    let mut missing_inputs: Vec<String> = parsed
        .missing
        .iter()
        .chain(&parsed.unreadable)
        .map(|p| p.display().to_string())
        .collect();

    let records = parsed.records;
    let summary = analysis::summarize(&records);
    let flows = analysis::aggregate_flows(&records, analysis_config.protocol);
    let tunnels = analysis::aggregate_tunnels(&records);
    let paths = analysis_config
        .paths
        .iter()
        .map(|request| analysis::flow_path_report(&records, &request.flow_key()))
        .collect();
    let throughput = analysis::throughput_by_protocol(
        &records,
        analysis_config.protocol,
        Some(analysis_config.throughput_event),
        bin_seconds,
    );
    log::info!("Aggregated {} flows, {} tunnels", flows.len(), tunnels.len());

    // FlowMonitor
    let flowmon = config.inputs.flowmon.as_deref().and_then(|pattern| {
        let path = expand_pattern(pattern).into_iter().next()?;
        match analysis::parse_flowmon_file(&path) {
            Ok(flows) => Some(FlowMonitorReport {
                source: path.display().to_string(),
                totals: analysis::flowmon_totals(&flows),
                flows: analysis::flowmon_stats(&flows),
            }),
            Err(e) => {
                log::warn!("{}", e);
                if let SourceError::NotFound { path } = e {
                    missing_inputs.push(path);
                }
                None
            }
        }
    });

    // Capture tables
    let captures = analysis::parse_capture_tables(&expand_patterns(&config.inputs.captures));
    missing_inputs.extend(captures.missing.iter().map(|p| p.display().to_string()));
    let streams = analysis::aggregate_streams(&captures.rows);

    let metadata = AnalysisMetadata {
        analysis_timestamp: chrono::Utc::now().to_rfc3339(),
        trace_files: sources.iter().map(|s| s.path.display().to_string()).collect(),
        missing_inputs,
        total_records: records.len(),
        skipped_lines: parsed.skipped_lines,
        protocol_filter: analysis_config.protocol,
        throughput_event: Some(analysis_config.throughput_event),
        throughput_bin_seconds: bin_seconds,
    };

    AnalysisRun {
        report: AnalysisReport {
            metadata,
            summary,
            flows,
            tunnels,
            paths,
            throughput,
            flowmon,
            streams,
        },
        records,
    }
}

/// Write tables, JSON and text reports for a run
pub fn write_outputs(run: &AnalysisRun, output_dir: &Path) -> Result<()> {
    analysis::write_tables(&run.report, &run.records, output_dir)?;
    analysis::generate_json_report(&run.report, &output_dir.join("analysis_report.json"))?;
    analysis::generate_text_report(&run.report, &output_dir.join("analysis_report.txt"))?;
    Ok(())
}

/// Analyze the configured inputs and write every output into `output_dir`
pub fn run(config: &Config, output_dir: &Path) -> Result<AnalysisRun> {
    let run = analyze(config);
    write_outputs(&run, output_dir)
        .with_context(|| format!("Failed to write outputs to {}", output_dir.display()))?;
    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InputConfig, TraceInput};
    use tempfile::tempdir;

    #[test]
    fn test_missing_inputs_give_empty_report() {
        let config = Config {
            inputs: InputConfig {
                traces: vec![TraceInput {
                    path: "/nonexistent/ipv4-l3.tr".to_string(),
                    format: None,
                }],
                flowmon: Some("/nonexistent/flowmon.xml".to_string()),
                captures: vec!["/nonexistent/tcp.tsv".to_string()],
            },
            ..Default::default()
        };

        let run = analyze(&config);
        assert!(run.records.is_empty());
        assert!(run.report.flows.is_empty());
        assert!(run.report.flowmon.is_none());
        assert_eq!(run.report.metadata.missing_inputs.len(), 3);

        let dir = tempdir().unwrap();
        write_outputs(&run, dir.path()).unwrap();
        assert!(dir.path().join("analysis_report.json").exists());
        assert!(dir.path().join("flow_stats.csv").exists());
    }
}
