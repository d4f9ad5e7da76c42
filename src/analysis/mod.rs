//! Trace and flow analysis for ns-3 simulations.
//!
//! This module parses ASCII traces, FlowMonitor XML and capture tables, and
//! derives per-flow delivery, throughput, delay and path metrics.

pub mod types;
pub mod grammar;
pub mod trace_parser;
pub mod flow_aggregator;
pub mod paths;
pub mod flowmon;
pub mod capture;
pub mod summary;
pub mod report;

pub use types::*;
pub use grammar::{TraceFormat, TraceGrammar};
pub use trace_parser::{parse_trace_file, parse_trace_sources, parse_traces, ParsedTraces, TraceParser, TraceSource};
pub use flow_aggregator::{aggregate_flows, aggregate_tunnels};
pub use paths::{dominant_path, flow_path_report, reconstruct_paths};
pub use flowmon::{flowmon_stats, flowmon_totals, parse_flowmon_file, parse_flowmon_str};
pub use capture::{aggregate_streams, parse_capture_table, parse_capture_tables};
pub use summary::{summarize, throughput_by_protocol, throughput_series};
pub use report::{generate_json_report, generate_text_report, print_summary, write_tables};
