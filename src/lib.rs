//! # flowtrace - Offline flow analysis for ns-3 simulations
//!
//! This library turns the raw outputs of ns-3 network simulations into flat
//! per-flow tables and reports that plotting and reporting tools consume.
//!
//! ## Overview
//!
//! Three input kinds are understood:
//!
//! - **ASCII traces**: `Ipv4L3Protocol` Tx/Rx traces and Wi-Fi MAC traces,
//!   including GTP-U tunneled traffic where the innermost IPv4 header
//!   describes the payload
//! - **FlowMonitor XML**: per-flow counters with unit-suffixed times
//! - **Capture tables**: tab-separated rows exported from packet captures
//!
//! ## Architecture
//!
//! - `analysis`: parsing, aggregation, path reconstruction and reports
//! - `config`: YAML run description and validation
//! - `config_loader`: configuration loading and input pattern expansion
//! - `orchestrator`: runs one analysis from configuration to output files
//! - `utils`: time value parsing and IP helpers
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use flowtrace::analysis::{aggregate_flows, parse_traces};
//!
//! let parsed = parse_traces(&["Lte_outputs/ipv4-l3.tr"]);
//! for flow in aggregate_flows(&parsed.records, None) {
//!     println!("{} {:.3} Mbps", flow.key(), flow.throughput_mbps);
//! }
//! ```
//!
//! ## Error Handling
//!
//! Unparseable lines are skipped and counted, and missing inputs are
//! reported rather than raised. Functions that write files return
//! `color_eyre::eyre::Result` with context.

pub mod analysis;
pub mod config;
pub mod config_loader;
pub mod orchestrator;
pub mod utils;
