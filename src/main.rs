//! Flow analysis CLI for ns-3 simulation outputs.
//!
//! Parses ASCII traces, FlowMonitor XML and capture tables, and writes
//! per-flow tables plus JSON and text reports.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use env_logger::Env;
use log::{info, LevelFilter};

use flowtrace::analysis::{self, L4Protocol, TraceEvent, TraceFormat};
use flowtrace::config::{Config, InputConfig, PathRequest, TraceInput};
use flowtrace::{config_loader, orchestrator};

#[derive(Parser)]
#[command(name = "flowtrace")]
#[command(about = "Offline flow analysis for ns-3 traces, FlowMonitor XML and capture tables")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output directory for tables and reports [default: from config, else analysis_output]
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the analysis described by a YAML configuration
    Run {
        /// Path to the analysis configuration YAML file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Analyze ASCII trace files (glob patterns allowed)
    Traces {
        #[arg(required = true)]
        files: Vec<String>,

        /// Trace format (ipv4-l3, wifi-mac); every format is tried when absent
        #[arg(long)]
        format: Option<TraceFormat>,

        /// Only aggregate flows of this protocol (udp, tcp, other, unknown)
        #[arg(long)]
        protocol: Option<L4Protocol>,

        /// Reconstruct hop paths for a flow, as SRC,DST[,PORT]; repeatable
        #[arg(long = "path")]
        paths: Vec<PathRequest>,

        /// Throughput bin width
        #[arg(long, default_value = "500ms")]
        bin: humantime_serde::re::humantime::Duration,

        /// Event binned into the throughput series (transmit, receive)
        #[arg(long, default_value = "transmit")]
        event: TraceEvent,
    },

    /// Analyze a FlowMonitor XML file
    Flowmon { file: String },

    /// Analyze tab-separated capture tables
    Captures {
        #[arg(required = true)]
        files: Vec<String>,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    // Initialize logging before the config is read. Without --log-level or
    // RUST_LOG the logger lets everything through and the max level starts
    // at info, to be replaced by the config's level.
    let level_from_cli = cli.log_level.is_some() || std::env::var_os("RUST_LOG").is_some();
    env_logger::Builder::from_env(
        Env::default().default_filter_or(cli.log_level.as_deref().unwrap_or("trace")),
    )
    .init();
    if !level_from_cli {
        log::set_max_level(LevelFilter::Info);
    }

    let config = match cli.command {
        Commands::Run { ref config } => config_loader::load_config(config)?,
        Commands::Traces {
            ref files,
            format,
            protocol,
            ref paths,
            bin,
            event,
        } => {
            let mut config = Config {
                inputs: InputConfig {
                    traces: files
                        .iter()
                        .map(|path| TraceInput {
                            path: path.clone(),
                            format,
                        })
                        .collect(),
                    ..Default::default()
                },
                ..Default::default()
            };
            config.analysis.protocol = protocol;
            config.analysis.paths = paths.clone();
            config.analysis.throughput_bin = bin.into();
            config.analysis.throughput_event = event;
            config
        }
        Commands::Flowmon { ref file } => Config {
            inputs: InputConfig {
                flowmon: Some(file.clone()),
                ..Default::default()
            },
            ..Default::default()
        },
        Commands::Captures { ref files } => Config {
            inputs: InputConfig {
                captures: files.clone(),
                ..Default::default()
            },
            ..Default::default()
        },
    };
    config.validate()?;

    if !level_from_cli {
        if let Some(level) = config.general.log_filter() {
            log::set_max_level(level);
        }
    }

    let output_dir = cli
        .output
        .clone()
        .unwrap_or_else(|| config.general.output_dir.clone());
    info!("Output directory: {}", output_dir.display());

    let run = orchestrator::run(&config, &output_dir)?;
    analysis::print_summary(&run.report);

    Ok(())
}
