use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::analysis::{FlowKey, L4Protocol, TraceEvent, TraceFormat};
use crate::utils::ip_utils::is_valid_ipv4;

/// Analysis run configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    pub inputs: InputConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.general.output_dir.as_os_str().is_empty() {
            return Err(ValidationError::InvalidGeneral(
                "output_dir cannot be empty".to_string(),
            ));
        }

        if self.inputs.traces.is_empty()
            && self.inputs.flowmon.is_none()
            && self.inputs.captures.is_empty()
        {
            return Err(ValidationError::InvalidInputs(
                "at least one trace, flowmon or capture input is required".to_string(),
            ));
        }
        for trace in &self.inputs.traces {
            if trace.path.trim().is_empty() {
                return Err(ValidationError::InvalidInputs(
                    "trace path cannot be empty".to_string(),
                ));
            }
        }

        if self.analysis.throughput_bin.is_zero() {
            return Err(ValidationError::InvalidAnalysis(
                "throughput_bin must be greater than zero".to_string(),
            ));
        }
        for path in &self.analysis.paths {
            path.validate()?;
        }

        Ok(())
    }
}

/// Output and logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

/// Input files; every path may be a glob pattern
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputConfig {
    #[serde(default)]
    pub traces: Vec<TraceInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flowmon: Option<String>,
    #[serde(default)]
    pub captures: Vec<String>,
}

/// A trace file pattern and the format of its lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceInput {
    pub path: String,
    /// Every built-in format is tried when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<TraceFormat>,
}

/// Aggregation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Only aggregate flows of this protocol
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<L4Protocol>,
    /// Width of the throughput time bins
    #[serde(with = "humantime_serde", default = "default_throughput_bin")]
    pub throughput_bin: Duration,
    /// Trace event whose bytes are binned (`transmit` or `receive`)
    #[serde(default = "default_throughput_event")]
    pub throughput_event: TraceEvent,
    /// Flows to reconstruct hop paths for
    #[serde(default)]
    pub paths: Vec<PathRequest>,
}

/// A flow to reconstruct paths for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathRequest {
    pub source: String,
    pub destination: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest_port: Option<u16>,
}

impl PathRequest {
    pub fn flow_key(&self) -> FlowKey {
        FlowKey::new(&self.source, &self.destination, self.dest_port)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        for address in [&self.source, &self.destination] {
            if !is_valid_ipv4(address) {
                return Err(ValidationError::InvalidAnalysis(format!(
                    "path endpoint '{}' is not an IPv4 address",
                    address
                )));
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for PathRequest {
    type Err = String;

    /// Parse `SRC,DST` or `SRC,DST,PORT`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let dest_port = match parts.as_slice() {
            [_, _] => None,
            [_, _, port] => Some(
                port.parse::<u16>()
                    .map_err(|_| format!("Invalid destination port: {}", port))?,
            ),
            _ => return Err(format!("Expected SRC,DST[,PORT], got: {}", s)),
        };
        let request = PathRequest {
            source: parts[0].to_string(),
            destination: parts[1].to_string(),
            dest_port,
        };
        request.validate().map_err(|e| e.to_string())?;
        Ok(request)
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid general configuration: {0}")]
    InvalidGeneral(String),
    #[error("Invalid input configuration: {0}")]
    InvalidInputs(String),
    #[error("Invalid analysis configuration: {0}")]
    InvalidAnalysis(String),
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("analysis_output")
}

fn default_throughput_bin() -> Duration {
    Duration::from_millis(500)
}

fn default_throughput_event() -> TraceEvent {
    TraceEvent::Transmit
}

impl GeneralConfig {
    /// Configured log level, if it names one
    pub fn log_filter(&self) -> Option<log::LevelFilter> {
        self.log_level.as_deref()?.parse().ok()
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            log_level: Some("info".to_string()),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            protocol: None,
            throughput_bin: default_throughput_bin(),
            throughput_event: default_throughput_event(),
            paths: Vec::new(),
        }
    }
}
