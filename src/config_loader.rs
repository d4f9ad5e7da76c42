use crate::analysis::TraceSource;
use crate::config::{Config, TraceInput};
use color_eyre::eyre::{Context, Result};
use log::{debug, info, warn};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Load and parse configuration from a YAML file
pub fn load_config(config_path: &Path) -> Result<Config> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)
        .with_context(|| format!("Failed to open config file {}", config_path.display()))?;

    let config: Config = serde_yaml::from_reader(file)
        .with_context(|| format!("Failed to parse config file {}", config_path.display()))?;

    config.validate()?;

    Ok(config)
}

/// Expand a glob pattern into matching paths, sorted.
///
/// A pattern that matches nothing, or is not a valid glob, is returned as a
/// literal path so the caller reports it as missing.
pub fn expand_pattern(pattern: &str) -> Vec<PathBuf> {
    let mut matches: Vec<PathBuf> = match glob::glob(pattern) {
        Ok(paths) => paths
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("Skipping unreadable match for {}: {}", pattern, e);
                    None
                }
            })
            .collect(),
        Err(e) => {
            warn!("Invalid input pattern {}: {}", pattern, e);
            Vec::new()
        }
    };

    if matches.is_empty() {
        debug!("Pattern {} matched nothing", pattern);
        return vec![PathBuf::from(pattern)];
    }
    matches.sort();
    matches
}

/// Expand several patterns in order
pub fn expand_patterns<S: AsRef<str>>(patterns: &[S]) -> Vec<PathBuf> {
    patterns
        .iter()
        .flat_map(|p| expand_pattern(p.as_ref()))
        .collect()
}

/// Trace sources for every file matched by the configured trace inputs
pub fn trace_sources(inputs: &[TraceInput]) -> Vec<TraceSource> {
    inputs
        .iter()
        .flat_map(|input| {
            expand_pattern(&input.path)
                .into_iter()
                .map(move |path| TraceSource::new(path, input.format))
        })
        .collect()
}
