// SPDX-License-Identifier: MIT OR Apache-2.0
//! Driver configuration.
//!
//! Read from a RON file named on the command line, or from `lumo.ron` in the
//! working directory when present. Missing fields take their defaults.

use lumo_graph::Extent;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration file looked up when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "lumo.ron";

/// Largest supported number of frames in flight
pub const MAX_BUFFER_COUNT: u32 = 8;

/// Error loading the configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Cannot read {path}: {source}")]
    Io {
        /// File that was read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid RON for [`LumoConfig`]
    #[error("Invalid configuration: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Headless driver settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LumoConfig {
    /// Tracing directive added on top of `RUST_LOG`
    pub log_filter: String,
    /// Number of frames to run
    pub frames: u64,
    /// Size of the output surface
    pub viewport: Extent,
    /// Frames in flight
    pub buffer_count: u32,
    /// Graph document to load instead of the demo pipeline
    pub project: Option<PathBuf>,
    /// Where to save the graph after running
    pub save_project: Option<PathBuf>,
    /// Trace every binding pulled into an input
    pub trace_bindings: bool,
}

impl Default for LumoConfig {
    fn default() -> Self {
        Self {
            log_filter: "lumo=info".to_string(),
            frames: 3,
            viewport: Extent::new(1280, 720),
            buffer_count: 2,
            project: None,
            save_project: None,
            trace_bindings: false,
        }
    }
}

impl LumoConfig {
    /// Parse and validate RON text
    pub fn from_ron(s: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ron(&content)
    }

    /// Resolve the configuration from command-line arguments (program name excluded)
    pub fn from_args<I>(mut args: I) -> Result<Self, ConfigError>
    where
        I: Iterator<Item = String>,
    {
        if let Some(path) = args.next() {
            return Self::load(Path::new(&path));
        }
        let fallback = Path::new(DEFAULT_CONFIG_FILE);
        if fallback.exists() {
            return Self::load(fallback);
        }
        Ok(Self::default())
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.viewport.is_empty() {
            return Err(ConfigError::Invalid(format!("viewport {} is empty", self.viewport)));
        }
        if !(1..=MAX_BUFFER_COUNT).contains(&self.buffer_count) {
            return Err(ConfigError::Invalid(format!(
                "buffer_count must be between 1 and {MAX_BUFFER_COUNT}, got {}",
                self.buffer_count
            )));
        }
        Ok(())
    }
}
