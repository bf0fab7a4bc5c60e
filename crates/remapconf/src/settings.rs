//! Configuration sections and their compiled defaults.

use serde::{Deserialize, Serialize};

/// Values the CLI falls back to when a flag is not given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Style id used by `classify`, `remap`, and `corpus`.
    /// Default: snes
    #[serde(default = "DefaultsConfig::default_style")]
    pub style: String,

    /// Onset matching window in seconds.
    /// Default: 0.05
    #[serde(default = "DefaultsConfig::default_onset_tolerance")]
    pub onset_tolerance: f64,
}

impl DefaultsConfig {
    fn default_style() -> String {
        "snes".to_string()
    }

    fn default_onset_tolerance() -> f64 {
        0.05
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            style: Self::default_style(),
            onset_tolerance: Self::default_onset_tolerance(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// An `EnvFilter` directive, e.g. "info" or "midi_remap=debug".
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

/// A palette defined in configuration. Adds a style, or replaces a builtin
/// one with the same id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleConfig {
    pub leads: Vec<u8>,
    pub pads: Vec<u8>,
    pub basses: Vec<u8>,
    pub percussion: u8,
}
