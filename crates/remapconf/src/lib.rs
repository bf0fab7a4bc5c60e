//! Layered configuration for the `remaster` tool.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/remaster/config.toml` (system)
//! 2. `~/.config/remaster/config.toml` (user)
//! 3. `./remaster.toml` (local override), or the `--config` path instead
//! 4. Environment variables (`REMASTER_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [defaults]
//! style = "snes"
//! onset_tolerance = 0.05
//!
//! [telemetry]
//! log_level = "info"
//!
//! [styles.genesis]
//! leads = [80, 81, 62]
//! pads = [89, 90]
//! basses = [38, 39]
//! percussion = 117
//! ```

pub mod loader;
pub mod settings;

pub use loader::{discover_config_files_with_override, ConfigSources};
pub use settings::{DefaultsConfig, StyleConfig, TelemetryConfig};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete remaster configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemapConfig {
    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Extra or overriding palettes, keyed by style id.
    #[serde(default)]
    pub styles: BTreeMap<String, StyleConfig>,
}

impl RemapConfig {
    /// Load configuration, with `config_path` standing in for `./remaster.toml`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = RemapConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            loader::load_from_file(&path)?.apply(&mut config);
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        // Build TOML manually for nicer formatting
        let mut output = String::new();

        output.push_str("# remaster configuration\n\n");

        output.push_str("[defaults]\n");
        output.push_str(&format!("style = {}\n", toml_string(&self.defaults.style)));
        output.push_str(&format!(
            "onset_tolerance = {:?}\n",
            self.defaults.onset_tolerance
        ));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!(
            "log_level = {}\n",
            toml_string(&self.telemetry.log_level)
        ));

        for (id, style) in &self.styles {
            output.push_str(&format!("\n[styles.{}]\n", toml_key(id)));
            output.push_str(&format!("leads = {}\n", program_list(&style.leads)));
            output.push_str(&format!("pads = {}\n", program_list(&style.pads)));
            output.push_str(&format!("basses = {}\n", program_list(&style.basses)));
            output.push_str(&format!("percussion = {}\n", style.percussion));
        }

        output
    }
}

/// Quoted and escaped TOML string.
fn toml_string(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}

/// Bare key when allowed, quoted otherwise.
fn toml_key(key: &str) -> String {
    let bare = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if bare {
        key.to_string()
    } else {
        toml_string(key)
    }
}

fn program_list(programs: &[u8]) -> String {
    let items: Vec<String> = programs.iter().map(|p| p.to_string()).collect();
    format!("[{}]", items.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = RemapConfig::default();
        assert_eq!(config.defaults.style, "snes");
        assert_eq!(config.defaults.onset_tolerance, 0.05);
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn test_to_toml() {
        let mut config = RemapConfig::default();
        config.styles.insert(
            "genesis".to_string(),
            StyleConfig {
                leads: vec![80, 81],
                pads: vec![89],
                basses: vec![38],
                percussion: 117,
            },
        );
        let toml = config.to_toml();
        assert!(toml.contains("[defaults]"));
        assert!(toml.contains("onset_tolerance = 0.05"));
        assert!(toml.contains("[styles.genesis]"));
        assert!(toml.contains("leads = [80, 81]"));
    }

    #[test]
    fn test_to_toml_parses_back() {
        let mut config = RemapConfig::default();
        config.defaults.onset_tolerance = 1.0;
        config.styles.insert(
            "x".to_string(),
            StyleConfig {
                leads: vec![1],
                pads: vec![2, 3],
                basses: vec![4],
                percussion: 5,
            },
        );
        let parsed: RemapConfig = toml::from_str(&config.to_toml()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_to_toml_quotes_keys_and_strings() {
        let mut config = RemapConfig::default();
        config.defaults.style = "my style".to_string();
        config.telemetry.log_level = "remaster=\"debug\"\\info".to_string();
        for id in ["my style", "a.b", "quote\"d", "gba"] {
            config.styles.insert(
                id.to_string(),
                StyleConfig {
                    leads: vec![80],
                    pads: vec![89],
                    basses: vec![38],
                    percussion: 117,
                },
            );
        }

        let toml = config.to_toml();
        assert!(toml.contains("[styles.gba]"));
        let parsed: RemapConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_load_from_cli_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[defaults]\nstyle = \"nds\"").unwrap();

        let (config, sources) = RemapConfig::load_with_sources_from(Some(file.path())).unwrap();
        assert_eq!(sources.files.last().map(PathBuf::as_path), Some(file.path()));
        // Environment may override, but only via REMASTER_DEFAULT_STYLE
        if !sources.env_overrides.iter().any(|k| k == "REMASTER_DEFAULT_STYLE") {
            assert_eq!(config.defaults.style, "nds");
        }
    }

    #[test]
    fn test_missing_cli_path_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        let err = RemapConfig::load_from(Some(&missing)).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
    }
}
