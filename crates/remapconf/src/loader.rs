//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, RemapConfig, StyleConfig};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// One config file as written. Absent keys leave earlier layers alone.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    defaults: FileDefaults,
    #[serde(default)]
    telemetry: FileTelemetry,
    #[serde(default)]
    styles: BTreeMap<String, StyleConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct FileDefaults {
    style: Option<String>,
    onset_tolerance: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct FileTelemetry {
    log_level: Option<String>,
}

impl FileConfig {
    /// Overlay this file's values onto `config`. Styles merge by id.
    pub fn apply(self, config: &mut RemapConfig) {
        if let Some(style) = self.defaults.style {
            config.defaults.style = style;
        }
        if let Some(tolerance) = self.defaults.onset_tolerance {
            config.defaults.onset_tolerance = tolerance;
        }
        if let Some(level) = self.telemetry.log_level {
            config.telemetry.log_level = level;
        }
        config.styles.extend(self.styles);
    }
}

/// Discover config files in load order (system, user, local).
///
/// A CLI path replaces the local `./remaster.toml` and is returned even when
/// missing, so loading it reports the error instead of silently skipping it.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/remaster/config.toml");
    if system.exists() {
        files.push(system);
    }

    // XDG_CONFIG_HOME or ~/.config
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("remaster/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        files.push(path.to_path_buf());
        return files;
    }

    let local = PathBuf::from("remaster.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Load config from a TOML file.
pub fn load_from_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_toml(&contents, path)
}

fn parse_toml(contents: &str, path: &Path) -> Result<FileConfig, ConfigError> {
    let parse_error = |message: String| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    };

    let file: FileConfig = toml::from_str(contents).map_err(|e| parse_error(e.to_string()))?;

    if let Some(tolerance) = file.defaults.onset_tolerance {
        if !(tolerance.is_finite() && tolerance > 0.0) {
            return Err(parse_error(format!(
                "defaults.onset_tolerance must be a positive number of seconds, got {tolerance}"
            )));
        }
    }

    Ok(file)
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut RemapConfig, sources: &mut ConfigSources) {
    apply_overrides_from(config, sources, |key| env::var(key).ok());
}

/// Same as [`apply_env_overrides`], reading variables through `lookup`.
pub fn apply_overrides_from(
    config: &mut RemapConfig,
    sources: &mut ConfigSources,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = lookup("REMASTER_DEFAULT_STYLE") {
        config.defaults.style = v;
        sources.env_overrides.push("REMASTER_DEFAULT_STYLE".to_string());
    }
    if let Some(v) = lookup("REMASTER_ONSET_TOLERANCE") {
        match v.parse::<f64>() {
            Ok(tolerance) if tolerance.is_finite() && tolerance > 0.0 => {
                config.defaults.onset_tolerance = tolerance;
                sources.env_overrides.push("REMASTER_ONSET_TOLERANCE".to_string());
            }
            _ => {}
        }
    }
    if let Some(v) = lookup("REMASTER_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("REMASTER_LOG_LEVEL".to_string());
    }
    // Also support RUST_LOG
    if let Some(v) = lookup("RUST_LOG") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_cli_path_kept_even_if_missing() {
        let missing = Path::new("/nonexistent/remaster.toml");
        let files = discover_config_files_with_override(Some(missing));
        assert_eq!(files.last().map(PathBuf::as_path), Some(missing));
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml = r#"
[defaults]
style = "gba"
"#;
        let mut config = RemapConfig::default();
        parse_toml(toml, Path::new("test.toml")).unwrap().apply(&mut config);

        assert_eq!(config.defaults.style, "gba");
        // Other values should be defaults
        assert_eq!(config.defaults.onset_tolerance, 0.05);
        assert_eq!(config.telemetry.log_level, "info");
        assert!(config.styles.is_empty());
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
[defaults]
style = "ps2"
onset_tolerance = 0.03

[telemetry]
log_level = "midi_remap=debug"

[styles.genesis]
leads = [80, 81]
pads = [89]
basses = [38]
percussion = 117

[styles.snes]
leads = [68]
pads = [48]
basses = [33]
percussion = 47
"#;
        let mut config = RemapConfig::default();
        parse_toml(toml, Path::new("test.toml")).unwrap().apply(&mut config);

        assert_eq!(config.defaults.style, "ps2");
        assert_eq!(config.defaults.onset_tolerance, 0.03);
        assert_eq!(config.telemetry.log_level, "midi_remap=debug");
        assert_eq!(config.styles.len(), 2);
        assert_eq!(config.styles["genesis"].leads, vec![80, 81]);
        assert_eq!(config.styles["snes"].percussion, 47);
    }

    #[test]
    fn test_later_file_wins() {
        let mut config = RemapConfig::default();
        let first = r#"
[defaults]
style = "nds"
onset_tolerance = 0.1

[styles.a]
leads = [1]
pads = [2]
basses = [3]
percussion = 4
"#;
        let second = r#"
[defaults]
onset_tolerance = 0.02

[styles.b]
leads = [5]
pads = [6]
basses = [7]
percussion = 8
"#;
        parse_toml(first, Path::new("1.toml")).unwrap().apply(&mut config);
        parse_toml(second, Path::new("2.toml")).unwrap().apply(&mut config);

        assert_eq!(config.defaults.style, "nds");
        assert_eq!(config.defaults.onset_tolerance, 0.02);
        assert_eq!(config.styles.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        let err = parse_toml("[defaults\nstyle =", Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_wrong_type_is_parse_error() {
        let toml = r#"
[styles.x]
leads = ["sixty"]
pads = [1]
basses = [2]
percussion = 3
"#;
        assert!(matches!(
            parse_toml(toml, Path::new("x.toml")),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_non_positive_tolerance_rejected() {
        let toml = "[defaults]\nonset_tolerance = -0.5\n";
        let err = parse_toml(toml, Path::new("neg.toml")).unwrap_err();
        assert!(err.to_string().contains("onset_tolerance"));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("REMASTER_DEFAULT_STYLE", "wii"),
            ("REMASTER_ONSET_TOLERANCE", "0.08"),
            ("RUST_LOG", "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = RemapConfig::default();
        let mut sources = ConfigSources::default();
        apply_overrides_from(&mut config, &mut sources, |k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.defaults.style, "wii");
        assert_eq!(config.defaults.onset_tolerance, 0.08);
        assert_eq!(config.telemetry.log_level, "debug");
        assert_eq!(
            sources.env_overrides,
            vec!["REMASTER_DEFAULT_STYLE", "REMASTER_ONSET_TOLERANCE", "RUST_LOG"]
        );
    }

    #[test]
    fn test_unparseable_env_tolerance_ignored() {
        let mut config = RemapConfig::default();
        let mut sources = ConfigSources::default();
        apply_overrides_from(&mut config, &mut sources, |k| {
            (k == "REMASTER_ONSET_TOLERANCE").then(|| "soon".to_string())
        });

        assert_eq!(config.defaults.onset_tolerance, 0.05);
        assert!(sources.env_overrides.is_empty());
    }
}
