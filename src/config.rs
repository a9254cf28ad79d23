use crate::collect::StatDefinition;
use crate::document::{PathError, StatPath};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Prometheus metric name prefix rules.
static NAMESPACE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap());

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Top-level configuration loaded from exporter.toml.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ExporterConfig {
    pub exporter: StatsConfig,
    pub web: WebConfig,
    pub identity: IdentityConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Prefix for metric names and value of the `namespace` label.
    pub namespace: String,
    /// Root of the per-player data tree (`<bucket>/<uuid>.json`).
    pub stats_dir: PathBuf,
    /// YAML list of `{name, path}` stat definitions.
    pub stats_file: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub bind: String,
    pub port: u16,
    pub metrics_path: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Lookup URL; `{id}` is replaced with the player id.
    pub url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

// --- Default implementations ---

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            namespace: "cobblemon".to_string(),
            stats_dir: PathBuf::from("./world/cobblemonplayerdata"),
            stats_file: PathBuf::from("stats.yaml"),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 9155,
            metrics_path: "/metrics".to_string(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            url: "https://api.ashcon.app/mojang/v2/user/{id}".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl WebConfig {
    /// `bind:port` for the listener.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    /// Apply a `host:port` (or `:port`) override. An empty host binds all interfaces.
    pub fn set_listen_address(&mut self, addr: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::Invalid(format!("invalid listen address '{addr}'"));
        let (host, port) = addr.rsplit_once(':').ok_or_else(invalid)?;
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        self.bind = if host.is_empty() {
            "0.0.0.0".to_string()
        } else {
            host.trim_start_matches('[').trim_end_matches(']').to_string()
        };
        self.port = port;
        Ok(())
    }
}

impl ExporterConfig {
    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !NAMESPACE_PATTERN.is_match(&self.exporter.namespace) {
            return Err(ConfigError::Invalid(format!(
                "namespace '{}' must match [a-zA-Z_][a-zA-Z0-9_]*",
                self.exporter.namespace
            )));
        }
        if !self.web.metrics_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "metrics path '{}' must start with '/'",
                self.web.metrics_path
            )));
        }
        if !self.identity.url.contains("{id}") {
            return Err(ConfigError::Invalid(format!(
                "identity url '{}' must contain an {{id}} placeholder",
                self.identity.url
            )));
        }
        if self.identity.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "identity timeout_secs must be at least 1".to_string(),
            ));
        }
        if !LOG_LEVELS.contains(&self.log.level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "log level '{}' must be one of {}",
                self.log.level,
                LOG_LEVELS.join(", ")
            )));
        }
        Ok(())
    }
}

/// Load the settings file. A missing file yields the defaults.
pub fn load(path: &Path) -> Result<ExporterConfig, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(ExporterConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    toml::from_str(&contents).map_err(|source| ConfigError::Toml {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Deserialize)]
struct StatsFile {
    #[serde(default)]
    stats: Vec<RawStat>,
}

#[derive(Debug, Deserialize)]
struct RawStat {
    name: String,
    path: String,
}

/// Parse and validate a YAML stat list.
pub fn parse_stats(yaml: &str) -> Result<Vec<StatDefinition>, ConfigError> {
    let file: StatsFile = serde_yaml::from_str(yaml).map_err(ConfigError::Yaml)?;
    if file.stats.is_empty() {
        return Err(ConfigError::Invalid(
            "stats file defines no stats".to_string(),
        ));
    }

    file.stats
        .into_iter()
        .enumerate()
        .map(|(index, raw)| {
            if raw.name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "stat #{} has an empty name",
                    index + 1
                )));
            }
            let path = StatPath::parse(&raw.path).map_err(|source| ConfigError::Path {
                stat: raw.name.clone(),
                source,
            })?;
            Ok(StatDefinition {
                name: raw.name,
                path,
            })
        })
        .collect()
}

/// Read and parse the stat list from disk.
pub fn load_stats(path: &Path) -> Result<Vec<StatDefinition>, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_stats(&contents)
}

/// Errors from loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },
    Yaml(serde_yaml::Error),
    Path {
        stat: String,
        source: PathError,
    },
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            ConfigError::Toml { path, source } => {
                write!(f, "failed to parse {}: {}", path.display(), source)
            }
            ConfigError::Yaml(e) => write!(f, "failed to parse stats file: {e}"),
            ConfigError::Path { stat, source } => {
                write!(f, "stat '{stat}' has an invalid path: {source}")
            }
            ConfigError::Invalid(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Yaml(e) => Some(e),
            ConfigError::Path { source, .. } => Some(source),
            ConfigError::Invalid(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults() {
        let cfg = ExporterConfig::default();
        assert_eq!(cfg.exporter.namespace, "cobblemon");
        assert_eq!(cfg.web.listen_address(), "0.0.0.0:9155");
        assert_eq!(cfg.web.metrics_path, "/metrics");
        assert_eq!(cfg.identity.timeout_secs, 10);
        assert_eq!(cfg.log.level, "info");
        assert_eq!(cfg.log.format, LogFormat::Text);
        cfg.validate().unwrap();
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = load(&dir.path().join("exporter.toml")).unwrap();
        assert_eq!(cfg.web.port, 9155);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("exporter.toml");
        std::fs::write(
            &path,
            r#"
[exporter]
stats_dir = "/srv/minecraft/world/cobblemonplayerdata"

[web]
port = 9200
"#,
        )
        .unwrap();

        let cfg = load(&path).unwrap();
        assert_eq!(
            cfg.exporter.stats_dir,
            PathBuf::from("/srv/minecraft/world/cobblemonplayerdata")
        );
        assert_eq!(cfg.exporter.namespace, "cobblemon");
        assert_eq!(cfg.web.port, 9200);
        assert_eq!(cfg.web.bind, "0.0.0.0");
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("exporter.toml");
        std::fs::write(&path, "[web\nport = ").unwrap();
        let err = load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
        assert!(err.to_string().contains("exporter.toml"));
    }

    #[test]
    fn listen_address_override() {
        let mut web = WebConfig::default();
        web.set_listen_address("127.0.0.1:9000").unwrap();
        assert_eq!(web.listen_address(), "127.0.0.1:9000");

        web.set_listen_address(":9155").unwrap();
        assert_eq!(web.listen_address(), "0.0.0.0:9155");

        web.set_listen_address("[::1]:9100").unwrap();
        assert_eq!(web.bind, "::1");
        assert_eq!(web.port, 9100);

        assert!(web.set_listen_address("9155").is_err());
        assert!(web.set_listen_address("host:http").is_err());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = ExporterConfig::default();
        cfg.exporter.namespace = "cobble-mon".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = ExporterConfig::default();
        cfg.web.metrics_path = "metrics".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = ExporterConfig::default();
        cfg.identity.url = "https://example.test/user".to_string();
        assert!(cfg.validate().unwrap_err().to_string().contains("{id}"));

        let mut cfg = ExporterConfig::default();
        cfg.log.level = "loud".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let mut cfg = ExporterConfig::default();
        cfg.identity.timeout_secs = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("timeout_secs"));

        cfg.identity.timeout_secs = 1;
        cfg.validate().unwrap();
    }

    #[test]
    fn log_format_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("exporter.toml");
        std::fs::write(&path, "[log]\nformat = \"json\"\n").unwrap();
        let cfg = load(&path).unwrap();
        assert_eq!(cfg.log.format, LogFormat::Json);
        assert_eq!(cfg.log.level, "info");

        std::fs::write(&path, "[log]\nformat = \"logfmt\"\n").unwrap();
        assert!(matches!(load(&path).unwrap_err(), ConfigError::Toml { .. }));
    }

    #[test]
    fn parse_stats_list() {
        let stats = parse_stats(
            r#"
stats:
  - name: totalCaptureCount
    path: advancementData.totalCaptureCount
  - name: totalEggsHatched
    path: advancementData.totalEggsHatched
"#,
        )
        .unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].name, "totalCaptureCount");
        assert_eq!(stats[1].path.as_str(), "advancementData.totalEggsHatched");
    }

    #[test]
    fn parse_stats_rejects_empty_list() {
        assert!(parse_stats("stats: []").is_err());
        assert!(parse_stats("{}").is_err());
    }

    #[test]
    fn parse_stats_rejects_bad_entries() {
        let err = parse_stats("stats:\n  - name: foo\n    path: a..b\n").unwrap_err();
        assert!(matches!(err, ConfigError::Path { ref stat, .. } if stat == "foo"));

        let err = parse_stats("stats:\n  - name: ''\n    path: a.b\n").unwrap_err();
        assert!(err.to_string().contains("empty name"));

        let err = parse_stats("stats:\n  - name: foo\n").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn load_stats_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = load_stats(&dir.path().join("stats.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
