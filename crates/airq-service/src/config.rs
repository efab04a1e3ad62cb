//! Service configuration (`server.toml`).
//!
//! Every section is optional; missing keys take the defaults below. Values
//! given on the command line or through the environment are layered on top
//! with [`ConfigOverrides`] before validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default HTTP listen address.
pub const DEFAULT_BIND: &str = "0.0.0.0:5001";

/// Shortest accepted poll interval, in seconds.
pub const MIN_POLL_INTERVAL: u64 = 1;
/// Longest accepted poll interval, in seconds.
pub const MAX_POLL_INTERVAL: u64 = 86_400;
/// Longest accepted per-device fetch timeout, in seconds.
pub const MAX_FETCH_TIMEOUT: u64 = 300;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub collector: CollectorConfig,
}

impl Config {
    /// Read `path`, or the default location when `path` is `None`.
    ///
    /// An explicitly named file must exist. A missing file at the default
    /// location yields [`Config::default`].
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let path = default_config_path();
                if path.exists() {
                    Self::load(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the config as pretty TOML, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let text = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::Write {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, text).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check every section, reporting all problems at once.
    ///
    /// ```
    /// use airq_service::Config;
    ///
    /// let mut config = Config::default();
    /// assert!(config.validate().is_ok());
    ///
    /// config.collector.fetch_timeout_secs = config.collector.interval_secs;
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let problems: Vec<ValidationError> = self
            .server
            .validate()
            .into_iter()
            .chain(self.storage.validate())
            .chain(self.collector.validate())
            .collect();

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(problems))
        }
    }
}

/// Values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub bind: Option<String>,
    pub database: Option<PathBuf>,
    pub disable_collector: bool,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(bind) = &self.bind {
            config.server.bind = bind.clone();
        }
        if let Some(database) = &self.database {
            config.storage.path = database.clone();
        }
        if self.disable_collector {
            config.collector.enabled = false;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// `host:port` the HTTP API listens on.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        const FIELD: &str = "server.bind";

        if self.bind.trim().is_empty() {
            return vec![ValidationError::new(FIELD, "bind address cannot be empty")];
        }
        let Some((_, port)) = self.bind.rsplit_once(':') else {
            return vec![ValidationError::new(
                FIELD,
                format!("'{}' is not of the form 'host:port'", self.bind),
            )];
        };
        match port.parse::<u16>() {
            Ok(0) => vec![ValidationError::new(FIELD, "port cannot be 0")],
            Ok(_) => Vec::new(),
            Err(_) => vec![ValidationError::new(
                FIELD,
                format!("port '{}' is not a number in 1-65535", port),
            )],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: airq_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        if self.path.as_os_str().is_empty() {
            vec![ValidationError::new(
                "storage.path",
                "database path cannot be empty",
            )]
        } else {
            Vec::new()
        }
    }
}

/// Poller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Whether `run` starts the background poller.
    pub enabled: bool,
    /// Seconds between the end of one tick and the start of the next.
    pub interval_secs: u64,
    /// Upper bound on a single device fetch, in seconds.
    pub fetch_timeout_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
            fetch_timeout_secs: 10,
        }
    }
}

impl CollectorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// A fetch must always give up before the next tick is due.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut problems = Vec::new();
        let interval_ok = (MIN_POLL_INTERVAL..=MAX_POLL_INTERVAL).contains(&self.interval_secs);

        if !interval_ok {
            problems.push(ValidationError::new(
                "collector.interval_secs",
                format!(
                    "poll interval {} is out of range ({}-{} seconds)",
                    self.interval_secs, MIN_POLL_INTERVAL, MAX_POLL_INTERVAL
                ),
            ));
        }

        if !(1..=MAX_FETCH_TIMEOUT).contains(&self.fetch_timeout_secs) {
            problems.push(ValidationError::new(
                "collector.fetch_timeout_secs",
                format!(
                    "fetch timeout {} is out of range (1-{} seconds)",
                    self.fetch_timeout_secs, MAX_FETCH_TIMEOUT
                ),
            ));
        } else if interval_ok && self.fetch_timeout_secs >= self.interval_secs {
            problems.push(ValidationError::new(
                "collector.fetch_timeout_secs",
                format!(
                    "fetch timeout {} must be shorter than the poll interval {}",
                    self.fetch_timeout_secs, self.interval_secs
                ),
            ));
        }

        problems
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid configuration:\n{}", bullet_list(.0))]
    Validation(Vec<ValidationError>),
}

/// One rejected config value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted key, e.g. `collector.interval_secs`.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn bullet_list(problems: &[ValidationError]) -> String {
    problems
        .iter()
        .map(|p| format!("  - {}", p))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `<config_dir>/airq/server.toml`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("airq")
        .join("server.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(problems: &[ValidationError]) -> Vec<&str> {
        problems.iter().map(|p| p.field.as_str()).collect()
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.server.bind, DEFAULT_BIND);
        assert_eq!(config.storage.path, airq_store::default_db_path());
        assert!(config.collector.enabled);
        assert_eq!(config.collector.interval(), Duration::from_secs(60));
        assert_eq!(config.collector.fetch_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("server.toml");

        let mut config = Config::default();
        config.server.bind = "127.0.0.1:9090".to_string();
        config.storage.path = PathBuf::from("/tmp/airq-test.db");
        config.collector = CollectorConfig {
            enabled: false,
            interval_secs: 120,
            fetch_timeout_secs: 5,
        };
        config.save(&path).unwrap();

        let loaded = Config::load_or_default(Some(&path)).unwrap();
        assert_eq!(loaded.server.bind, "127.0.0.1:9090");
        assert_eq!(loaded.storage.path, PathBuf::from("/tmp/airq-test.db"));
        assert!(!loaded.collector.enabled);
        assert_eq!(loaded.collector.interval_secs, 120);
        assert_eq!(loaded.collector.fetch_timeout_secs, 5);
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            Config::load_or_default(Some(&missing)),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        std::fs::write(&path, "[collector\ninterval_secs = ").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_sections_may_be_omitted() {
        let config: Config = toml::from_str("[collector]\ninterval_secs = 300\n").unwrap();
        assert_eq!(config.server.bind, DEFAULT_BIND);
        assert_eq!(config.collector.interval_secs, 300);
        assert_eq!(config.collector.fetch_timeout_secs, 10);
        assert!(config.collector.enabled);
    }

    #[test]
    fn test_overrides_win_over_file_values() {
        let mut config = Config::default();
        ConfigOverrides {
            bind: Some("127.0.0.1:7000".to_string()),
            database: Some(PathBuf::from("/data/airq.db")),
            disable_collector: true,
        }
        .apply(&mut config);

        assert_eq!(config.server.bind, "127.0.0.1:7000");
        assert_eq!(config.storage.path, PathBuf::from("/data/airq.db"));
        assert!(!config.collector.enabled);

        let mut untouched = Config::default();
        ConfigOverrides::default().apply(&mut untouched);
        assert_eq!(untouched.server.bind, DEFAULT_BIND);
        assert!(untouched.collector.enabled);
    }

    #[test]
    fn test_bind_address_checks() {
        let ok = ServerConfig {
            bind: "[::1]:8080".to_string(),
        };
        assert!(ok.validate().is_empty());

        for (bind, fragment) in [
            ("  ", "cannot be empty"),
            ("localhost", "host:port"),
            ("localhost:0", "cannot be 0"),
            ("localhost:http", "not a number"),
            ("localhost:70000", "not a number"),
        ] {
            let problems = ServerConfig {
                bind: bind.to_string(),
            }
            .validate();
            assert_eq!(fields(&problems), vec!["server.bind"], "{bind}");
            assert!(problems[0].message.contains(fragment), "{bind}");
        }
    }

    #[test]
    fn test_empty_storage_path_rejected() {
        let problems = StorageConfig {
            path: PathBuf::new(),
        }
        .validate();
        assert_eq!(fields(&problems), vec!["storage.path"]);
    }

    #[test]
    fn test_collector_bounds() {
        let check = |interval_secs, fetch_timeout_secs| {
            CollectorConfig {
                enabled: true,
                interval_secs,
                fetch_timeout_secs,
            }
            .validate()
        };

        assert!(check(60, 10).is_empty());
        assert!(check(2, 1).is_empty());
        assert_eq!(fields(&check(0, 10)), vec!["collector.interval_secs"]);
        assert_eq!(
            fields(&check(86_401, 10)),
            vec!["collector.interval_secs"]
        );
        assert_eq!(fields(&check(60, 0)), vec!["collector.fetch_timeout_secs"]);
        assert_eq!(
            fields(&check(600, 301)),
            vec!["collector.fetch_timeout_secs"]
        );

        let problems = check(30, 30);
        assert!(problems[0].message.contains("shorter than the poll interval"));
    }

    #[test]
    fn test_validation_reports_every_section() {
        let config = Config {
            server: ServerConfig {
                bind: String::new(),
            },
            storage: StorageConfig {
                path: PathBuf::new(),
            },
            collector: CollectorConfig {
                interval_secs: 0,
                ..Default::default()
            },
        };

        let err = config.validate().unwrap_err();
        let text = err.to_string();
        assert!(text.starts_with("Invalid configuration:"));
        for field in ["server.bind", "storage.path", "collector.interval_secs"] {
            assert!(text.contains(field), "{field} missing from {text}");
        }
    }

    #[test]
    fn test_default_path_location() {
        assert!(default_config_path().ends_with("airq/server.toml"));
    }
}
