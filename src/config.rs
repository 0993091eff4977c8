//! Layered configuration.
//!
//! Later layers win: built-in defaults, then `<data_dir>/config.json`, then
//! environment variables (a `.env` file is loaded first by `main`), then
//! command line flags.
//!
//! | Env Var                    | Default            |
//! |----------------------------|--------------------|
//! | `WARDBOARD_DATA_DIR`       | `~/.wardboard`     |
//! | `WARDBOARD_URL`            | unset (local file) |
//! | `WARDBOARD_API_KEY`        | empty              |
//! | `WARDBOARD_ANALYZER_URL`   | unset              |
//! | `WARDBOARD_TIMEOUT_SECS`   | `15`               |

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_ANALYZER_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SETTLE_WRITE_MS: u64 = 300;
pub const DEFAULT_SETTLE_CREATE_MS: u64 = 500;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Optional settings read from `<data_dir>/config.json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct FileConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub analyzer_url: Option<String>,
    pub local_db: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub analyzer_timeout_secs: Option<u64>,
    pub settle_write_ms: Option<u64>,
    pub settle_create_ms: Option<u64>,
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub local: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Rest { url: String, api_key: String },
    Local { path: PathBuf },
}

/// Delays before reloading after a write, masking backend replication lag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleDelays {
    pub after_write: Duration,
    pub after_create: Duration,
}

impl SettleDelays {
    pub const NONE: SettleDelays = SettleDelays { after_write: Duration::ZERO, after_create: Duration::ZERO };
}

impl Default for SettleDelays {
    fn default() -> Self {
        SettleDelays {
            after_write: Duration::from_millis(DEFAULT_SETTLE_WRITE_MS),
            after_create: Duration::from_millis(DEFAULT_SETTLE_CREATE_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub backend: Backend,
    pub analyzer_url: Option<String>,
    pub request_timeout: Duration,
    pub analyzer_timeout: Duration,
    pub settle: SettleDelays,
}

impl Config {
    /// Resolve configuration from the process environment.
    pub fn load(overrides: &Overrides) -> Result<Config, ConfigError> {
        Config::resolve(overrides, |var| std::env::var(var).ok())
    }

    /// Resolve configuration with `env` standing in for the environment.
    pub fn resolve(overrides: &Overrides, env: impl Fn(&str) -> Option<String>) -> Result<Config, ConfigError> {
        let env = |var: &str| env(var).filter(|v| !v.trim().is_empty());

        let data_dir = overrides
            .data_dir
            .clone()
            .or_else(|| env("WARDBOARD_DATA_DIR").map(PathBuf::from))
            .unwrap_or_else(|| {
                let home = env("HOME").unwrap_or_else(|| ".".to_string());
                PathBuf::from(home).join(".wardboard")
            });

        let file = read_file_config(&data_dir.join("config.json"))?;

        let timeout_secs = match env("WARDBOARD_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidEnv { var: "WARDBOARD_TIMEOUT_SECS", value: raw.clone() })?,
            None => file.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        };

        let url = overrides.url.clone().or_else(|| env("WARDBOARD_URL")).or(file.url.clone());
        let api_key = overrides
            .api_key
            .clone()
            .or_else(|| env("WARDBOARD_API_KEY"))
            .or(file.api_key.clone())
            .unwrap_or_default();

        // An explicit --local always wins over any configured URL.
        let backend = match (&overrides.local, url) {
            (Some(path), _) => Backend::Local { path: path.clone() },
            (None, Some(url)) => Backend::Rest { url, api_key },
            (None, None) => Backend::Local {
                path: file.local_db.clone().unwrap_or_else(|| data_dir.join("board.json")),
            },
        };

        Ok(Config {
            backend,
            analyzer_url: env("WARDBOARD_ANALYZER_URL").or(file.analyzer_url),
            request_timeout: Duration::from_secs(timeout_secs.max(1)),
            analyzer_timeout: Duration::from_secs(
                file.analyzer_timeout_secs.unwrap_or(DEFAULT_ANALYZER_TIMEOUT_SECS).max(1),
            ),
            settle: SettleDelays {
                after_write: Duration::from_millis(file.settle_write_ms.unwrap_or(DEFAULT_SETTLE_WRITE_MS)),
                after_create: Duration::from_millis(file.settle_create_ms.unwrap_or(DEFAULT_SETTLE_CREATE_MS)),
            },
            data_dir,
        })
    }

    /// Local key-value store holding custom roles.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("local_store.json")
    }

    /// Log file used while the dashboard owns the terminal.
    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join("wardboard.log")
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let buf = fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    serde_json::from_str(&buf).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use assert_matches::assert_matches;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_use_local_board_in_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let overrides = Overrides { data_dir: Some(dir.path().to_path_buf()), ..Overrides::default() };
        let config = Config::resolve(&overrides, env_of(&[])).unwrap();
        assert_eq!(config.backend, Backend::Local { path: dir.path().join("board.json") });
        assert_eq!(config.request_timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.settle, SettleDelays::default());
        assert_eq!(config.store_path(), dir.path().join("local_store.json"));
    }

    #[test]
    fn env_beats_file_and_flags_beat_env() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("config.json"),
            r#"{"url": "http://file.example", "api_key": "file-key", "timeout_secs": 40, "settle_write_ms": 0}"#,
        )
        .unwrap();
        let overrides = Overrides { data_dir: Some(dir.path().to_path_buf()), ..Overrides::default() };

        let config = Config::resolve(&overrides, env_of(&[])).unwrap();
        assert_eq!(
            config.backend,
            Backend::Rest { url: "http://file.example".into(), api_key: "file-key".into() }
        );
        assert_eq!(config.request_timeout, Duration::from_secs(40));
        assert_eq!(config.settle.after_write, Duration::ZERO);

        let env = env_of(&[("WARDBOARD_URL", "http://env.example"), ("WARDBOARD_TIMEOUT_SECS", "5")]);
        let config = Config::resolve(&overrides, env).unwrap();
        assert_eq!(config.backend, Backend::Rest { url: "http://env.example".into(), api_key: "file-key".into() });
        assert_eq!(config.request_timeout, Duration::from_secs(5));

        let overrides = Overrides { url: Some("http://flag.example".into()), ..overrides };
        let config = Config::resolve(&overrides, env_of(&[("WARDBOARD_URL", "http://env.example")])).unwrap();
        assert_matches!(config.backend, Backend::Rest { url, .. } if url == "http://flag.example");
    }

    #[test]
    fn local_flag_overrides_any_url() {
        let dir = tempfile::tempdir().unwrap();
        let overrides = Overrides {
            data_dir: Some(dir.path().to_path_buf()),
            local: Some(PathBuf::from("/tmp/board.json")),
            ..Overrides::default()
        };
        let config = Config::resolve(&overrides, env_of(&[("WARDBOARD_URL", "http://env.example")])).unwrap();
        assert_eq!(config.backend, Backend::Local { path: PathBuf::from("/tmp/board.json") });
    }

    #[test]
    fn bad_timeout_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let overrides = Overrides { data_dir: Some(dir.path().to_path_buf()), ..Overrides::default() };
        assert_matches!(
            Config::resolve(&overrides, env_of(&[("WARDBOARD_TIMEOUT_SECS", "soon")])),
            Err(ConfigError::InvalidEnv { var: "WARDBOARD_TIMEOUT_SECS", .. })
        );
    }

    #[test]
    fn data_dir_from_env_or_home() {
        let config = Config::resolve(&Overrides::default(), env_of(&[("HOME", "/home/kao")])).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/home/kao/.wardboard"));
        let config = Config::resolve(&Overrides::default(), env_of(&[("WARDBOARD_DATA_DIR", "/srv/wb")])).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/wb"));
    }
}
