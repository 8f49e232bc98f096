use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a number, got {value:?}")]
    NotANumber { var: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Process configuration, read from `BILLET_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub compact_threshold: u64,
    pub lock_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            compact_threshold: 1000,
            lock_timeout: Duration::from_millis(2000),
        }
    }
}

fn parse<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::NotANumber { var, value })
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; unset variables keep their
    /// defaults, malformed numbers are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Config::default();
        if let Some(v) = lookup("BILLET_BIND") {
            cfg.bind = v;
        }
        if let Some(v) = lookup("BILLET_PORT") {
            cfg.port = parse("BILLET_PORT", v)?;
        }
        if let Some(v) = lookup("BILLET_DATA_DIR") {
            cfg.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("BILLET_METRICS_PORT") {
            cfg.metrics_port = Some(parse("BILLET_METRICS_PORT", v)?);
        }
        if let Some(v) = lookup("BILLET_COMPACT_THRESHOLD") {
            cfg.compact_threshold = parse("BILLET_COMPACT_THRESHOLD", v)?;
            if cfg.compact_threshold == 0 {
                return Err(ConfigError::Zero("BILLET_COMPACT_THRESHOLD"));
            }
        }
        if let Some(v) = lookup("BILLET_LOCK_TIMEOUT_MS") {
            let ms: u64 = parse("BILLET_LOCK_TIMEOUT_MS", v)?;
            if ms == 0 {
                return Err(ConfigError::Zero("BILLET_LOCK_TIMEOUT_MS"));
            }
            cfg.lock_timeout = Duration::from_millis(ms);
        }
        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
