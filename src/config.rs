use crate::error::{Result, TailError};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

/// Runtime configuration, read from `livetail.toml` with env overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_session_secret")]
    pub session_secret: String,
    /// Seconds of silence after which the source counts as down.
    #[serde(default = "default_source_timeout_secs")]
    pub source_timeout_secs: u64,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// SSE retry directive sent to clients on connect.
    #[serde(default = "default_retry_ms")]
    pub retry_ms: u64,
    /// Number of trailing lines rendered on the initial page load.
    #[serde(default = "default_snapshot_lines")]
    pub snapshot_lines: usize,
}

fn default_bind() -> SocketAddr {
    "127.0.0.1:8000".parse().expect("static default address")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_api_key() -> String {
    "change-me".to_string()
}

fn default_session_secret() -> String {
    "please-change-this".to_string()
}

fn default_source_timeout_secs() -> u64 {
    7
}

fn default_ping_interval_secs() -> u64 {
    1
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_retry_ms() -> u64 {
    2000
}

fn default_snapshot_lines() -> usize {
    500
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            data_dir: default_data_dir(),
            api_key: default_api_key(),
            session_secret: default_session_secret(),
            source_timeout_secs: default_source_timeout_secs(),
            ping_interval_secs: default_ping_interval_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            retry_ms: default_retry_ms(),
            snapshot_lines: default_snapshot_lines(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Path::new("livetail.toml");
        let mut config = if path.exists() {
            let raw = fs::read_to_string(path).map_err(|e| {
                TailError::Config(format!("failed to read config file '{}': {}", path.display(), e))
            })?;
            toml::from_str(&raw)?
        } else {
            Config::default()
        };

        if let Ok(key) = env::var("LIVETAIL_API_KEY") {
            config.api_key = key;
        }
        if let Ok(secret) = env::var("LIVETAIL_SESSION_SECRET") {
            config.session_secret = secret;
        }
        if let Ok(dir) = env::var("LIVETAIL_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join("server.log")
    }

    pub fn code_store_path(&self) -> PathBuf {
        self.data_dir.join("otp_store.json")
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry(&self) -> Duration {
        Duration::from_millis(self.retry_ms)
    }
}
