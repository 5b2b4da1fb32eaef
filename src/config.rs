//! Immutable server configuration.
//!
//! Built once at startup and shared behind an `Arc` through axum state;
//! nothing mutates it afterward, so handlers read it lock-free. Defaults
//! cover the standard fixture set; a JSON file can override any field.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8080;

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A fixture file the provisioner guarantees before serving starts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FixtureSpec {
    pub name: String,
    /// Exact size in bytes.
    pub size: u64,
}

impl FixtureSpec {
    fn mib(name: &str, mib: u64) -> Self {
        FixtureSpec {
            name: name.to_string(),
            size: mib * MIB,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub port: u16,
    /// Directory holding the downloadable fixture files.
    pub files_dir: PathBuf,
    /// Target total delivery duration per fixture name, in seconds.
    /// Absent means unthrottled.
    pub throttle: HashMap<String, f64>,
    /// Fixtures provisioned at startup.
    pub fixtures: Vec<FixtureSpec>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: DEFAULT_PORT,
            files_dir: PathBuf::from("files"),
            throttle: HashMap::from([
                ("10MB.zip".to_string(), 2.0),
                ("50MB.zip".to_string(), 10.0),
                ("100MB.zip".to_string(), 30.0),
            ]),
            fixtures: vec![
                FixtureSpec::mib("1MB.zip", 1),
                FixtureSpec::mib("10MB.zip", 10),
                FixtureSpec::mib("50MB.zip", 50),
            ],
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Target total delivery duration for a fixture; zero when the name
    /// has no throttle entry.
    pub fn throttle_target(&self, name: &str) -> Duration {
        self.throttle
            .get(name)
            .copied()
            .filter(|secs| *secs > 0.0 && secs.is_finite())
            .map(Duration::from_secs_f64)
            .unwrap_or(Duration::ZERO)
    }

    pub fn file_path(&self, name: &str) -> PathBuf {
        self.files_dir.join(name)
    }
}
