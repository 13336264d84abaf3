//! Runtime configuration.
//!
//! The library is configured through a plain [`Config`] struct; embedders
//! that prefer the environment can use [`Config::from_env`], which reads
//! the `TRACKER_ADDR`, `SEEDER_BIND`, `DOWNLOAD_DIR`, `CHUNK_SIZE`,
//! `PARALLELISM`, `KEEPALIVE_INTERVAL` and `LIVENESS_TIMEOUT` variables on
//! top of the defaults. A [`ConfigError`] maps to exit code 2 in thin CLI
//! frontends.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::constants::*;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },

    #[error("cannot resolve {var}={value:?}")]
    Unresolvable { var: &'static str, value: String },

    #[error("chunk size {0} out of range (1..={MAX_BODY_SIZE})")]
    ChunkSizeOutOfRange(usize),

    #[error("parallelism must be at least 1")]
    ZeroParallelism,
}

/// Configuration shared by all three roles.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address of the tracker's datagram socket.
    pub tracker_addr: SocketAddr,
    /// Address the seeder's stream listener binds to; port 0 picks an
    /// ephemeral port.
    pub seeder_bind: SocketAddr,
    /// Directory reassembled downloads are written into. Created on demand.
    pub download_dir: PathBuf,
    /// Size of every chunk except possibly the last.
    pub chunk_size: usize,
    /// Number of parallel download workers, capped at [`MAX_PARALLELISM`].
    pub parallelism: usize,
    pub keepalive_interval: Duration,
    pub liveness_timeout: Duration,
    pub reap_interval: Duration,
    pub serve_timeout: Duration,
    pub chunk_timeout: Duration,
    pub discovery_timeout: Duration,
    pub retry_budget: u32,
    pub max_inflight_serves: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tracker_addr: SocketAddr::new(
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                DEFAULT_TRACKER_PORT,
            ),
            seeder_bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            download_dir: PathBuf::from("./downloads"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            parallelism: DEFAULT_PARALLELISM,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            liveness_timeout: DEFAULT_LIVENESS_TIMEOUT,
            reap_interval: DEFAULT_REAP_INTERVAL,
            serve_timeout: DEFAULT_SERVE_TIMEOUT,
            chunk_timeout: DEFAULT_CHUNK_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            retry_budget: DEFAULT_RETRY_BUDGET,
            max_inflight_serves: DEFAULT_MAX_INFLIGHT_SERVES,
        }
    }
}

impl Config {
    /// Builds a configuration from the environment, falling back to
    /// defaults for unset variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(value) = env("TRACKER_ADDR") {
            config.tracker_addr = resolve_addr("TRACKER_ADDR", &value)?;
        }
        if let Some(value) = env("SEEDER_BIND") {
            config.seeder_bind = resolve_addr("SEEDER_BIND", &value)?;
        }
        if let Some(value) = env("DOWNLOAD_DIR") {
            config.download_dir = PathBuf::from(value);
        }
        if let Some(value) = env("CHUNK_SIZE") {
            config.chunk_size = parse("CHUNK_SIZE", &value)?;
        }
        if let Some(value) = env("PARALLELISM") {
            config.parallelism = parse("PARALLELISM", &value)?;
        }
        if let Some(value) = env("KEEPALIVE_INTERVAL") {
            config.keepalive_interval = parse_secs("KEEPALIVE_INTERVAL", &value)?;
        }
        if let Some(value) = env("LIVENESS_TIMEOUT") {
            config.liveness_timeout = parse_secs("LIVENESS_TIMEOUT", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks invariants the rest of the crate relies on. Chunks must fit
    /// in a ChunkData body and at least one worker must exist.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 || self.chunk_size > MAX_BODY_SIZE {
            return Err(ConfigError::ChunkSizeOutOfRange(self.chunk_size));
        }
        if self.parallelism == 0 {
            return Err(ConfigError::ZeroParallelism);
        }
        Ok(())
    }

    /// Worker count after applying the hard cap.
    pub fn effective_parallelism(&self) -> usize {
        self.parallelism.min(MAX_PARALLELISM)
    }
}

fn env(var: &'static str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

fn parse<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid {
        var,
        value: value.to_string(),
    })
}

fn parse_secs(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse::<u64>(var, value).map(Duration::from_secs)
}

/// Parses `host:port`, resolving host names through the system resolver.
fn resolve_addr(var: &'static str, value: &str) -> Result<SocketAddr, ConfigError> {
    if let Ok(addr) = value.parse() {
        return Ok(addr);
    }
    value
        .to_socket_addrs()
        .map_err(|_| ConfigError::Unresolvable {
            var,
            value: value.to_string(),
        })?
        .next()
        .ok_or(ConfigError::Unresolvable {
            var,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.tracker_addr.port(), DEFAULT_TRACKER_PORT);
        assert_eq!(config.seeder_bind.port(), 0);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn rejects_oversized_chunks() {
        let config = Config {
            chunk_size: MAX_BODY_SIZE + 1,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ChunkSizeOutOfRange(_))
        ));
    }

    #[test]
    fn rejects_zero_parallelism() {
        let config = Config {
            parallelism: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroParallelism)));
    }

    #[test]
    fn parallelism_is_capped() {
        let config = Config {
            parallelism: 1000,
            ..Config::default()
        };
        assert_eq!(config.effective_parallelism(), MAX_PARALLELISM);
    }

    #[test]
    fn resolves_plain_socket_addrs() {
        let addr = resolve_addr("TRACKER_ADDR", "127.0.0.1:5000").unwrap();
        assert_eq!(addr.port(), 5000);
        assert!(resolve_addr("TRACKER_ADDR", "not an address").is_err());
    }
}
