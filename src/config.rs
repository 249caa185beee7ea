use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::DEFAULT_PORT;
use crate::{Error, Result};

pub const DEFAULT_CACHE_DURATION: Duration = Duration::from_secs(15);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

pub const ENV_HOST: &str = "NEOHUB_IP";
pub const ENV_PORT: &str = "NEOHUB_PORT";
pub const ENV_CACHE_SECS: &str = "NEOHUB_CACHE_SECS";

/// Connection and caching parameters for one hub.
///
/// Durations are whole seconds when (de)serialized, so a host application
/// can embed this in its own config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(
        rename = "cache_duration_secs",
        with = "seconds",
        default = "default_cache_duration"
    )]
    pub cache_duration: Duration,
    #[serde(
        rename = "connect_timeout_secs",
        with = "seconds",
        default = "default_connect_timeout"
    )]
    pub connect_timeout: Duration,
    #[serde(
        rename = "read_timeout_secs",
        with = "seconds",
        default = "default_read_timeout"
    )]
    pub read_timeout: Duration,
}

impl HubConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            cache_duration: DEFAULT_CACHE_DURATION,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Build from `NEOHUB_IP`, `NEOHUB_PORT` and `NEOHUB_CACHE_SECS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = lookup(ENV_HOST)
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| Error::Config(format!("{ENV_HOST} is not set")))?;
        let mut config = Self::new(host.trim());

        if let Some(port) = lookup(ENV_PORT) {
            config.port = port
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("{ENV_PORT} is not a port: {port}")))?;
        }
        if let Some(secs) = lookup(ENV_CACHE_SECS) {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("{ENV_CACHE_SECS} is not a number: {secs}")))?;
            config.cache_duration = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_cache_duration() -> Duration {
    DEFAULT_CACHE_DURATION
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_read_timeout() -> Duration {
    DEFAULT_READ_TIMEOUT
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
