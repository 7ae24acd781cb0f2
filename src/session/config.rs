//! Client connection settings

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};
use crate::wire::{SendMode, DEFAULT_MAX_VECTOR_LEN, DEFAULT_PORT};

/// Server host, `host` or `host:port`
pub const ENV_SERVER: &str = "IV3D_SERVER";
/// Any value other than empty or `0` selects [`SendMode::Retrying`]
pub const ENV_USE_WRITE2: &str = "IV3D_USE_WRITE2";
/// Port override, wins over a port given in [`ENV_SERVER`]
pub const ENV_PORT: &str = "IV3D_PORT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub send_mode: SendMode,
    /// Largest counted vector accepted from the server
    pub max_vector_len: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            send_mode: SendMode::default(),
            max_vector_len: DEFAULT_MAX_VECTOR_LEN,
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Build from the `IV3D_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let server = lookup(ENV_SERVER)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| Error::Config(format!("{} is not set", ENV_SERVER)))?;
        let server = server.trim();

        let mut config = match server.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => {
                let port = parse_port(ENV_SERVER, port)?;
                Self::new(host, port)
            }
            _ => Self::new(server, DEFAULT_PORT),
        };

        if let Some(port) = lookup(ENV_PORT) {
            config.port = parse_port(ENV_PORT, &port)?;
        }

        let retry = lookup(ENV_USE_WRITE2).is_some_and(|v| !v.is_empty() && v != "0");
        if retry {
            config.send_mode = SendMode::Retrying;
        }

        Ok(config)
    }
}

fn parse_port(var: &str, value: &str) -> Result<u16> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} has invalid port {:?}", var, value)))
}
