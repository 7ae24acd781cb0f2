//! Daemon configuration, loaded from JSON

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use brickstream::session::{SessionOptions, DEFAULT_BATCH_SIZE};
use brickstream::wire::{SendMode, DEFAULT_MAX_VECTOR_LEN, DEFAULT_PORT};

use crate::ServerError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address, `host:port`
    pub bind_addr: String,
    /// Directory holding the `.bsds` datasets clients may open
    pub data_dir: PathBuf,
    /// Bricks per rotation batch until a client sends `BatchSize`
    pub default_batch_size: u32,
    pub send_mode: SendMode,
    /// LOD streamed by rotations; `None` streams the coarsest level
    pub selector_lod: Option<u32>,
    /// Largest counted vector accepted from a client
    pub max_vector_len: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{}", DEFAULT_PORT),
            data_dir: PathBuf::from("data"),
            default_batch_size: DEFAULT_BATCH_SIZE,
            send_mode: SendMode::default(),
            selector_lod: None,
            max_vector_len: DEFAULT_MAX_VECTOR_LEN,
        }
    }
}

impl ServerConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ServerError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ServerConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.default_batch_size == 0 {
            return Err(ServerError::InvalidConfig(
                "default_batch_size must be at least 1".into(),
            ));
        }
        if self.max_vector_len == 0 {
            return Err(ServerError::InvalidConfig(
                "max_vector_len must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            batch_size: self.default_batch_size,
            send_mode: self.send_mode,
            max_vector_len: self.max_vector_len,
        }
    }
}
