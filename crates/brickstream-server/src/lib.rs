//! Brickstream daemon - serves datasets from a directory over TCP
//!
//! ```ignore
//! let config = ServerConfig::load("server.json")?;
//! let server = BrickServer::bind(config).await?;
//! server.run().await?;
//! ```

pub mod config;
pub mod server;

pub use config::ServerConfig;
pub use server::BrickServer;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to read config {}: {source}", .path.display())]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    ParseConfig(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("accept loop failed: {0}")]
    Io(#[from] std::io::Error),
}
