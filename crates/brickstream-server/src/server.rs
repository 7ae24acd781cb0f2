//! TCP accept loop

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Notify;

use brickstream::session::{BrickSelector, FrontToBackSelector, ServerSession, SessionOutcome};
use brickstream::store::DatasetRegistry;

use crate::{ServerConfig, ServerError};

/// A bound server; call [`run`](Self::run) to start accepting
///
/// Each connection runs a blocking [`ServerSession`] on tokio's blocking
/// pool. A client `Shutdown` stops the accept loop; sessions already
/// running finish on their own.
pub struct BrickServer {
    config: ServerConfig,
    listener: TcpListener,
    registry: Arc<DatasetRegistry>,
    selector: Arc<dyn BrickSelector>,
}

impl BrickServer {
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;
        let listener = TcpListener::bind(&config.bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.bind_addr.clone(),
                source,
            })?;
        log::info!(
            "serving {} on {}",
            config.data_dir.display(),
            listener.local_addr()?
        );

        Ok(Self {
            registry: Arc::new(DatasetRegistry::new(config.data_dir.clone())),
            selector: Arc::new(FrontToBackSelector::new(config.selector_lod)),
            config,
            listener,
        })
    }

    /// Replace the default front-to-back visibility policy
    pub fn with_selector(mut self, selector: Arc<dyn BrickSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> &Arc<DatasetRegistry> {
        &self.registry
    }

    /// Accept connections until a client requests shutdown
    pub async fn run(self) -> Result<(), ServerError> {
        let shutdown = Arc::new(Notify::new());
        let options = self.config.session_options();

        loop {
            let (stream, peer) = tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        log::error!("accept error: {}", e);
                        continue;
                    }
                },
                _ = shutdown.notified() => break,
            };

            // Sessions are blocking; hand them a std stream in blocking mode
            let stream = match stream.into_std().and_then(|s| s.set_nonblocking(false).map(|_| s)) {
                Ok(s) => s,
                Err(e) => {
                    log::error!("failed to prepare connection from {}: {}", peer, e);
                    continue;
                }
            };
            if let Err(e) = stream.set_nodelay(true) {
                log::warn!("set_nodelay failed for {}: {}", peer, e);
            }

            log::info!("client connected from {}", peer);
            let registry = self.registry.clone();
            let selector = self.selector.clone();
            let shutdown = shutdown.clone();
            tokio::task::spawn_blocking(move || {
                match ServerSession::new(stream, registry, selector, options).run() {
                    Ok(SessionOutcome::Disconnected) => {
                        log::info!("client disconnected: {}", peer);
                    }
                    Ok(SessionOutcome::Shutdown) => {
                        log::info!("shutdown requested by {}", peer);
                        shutdown.notify_one();
                    }
                    Err(e) => log::warn!("session with {} ended: {}", peer, e),
                }
            });
        }

        log::info!("server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brickstream::layout::LayoutKind;
    use brickstream::session::{ClientConfig, ClientSession};
    use brickstream::store::{DatasetWriter, TypeInfo};
    use glam::{UVec3, Vec3};

    fn write_dataset(dir: &std::path::Path) {
        let mut writer = DatasetWriter::create(dir.join("tiny.bsds"), TypeInfo::U16).unwrap();
        let lod = writer.add_lod(UVec3::new(2, 1, 1), LayoutKind::Morton).unwrap();
        for x in 0..2u32 {
            let voxels: Vec<u8> = (0..8u16).flat_map(|v| (v + x as u16).to_ne_bytes()).collect();
            writer
                .add_brick(
                    lod,
                    UVec3::new(x, 0, 0),
                    Vec3::new(x as f32 + 0.5, 0.5, 0.5),
                    Vec3::ONE,
                    UVec3::new(2, 2, 2),
                    &voxels,
                )
                .unwrap();
        }
        writer.finish().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_serves_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path());

        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".into(),
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let server = BrickServer::bind(config).await.unwrap();
        let port = server.local_addr().unwrap().port();
        let running = tokio::spawn(server.run());

        let files = tokio::task::spawn_blocking(move || {
            let config = ClientConfig::new("127.0.0.1", port);

            let mut client = ClientSession::connect(&config).unwrap();
            let files = client.list_files().unwrap();
            client.open("tiny.bsds").unwrap();
            let voxels = client
                .fetch_brick(brickstream::store::BrickKey::new(0, 1))
                .unwrap();
            assert_eq!(voxels.len(), 16);
            client.disconnect().unwrap();

            ClientSession::connect(&config).unwrap().shutdown().unwrap();
            files
        })
        .await
        .unwrap();

        assert_eq!(files, vec!["tiny.bsds".to_string()]);
        running.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let config = ServerConfig {
            bind_addr: "not an address".into(),
            ..Default::default()
        };
        assert!(matches!(
            BrickServer::bind(config).await,
            Err(ServerError::Bind { .. })
        ));
    }
}
