//! Client side of a connection
//!
//! A [`ClientSession`] is an explicit connection value; methods take
//! `&mut self`, so sharing one between threads needs an external `Mutex`.
//! Every command is a synchronous round trip except rotation streams, where
//! the client pulls batches with [`ClientSession::next_batch`].

use std::io::{Read, Write};
use std::net::TcpStream;

use glam::{Mat4, UVec3};

use super::config::ClientConfig;
use super::rotation::{Batch, BatchInfo, RotateInfo};
use super::SessionState;
use crate::compression::{decompress_brick, CodecId, CompressedBrick};
use crate::core::{Error, Result};
use crate::layout::{Layout, SpatialLayout};
use crate::store::{BrickKey, DatasetMetadata, MinMaxTable};
use crate::wire::{Opcode, ResponseStatus, Wire};

struct OpenDataset {
    name: String,
    metadata: DatasetMetadata,
    layouts: Vec<Layout>,
}

pub struct ClientSession<S = TcpStream> {
    wire: Wire<S>,
    state: SessionState,
    dataset: Option<OpenDataset>,
    minmax: Option<MinMaxTable>,
}

impl ClientSession<TcpStream> {
    /// Connect to a server and run the handshake
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        let stream = TcpStream::connect((config.host.as_str(), config.port))
            .map_err(Error::ConnectionLost)?;
        stream.set_nodelay(true).map_err(Error::ConnectionLost)?;
        log::info!("connected to {}:{}", config.host, config.port);

        let wire = Wire::new(stream)
            .with_send_mode(config.send_mode)
            .with_max_vector_len(config.max_vector_len);
        Self::handshake(wire)
    }
}

impl<S: Read + Write> ClientSession<S> {
    /// Run the handshake over an already connected stream
    pub fn handshake(mut wire: Wire<S>) -> Result<Self> {
        wire.client_handshake()?;
        Ok(Self {
            wire,
            state: SessionState::Connected,
            dataset: None,
            minmax: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn needs_byte_swap(&self) -> bool {
        self.wire.needs_byte_swap()
    }

    /// Metadata of the open dataset
    pub fn metadata(&self) -> Option<&DatasetMetadata> {
        self.dataset.as_ref().map(|d| &d.metadata)
    }

    pub fn dataset_name(&self) -> Option<&str> {
        self.dataset.as_ref().map(|d| d.name.as_str())
    }

    fn require_connected(&self) -> Result<()> {
        match self.state {
            SessionState::Connected => Ok(()),
            SessionState::AwaitingResponse => Err(Error::InvalidState(
                "an earlier command failed mid-response; reconnect",
            )),
            SessionState::Streaming { .. } => Err(Error::InvalidState(
                "a rotation stream is active; drain or cancel it first",
            )),
        }
    }

    fn require_dataset(&self) -> Result<&OpenDataset> {
        self.dataset
            .as_ref()
            .ok_or(Error::InvalidState("no dataset is open"))
    }

    /// Send a command and read its status
    ///
    /// The state stays `AwaitingResponse` if anything fails before the
    /// response is fully read; the connection is out of sync at that point.
    fn round_trip<T>(
        &mut self,
        opcode: Opcode,
        send: impl FnOnce(&mut Wire<S>) -> Result<()>,
        recv: impl FnOnce(&mut Wire<S>) -> Result<T>,
    ) -> Result<T> {
        let resume = self.state;
        self.state = SessionState::AwaitingResponse;
        log::debug!("sending {:?}", opcode);

        self.wire.write_opcode(opcode);
        send(&mut self.wire)?;
        let status = self.wire.read_status()?;
        if status != ResponseStatus::Ok {
            let message = self.wire.read_string()?;
            self.state = resume;
            return Err(Error::Remote { status, message });
        }
        let value = recv(&mut self.wire)?;
        self.state = resume;
        Ok(value)
    }

    /// Open a dataset by name and cache its metadata
    pub fn open(&mut self, name: &str) -> Result<&DatasetMetadata> {
        self.require_connected()?;
        let metadata: DatasetMetadata = self.round_trip(
            Opcode::Open,
            |w| Ok(w.write_str(name)?),
            |w| Ok(w.read_record()?),
        )?;
        let layouts = metadata.layouts()?;

        let dataset = self.dataset.insert(OpenDataset {
            name: name.to_string(),
            metadata,
            layouts,
        });
        Ok(&dataset.metadata)
    }

    /// Close a dataset; the cached metadata is dropped when it names the open one
    pub fn close_dataset(&mut self, name: &str) -> Result<()> {
        self.require_connected()?;
        self.round_trip(Opcode::Close, |w| Ok(w.write_str(name)?), |_| Ok(()))?;
        if self.dataset_name() == Some(name) {
            self.dataset = None;
        }
        Ok(())
    }

    /// Close the connection
    pub fn disconnect(mut self) -> Result<()> {
        self.wire.flush()?;
        log::info!("disconnected");
        Ok(())
    }

    /// Ask the server to stop accepting connections; there is no response
    pub fn shutdown(mut self) -> Result<()> {
        self.require_connected()?;
        self.wire.write_opcode(Opcode::Shutdown);
        self.wire.flush()?;
        log::info!("server shutdown requested");
        Ok(())
    }

    pub fn list_files(&mut self) -> Result<Vec<String>> {
        self.require_connected()?;
        self.round_trip(Opcode::ListFiles, |_| Ok(()), |w| Ok(w.read_strings()?))
    }

    /// Fetch one compressed brick
    ///
    /// The key is checked against the cached layout first, so an index that
    /// addresses no brick fails locally with `OutOfDomain`.
    pub fn brick(&mut self, key: BrickKey) -> Result<CompressedBrick> {
        self.require_connected()?;
        let dataset = self.require_dataset()?;
        let (grid, layout) = dataset
            .metadata
            .lod(key.lod)
            .zip(dataset.layouts.get(key.lod as usize))
            .ok_or(Error::UnknownLod(key.lod))?;
        layout.to_position(grid.dims(), key.index)?;

        self.round_trip(
            Opcode::Brick,
            |w| {
                w.write(key.lod);
                w.write(key.index);
                Ok(())
            },
            read_brick,
        )
        .map_err(|e| match e {
            Error::Remote {
                status: ResponseStatus::NotFound,
                ..
            } => Error::NotFound(key),
            other => other,
        })
    }

    /// Fetch the brick at a grid position of `lod`
    pub fn brick_at(&mut self, lod: u32, pos: UVec3) -> Result<(BrickKey, CompressedBrick)> {
        self.require_connected()?;
        self.require_dataset()?;
        self.round_trip(
            Opcode::BrickAt,
            |w| {
                w.write(lod);
                w.write(pos.x);
                w.write(pos.y);
                w.write(pos.z);
                Ok(())
            },
            |w| {
                let index = w.read::<u64>()?;
                Ok((BrickKey::new(lod, index), read_brick(w)?))
            },
        )
    }

    /// Fetch and decompress one brick
    pub fn fetch_brick(&mut self, key: BrickKey) -> Result<Vec<u8>> {
        let brick = self.brick(key)?;
        Ok(decompress_brick(&brick)?)
    }

    /// Set the batch size for later rotations
    pub fn set_batch_size(&mut self, size: u32) -> Result<()> {
        self.require_connected()?;
        self.round_trip(
            Opcode::BatchSize,
            |w| {
                w.write(size);
                Ok(())
            },
            |_| Ok(()),
        )
    }

    /// Start a rotation stream for `view`
    ///
    /// Returns the keys the server will deliver. Batches are then pulled with
    /// [`next_batch`](Self::next_batch).
    pub fn rotate(&mut self, view: &Mat4) -> Result<RotateInfo> {
        self.require_connected()?;
        self.require_dataset()?;
        let cols = view.to_cols_array();
        let info: RotateInfo = self.round_trip(
            Opcode::Rotation,
            |w| Ok(w.write_slice(&cols)?),
            |w| Ok(w.read_record()?),
        )?;
        if !info.keys.is_empty() {
            self.state = SessionState::Streaming {
                remaining: info.keys.len(),
            };
        }
        Ok(info)
    }

    /// Pull the next batch of the active rotation stream
    pub fn next_batch(&mut self) -> Result<Batch> {
        let SessionState::Streaming { remaining } = self.state else {
            return Err(Error::InvalidState("no rotation stream is active"));
        };

        let batch = self.round_trip(Opcode::NextBatch, |_| Ok(()), |w| {
            let info: BatchInfo = w.read_record()?;
            if info.keys.len() != info.brick_sizes.len() {
                return Err(Error::Protocol(format!(
                    "batch lists {} keys but {} sizes",
                    info.keys.len(),
                    info.brick_sizes.len()
                )));
            }
            let mut bricks = Vec::with_capacity(info.keys.len());
            for _ in 0..info.keys.len() {
                bricks.push(read_brick(w)?);
            }
            Ok(Batch { info, bricks })
        });
        // The server drops its cursor whenever it rejects a batch
        let batch = batch.inspect_err(|e| {
            if let Error::Remote { .. } = e {
                self.state = SessionState::Connected;
            }
        })?;

        let remaining = remaining.saturating_sub(batch.len());
        self.state = if batch.info.more_data_coming {
            SessionState::Streaming { remaining }
        } else {
            SessionState::Connected
        };
        Ok(batch)
    }

    /// Stop the active rotation stream; succeeds whether or not one is active
    pub fn cancel_batches(&mut self) -> Result<()> {
        if let SessionState::Streaming { .. } = self.state {
            self.state = SessionState::Connected;
        }
        self.require_connected()?;
        self.round_trip(Opcode::CancelBatches, |_| Ok(()), |_| Ok(()))
    }

    /// Min/max records of every brick
    ///
    /// The table is fetched once and kept across `open` and `close_dataset`
    /// until [`clear_min_max_values`](Self::clear_min_max_values) drops it.
    pub fn calc_min_max(&mut self) -> Result<&MinMaxTable> {
        if self.minmax.is_none() {
            self.require_connected()?;
            self.require_dataset()?;
            let table: MinMaxTable =
                self.round_trip(Opcode::CalcMinMax, |_| Ok(()), |w| Ok(w.read_record()?))?;
            self.minmax = Some(table);
        }
        self.minmax
            .as_ref()
            .ok_or(Error::InvalidState("min/max table unavailable"))
    }

    /// Forget cached min/max records; the next `calc_min_max` asks the server again
    pub fn clear_min_max_values(&mut self) {
        self.minmax = None;
    }
}

/// Brick frame: codec byte, uncompressed size, counted payload
fn read_brick<S: Read + Write>(wire: &mut Wire<S>) -> Result<CompressedBrick> {
    let codec = CodecId::try_from(wire.read::<u8>()?)?;
    let uncompressed_size = wire.read::<u64>()? as usize;
    let data = wire.read_bytes()?;
    Ok(CompressedBrick {
        data,
        uncompressed_size,
        codec,
    })
}
