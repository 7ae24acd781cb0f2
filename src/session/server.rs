//! Server side of a connection: handshake, then the command loop

use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;

use glam::{Mat4, UVec3};

use super::rotation::{BatchInfo, BrickSelector, RotateInfo, RotationCursor};
use super::SessionOutcome;
use crate::compression::CompressedBrick;
use crate::core::{Error, Result};
use crate::store::{BrickKey, BrickStore, DatasetError, DatasetRegistry, StoreError};
use crate::wire::{Opcode, ResponseStatus, SendMode, Wire, WireError, DEFAULT_MAX_VECTOR_LEN};

/// Bricks per batch until a client sends `BatchSize`
pub const DEFAULT_BATCH_SIZE: u32 = 16;

/// Per-connection settings handed down from the daemon configuration
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub batch_size: u32,
    pub send_mode: SendMode,
    pub max_vector_len: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            send_mode: SendMode::default(),
            max_vector_len: DEFAULT_MAX_VECTOR_LEN,
        }
    }
}

/// A command failure
///
/// `Rejected` commands were fully read, so the client gets a status and the
/// session continues. `Fatal` errors end the session.
enum CommandError {
    Rejected {
        status: ResponseStatus,
        message: String,
    },
    Fatal(Error),
}

impl CommandError {
    fn rejected(status: ResponseStatus, message: impl Into<String>) -> Self {
        CommandError::Rejected {
            status,
            message: message.into(),
        }
    }
}

impl From<WireError> for CommandError {
    fn from(e: WireError) -> Self {
        CommandError::Fatal(e.into())
    }
}

impl From<DatasetError> for CommandError {
    fn from(e: DatasetError) -> Self {
        let status = match e {
            DatasetError::Missing(_) => ResponseStatus::NotFound,
            DatasetError::UnsupportedType { .. } => ResponseStatus::Unsupported,
            DatasetError::Corrupt { .. } => ResponseStatus::Corrupt,
            DatasetError::Io { .. } => ResponseStatus::Internal,
            DatasetError::Invalid(_) => ResponseStatus::InvalidArgument,
        };
        CommandError::rejected(status, e.to_string())
    }
}

impl From<StoreError> for CommandError {
    fn from(e: StoreError) -> Self {
        let status = match e {
            StoreError::NotFound(_) => ResponseStatus::NotFound,
            StoreError::UnknownLod(_) | StoreError::Layout(_) => ResponseStatus::InvalidArgument,
            StoreError::Codec(_) => ResponseStatus::Corrupt,
            StoreError::Dataset(e) => return e.into(),
        };
        CommandError::rejected(status, e.to_string())
    }
}

type CommandResult = std::result::Result<(), CommandError>;

/// One client connection
pub struct ServerSession<S> {
    wire: Wire<S>,
    registry: Arc<DatasetRegistry>,
    selector: Arc<dyn BrickSelector>,
    dataset: Option<(String, Arc<BrickStore>)>,
    /// Applies to the next rotation
    batch_size: u32,
    cursor: Option<RotationCursor>,
}

impl<S: Read + Write> ServerSession<S> {
    pub fn new(
        stream: S,
        registry: Arc<DatasetRegistry>,
        selector: Arc<dyn BrickSelector>,
        options: SessionOptions,
    ) -> Self {
        let wire = Wire::new(stream)
            .with_send_mode(options.send_mode)
            .with_max_vector_len(options.max_vector_len);
        Self {
            wire,
            registry,
            selector,
            dataset: None,
            batch_size: options.batch_size.max(1),
            cursor: None,
        }
    }

    /// Handshake, then serve commands until the client leaves or asks for shutdown
    pub fn run(mut self) -> Result<SessionOutcome> {
        self.wire.server_handshake()?;
        let outcome = self.command_loop();
        self.release_dataset();
        outcome
    }

    fn command_loop(&mut self) -> Result<SessionOutcome> {
        loop {
            let opcode = match self.wire.read::<u8>() {
                Ok(byte) => byte,
                Err(WireError::ConnectionLost(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                    return Ok(SessionOutcome::Disconnected);
                }
                Err(e) => return Err(e.into()),
            };
            let opcode = match Opcode::try_from(opcode) {
                Ok(op) => op,
                Err(e) => {
                    log::warn!("closing session: {}", e);
                    return Err(e.into());
                }
            };
            log::debug!("command {:?}", opcode);

            if opcode == Opcode::Shutdown {
                log::info!("shutdown requested by client");
                return Ok(SessionOutcome::Shutdown);
            }

            match self.dispatch(opcode) {
                Ok(()) => {}
                Err(CommandError::Rejected { status, message }) => {
                    log::warn!("{:?} rejected with {:?}: {}", opcode, status, message);
                    let message = if message.is_empty() {
                        format!("{:?}", status)
                    } else {
                        message
                    };
                    self.wire.write_status(status);
                    self.wire.write_str(&message)?;
                }
                Err(CommandError::Fatal(e)) => return Err(e),
            }
            self.wire.flush()?;
        }
    }

    fn dispatch(&mut self, opcode: Opcode) -> CommandResult {
        if self.cursor.is_some() && !matches!(opcode, Opcode::NextBatch | Opcode::CancelBatches) {
            // Arguments are still consumed so the stream stays in sync
            self.skip_arguments(opcode)?;
            return Err(CommandError::rejected(
                ResponseStatus::Protocol,
                format!("{:?} is not allowed while a rotation stream is active", opcode),
            ));
        }

        match opcode {
            Opcode::Open => self.open(),
            Opcode::Close => self.close(),
            Opcode::Brick => self.brick(),
            Opcode::BrickAt => self.brick_at(),
            Opcode::ListFiles => self.list_files(),
            Opcode::Rotation => self.rotation(),
            Opcode::NextBatch => self.next_batch(),
            Opcode::BatchSize => self.set_batch_size(),
            Opcode::CancelBatches => self.cancel_batches(),
            Opcode::CalcMinMax => self.calc_min_max(),
            Opcode::Shutdown => Ok(()),
        }
    }

    fn skip_arguments(&mut self, opcode: Opcode) -> std::result::Result<(), WireError> {
        match opcode {
            Opcode::Open | Opcode::Close => {
                self.wire.read_string()?;
            }
            Opcode::Brick => {
                self.wire.read::<u32>()?;
                self.wire.read::<u64>()?;
            }
            Opcode::BrickAt => {
                for _ in 0..4 {
                    self.wire.read::<u32>()?;
                }
            }
            Opcode::Rotation => {
                self.wire.read_vec::<f32>()?;
            }
            Opcode::BatchSize => {
                self.wire.read::<u32>()?;
            }
            Opcode::ListFiles
            | Opcode::Shutdown
            | Opcode::CancelBatches
            | Opcode::CalcMinMax
            | Opcode::NextBatch => {}
        }
        Ok(())
    }

    fn store(&self) -> std::result::Result<Arc<BrickStore>, CommandError> {
        self.dataset
            .as_ref()
            .map(|(_, store)| store.clone())
            .ok_or_else(|| CommandError::rejected(ResponseStatus::Protocol, "no dataset is open"))
    }

    fn release_dataset(&mut self) {
        if let Some((name, store)) = self.dataset.take() {
            self.registry.close(&name, store);
        }
    }

    fn write_brick(&mut self, brick: &CompressedBrick) -> std::result::Result<(), WireError> {
        self.wire.write(brick.codec as u8);
        self.wire.write(brick.uncompressed_size as u64);
        self.wire.write_bytes(&brick.data)
    }

    fn open(&mut self) -> CommandResult {
        let name = self.wire.read_string()?;
        let store = self.registry.open(&name)?;
        self.release_dataset();
        log::info!("client opened {}", name);

        self.wire.write_status(ResponseStatus::Ok);
        self.wire.write_record(store.metadata())?;
        self.dataset = Some((name, store));
        Ok(())
    }

    fn close(&mut self) -> CommandResult {
        let name = self.wire.read_string()?;
        match &self.dataset {
            Some((open, _)) if *open == name => {}
            _ => {
                return Err(CommandError::rejected(
                    ResponseStatus::NotFound,
                    format!("dataset {} is not open", name),
                ));
            }
        }
        self.release_dataset();
        self.wire.write_status(ResponseStatus::Ok);
        Ok(())
    }

    fn brick(&mut self) -> CommandResult {
        let lod = self.wire.read::<u32>()?;
        let index = self.wire.read::<u64>()?;
        let brick = self.store()?.get_brick(BrickKey::new(lod, index))?;

        self.wire.write_status(ResponseStatus::Ok);
        self.write_brick(&brick)?;
        Ok(())
    }

    fn brick_at(&mut self) -> CommandResult {
        let lod = self.wire.read::<u32>()?;
        let pos = UVec3::new(
            self.wire.read::<u32>()?,
            self.wire.read::<u32>()?,
            self.wire.read::<u32>()?,
        );
        let store = self.store()?;
        let key = store.key_at(lod, pos)?;
        let brick = store.get_brick(key)?;

        self.wire.write_status(ResponseStatus::Ok);
        self.wire.write(key.index);
        self.write_brick(&brick)?;
        Ok(())
    }

    fn list_files(&mut self) -> CommandResult {
        let files = self.registry.list_files()?;
        self.wire.write_status(ResponseStatus::Ok);
        self.wire.write_strings(&files)?;
        Ok(())
    }

    fn rotation(&mut self) -> CommandResult {
        let cols = self.wire.read_vec::<f32>()?;
        let cols: [f32; 16] = cols.try_into().map_err(|v: Vec<f32>| {
            CommandError::rejected(
                ResponseStatus::InvalidArgument,
                format!("view matrix has {} elements, expected 16", v.len()),
            )
        })?;
        let view = Mat4::from_cols_array(&cols);
        let det = view.determinant();
        if !det.is_finite() || det == 0.0 {
            return Err(CommandError::rejected(
                ResponseStatus::InvalidArgument,
                "view matrix is not invertible",
            ));
        }

        let store = self.store()?;
        let keys = self.selector.select(store.metadata(), &view);
        log::debug!("rotation selected {} bricks, batch size {}", keys.len(), self.batch_size);

        self.wire.write_status(ResponseStatus::Ok);
        self.wire.write_record(&RotateInfo { keys: keys.clone() })?;
        self.cursor = (!keys.is_empty()).then(|| RotationCursor::new(keys, self.batch_size));
        Ok(())
    }

    fn next_batch(&mut self) -> CommandResult {
        let store = self.store()?;
        let Some(cursor) = self.cursor.as_mut() else {
            return Err(CommandError::rejected(
                ResponseStatus::Protocol,
                "no rotation stream is active",
            ));
        };

        let keys = cursor.next_batch().to_vec();
        let more_data_coming = !cursor.is_exhausted();
        let (brick_sizes, bricks) = keys
            .iter()
            .map(|&key| {
                let meta = store.brick_metadata(key)?;
                Ok::<_, StoreError>((meta.element_count().unwrap_or_default(), store.get_brick(key)?))
            })
            .collect::<std::result::Result<(Vec<u64>, Vec<_>), StoreError>>()
            .inspect_err(|_| self.cursor = None)?;

        if !more_data_coming {
            self.cursor = None;
        }

        let info = BatchInfo {
            keys,
            brick_sizes,
            more_data_coming,
        };
        self.wire.write_status(ResponseStatus::Ok);
        self.wire.write_record(&info)?;
        for brick in &bricks {
            self.write_brick(brick)?;
        }
        Ok(())
    }

    fn set_batch_size(&mut self) -> CommandResult {
        let size = self.wire.read::<u32>()?;
        if size == 0 {
            return Err(CommandError::rejected(
                ResponseStatus::InvalidArgument,
                "batch size must be at least 1",
            ));
        }
        self.batch_size = size;
        self.wire.write_status(ResponseStatus::Ok);
        Ok(())
    }

    fn cancel_batches(&mut self) -> CommandResult {
        if let Some(cursor) = self.cursor.take() {
            log::debug!("rotation cancelled with {} bricks undelivered", cursor.remaining());
        }
        self.wire.write_status(ResponseStatus::Ok);
        Ok(())
    }

    fn calc_min_max(&mut self) -> CommandResult {
        let table = self.store()?.compute_all_minmax()?;
        self.wire.write_status(ResponseStatus::Ok);
        self.wire.write_record(&table)?;
        Ok(())
    }
}
