//! Command opcodes and response status codes

use super::WireError;

/// Handshake magic sent by the client right after connecting
pub const MAGIC: [u8; 4] = *b"IV3D";

/// Well-known server port
pub const DEFAULT_PORT: u16 = 4445;

/// Commands sent from client to server, one byte each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Open a dataset by file name; answered with its metadata
    Open = 0,
    /// Close a dataset by file name
    Close = 1,
    /// Fetch one brick by LOD and linear index
    Brick = 2,
    /// List the datasets the server can open
    ListFiles = 3,
    /// Stop the server; no response
    Shutdown = 4,
    /// Start a view-driven brick stream for a view matrix
    Rotation = 5,
    /// Set the maximum bricks per batch for later rotations
    BatchSize = 6,
    /// Stop the active rotation stream before its next batch
    CancelBatches = 7,
    /// Compute min/max records for every brick of the open dataset
    CalcMinMax = 8,
    /// Pull the next batch of the active rotation stream
    NextBatch = 9,
    /// Fetch one brick by LOD and grid position
    BrickAt = 10,
}

impl Opcode {
    pub const ALL: [Opcode; 11] = [
        Opcode::Open,
        Opcode::Close,
        Opcode::Brick,
        Opcode::ListFiles,
        Opcode::Shutdown,
        Opcode::Rotation,
        Opcode::BatchSize,
        Opcode::CancelBatches,
        Opcode::CalcMinMax,
        Opcode::NextBatch,
        Opcode::BrickAt,
    ];
}

impl TryFrom<u8> for Opcode {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Opcode::ALL
            .into_iter()
            .find(|op| *op as u8 == value)
            .ok_or(WireError::UnknownOpcode(value))
    }
}

/// First byte of every response; failures are followed by a message string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResponseStatus {
    Ok = 0,
    /// Unknown dataset, file or brick
    NotFound = 1,
    /// The dataset's element type has no wire representation
    Unsupported = 2,
    /// The dataset or a brick payload failed to parse or decode
    Corrupt = 3,
    /// The command is malformed or not valid in the session's state
    Protocol = 4,
    /// An argument is out of range
    InvalidArgument = 5,
    /// Server-side I/O or other unexpected failure
    Internal = 6,
}

impl ResponseStatus {
    const ALL: [ResponseStatus; 7] = [
        ResponseStatus::Ok,
        ResponseStatus::NotFound,
        ResponseStatus::Unsupported,
        ResponseStatus::Corrupt,
        ResponseStatus::Protocol,
        ResponseStatus::InvalidArgument,
        ResponseStatus::Internal,
    ];
}

impl TryFrom<u8> for ResponseStatus {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        ResponseStatus::ALL
            .into_iter()
            .find(|s| *s as u8 == value)
            .ok_or(WireError::UnknownStatus(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::try_from(op as u8).unwrap(), op);
        }
        assert!(matches!(Opcode::try_from(77), Err(WireError::UnknownOpcode(77))));
    }

    #[test]
    fn test_status_roundtrip() {
        for status in ResponseStatus::ALL {
            assert_eq!(ResponseStatus::try_from(status as u8).unwrap(), status);
        }
        assert!(ResponseStatus::try_from(200).is_err());
    }
}
