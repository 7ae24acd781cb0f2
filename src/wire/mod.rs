//! Wire framing shared by client and server
//!
//! A connection starts with the client sending the `IV3D` magic. Both peers
//! then exchange their native byte order once; when the orders differ every
//! multi-byte field is swapped by the *sender*, so receivers always read
//! native values and same-architecture peers never swap at all.
//!
//! After the handshake the connection carries opcode-prefixed commands and
//! status-prefixed responses built from the primitives in [`codec`].

pub mod byte_order;
pub mod codec;
pub mod protocol;
pub mod record;

pub use byte_order::ByteOrder;
pub use codec::{SendMode, Wire, WirePrimitive, DEFAULT_MAX_VECTOR_LEN};
pub use protocol::{Opcode, ResponseStatus, DEFAULT_PORT, MAGIC};
pub use record::WireRecord;
pub(crate) use record::wire_record;

use thiserror::Error;

/// Errors raised while framing or parsing wire data
#[derive(Debug, Error)]
pub enum WireError {
    /// The socket closed or failed mid-operation; the session is dead
    #[error("connection lost: {0}")]
    ConnectionLost(#[from] std::io::Error),

    #[error("bad handshake magic {0:?}")]
    BadMagic([u8; 4]),

    #[error("unknown byte order tag {0}")]
    UnknownByteOrder(u8),

    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),

    #[error("unknown response status {0}")]
    UnknownStatus(u8),

    #[error("vector of {len} elements exceeds the limit of {max}")]
    VectorTooLong { len: u64, max: u32 },

    #[error("empty strings cannot be framed")]
    EmptyString,

    #[error("string of {0} bytes does not fit a u16 length")]
    StringTooLong(usize),

    #[error("malformed string: {0}")]
    MalformedString(String),

    #[error("malformed record: {0}")]
    MalformedRecord(String),
}
