//! Streaming sessions
//!
//! [`ClientSession`] and [`ServerSession`] are the two ends of one TCP
//! connection. After the `IV3D` handshake the client issues opcode-prefixed
//! commands and the server answers each with a status byte, followed by the
//! payload on success or a message string on failure. `Shutdown` is the only
//! command without a response.

pub mod config;
pub mod rotation;
pub mod client;
pub mod server;

pub use config::ClientConfig;
pub use rotation::{Batch, BatchInfo, BrickSelector, FrontToBackSelector, RotateInfo, RotationCursor};
pub use client::ClientSession;
pub use server::{ServerSession, SessionOptions, DEFAULT_BATCH_SIZE};

/// Client-side connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Idle; any command may be sent
    Connected,
    /// A command is in flight. Seen after a call fails mid-response, at
    /// which point the connection is unusable.
    AwaitingResponse,
    /// A rotation stream is active; only `next_batch` and `cancel_batches`
    /// are accepted
    Streaming { remaining: usize },
}

/// How a server session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The client closed the connection
    Disconnected,
    /// The client asked the server to stop
    Shutdown,
}
