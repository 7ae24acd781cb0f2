//! Framing primitives over a blocking byte stream

use std::io::{self, Read, Write};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{ByteOrder, Opcode, ResponseStatus, WireError, WireRecord, MAGIC};

/// Default cap on counted-vector lengths accepted from a peer
pub const DEFAULT_MAX_VECTOR_LEN: u32 = 1 << 28;

/// Consecutive `WouldBlock` results tolerated by [`SendMode::Retrying`]
const MAX_SEND_STALLS: u32 = 1000;

/// How outgoing frames are pushed to the socket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendMode {
    /// Assemble the whole frame and hand it to the socket in one `write_all`
    #[default]
    Single,
    /// Loop over `write`, retrying interrupted and would-block writes
    Retrying,
}

/// Fixed-width value that can be framed on the wire
pub trait WirePrimitive: Copy {
    const SIZE: usize;

    /// Append the value, byte-swapped when `swap` is set
    fn put(self, swap: bool, out: &mut Vec<u8>);

    /// Read a native-order value from the first `SIZE` bytes
    fn get(bytes: &[u8]) -> Self;
}

macro_rules! wire_int {
    ($($t:ty),*) => {$(
        impl WirePrimitive for $t {
            const SIZE: usize = std::mem::size_of::<$t>();

            fn put(self, swap: bool, out: &mut Vec<u8>) {
                let v = if swap { self.swap_bytes() } else { self };
                out.extend_from_slice(&v.to_ne_bytes());
            }

            fn get(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$t>()];
                raw.copy_from_slice(&bytes[..Self::SIZE]);
                <$t>::from_ne_bytes(raw)
            }
        }
    )*};
}

macro_rules! wire_float {
    ($($t:ty => $bits:ty),*) => {$(
        impl WirePrimitive for $t {
            const SIZE: usize = std::mem::size_of::<$t>();

            fn put(self, swap: bool, out: &mut Vec<u8>) {
                self.to_bits().put(swap, out);
            }

            fn get(bytes: &[u8]) -> Self {
                <$t>::from_bits(<$bits>::get(bytes))
            }
        }
    )*};
}

wire_int!(u8, u16, u32, u64, i32, i64);
wire_float!(f32 => u32, f64 => u64);

/// One end of a framed connection
///
/// Writes are buffered into the pending frame and pushed by [`Wire::flush`];
/// every read flushes first so a request is always on the wire before its
/// response is awaited.
pub struct Wire<S> {
    stream: S,
    needs_byte_swap: bool,
    send_mode: SendMode,
    max_vector_len: u32,
    out: Vec<u8>,
}

impl<S: Read + Write> Wire<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            needs_byte_swap: false,
            send_mode: SendMode::default(),
            max_vector_len: DEFAULT_MAX_VECTOR_LEN,
            out: Vec::with_capacity(4096),
        }
    }

    pub fn with_send_mode(mut self, send_mode: SendMode) -> Self {
        self.send_mode = send_mode;
        self
    }

    pub fn with_max_vector_len(mut self, max_vector_len: u32) -> Self {
        self.max_vector_len = max_vector_len;
        self
    }

    /// Result of the byte order negotiation (false before negotiating)
    pub fn needs_byte_swap(&self) -> bool {
        self.needs_byte_swap
    }

    #[cfg(test)]
    pub(crate) fn set_needs_byte_swap(&mut self, swap: bool) {
        self.needs_byte_swap = swap;
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    // --- Handshake ---

    /// Client side: send the magic, then negotiate byte order
    pub fn client_handshake(&mut self) -> Result<bool, WireError> {
        self.out.extend_from_slice(&MAGIC);
        self.negotiate_byte_order()
    }

    /// Server side: check the client's magic, then negotiate byte order
    pub fn server_handshake(&mut self) -> Result<bool, WireError> {
        let mut magic = [0u8; 4];
        self.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(WireError::BadMagic(magic));
        }
        self.negotiate_byte_order()
    }

    /// Exchange byte order tags with the peer and record whether to swap
    ///
    /// Both peers send before reading, so neither side can deadlock.
    pub fn negotiate_byte_order(&mut self) -> Result<bool, WireError> {
        let mine = ByteOrder::native();
        self.out.push(mine as u8);
        self.flush()?;

        let peer = ByteOrder::try_from(self.read::<u8>()?)?;
        self.needs_byte_swap = mine.needs_swap(peer);
        log::debug!(
            "byte order negotiated: local {:?}, peer {:?}, swap {}",
            mine,
            peer,
            self.needs_byte_swap
        );
        Ok(self.needs_byte_swap)
    }

    // --- Writing ---

    pub fn write<T: WirePrimitive>(&mut self, value: T) {
        value.put(self.needs_byte_swap, &mut self.out);
    }

    pub fn write_opcode(&mut self, opcode: Opcode) {
        self.write(opcode as u8);
    }

    pub fn write_status(&mut self, status: ResponseStatus) {
        self.write(status as u8);
    }

    fn write_count(&mut self, len: usize) -> Result<(), WireError> {
        let count = u32::try_from(len).map_err(|_| WireError::VectorTooLong {
            len: len as u64,
            max: u32::MAX,
        })?;
        self.write(count);
        Ok(())
    }

    /// Counted vector: `u32` element count, then the elements
    pub fn write_slice<T: WirePrimitive>(&mut self, values: &[T]) -> Result<(), WireError> {
        self.write_count(values.len())?;
        self.out.reserve(values.len() * T::SIZE);
        for &v in values {
            v.put(self.needs_byte_swap, &mut self.out);
        }
        Ok(())
    }

    /// Counted byte vector, copied without per-element work
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), WireError> {
        self.write_count(bytes.len())?;
        self.out.extend_from_slice(bytes);
        Ok(())
    }

    /// `u16` length including the trailing NUL, then the bytes and the NUL
    pub fn write_str(&mut self, s: &str) -> Result<(), WireError> {
        if s.is_empty() {
            return Err(WireError::EmptyString);
        }
        let len = u16::try_from(s.len() + 1).map_err(|_| WireError::StringTooLong(s.len()))?;
        self.write(len);
        self.out.extend_from_slice(s.as_bytes());
        self.out.push(0);
        Ok(())
    }

    /// Counted list of strings
    pub fn write_strings<T: AsRef<str>>(&mut self, strings: &[T]) -> Result<(), WireError> {
        self.write_count(strings.len())?;
        for s in strings {
            self.write_str(s.as_ref())?;
        }
        Ok(())
    }

    /// Derive-serialized record inside a counted byte vector
    pub fn write_record<T: WireRecord>(&mut self, record: &T) -> Result<(), WireError> {
        let bytes = record.to_record_bytes()?;
        self.write_bytes(&bytes)
    }

    /// Push the pending frame to the peer
    pub fn flush(&mut self) -> Result<(), WireError> {
        if self.out.is_empty() {
            return Ok(());
        }

        let mut frame = std::mem::take(&mut self.out);
        let sent = match self.send_mode {
            SendMode::Single => self.stream.write_all(&frame),
            SendMode::Retrying => write_retrying(&mut self.stream, &frame),
        }
        .and_then(|_| self.stream.flush());

        frame.clear();
        self.out = frame;
        sent.map_err(WireError::from)
    }

    // --- Reading ---

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), WireError> {
        self.flush()?;
        self.stream.read_exact(buf)?;
        Ok(())
    }

    pub fn read<T: WirePrimitive>(&mut self) -> Result<T, WireError> {
        let mut raw = [0u8; 8];
        self.read_exact(&mut raw[..T::SIZE])?;
        Ok(T::get(&raw))
    }

    pub fn read_opcode(&mut self) -> Result<Opcode, WireError> {
        Opcode::try_from(self.read::<u8>()?)
    }

    pub fn read_status(&mut self) -> Result<ResponseStatus, WireError> {
        ResponseStatus::try_from(self.read::<u8>()?)
    }

    fn read_count(&mut self) -> Result<usize, WireError> {
        let count = self.read::<u32>()?;
        if count > self.max_vector_len {
            return Err(WireError::VectorTooLong {
                len: count as u64,
                max: self.max_vector_len,
            });
        }
        Ok(count as usize)
    }

    pub fn read_vec<T: WirePrimitive>(&mut self) -> Result<Vec<T>, WireError> {
        let count = self.read_count()?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut raw = vec![0u8; count * T::SIZE];
        self.read_exact(&mut raw)?;
        Ok(raw.chunks_exact(T::SIZE).map(T::get).collect())
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>, WireError> {
        let count = self.read_count()?;
        let mut bytes = vec![0u8; count];
        if count > 0 {
            self.read_exact(&mut bytes)?;
        }
        Ok(bytes)
    }

    pub fn read_string(&mut self) -> Result<String, WireError> {
        let len = self.read::<u16>()? as usize;
        if len == 0 {
            return Err(WireError::MalformedString("zero length".into()));
        }
        let mut bytes = vec![0u8; len];
        self.read_exact(&mut bytes)?;
        if bytes.pop() != Some(0) {
            return Err(WireError::MalformedString("missing trailing NUL".into()));
        }
        String::from_utf8(bytes).map_err(|e| WireError::MalformedString(e.to_string()))
    }

    pub fn read_strings(&mut self) -> Result<Vec<String>, WireError> {
        let count = self.read_count()?;
        (0..count).map(|_| self.read_string()).collect()
    }

    pub fn read_record<T: WireRecord>(&mut self) -> Result<T, WireError> {
        let bytes = self.read_bytes()?;
        T::from_record_bytes(&bytes)
    }
}

fn write_retrying<W: Write>(writer: &mut W, mut buf: &[u8]) -> io::Result<()> {
    let mut stalls = 0;
    while !buf.is_empty() {
        match writer.write(buf) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "peer stopped accepting data",
                ))
            }
            Ok(n) => {
                buf = &buf[n..];
                stalls = 0;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                stalls += 1;
                if stalls > MAX_SEND_STALLS {
                    return Err(e);
                }
                std::thread::sleep(Duration::from_millis(1));
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
