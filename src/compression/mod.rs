//! Brick compression codecs
//!
//! Codecs operate on opaque byte buffers. The uncompressed size is never
//! recovered from the compressed bytes: callers carry it next to the payload
//! (see [`CompressedBrick`]) and hand it back on decompression.

mod lz4_compression;
mod zstd_compression;
mod bzip2_compression;
mod zlib_compression;

pub use lz4_compression::{Lz4, LZ4_MAX_INPUT_SIZE};
pub use zstd_compression::Zstd;
pub use bzip2_compression::Bzip2;
pub use zlib_compression::Zlib;

use std::fmt;
use std::ops::RangeInclusive;

use rkyv::{Archive, Deserialize, Serialize};
use thiserror::Error;

/// Wire identity of a codec; the declaration order fixes the id byte
#[derive(Archive, Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    None,
    Lz4,
    Zstd,
    Bzip2,
    Zlib,
}

impl CodecId {
    pub const ALL: [CodecId; 5] = [
        CodecId::None,
        CodecId::Lz4,
        CodecId::Zstd,
        CodecId::Bzip2,
        CodecId::Zlib,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CodecId::None => "none",
            CodecId::Lz4 => "lz4",
            CodecId::Zstd => "zstd",
            CodecId::Bzip2 => "bzip2",
            CodecId::Zlib => "zlib",
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for CodecId {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        CodecId::ALL
            .into_iter()
            .find(|id| *id as u8 == value)
            .ok_or(CodecError::UnknownCodec(value))
    }
}

/// Errors raised by codecs
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("{len}-byte input exceeds the {codec} limit of {max} bytes")]
    InputTooLarge { codec: CodecId, len: usize, max: usize },

    #[error("corrupt {codec} data: {reason}")]
    CorruptData { codec: CodecId, reason: String },

    #[error("{codec} codec failed: {reason}")]
    InitFailed { codec: CodecId, reason: String },

    #[error("unknown codec id {0}")]
    UnknownCodec(u8),
}

/// A byte-buffer compression algorithm
///
/// Implementors provide `encode`/`decode`; callers use `compress`/`decompress`,
/// which clamp the level, short-circuit empty buffers and verify the decoded
/// size.
pub trait CompressionCodec: Send + Sync {
    fn id(&self) -> CodecId;

    /// Levels accepted by `encode`; requested levels are clamped into this range
    fn levels(&self) -> RangeInclusive<u32>;

    fn encode(&self, src: &[u8], level: u32) -> Result<Vec<u8>, CodecError>;

    /// Decode `src`, which is known to expand to `uncompressed_size` bytes
    fn decode(&self, src: &[u8], uncompressed_size: usize) -> Result<Vec<u8>, CodecError>;

    fn compress(&self, src: &[u8], level: u32) -> Result<Vec<u8>, CodecError> {
        if src.is_empty() {
            return Ok(Vec::new());
        }
        let levels = self.levels();
        self.encode(src, level.clamp(*levels.start(), *levels.end()))
    }

    fn decompress(&self, src: &[u8], uncompressed_size: usize) -> Result<Vec<u8>, CodecError> {
        if src.is_empty() && uncompressed_size == 0 {
            return Ok(Vec::new());
        }
        let out = self.decode(src, uncompressed_size)?;
        if out.len() != uncompressed_size {
            return Err(CodecError::CorruptData {
                codec: self.id(),
                reason: format!("expected {} bytes, decoded {}", uncompressed_size, out.len()),
            });
        }
        Ok(out)
    }
}

/// Identity codec, used whenever real compression fails or does not pay off
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl CompressionCodec for Passthrough {
    fn id(&self) -> CodecId {
        CodecId::None
    }

    fn levels(&self) -> RangeInclusive<u32> {
        0..=0
    }

    fn encode(&self, src: &[u8], _level: u32) -> Result<Vec<u8>, CodecError> {
        Ok(src.to_vec())
    }

    fn decode(&self, src: &[u8], _uncompressed_size: usize) -> Result<Vec<u8>, CodecError> {
        Ok(src.to_vec())
    }
}

/// Look up the codec implementation for a wire id
pub fn codec_for(id: CodecId) -> &'static dyn CompressionCodec {
    match id {
        CodecId::None => &Passthrough,
        CodecId::Lz4 => &Lz4,
        CodecId::Zstd => &Zstd,
        CodecId::Bzip2 => &Bzip2,
        CodecId::Zlib => &Zlib,
    }
}

/// Compressed brick payload plus what is needed to decode it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedBrick {
    pub data: Vec<u8>,
    /// Byte length after decompression; not derivable from `data`
    pub uncompressed_size: usize,
    pub codec: CodecId,
}

impl CompressedBrick {
    /// Store `src` without compression
    pub fn passthrough(src: &[u8]) -> Self {
        Self {
            data: src.to_vec(),
            uncompressed_size: src.len(),
            codec: CodecId::None,
        }
    }

    pub fn compressed_size(&self) -> usize {
        self.data.len()
    }
}

/// Compress a raw brick, degrading to passthrough instead of failing
///
/// Passthrough is used when the codec errors, yields no bytes, or does not
/// shrink the payload.
pub fn compress_brick(codec: CodecId, src: &[u8], level: u32) -> CompressedBrick {
    if codec == CodecId::None {
        return CompressedBrick::passthrough(src);
    }

    match codec_for(codec).compress(src, level) {
        Ok(data) if !data.is_empty() && data.len() < src.len() => CompressedBrick {
            data,
            uncompressed_size: src.len(),
            codec,
        },
        Ok(data) => {
            log::debug!(
                "{} produced {} bytes for a {}-byte brick, storing uncompressed",
                codec,
                data.len(),
                src.len()
            );
            CompressedBrick::passthrough(src)
        }
        Err(e) => {
            log::warn!("{} compression failed, storing uncompressed: {}", codec, e);
            CompressedBrick::passthrough(src)
        }
    }
}

/// Decompress a brick; any codec failure is fatal for the brick
pub fn decompress_brick(brick: &CompressedBrick) -> Result<Vec<u8>, CodecError> {
    codec_for(brick.codec).decompress(&brick.data, brick.uncompressed_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<Vec<u8>> {
        let ramp: Vec<u8> = (0..4096u32).map(|i| (i / 16) as u8).collect();
        let noise: Vec<u8> = (0..1024u32)
            .map(|i| (i.wrapping_mul(2654435761) >> 13) as u8)
            .collect();
        vec![Vec::new(), vec![42], vec![0; 64], ramp, noise]
    }

    #[test]
    fn test_roundtrip_every_codec_every_level() {
        for id in CodecId::ALL {
            let codec = codec_for(id);
            for level in codec.levels() {
                for sample in samples() {
                    let compressed = codec.compress(&sample, level).unwrap();
                    let restored = codec.decompress(&compressed, sample.len()).unwrap();
                    assert_eq!(restored, sample, "{} level {} len {}", id, level, sample.len());
                }
            }
        }
    }

    #[test]
    fn test_levels_are_clamped() {
        let data = vec![7u8; 2048];
        for id in CodecId::ALL {
            let codec = codec_for(id);
            for level in [0, 1000] {
                let compressed = codec.compress(&data, level).unwrap();
                assert_eq!(codec.decompress(&compressed, data.len()).unwrap(), data);
            }
        }
    }

    #[test]
    fn test_wrong_uncompressed_size_is_corrupt() {
        let data = vec![3u8; 512];
        for id in CodecId::ALL {
            let codec = codec_for(id);
            let compressed = codec.compress(&data, 5).unwrap();
            assert!(
                codec.decompress(&compressed, data.len() - 1).is_err(),
                "{} accepted a short size",
                id
            );
        }
    }

    #[test]
    fn test_compress_brick_falls_back_when_not_shrinking() {
        let brick = compress_brick(CodecId::Lz4, &[1, 2, 3], 1);
        assert_eq!(brick.codec, CodecId::None);
        assert_eq!(brick.data, vec![1, 2, 3]);
        assert_eq!(brick.uncompressed_size, 3);

        let empty = compress_brick(CodecId::Zlib, &[], 6);
        assert_eq!(empty.codec, CodecId::None);
        assert_eq!(decompress_brick(&empty).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_compress_brick_keeps_codec_when_shrinking() {
        let zeros = vec![0u8; 64];
        let brick = compress_brick(CodecId::Lz4, &zeros, 1);
        assert_eq!(brick.codec, CodecId::Lz4);
        assert!(brick.compressed_size() < 64);
        assert_eq!(decompress_brick(&brick).unwrap(), zeros);
    }

    #[test]
    fn test_codec_id_from_u8() {
        for id in CodecId::ALL {
            assert_eq!(CodecId::try_from(id as u8).unwrap(), id);
        }
        assert!(matches!(CodecId::try_from(200), Err(CodecError::UnknownCodec(200))));
    }

    #[test]
    fn test_corrupt_payload_is_rejected() {
        let data: Vec<u8> = (0..2048u32).map(|i| (i % 7) as u8).collect();
        for id in [CodecId::Zstd, CodecId::Bzip2, CodecId::Zlib] {
            let codec = codec_for(id);
            let mut compressed = codec.compress(&data, 5).unwrap();
            compressed.truncate(compressed.len() / 2);
            assert!(codec.decompress(&compressed, data.len()).is_err(), "{} accepted truncated data", id);
        }
    }
}
