use std::ops::RangeInclusive;

use super::{CodecError, CodecId, CompressionCodec};

/// The [Zstandard](https://facebook.github.io/zstd/) algorithm, used for the
/// slow, high-ratio slot in the codec table.
///
/// Levels are restricted to 0 through 10; 0 selects zstd's default level.
#[derive(Clone, Copy, Debug, Default)]
pub struct Zstd;

impl CompressionCodec for Zstd {
    fn id(&self) -> CodecId {
        CodecId::Zstd
    }

    fn levels(&self) -> RangeInclusive<u32> {
        0..=10
    }

    fn encode(&self, src: &[u8], level: u32) -> Result<Vec<u8>, CodecError> {
        zstd::bulk::compress(src, level as i32).map_err(|e| CodecError::InitFailed {
            codec: CodecId::Zstd,
            reason: e.to_string(),
        })
    }

    fn decode(&self, src: &[u8], uncompressed_size: usize) -> Result<Vec<u8>, CodecError> {
        let out = zstd::bulk::decompress(src, uncompressed_size).map_err(|e| {
            CodecError::CorruptData {
                codec: CodecId::Zstd,
                reason: e.to_string(),
            }
        })?;
        if out.len() != uncompressed_size {
            return Err(CodecError::CorruptData {
                codec: CodecId::Zstd,
                reason: format!("decoded {} of {} bytes", out.len(), uncompressed_size),
            });
        }
        Ok(out)
    }
}
