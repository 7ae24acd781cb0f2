use std::ops::RangeInclusive;

use super::{CodecError, CodecId, CompressionCodec};

/// Largest input the LZ4 block format can represent (`LZ4_MAX_INPUT_SIZE`)
pub const LZ4_MAX_INPUT_SIZE: usize = 0x7E00_0000;

/// The [LZ4 compression algorithm](https://en.wikipedia.org/wiki/LZ4_(compression_algorithm)).
///
/// Level 1 uses the fast block encoder; levels 2 to 17 use the high
/// compression encoder at `level - 1`. Both emit the raw block format, so one
/// decoder handles either.
#[derive(Clone, Copy, Debug, Default)]
pub struct Lz4;

impl Lz4 {
    fn check_len(len: usize) -> Result<(), CodecError> {
        if len > LZ4_MAX_INPUT_SIZE {
            return Err(CodecError::InputTooLarge {
                codec: CodecId::Lz4,
                len,
                max: LZ4_MAX_INPUT_SIZE,
            });
        }
        Ok(())
    }
}

impl CompressionCodec for Lz4 {
    fn id(&self) -> CodecId {
        CodecId::Lz4
    }

    fn levels(&self) -> RangeInclusive<u32> {
        1..=17
    }

    fn encode(&self, src: &[u8], level: u32) -> Result<Vec<u8>, CodecError> {
        Self::check_len(src.len())?;

        if level <= 1 {
            return Ok(lz4_flex::block::compress(src));
        }

        let mode = lz4::block::CompressionMode::HIGHCOMPRESSION((level - 1) as i32);
        lz4::block::compress(src, Some(mode), false).map_err(|e| CodecError::InitFailed {
            codec: CodecId::Lz4,
            reason: e.to_string(),
        })
    }

    fn decode(&self, src: &[u8], uncompressed_size: usize) -> Result<Vec<u8>, CodecError> {
        lz4_flex::block::decompress(src, uncompressed_size).map_err(|e| CodecError::CorruptData {
            codec: CodecId::Lz4,
            reason: format!("LZ4 decompression failed: {}", e),
        })
    }
}
