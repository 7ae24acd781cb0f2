use std::ops::RangeInclusive;

use super::{CodecError, CodecId, CompressionCodec};

/// Largest buffer handled in one call; zlib stream lengths are 32-bit
pub const ZLIB_MAX_INPUT_SIZE: usize = u32::MAX as usize;

/// Deflate with the zlib wrapper.
///
/// The compressor and decompressor state is owned by the call and dropped on
/// every return path.
#[derive(Clone, Copy, Debug, Default)]
pub struct Zlib;

impl Zlib {
    fn check_len(len: usize) -> Result<(), CodecError> {
        if len > ZLIB_MAX_INPUT_SIZE {
            return Err(CodecError::InputTooLarge {
                codec: CodecId::Zlib,
                len,
                max: ZLIB_MAX_INPUT_SIZE,
            });
        }
        Ok(())
    }
}

impl CompressionCodec for Zlib {
    fn id(&self) -> CodecId {
        CodecId::Zlib
    }

    fn levels(&self) -> RangeInclusive<u32> {
        0..=9
    }

    fn encode(&self, src: &[u8], level: u32) -> Result<Vec<u8>, CodecError> {
        Self::check_len(src.len())?;
        Ok(miniz_oxide::deflate::compress_to_vec_zlib(src, level as u8))
    }

    fn decode(&self, src: &[u8], uncompressed_size: usize) -> Result<Vec<u8>, CodecError> {
        Self::check_len(uncompressed_size)?;
        miniz_oxide::inflate::decompress_to_vec_zlib_with_limit(src, uncompressed_size).map_err(|e| {
            CodecError::CorruptData {
                codec: CodecId::Zlib,
                reason: format!("inflate failed: {:?}", e.status),
            }
        })
    }
}
