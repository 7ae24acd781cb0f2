use std::io::{Read, Write};
use std::ops::RangeInclusive;

use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use bzip2::Compression;

use super::{CodecError, CodecId, CompressionCodec};

/// The [bzip2](https://sourceware.org/bzip2/) block-sorting compressor.
#[derive(Clone, Copy, Debug, Default)]
pub struct Bzip2;

impl Bzip2 {
    /// Documented worst-case output size: 1% larger plus 600 bytes
    pub fn max_compressed_len(len: usize) -> usize {
        len + len / 100 + 600
    }
}

impl CompressionCodec for Bzip2 {
    fn id(&self) -> CodecId {
        CodecId::Bzip2
    }

    fn levels(&self) -> RangeInclusive<u32> {
        1..=9
    }

    fn encode(&self, src: &[u8], level: u32) -> Result<Vec<u8>, CodecError> {
        let failed = |e: std::io::Error| CodecError::InitFailed {
            codec: CodecId::Bzip2,
            reason: e.to_string(),
        };

        let out = Vec::with_capacity(Self::max_compressed_len(src.len()));
        let mut encoder = BzEncoder::new(out, Compression::new(level));
        encoder.write_all(src).map_err(failed)?;
        encoder.finish().map_err(failed)
    }

    fn decode(&self, src: &[u8], uncompressed_size: usize) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(uncompressed_size);
        // One extra byte lets an oversized stream show up as a size mismatch
        BzDecoder::new(src)
            .take(uncompressed_size as u64 + 1)
            .read_to_end(&mut out)
            .map_err(|e| CodecError::CorruptData {
                codec: CodecId::Bzip2,
                reason: e.to_string(),
            })?;
        Ok(out)
    }
}
