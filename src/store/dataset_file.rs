//! Dataset container file
//!
//! Layout:
//!
//! ```text
//! "BSDS" | version: u32 LE | payloads ... | header | header_offset: u64 LE | header_len: u64 LE | "BSDS"
//! ```
//!
//! Payloads are written as bricks are added, so building a dataset never
//! holds more than one brick in memory. The header (type info, LOD grids and
//! the brick table with payload offsets) is an rkyv archive written last.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use glam::{UVec3, Vec3};
use rkyv::{Archive, Deserialize, Serialize};

use super::{BrickKey, BrickMetadata, DatasetError, DatasetMetadata, LodGrid, TypeInfo};
use crate::compression::{compress_brick, CodecId};
use crate::layout::{Layout, LayoutKind, SpatialLayout};
use crate::wire::{wire_record, WireRecord};

/// File extension of dataset containers
pub const DATASET_EXTENSION: &str = "bsds";

const FILE_MAGIC: [u8; 4] = *b"BSDS";
const FILE_VERSION: u32 = 1;
const PREFIX_LEN: u64 = 8;
const TRAILER_LEN: u64 = 20;

/// Brick table entry: metadata plus where the payload lives
#[derive(Archive, Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct BrickRecord {
    pub metadata: BrickMetadata,
    pub codec: CodecId,
    pub uncompressed_size: u64,
    /// Absolute file offset of the compressed payload
    pub offset: u64,
    pub length: u64,
}

/// Container header, stored after the payloads
#[derive(Archive, Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct DatasetHeader {
    pub type_info: TypeInfo,
    pub lods: Vec<LodGrid>,
    pub bricks: Vec<BrickRecord>,
}

wire_record!(DatasetHeader);

impl DatasetHeader {
    pub fn metadata(&self) -> DatasetMetadata {
        DatasetMetadata {
            lods: self.lods.clone(),
            bricks: self.bricks.iter().map(|r| r.metadata).collect(),
            type_info: self.type_info,
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> DatasetError + '_ {
    move |source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn corrupt(path: &Path, reason: impl Into<String>) -> DatasetError {
    DatasetError::Corrupt {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Read and parse the header of an open container
///
/// Returns the header and the offset where it starts, which bounds every
/// payload.
pub fn read_header(file: &mut File, path: &Path) -> Result<(DatasetHeader, u64), DatasetError> {
    let file_len = file.metadata().map_err(io_error(path))?.len();
    if file_len < PREFIX_LEN + TRAILER_LEN {
        return Err(corrupt(path, format!("file is only {} bytes", file_len)));
    }

    let mut prefix = [0u8; PREFIX_LEN as usize];
    file.read_exact(&mut prefix).map_err(io_error(path))?;
    if prefix[..4] != FILE_MAGIC {
        return Err(corrupt(path, "missing BSDS magic"));
    }
    let version = u32::from_le_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]);
    if version != FILE_VERSION {
        return Err(corrupt(path, format!("unsupported container version {}", version)));
    }

    let mut trailer = [0u8; TRAILER_LEN as usize];
    file.seek(SeekFrom::End(-(TRAILER_LEN as i64))).map_err(io_error(path))?;
    file.read_exact(&mut trailer).map_err(io_error(path))?;
    if trailer[16..] != FILE_MAGIC {
        return Err(corrupt(path, "missing trailing BSDS magic"));
    }
    let header_offset = u64::from_le_bytes(trailer[..8].try_into().unwrap_or_default());
    let header_len = u64::from_le_bytes(trailer[8..16].try_into().unwrap_or_default());
    if header_offset < PREFIX_LEN
        || header_offset.checked_add(header_len) != Some(file_len - TRAILER_LEN)
    {
        return Err(corrupt(path, "header bounds do not match file size"));
    }

    let mut bytes = vec![0u8; header_len as usize];
    file.seek(SeekFrom::Start(header_offset)).map_err(io_error(path))?;
    file.read_exact(&mut bytes).map_err(io_error(path))?;
    let header = DatasetHeader::from_record_bytes(&bytes).map_err(|e| corrupt(path, e.to_string()))?;

    Ok((header, header_offset))
}

/// Streams bricks into a new dataset container
pub struct DatasetWriter {
    path: PathBuf,
    file: BufWriter<File>,
    offset: u64,
    type_info: TypeInfo,
    lods: Vec<LodGrid>,
    layouts: Vec<Layout>,
    records: Vec<BrickRecord>,
    keys: HashSet<BrickKey>,
    codec: CodecId,
    level: u32,
}

impl DatasetWriter {
    /// Create the container file; bricks default to LZ4 at level 1
    pub fn create(path: impl AsRef<Path>, type_info: TypeInfo) -> Result<Self, DatasetError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(io_error(&path))?;
        let mut file = BufWriter::new(file);

        file.write_all(&FILE_MAGIC).map_err(io_error(&path))?;
        file.write_all(&FILE_VERSION.to_le_bytes()).map_err(io_error(&path))?;

        Ok(Self {
            path,
            file,
            offset: PREFIX_LEN,
            type_info,
            lods: Vec::new(),
            layouts: Vec::new(),
            records: Vec::new(),
            keys: HashSet::new(),
            codec: CodecId::Lz4,
            level: 1,
        })
    }

    /// Codec and level used for bricks added from now on
    pub fn with_codec(mut self, codec: CodecId, level: u32) -> Self {
        self.codec = codec;
        self.level = level;
        self
    }

    /// Append a LOD level and return its number
    pub fn add_lod(&mut self, dims: UVec3, layout: LayoutKind) -> Result<u32, DatasetError> {
        let grid = LodGrid::new(dims, layout);
        let built = grid
            .build_layout()
            .map_err(|e| DatasetError::Invalid(e.to_string()))?;
        self.lods.push(grid);
        self.layouts.push(built);
        Ok(self.lods.len() as u32 - 1)
    }

    /// Compress `voxels` and append them as the brick at `pos` of `lod`
    pub fn add_brick(
        &mut self,
        lod: u32,
        pos: UVec3,
        center: Vec3,
        extents: Vec3,
        voxel_count: UVec3,
        voxels: &[u8],
    ) -> Result<BrickKey, DatasetError> {
        let (grid, layout) = self
            .lods
            .get(lod as usize)
            .zip(self.layouts.get(lod as usize))
            .ok_or_else(|| DatasetError::Invalid(format!("LOD {} has not been added", lod)))?;
        let index = layout
            .to_index(grid.dims(), pos)
            .map_err(|e| DatasetError::Invalid(e.to_string()))?;
        let key = BrickKey::new(lod, index);

        let metadata = BrickMetadata::new(key, center, extents, voxel_count);
        metadata.validate()?;
        let expected = metadata
            .byte_size(self.type_info.bytes_per_element())
            .ok_or_else(|| DatasetError::Invalid(format!("brick {:?} voxel count overflows", key)))?;
        if voxels.len() as u64 != expected {
            return Err(DatasetError::Invalid(format!(
                "brick {:?} has {} bytes, expected {}",
                key,
                voxels.len(),
                expected
            )));
        }
        if !self.keys.insert(key) {
            return Err(DatasetError::Invalid(format!("brick {:?} added twice", key)));
        }

        let brick = compress_brick(self.codec, voxels, self.level);
        self.file.write_all(&brick.data).map_err(io_error(&self.path))?;
        self.records.push(BrickRecord {
            metadata,
            codec: brick.codec,
            uncompressed_size: brick.uncompressed_size as u64,
            offset: self.offset,
            length: brick.data.len() as u64,
        });
        self.offset += brick.data.len() as u64;

        Ok(key)
    }

    pub fn brick_count(&self) -> usize {
        self.records.len()
    }

    /// Write the header and trailer and close the file
    pub fn finish(mut self) -> Result<PathBuf, DatasetError> {
        let header = DatasetHeader {
            type_info: self.type_info,
            lods: std::mem::take(&mut self.lods),
            bricks: std::mem::take(&mut self.records),
        };
        let bytes = header
            .to_record_bytes()
            .map_err(|e| DatasetError::Invalid(e.to_string()))?;

        let io = io_error(&self.path);
        let result = (|| -> io::Result<()> {
            self.file.write_all(&bytes)?;
            self.file.write_all(&self.offset.to_le_bytes())?;
            self.file.write_all(&(bytes.len() as u64).to_le_bytes())?;
            self.file.write_all(&FILE_MAGIC)?;
            self.file.flush()
        })();
        result.map_err(io)?;

        log::debug!(
            "wrote dataset {} ({} LODs, {} bricks)",
            self.path.display(),
            header.lods.len(),
            header.bricks.len()
        );
        Ok(self.path)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Write a container holding only `header`, with no payload section
    pub(crate) fn write_raw_container(path: &Path, header: &DatasetHeader) {
        let bytes = header.to_record_bytes().unwrap();
        let mut out = FILE_MAGIC.to_vec();
        out.extend_from_slice(&FILE_VERSION.to_le_bytes());
        out.extend_from_slice(&bytes);
        out.extend_from_slice(&PREFIX_LEN.to_le_bytes());
        out.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
        out.extend_from_slice(&FILE_MAGIC);
        std::fs::write(path, out).unwrap();
    }

    #[test]
    fn test_write_and_read_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.bsds");

        let mut writer = DatasetWriter::create(&path, TypeInfo::U8).unwrap();
        let lod = writer.add_lod(UVec3::new(2, 1, 1), LayoutKind::Morton).unwrap();
        writer
            .add_brick(lod, UVec3::new(1, 0, 0), Vec3::X, Vec3::ONE, UVec3::splat(2), &[9; 8])
            .unwrap();
        writer.finish().unwrap();

        let mut file = File::open(&path).unwrap();
        let (header, header_offset) = read_header(&mut file, &path).unwrap();
        assert_eq!(header.type_info, TypeInfo::U8);
        assert_eq!(header.bricks.len(), 1);
        assert_eq!(header.bricks[0].metadata.key, BrickKey::new(0, 1));
        assert!(header.bricks[0].offset + header.bricks[0].length <= header_offset);
    }

    #[test]
    fn test_rejects_wrong_payload_size() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = DatasetWriter::create(dir.path().join("bad.bsds"), TypeInfo::U16).unwrap();
        writer.add_lod(UVec3::ONE, LayoutKind::Scanline).unwrap();
        let err = writer
            .add_brick(0, UVec3::ZERO, Vec3::ZERO, Vec3::ONE, UVec3::splat(2), &[0; 8])
            .unwrap_err();
        assert!(matches!(err, DatasetError::Invalid(_)));
    }

    #[test]
    fn test_rejects_overflowing_voxel_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = DatasetWriter::create(dir.path().join("huge.bsds"), TypeInfo::F32).unwrap();
        writer.add_lod(UVec3::ONE, LayoutKind::Scanline).unwrap();
        let err = writer
            .add_brick(0, UVec3::ZERO, Vec3::ZERO, Vec3::ONE, UVec3::splat(u32::MAX), &[0; 4])
            .unwrap_err();
        assert!(matches!(err, DatasetError::Invalid(_)));
        assert_eq!(writer.brick_count(), 0);
    }

    #[test]
    fn test_rejects_duplicate_and_out_of_grid_bricks() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = DatasetWriter::create(dir.path().join("dup.bsds"), TypeInfo::U8).unwrap();
        writer.add_lod(UVec3::splat(2), LayoutKind::Hilbert).unwrap();
        writer
            .add_brick(0, UVec3::ZERO, Vec3::ZERO, Vec3::ONE, UVec3::ONE, &[1])
            .unwrap();
        assert!(writer
            .add_brick(0, UVec3::ZERO, Vec3::ZERO, Vec3::ONE, UVec3::ONE, &[1])
            .is_err());
        assert!(writer
            .add_brick(0, UVec3::new(2, 0, 0), Vec3::ZERO, Vec3::ONE, UVec3::ONE, &[1])
            .is_err());
        assert!(writer
            .add_brick(3, UVec3::ZERO, Vec3::ZERO, Vec3::ONE, UVec3::ONE, &[1])
            .is_err());
    }

    #[test]
    fn test_truncated_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.bsds");
        std::fs::write(&path, b"BSDS\x01\x00\x00\x00").unwrap();
        let mut file = File::open(&path).unwrap();
        assert!(matches!(read_header(&mut file, &path), Err(DatasetError::Corrupt { .. })));
    }
}
