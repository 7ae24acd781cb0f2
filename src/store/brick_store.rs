//! One open dataset: brick table, payload reads and the min/max cache

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use glam::UVec3;
use rayon::prelude::*;

use super::dataset_file::{read_header, BrickRecord};
use super::minmax::{compute_minmax, decode_scalars};
use super::{
    BrickKey, BrickMetadata, DatasetError, DatasetMetadata, MinMaxEntry, MinMaxRecord, MinMaxTable, NetDataType,
    StoreError,
};
use crate::compression::{decompress_brick, CompressedBrick};
use crate::layout::{Layout, SpatialLayout};

/// Read-mostly view of one dataset container
///
/// Payloads stay on disk and are read per request. The min/max cache is the
/// only mutable state and tolerates concurrent lookups of the same brick.
pub struct BrickStore {
    path: PathBuf,
    metadata: DatasetMetadata,
    layouts: Vec<Layout>,
    records: Vec<BrickRecord>,
    /// brick key -> position in `records`
    index: HashMap<BrickKey, usize>,
    file: Mutex<File>,
    minmax: RwLock<HashMap<BrickKey, MinMaxRecord>>,
}

impl std::fmt::Debug for BrickStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrickStore")
            .field("path", &self.path)
            .field("lods", &self.metadata.lod_count())
            .field("bricks", &self.records.len())
            .finish()
    }
}

impl BrickStore {
    /// Open a dataset container and validate its brick table
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(DatasetError::Missing(path));
        }

        let mut file = File::open(&path).map_err(|source| DatasetError::Io {
            path: path.clone(),
            source,
        })?;
        let (header, header_offset) = read_header(&mut file, &path)?;

        if header.type_info.net_type() == NetDataType::Unsupported {
            return Err(DatasetError::UnsupportedType {
                path,
                type_info: header.type_info,
            });
        }

        let corrupt = |reason: String| DatasetError::Corrupt {
            path: path.clone(),
            reason,
        };

        let metadata = header.metadata();
        let layouts = metadata.layouts().map_err(|e| corrupt(e.to_string()))?;

        let mut index = HashMap::with_capacity(header.bricks.len());
        for (slot, record) in header.bricks.iter().enumerate() {
            let key = record.metadata.key;
            let grid = metadata
                .lod(key.lod)
                .ok_or_else(|| corrupt(format!("brick {:?} refers to a missing LOD", key)))?;
            layouts[key.lod as usize]
                .to_position(grid.dims(), key.index)
                .map_err(|e| corrupt(format!("brick {:?}: {}", key, e)))?;
            record
                .metadata
                .validate()
                .map_err(|e| corrupt(e.to_string()))?;

            let expected = record
                .metadata
                .byte_size(header.type_info.bytes_per_element())
                .ok_or_else(|| corrupt(format!("brick {:?} voxel count overflows", key)))?;
            if record.uncompressed_size != expected {
                return Err(corrupt(format!(
                    "brick {:?} expands to {} bytes, expected {}",
                    key, record.uncompressed_size, expected
                )));
            }
            if record.offset.checked_add(record.length).is_none_or(|end| end > header_offset) {
                return Err(corrupt(format!("brick {:?} payload lies outside the file", key)));
            }
            if index.insert(key, slot).is_some() {
                return Err(corrupt(format!("brick {:?} appears twice", key)));
            }
        }

        log::info!(
            "opened dataset {} ({} LODs, {} bricks, {:?})",
            path.display(),
            metadata.lod_count(),
            header.bricks.len(),
            header.type_info.net_type()
        );

        Ok(Self {
            path,
            metadata,
            layouts,
            records: header.bricks,
            index,
            file: Mutex::new(file),
            minmax: RwLock::new(HashMap::new()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> &DatasetMetadata {
        &self.metadata
    }

    pub fn layout(&self, lod: u32) -> Option<&Layout> {
        self.layouts.get(lod as usize)
    }

    pub fn brick_count(&self) -> usize {
        self.records.len()
    }

    /// Translate a grid position into the key the layout of `lod` assigns it
    pub fn key_at(&self, lod: u32, pos: UVec3) -> Result<BrickKey, StoreError> {
        let (grid, layout) = self
            .metadata
            .lod(lod)
            .zip(self.layout(lod))
            .ok_or(StoreError::UnknownLod(lod))?;
        let index = layout.to_index(grid.dims(), pos)?;
        Ok(BrickKey::new(lod, index))
    }

    /// Table entry metadata of a stored brick
    pub fn brick_metadata(&self, key: BrickKey) -> Result<BrickMetadata, StoreError> {
        self.index
            .get(&key)
            .map(|&slot| self.records[slot].metadata)
            .ok_or(StoreError::NotFound(key))
    }

    /// Fetch the compressed payload of a brick
    pub fn get_brick(&self, key: BrickKey) -> Result<CompressedBrick, StoreError> {
        let record = self
            .index
            .get(&key)
            .map(|&slot| &self.records[slot])
            .ok_or(StoreError::NotFound(key))?;

        let mut data = vec![0u8; record.length as usize];
        {
            let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
            file.seek(SeekFrom::Start(record.offset))
                .and_then(|_| file.read_exact(&mut data))
                .map_err(|source| DatasetError::Io {
                    path: self.path.clone(),
                    source,
                })?;
        }

        Ok(CompressedBrick {
            data,
            uncompressed_size: record.uncompressed_size as usize,
            codec: record.codec,
        })
    }

    /// Cached min/max of a brick, computed on first request
    pub fn get_or_compute_minmax(&self, key: BrickKey) -> Result<MinMaxRecord, StoreError> {
        if let Some(record) = self.cached_minmax(key) {
            return Ok(record);
        }

        let meta = self.brick_metadata(key)?;
        let raw = decompress_brick(&self.get_brick(key)?)?;
        let computed = decode_scalars(&raw, self.metadata.type_info.net_type())
            .and_then(|values| compute_minmax(&values, meta.voxel_count()))
            .ok_or_else(|| DatasetError::Corrupt {
                path: self.path.clone(),
                reason: format!("brick {:?} does not match its voxel count", key),
            })?;

        // Another session may have won the race; everyone returns the first insert
        let mut cache = self.minmax.write().unwrap_or_else(|e| e.into_inner());
        Ok(*cache.entry(key).or_insert(computed))
    }

    pub fn cached_minmax(&self, key: BrickKey) -> Option<MinMaxRecord> {
        self.minmax
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .copied()
    }

    pub fn cached_minmax_count(&self) -> usize {
        self.minmax.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Min/max of every brick, in brick table order
    pub fn compute_all_minmax(&self) -> Result<MinMaxTable, StoreError> {
        let entries = self
            .metadata
            .bricks
            .par_iter()
            .map(|b| {
                self.get_or_compute_minmax(b.key)
                    .map(|record| MinMaxEntry { key: b.key, record })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MinMaxTable { entries })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::compression::CodecId;
    use crate::layout::LayoutKind;
    use crate::store::{DatasetWriter, TypeInfo};
    use glam::Vec3;

    /// One LOD, 2x2x2 scanline grid of 4x4x4 u8 bricks; brick `i` holds
    /// the value `i * 10` except brick 5, which is all zeros
    pub(crate) fn write_test_dataset(path: &Path) {
        let mut writer = DatasetWriter::create(path, TypeInfo::U8)
            .unwrap()
            .with_codec(CodecId::Lz4, 1);
        let lod = writer.add_lod(UVec3::splat(2), LayoutKind::Scanline).unwrap();
        for z in 0..2 {
            for y in 0..2 {
                for x in 0..2 {
                    let pos = UVec3::new(x, y, z);
                    let index = x + y * 2 + z * 4;
                    let fill = if index == 5 { 0 } else { (index * 10) as u8 };
                    writer
                        .add_brick(
                            lod,
                            pos,
                            pos.as_vec3() + Vec3::splat(0.5),
                            Vec3::ONE,
                            UVec3::splat(4),
                            &[fill; 64],
                        )
                        .unwrap();
                }
            }
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_open_and_fetch_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cube.bsds");
        write_test_dataset(&path);

        let store = BrickStore::open(&path).unwrap();
        assert_eq!(store.metadata().lod_count(), 1);
        assert_eq!(store.brick_count(), 8);

        let key = store.key_at(0, UVec3::new(1, 0, 1)).unwrap();
        assert_eq!(key, BrickKey::new(0, 5));

        let brick = store.get_brick(key).unwrap();
        assert_eq!(brick.codec, CodecId::Lz4);
        assert_eq!(brick.uncompressed_size, 64);
        assert_eq!(decompress_brick(&brick).unwrap(), vec![0u8; 64]);
    }

    #[test]
    fn test_crafted_header_is_corrupt_not_a_panic() {
        use crate::store::dataset_file::tests::write_raw_container;
        use crate::store::dataset_file::DatasetHeader;
        use crate::store::LodGrid;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crafted.bsds");
        let key = BrickKey::new(0, 0);
        let record = BrickRecord {
            metadata: BrickMetadata::new(key, Vec3::ZERO, Vec3::ONE, UVec3::splat(u32::MAX)),
            codec: CodecId::None,
            uncompressed_size: 0,
            offset: 8,
            length: 0,
        };
        let header = DatasetHeader {
            type_info: TypeInfo::U16,
            lods: vec![LodGrid::new(UVec3::ONE, LayoutKind::Scanline)],
            bricks: vec![record],
        };
        write_raw_container(&path, &header);
        assert!(matches!(BrickStore::open(&path), Err(DatasetError::Corrupt { .. })));

        // a random LOD too large to tabulate
        let header = DatasetHeader {
            type_info: TypeInfo::U8,
            lods: vec![LodGrid::new(UVec3::splat(u32::MAX), LayoutKind::Random { seed: 1 })],
            bricks: Vec::new(),
        };
        write_raw_container(&path, &header);
        assert!(matches!(BrickStore::open(&path), Err(DatasetError::Corrupt { .. })));
    }

    #[test]
    fn test_unknown_brick_and_lod() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cube.bsds");
        write_test_dataset(&path);
        let store = BrickStore::open(&path).unwrap();

        assert!(matches!(
            store.get_brick(BrickKey::new(0, 8)),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(store.key_at(4, UVec3::ZERO), Err(StoreError::UnknownLod(4))));
        assert!(matches!(
            store.key_at(0, UVec3::new(2, 0, 0)),
            Err(StoreError::Layout(_))
        ));
    }

    #[test]
    fn test_minmax_is_cached_and_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cube.bsds");
        write_test_dataset(&path);
        let store = BrickStore::open(&path).unwrap();

        let first = store.compute_all_minmax().unwrap();
        assert_eq!(store.cached_minmax_count(), 8);
        let second = store.compute_all_minmax().unwrap();
        assert_eq!(first, second);

        let record = first.get(BrickKey::new(0, 3)).unwrap();
        assert_eq!(record.scalar_min, 30.0);
        assert_eq!(record.scalar_max, 30.0);
        assert_eq!(record.gradient_max, 0.0);
        for (entry, meta) in first.entries.iter().zip(&store.metadata().bricks) {
            assert_eq!(entry.key, meta.key);
        }
    }

    #[test]
    fn test_missing_dataset() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            BrickStore::open(dir.path().join("nope.bsds")),
            Err(DatasetError::Missing(_))
        ));
    }

    #[test]
    fn test_unsupported_type_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signed.bsds");
        let mut writer = DatasetWriter::create(&path, TypeInfo::new(16, true, false)).unwrap();
        writer.add_lod(UVec3::ONE, LayoutKind::Scanline).unwrap();
        writer
            .add_brick(0, UVec3::ZERO, Vec3::ZERO, Vec3::ONE, UVec3::ONE, &[0, 0])
            .unwrap();
        writer.finish().unwrap();

        assert!(matches!(
            BrickStore::open(&path),
            Err(DatasetError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_concurrent_minmax_requests_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cube.bsds");
        write_test_dataset(&path);
        let store = std::sync::Arc::new(BrickStore::open(&path).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.get_or_compute_minmax(BrickKey::new(0, 6)).unwrap())
            })
            .collect();
        let results: Vec<MinMaxRecord> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(store.cached_minmax_count(), 1);
    }
}
