//! Dataset, LOD and brick descriptions shared by server and client

use glam::{UVec3, Vec3};
use rkyv::{Archive, Deserialize, Serialize};

use super::DatasetError;
use crate::layout::{brick_count, Layout, LayoutError, LayoutKind};
use crate::wire::wire_record;

/// Address of one brick: LOD level plus the layout-specific linear index
#[derive(Archive, Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BrickKey {
    pub lod: u32,
    pub index: u64,
}

impl BrickKey {
    pub fn new(lod: u32, index: u64) -> Self {
        Self { lod, index }
    }
}

/// Scalar element type shared by every brick of a dataset
#[derive(Archive, Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeInfo {
    pub bitwidth: u8,
    pub is_signed: bool,
    pub is_float: bool,
}

impl TypeInfo {
    pub const U8: TypeInfo = TypeInfo::new(8, false, false);
    pub const U16: TypeInfo = TypeInfo::new(16, false, false);
    pub const U32: TypeInfo = TypeInfo::new(32, false, false);
    pub const F32: TypeInfo = TypeInfo::new(32, true, true);

    pub const fn new(bitwidth: u8, is_signed: bool, is_float: bool) -> Self {
        Self {
            bitwidth,
            is_signed,
            is_float,
        }
    }

    /// Wire type for this element type; lossy, many combinations are `Unsupported`
    pub fn net_type(&self) -> NetDataType {
        match (self.bitwidth, self.is_signed, self.is_float) {
            (8, false, false) => NetDataType::UInt8,
            (16, false, false) => NetDataType::UInt16,
            (32, false, false) => NetDataType::UInt32,
            (32, _, true) => NetDataType::Float32,
            _ => NetDataType::Unsupported,
        }
    }

    pub fn bytes_per_element(&self) -> usize {
        (self.bitwidth as usize).div_ceil(8)
    }
}

/// Element types that can cross the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NetDataType {
    UInt8 = 0,
    UInt16 = 1,
    UInt32 = 2,
    Float32 = 3,
    Unsupported = 4,
}

impl NetDataType {
    pub fn type_info(self) -> Option<TypeInfo> {
        match self {
            NetDataType::UInt8 => Some(TypeInfo::U8),
            NetDataType::UInt16 => Some(TypeInfo::U16),
            NetDataType::UInt32 => Some(TypeInfo::U32),
            NetDataType::Float32 => Some(TypeInfo::F32),
            NetDataType::Unsupported => None,
        }
    }
}

/// Brick grid of one LOD level
#[derive(Archive, Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct LodGrid {
    pub dims: [u32; 3],
    pub layout: LayoutKind,
    /// Product of `dims`
    pub brick_count: u64,
}

impl LodGrid {
    pub fn new(dims: UVec3, layout: LayoutKind) -> Self {
        Self {
            dims: dims.to_array(),
            layout,
            brick_count: brick_count(dims),
        }
    }

    pub fn dims(&self) -> UVec3 {
        UVec3::from_array(self.dims)
    }

    pub fn build_layout(&self) -> Result<Layout, LayoutError> {
        Layout::new(self.layout, self.dims())
    }
}

/// Placement and size of one brick
#[derive(Archive, Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct BrickMetadata {
    pub key: BrickKey,
    pub center: [f32; 3],
    pub extents: [f32; 3],
    pub voxel_count: [u32; 3],
}

impl BrickMetadata {
    pub fn new(key: BrickKey, center: Vec3, extents: Vec3, voxel_count: UVec3) -> Self {
        Self {
            key,
            center: center.to_array(),
            extents: extents.to_array(),
            voxel_count: voxel_count.to_array(),
        }
    }

    pub fn center(&self) -> Vec3 {
        Vec3::from_array(self.center)
    }

    pub fn extents(&self) -> Vec3 {
        Vec3::from_array(self.extents)
    }

    pub fn voxel_count(&self) -> UVec3 {
        UVec3::from_array(self.voxel_count)
    }

    /// Number of scalar elements in the brick, `None` if it overflows `u64`
    pub fn element_count(&self) -> Option<u64> {
        let [x, y, z] = self.voxel_count.map(u64::from);
        (x * y).checked_mul(z)
    }

    /// Uncompressed payload size for elements of `bytes_per_element` bytes
    pub fn byte_size(&self, bytes_per_element: usize) -> Option<u64> {
        self.element_count()?.checked_mul(bytes_per_element as u64)
    }

    /// Check voxel counts are at least one and extents are not negative
    pub fn validate(&self) -> Result<(), DatasetError> {
        if self.voxel_count.contains(&0) {
            return Err(DatasetError::Invalid(format!(
                "brick {:?} has voxel count {:?}",
                self.key, self.voxel_count
            )));
        }
        if self.extents.iter().any(|e| !(*e >= 0.0)) {
            return Err(DatasetError::Invalid(format!(
                "brick {:?} has extents {:?}",
                self.key, self.extents
            )));
        }
        Ok(())
    }
}

/// Everything a client learns about a dataset when opening it
#[derive(Archive, Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct DatasetMetadata {
    pub lods: Vec<LodGrid>,
    pub bricks: Vec<BrickMetadata>,
    pub type_info: TypeInfo,
}

impl DatasetMetadata {
    pub fn lod_count(&self) -> u32 {
        self.lods.len() as u32
    }

    pub fn lod(&self, lod: u32) -> Option<&LodGrid> {
        self.lods.get(lod as usize)
    }

    pub fn brick(&self, key: BrickKey) -> Option<&BrickMetadata> {
        self.bricks.iter().find(|b| b.key == key)
    }

    /// Bricks belonging to one LOD level
    pub fn bricks_in_lod(&self, lod: u32) -> impl Iterator<Item = &BrickMetadata> {
        self.bricks.iter().filter(move |b| b.key.lod == lod)
    }

    /// Construct the layout of every LOD level
    pub fn layouts(&self) -> Result<Vec<Layout>, LayoutError> {
        self.lods.iter().map(LodGrid::build_layout).collect()
    }
}

/// Cached scalar and gradient-magnitude extrema of one brick
#[derive(Archive, Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct MinMaxRecord {
    pub scalar_min: f64,
    pub scalar_max: f64,
    pub gradient_min: f64,
    pub gradient_max: f64,
}

#[derive(Archive, Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct MinMaxEntry {
    pub key: BrickKey,
    pub record: MinMaxRecord,
}

/// Min/max records for every brick of a dataset, in brick table order
#[derive(Archive, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct MinMaxTable {
    pub entries: Vec<MinMaxEntry>,
}

impl MinMaxTable {
    pub fn get(&self, key: BrickKey) -> Option<&MinMaxRecord> {
        self.entries.iter().find(|e| e.key == key).map(|e| &e.record)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

wire_record!(DatasetMetadata, MinMaxTable);
