//! Linear octree stored in a device buffer
//!
//! The tree is a flat array of node words grouped in octets. The root octet
//! occupies words [0, 8) of the tree's range; every internal node points at the
//! absolute index (relative to the tree's first word) of its child octet.
//! An `Octree` only records where the tree lives; the caller owns the buffer.

use std::sync::Arc;

use glam::UVec3;

use crate::compute::{BufferRange, StorageBuffer};
use crate::core::Result;
use crate::math::morton::{decode_morton_3d, encode_morton_3d};

use super::node::MAX_RESOLUTION;

/// Octree view over a caller-owned storage buffer
#[derive(Clone, Debug)]
pub struct Octree {
    buffer: Arc<StorageBuffer>,
    /// Byte offset of the root octet inside `buffer`
    offset: u64,
    /// Tree depth
    resolution: u32,
}

impl Octree {
    pub fn new(buffer: Arc<StorageBuffer>, offset: u64, resolution: u32) -> Self {
        Self { buffer, offset, resolution }
    }

    /// True when the buffer holds a worst-case tree of a supported depth at a
    /// word-aligned offset
    pub fn is_valid(&self) -> bool {
        (1..=MAX_RESOLUTION).contains(&self.resolution)
            && self.offset % 4 == 0
            && self.offset.checked_add(self.bytesize()).is_some_and(|end| end <= self.buffer.byte_len())
    }

    pub fn buffer(&self) -> &Arc<StorageBuffer> {
        &self.buffer
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Node slots reserved for this tree
    pub fn size(&self) -> u64 {
        octree_size(self.resolution)
    }

    pub fn bytesize(&self) -> u64 {
        octree_bytesize(self.resolution)
    }

    /// Voxels per side at full depth
    pub fn side(&self) -> u32 {
        octree_side(self.resolution)
    }

    /// Bound node range, indexed from the root octet
    pub fn nodes(&self) -> Option<BufferRange<'_>> {
        self.buffer.range((self.offset / 4) as usize, self.size() as usize)
    }

    /// Download the node words
    pub fn read_nodes(&self) -> Result<Vec<u32>> {
        self.buffer.read((self.offset / 4) as usize, self.size() as usize)
    }
}

/// Node slots of a fully branching tree: sum of 8^level for level in 1..=resolution.
/// Saturates at `u64::MAX` past resolution 20.
pub const fn octree_size(resolution: u32) -> u64 {
    match 8u64.checked_pow(resolution.saturating_add(1)) {
        Some(p) => (p - 8) / 7,
        None => u64::MAX,
    }
}

/// Bytes of `octree_size(resolution)` node words, saturating
pub const fn octree_bytesize(resolution: u32) -> u64 {
    octree_size(resolution).saturating_mul(4)
}

/// Voxels per side of a tree of depth `resolution`, saturating past 31
pub const fn octree_side(resolution: u32) -> u32 {
    match 1u32.checked_shl(resolution) {
        Some(side) => side,
        None => u32::MAX,
    }
}

/// Smallest depth whose side covers the largest grid dimension
pub fn suitable_resolution_for(grid: UVec3) -> u32 {
    grid.max_element().max(1).next_power_of_two().trailing_zeros()
}

/// Morton code of a voxel position
pub fn morton_code(position: UVec3) -> u32 {
    encode_morton_3d(position)
}

/// Voxel position of a full-depth Morton code
pub fn voxel_position(morton: u32) -> UVec3 {
    decode_morton_3d(morton)
}
