//! Voxel list: the compacted output of voxelization
//!
//! Two parallel device streams of one word per voxel. Positions pack the
//! integer cell as `x | y << 10 | z << 20`; colors are RGBA8 with red in the
//! low byte.

use glam::{UVec3, Vec4};

use crate::compute::{BufferRange, StorageBuffer};

/// Position and color streams of equal, fixed length
#[derive(Debug)]
pub struct VoxelList {
    positions: StorageBuffer,
    colors: StorageBuffer,
}

impl Default for VoxelList {
    fn default() -> Self {
        Self::new()
    }
}

impl VoxelList {
    /// Zero-length list, the count pass target
    pub fn new() -> Self {
        Self {
            positions: StorageBuffer::new("voxel positions", 0),
            colors: StorageBuffer::new("voxel colors", 0),
        }
    }

    /// Host upload of `(position, color)` entries
    pub fn from_entries(entries: &[(UVec3, u32)]) -> Self {
        let positions: Vec<u32> = entries.iter().map(|&(p, _)| pack_position(p)).collect();
        let colors: Vec<u32> = entries.iter().map(|&(_, c)| c).collect();
        Self {
            positions: StorageBuffer::from_words("voxel positions", &positions),
            colors: StorageBuffer::from_words("voxel colors", &colors),
        }
    }

    /// Replace both streams with zeroed streams of exactly `size` voxels
    pub fn alloc(&mut self, size: usize) {
        self.positions = StorageBuffer::new("voxel positions", size);
        self.colors = StorageBuffer::new("voxel colors", size);
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Bound position stream
    pub fn positions(&self) -> BufferRange<'_> {
        self.positions.full_range()
    }

    /// Bound color stream
    pub fn colors(&self) -> BufferRange<'_> {
        self.colors.full_range()
    }

    /// Bounded write of one entry; false when `index` is past the end
    pub fn write(&self, index: usize, position: UVec3, color: u32) -> bool {
        self.positions.full_range().store(index, pack_position(position))
            && self.colors.full_range().store(index, color)
    }

    /// Cell of voxel `index`, None past the end
    pub fn position(&self, index: usize) -> Option<UVec3> {
        (index < self.len()).then(|| unpack_position(self.positions.full_range().load(index)))
    }

    /// Packed color of voxel `index`, None past the end
    pub fn color(&self, index: usize) -> Option<u32> {
        (index < self.len()).then(|| self.colors.full_range().load(index))
    }
}

/// Pack a cell position, 10 bits per axis
#[inline]
pub fn pack_position(p: UVec3) -> u32 {
    (p.x & 0x3ff) | ((p.y & 0x3ff) << 10) | ((p.z & 0x3ff) << 20)
}

#[inline]
pub fn unpack_position(packed: u32) -> UVec3 {
    UVec3::new(packed & 0x3ff, (packed >> 10) & 0x3ff, (packed >> 20) & 0x3ff)
}

/// Pack a linear [0, 1] color to RGBA8, red in the low byte
pub fn pack_color(color: Vec4) -> u32 {
    let c = (color.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round();
    (c.x as u32) | ((c.y as u32) << 8) | ((c.z as u32) << 16) | ((c.w as u32) << 24)
}

pub fn unpack_color(packed: u32) -> Vec4 {
    Vec4::new(
        (packed & 0xff) as f32,
        ((packed >> 8) & 0xff) as f32,
        ((packed >> 16) & 0xff) as f32,
        (packed >> 24) as f32,
    ) / 255.0
}
