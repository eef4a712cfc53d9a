//! Morton encoding (Z-order curve) for octree addressing
//!
//! Codes are 30 bits wide: 10 bits per axis, matching the packed voxel
//! positions. Within each 3-bit group x is bit 0, y is bit 1 and z is bit 2,
//! and the most significant group selects the child under the root.

use glam::UVec3;

/// Bits per axis that fit a 32-bit code.
pub const MORTON_AXIS_BITS: u32 = 10;

/// Spread the low 10 bits of `x` into every third bit
fn spread_bits(x: u32) -> u32 {
    let mut x = x & 0x3ff;
    x = (x | (x << 16)) & 0x0300_00ff;
    x = (x | (x << 8)) & 0x0300_f00f;
    x = (x | (x << 4)) & 0x030c_30c3;
    x = (x | (x << 2)) & 0x0924_9249;
    x
}

/// Compact every third bit of `x` into a 10-bit integer
fn compact_bits(x: u32) -> u32 {
    let mut x = x & 0x0924_9249;
    x = (x | (x >> 2)) & 0x030c_30c3;
    x = (x | (x >> 4)) & 0x0300_f00f;
    x = (x | (x >> 8)) & 0x0300_00ff;
    x = (x | (x >> 16)) & 0x3ff;
    x
}

/// Encode a voxel position into its Morton code.
/// Coordinates above 1023 are truncated to their low 10 bits.
pub fn encode_morton_3d(pos: UVec3) -> u32 {
    spread_bits(pos.x) | (spread_bits(pos.y) << 1) | (spread_bits(pos.z) << 2)
}

/// Decode a Morton code back to a voxel position
pub fn decode_morton_3d(code: u32) -> UVec3 {
    UVec3::new(compact_bits(code), compact_bits(code >> 1), compact_bits(code >> 2))
}

/// Child slot (0..8) selected by `code` at `level` (1 = children of the root)
/// in a tree of depth `resolution`.
#[inline]
pub fn child_index(code: u32, level: u32, resolution: u32) -> u32 {
    debug_assert!(level >= 1 && level <= resolution);
    (code >> (3 * (resolution - level))) & 7
}
