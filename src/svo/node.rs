//! Sparse Voxel Octree node word
//!
//! Layout (32 bits):
//! - bit 31: tag. 0 = leaf or empty, 1 = internal node
//! - bits 0-30: payload. For internal nodes the absolute index of the first of
//!   eight contiguous child slots; for leaves an opaque color reference.
//!
//! A word equal to 0 is "no node here" regardless of interpretation.
//!
//! Leaf payloads written by the builder pack the voxel color:
//! - bits 0-23: RGB888 (red in the low byte)
//! - bits 24-29: alpha >> 2
//! - bit 30: occupancy marker, so a transparent black leaf is still non-null

/// Tag bit marking an internal node (or a node flagged for subdivision)
pub const TAG_BIT: u32 = 0x8000_0000;

/// Payload bits
pub const PAYLOAD_MASK: u32 = 0x7fff_ffff;

/// Deepest tree the builder accepts: node indices of depth 10 still fit the
/// 31-bit payload and voxel coordinates fit the 10-bit position packing.
/// Octree files stop one level earlier (`storage::MAX_FILE_RESOLUTION`).
pub const MAX_RESOLUTION: u32 = 10;

/// Occupancy marker set on every leaf written from a voxel color
pub const LEAF_OCCUPIED: u32 = 1 << 30;

#[inline]
pub const fn is_null(raw: u32) -> bool {
    raw == 0
}

#[inline]
pub const fn is_leaf(raw: u32) -> bool {
    raw & TAG_BIT == 0
}

#[inline]
pub const fn is_address(raw: u32) -> bool {
    !is_leaf(raw)
}

/// Payload with the tag stripped
#[inline]
pub const fn get_value(raw: u32) -> u32 {
    raw & PAYLOAD_MASK
}

/// Internal node word pointing at the octet starting at `child_index`
#[inline]
pub const fn make_address(child_index: u32) -> u32 {
    TAG_BIT | (child_index & PAYLOAD_MASK)
}

/// Leaf word for a packed RGBA8 color (see `voxel_list::pack_color`)
#[inline]
pub const fn encode_leaf_color(rgba: u32) -> u32 {
    let rgb = rgba & 0x00ff_ffff;
    let alpha = (rgba >> 24) >> 2;
    LEAF_OCCUPIED | (alpha << 24) | rgb
}

/// RGBA8 color stored in a leaf word. Alpha keeps its top 6 bits.
#[inline]
pub const fn decode_leaf_color(raw: u32) -> u32 {
    let rgb = raw & 0x00ff_ffff;
    let alpha6 = (raw >> 24) & 0x3f;
    let alpha = (alpha6 << 2) | (alpha6 >> 4);
    (alpha << 24) | rgb
}
