//! Octree construction kernels
//!
//! Each kernel is the body of one invocation. Buffers and uniforms are passed
//! explicitly on every call; the builder binds them per dispatch. Node ranges
//! are indexed from the root octet.

use crate::compute::{AtomicCounter, BufferRange};
use crate::math::morton::{child_index, encode_morton_3d};
use crate::voxel::voxel_list::unpack_position;

use super::node::{encode_leaf_color, get_value, is_address, make_address, TAG_BIT};

/// Uniforms of the flag pass
#[derive(Clone, Copy, Debug)]
pub struct FlagParams {
    /// Depth of the nodes being flagged (1 = root octet)
    pub level: u32,
    pub resolution: u32,
}

/// Uniforms of the allocation pass
#[derive(Clone, Copy, Debug)]
pub struct AllocParams {
    /// First node slot of the level being split
    pub start: u32,
    /// Node slots in the level being split
    pub count: u32,
    /// First free slot for new octets
    pub alloc_start: u32,
}

/// Uniforms of the clear pass
#[derive(Clone, Copy, Debug)]
pub struct InitParams {
    pub start: u32,
    pub count: u32,
}

/// Uniforms of the leaf pass
#[derive(Clone, Copy, Debug)]
pub struct StoreLeafParams {
    pub resolution: u32,
}

/// Morton code of voxel `id`, or None when it lies outside the `2^resolution` cube
#[inline]
fn voxel_code(positions: BufferRange<'_>, id: u32, resolution: u32) -> Option<u32> {
    let position = unpack_position(positions.load(id as usize));
    (position.max_element() < 1 << resolution).then(|| encode_morton_3d(position))
}

/// Follow `code` from the root down to depth `level`.
/// None when the path leaves the built part of the tree.
#[inline]
fn descend(nodes: BufferRange<'_>, code: u32, level: u32, resolution: u32) -> Option<usize> {
    let mut idx = child_index(code, 1, resolution) as usize;
    for l in 2..=level {
        let raw = nodes.load(idx);
        if !is_address(raw) {
            return None;
        }
        idx = get_value(raw) as usize + child_index(code, l, resolution) as usize;
    }
    Some(idx)
}

/// Mark the node voxel `id` lands on at `params.level` as needing children
pub fn node_flag(id: u32, params: FlagParams, nodes: BufferRange<'_>, positions: BufferRange<'_>) {
    let Some(code) = voxel_code(positions, id, params.resolution) else {
        return;
    };
    if let Some(idx) = descend(nodes, code, params.level, params.resolution) {
        nodes.fetch_or(idx, TAG_BIT);
    }
}

/// Give flagged node `start + id` a fresh child octet
pub fn node_alloc(id: u32, params: AllocParams, nodes: BufferRange<'_>, counter: &AtomicCounter) {
    if id >= params.count {
        return;
    }
    let idx = (params.start + id) as usize;
    if nodes.load(idx) & TAG_BIT == 0 {
        return;
    }
    let octet = counter.increment();
    nodes.store(idx, make_address(params.alloc_start + 8 * octet));
}

/// Zero node `start + id`
pub fn node_init(id: u32, params: InitParams, nodes: BufferRange<'_>) {
    if id < params.count {
        nodes.store((params.start + id) as usize, 0);
    }
}

/// Write the color of voxel `id` into its full-depth leaf.
/// Returns false when the voxel was outside the tree.
pub fn store_leaf(
    id: u32,
    params: StoreLeafParams,
    nodes: BufferRange<'_>,
    positions: BufferRange<'_>,
    colors: BufferRange<'_>,
) -> bool {
    let Some(code) = voxel_code(positions, id, params.resolution) else {
        return false;
    };
    match descend(nodes, code, params.resolution, params.resolution) {
        Some(idx) => nodes.store(idx, encode_leaf_color(colors.load(id as usize))),
        None => false,
    }
}
