//! Host-side octree traversal
//!
//! Both traversals report `(morton, node_index)` for every non-null node that
//! is a leaf or sits at `stop_at_level`. The Morton code is accumulated most
//! significant triple first, `(parent << 3) | child`, so at full depth it
//! equals the voxel's `morton_code`. Addresses outside the node slice read as
//! null and descent never goes below `MAX_RESOLUTION` levels.

use glam::UVec3;

use super::node::{get_value, is_leaf, is_null, MAX_RESOLUTION};
use crate::math::morton::{child_index, encode_morton_3d};

/// Visit every leaf (or `stop_at_level` node) below the root octet
pub fn traverse<F>(nodes: &[u32], on_leaf: F, stop_at_level: Option<u32>)
where
    F: FnMut(u32, usize),
{
    traverse_from(nodes, 0, on_leaf, stop_at_level);
}

/// Visit every leaf (or `stop_at_level` node) below the octet at `start`
pub fn traverse_from<F>(nodes: &[u32], start: usize, mut on_leaf: F, stop_at_level: Option<u32>)
where
    F: FnMut(u32, usize),
{
    traverse_octet(nodes, start, 1, 0, stop_at_level, &mut on_leaf);
}

fn traverse_octet<F>(
    nodes: &[u32],
    offset: usize,
    depth: u32,
    parent_morton: u32,
    stop_at_level: Option<u32>,
    on_leaf: &mut F,
) where
    F: FnMut(u32, usize),
{
    for child in 0..8u32 {
        let node_idx = offset + child as usize;
        let raw = nodes.get(node_idx).copied().unwrap_or(0);
        if is_null(raw) {
            continue;
        }

        let morton = (parent_morton << 3) | child;
        if is_leaf(raw) || stop_at_level == Some(depth) || depth >= MAX_RESOLUTION {
            on_leaf(morton, node_idx);
        } else {
            traverse_octet(nodes, get_value(raw) as usize, depth + 1, morton, stop_at_level, on_leaf);
        }
    }
}

/// Node index a voxel position resolves to in a tree of depth `resolution`
/// whose root octet starts at `start`. None for empty space or positions
/// outside the tree.
pub fn lookup(nodes: &[u32], start: usize, resolution: u32, position: UVec3) -> Option<usize> {
    let side = 1u32.checked_shl(resolution)?;
    if resolution == 0 || resolution > MAX_RESOLUTION || position.max_element() >= side {
        return None;
    }

    let code = encode_morton_3d(position);
    let mut base = start;
    for level in 1..=resolution {
        let idx = base + child_index(code, level, resolution) as usize;
        let raw = *nodes.get(idx)?;
        if is_null(raw) {
            return None;
        }
        if is_leaf(raw) || level == resolution {
            return Some(idx);
        }
        base = get_value(raw) as usize;
    }
    None
}

/// Cursor state of the iterative traverser
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TraversalValue {
    /// Morton code accumulated down to this node
    pub morton_code: u32,
    /// Index of the octet holding this node
    pub node_address: usize,
    /// Slot of this node inside its octet, 0..8
    pub child_num: u32,
}

impl TraversalValue {
    /// Absolute index of the node word
    pub fn node_index(&self) -> usize {
        self.node_address + self.child_num as usize
    }
}

/// Depth-first octree cursor with an explicit stack.
///
/// Traversal can be suspended after any `next` and resumed later, and its
/// depth never grows the call stack.
#[derive(Clone, Debug)]
pub struct OctreeTraverser<'a> {
    nodes: &'a [u32],
    current: TraversalValue,
    stack: Vec<TraversalValue>,
    finished: bool,
}

impl<'a> OctreeTraverser<'a> {
    /// Start at the octet at `init_node_address` (0 for the root)
    pub fn new(nodes: &'a [u32], init_node_address: usize) -> Self {
        Self {
            nodes,
            current: TraversalValue {
                morton_code: 0,
                node_address: init_node_address,
                child_num: 0,
            },
            stack: Vec::with_capacity(MAX_RESOLUTION as usize),
            finished: false,
        }
    }

    pub fn has_finished(&self) -> bool {
        self.finished
    }

    /// Advance to the next non-null leaf, or node at `stop_at_level`.
    /// Returns None once the starting octet is exhausted.
    pub fn next(&mut self, stop_at_level: Option<u32>) -> Option<TraversalValue> {
        if self.finished {
            return None;
        }

        loop {
            while self.current.child_num >= 8 {
                match self.stack.pop() {
                    Some(parent) => {
                        self.current = parent;
                        self.current.child_num += 1;
                    }
                    None => {
                        self.finished = true;
                        return None;
                    }
                }
            }

            self.current.morton_code = (self.current.morton_code & !7) | self.current.child_num;

            let raw = self.nodes.get(self.current.node_index()).copied().unwrap_or(0);
            let depth = self.stack.len() as u32 + 1;
            let reached_stop = stop_at_level == Some(depth) || depth >= MAX_RESOLUTION;

            if is_null(raw) {
                self.current.child_num += 1;
                continue;
            }

            if is_leaf(raw) || reached_stop {
                let result = self.current;
                self.current.child_num += 1;
                return Some(result);
            }

            self.stack.push(self.current);
            self.current = TraversalValue {
                morton_code: self.current.morton_code << 3,
                node_address: get_value(raw) as usize,
                child_num: 0,
            };
        }
    }

    /// Borrow the cursor as an iterator; dropping it keeps the position.
    pub fn iter(&mut self, stop_at_level: Option<u32>) -> TraverserIter<'_, 'a> {
        TraverserIter { traverser: self, stop_at_level }
    }
}

/// Iterator view of an `OctreeTraverser`
pub struct TraverserIter<'t, 'a> {
    traverser: &'t mut OctreeTraverser<'a>,
    stop_at_level: Option<u32>,
}

impl Iterator for TraverserIter<'_, '_> {
    type Item = TraversalValue;

    fn next(&mut self) -> Option<Self::Item> {
        self.traverser.next(self.stop_at_level)
    }
}
