//! Sparse Voxel Octree: node encoding, parallel construction and traversal

pub mod builder;
pub mod kernels;
pub mod node;
pub mod octree;
pub mod traverse;

pub use builder::{BuildStats, LevelStats, OctreeBuilder};
pub use octree::{
    morton_code, octree_bytesize, octree_side, octree_size, suitable_resolution_for, voxel_position, Octree,
};
pub use traverse::{lookup, traverse, traverse_from, OctreeTraverser, TraversalValue};
