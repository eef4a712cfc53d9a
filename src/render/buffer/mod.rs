//! GPU buffer management

pub mod octree_buffer;

pub use octree_buffer::{OctreeBinding, OctreeBuffer, OctreeParams};
