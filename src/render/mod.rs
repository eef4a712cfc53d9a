//! GPU-resident octree for the ray-tracing consumer

pub mod buffer;
pub mod context;

pub use buffer::{OctreeBinding, OctreeBuffer, OctreeParams};
pub use context::GpuContext;
