//! Svox - scene voxelization and sparse voxel octree construction

pub mod compute;
pub mod core;
pub mod math;
pub mod pipeline;
pub mod render;
pub mod storage;
pub mod svo;
pub mod voxel;

pub use crate::core::{Error, Result, SvoxConfig};
pub use pipeline::{OctreePipeline, VoxelizedOctree};
