//! Error types for svox

use thiserror::Error;

/// Main error type for the voxelizer and octree builder
#[derive(Debug, Error)]
pub enum Error {
    /// A compute kernel could not be set up. Fatal, never retried.
    #[error("Kernel setup failed: {0}")]
    KernelSetup(String),

    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),

    /// The destination buffer cannot hold a worst-case octree of the requested resolution.
    #[error("Octree buffer too small: {required} bytes required, {available} bytes available")]
    Capacity { required: u64, available: u64 },

    #[error("Octree offset {0} is not a multiple of 4 bytes")]
    UnalignedOffset(u64),

    #[error("Octree resolution {0} out of range [1, {max}]", max = crate::svo::node::MAX_RESOLUTION)]
    InvalidResolution(u32),

    #[error("Voxels on Y {0} out of range [1, 256]")]
    VoxelsOnYOutOfRange(u32),

    #[error("Voxel grid {x}x{y}x{z} exceeds the maximum side of {max}")]
    GridTooLarge { x: u32, y: u32, z: u32, max: u32 },

    #[error("Voxelization area is degenerate: {0}")]
    DegenerateArea(String),

    #[error("Rasterization reported {0} invalid voxel writes")]
    Rasterization(u32),

    #[error("Unsupported octree file version {0}")]
    UnsupportedVersion(u32),

    #[error("Octree payload size mismatch: header says {found} bytes, resolution {resolution} requires {expected}")]
    SizeMismatch { resolution: u32, expected: u64, found: u64 },

    /// The tree's byte size does not fit the file header
    #[error("Octree of resolution {resolution} ({bytesize} bytes) is too large for the file format")]
    FileTooLarge { resolution: u32, bytesize: u64 },

    #[error("Octree file truncated: {0}")]
    Truncated(String),

    #[error("Scene error: {0}")]
    Scene(String),
}
