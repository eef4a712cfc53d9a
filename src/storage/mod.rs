//! On-disk octree persistence

pub mod octree_file;

pub use octree_file::{
    load_octree, read_octree, save_octree, write_octree, OctreeFile, MAX_FILE_RESOLUTION,
    OCTREE_FILE_VERSION,
};
