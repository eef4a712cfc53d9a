//! Scene voxelization: scene input, raster kernel and the voxel list

pub mod raster;
pub mod scene;
pub mod voxel_list;
pub mod voxelize;

pub use scene::{Material, MaterialSlot, Mesh, Scene, SceneDescription};
pub use voxel_list::{pack_color, pack_position, unpack_color, unpack_position, VoxelList};
pub use voxelize::{
    calc_proportional_grid, create_projection_matrices, create_scene_normalization_matrix, MeshRange, VoxelizeReport,
    Voxelizer,
};
