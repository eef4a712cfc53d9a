//! Scene voxelization
//!
//! Runs the raster kernel over every mesh twice: a count pass that only bumps
//! the voxel counter, then, once the list is sized to exactly that count, a
//! store pass that writes the voxels. Meshes are dispatched one after the
//! other against a single counter, so each mesh owns a contiguous range of the
//! list.

use std::sync::Arc;
use std::time::Instant;

use glam::{Mat4, UVec3, Vec3};

use crate::compute::{AtomicCounter, ComputeContext};
use crate::core::config::{VoxelizeConfig, MAX_VOXELS_ON_Y};
use crate::core::{Error, Result};
use crate::math::morton::MORTON_AXIS_BITS;
use crate::storage::MAX_FILE_RESOLUTION;
use crate::svo::octree::octree_side;

use super::raster::{rasterize_triangle, RasterParams, RasterTargets};
use super::scene::Scene;
use super::voxel_list::VoxelList;

/// Largest grid side whose octree still fits the file format's 32-bit byte
/// size.
pub const MAX_GRID_SIDE: u32 = octree_side(MAX_FILE_RESOLUTION);

const _: () = assert!(MAX_GRID_SIDE <= 1 << MORTON_AXIS_BITS);

/// Voxels one mesh contributed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeshRange {
    pub mesh: usize,
    pub name: String,
    /// First voxel of the mesh in the list
    pub offset: u32,
    pub count: u32,
    /// Raster errors reported while drawing the mesh
    pub errors: u32,
}

/// Outcome of a voxelization
#[derive(Clone, Debug, Default)]
pub struct VoxelizeReport {
    pub grid: UVec3,
    /// Side of the square raster
    pub viewport: u32,
    pub voxel_count: u32,
    pub meshes: Vec<MeshRange>,
    pub errors: u32,
    pub elapsed_ms: f64,
}

/// Grid with `voxels_on_y` cells on y and the other axes scaled to the aspect ratio
pub fn calc_proportional_grid(size: Vec3, voxels_on_y: u32) -> UVec3 {
    let cells_per_unit = voxels_on_y as f32 / size.y;
    UVec3::new(
        (cells_per_unit * size.x).ceil() as u32,
        voxels_on_y,
        (cells_per_unit * size.z).ceil() as u32,
    )
}

/// Map the area `[position, position + size]` into the unit cube, keeping its
/// aspect ratio: the longest side spans [0, 1].
pub fn create_scene_normalization_matrix(area_position: Vec3, area_size: Vec3) -> Mat4 {
    let max_side = area_size.max_element();
    Mat4::from_scale(Vec3::splat(1.0 / max_side)) * Mat4::from_translation(-area_position)
}

/// Orthographic projections looking down x, y and z at the unit cube, depth range [1, 2]
pub fn create_projection_matrices() -> [Mat4; 3] {
    let ortho = Mat4::orthographic_rh_gl(0.0, 1.0, 0.0, 1.0, 1.0, 2.0);
    [
        ortho * Mat4::look_at_rh(Vec3::new(-1.0, 0.0, 0.0), Vec3::ZERO, Vec3::Y),
        ortho * Mat4::look_at_rh(Vec3::new(0.0, -1.0, 0.0), Vec3::ZERO, Vec3::Z),
        ortho * Mat4::look_at_rh(Vec3::new(0.0, 0.0, 2.0), Vec3::ZERO, Vec3::Y),
    ]
}

/// Counters of one voxelization, shared by its count and store passes
struct RasterCounters {
    voxels: AtomicCounter,
    errors: AtomicCounter,
}

/// Turns scenes into voxel lists. Counters are created per call, so one
/// voxelizer may serve several threads.
pub struct Voxelizer {
    ctx: Arc<ComputeContext>,
    config: VoxelizeConfig,
    projections: [Mat4; 3],
    inverse_projections: [Mat4; 3],
}

impl Voxelizer {
    pub fn new(ctx: Arc<ComputeContext>, config: VoxelizeConfig) -> Self {
        let projections = create_projection_matrices();
        Self {
            ctx,
            config,
            projections,
            inverse_projections: projections.map(|m| m.inverse()),
        }
    }

    pub fn config(&self) -> &VoxelizeConfig {
        &self.config
    }

    /// Voxelize the whole scene with the configured `voxels_on_y`
    pub fn voxelize_scene(&self, voxel_list: &mut VoxelList, scene: &Scene) -> Result<VoxelizeReport> {
        self.voxelize(
            voxel_list,
            scene,
            self.config.voxels_on_y,
            scene.transformed_min(),
            scene.transformed_size(),
        )
    }

    /// Voxelize the part of `scene` inside `[area_position, area_position + area_size]`.
    /// `voxel_list` is reallocated to exactly the number of voxels produced.
    pub fn voxelize(
        &self,
        voxel_list: &mut VoxelList,
        scene: &Scene,
        voxels_on_y: u32,
        area_position: Vec3,
        area_size: Vec3,
    ) -> Result<VoxelizeReport> {
        if voxels_on_y == 0 || voxels_on_y > MAX_VOXELS_ON_Y {
            return Err(Error::VoxelsOnYOutOfRange(voxels_on_y));
        }
        if scene.triangle_count() == 0 {
            log::info!("Scene has no triangles, nothing to voxelize");
            voxel_list.alloc(0);
            return Ok(VoxelizeReport::default());
        }
        if !area_size.is_finite() || !area_position.is_finite() || area_size.y <= 0.0 || area_size.min_element() < 0.0 {
            return Err(Error::DegenerateArea(format!(
                "position {:?}, size {:?}",
                area_position, area_size
            )));
        }

        let started = Instant::now();
        let grid = calc_proportional_grid(area_size, voxels_on_y).max(UVec3::ONE);
        let viewport = grid.max_element();
        if viewport > MAX_GRID_SIDE {
            return Err(Error::GridTooLarge { x: grid.x, y: grid.y, z: grid.z, max: MAX_GRID_SIDE });
        }
        log::info!("Voxelizing {} triangles into a {}x{}x{} grid", scene.triangle_count(), grid.x, grid.y, grid.z);
        log::debug!("Viewport of size ({}, {})", viewport, viewport);

        let normalization = create_scene_normalization_matrix(area_position, area_size);
        let counters = RasterCounters {
            voxels: AtomicCounter::new("voxel count"),
            errors: AtomicCounter::new("raster errors"),
        };

        // Count
        self.invoke(scene, voxel_list, &counters, normalization, grid, false);
        let voxel_count = counters.voxels.get_value();
        log::debug!(
            "Allocating a voxel list of {} (~{} bytes)",
            voxel_count,
            voxel_count as u64 * 8
        );
        voxel_list.alloc(voxel_count as usize);

        // Store
        let meshes = self.invoke(scene, voxel_list, &counters, normalization, grid, true);
        let stored = counters.voxels.get_value();
        if stored != voxel_count {
            log::warn!("Store pass produced {} voxels, count pass {}", stored, voxel_count);
        }

        let errors = meshes.iter().map(|m| m.errors).sum();
        let report = VoxelizeReport {
            grid,
            viewport,
            voxel_count,
            meshes,
            errors,
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
        };
        log::info!("Voxelized {} voxels in {:.2}ms", report.voxel_count, report.elapsed_ms);

        if errors > 0 && self.config.fail_on_raster_errors {
            return Err(Error::Rasterization(errors));
        }
        Ok(report)
    }

    /// Draw every mesh once, in order
    fn invoke(
        &self,
        scene: &Scene,
        voxel_list: &VoxelList,
        counters: &RasterCounters,
        normalization: Mat4,
        grid: UVec3,
        can_store: bool,
    ) -> Vec<MeshRange> {
        counters.voxels.set_value(0);
        let targets = RasterTargets {
            voxels: voxel_list,
            voxel_counter: &counters.voxels,
            error_counter: &counters.errors,
        };

        let mut offset = 0;
        let mut ranges = Vec::with_capacity(scene.meshes().len());
        for (index, mesh) in scene.meshes().iter().enumerate() {
            let params = RasterParams {
                model: normalization * mesh.transform,
                projections: &self.projections,
                inverse_projections: &self.inverse_projections,
                viewport: grid.max_element(),
                grid,
                can_store,
                channel: mesh.material.channel(self.config.material_slot),
            };

            counters.errors.set_value(0);
            self.ctx.dispatch("voxelize", mesh.triangle_count() as u32, |id| {
                rasterize_triangle(id, mesh, &params, &targets)
            });

            let end = counters.voxels.get_value();
            let errors = counters.errors.get_value();
            if can_store {
                log::debug!("Mesh {} voxelized, voxels: {}, offset: {}", index, end - offset, end);
                if errors > 0 {
                    log::error!("Mesh {} ('{}'): {} raster errors", index, mesh.name, errors);
                }
            }
            ranges.push(MeshRange {
                mesh: index,
                name: mesh.name.clone(),
                offset,
                count: end - offset,
                errors,
            });
            offset = end;
        }
        ranges
    }
}
