//! Triangle voxelization kernel
//!
//! One invocation rasterizes one triangle. The triangle is moved into the unit
//! cube, projected along the axis where its footprint is largest and scanned
//! at pixel centres of a square `viewport x viewport` raster. Every covered
//! pixel becomes one voxel: its depth is interpolated, the unit-cube position
//! recovered through the inverse projection and quantized to the grid.

use glam::{Mat4, UVec3, Vec2, Vec3, Vec3Swizzles, Vec4, Vec4Swizzles};

use crate::compute::AtomicCounter;

use super::scene::{MaterialChannel, Mesh};
use super::voxel_list::{pack_color, VoxelList};

/// Below this the triangle covers no pixel centre
const MIN_AREA: f32 = 1e-12;

/// Slack for positions that fall just below zero through rounding
const EPSILON: f32 = 1e-3;

/// Uniforms of one mesh draw
#[derive(Clone, Copy, Debug)]
pub struct RasterParams<'a> {
    /// Scene normalization times mesh transform
    pub model: Mat4,
    /// Projection along x, y and z
    pub projections: &'a [Mat4; 3],
    pub inverse_projections: &'a [Mat4; 3],
    /// Side of the square raster
    pub viewport: u32,
    pub grid: UVec3,
    /// False during the count pass
    pub can_store: bool,
    /// Material channel sampled for the voxel color
    pub channel: &'a MaterialChannel,
}

/// Storage written by the raster kernel
#[derive(Clone, Copy, Debug)]
pub struct RasterTargets<'a> {
    pub voxels: &'a VoxelList,
    pub voxel_counter: &'a AtomicCounter,
    pub error_counter: &'a AtomicCounter,
}

/// Axis with the largest absolute normal component: 0 = x, 1 = y, 2 = z
pub fn dominant_axis(normal: Vec3) -> usize {
    let n = normal.abs();
    if n.x >= n.y && n.x >= n.z {
        0
    } else if n.y >= n.z {
        1
    } else {
        2
    }
}

/// Grid cell of a raster-space position (`unit position * viewport`).
///
/// A coordinate at or past the grid's far side but less than one cell beyond
/// it clamps to the last cell; the grid is rounded up per axis so this slack
/// is always inside the scene area. Anything further out is None.
pub fn quantize(v: Vec3, grid: UVec3) -> Option<UVec3> {
    let limit = grid.as_vec3() + Vec3::ONE;
    if v.cmplt(Vec3::splat(-EPSILON)).any() || v.cmpge(limit).any() || grid.min_element() == 0 {
        return None;
    }
    let cell = v.max(Vec3::ZERO).floor().as_uvec3();
    Some(cell.min(grid - UVec3::ONE))
}

#[inline]
fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Rasterize triangle `id` of `mesh`
pub fn rasterize_triangle(id: u32, mesh: &Mesh, params: &RasterParams<'_>, targets: &RasterTargets<'_>) {
    let Some(tri) = mesh.triangle(id as usize) else {
        return;
    };
    let Some(corners) = tri
        .iter()
        .map(|&i| mesh.positions.get(i as usize).map(|&p| params.model.transform_point3(p)))
        .collect::<Option<Vec<Vec3>>>()
    else {
        return;
    };
    let uvs = mesh.uvs.as_ref().and_then(|uvs| {
        tri.iter()
            .map(|&i| uvs.get(i as usize).copied())
            .collect::<Option<Vec<Vec2>>>()
    });

    let normal = (corners[1] - corners[0]).cross(corners[2] - corners[0]);
    if normal.length_squared() < MIN_AREA {
        return;
    }
    let axis = dominant_axis(normal);
    let projection = params.projections[axis];
    let inverse = params.inverse_projections[axis];

    let viewport = params.viewport as f32;
    let mut screen = [Vec2::ZERO; 3];
    let mut depth = [0.0f32; 3];
    for (i, corner) in corners.iter().enumerate() {
        let ndc = projection.project_point3(*corner);
        screen[i] = (ndc.xy() * 0.5 + 0.5) * viewport;
        depth[i] = ndc.z * 0.5 + 0.5;
    }

    let area = edge(screen[0], screen[1], screen[2]);
    if area.abs() < MIN_AREA {
        return;
    }

    let lo = screen[0].min(screen[1]).min(screen[2]);
    let hi = screen[0].max(screen[1]).max(screen[2]);
    let last = params.viewport as i64 - 1;
    let x0 = ((lo.x - 0.5).ceil() as i64).max(0);
    let x1 = ((hi.x - 0.5).floor() as i64).min(last);
    let y0 = ((lo.y - 0.5).ceil() as i64).max(0);
    let y1 = ((hi.y - 0.5).floor() as i64).min(last);

    for py in y0..=y1 {
        for px in x0..=x1 {
            let p = Vec2::new(px as f32 + 0.5, py as f32 + 0.5);
            let w0 = edge(screen[1], screen[2], p) / area;
            let w1 = edge(screen[2], screen[0], p) / area;
            let w2 = edge(screen[0], screen[1], p) / area;
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }

            let z = w0 * depth[0] + w1 * depth[1] + w2 * depth[2];
            let ndc = Vec4::new(p.x / viewport * 2.0 - 1.0, p.y / viewport * 2.0 - 1.0, z * 2.0 - 1.0, 1.0);
            let unit = inverse * ndc;
            let unit = unit.xyz() / unit.w;

            let Some(cell) = quantize(unit * viewport, params.grid) else {
                targets.error_counter.increment();
                continue;
            };

            let index = targets.voxel_counter.increment();
            if params.can_store {
                let uv = uvs.as_ref().map(|uv| uv[0] * w0 + uv[1] * w1 + uv[2] * w2);
                let color = pack_color(params.channel.sample(uv));
                if !targets.voxels.write(index as usize, cell, color) {
                    targets.error_counter.increment();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::scene::{Material, MaterialSlot};
    use crate::voxel::voxelize::create_projection_matrices;
    use std::sync::Arc;

    fn params<'a>(
        projections: &'a [Mat4; 3],
        inverse: &'a [Mat4; 3],
        channel: &'a MaterialChannel,
        viewport: u32,
        can_store: bool,
    ) -> RasterParams<'a> {
        RasterParams {
            model: Mat4::IDENTITY,
            projections,
            inverse_projections: inverse,
            viewport,
            grid: UVec3::splat(viewport),
            can_store,
            channel,
        }
    }

    #[test]
    fn test_dominant_axis() {
        assert_eq!(dominant_axis(Vec3::new(1.0, 0.2, -0.3)), 0);
        assert_eq!(dominant_axis(Vec3::new(0.1, -2.0, 0.3)), 1);
        assert_eq!(dominant_axis(Vec3::new(0.0, 0.0, -1.0)), 2);
    }

    #[test]
    fn test_quantize() {
        let grid = UVec3::new(4, 2, 4);
        assert_eq!(quantize(Vec3::new(0.5, 0.5, 3.9), grid), Some(UVec3::new(0, 0, 3)));
        // Far boundary clamps to the last cell
        assert_eq!(quantize(Vec3::new(4.0, 2.0, 0.0), grid), Some(UVec3::new(3, 1, 0)));
        assert_eq!(quantize(Vec3::new(-1e-4, 0.0, 0.0), grid), Some(UVec3::ZERO));
        assert_eq!(quantize(Vec3::new(0.0, 3.0, 0.0), grid), None);
        assert_eq!(quantize(Vec3::new(-0.5, 0.0, 0.0), grid), None);
    }

    #[test]
    fn test_flat_square_covers_one_layer() {
        // Unit square at z = 0.625, two triangles facing +z
        let material = Arc::new(Material::new("m").with_color(MaterialSlot::Diffuse, Vec4::new(1.0, 0.0, 0.0, 1.0)));
        let mesh = Mesh::new(
            "square",
            vec![
                Vec3::new(0.0, 0.0, 0.625),
                Vec3::new(1.0, 0.0, 0.625),
                Vec3::new(0.0, 1.0, 0.625),
                Vec3::new(1.0, 1.0, 0.625),
            ],
            vec![0, 1, 2, 1, 3, 2],
            material.clone(),
        );
        let projections = create_projection_matrices();
        let inverse = projections.map(|m| m.inverse());
        let channel = material.channel(MaterialSlot::Diffuse);

        let voxels = VoxelList::new();
        let counter = AtomicCounter::new("voxels");
        let errors = AtomicCounter::new("errors");
        let targets = RasterTargets { voxels: &voxels, voxel_counter: &counter, error_counter: &errors };

        let count_params = params(&projections, &inverse, channel, 4, false);
        for id in 0..2 {
            rasterize_triangle(id, &mesh, &count_params, &targets);
        }
        let total = counter.get_value();
        assert_eq!(errors.get_value(), 0);
        // 16 pixel centres; the shared diagonal's centres may land in both triangles
        assert!((16..=20).contains(&total), "{} voxels", total);

        let mut voxels = VoxelList::new();
        voxels.alloc(total as usize);
        counter.set_value(0);
        let targets = RasterTargets { voxels: &voxels, voxel_counter: &counter, error_counter: &errors };
        let store_params = params(&projections, &inverse, channel, 4, true);
        for id in 0..2 {
            rasterize_triangle(id, &mesh, &store_params, &targets);
        }
        assert_eq!(counter.get_value(), total);
        assert_eq!(errors.get_value(), 0);

        let mut cells: Vec<UVec3> = (0..voxels.len()).filter_map(|i| voxels.position(i)).collect();
        cells.sort_by_key(|c| (c.x, c.y, c.z));
        cells.dedup();
        assert_eq!(cells.len(), 16);
        assert!(cells.iter().all(|c| c.z == 2));
        assert!((0..voxels.len()).all(|i| voxels.color(i) == Some(0xff00_00ff)));
    }

    #[test]
    fn test_degenerate_triangle_is_skipped() {
        let material = Arc::new(Material::new("m"));
        let mesh = Mesh::new(
            "line",
            vec![Vec3::ZERO, Vec3::new(0.5, 0.5, 0.5), Vec3::ONE],
            vec![0, 1, 2],
            material.clone(),
        );
        let projections = create_projection_matrices();
        let inverse = projections.map(|m| m.inverse());
        let voxels = VoxelList::new();
        let counter = AtomicCounter::new("voxels");
        let errors = AtomicCounter::new("errors");
        let targets = RasterTargets { voxels: &voxels, voxel_counter: &counter, error_counter: &errors };
        let p = params(&projections, &inverse, material.channel(MaterialSlot::Diffuse), 8, false);
        rasterize_triangle(0, &mesh, &p, &targets);
        assert_eq!(counter.get_value(), 0);
        assert_eq!(errors.get_value(), 0);
    }
}
