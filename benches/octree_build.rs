use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion, black_box};

use glam::{UVec3, Vec3};

use svox::compute::{ComputeContext, StorageBuffer};
use svox::core::config::{ComputeConfig, VoxelizeConfig};
use svox::svo::{octree_size, OctreeBuilder, OctreeTraverser};
use svox::voxel::{Material, Mesh, Scene, VoxelList, Voxelizer};

/// Shell of a sphere in a `side^3` grid
fn sphere_voxels(side: u32, radius: f32) -> VoxelList {
    let center = Vec3::splat(side as f32 / 2.0);
    let mut entries = Vec::new();
    for z in 0..side {
        for y in 0..side {
            for x in 0..side {
                let d = (Vec3::new(x as f32, y as f32, z as f32) + 0.5 - center).length();
                if (d - radius).abs() < 1.0 {
                    entries.push((UVec3::new(x, y, z), 0xff00_0000 | (x << 16) | (y << 8) | z));
                }
            }
        }
    }
    VoxelList::from_entries(&entries)
}

fn context() -> Arc<ComputeContext> {
    Arc::new(ComputeContext::new(&ComputeConfig::default()).expect("compute context"))
}

fn bench_octree_build(c: &mut Criterion) {
    let builder = OctreeBuilder::new(context());
    for resolution in [5u32, 6, 7] {
        let side = 1 << resolution;
        let voxels = sphere_voxels(side, side as f32 * 0.45);
        let buffer = Arc::new(StorageBuffer::new("octree", octree_size(resolution) as usize));

        c.bench_function(&format!("octree_build_{}", side), |b| {
            b.iter(|| {
                builder
                    .build(black_box(&voxels), resolution, buffer.clone(), 0)
                    .expect("build")
            });
        });
    }
}

fn bench_traverse(c: &mut Criterion) {
    let builder = OctreeBuilder::new(context());
    let voxels = sphere_voxels(128, 56.0);
    let buffer = Arc::new(StorageBuffer::new("octree", octree_size(7) as usize));
    let nodes = builder.build(&voxels, 7, buffer, 0).expect("build").read_nodes().expect("download");

    c.bench_function("traverse_128", |b| {
        b.iter(|| {
            let mut traverser = OctreeTraverser::new(black_box(&nodes), 0);
            traverser.iter(None).count()
        });
    });
}

fn bench_voxelize(c: &mut Criterion) {
    let voxelizer = Voxelizer::new(context(), VoxelizeConfig::default());
    let material = Arc::new(Material::new("white"));
    let mut scene = Scene::new();
    for i in 0..8 {
        let min = Vec3::new(i as f32 * 1.5, 0.0, (i % 3) as f32);
        scene
            .add_mesh(Mesh::cuboid("box", min, min + Vec3::ONE, material.clone()))
            .expect("mesh");
    }

    c.bench_function("voxelize_boxes_32", |b| {
        b.iter(|| {
            let mut list = VoxelList::new();
            voxelizer
                .voxelize(&mut list, black_box(&scene), 32, scene.transformed_min(), scene.transformed_size())
                .expect("voxelize");
            list.len()
        });
    });
}

criterion_group!(benches, bench_octree_build, bench_traverse, bench_voxelize);
criterion_main!(benches);
