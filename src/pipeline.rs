//! Scene to octree: voxelize, size the tree, build it and download the nodes

use std::sync::Arc;
use std::time::Instant;

use glam::UVec3;

use crate::compute::{ComputeContext, StorageBuffer};
use crate::core::config::SvoxConfig;
use crate::core::Result;
use crate::storage::OctreeFile;
use crate::svo::builder::{BuildStats, OctreeBuilder};
use crate::svo::octree::{octree_size, suitable_resolution_for};
use crate::voxel::voxelize::{VoxelizeReport, Voxelizer};
use crate::voxel::{Scene, VoxelList};

/// Result of running the whole pipeline
#[derive(Clone, Debug)]
pub struct VoxelizedOctree {
    /// Voxel grid of the scene
    pub volume_size: UVec3,
    pub resolution: u32,
    pub nodes: Vec<u32>,
    pub voxel_count: u32,
    pub voxelize: VoxelizeReport,
    pub build: BuildStats,
}

impl VoxelizedOctree {
    /// Contents of the octree file for this tree
    pub fn to_file(&self) -> OctreeFile {
        OctreeFile {
            volume_size: self.volume_size,
            resolution: self.resolution,
            nodes: self.nodes.clone(),
        }
    }
}

/// Voxelizer and builder sharing one compute context
pub struct OctreePipeline {
    voxelizer: Voxelizer,
    builder: OctreeBuilder,
}

impl OctreePipeline {
    pub fn new(config: &SvoxConfig) -> Result<Self> {
        config.validate()?;
        let ctx = Arc::new(ComputeContext::new(&config.compute)?);
        Ok(Self {
            voxelizer: Voxelizer::new(ctx.clone(), config.voxelize.clone()),
            builder: OctreeBuilder::new(ctx),
        })
    }

    pub fn voxelizer(&self) -> &Voxelizer {
        &self.voxelizer
    }

    pub fn builder(&self) -> &OctreeBuilder {
        &self.builder
    }

    /// Voxelize `scene` with `voxels_on_y` cells along y and build its octree
    pub fn run(&self, scene: &Scene, voxels_on_y: u32) -> Result<VoxelizedOctree> {
        let started = Instant::now();

        let mut voxel_list = VoxelList::new();
        let report = self.voxelizer.voxelize(
            &mut voxel_list,
            scene,
            voxels_on_y,
            scene.transformed_min(),
            scene.transformed_size(),
        )?;

        let resolution = suitable_resolution_for(report.grid).max(1);
        let buffer = Arc::new(StorageBuffer::new("octree nodes", octree_size(resolution) as usize));
        let (octree, build) = self.builder.build_with_stats(&voxel_list, resolution, buffer, 0)?;
        let nodes = octree.read_nodes()?;

        log::info!(
            "Scene converted in {:.2}ms: {} voxels, resolution {}, {} node slots used",
            started.elapsed().as_secs_f64() * 1000.0,
            report.voxel_count,
            resolution,
            build.nodes_used
        );

        Ok(VoxelizedOctree {
            volume_size: report.grid,
            resolution,
            nodes,
            voxel_count: report.voxel_count,
            voxelize: report,
            build,
        })
    }
}
