//! Level-synchronous parallel octree construction
//!
//! The tree grows one level per round. Every round flags the nodes voxels pass
//! through, gives each flagged node a fresh octet from an atomic counter and
//! clears the new octets. A last pass writes voxel colors into the full-depth
//! leaves. The only state carried between rounds is `(start, count,
//! alloc_start)`; every dispatch ends with a memory barrier.

use std::sync::Arc;
use std::time::Instant;

use crate::compute::{AtomicCounter, ComputeContext, StorageBuffer};
use crate::core::{Error, Result};
use crate::voxel::VoxelList;

use super::kernels::{self, AllocParams, FlagParams, InitParams, StoreLeafParams};
use super::node::MAX_RESOLUTION;
use super::octree::{octree_bytesize, Octree};

/// Node range produced for one level
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelStats {
    pub level: u32,
    /// First node slot of the level
    pub start: u32,
    /// Node slots in the level (8 per octet)
    pub count: u32,
}

/// Summary of a build
#[derive(Clone, Debug, Default)]
pub struct BuildStats {
    pub levels: Vec<LevelStats>,
    /// Node slots in use, root octet included
    pub nodes_used: u64,
    /// Voxels dropped for lying outside the `2^resolution` cube
    pub voxels_skipped: u32,
    pub elapsed_ms: f64,
}

/// Builds linear octrees on a compute context.
///
/// Counters live in each build call, so one builder may run several builds
/// concurrently.
pub struct OctreeBuilder {
    ctx: Arc<ComputeContext>,
}

impl OctreeBuilder {
    pub fn new(ctx: Arc<ComputeContext>) -> Self {
        Self { ctx }
    }

    /// Zero `count` node slots starting at node `start` of `octree`
    pub fn clear(&self, octree: &Octree, start: u32, count: u32) -> Result<()> {
        let nodes = octree.nodes().ok_or(Error::Capacity {
            required: octree.offset() + octree.bytesize(),
            available: octree.buffer().byte_len(),
        })?;
        let params = InitParams { start, count };
        self.ctx.dispatch("node_init", count, |id| kernels::node_init(id, params, nodes));
        Ok(())
    }

    /// Build a tree of depth `resolution` into `buffer` at byte `offset`
    pub fn build(
        &self,
        voxels: &VoxelList,
        resolution: u32,
        buffer: Arc<StorageBuffer>,
        offset: u64,
    ) -> Result<Octree> {
        self.build_with_stats(voxels, resolution, buffer, offset)
            .map(|(octree, _)| octree)
    }

    pub fn build_with_stats(
        &self,
        voxels: &VoxelList,
        resolution: u32,
        buffer: Arc<StorageBuffer>,
        offset: u64,
    ) -> Result<(Octree, BuildStats)> {
        if resolution == 0 || resolution > MAX_RESOLUTION {
            return Err(Error::InvalidResolution(resolution));
        }
        if offset % 4 != 0 {
            return Err(Error::UnalignedOffset(offset));
        }
        let required = offset.saturating_add(octree_bytesize(resolution));
        if required > buffer.byte_len() {
            return Err(Error::Capacity { required, available: buffer.byte_len() });
        }

        let started = Instant::now();
        let octree = Octree::new(buffer, offset, resolution);
        let nodes = octree.nodes().ok_or(Error::Capacity {
            required,
            available: octree.buffer().byte_len(),
        })?;
        let positions = voxels.positions();
        let colors = voxels.colors();
        let voxel_count = voxels.len() as u32;

        log::debug!(
            "Building octree: {} voxels, resolution {}, {} node slots",
            voxel_count,
            resolution,
            octree.size()
        );

        let mut stats = BuildStats {
            levels: vec![LevelStats { level: 1, start: 0, count: 8 }],
            ..Default::default()
        };

        let alloc_counter = AtomicCounter::new("octree alloc");
        let skipped_counter = AtomicCounter::new("octree skipped");

        let mut start = 0u32;
        let mut count = 8u32;
        let mut alloc_start = 8u32;
        self.clear(&octree, start, count)?;

        for level in 1..resolution {
            let flag = FlagParams { level, resolution };
            self.ctx.dispatch("node_flag", voxel_count, |id| {
                kernels::node_flag(id, flag, nodes, positions)
            });

            alloc_counter.set_value(0);
            let alloc = AllocParams { start, count, alloc_start };
            let counter = &alloc_counter;
            self.ctx.dispatch("node_alloc", count, |id| kernels::node_alloc(id, alloc, nodes, counter));

            let allocated = alloc_counter.get_value();
            start = alloc_start;
            count = allocated * 8;
            alloc_start += count;

            log::debug!(
                "Level {}: {} octets allocated, nodes [{}, {})",
                level + 1,
                allocated,
                start,
                alloc_start
            );
            stats.levels.push(LevelStats { level: level + 1, start, count });

            self.clear(&octree, start, count)?;

            if allocated == 0 {
                break;
            }
        }

        let leaf = StoreLeafParams { resolution };
        let skipped = &skipped_counter;
        self.ctx.dispatch("store_leaf", voxel_count, |id| {
            if !kernels::store_leaf(id, leaf, nodes, positions, colors) {
                skipped.increment();
            }
        });

        stats.nodes_used = alloc_start as u64;
        stats.voxels_skipped = skipped_counter.get_value();
        stats.elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        if stats.voxels_skipped > 0 {
            log::warn!(
                "{} voxels lie outside the {}^3 octree and were skipped",
                stats.voxels_skipped,
                octree.side()
            );
        }
        log::info!(
            "Octree built: resolution {}, {} of {} node slots used in {:.2}ms",
            resolution,
            stats.nodes_used,
            octree.size(),
            stats.elapsed_ms
        );

        Ok((octree, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ComputeConfig;
    use crate::svo::node::{encode_leaf_color, is_address, is_null};
    use crate::svo::octree::octree_size;
    use crate::svo::traverse::traverse;
    use glam::UVec3;
    use std::collections::HashSet;

    fn builder() -> OctreeBuilder {
        let ctx = ComputeContext::new(&ComputeConfig { workgroup_size: 4, threads: Some(4) }).unwrap();
        OctreeBuilder::new(Arc::new(ctx))
    }

    fn buffer_for(resolution: u32) -> Arc<StorageBuffer> {
        Arc::new(StorageBuffer::new("octree", octree_size(resolution) as usize))
    }

    fn leaf_count(nodes: &[u32], resolution: u32) -> usize {
        let mut leaves = 0;
        traverse(nodes, |_, _| leaves += 1, Some(resolution));
        leaves
    }

    #[test]
    fn test_two_voxels_resolution_one() {
        let c1 = 0xff00_00ff;
        let c2 = 0xff00_ff00;
        let voxels = VoxelList::from_entries(&[(UVec3::new(0, 0, 0), c1), (UVec3::new(1, 0, 0), c2)]);

        let octree = builder().build(&voxels, 1, buffer_for(1), 0).unwrap();
        let nodes = octree.read_nodes().unwrap();
        assert_eq!(nodes.len(), 8);
        assert_eq!(nodes[0], encode_leaf_color(c1));
        assert_eq!(nodes[1], encode_leaf_color(c2));
        assert!(nodes[2..].iter().all(|&w| w == 0));
    }

    #[test]
    fn test_empty_list() {
        let buffer = Arc::new(StorageBuffer::from_words("octree", &vec![0xdead_beef; octree_size(3) as usize]));
        let (octree, stats) = builder()
            .build_with_stats(&VoxelList::new(), 3, buffer, 0)
            .unwrap();
        let nodes = octree.read_nodes().unwrap();
        assert!(nodes[..8].iter().all(|&w| is_null(w)));
        assert_eq!(leaf_count(&nodes, 3), 0);
        assert_eq!(stats.nodes_used, 8);
    }

    #[test]
    fn test_leaves_match_distinct_positions() {
        let resolution = 4;
        let mut entries = Vec::new();
        for i in 0..200u32 {
            let p = UVec3::new(i * 7 % 16, i * 3 % 16, i * 11 % 16);
            entries.push((p, 0xff00_0000 | i));
        }
        // Duplicates collapse into one leaf
        entries.push((UVec3::new(0, 0, 0), 1));
        entries.push((UVec3::new(0, 0, 0), 2));
        let distinct: HashSet<UVec3> = entries.iter().map(|&(p, _)| p).collect();

        let voxels = VoxelList::from_entries(&entries);
        let octree = builder().build(&voxels, resolution, buffer_for(resolution), 0).unwrap();
        let nodes = octree.read_nodes().unwrap();

        assert_eq!(leaf_count(&nodes, resolution), distinct.len());

        let mut found = HashSet::new();
        traverse(&nodes, |morton, idx| {
            assert!(!is_address(nodes[idx]));
            found.insert(crate::svo::octree::voxel_position(morton));
        }, None);
        assert_eq!(found, distinct);
    }

    #[test]
    fn test_level_sizes_follow_flagged_parents() {
        // Two voxels in opposite corners split into separate branches
        let voxels = VoxelList::from_entries(&[(UVec3::new(0, 0, 0), 1), (UVec3::new(7, 7, 7), 2)]);
        let (octree, stats) = builder()
            .build_with_stats(&voxels, 3, buffer_for(3), 0)
            .unwrap();

        let counts: Vec<u32> = stats.levels.iter().map(|l| l.count).collect();
        assert_eq!(counts, vec![8, 16, 16]);
        assert_eq!(stats.nodes_used, 40);
        assert_eq!(leaf_count(&octree.read_nodes().unwrap(), 3), 2);
    }

    #[test]
    fn test_offset_inside_shared_buffer() {
        let voxels = VoxelList::from_entries(&[(UVec3::new(1, 1, 1), 5)]);
        let buffer = Arc::new(StorageBuffer::new("shared", 16 + octree_size(2) as usize));
        buffer.write(0, &[42; 16]).unwrap();

        let octree = builder().build(&voxels, 2, buffer.clone(), 64).unwrap();
        assert!(buffer.read(0, 16).unwrap().iter().all(|&w| w == 42));
        assert_eq!(leaf_count(&octree.read_nodes().unwrap(), 2), 1);
    }

    #[test]
    fn test_outside_voxels_are_skipped() {
        let voxels = VoxelList::from_entries(&[(UVec3::new(1, 0, 0), 5), (UVec3::new(9, 0, 0), 6)]);
        let (octree, stats) = builder()
            .build_with_stats(&voxels, 2, buffer_for(2), 0)
            .unwrap();
        assert_eq!(stats.voxels_skipped, 1);
        assert_eq!(leaf_count(&octree.read_nodes().unwrap(), 2), 1);
    }

    #[test]
    fn test_concurrent_builds_share_one_builder() {
        let builder = Arc::new(builder());
        let resolution = 5;
        let lists: Vec<VoxelList> = (0..4u32)
            .map(|k| {
                let entries: Vec<(UVec3, u32)> = (0..300u32)
                    .map(|i| (UVec3::new((i * 7 + k) % 32, (i * 13 + 3 * k) % 32, (i * 5 + k * k) % 32), i | 1))
                    .collect();
                VoxelList::from_entries(&entries)
            })
            .collect();

        let serial: Vec<Vec<u32>> = lists
            .iter()
            .map(|l| builder.build(l, resolution, buffer_for(resolution), 0).unwrap().read_nodes().unwrap())
            .collect();

        let parallel: Vec<(Vec<u32>, BuildStats)> = std::thread::scope(|scope| {
            let handles: Vec<_> = lists
                .iter()
                .map(|l| {
                    let builder = builder.clone();
                    scope.spawn(move || {
                        let (octree, stats) = builder
                            .build_with_stats(l, resolution, buffer_for(resolution), 0)
                            .unwrap();
                        (octree.read_nodes().unwrap(), stats)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for ((nodes, stats), expected) in parallel.iter().zip(&serial) {
            assert_eq!(stats.voxels_skipped, 0);
            assert_eq!(leaf_count(nodes, resolution), leaf_count(expected, resolution));
            let mut leaves = HashSet::new();
            traverse(nodes, |morton, _| {
                leaves.insert(morton);
            }, None);
            let mut expected_leaves = HashSet::new();
            traverse(expected, |morton, _| {
                expected_leaves.insert(morton);
            }, None);
            assert_eq!(leaves, expected_leaves);
        }
    }

    #[test]
    fn test_rejects_bad_inputs() {
        let b = builder();
        let voxels = VoxelList::new();
        assert!(matches!(b.build(&voxels, 0, buffer_for(1), 0), Err(Error::InvalidResolution(0))));
        assert!(matches!(b.build(&voxels, 11, buffer_for(1), 0), Err(Error::InvalidResolution(11))));
        assert!(matches!(b.build(&voxels, 3, buffer_for(2), 0), Err(Error::Capacity { .. })));
        assert!(matches!(b.build(&voxels, 2, buffer_for(2), 4), Err(Error::Capacity { .. })));
        assert!(matches!(b.build(&voxels, 1, buffer_for(2), 2), Err(Error::UnalignedOffset(2))));
    }
}
