//! GPU storage buffer holding octree node words
//!
//! This is the binding contract of the ray-tracing consumer: a buffer handle,
//! a byte offset and length, and the node address traversal starts from. The
//! consumer reads the words with the node encoding rules and never writes.

use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};

use crate::core::{Error, Result};
use crate::svo::node::MAX_RESOLUTION;

/// Traversal uniforms (16 bytes, matches the WGSL layout)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct OctreeParams {
    /// Index of the octet traversal starts from (0 = root)
    pub start_node: u32,
    /// Tree depth
    pub resolution: u32,
    /// Node words in the buffer
    pub node_count: u32,
    pub _pad: u32,
}

/// What a consumer needs to bind the tree
#[derive(Clone, Copy, Debug)]
pub struct OctreeBinding<'a> {
    pub buffer: &'a wgpu::Buffer,
    /// Byte offset of the root octet
    pub offset: u64,
    /// Byte length of the node range
    pub size: u64,
    pub start_node: u32,
}

/// Node words uploaded to the GPU
pub struct OctreeBuffer {
    /// Storage buffer for octree nodes
    node_buffer: wgpu::Buffer,
    /// Uniform buffer for `OctreeParams`
    params_buffer: wgpu::Buffer,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
    params: OctreeParams,
}

impl OctreeBuffer {
    /// Upload `nodes` of a tree of depth `resolution`
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        nodes: &[u32],
        resolution: u32,
        start_node: u32,
    ) -> Result<Self> {
        if resolution == 0 || resolution > MAX_RESOLUTION {
            return Err(Error::InvalidResolution(resolution));
        }
        let size = (nodes.len() as u64) * 4;
        let Some(binding_size) = NonZeroU64::new(size) else {
            return Err(Error::Gpu("octree has no node words".to_string()));
        };
        let max_binding = device.limits().max_storage_buffer_binding_size as u64;
        if size > max_binding {
            return Err(Error::Capacity { required: size, available: max_binding });
        }

        let node_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("octree_nodes"),
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        queue.write_buffer(&node_buffer, 0, bytemuck::cast_slice(nodes));

        let params = OctreeParams {
            start_node,
            resolution,
            node_count: nodes.len() as u32,
            _pad: 0,
        };
        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("octree_params"),
            size: std::mem::size_of::<OctreeParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        queue.write_buffer(&params_buffer, 0, bytemuck::bytes_of(&params));

        let bind_group_layout = Self::create_bind_group_layout(device);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("octree_bind_group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &node_buffer,
                        offset: 0,
                        size: Some(binding_size),
                    }),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: params_buffer.as_entire_binding(),
                },
            ],
        });

        log::debug!("Uploaded {} octree nodes ({} bytes)", nodes.len(), size);

        Ok(Self {
            node_buffer,
            params_buffer,
            bind_group_layout,
            bind_group,
            params,
        })
    }

    /// Read-only node storage at binding 0, traversal uniforms at binding 1
    pub fn create_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("octree_bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(std::mem::size_of::<OctreeParams>() as u64),
                    },
                    count: None,
                },
            ],
        })
    }

    pub fn binding(&self) -> OctreeBinding<'_> {
        OctreeBinding {
            buffer: &self.node_buffer,
            offset: 0,
            size: self.node_buffer.size(),
            start_node: self.params.start_node,
        }
    }

    pub fn params(&self) -> OctreeParams {
        self.params
    }

    /// Change the octet traversal starts from
    pub fn set_start_node(&mut self, queue: &wgpu::Queue, start_node: u32) {
        self.params.start_node = start_node;
        queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&self.params));
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    /// Download the node words (blocks until the copy finished)
    pub fn read_back(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Vec<u32>> {
        let size = self.node_buffer.size();
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("octree_readback"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("octree_readback_encoder"),
        });
        encoder.copy_buffer_to_buffer(&self.node_buffer, 0, &staging, 0, size);
        queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device
            .poll(wgpu::PollType::Wait { submission_index: None, timeout: None })
            .map_err(|e| Error::Gpu(format!("poll failed: {:?}", e)))?;

        rx.recv()
            .map_err(|e| Error::Gpu(format!("readback channel closed: {}", e)))?
            .map_err(|e| Error::Gpu(format!("map failed: {}", e)))?;

        let data = slice.get_mapped_range();
        let nodes = bytemuck::cast_slice::<u8, u32>(&data).to_vec();
        drop(data);
        staging.unmap();
        Ok(nodes)
    }
}
