// Vertex data and vertex buffers
//
// Vertices arrive as an interleaved float list (x, y, r, g, b) and are
// uploaded once into host-visible memory.

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use std::mem::{offset_of, size_of};
use std::sync::Arc;

use super::Device;
use crate::error::{EngineError, VkResultExt};

const FLOATS_PER_VERTEX: usize = 5;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec2,
    pub colour: Vec3,
}

impl Vertex {
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Vertex, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, colour) as u32,
            },
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VertexData {
    pub vertices: Vec<Vertex>,
}

impl VertexData {
    pub fn from_interleaved(floats: &[f32]) -> Result<Self> {
        if floats.is_empty() || floats.len() % FLOATS_PER_VERTEX != 0 {
            anyhow::bail!(
                "Vertex list of {} floats is not a non-empty multiple of {} (x, y, r, g, b)",
                floats.len(),
                FLOATS_PER_VERTEX
            );
        }

        let vertices = floats
            .chunks_exact(FLOATS_PER_VERTEX)
            .map(|v| Vertex {
                position: Vec2::new(v[0], v[1]),
                colour: Vec3::new(v[2], v[3], v[4]),
            })
            .collect();

        Ok(Self { vertices })
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    pub fn size(&self) -> vk::DeviceSize {
        (self.vertices.len() * size_of::<Vertex>()) as vk::DeviceSize
    }
}

/// Find a memory type allowed by `type_filter` that has all of `properties`.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..memory_properties.memory_type_count).find(|&i| {
        type_filter & (1 << i) != 0
            && memory_properties.memory_types[i as usize]
                .property_flags
                .contains(properties)
    })
}

pub struct VertexBuffer {
    pub buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    pub vertex_count: u32,
    device: Arc<Device>,
}

impl VertexBuffer {
    pub fn new(device: Arc<Device>, data: &VertexData) -> Result<Self> {
        let size = data.size();

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(vk::BufferUsageFlags::VERTEX_BUFFER)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.device.create_buffer(&buffer_info, None) }
            .engine_context("Failed to create vertex buffer")?;

        // From here on `Drop` cleans up whatever was created
        let mut vertex_buffer = Self {
            buffer,
            memory: vk::DeviceMemory::null(),
            vertex_count: data.vertex_count(),
            device,
        };
        vertex_buffer.allocate_and_upload(data)?;

        log::debug!(
            "Vertex buffer: {} vertices, {} bytes",
            vertex_buffer.vertex_count,
            size
        );
        Ok(vertex_buffer)
    }

    fn allocate_and_upload(&mut self, data: &VertexData) -> Result<()> {
        let device = &self.device.device;
        let requirements = unsafe { device.get_buffer_memory_requirements(self.buffer) };

        let memory_type_index = find_memory_type(
            &self.device.memory_properties,
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .ok_or_else(|| anyhow::Error::new(EngineError::OutOfMemory))
        .context("Failed to find valid memory type for vertex buffer")?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        self.memory = unsafe { device.allocate_memory(&alloc_info, None) }
            .engine_context("Failed to allocate memory for vertex buffer")?;

        unsafe { device.bind_buffer_memory(self.buffer, self.memory, 0) }
            .engine_context("Unable to bind vertex buffer to memory")?;

        let bytes: &[u8] = bytemuck::cast_slice(&data.vertices);
        unsafe {
            let ptr = device
                .map_memory(self.memory, 0, data.size(), vk::MemoryMapFlags::empty())
                .engine_context("Failed to map vertex buffer memory")? as *mut u8;
            ptr.copy_from_nonoverlapping(bytes.as_ptr(), bytes.len());
            device.unmap_memory(self.memory);
        }

        Ok(())
    }
}

impl Drop for VertexBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_buffer(self.buffer, None);
            if self.memory != vk::DeviceMemory::null() {
                self.device.device.free_memory(self.memory, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_interleaved_triangle() {
        let data = VertexData::from_interleaved(&[
            0.0, -0.5, 1.0, 0.0, 0.0, //
            0.5, 0.5, 0.0, 1.0, 0.0, //
            -0.5, 0.5, 0.0, 0.0, 1.0,
        ])
        .unwrap();

        assert_eq!(data.vertex_count(), 3);
        assert_eq!(data.vertices[1].position, Vec2::new(0.5, 0.5));
        assert_eq!(data.vertices[2].colour, Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(data.size(), 60);
    }

    #[test]
    fn rejects_partial_vertices() {
        assert!(VertexData::from_interleaved(&[0.0, 0.0, 1.0, 1.0]).is_err());
        assert!(VertexData::from_interleaved(&[]).is_err());
    }

    #[test]
    fn layout_is_tightly_interleaved() {
        let binding = Vertex::binding_description();
        assert_eq!(binding.stride, 20);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);

        let [position, colour] = Vertex::attribute_descriptions();
        assert_eq!((position.location, position.offset), (0, 0));
        assert_eq!(position.format, vk::Format::R32G32_SFLOAT);
        assert_eq!((colour.location, colour.offset), (1, 8));
        assert_eq!(colour.format, vk::Format::R32G32B32_SFLOAT);
    }

    #[test]
    fn memory_type_honours_filter_and_flags() {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 3,
            ..Default::default()
        };
        props.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        props.memory_types[1].property_flags =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        props.memory_types[2].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE
            | vk::MemoryPropertyFlags::HOST_COHERENT
            | vk::MemoryPropertyFlags::HOST_CACHED;

        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        assert_eq!(find_memory_type(&props, 0b111, host), Some(1));
        assert_eq!(find_memory_type(&props, 0b101, host), Some(2));
        assert_eq!(find_memory_type(&props, 0b001, host), None);
        // Types past memory_type_count are never considered
        assert_eq!(find_memory_type(&props, 0b1000, vk::MemoryPropertyFlags::empty()), None);
    }
}
