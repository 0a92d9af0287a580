//! Vertex format shared by the scene and the render pipeline

use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::mem;

/// A vertex already transformed into normalized device coordinates
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex {
    /// Position in NDC, `z` is depth in `[0, 1]`
    pub position: [f32; 3],
    /// Linear RGB color
    pub color: [f32; 3],
}

impl Vertex {
    /// Fills the unused tail of the vertex buffer
    ///
    /// Its depth lies beyond the far plane, so points, lines and triangles
    /// built from it are clipped away by the fixed-count draw.
    pub const PADDING: Self = Self::new([0.0, 0.0, 2.0], [0.0, 0.0, 0.0]);

    /// Create a vertex
    pub const fn new(position: [f32; 3], color: [f32; 3]) -> Self {
        Self { position, color }
    }

    /// Size of one vertex in bytes
    pub const fn stride() -> usize {
        mem::size_of::<Self>()
    }

    /// Binding description for the single interleaved vertex buffer
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::builder()
            .binding(0)
            .stride(Self::stride() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
            .build()
    }

    /// Attribute descriptions: location 0 = position, location 1 = color
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription::builder()
                .binding(0)
                .location(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(0)
                .build(),
            vk::VertexInputAttributeDescription::builder()
                .binding(0)
                .location(1)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(mem::size_of::<[f32; 3]>() as u32)
                .build(),
        ]
    }
}
