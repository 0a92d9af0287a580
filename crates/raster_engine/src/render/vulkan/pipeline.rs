//! Render pipeline with one baked command buffer per presentable image
//!
//! Built against one swapchain and never patched. When the swapchain is
//! rebuilt the whole pipeline is rebuilt with it.

use ash::vk;

use crate::config::{RendererConfig, ShaderConfig};
use crate::render::vulkan::buffer::VertexBuffer;
use crate::render::vulkan::commands::{CommandPool, CommandRecorder};
use crate::render::vulkan::render_pass::{Framebuffer, RenderPass};
use crate::render::vulkan::shader::{GraphicsPipeline, ShaderModule};
use crate::render::vulkan::swapchain::Swapchain;
use crate::render::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// Everything the baked draws need, rebuilt as one unit
pub struct RenderPipeline {
    // Field order is drop order: buffers go with the pool, then framebuffers
    // and pipeline before the render pass they reference.
    command_buffers: Vec<vk::CommandBuffer>,
    command_pool: CommandPool,
    framebuffers: Vec<Framebuffer>,
    pipeline: GraphicsPipeline,
    render_pass: RenderPass,
    extent: vk::Extent2D,
}

impl RenderPipeline {
    /// Build the pipeline against `swapchain` and record every image's draw
    pub fn build(
        context: &VulkanContext,
        swapchain: &Swapchain,
        vertex_buffer: &VertexBuffer,
        shaders: &ShaderConfig,
        config: &RendererConfig,
    ) -> VulkanResult<Self> {
        let device = context.raw_device();
        let extent = swapchain.extent();

        let render_pass = RenderPass::new_color_pass(device.clone(), swapchain.format().format)?;

        let vertex_shader = ShaderModule::from_file(device.clone(), &shaders.vertex_shader_path)?;
        let fragment_shader = ShaderModule::from_file(device.clone(), &shaders.fragment_shader_path)?;
        let pipeline = GraphicsPipeline::new(
            device.clone(),
            render_pass.handle(),
            &vertex_shader,
            &fragment_shader,
            config.topology,
            extent,
        )?;

        let framebuffers = swapchain
            .image_views()
            .iter()
            .map(|&view| Framebuffer::new(device.clone(), render_pass.handle(), &[view], extent))
            .collect::<VulkanResult<Vec<_>>>()?;

        let command_pool = CommandPool::new(device.clone(), context.queue_families().graphics)?;
        let command_buffers = command_pool.allocate_command_buffers(framebuffers.len() as u32)?;

        let vertex_count = u32::try_from(vertex_buffer.capacity()).map_err(|_| VulkanError::InvalidOperation {
            reason: format!("Vertex capacity {} does not fit a draw call", vertex_buffer.capacity()),
        })?;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: config.clear_color,
            },
        }];
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };

        for (&command_buffer, framebuffer) in command_buffers.iter().zip(&framebuffers) {
            let mut recorder = CommandRecorder::new(command_buffer, device.clone());
            recorder.begin(vk::CommandBufferUsageFlags::empty())?;
            {
                let mut pass =
                    recorder.begin_render_pass(render_pass.handle(), framebuffer.handle(), render_area, &clear_values)?;
                pass.cmd_bind_pipeline(pipeline.handle());
                pass.cmd_bind_vertex_buffers(0, &[vertex_buffer.handle()], &[0]);
                pass.cmd_draw(vertex_count, 1, 0, 0);
            }
            recorder.end()?;
        }

        log::debug!(
            "Render pipeline built: {} command buffers drawing {} vertices at {}x{}",
            command_buffers.len(),
            vertex_count,
            extent.width,
            extent.height
        );

        Ok(Self {
            command_buffers,
            command_pool,
            framebuffers,
            pipeline,
            render_pass,
            extent,
        })
    }

    /// Rebuild against a new swapchain
    ///
    /// The device must be idle; the previous pipeline is released once the
    /// new one exists.
    pub fn reconstruct(
        &mut self,
        context: &VulkanContext,
        swapchain: &Swapchain,
        vertex_buffer: &VertexBuffer,
        shaders: &ShaderConfig,
        config: &RendererConfig,
    ) -> VulkanResult<()> {
        *self = Self::build(context, swapchain, vertex_buffer, shaders, config)?;
        Ok(())
    }

    /// Baked command buffer for presentable image `image`
    pub fn command_buffer(&self, image: u32) -> VulkanResult<vk::CommandBuffer> {
        self.command_buffers
            .get(image as usize)
            .copied()
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!(
                    "No command buffer for image {image} ({} recorded)",
                    self.command_buffers.len()
                ),
            })
    }

    /// Number of recorded command buffers
    pub fn image_count(&self) -> usize {
        self.command_buffers.len()
    }

    /// Extent the pipeline was built for
    pub const fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}
