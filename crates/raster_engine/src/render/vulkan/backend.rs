//! Vulkan implementation of the frame backend

use ash::vk;

use crate::config::{EngineConfig, RendererConfig, ShaderConfig};
use crate::render::frame::{FrameBackend, FrameError, FrameResult, SurfaceStatus};
use crate::render::vulkan::buffer::VertexBuffer;
use crate::render::vulkan::pipeline::RenderPipeline;
use crate::render::vulkan::swapchain::Swapchain;
use crate::render::vulkan::sync::{FenceKey, FenceWait, SemaphoreKey, SyncPool};
use crate::render::vulkan::{VulkanContext, VulkanError};
use crate::render::window::{Window, WindowSurface};
use crate::scene::Vertex;

/// Owns every GPU and window resource the frame protocol drives
///
/// Fields drop top to bottom, the reverse of construction order.
pub struct VulkanBackend {
    pipeline: RenderPipeline,
    swapchain: Swapchain,
    vertex_buffer: VertexBuffer,
    sync: SyncPool,
    context: VulkanContext,
    window: Window,
    renderer: RendererConfig,
    shaders: ShaderConfig,
}

impl VulkanBackend {
    /// Open the window and build the full Vulkan stack
    ///
    /// Order: window, context, sync pool, vertex buffer, swapchain, pipeline.
    pub fn new(config: &EngineConfig) -> FrameResult<Self> {
        let renderer = config.renderer.clone();
        let shaders = config.shaders.clone();

        let window = Window::new(&config.window)?;
        let context = VulkanContext::new(&window, &renderer)?;
        let sync = SyncPool::for_frames(context.raw_device(), renderer.frames_in_flight)?;
        let vertex_buffer =
            VertexBuffer::new(&context, renderer.max_vertices as usize, renderer.fence_timeout_ns())
                .map_err(|e| timeout_or(e, "vertex upload", &renderer))?;
        let swapchain = Swapchain::build(&context, extent_of(&window), None)?;
        let pipeline = RenderPipeline::build(&context, &swapchain, &vertex_buffer, &shaders, &renderer)?;

        Ok(Self {
            pipeline,
            swapchain,
            vertex_buffer,
            sync,
            context,
            window,
            renderer,
            shaders,
        })
    }

    /// The window being presented to
    pub const fn window(&self) -> &Window {
        &self.window
    }

    /// Mutable access to the window, for polling events
    pub fn window_mut(&mut self) -> &mut Window {
        &mut self.window
    }

    /// Current swapchain
    pub const fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// Renderer settings the backend was built with
    pub const fn renderer_config(&self) -> &RendererConfig {
        &self.renderer
    }
}

fn extent_of(window: &impl WindowSurface) -> vk::Extent2D {
    let (width, height) = window.query_extent();
    vk::Extent2D { width, height }
}

/// Driver timeouts become `FrameError::Timeout`, everything else passes through
fn timeout_or(error: VulkanError, operation: &'static str, config: &RendererConfig) -> FrameError {
    match error {
        VulkanError::Api(vk::Result::TIMEOUT | vk::Result::NOT_READY) => FrameError::Timeout {
            operation,
            timeout_ms: config.fence_timeout_ms.unwrap_or(u64::MAX),
        },
        other => FrameError::Vulkan(other),
    }
}

impl FrameBackend for VulkanBackend {
    fn wait_slot_fence(&mut self, slot: usize) -> FrameResult<()> {
        let fence = self.sync.fence(FenceKey::InFlight, slot)?;
        match fence.wait(self.renderer.fence_timeout_ns())? {
            FenceWait::Signaled => Ok(()),
            FenceWait::TimedOut => Err(FrameError::Timeout {
                operation: "in-flight fence",
                timeout_ms: self.renderer.fence_timeout_ms.unwrap_or(u64::MAX),
            }),
        }
    }

    fn reset_slot_fence(&mut self, slot: usize) -> FrameResult<()> {
        self.sync.fence(FenceKey::InFlight, slot)?.reset()?;
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize) -> FrameResult<SurfaceStatus<u32>> {
        let semaphore = self.sync.semaphore(SemaphoreKey::ImageAvailable, slot)?.handle();
        self.swapchain
            .acquire_next_image(semaphore, self.renderer.fence_timeout_ns())
            .map_err(|e| timeout_or(e, "swapchain image", &self.renderer))
    }

    fn submit(&mut self, slot: usize, image: u32) -> FrameResult<()> {
        let wait_semaphores = [self.sync.semaphore(SemaphoreKey::ImageAvailable, slot)?.handle()];
        let signal_semaphores = [self.sync.semaphore(SemaphoreKey::RenderFinished, slot)?.handle()];
        let fence = self.sync.fence(FenceKey::InFlight, slot)?.handle();
        let command_buffers = [self.pipeline.command_buffer(image)?];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            self.context
                .device()
                .queue_submit(self.context.graphics_queue(), &[submit_info], fence)
                .map_err(VulkanError::Api)?;
        }
        Ok(())
    }

    fn present(&mut self, slot: usize, image: u32) -> FrameResult<SurfaceStatus<()>> {
        let wait_semaphore = self.sync.semaphore(SemaphoreKey::RenderFinished, slot)?.handle();
        Ok(self
            .swapchain
            .present(self.context.present_queue(), image, wait_semaphore)?)
    }

    fn wait_device_idle(&mut self) -> FrameResult<()> {
        Ok(self.context.wait_idle()?)
    }

    fn window_extent(&mut self) -> (u32, u32) {
        self.window.query_extent()
    }

    fn wait_window_events(&mut self) {
        self.window.wait_events();
    }

    fn take_window_resized(&mut self) -> bool {
        self.window.take_resized()
    }

    fn rebuild_surface(&mut self) -> FrameResult<usize> {
        let swapchain = Swapchain::build(&self.context, extent_of(&self.window), Some(&self.swapchain))?;
        self.swapchain = swapchain;

        self.pipeline.reconstruct(
            &self.context,
            &self.swapchain,
            &self.vertex_buffer,
            &self.shaders,
            &self.renderer,
        )?;

        Ok(self.swapchain.image_count())
    }

    fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    fn upload_vertices(&mut self, vertices: &[Vertex]) -> FrameResult<()> {
        self.vertex_buffer
            .upload(vertices)
            .map_err(|e| timeout_or(e, "vertex upload", &self.renderer))
    }
}
