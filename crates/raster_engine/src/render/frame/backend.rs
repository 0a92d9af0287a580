//! The seam between the frame protocol and the GPU/window collaborators
//!
//! The orchestrator only knows slot indices and image indices. Whatever owns
//! the fences, semaphores, swapchain and pipeline sits behind this trait; the
//! Vulkan implementation is `render::vulkan::VulkanBackend`.

use crate::render::frame::FrameResult;
use crate::scene::Vertex;

/// Result of an operation on the presentation surface
///
/// `Stale` and `Suboptimal` are degradation signals, not errors: the frame
/// orchestrator consumes them and rebuilds. Driver failures travel on the
/// `Err` side of the surrounding `FrameResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceStatus<T> {
    /// The surface matches the window and device
    Ready(T),
    /// Still usable for this frame, but should be rebuilt soon
    Suboptimal(T),
    /// No longer matches the window or device; must be rebuilt before use
    Stale,
}

impl<T> SurfaceStatus<T> {
    /// Whether the surface asks to be rebuilt
    pub const fn is_degraded(&self) -> bool {
        !matches!(self, Self::Ready(_))
    }
}

/// Operations the frame orchestrator drives every frame
///
/// Slot indices are always `< frames_in_flight`; image indices are whatever
/// `acquire_image` handed out since the last `rebuild_surface`.
pub trait FrameBackend {
    /// Block until the in-flight fence of `slot` is signaled
    fn wait_slot_fence(&mut self, slot: usize) -> FrameResult<()>;

    /// Return the in-flight fence of `slot` to the unsignaled state
    fn reset_slot_fence(&mut self, slot: usize) -> FrameResult<()>;

    /// Acquire the next presentable image, signaling `slot`'s image-available semaphore
    fn acquire_image(&mut self, slot: usize) -> FrameResult<SurfaceStatus<u32>>;

    /// Submit the baked command buffer of `image`
    ///
    /// Waits on `slot`'s image-available semaphore at color-attachment output,
    /// signals `slot`'s render-finished semaphore and in-flight fence.
    fn submit(&mut self, slot: usize, image: u32) -> FrameResult<()>;

    /// Present `image` once `slot`'s render-finished semaphore is signaled
    fn present(&mut self, slot: usize, image: u32) -> FrameResult<SurfaceStatus<()>>;

    /// Block until every queue of the device is idle
    fn wait_device_idle(&mut self) -> FrameResult<()>;

    /// Current framebuffer size of the window in pixels
    fn window_extent(&mut self) -> (u32, u32);

    /// Block until the window system delivers events
    fn wait_window_events(&mut self);

    /// Read and clear the window's resize flag
    fn take_window_resized(&mut self) -> bool;

    /// Rebuild the presentation surface, then the render pipeline
    ///
    /// Returns the new presentable image count.
    fn rebuild_surface(&mut self) -> FrameResult<usize>;

    /// Number of presentable images in the current surface
    fn image_count(&self) -> usize;

    /// Copy `vertices` into the shared vertex buffer
    ///
    /// Callers guarantee no submitted frame still reads the buffer.
    fn upload_vertices(&mut self, vertices: &[Vertex]) -> FrameResult<()>;
}
