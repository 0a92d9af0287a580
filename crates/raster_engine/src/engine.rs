//! Top-level engine: owns the frame orchestrator and, through it, every resource

use thiserror::Error;

use crate::config::{ConfigError, EngineConfig};
use crate::render::frame::{FrameError, FrameOrchestrator, FrameOutcome, FrameStats};
use crate::render::vulkan::VulkanBackend;
use crate::render::window::Window;
use crate::scene::Vertex;

/// Errors from building or driving the engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// The configuration was rejected before touching the GPU
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Resource construction or a frame failed
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// A window with a Vulkan renderer behind it
pub struct Engine {
    frames: FrameOrchestrator<VulkanBackend>,
}

impl Engine {
    /// Validate `config` and build window, device, surface and pipeline
    pub fn new(config: &EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        config.shaders.validate()?;

        let backend = VulkanBackend::new(config)?;
        let frames = FrameOrchestrator::new(backend, config.renderer.frames_in_flight);

        log::info!(
            "Engine ready: {} frames in flight, {} vertices of {:?}",
            config.renderer.frames_in_flight,
            config.renderer.max_vertices,
            config.renderer.topology
        );

        Ok(Self { frames })
    }

    /// Draw and present one frame
    pub fn draw_frame(&mut self) -> EngineResult<FrameOutcome> {
        Ok(self.frames.draw_frame()?)
    }

    /// Replace what every subsequent frame draws
    pub fn update_vertices(&mut self, vertices: &[Vertex]) -> EngineResult<()> {
        Ok(self.frames.update_vertices(vertices)?)
    }

    /// Block until the GPU has retired all submitted work
    pub fn wait_idle(&mut self) -> EngineResult<()> {
        Ok(self.frames.wait_idle()?)
    }

    /// Force a surface rebuild after the next present
    pub fn notify_resized(&mut self) {
        self.frames.notify_resized();
    }

    /// The window being presented to
    pub fn window(&self) -> &Window {
        self.frames.backend().window()
    }

    /// Mutable window access, for polling events
    pub fn window_mut(&mut self) -> &mut Window {
        self.frames.backend_mut().window_mut()
    }

    /// Running frame counters
    pub const fn stats(&self) -> FrameStats {
        self.frames.stats()
    }

    /// The orchestrator driving the frames
    pub const fn frames(&self) -> &FrameOrchestrator<VulkanBackend> {
        &self.frames
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.frames.wait_idle() {
            log::error!("Failed to idle the device on shutdown: {}", e);
        }
    }
}
