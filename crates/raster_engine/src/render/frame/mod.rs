//! Frame orchestration: pacing, image bookkeeping and surface recovery
//!
//! One `draw_frame()` call runs the cycle
//!
//! ```text
//! Idle -> WaitSlot -> Acquire -> WaitImage -> Submit -> Present -> Idle
//!                        |                                  |
//!                        +------------> Adapt <-------------+
//! ```
//!
//! Frame slots (N of them) own one image-available semaphore, one
//! render-finished semaphore and one in-flight fence each. A slot is only
//! reused after its fence has been observed signaled, so at most N frames are
//! in flight. Presentable images (M of them) are handed out by the surface in
//! any order; `image_in_use[i]` remembers which slot's fence guards image `i`
//! so an image still being read by an earlier submission is never targeted
//! again before that submission retires.
//!
//! Adapt waits out minimized windows, idles the device, rebuilds surface and
//! pipeline and resets the image map. Frame slots survive a rebuild.

pub mod backend;

#[cfg(test)]
mod tests;

pub use backend::{FrameBackend, SurfaceStatus};

use crate::render::vulkan::{SyncError, VulkanError};
use crate::render::window::WindowError;
use crate::scene::Vertex;
use thiserror::Error;

/// Errors that escape `draw_frame()` and friends
///
/// Surface staleness and suboptimality never appear here; they are handled
/// inside the orchestrator.
#[derive(Error, Debug)]
pub enum FrameError {
    /// Synchronization pool misuse
    #[error("Sync pool error: {0}")]
    Sync(#[from] SyncError),

    /// A driver call failed (submission, allocation, rebuild)
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] VulkanError),

    /// A bounded wait expired
    #[error("Timed out after {timeout_ms} ms waiting for {operation}")]
    Timeout {
        /// What was being waited on
        operation: &'static str,
        /// Configured bound
        timeout_ms: u64,
    },

    /// The surface returned an image index outside the current chain
    #[error("Acquired image {image} but the surface has {count} images")]
    ImageOutOfRange {
        /// Index returned by the surface
        image: u32,
        /// Images in the current chain
        count: usize,
    },

    /// Window system failure
    #[error("Window error: {0}")]
    Window(#[from] WindowError),
}

/// Result type for frame operations
pub type FrameResult<T> = Result<T, FrameError>;

/// Where the orchestrator is in the per-frame cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Between frames
    Idle,
    /// Waiting for the current slot's fence
    WaitSlot,
    /// Acquiring a presentable image
    Acquire,
    /// Waiting for the previous user of the acquired image
    WaitImage,
    /// Submitting the image's command buffer
    Submit,
    /// Presenting the image
    Present,
    /// Rebuilding the surface and pipeline
    Adapt,
}

/// What a single `draw_frame()` call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was submitted and handed to the presentation engine
    Presented {
        /// Frame slot used
        slot: usize,
        /// Presentable image used
        image: u32,
        /// Whether an Adapt ran after presenting
        adapted: bool,
    },
    /// The surface was stale at acquire time; nothing was submitted and the
    /// surface has been rebuilt
    Skipped,
}

/// Running counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames that reached the present step
    pub frames_presented: u64,
    /// Frames abandoned at acquire time
    pub frames_skipped: u64,
    /// Completed rebuilds
    pub adapts: u64,
}

/// Drives the per-frame protocol over a [`FrameBackend`]
///
/// Exactly one thread may call into the orchestrator; it holds no locks.
pub struct FrameOrchestrator<B: FrameBackend> {
    backend: B,
    frames_in_flight: usize,
    current_slot: usize,
    image_in_use: Vec<Option<usize>>,
    resize_requested: bool,
    state: FrameState,
    stats: FrameStats,
}

impl<B: FrameBackend> FrameOrchestrator<B> {
    /// Create an orchestrator over a fully built backend
    ///
    /// `frames_in_flight` must match the number of slots the backend's sync
    /// pool was created with.
    pub fn new(backend: B, frames_in_flight: usize) -> Self {
        assert!(frames_in_flight > 0, "at least one frame slot is required");

        let image_count = backend.image_count();
        log::debug!(
            "FrameOrchestrator created with {} frame slots over {} images",
            frames_in_flight,
            image_count
        );

        Self {
            backend,
            frames_in_flight,
            current_slot: 0,
            image_in_use: vec![None; image_count],
            resize_requested: false,
            state: FrameState::Idle,
            stats: FrameStats::default(),
        }
    }

    /// Run one full frame cycle
    ///
    /// Returns `FrameOutcome::Skipped` when the surface was stale at acquire
    /// time. Every error is fatal for the frame and leaves the orchestrator in
    /// the state where it occurred.
    pub fn draw_frame(&mut self) -> FrameResult<FrameOutcome> {
        let slot = self.current_slot;

        self.enter(FrameState::WaitSlot);
        self.backend.wait_slot_fence(slot)?;

        self.enter(FrameState::Acquire);
        let (image, acquire_suboptimal) = match self.backend.acquire_image(slot)? {
            SurfaceStatus::Ready(image) => (image, false),
            SurfaceStatus::Suboptimal(image) => {
                log::warn!("Surface suboptimal at acquire (image {}), rebuilding after present", image);
                (image, true)
            }
            SurfaceStatus::Stale => {
                log::warn!("Surface stale at acquire, abandoning frame on slot {}", slot);
                self.adapt()?;
                self.stats.frames_skipped += 1;
                return Ok(FrameOutcome::Skipped);
            }
        };

        let image_index = image as usize;
        if image_index >= self.image_in_use.len() {
            return Err(FrameError::ImageOutOfRange {
                image,
                count: self.image_in_use.len(),
            });
        }

        self.enter(FrameState::WaitImage);
        if let Some(owner) = self.image_in_use[image_index] {
            log::trace!("Image {} still guarded by slot {}, waiting", image, owner);
            self.backend.wait_slot_fence(owner)?;
        }
        self.image_in_use[image_index] = Some(slot);

        self.backend.reset_slot_fence(slot)?;

        self.enter(FrameState::Submit);
        self.backend.submit(slot, image)?;

        self.enter(FrameState::Present);
        let presented = self.backend.present(slot, image)?;
        self.stats.frames_presented += 1;

        let resized = std::mem::take(&mut self.resize_requested) | self.backend.take_window_resized();
        let degraded = acquire_suboptimal || presented.is_degraded() || resized;
        if degraded {
            log::warn!(
                "Surface degraded after present (status {:?}, resized {}), adapting",
                presented,
                resized
            );
        }

        self.current_slot = (slot + 1) % self.frames_in_flight;
        log::trace!("Frame on slot {} presented image {}, next slot {}", slot, image, self.current_slot);

        if degraded {
            self.adapt()?;
        } else {
            self.enter(FrameState::Idle);
        }

        Ok(FrameOutcome::Presented {
            slot,
            image,
            adapted: degraded,
        })
    }

    /// Rebuild the surface and pipeline against the window's current size
    ///
    /// Blocks while the window has a zero-sized framebuffer (minimized) and
    /// until the device is idle. Frame slots and the current slot survive.
    pub fn adapt(&mut self) -> FrameResult<()> {
        self.enter(FrameState::Adapt);

        let (mut width, mut height) = self.backend.window_extent();
        while width == 0 || height == 0 {
            log::debug!("Window extent is {}x{}, waiting for events before rebuilding", width, height);
            self.backend.wait_window_events();
            (width, height) = self.backend.window_extent();
        }

        // The rebuild below reads the latest extent, which covers any pending resize.
        self.resize_requested = false;
        self.backend.take_window_resized();

        self.backend.wait_device_idle()?;

        let image_count = self.backend.rebuild_surface()?;
        self.image_in_use = vec![None; image_count];
        self.stats.adapts += 1;

        log::info!("Surface rebuilt at {}x{} with {} images", width, height, image_count);
        self.enter(FrameState::Idle);
        Ok(())
    }

    /// Flag that the window was resized; the next present triggers Adapt
    pub fn notify_resized(&mut self) {
        self.resize_requested = true;
    }

    /// Replace the contents of the shared vertex buffer
    ///
    /// Waits for every slot's fence first so no in-flight draw is still
    /// reading the buffer, then uploads. Must be called between frames from
    /// the thread that calls `draw_frame()`.
    pub fn update_vertices(&mut self, vertices: &[Vertex]) -> FrameResult<()> {
        for slot in 0..self.frames_in_flight {
            self.backend.wait_slot_fence(slot)?;
        }
        self.backend.upload_vertices(vertices)
    }

    /// Block until all outstanding GPU work is retired
    pub fn wait_idle(&mut self) -> FrameResult<()> {
        self.backend.wait_device_idle()
    }

    /// Slot the next frame will use
    pub const fn current_slot(&self) -> usize {
        self.current_slot
    }

    /// Number of frame slots
    pub const fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Which slot's fence guards each presentable image
    pub fn image_in_use(&self) -> &[Option<usize>] {
        &self.image_in_use
    }

    /// Current protocol state
    pub const fn state(&self) -> FrameState {
        self.state
    }

    /// Running counters
    pub const fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Shared access to the backend
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Exclusive access to the backend
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    fn enter(&mut self, state: FrameState) {
        self.state = state;
    }
}
