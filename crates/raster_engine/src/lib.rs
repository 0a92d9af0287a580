//! # Raster Engine
//!
//! A small real-time rasterization engine written in Rust on top of Vulkan.
//!
//! ## Features
//!
//! - **Frame pacing**: N frames in flight with fence/semaphore bookkeeping per slot
//! - **Swapchain lifecycle**: rebuilds the presentation surface on resize or staleness
//! - **Baked command buffers**: one pre-recorded draw per presentable image
//! - **Scene geometry**: points, triangles, wireframes and convex bodies seen through a camera
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use raster_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     raster_engine::foundation::logging::init();
//!
//!     let config = EngineConfig::default();
//!     let mut engine = Engine::new(&config)?;
//!
//!     while !engine.window().should_close() {
//!         engine.window_mut().poll_events();
//!         engine.draw_frame()?;
//!     }
//!
//!     engine.wait_idle()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod foundation;
pub mod render;
pub mod scene;

mod engine;

pub use engine::{Engine, EngineError, EngineResult};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        Engine, EngineError,
        config::{Config, ConfigError, EngineConfig, RendererConfig, ShaderConfig, Topology, WindowConfig},
        foundation::math::{Mat4, Point3, Vec3, Transform},
        render::frame::{FrameError, FrameOrchestrator, FrameOutcome, FrameResult, FrameStats},
        render::window::{Window, WindowSurface},
        scene::{Body, Camera, Drawable, Point, Scene, Triangle, Vertex, Wireframe},
    };
}
