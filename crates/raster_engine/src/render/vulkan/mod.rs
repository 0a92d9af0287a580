//! Vulkan collaborators of the frame protocol
//!
//! The context, presentation surface, render pipeline, vertex buffer and sync
//! pool, plus `VulkanBackend`, which ties them to the frame orchestrator.

pub mod backend;
pub mod buffer;
pub mod commands;
pub mod context;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use backend::VulkanBackend;
pub use buffer::{Buffer, VertexBuffer};
pub use context::{LogicalDevice, PhysicalDeviceInfo, QueueFamilies, VulkanContext, VulkanError, VulkanInstance, VulkanResult};
pub use pipeline::RenderPipeline;
pub use swapchain::{select_configuration, SurfaceConfiguration, SurfaceSupport, Swapchain};
pub use sync::{Fence, FenceKey, Semaphore, SemaphoreKey, SyncError, SyncPool, SyncResult};
