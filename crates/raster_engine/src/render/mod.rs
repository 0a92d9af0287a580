//! Rendering: the frame protocol, its Vulkan backend and the window

pub mod frame;
pub mod vulkan;
pub mod window;
