//! Vulkan synchronization primitives for GPU/CPU coordination
//!
//! RAII wrappers for semaphores and fences plus the keyed pools that hand
//! them out per frame slot. Semaphores order GPU work against other GPU work
//! (acquire before render, render before present). Fences let the CPU wait
//! for a submission to retire.
//!
//! ```text
//! Queue A: [Work] -> Signal Semaphore ->
//! Queue B:          Wait Semaphore -> [Work]
//! ```

use ash::{vk, Device};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use thiserror::Error;

use crate::render::vulkan::{VulkanError, VulkanResult};

/// GPU-GPU synchronization primitive with automatic resource management
///
/// Signaled by one queue operation and waited on by another:
/// - Image acquisition signals, rendering waits
/// - Rendering signals, presentation waits
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new binary semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();

        let semaphore = unsafe { device.create_semaphore(&create_info, None).map_err(VulkanError::Api)? };

        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub const fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// How a bounded fence wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceWait {
    /// The fence is signaled
    Signaled,
    /// The timeout expired first
    TimedOut,
}

/// Fence wrapper with RAII cleanup
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);

        let fence = unsafe { device.create_fence(&create_info, None).map_err(VulkanError::Api)? };

        Ok(Self { device, fence })
    }

    /// Wait for the fence, `timeout` in nanoseconds (`u64::MAX` waits forever)
    pub fn wait(&self, timeout: u64) -> VulkanResult<FenceWait> {
        match unsafe { self.device.wait_for_fences(&[self.fence], true, timeout) } {
            Ok(()) => Ok(FenceWait::Signaled),
            Err(vk::Result::TIMEOUT) => Ok(FenceWait::TimedOut),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    /// Reset fence to unsignaled
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe { self.device.reset_fences(&[self.fence]).map_err(VulkanError::Api) }
    }

    /// Get the fence handle
    pub const fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Roles a fence plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FenceKey {
    /// Signaled when a frame slot's submission retires
    InFlight,
}

/// Roles a semaphore plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemaphoreKey {
    /// Signaled by image acquisition, waited on by the draw submission
    ImageAvailable,
    /// Signaled by the draw submission, waited on by presentation
    RenderFinished,
}

/// Synchronization pool errors
#[derive(Error, Debug)]
pub enum SyncError {
    /// Lookup under a key nothing was created for
    #[error("No sync primitives created under {0}")]
    KeyNotFound(String),

    /// Lookup past the end of a key's list
    #[error("Index {index} out of range for {key} ({len} created)")]
    IndexOutOfRange {
        /// Key looked up
        key: String,
        /// Requested index
        index: usize,
        /// Primitives created under the key
        len: usize,
    },

    /// Creating a primitive failed
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] VulkanError),
}

/// Result type for sync pool operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Ordered lists of primitives grouped by role
#[derive(Debug)]
pub struct KeyedPool<K, T> {
    entries: HashMap<K, Vec<T>>,
}

impl<K: Copy + Eq + Hash + fmt::Debug, T> KeyedPool<K, T> {
    /// Empty pool
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    /// Append primitives under `key`, keeping those already there
    pub fn extend(&mut self, key: K, items: impl IntoIterator<Item = T>) {
        self.entries.entry(key).or_default().extend(items);
    }

    /// The `index`-th primitive created under `key`
    pub fn get(&self, key: K, index: usize) -> SyncResult<&T> {
        let list = self
            .entries
            .get(&key)
            .ok_or_else(|| SyncError::KeyNotFound(format!("{key:?}")))?;

        list.get(index).ok_or_else(|| SyncError::IndexOutOfRange {
            key: format!("{key:?}"),
            index,
            len: list.len(),
        })
    }

}

impl<K: Copy + Eq + Hash + fmt::Debug, T> Default for KeyedPool<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Fences and semaphores for every frame slot
///
/// Created once at engine start; survives swapchain rebuilds.
pub struct SyncPool {
    device: Device,
    fences: KeyedPool<FenceKey, Fence>,
    semaphores: KeyedPool<SemaphoreKey, Semaphore>,
}

impl SyncPool {
    /// Empty pool for `device`
    pub fn new(device: Device) -> Self {
        Self {
            device,
            fences: KeyedPool::new(),
            semaphores: KeyedPool::new(),
        }
    }

    /// Pool with the standard per-slot set for `frames_in_flight` slots
    ///
    /// In-flight fences start signaled so the first wait on each slot returns
    /// immediately.
    pub fn for_frames(device: Device, frames_in_flight: usize) -> SyncResult<Self> {
        let mut pool = Self::new(device);
        pool.create_semaphores(SemaphoreKey::ImageAvailable, frames_in_flight)?;
        pool.create_semaphores(SemaphoreKey::RenderFinished, frames_in_flight)?;
        pool.create_fences(FenceKey::InFlight, frames_in_flight, true)?;
        log::debug!("Sync pool created for {} frame slots", frames_in_flight);
        Ok(pool)
    }

    /// Create `count` fences under `key`
    pub fn create_fences(&mut self, key: FenceKey, count: usize, signaled: bool) -> SyncResult<()> {
        let fences = (0..count)
            .map(|_| Fence::new(self.device.clone(), signaled))
            .collect::<VulkanResult<Vec<_>>>()?;
        self.fences.extend(key, fences);
        Ok(())
    }

    /// Create `count` semaphores under `key`
    pub fn create_semaphores(&mut self, key: SemaphoreKey, count: usize) -> SyncResult<()> {
        let semaphores = (0..count)
            .map(|_| Semaphore::new(self.device.clone()))
            .collect::<VulkanResult<Vec<_>>>()?;
        self.semaphores.extend(key, semaphores);
        Ok(())
    }

    /// The `index`-th fence under `key`
    pub fn fence(&self, key: FenceKey, index: usize) -> SyncResult<&Fence> {
        self.fences.get(key, index)
    }

    /// The `index`-th semaphore under `key`
    pub fn semaphore(&self, key: SemaphoreKey, index: usize) -> SyncResult<&Semaphore> {
        self.semaphores.get(key, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_key_and_index() {
        let mut pool = KeyedPool::new();
        pool.extend(SemaphoreKey::ImageAvailable, ["a0", "a1"]);
        pool.extend(SemaphoreKey::RenderFinished, ["r0", "r1"]);

        assert_eq!(*pool.get(SemaphoreKey::ImageAvailable, 1).unwrap(), "a1");
        assert_eq!(*pool.get(SemaphoreKey::RenderFinished, 0).unwrap(), "r0");
        assert!(pool.get(SemaphoreKey::ImageAvailable, 2).is_err());
    }

    #[test]
    fn test_missing_key() {
        let pool: KeyedPool<FenceKey, u32> = KeyedPool::new();
        let err = pool.get(FenceKey::InFlight, 0).unwrap_err();
        assert!(matches!(err, SyncError::KeyNotFound(ref key) if key == "InFlight"));
    }

    #[test]
    fn test_index_out_of_range() {
        let mut pool = KeyedPool::new();
        pool.extend(FenceKey::InFlight, [10, 11]);

        let err = pool.get(FenceKey::InFlight, 2).unwrap_err();
        assert!(matches!(err, SyncError::IndexOutOfRange { index: 2, len: 2, .. }));
        assert_eq!(err.to_string(), "Index 2 out of range for InFlight (2 created)");
    }

    #[test]
    fn test_extend_appends() {
        let mut pool = KeyedPool::new();
        pool.extend(SemaphoreKey::ImageAvailable, [0]);
        pool.extend(SemaphoreKey::ImageAvailable, [1, 2]);

        assert_eq!(*pool.get(SemaphoreKey::ImageAvailable, 0).unwrap(), 0);
        assert_eq!(*pool.get(SemaphoreKey::ImageAvailable, 2).unwrap(), 2);
        assert!(pool.get(SemaphoreKey::RenderFinished, 0).is_err());
    }
}
