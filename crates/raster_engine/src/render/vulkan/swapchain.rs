//! Presentation surface: configuration selection and the swapchain image chain

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use crate::render::frame::SurfaceStatus;
use crate::render::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// Capabilities the device reports for the window surface
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    /// Image count, extent bounds, current extent and transform
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported format/color-space pairs in driver order
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// Query the context's surface on its physical device
    pub fn query(context: &VulkanContext) -> VulkanResult<Self> {
        let physical_device = context.physical_device().device;
        let surface = context.surface();
        let loader = context.surface_loader();

        unsafe {
            Ok(Self {
                capabilities: loader
                    .get_physical_device_surface_capabilities(physical_device, surface)
                    .map_err(VulkanError::Api)?,
                formats: loader
                    .get_physical_device_surface_formats(physical_device, surface)
                    .map_err(VulkanError::Api)?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(physical_device, surface)
                    .map_err(VulkanError::Api)?,
            })
        }
    }
}

/// Everything chosen for one swapchain; replaced wholesale on rebuild
#[derive(Debug, Clone, Copy)]
pub struct SurfaceConfiguration {
    /// Pixel format and color space
    pub format: vk::SurfaceFormatKHR,
    /// Presentation mode
    pub present_mode: vk::PresentModeKHR,
    /// Image size in pixels
    pub extent: vk::Extent2D,
    /// Requested minimum image count
    pub image_count: u32,
    /// Pre-transform applied by the presentation engine
    pub transform: vk::SurfaceTransformFlagsKHR,
}

impl PartialEq for SurfaceConfiguration {
    fn eq(&self, other: &Self) -> bool {
        self.format.format == other.format.format
            && self.format.color_space == other.format.color_space
            && self.present_mode == other.present_mode
            && self.extent.width == other.extent.width
            && self.extent.height == other.extent.height
            && self.image_count == other.image_count
            && self.transform == other.transform
    }
}

impl Eq for SurfaceConfiguration {}

/// Pick format, present mode, extent and image count for a surface
///
/// Prefers `B8G8R8A8_SRGB` with non-linear sRGB, else the first reported
/// format. Prefers `MAILBOX`, else `FIFO`. Requests one image more than the
/// minimum, clamped to a nonzero maximum. Uses the reported current extent
/// unless its width is `u32::MAX`, in which case the window extent is clamped
/// into the supported bounds.
pub fn select_configuration(support: &SurfaceSupport, window_extent: vk::Extent2D) -> VulkanResult<SurfaceConfiguration> {
    let caps = &support.capabilities;

    let format = support
        .formats
        .iter()
        .copied()
        .find(|sf| sf.format == vk::Format::B8G8R8A8_SRGB && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| support.formats.first().copied())
        .ok_or_else(|| VulkanError::InvalidOperation {
            reason: "Surface reports no formats".to_string(),
        })?;

    let present_mode = support
        .present_modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO);

    let extent = if caps.current_extent.width == u32::MAX {
        vk::Extent2D {
            width: window_extent
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: window_extent
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    } else {
        caps.current_extent
    };

    let preferred = caps.min_image_count + 1;
    let image_count = if caps.max_image_count > 0 {
        preferred.min(caps.max_image_count)
    } else {
        preferred
    };

    Ok(SurfaceConfiguration {
        format,
        present_mode,
        extent,
        image_count,
        transform: caps.current_transform,
    })
}

/// Swapchain management wrapper with RAII cleanup
pub struct Swapchain {
    device: Device,
    swapchain_loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    config: SurfaceConfiguration,
}

impl Swapchain {
    /// Build a swapchain for the window's current extent
    ///
    /// Passing the retired chain as `old` lets the driver hand its resources
    /// over; the caller drops `old` after this returns.
    pub fn build(context: &VulkanContext, window_extent: vk::Extent2D, old: Option<&Self>) -> VulkanResult<Self> {
        let support = SurfaceSupport::query(context)?;
        let config = select_configuration(&support, window_extent)?;
        let device = context.raw_device();
        let swapchain_loader = context.swapchain_loader().clone();

        let families = context.queue_families();
        let family_indices = [families.graphics, families.present];
        let (sharing_mode, shared_families): (_, &[u32]) = if families.graphics == families.present {
            (vk::SharingMode::EXCLUSIVE, &[])
        } else {
            (vk::SharingMode::CONCURRENT, &family_indices)
        };

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(context.surface())
            .min_image_count(config.image_count)
            .image_format(config.format.format)
            .image_color_space(config.format.color_space)
            .image_extent(config.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(shared_families)
            .pre_transform(config.transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(config.present_mode)
            .clipped(true)
            .old_swapchain(old.map_or(vk::SwapchainKHR::null(), Self::handle));

        let swapchain = unsafe {
            swapchain_loader
                .create_swapchain(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        let images = match unsafe { swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(VulkanError::Api(e));
            }
        };

        // Partially built chains clean up through Drop
        let mut chain = Self {
            device,
            swapchain_loader,
            swapchain,
            images: Vec::new(),
            image_views: Vec::with_capacity(images.len()),
            config,
        };

        for &image in &images {
            let create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(config.format.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            let view = unsafe {
                chain
                    .device
                    .create_image_view(&create_info, None)
                    .map_err(VulkanError::Api)?
            };
            chain.image_views.push(view);
        }
        chain.images = images;

        log::info!(
            "Swapchain {} with {} images: {:?} {:?}, {:?}, {}x{}",
            if old.is_some() { "rebuilt" } else { "built" },
            chain.images.len(),
            config.format.format,
            config.format.color_space,
            config.present_mode,
            config.extent.width,
            config.extent.height
        );

        Ok(chain)
    }

    /// Acquire the next image, signaling `semaphore` when it is ready
    ///
    /// `timeout` is in nanoseconds; expiry comes back as
    /// `VulkanError::Api(vk::Result::TIMEOUT)` or `NOT_READY`.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore, timeout: u64) -> VulkanResult<SurfaceStatus<u32>> {
        let result = unsafe {
            self.swapchain_loader
                .acquire_next_image(self.swapchain, timeout, semaphore, vk::Fence::null())
        };

        match result {
            Ok((index, false)) => Ok(SurfaceStatus::Ready(index)),
            Ok((index, true)) => Ok(SurfaceStatus::Suboptimal(index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SurfaceStatus::Stale),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    /// Queue `image_index` for presentation once `wait_semaphore` is signaled
    pub fn present(&self, queue: vk::Queue, image_index: u32, wait_semaphore: vk::Semaphore) -> VulkanResult<SurfaceStatus<()>> {
        let wait_semaphores = [wait_semaphore];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.swapchain_loader.queue_present(queue, &present_info) } {
            Ok(false) => Ok(SurfaceStatus::Ready(())),
            Ok(true) => Ok(SurfaceStatus::Suboptimal(())),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SurfaceStatus::Stale),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    /// Configuration this chain was built with
    pub const fn config(&self) -> &SurfaceConfiguration {
        &self.config
    }

    /// Get swapchain extent
    pub const fn extent(&self) -> vk::Extent2D {
        self.config.extent
    }

    /// Get surface format
    pub const fn format(&self) -> vk::SurfaceFormatKHR {
        self.config.format
    }

    /// Get image views
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Get swapchain handle
    pub const fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Number of images the driver actually created
    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &image_view in &self.image_views {
                self.device.destroy_image_view(image_view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn srgb(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    fn support(min: u32, max: u32) -> SurfaceSupport {
        SurfaceSupport {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: min,
                max_image_count: max,
                current_extent: vk::Extent2D { width: 1280, height: 720 },
                min_image_extent: vk::Extent2D { width: 1, height: 1 },
                max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                ..Default::default()
            },
            formats: vec![srgb(vk::Format::R8G8B8A8_UNORM), srgb(vk::Format::B8G8R8A8_SRGB)],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        }
    }

    const WINDOW: vk::Extent2D = vk::Extent2D { width: 800, height: 600 };

    #[test]
    fn test_image_count_unbounded_max() {
        let config = select_configuration(&support(2, 0), WINDOW).unwrap();
        assert_eq!(config.image_count, 3);
    }

    #[test]
    fn test_image_count_clamped_to_max() {
        let config = select_configuration(&support(2, 2), WINDOW).unwrap();
        assert_eq!(config.image_count, 2);

        let config = select_configuration(&support(2, 8), WINDOW).unwrap();
        assert_eq!(config.image_count, 3);
    }

    #[test]
    fn test_prefers_srgb_and_mailbox() {
        let config = select_configuration(&support(2, 0), WINDOW).unwrap();
        assert_eq!(config.format.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(config.format.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        assert_eq!(config.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!(config.transform, vk::SurfaceTransformFlagsKHR::IDENTITY);
    }

    #[test]
    fn test_falls_back_to_first_format_and_fifo() {
        let mut support = support(2, 0);
        support.formats = vec![
            srgb(vk::Format::R8G8B8A8_UNORM),
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT,
            },
        ];
        support.present_modes = vec![vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO];

        let config = select_configuration(&support, WINDOW).unwrap();
        assert_eq!(config.format.format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(config.present_mode, vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_selection_is_deterministic() {
        let support = support(3, 0);
        let first = select_configuration(&support, WINDOW).unwrap();
        let second = select_configuration(&support, WINDOW).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_current_extent_wins_when_defined() {
        let config = select_configuration(&support(2, 0), WINDOW).unwrap();
        assert_eq!((config.extent.width, config.extent.height), (1280, 720));
    }

    #[test]
    fn test_undefined_extent_clamps_window() {
        let mut support = support(2, 0);
        support.capabilities.current_extent = vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        };
        support.capabilities.min_image_extent = vk::Extent2D { width: 100, height: 100 };
        support.capabilities.max_image_extent = vk::Extent2D { width: 1024, height: 512 };

        let config = select_configuration(&support, WINDOW).unwrap();
        assert_eq!((config.extent.width, config.extent.height), (800, 512));

        let config = select_configuration(&support, vk::Extent2D { width: 10, height: 300 }).unwrap();
        assert_eq!((config.extent.width, config.extent.height), (100, 300));
    }

    #[test]
    fn test_no_formats_is_error() {
        let mut support = support(2, 0);
        support.formats.clear();
        assert!(matches!(
            select_configuration(&support, WINDOW),
            Err(VulkanError::InvalidOperation { .. })
        ));
    }
}
