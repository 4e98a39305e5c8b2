use std::fmt::Debug;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::GpuError;
use crate::device::{Device, ImageViewDesc, SurfaceSupport, SwapchainDesc};
use crate::traits::Destructible;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapchainSettings {
    /// Formats tried in order, the first one the surface supports wins
    pub preferred_formats: Vec<vk::Format>,
    pub color_space: vk::ColorSpaceKHR,
    /// Usage in addition to color attachment
    pub usage: vk::ImageUsageFlags,
}

impl Default for SwapchainSettings {
    fn default() -> Self {
        Self {
            preferred_formats: vec![
                vk::Format::B8G8R8A8_UNORM,
                vk::Format::R8G8B8A8_UNORM,
                vk::Format::A8B8G8R8_UNORM_PACK32,
            ],
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            usage: vk::ImageUsageFlags::TRANSFER_DST,
        }
    }
}

impl SwapchainSettings {
    pub fn request_image_format(mut self, format: vk::Format) -> Self {
        self.preferred_formats.insert(0, format);
        self
    }

    pub fn image_usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.usage |= usage;
        self
    }
}

/// A presentable image and its view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireResult {
    /// The semaphore will be signaled once the image is ready. A suboptimal image is still
    /// usable but the swapchain should be recreated after presenting it.
    Acquired { index: u32, suboptimal: bool },
    /// Nothing was acquired, the swapchain has to be recreated
    OutOfDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentResult {
    Presented,
    /// Presentation happened or was dropped, either way the swapchain has to be recreated
    OutOfDate,
}

/// Owns the swapchain and the views of its images
#[derive(Debug)]
pub struct SwapchainManager<D: Device> {
    device: Arc<D>,
    settings: SwapchainSettings,
    handle: vk::SwapchainKHR,
    images: Vec<SwapchainImage>,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
}

impl<D: Device> SwapchainManager<D> {
    /// No swapchain exists until [`SwapchainManager::create_or_recreate`] is called
    pub fn new(device: Arc<D>, settings: SwapchainSettings) -> Self {
        Self {
            device,
            settings,
            handle: vk::SwapchainKHR::null(),
            images: Vec::new(),
            format: vk::SurfaceFormatKHR::default(),
            present_mode: vk::PresentModeKHR::FIFO,
            extent: vk::Extent2D::default(),
        }
    }

    /// Finds first occurrence in an element in `a` in `b` and clones it
    fn find_first_occurrence<T: Clone + PartialEq + Debug>(a: &[T], b: &[T]) -> Option<T> {
        a.iter().find(|item| b.contains(item)).cloned()
    }

    /// First preferred format the surface supports, otherwise whatever the surface lists first
    pub fn select_format(
        available: &[vk::SurfaceFormatKHR],
        preferred: &[vk::Format],
        color_space: vk::ColorSpaceKHR,
    ) -> crate::Result<vk::SurfaceFormatKHR> {
        let available_formats: Vec<vk::Format> =
            available.iter().map(|format| format.format).collect();
        let first = available.first().copied().ok_or(GpuError::UnsupportedFormat)?;
        Ok(
            match Self::find_first_occurrence(preferred, &available_formats) {
                Some(format) => available
                    .iter()
                    .copied()
                    .find(|surface| surface.format == format && surface.color_space == color_space)
                    .or_else(|| available.iter().copied().find(|surface| surface.format == format))
                    .unwrap_or(first),
                None => first,
            },
        )
    }

    /// FIFO when vsync is requested, otherwise mailbox, then immediate, then FIFO
    pub fn select_present_mode(
        available: &[vk::PresentModeKHR],
        vsync: bool,
    ) -> vk::PresentModeKHR {
        if vsync {
            return vk::PresentModeKHR::FIFO;
        }
        Self::find_first_occurrence(
            &[vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE],
            available,
        )
        .unwrap_or(vk::PresentModeKHR::FIFO)
    }

    /// One more than the minimum, clamped to the maximum if there is one
    pub fn select_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
        let count = capabilities.min_image_count + 1;
        if capabilities.max_image_count > 0 {
            count.min(capabilities.max_image_count)
        } else {
            count
        }
    }

    /// Select a swapchain extent based on surface capabilities and requested extent
    pub fn select_extent(
        capabilities: &vk::SurfaceCapabilitiesKHR,
        requested: vk::Extent2D,
    ) -> vk::Extent2D {
        if capabilities.current_extent.width != u32::MAX {
            capabilities.current_extent
        } else {
            vk::Extent2D {
                width: requested.width.clamp(
                    capabilities.min_image_extent.width,
                    capabilities.max_image_extent.width,
                ),
                height: requested.height.clamp(
                    capabilities.min_image_extent.height,
                    capabilities.max_image_extent.height,
                ),
            }
        }
    }

    fn select_transform(capabilities: &vk::SurfaceCapabilitiesKHR) -> vk::SurfaceTransformFlagsKHR {
        if capabilities
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            capabilities.current_transform
        }
    }

    /// Creates the swapchain, or replaces the current one, returning the number of images.
    ///
    /// The previous swapchain is handed to the new one as its old swapchain, its views and handle
    /// are destroyed only once the replacement exists.
    pub fn create_or_recreate(
        &mut self,
        width: u32,
        height: u32,
        vsync: bool,
    ) -> crate::Result<u32> {
        let SurfaceSupport {
            capabilities,
            formats,
            present_modes,
        } = self.device.surface_support()?;
        let format = Self::select_format(
            &formats,
            &self.settings.preferred_formats,
            self.settings.color_space,
        )?;
        let present_mode = Self::select_present_mode(&present_modes, vsync);
        let extent = Self::select_extent(&capabilities, vk::Extent2D { width, height });
        let old_swapchain = self.handle;

        let handle = self.device.create_swapchain(&SwapchainDesc {
            min_image_count: Self::select_image_count(&capabilities),
            format,
            extent,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | self.settings.usage,
            pre_transform: Self::select_transform(&capabilities),
            present_mode,
            old_swapchain,
        })?;

        self.destroy_views();
        if old_swapchain != vk::SwapchainKHR::null() {
            self.device.destroy_swapchain(old_swapchain);
        }
        self.handle = handle;
        self.format = format;
        self.present_mode = present_mode;
        self.extent = extent;

        for (index, image) in self
            .device
            .swapchain_images(handle)?
            .into_iter()
            .enumerate()
        {
            let view = self.device.create_image_view(&ImageViewDesc {
                image,
                format: format.format,
                aspect: vk::ImageAspectFlags::COLOR,
                mip_levels: 1,
            })?;
            self.images.push(SwapchainImage {
                image,
                view,
                index: index as u32,
            });
        }

        if old_swapchain == vk::SwapchainKHR::null() {
            info!(
                width = extent.width,
                height = extent.height,
                images = self.images.len(),
                format = ?format.format,
                ?present_mode,
                "Created swapchain"
            );
        } else {
            debug!(
                width = extent.width,
                height = extent.height,
                images = self.images.len(),
                "Recreated swapchain"
            );
        }
        Ok(self.images.len() as u32)
    }

    /// Request the next presentable image, signaling `semaphore` when it is ready
    pub fn acquire_next(
        &self,
        semaphore: vk::Semaphore,
        timeout: u64,
    ) -> crate::Result<AcquireResult> {
        match self
            .device
            .acquire_next_image(self.handle, timeout, semaphore)
        {
            Ok((index, suboptimal)) => Ok(AcquireResult::Acquired { index, suboptimal }),
            Err(err) if err.is_out_of_date() => Ok(AcquireResult::OutOfDate),
            Err(err) => Err(err),
        }
    }

    /// Queue `index` for presentation once `wait` is signaled
    pub fn present(&self, index: u32, wait: vk::Semaphore) -> crate::Result<PresentResult> {
        match self.device.queue_present(self.handle, index, wait) {
            Ok(false) => Ok(PresentResult::Presented),
            Ok(true) => Ok(PresentResult::OutOfDate),
            Err(err) if err.is_out_of_date() => Ok(PresentResult::OutOfDate),
            Err(err) => Err(err),
        }
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    pub fn images(&self) -> &[SwapchainImage] {
        &self.images
    }

    pub fn image(&self, index: u32) -> Option<&SwapchainImage> {
        self.images.get(index as usize)
    }

    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn destroy_views(&mut self) {
        for image in self.images.drain(..) {
            self.device.destroy_image_view(image.view);
        }
    }
}

impl<D: Device> Destructible for SwapchainManager<D> {
    fn destroy(&mut self) {
        self.destroy_views();
        if self.handle != vk::SwapchainKHR::null() {
            self.device.destroy_swapchain(self.handle);
            self.handle = vk::SwapchainKHR::null();
        }
    }
}

impl<D: Device> Drop for SwapchainManager<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}
