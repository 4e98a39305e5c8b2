use std::sync::Arc;

use ash::vk;
#[cfg(feature = "log-lifetimes")]
use tracing::trace;

use crate::device::{Device, ImageDesc, ImageViewDesc};
use crate::traits::Destructible;

/// Owned 2D [`vk::Image`] with a view over all of its mip levels
#[derive(Debug)]
pub struct Image<D: Device> {
    handle: vk::Image,
    view: vk::ImageView,
    format: vk::Format,
    extent: vk::Extent2D,
    mip_levels: u32,
    aspect: vk::ImageAspectFlags,
    device: Arc<D>,
}

impl<D: Device> Image<D> {
    pub fn new(
        device: Arc<D>,
        desc: &ImageDesc,
        aspect: vk::ImageAspectFlags,
    ) -> crate::Result<Self> {
        let handle = device.create_image(desc)?;
        let view = match device.create_image_view(&ImageViewDesc {
            image: handle,
            format: desc.format,
            aspect,
            mip_levels: desc.mip_levels,
        }) {
            Ok(view) => view,
            Err(err) => {
                device.destroy_image(handle);
                return Err(err);
            }
        };

        #[cfg(feature = "log-lifetimes")]
        trace!("Creating VkImage {:?} ({})", handle, desc.name);

        Ok(Self {
            handle,
            view,
            format: desc.format,
            extent: vk::Extent2D {
                width: desc.extent.width,
                height: desc.extent.height,
            },
            mip_levels: desc.mip_levels,
            aspect,
            device,
        })
    }

    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.aspect
    }
}

impl<D: Device> Destructible for Image<D> {
    fn destroy(&mut self) {
        if self.handle == vk::Image::null() {
            return;
        }
        #[cfg(feature = "log-lifetimes")]
        trace!("Destroying VkImage {:?}", self.handle);

        self.device.destroy_image_view(self.view);
        self.device.destroy_image(self.handle);
        self.view = vk::ImageView::null();
        self.handle = vk::Image::null();
    }
}

impl<D: Device> Drop for Image<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}
