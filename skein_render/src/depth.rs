use std::sync::Arc;

use skein_gpu::ash::vk;
use skein_gpu::device::{Device, ImageBarrier, ImageDesc};
use skein_gpu::resource::Image;
use skein_gpu::util::format;
use skein_gpu::GpuError;
use tracing::{debug, error};

/// Depth attachment sized to the swapchain, rebuilt whenever the swapchain is
#[derive(Debug)]
pub struct DepthTarget<D: Device> {
    image: Image<D>,
}

impl<D: Device> DepthTarget<D> {
    /// First format in `preferred` usable as a depth attachment
    pub fn select_format(device: &D, preferred: &[vk::Format]) -> skein_gpu::Result<vk::Format> {
        preferred
            .iter()
            .copied()
            .filter(|candidate| format::is_depth_format(*candidate))
            .find(|candidate| {
                device.supports_format(
                    *candidate,
                    vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                )
            })
            .ok_or_else(|| {
                error!(?preferred, "No depth format supported");
                GpuError::UnsupportedFormat
            })
    }

    pub fn new(
        device: Arc<D>,
        extent: vk::Extent2D,
        preferred: &[vk::Format],
    ) -> skein_gpu::Result<Self> {
        let depth_format = Self::select_format(&device, preferred)?;
        let image = Image::new(
            device,
            &ImageDesc {
                name: "depth target",
                format: depth_format,
                extent: vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                },
                mip_levels: 1,
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            },
            format::depth_aspect(depth_format),
        )?;
        debug!(
            width = extent.width,
            height = extent.height,
            format = ?depth_format,
            "Created depth target"
        );
        Ok(Self { image })
    }

    pub fn image(&self) -> &Image<D> {
        &self.image
    }

    pub fn format(&self) -> vk::Format {
        self.image.format()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }

    /// Contents never survive a frame, so the previous layout is discarded. The target is shared
    /// by every frame in flight, so the clear still waits on the previous frame's depth writes.
    pub fn layout_transition(&self) -> ImageBarrier {
        ImageBarrier::transition(
            self.image.handle(),
            self.image.aspect(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )
        .after(
            vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )
    }
}
