use skein_assets::DescriptorBindingFlags;
use skein_gpu::ash::vk;
use skein_gpu::wsi::SwapchainSettings;

/// Controls the frame scheduler
#[derive(Debug, Clone, PartialEq)]
pub struct RendererSettings {
    /// Frames the CPU may record ahead of the GPU
    pub max_frames_in_flight: usize,
    /// Depth formats tried in order
    pub depth_formats: Vec<vk::Format>,
    pub clear_color: [f32; 4],
    /// Timeout of fence waits and image acquisition, in nanoseconds
    pub fence_timeout: u64,
    pub vsync: bool,
    pub swapchain: SwapchainSettings,
    /// Image bindings of the material set, must match the loaded scene graphs
    pub binding_flags: DescriptorBindingFlags,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            max_frames_in_flight: 2,
            depth_formats: vec![
                vk::Format::D32_SFLOAT_S8_UINT,
                vk::Format::D32_SFLOAT,
                vk::Format::D24_UNORM_S8_UINT,
                vk::Format::D16_UNORM,
            ],
            clear_color: [0.025, 0.025, 0.025, 1.0],
            fence_timeout: u64::MAX,
            vsync: true,
            swapchain: SwapchainSettings::default(),
            binding_flags: DescriptorBindingFlags::IMAGE_BASE_COLOR,
        }
    }
}

impl RendererSettings {
    pub fn max_frames_in_flight(mut self, frames: usize) -> Self {
        self.max_frames_in_flight = frames.max(1);
        self
    }

    pub fn request_depth_format(mut self, format: vk::Format) -> Self {
        self.depth_formats.insert(0, format);
        self
    }

    pub fn clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    pub fn fence_timeout(mut self, timeout: u64) -> Self {
        self.fence_timeout = timeout;
        self
    }

    pub fn vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    pub fn swapchain(mut self, settings: SwapchainSettings) -> Self {
        self.swapchain = settings;
        self
    }

    pub fn binding_flags(mut self, flags: DescriptorBindingFlags) -> Self {
        self.binding_flags = flags;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_double_buffer() {
        let settings = RendererSettings::default();
        assert_eq!(settings.max_frames_in_flight, 2);
        assert_eq!(settings.fence_timeout, u64::MAX);
        assert!(settings.vsync);
    }

    #[test]
    fn requested_depth_format_goes_first() {
        let settings = RendererSettings::default()
            .request_depth_format(vk::Format::D16_UNORM)
            .max_frames_in_flight(0);
        assert_eq!(settings.depth_formats[0], vk::Format::D16_UNORM);
        assert_eq!(settings.max_frames_in_flight, 1);
    }
}
