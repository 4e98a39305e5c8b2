//! The device seam.
//!
//! Everything above this module talks to the GPU exclusively through [`Device`]. Handles are
//! plain [`ash::vk`] handles so recorded state can be compared and logged regardless of which
//! implementation produced them.

use std::fmt::Debug;

use ash::vk;
use derivative::Derivative;

pub mod headless;
pub mod vulkan;

pub use headless::{HeadlessDevice, HeadlessSurface, Presentation, RecordedCommand, Submission};
pub use vulkan::{DeviceSettings, VulkanDevice};

/// Where memory of a resource lives
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MemoryLocation {
    /// Memory useful in device accessible memory
    GpuOnly,
    /// Memory useful for uploading data to the device
    CpuToGpu,
    /// Memory useful for read back of data
    GpuToCpu,
}

impl MemoryLocation {
    /// Whether the host can map the memory
    pub fn is_host_visible(&self) -> bool {
        !matches!(self, MemoryLocation::GpuOnly)
    }
}

impl From<MemoryLocation> for gpu_allocator::MemoryLocation {
    fn from(value: MemoryLocation) -> Self {
        match value {
            MemoryLocation::GpuOnly => gpu_allocator::MemoryLocation::GpuOnly,
            MemoryLocation::CpuToGpu => gpu_allocator::MemoryLocation::CpuToGpu,
            MemoryLocation::GpuToCpu => gpu_allocator::MemoryLocation::GpuToCpu,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BufferDesc<'a> {
    pub name: &'a str,
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub location: MemoryLocation,
}

#[derive(Debug, Clone)]
pub struct ImageDesc<'a> {
    pub name: &'a str,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub usage: vk::ImageUsageFlags,
}

#[derive(Debug, Clone, Copy)]
pub struct ImageViewDesc {
    pub image: vk::Image,
    pub format: vk::Format,
    pub aspect: vk::ImageAspectFlags,
    pub mip_levels: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub address_mode_u: vk::SamplerAddressMode,
    pub address_mode_v: vk::SamplerAddressMode,
    pub address_mode_w: vk::SamplerAddressMode,
    pub max_lod: f32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            address_mode_u: vk::SamplerAddressMode::REPEAT,
            address_mode_v: vk::SamplerAddressMode::REPEAT,
            address_mode_w: vk::SamplerAddressMode::REPEAT,
            max_lod: vk::LOD_CLAMP_NONE,
        }
    }
}

/// A layout transition of a whole image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrier {
    pub image: vk::Image,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub aspect: vk::ImageAspectFlags,
    pub base_mip_level: u32,
    pub level_count: u32,
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
}

impl ImageBarrier {
    /// Barrier covering every mip level, with stages and access masks derived from the layouts
    pub fn transition(
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> Self {
        let (src_stage, src_access) = Self::layout_scope(old_layout, false);
        let (dst_stage, dst_access) = Self::layout_scope(new_layout, true);
        Self {
            image,
            old_layout,
            new_layout,
            aspect,
            base_mip_level: 0,
            level_count: vk::REMAINING_MIP_LEVELS,
            src_stage,
            src_access,
            dst_stage,
            dst_access,
        }
    }

    /// Restrict the barrier to a mip range
    pub fn mips(mut self, base_mip_level: u32, level_count: u32) -> Self {
        self.base_mip_level = base_mip_level;
        self.level_count = level_count;
        self
    }

    /// Replace the source scope. Transitions out of `UNDEFINED` have none by default, which
    /// does not order them after earlier writes to the same memory or after a semaphore wait.
    pub fn after(
        mut self,
        src_stage: vk::PipelineStageFlags2,
        src_access: vk::AccessFlags2,
    ) -> Self {
        self.src_stage = src_stage;
        self.src_access = src_access;
        self
    }

    fn layout_scope(
        layout: vk::ImageLayout,
        destination: bool,
    ) -> (vk::PipelineStageFlags2, vk::AccessFlags2) {
        match layout {
            vk::ImageLayout::UNDEFINED => (
                vk::PipelineStageFlags2::TOP_OF_PIPE,
                vk::AccessFlags2::NONE,
            ),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL => (
                vk::PipelineStageFlags2::TRANSFER,
                vk::AccessFlags2::TRANSFER_WRITE,
            ),
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL => (
                vk::PipelineStageFlags2::TRANSFER,
                vk::AccessFlags2::TRANSFER_READ,
            ),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => (
                vk::PipelineStageFlags2::FRAGMENT_SHADER,
                vk::AccessFlags2::SHADER_SAMPLED_READ,
            ),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => (
                vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                vk::AccessFlags2::COLOR_ATTACHMENT_WRITE | vk::AccessFlags2::COLOR_ATTACHMENT_READ,
            ),
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
            | vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => (
                vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                    | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
                vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE
                    | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ,
            ),
            vk::ImageLayout::PRESENT_SRC_KHR => {
                if destination {
                    (
                        vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
                        vk::AccessFlags2::NONE,
                    )
                } else {
                    (
                        vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                        vk::AccessFlags2::NONE,
                    )
                }
            }
            _ => (
                vk::PipelineStageFlags2::ALL_COMMANDS,
                vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::MEMORY_READ,
            ),
        }
    }
}

/// Attachment used by dynamic rendering
#[derive(Derivative, Clone, Copy)]
#[derivative(Debug)]
pub struct AttachmentDesc {
    pub view: vk::ImageView,
    pub layout: vk::ImageLayout,
    #[derivative(Debug = "ignore")]
    pub clear: vk::ClearValue,
}

#[derive(Debug, Clone, Copy)]
pub struct RenderingDesc {
    pub extent: vk::Extent2D,
    pub color: AttachmentDesc,
    pub depth: Option<AttachmentDesc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub ty: vk::DescriptorType,
    pub count: u32,
    pub stages: vk::ShaderStageFlags,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DescriptorResource {
    Buffer {
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    },
    CombinedImageSampler {
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DescriptorWrite {
    pub binding: u32,
    pub ty: vk::DescriptorType,
    pub resource: DescriptorResource,
}

/// A semaphore wait or signal within a queue submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemaphoreOp {
    pub semaphore: vk::Semaphore,
    pub stage: vk::PipelineStageFlags2,
}

#[derive(Debug, Clone, Copy)]
pub struct SubmitDesc<'a> {
    pub command_buffers: &'a [vk::CommandBuffer],
    pub wait: &'a [SemaphoreOp],
    pub signal: &'a [SemaphoreOp],
    pub fence: vk::Fence,
}

/// Capabilities of the presentable surface
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

#[derive(Debug, Clone, Copy)]
pub struct SwapchainDesc {
    pub min_image_count: u32,
    pub format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    pub usage: vk::ImageUsageFlags,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub present_mode: vk::PresentModeKHR,
    pub old_swapchain: vk::SwapchainKHR,
}

/// Every GPU operation the renderer relies on.
///
/// Command recording functions mirror their Vulkan counterparts and never fail, errors surface
/// when the command buffer ends or is submitted.
pub trait Device: Debug + Send + Sync + 'static {
    // Memory
    fn create_buffer(&self, desc: &BufferDesc) -> crate::Result<vk::Buffer>;
    fn destroy_buffer(&self, buffer: vk::Buffer);
    /// Writes into host visible memory of a buffer
    fn write_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, data: &[u8])
    -> crate::Result<()>;
    /// Reads from host visible memory of a buffer
    fn read_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, out: &mut [u8])
    -> crate::Result<()>;
    fn create_image(&self, desc: &ImageDesc) -> crate::Result<vk::Image>;
    fn destroy_image(&self, image: vk::Image);
    fn create_image_view(&self, desc: &ImageViewDesc) -> crate::Result<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);
    fn create_sampler(&self, desc: &SamplerDesc) -> crate::Result<vk::Sampler>;
    fn destroy_sampler(&self, sampler: vk::Sampler);
    /// Whether the format can be used for the usage with optimal tiling
    fn supports_format(&self, format: vk::Format, features: vk::FormatFeatureFlags) -> bool;

    // Synchronization
    fn create_fence(&self, signaled: bool) -> crate::Result<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> crate::Result<()>;
    fn reset_fence(&self, fence: vk::Fence) -> crate::Result<()>;
    fn fence_status(&self, fence: vk::Fence) -> crate::Result<bool>;
    fn create_semaphore(&self) -> crate::Result<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    // Commands
    fn create_command_pool(&self, flags: vk::CommandPoolCreateFlags)
    -> crate::Result<vk::CommandPool>;
    fn destroy_command_pool(&self, pool: vk::CommandPool);
    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> crate::Result<Vec<vk::CommandBuffer>>;
    fn begin_command_buffer(
        &self,
        cmd: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> crate::Result<()>;
    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> crate::Result<()>;
    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> crate::Result<()>;
    fn cmd_copy_buffer(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[vk::BufferCopy],
    );
    fn cmd_copy_buffer_to_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        regions: &[vk::BufferImageCopy],
    );
    fn cmd_blit_image(
        &self,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        regions: &[vk::ImageBlit],
        filter: vk::Filter,
    );
    fn cmd_image_barrier(&self, cmd: vk::CommandBuffer, barrier: &ImageBarrier);
    fn cmd_begin_rendering(&self, cmd: vk::CommandBuffer, desc: &RenderingDesc);
    fn cmd_end_rendering(&self, cmd: vk::CommandBuffer);
    fn cmd_set_viewport_scissor(&self, cmd: vk::CommandBuffer, extent: vk::Extent2D);
    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline);
    fn cmd_bind_descriptor_set(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set_index: u32,
        set: vk::DescriptorSet,
    );
    fn cmd_push_constants(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    );
    fn cmd_bind_vertex_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer);
    fn cmd_bind_index_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer);
    fn cmd_draw_indexed(
        &self,
        cmd: vk::CommandBuffer,
        index_count: u32,
        first_index: u32,
        vertex_offset: i32,
    );
    fn queue_submit(&self, submit: &SubmitDesc) -> crate::Result<()>;
    fn device_wait_idle(&self) -> crate::Result<()>;

    // Descriptors
    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBinding],
    ) -> crate::Result<vk::DescriptorSetLayout>;
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);
    fn create_descriptor_pool(
        &self,
        sizes: &[vk::DescriptorPoolSize],
        max_sets: u32,
    ) -> crate::Result<vk::DescriptorPool>;
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);
    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> crate::Result<vk::DescriptorSet>;
    fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]);
    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constants: &[vk::PushConstantRange],
    ) -> crate::Result<vk::PipelineLayout>;
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);

    // Presentation
    fn surface_support(&self) -> crate::Result<SurfaceSupport>;
    fn create_swapchain(&self, desc: &SwapchainDesc) -> crate::Result<vk::SwapchainKHR>;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> crate::Result<Vec<vk::Image>>;
    /// Returns the acquired image index and whether the swapchain is suboptimal
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> crate::Result<(u32, bool)>;
    /// Returns whether the swapchain is suboptimal
    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> crate::Result<bool>;
}
