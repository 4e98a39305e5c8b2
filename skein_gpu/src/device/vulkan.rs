use std::collections::HashMap;
use std::ffi::{CStr, CString, c_char, c_void};
use std::sync::{Mutex, MutexGuard};

use ash::vk;
use ash::vk::Handle;
use derivative::Derivative;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, error, info, trace, warn};

use super::*;
use crate::GpuError;

/// Instance and device creation settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSettings {
    pub name: String,
    pub engine_name: String,
    /// Enables `VK_LAYER_KHRONOS_validation` and routes its messages into tracing
    pub enable_validation: bool,
    /// Prefer an integrated GPU over a discrete one
    pub prefer_integrated: bool,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            name: String::from("skein"),
            engine_name: String::from("skein"),
            enable_validation: cfg!(debug_assertions),
            prefer_integrated: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum AllocationKey {
    Buffer(u64),
    Image(u64),
}

/// A Vulkan 1.3 device with a single graphics and present queue, dynamic rendering and
/// synchronization2 enabled.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct VulkanDevice {
    #[derivative(Debug = "ignore")]
    entry: ash::Entry,
    #[derivative(Debug = "ignore")]
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    #[derivative(Debug = "ignore")]
    device: ash::Device,
    queue_family: u32,
    queue: Mutex<vk::Queue>,
    #[derivative(Debug = "ignore")]
    surface_ext: ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    #[derivative(Debug = "ignore")]
    swapchain_ext: ash::khr::swapchain::Device,
    #[derivative(Debug = "ignore")]
    debug_messenger: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    #[derivative(Debug = "ignore")]
    allocator: Mutex<Option<Allocator>>,
    #[derivative(Debug = "ignore")]
    allocations: Mutex<HashMap<AllocationKey, Allocation>>,
}

impl VulkanDevice {
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(
        settings: &DeviceSettings,
        window: &W,
    ) -> crate::Result<Self> {
        let display_handle = window
            .display_handle()
            .map_err(|_| GpuError::NoSurface)?
            .as_raw();
        let window_handle = window
            .window_handle()
            .map_err(|_| GpuError::NoSurface)?
            .as_raw();

        let entry = unsafe { ash::Entry::load() }.map_err(|err| {
            error!("Failed to load the Vulkan loader: {err}");
            GpuError::Vk(vk::Result::ERROR_INITIALIZATION_FAILED)
        })?;

        let application_name = CString::new(settings.name.clone())?;
        let engine_name = CString::new(settings.engine_name.clone())?;
        let application_info = vk::ApplicationInfo::default()
            .application_name(&application_name)
            .engine_name(&engine_name)
            .api_version(vk::API_VERSION_1_3);

        let mut extensions: Vec<*const c_char> =
            ash_window::enumerate_required_extensions(display_handle)?.to_vec();
        let mut layers: Vec<*const c_char> = Vec::new();
        if settings.enable_validation {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
            layers.push(c"VK_LAYER_KHRONOS_validation".as_ptr());
        }
        let instance_ci = vk::InstanceCreateInfo::default()
            .application_info(&application_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);
        let instance = unsafe { entry.create_instance(&instance_ci, None)? };

        let debug_messenger = if settings.enable_validation {
            let ext = ash::ext::debug_utils::Instance::new(&entry, &instance);
            let messenger_ci = vk::DebugUtilsMessengerCreateInfoEXT::default()
                .message_severity(
                    vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                        | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                        | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                        | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                )
                .message_type(
                    vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                )
                .pfn_user_callback(Some(vk_debug_callback));
            let handle = unsafe { ext.create_debug_utils_messenger(&messenger_ci, None)? };
            Some((ext, handle))
        } else {
            None
        };

        let surface_ext = ash::khr::surface::Instance::new(&entry, &instance);
        let surface = unsafe {
            ash_window::create_surface(&entry, &instance, display_handle, window_handle, None)?
        };

        let (physical_device, queue_family) =
            Self::select_physical_device(&instance, &surface_ext, surface, settings)?;

        let priorities = [1.0f32];
        let queue_ci = vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family)
            .queue_priorities(&priorities);
        let device_extensions = [ash::khr::swapchain::NAME.as_ptr()];
        let mut features13 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);
        let device_ci = vk::DeviceCreateInfo::default()
            .queue_create_infos(std::slice::from_ref(&queue_ci))
            .enabled_extension_names(&device_extensions)
            .push_next(&mut features13);
        let device = unsafe { instance.create_device(physical_device, &device_ci, None)? };
        let queue = unsafe { device.get_device_queue(queue_family, 0) };
        let swapchain_ext = ash::khr::swapchain::Device::new(&instance, &device);

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        Ok(Self {
            entry,
            instance,
            physical_device,
            device,
            queue_family,
            queue: Mutex::new(queue),
            surface_ext,
            surface,
            swapchain_ext,
            debug_messenger,
            allocator: Mutex::new(Some(allocator)),
            allocations: Mutex::new(HashMap::new()),
        })
    }

    /// Picks the first device that is Vulkan 1.3 capable and can present to the surface, ordered
    /// by device type preference
    fn select_physical_device(
        instance: &ash::Instance,
        surface_ext: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
        settings: &DeviceSettings,
    ) -> crate::Result<(vk::PhysicalDevice, u32)> {
        let preference = if settings.prefer_integrated {
            [
                vk::PhysicalDeviceType::INTEGRATED_GPU,
                vk::PhysicalDeviceType::DISCRETE_GPU,
                vk::PhysicalDeviceType::VIRTUAL_GPU,
                vk::PhysicalDeviceType::CPU,
            ]
        } else {
            [
                vk::PhysicalDeviceType::DISCRETE_GPU,
                vk::PhysicalDeviceType::INTEGRATED_GPU,
                vk::PhysicalDeviceType::VIRTUAL_GPU,
                vk::PhysicalDeviceType::CPU,
            ]
        };
        let mut candidates = Vec::new();
        for physical_device in unsafe { instance.enumerate_physical_devices()? } {
            let properties = unsafe { instance.get_physical_device_properties(physical_device) };
            if properties.api_version < vk::API_VERSION_1_3 {
                continue;
            }
            let families = unsafe {
                instance.get_physical_device_queue_family_properties(physical_device)
            };
            for (index, family) in families.iter().enumerate() {
                let index = index as u32;
                if !family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                    continue;
                }
                let presentable = unsafe {
                    surface_ext.get_physical_device_surface_support(
                        physical_device,
                        index,
                        surface,
                    )?
                };
                if presentable {
                    let rank = preference
                        .iter()
                        .position(|ty| *ty == properties.device_type)
                        .unwrap_or(preference.len());
                    candidates.push((rank, physical_device, index, properties));
                    break;
                }
            }
        }
        candidates.sort_by_key(|(rank, ..)| *rank);
        let (_, physical_device, queue_family, properties) = candidates
            .into_iter()
            .next()
            .ok_or(GpuError::NoSuitableDevice)?;
        let name = properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!(device = name, queue_family, "Selected physical device");
        Ok((physical_device, queue_family))
    }

    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    fn allocate(
        &self,
        name: &str,
        key: AllocationKey,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> crate::Result<(vk::DeviceMemory, vk::DeviceSize)> {
        let allocation = self
            .allocator
            .lock()?
            .as_mut()
            .ok_or(GpuError::AllocationError)?
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: location.into(),
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })?;
        let memory = (unsafe { allocation.memory() }, allocation.offset());
        self.allocations.lock()?.insert(key, allocation);
        Ok(memory)
    }

    fn free(&self, key: AllocationKey) {
        let allocation = match self.allocations.lock() {
            Ok(mut allocations) => allocations.remove(&key),
            Err(_) => return,
        };
        if let Some(allocation) = allocation {
            if let Ok(mut allocator) = self.allocator.lock() {
                if let Some(allocator) = allocator.as_mut() {
                    if let Err(err) = allocator.free(allocation) {
                        warn!(?err, "Failed to free allocation");
                    }
                }
            }
        }
    }

    fn queue(&self) -> crate::Result<MutexGuard<'_, vk::Queue>> {
        Ok(self.queue.lock()?)
    }
}

impl Device for VulkanDevice {
    fn create_buffer(&self, desc: &BufferDesc) -> crate::Result<vk::Buffer> {
        let buffer_ci = vk::BufferCreateInfo::default()
            .size(desc.size)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { self.device.create_buffer(&buffer_ci, None)? };
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        let key = AllocationKey::Buffer(buffer.as_raw());
        let bound = self
            .allocate(desc.name, key, requirements, desc.location, true)
            .and_then(|(memory, offset)| {
                unsafe { self.device.bind_buffer_memory(buffer, memory, offset)? };
                Ok(())
            });
        if let Err(err) = bound {
            self.free(key);
            unsafe { self.device.destroy_buffer(buffer, None) };
            return Err(err);
        }
        #[cfg(feature = "log-lifetimes")]
        trace!("Creating VkBuffer {:p}", buffer);
        Ok(buffer)
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        #[cfg(feature = "log-lifetimes")]
        trace!("Destroying VkBuffer {:p}", buffer);
        unsafe { self.device.destroy_buffer(buffer, None) };
        self.free(AllocationKey::Buffer(buffer.as_raw()));
    }

    fn write_buffer(
        &self,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        data: &[u8],
    ) -> crate::Result<()> {
        let mut allocations = self.allocations.lock()?;
        let allocation = allocations
            .get_mut(&AllocationKey::Buffer(buffer.as_raw()))
            .ok_or(GpuError::InvalidHandle)?;
        let mapped = allocation
            .mapped_slice_mut()
            .ok_or(GpuError::NoMappedPointer)?;
        let start = offset as usize;
        if start + data.len() > mapped.len() {
            return Err(GpuError::OutOfBounds {
                offset,
                size: data.len() as u64,
                capacity: mapped.len() as u64,
            });
        }
        mapped[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(
        &self,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        out: &mut [u8],
    ) -> crate::Result<()> {
        let allocations = self.allocations.lock()?;
        let allocation = allocations
            .get(&AllocationKey::Buffer(buffer.as_raw()))
            .ok_or(GpuError::InvalidHandle)?;
        let mapped = allocation.mapped_slice().ok_or(GpuError::NoMappedPointer)?;
        let start = offset as usize;
        if start + out.len() > mapped.len() {
            return Err(GpuError::OutOfBounds {
                offset,
                size: out.len() as u64,
                capacity: mapped.len() as u64,
            });
        }
        out.copy_from_slice(&mapped[start..start + out.len()]);
        Ok(())
    }

    fn create_image(&self, desc: &ImageDesc) -> crate::Result<vk::Image> {
        let image_ci = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(desc.extent)
            .mip_levels(desc.mip_levels)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let image = unsafe { self.device.create_image(&image_ci, None)? };
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };
        let key = AllocationKey::Image(image.as_raw());
        let bound = self
            .allocate(desc.name, key, requirements, MemoryLocation::GpuOnly, false)
            .and_then(|(memory, offset)| {
                unsafe { self.device.bind_image_memory(image, memory, offset)? };
                Ok(())
            });
        if let Err(err) = bound {
            self.free(key);
            unsafe { self.device.destroy_image(image, None) };
            return Err(err);
        }
        #[cfg(feature = "log-lifetimes")]
        trace!("Creating VkImage {:p}", image);
        Ok(image)
    }

    fn destroy_image(&self, image: vk::Image) {
        #[cfg(feature = "log-lifetimes")]
        trace!("Destroying VkImage {:p}", image);
        unsafe { self.device.destroy_image(image, None) };
        self.free(AllocationKey::Image(image.as_raw()));
    }

    fn create_image_view(&self, desc: &ImageViewDesc) -> crate::Result<vk::ImageView> {
        let view_ci = vk::ImageViewCreateInfo::default()
            .image(desc.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(desc.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: desc.aspect,
                base_mip_level: 0,
                level_count: desc.mip_levels,
                base_array_layer: 0,
                layer_count: 1,
            });
        Ok(unsafe { self.device.create_image_view(&view_ci, None)? })
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) }
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> crate::Result<vk::Sampler> {
        let sampler_ci = vk::SamplerCreateInfo::default()
            .mag_filter(desc.mag_filter)
            .min_filter(desc.min_filter)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(desc.address_mode_u)
            .address_mode_v(desc.address_mode_v)
            .address_mode_w(desc.address_mode_w)
            .max_lod(desc.max_lod)
            .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE);
        Ok(unsafe { self.device.create_sampler(&sampler_ci, None)? })
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        unsafe { self.device.destroy_sampler(sampler, None) }
    }

    fn supports_format(&self, format: vk::Format, features: vk::FormatFeatureFlags) -> bool {
        let properties = unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        };
        properties.optimal_tiling_features.contains(features)
    }

    fn create_fence(&self, signaled: bool) -> crate::Result<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence = unsafe {
            self.device
                .create_fence(&vk::FenceCreateInfo::default().flags(flags), None)?
        };
        #[cfg(feature = "log-lifetimes")]
        trace!("Creating VkFence {:p}", fence);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        #[cfg(feature = "log-lifetimes")]
        trace!("Destroying VkFence {:p}", fence);
        unsafe { self.device.destroy_fence(fence, None) }
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> crate::Result<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, timeout)? };
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> crate::Result<()> {
        unsafe { self.device.reset_fences(&[fence])? };
        Ok(())
    }

    fn fence_status(&self, fence: vk::Fence) -> crate::Result<bool> {
        Ok(unsafe { self.device.get_fence_status(fence)? })
    }

    fn create_semaphore(&self) -> crate::Result<vk::Semaphore> {
        let semaphore = unsafe {
            self.device
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?
        };
        #[cfg(feature = "log-lifetimes")]
        trace!("Creating VkSemaphore {:p}", semaphore);
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        #[cfg(feature = "log-lifetimes")]
        trace!("Destroying VkSemaphore {:p}", semaphore);
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    fn create_command_pool(
        &self,
        flags: vk::CommandPoolCreateFlags,
    ) -> crate::Result<vk::CommandPool> {
        let pool_ci = vk::CommandPoolCreateInfo::default()
            .flags(flags)
            .queue_family_index(self.queue_family);
        Ok(unsafe { self.device.create_command_pool(&pool_ci, None)? })
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) }
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> crate::Result<Vec<vk::CommandBuffer>> {
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        Ok(unsafe { self.device.allocate_command_buffers(&allocate_info)? })
    }

    fn begin_command_buffer(
        &self,
        cmd: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> crate::Result<()> {
        unsafe {
            self.device
                .begin_command_buffer(cmd, &vk::CommandBufferBeginInfo::default().flags(flags))?
        };
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> crate::Result<()> {
        unsafe { self.device.end_command_buffer(cmd)? };
        Ok(())
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> crate::Result<()> {
        unsafe {
            self.device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?
        };
        Ok(())
    }

    fn cmd_copy_buffer(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[vk::BufferCopy],
    ) {
        unsafe { self.device.cmd_copy_buffer(cmd, src, dst, regions) }
    }

    fn cmd_copy_buffer_to_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        regions: &[vk::BufferImageCopy],
    ) {
        unsafe {
            self.device.cmd_copy_buffer_to_image(
                cmd,
                src,
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                regions,
            )
        }
    }

    fn cmd_blit_image(
        &self,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        regions: &[vk::ImageBlit],
        filter: vk::Filter,
    ) {
        unsafe {
            self.device.cmd_blit_image(
                cmd,
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                regions,
                filter,
            )
        }
    }

    fn cmd_image_barrier(&self, cmd: vk::CommandBuffer, barrier: &ImageBarrier) {
        let image_barrier = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(barrier.src_stage)
            .src_access_mask(barrier.src_access)
            .dst_stage_mask(barrier.dst_stage)
            .dst_access_mask(barrier.dst_access)
            .old_layout(barrier.old_layout)
            .new_layout(barrier.new_layout)
            .image(barrier.image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: barrier.aspect,
                base_mip_level: barrier.base_mip_level,
                level_count: barrier.level_count,
                base_array_layer: 0,
                layer_count: vk::REMAINING_ARRAY_LAYERS,
            });
        let dependency_info = vk::DependencyInfo::default()
            .image_memory_barriers(std::slice::from_ref(&image_barrier));
        unsafe { self.device.cmd_pipeline_barrier2(cmd, &dependency_info) }
    }

    fn cmd_begin_rendering(&self, cmd: vk::CommandBuffer, desc: &RenderingDesc) {
        let color = vk::RenderingAttachmentInfo::default()
            .image_view(desc.color.view)
            .image_layout(desc.color.layout)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(desc.color.clear);
        let depth = desc.depth.map(|depth| {
            vk::RenderingAttachmentInfo::default()
                .image_view(depth.view)
                .image_layout(depth.layout)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .clear_value(depth.clear)
        });
        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: desc.extent,
            })
            .layer_count(1)
            .color_attachments(std::slice::from_ref(&color));
        if let Some(depth) = depth.as_ref() {
            rendering_info = rendering_info.depth_attachment(depth);
        }
        unsafe { self.device.cmd_begin_rendering(cmd, &rendering_info) }
    }

    fn cmd_end_rendering(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_rendering(cmd) }
    }

    fn cmd_set_viewport_scissor(&self, cmd: vk::CommandBuffer, extent: vk::Extent2D) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent,
        };
        unsafe {
            self.device.cmd_set_viewport(cmd, 0, &[viewport]);
            self.device.cmd_set_scissor(cmd, 0, &[scissor]);
        }
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline)
        }
    }

    fn cmd_bind_descriptor_set(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set_index: u32,
        set: vk::DescriptorSet,
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                set_index,
                &[set],
                &[],
            )
        }
    }

    fn cmd_push_constants(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        unsafe {
            self.device
                .cmd_push_constants(cmd, layout, stages, offset, data)
        }
    }

    fn cmd_bind_vertex_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer) {
        unsafe { self.device.cmd_bind_vertex_buffers(cmd, 0, &[buffer], &[0]) }
    }

    fn cmd_bind_index_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer) {
        unsafe {
            self.device
                .cmd_bind_index_buffer(cmd, buffer, 0, vk::IndexType::UINT32)
        }
    }

    fn cmd_draw_indexed(
        &self,
        cmd: vk::CommandBuffer,
        index_count: u32,
        first_index: u32,
        vertex_offset: i32,
    ) {
        unsafe {
            self.device
                .cmd_draw_indexed(cmd, index_count, 1, first_index, vertex_offset, 0)
        }
    }

    fn queue_submit(&self, submit: &SubmitDesc) -> crate::Result<()> {
        let command_buffer_infos: Vec<vk::CommandBufferSubmitInfo> = submit
            .command_buffers
            .iter()
            .map(|cmd| vk::CommandBufferSubmitInfo::default().command_buffer(*cmd))
            .collect();
        let semaphore_info = |op: &SemaphoreOp| {
            vk::SemaphoreSubmitInfo::default()
                .semaphore(op.semaphore)
                .stage_mask(op.stage)
                .value(1)
        };
        let wait_infos: Vec<vk::SemaphoreSubmitInfo> =
            submit.wait.iter().map(semaphore_info).collect();
        let signal_infos: Vec<vk::SemaphoreSubmitInfo> =
            submit.signal.iter().map(semaphore_info).collect();
        let submit_info = vk::SubmitInfo2::default()
            .command_buffer_infos(&command_buffer_infos)
            .wait_semaphore_infos(&wait_infos)
            .signal_semaphore_infos(&signal_infos);
        let queue = self.queue()?;
        unsafe {
            self.device
                .queue_submit2(*queue, std::slice::from_ref(&submit_info), submit.fence)?
        };
        Ok(())
    }

    fn device_wait_idle(&self) -> crate::Result<()> {
        let _queue = self.queue()?;
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBinding],
    ) -> crate::Result<vk::DescriptorSetLayout> {
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
            .iter()
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding.binding)
                    .descriptor_type(binding.ty)
                    .descriptor_count(binding.count)
                    .stage_flags(binding.stages)
            })
            .collect();
        let layout_ci = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        Ok(unsafe { self.device.create_descriptor_set_layout(&layout_ci, None)? })
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) }
    }

    fn create_descriptor_pool(
        &self,
        sizes: &[vk::DescriptorPoolSize],
        max_sets: u32,
    ) -> crate::Result<vk::DescriptorPool> {
        let pool_ci = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(sizes)
            .max_sets(max_sets);
        Ok(unsafe { self.device.create_descriptor_pool(&pool_ci, None)? })
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) }
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> crate::Result<vk::DescriptorSet> {
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(std::slice::from_ref(&layout));
        unsafe { self.device.allocate_descriptor_sets(&allocate_info)? }
            .into_iter()
            .next()
            .ok_or(GpuError::Vk(vk::Result::ERROR_OUT_OF_POOL_MEMORY))
    }

    fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]) {
        let buffer_infos: Vec<vk::DescriptorBufferInfo> = writes
            .iter()
            .map(|write| match write.resource {
                DescriptorResource::Buffer {
                    buffer,
                    offset,
                    range,
                } => vk::DescriptorBufferInfo {
                    buffer,
                    offset,
                    range,
                },
                _ => vk::DescriptorBufferInfo::default(),
            })
            .collect();
        let image_infos: Vec<vk::DescriptorImageInfo> = writes
            .iter()
            .map(|write| match write.resource {
                DescriptorResource::CombinedImageSampler {
                    view,
                    sampler,
                    layout,
                } => vk::DescriptorImageInfo {
                    sampler,
                    image_view: view,
                    image_layout: layout,
                },
                _ => vk::DescriptorImageInfo::default(),
            })
            .collect();
        let vk_writes: Vec<vk::WriteDescriptorSet> = writes
            .iter()
            .enumerate()
            .map(|(index, write)| {
                let vk_write = vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(write.binding)
                    .descriptor_type(write.ty);
                match write.resource {
                    DescriptorResource::Buffer { .. } => {
                        vk_write.buffer_info(std::slice::from_ref(&buffer_infos[index]))
                    }
                    DescriptorResource::CombinedImageSampler { .. } => {
                        vk_write.image_info(std::slice::from_ref(&image_infos[index]))
                    }
                }
            })
            .collect();
        unsafe { self.device.update_descriptor_sets(&vk_writes, &[]) }
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constants: &[vk::PushConstantRange],
    ) -> crate::Result<vk::PipelineLayout> {
        let layout_ci = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constants);
        Ok(unsafe { self.device.create_pipeline_layout(&layout_ci, None)? })
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(layout, None) }
    }

    fn surface_support(&self) -> crate::Result<SurfaceSupport> {
        unsafe {
            Ok(SurfaceSupport {
                capabilities: self
                    .surface_ext
                    .get_physical_device_surface_capabilities(self.physical_device, self.surface)?,
                formats: self
                    .surface_ext
                    .get_physical_device_surface_formats(self.physical_device, self.surface)?,
                present_modes: self
                    .surface_ext
                    .get_physical_device_surface_present_modes(self.physical_device, self.surface)?,
            })
        }
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> crate::Result<vk::SwapchainKHR> {
        let swapchain_ci = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(desc.min_image_count)
            .image_format(desc.format.format)
            .image_color_space(desc.format.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(desc.usage)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(desc.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(desc.present_mode)
            .clipped(true)
            .old_swapchain(desc.old_swapchain);
        let swapchain = unsafe { self.swapchain_ext.create_swapchain(&swapchain_ci, None)? };
        debug!(
            width = desc.extent.width,
            height = desc.extent.height,
            present_mode = ?desc.present_mode,
            "Created swapchain"
        );
        Ok(swapchain)
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_ext.destroy_swapchain(swapchain, None) }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> crate::Result<Vec<vk::Image>> {
        Ok(unsafe { self.swapchain_ext.get_swapchain_images(swapchain)? })
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> crate::Result<(u32, bool)> {
        Ok(unsafe {
            self.swapchain_ext
                .acquire_next_image(swapchain, timeout, semaphore, vk::Fence::null())?
        })
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> crate::Result<bool> {
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(std::slice::from_ref(&wait))
            .swapchains(std::slice::from_ref(&swapchain))
            .image_indices(std::slice::from_ref(&image_index));
        let queue = self.queue()?;
        Ok(unsafe { self.swapchain_ext.queue_present(*queue, &present_info)? })
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(err) = self.device.device_wait_idle() {
                error!(?err, "Failed to idle device before destruction");
            }
        }
        let leaked = self
            .allocations
            .get_mut()
            .map(|allocations| allocations.len())
            .unwrap_or_default();
        if leaked > 0 {
            warn!(leaked, "Allocations still alive at device destruction");
        }
        if let Ok(allocations) = self.allocations.get_mut() {
            allocations.clear();
        }
        if let Ok(allocator) = self.allocator.get_mut() {
            allocator.take();
        }
        unsafe {
            self.device.destroy_device(None);
            self.surface_ext.destroy_surface(self.surface, None);
            if let Some((ext, messenger)) = self.debug_messenger.take() {
                ext.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

unsafe extern "system" fn vk_debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    msg_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    let callback_data = unsafe { *p_callback_data };
    let message = if callback_data.p_message.is_null() {
        String::new()
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message) }
            .to_string_lossy()
            .into_owned()
    };
    let id = callback_data.message_id_number;
    match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => trace!(?msg_type, id, "{message}"),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => debug!(?msg_type, id, "{message}"),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => warn!(?msg_type, id, "{message}"),
        _ => error!(?msg_type, id, "{message}"),
    }
    vk::FALSE
}
