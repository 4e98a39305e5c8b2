//! A simulated device.
//!
//! The GPU is modelled as infinitely fast, but its completion is only observed through a fence
//! wait or [`Device::device_wait_idle`], the same points at which a real CPU learns about it.
//! Copies and blits execute at submission so uploaded bytes can be read back. Misuse that the
//! validation layers would flag is reported as [`vk::Result::ERROR_VALIDATION_FAILED_EXT`].

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use ash::vk;
use ash::vk::Handle;
use tracing::{trace, warn};

use super::*;
use crate::GpuError;

const VALIDATION: GpuError = GpuError::Vk(vk::Result::ERROR_VALIDATION_FAILED_EXT);

/// A command captured while a command buffer was recording
#[derive(Debug, Clone)]
pub enum RecordedCommand {
    CopyBuffer {
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: Vec<vk::BufferCopy>,
    },
    CopyBufferToImage {
        src: vk::Buffer,
        dst: vk::Image,
        regions: Vec<vk::BufferImageCopy>,
    },
    BlitImage {
        image: vk::Image,
        regions: Vec<vk::ImageBlit>,
    },
    Barrier(ImageBarrier),
    BeginRendering {
        extent: vk::Extent2D,
        color: vk::ImageView,
        depth: Option<vk::ImageView>,
    },
    EndRendering,
    SetViewportScissor(vk::Extent2D),
    BindPipeline(vk::Pipeline),
    BindDescriptorSet {
        set_index: u32,
        set: vk::DescriptorSet,
    },
    PushConstants {
        offset: u32,
        data: Vec<u8>,
    },
    BindVertexBuffer(vk::Buffer),
    BindIndexBuffer(vk::Buffer),
    DrawIndexed {
        index_count: u32,
        first_index: u32,
        vertex_offset: i32,
    },
}

/// A queue submission as the simulated GPU received it
#[derive(Debug, Clone)]
pub struct Submission {
    pub command_buffers: Vec<vk::CommandBuffer>,
    pub commands: Vec<RecordedCommand>,
    pub wait: Vec<SemaphoreOp>,
    pub signal: Vec<SemaphoreOp>,
    pub fence: vk::Fence,
}

impl Submission {
    /// Number of indexed draws in the submission
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|command| matches!(command, RecordedCommand::DrawIndexed { .. }))
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presentation {
    pub swapchain: vk::SwapchainKHR,
    pub image_index: u32,
    pub wait: vk::Semaphore,
}

/// Surface the simulated device presents to
#[derive(Debug, Clone)]
pub struct HeadlessSurface {
    pub support: SurfaceSupport,
}

impl Default for HeadlessSurface {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

impl HeadlessSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            support: SurfaceSupport {
                capabilities: vk::SurfaceCapabilitiesKHR {
                    min_image_count: 2,
                    max_image_count: 8,
                    current_extent: vk::Extent2D { width, height },
                    min_image_extent: vk::Extent2D {
                        width: 1,
                        height: 1,
                    },
                    max_image_extent: vk::Extent2D {
                        width: 16384,
                        height: 16384,
                    },
                    max_image_array_layers: 1,
                    supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
                    current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                    supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
                    supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT
                        | vk::ImageUsageFlags::TRANSFER_DST,
                },
                formats: vec![
                    vk::SurfaceFormatKHR {
                        format: vk::Format::B8G8R8A8_UNORM,
                        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                    },
                    vk::SurfaceFormatKHR {
                        format: vk::Format::B8G8R8A8_SRGB,
                        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                    },
                ],
                present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
            },
        }
    }

    pub fn image_counts(mut self, min: u32, max: u32) -> Self {
        self.support.capabilities.min_image_count = min;
        self.support.capabilities.max_image_count = max;
        self
    }

    pub fn formats(mut self, formats: Vec<vk::SurfaceFormatKHR>) -> Self {
        self.support.formats = formats;
        self
    }

    pub fn present_modes(mut self, present_modes: Vec<vk::PresentModeKHR>) -> Self {
        self.support.present_modes = present_modes;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FenceState {
    Unsignaled,
    Pending(Vec<u64>),
    Signaled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandBufferState {
    Initial,
    Recording,
    Executable,
    Pending,
}

#[derive(Debug)]
struct CommandBufferRecord {
    pool: u64,
    state: CommandBufferState,
    commands: Vec<RecordedCommand>,
}

#[derive(Debug)]
struct BufferRecord {
    location: MemoryLocation,
    data: Vec<u8>,
}

#[derive(Debug)]
struct ImageRecord {
    format: vk::Format,
    extent: vk::Extent3D,
    mip_levels: u32,
    /// Bytes written per mip level
    mips: BTreeMap<u32, Vec<u8>>,
    /// Swapchain images are owned by their swapchain
    swapchain_owned: bool,
}

#[derive(Debug)]
struct DescriptorPoolRecord {
    max_sets: u32,
    sets: Vec<u64>,
}

#[derive(Debug)]
struct SwapchainRecord {
    images: Vec<u64>,
    extent: vk::Extent2D,
    next_image: u32,
    retired: bool,
    desc: SwapchainDesc,
}

#[derive(Debug, Default)]
struct HeadlessState {
    next_handle: u64,
    surface: HeadlessSurface,
    buffers: HashMap<u64, BufferRecord>,
    images: HashMap<u64, ImageRecord>,
    image_views: HashSet<u64>,
    samplers: HashSet<u64>,
    fences: HashMap<u64, FenceState>,
    semaphores: HashMap<u64, bool>,
    command_pools: HashSet<u64>,
    command_buffers: HashMap<u64, CommandBufferRecord>,
    descriptor_set_layouts: HashMap<u64, Vec<DescriptorBinding>>,
    descriptor_pools: HashMap<u64, DescriptorPoolRecord>,
    descriptor_sets: HashMap<u64, Vec<DescriptorWrite>>,
    pipeline_layouts: HashSet<u64>,
    swapchains: HashMap<u64, SwapchainRecord>,
    submissions: Vec<Submission>,
    presentations: Vec<Presentation>,
    acquire_results: VecDeque<vk::Result>,
    present_results: VecDeque<vk::Result>,
    max_in_flight: usize,
    swapchains_created: usize,
}

impl HeadlessState {
    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn in_flight(&self) -> usize {
        self.command_buffers
            .values()
            .filter(|record| {
                matches!(
                    record.state,
                    CommandBufferState::Recording | CommandBufferState::Pending
                )
            })
            .count()
    }

    fn track_in_flight(&mut self) {
        self.max_in_flight = self.max_in_flight.max(self.in_flight());
    }

    fn complete_fence(&mut self, fence: u64) {
        if let Some(FenceState::Pending(command_buffers)) = self.fences.get(&fence).cloned() {
            for cmd in command_buffers {
                if let Some(record) = self.command_buffers.get_mut(&cmd) {
                    record.state = CommandBufferState::Executable;
                }
            }
            self.fences.insert(fence, FenceState::Signaled);
        }
    }

    fn push_command(&mut self, cmd: vk::CommandBuffer, command: RecordedCommand) {
        match self.command_buffers.get_mut(&cmd.as_raw()) {
            Some(record) if record.state == CommandBufferState::Recording => {
                record.commands.push(command)
            }
            _ => warn!(?command, "Command recorded outside of a recording command buffer"),
        }
    }

    fn execute(&mut self, commands: &[RecordedCommand]) -> crate::Result<()> {
        for command in commands {
            match command {
                RecordedCommand::CopyBuffer { src, dst, regions } => {
                    for region in regions {
                        let bytes = {
                            let src = self
                                .buffers
                                .get(&src.as_raw())
                                .ok_or(GpuError::InvalidHandle)?;
                            let start = region.src_offset as usize;
                            let end = start + region.size as usize;
                            if end > src.data.len() {
                                return Err(GpuError::OutOfBounds {
                                    offset: region.src_offset,
                                    size: region.size,
                                    capacity: src.data.len() as u64,
                                });
                            }
                            src.data[start..end].to_vec()
                        };
                        let dst = self
                            .buffers
                            .get_mut(&dst.as_raw())
                            .ok_or(GpuError::InvalidHandle)?;
                        let start = region.dst_offset as usize;
                        if start + bytes.len() > dst.data.len() {
                            return Err(GpuError::OutOfBounds {
                                offset: region.dst_offset,
                                size: region.size,
                                capacity: dst.data.len() as u64,
                            });
                        }
                        dst.data[start..start + bytes.len()].copy_from_slice(&bytes);
                    }
                }
                RecordedCommand::CopyBufferToImage { src, dst, regions } => {
                    for region in regions {
                        let image = self
                            .images
                            .get(&dst.as_raw())
                            .ok_or(GpuError::InvalidHandle)?;
                        let size = crate::util::format::image_level_size(
                            image.format,
                            region.image_extent.width,
                            region.image_extent.height,
                        )
                        .ok_or(GpuError::UnsupportedFormat)?;
                        let bytes = {
                            let src = self
                                .buffers
                                .get(&src.as_raw())
                                .ok_or(GpuError::InvalidHandle)?;
                            let start = region.buffer_offset as usize;
                            let end = start + size as usize;
                            if end > src.data.len() {
                                return Err(GpuError::OutOfBounds {
                                    offset: region.buffer_offset,
                                    size,
                                    capacity: src.data.len() as u64,
                                });
                            }
                            src.data[start..end].to_vec()
                        };
                        if let Some(image) = self.images.get_mut(&dst.as_raw()) {
                            image
                                .mips
                                .insert(region.image_subresource.mip_level, bytes);
                        }
                    }
                }
                RecordedCommand::BlitImage { image, regions } => {
                    let image = self
                        .images
                        .get_mut(&image.as_raw())
                        .ok_or(GpuError::InvalidHandle)?;
                    for region in regions {
                        let level = region.dst_subresource.mip_level;
                        let width = (image.extent.width >> level).max(1);
                        let height = (image.extent.height >> level).max(1);
                        let size =
                            crate::util::format::image_level_size(image.format, width, height)
                                .ok_or(GpuError::UnsupportedFormat)?;
                        image.mips.insert(level, vec![0; size as usize]);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn live_objects(&self) -> usize {
        self.buffers.len()
            + self
                .images
                .values()
                .filter(|image| !image.swapchain_owned)
                .count()
            + self.image_views.len()
            + self.samplers.len()
            + self.fences.len()
            + self.semaphores.len()
            + self.command_pools.len()
            + self.descriptor_set_layouts.len()
            + self.descriptor_pools.len()
            + self.pipeline_layouts.len()
            + self.swapchains.len()
    }
}

/// A device without a GPU behind it
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    state: Mutex<HeadlessState>,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::with_surface(HeadlessSurface::default())
    }

    pub fn with_surface(surface: HeadlessSurface) -> Self {
        Self {
            state: Mutex::new(HeadlessState {
                surface,
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, HeadlessState> {
        // a panicking test thread must not hide the state from the others
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Changes the surface extent, invalidating every swapchain created for the old size
    pub fn resize_surface(&self, width: u32, height: u32) {
        self.state().surface.support.capabilities.current_extent = vk::Extent2D { width, height };
    }

    /// Makes the next acquire fail with `result`
    pub fn push_acquire_result(&self, result: vk::Result) {
        self.state().acquire_results.push_back(result);
    }

    /// Makes the next present fail with `result`
    pub fn push_present_result(&self, result: vk::Result) {
        self.state().present_results.push_back(result);
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state().submissions.clone()
    }

    pub fn presentations(&self) -> Vec<Presentation> {
        self.state().presentations.clone()
    }

    /// Highest number of command buffers observed in the recording or pending state at once
    pub fn max_command_buffers_in_flight(&self) -> usize {
        self.state().max_in_flight
    }

    pub fn swapchains_created(&self) -> usize {
        self.state().swapchains_created
    }

    /// Number of objects created and not yet destroyed
    pub fn live_objects(&self) -> usize {
        self.state().live_objects()
    }

    pub fn live_fences(&self) -> Vec<vk::Fence> {
        self.state()
            .fences
            .keys()
            .map(|raw| vk::Fence::from_raw(*raw))
            .collect()
    }

    pub fn live_semaphores(&self) -> Vec<vk::Semaphore> {
        self.state()
            .semaphores
            .keys()
            .map(|raw| vk::Semaphore::from_raw(*raw))
            .collect()
    }

    /// Contents of any buffer, as the GPU sees them
    pub fn buffer_contents(&self, buffer: vk::Buffer) -> Option<Vec<u8>> {
        self.state()
            .buffers
            .get(&buffer.as_raw())
            .map(|record| record.data.clone())
    }

    /// Contents of an image mip level, as the GPU sees them
    pub fn image_contents(&self, image: vk::Image, mip_level: u32) -> Option<Vec<u8>> {
        self.state()
            .images
            .get(&image.as_raw())
            .and_then(|record| record.mips.get(&mip_level).cloned())
    }

    pub fn image_mip_levels(&self, image: vk::Image) -> Option<u32> {
        self.state()
            .images
            .get(&image.as_raw())
            .map(|record| record.mip_levels)
    }

    /// Writes recorded into a descriptor set
    pub fn descriptor_writes(&self, set: vk::DescriptorSet) -> Option<Vec<DescriptorWrite>> {
        self.state().descriptor_sets.get(&set.as_raw()).cloned()
    }

    pub fn descriptor_set_layout_bindings(
        &self,
        layout: vk::DescriptorSetLayout,
    ) -> Option<Vec<DescriptorBinding>> {
        self.state()
            .descriptor_set_layouts
            .get(&layout.as_raw())
            .cloned()
    }
}

impl Device for HeadlessDevice {
    fn create_buffer(&self, desc: &BufferDesc) -> crate::Result<vk::Buffer> {
        if desc.size == 0 {
            return Err(VALIDATION);
        }
        let mut state = self.state();
        let handle = state.handle();
        state.buffers.insert(
            handle,
            BufferRecord {
                location: desc.location,
                data: vec![0; desc.size as usize],
            },
        );
        trace!(name = desc.name, handle, "Created headless buffer");
        Ok(vk::Buffer::from_raw(handle))
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        self.state().buffers.remove(&buffer.as_raw());
    }

    fn write_buffer(
        &self,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        data: &[u8],
    ) -> crate::Result<()> {
        let mut state = self.state();
        let record = state
            .buffers
            .get_mut(&buffer.as_raw())
            .ok_or(GpuError::InvalidHandle)?;
        if !record.location.is_host_visible() {
            return Err(GpuError::NoMappedPointer);
        }
        let start = offset as usize;
        if start + data.len() > record.data.len() {
            return Err(GpuError::OutOfBounds {
                offset,
                size: data.len() as u64,
                capacity: record.data.len() as u64,
            });
        }
        record.data[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(
        &self,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        out: &mut [u8],
    ) -> crate::Result<()> {
        let state = self.state();
        let record = state
            .buffers
            .get(&buffer.as_raw())
            .ok_or(GpuError::InvalidHandle)?;
        if !record.location.is_host_visible() {
            return Err(GpuError::NoMappedPointer);
        }
        let start = offset as usize;
        if start + out.len() > record.data.len() {
            return Err(GpuError::OutOfBounds {
                offset,
                size: out.len() as u64,
                capacity: record.data.len() as u64,
            });
        }
        out.copy_from_slice(&record.data[start..start + out.len()]);
        Ok(())
    }

    fn create_image(&self, desc: &ImageDesc) -> crate::Result<vk::Image> {
        if desc.extent.width == 0 || desc.extent.height == 0 || desc.mip_levels == 0 {
            return Err(VALIDATION);
        }
        let mut state = self.state();
        let handle = state.handle();
        state.images.insert(
            handle,
            ImageRecord {
                format: desc.format,
                extent: desc.extent,
                mip_levels: desc.mip_levels,
                mips: BTreeMap::new(),
                swapchain_owned: false,
            },
        );
        Ok(vk::Image::from_raw(handle))
    }

    fn destroy_image(&self, image: vk::Image) {
        self.state().images.remove(&image.as_raw());
    }

    fn create_image_view(&self, desc: &ImageViewDesc) -> crate::Result<vk::ImageView> {
        let mut state = self.state();
        if !state.images.contains_key(&desc.image.as_raw()) {
            return Err(GpuError::InvalidHandle);
        }
        let handle = state.handle();
        state.image_views.insert(handle);
        Ok(vk::ImageView::from_raw(handle))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.state().image_views.remove(&view.as_raw());
    }

    fn create_sampler(&self, _desc: &SamplerDesc) -> crate::Result<vk::Sampler> {
        let mut state = self.state();
        let handle = state.handle();
        state.samplers.insert(handle);
        Ok(vk::Sampler::from_raw(handle))
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        self.state().samplers.remove(&sampler.as_raw());
    }

    fn supports_format(&self, format: vk::Format, _features: vk::FormatFeatureFlags) -> bool {
        crate::util::format::block_info(format).is_some()
    }

    fn create_fence(&self, signaled: bool) -> crate::Result<vk::Fence> {
        let mut state = self.state();
        let handle = state.handle();
        state.fences.insert(
            handle,
            if signaled {
                FenceState::Signaled
            } else {
                FenceState::Unsignaled
            },
        );
        Ok(vk::Fence::from_raw(handle))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state();
        if matches!(state.fences.get(&fence.as_raw()), Some(FenceState::Pending(_))) {
            warn!(?fence, "Destroying a fence that is still pending");
            state.complete_fence(fence.as_raw());
        }
        state.fences.remove(&fence.as_raw());
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout: u64) -> crate::Result<()> {
        let mut state = self.state();
        match state.fences.get(&fence.as_raw()) {
            None => Err(GpuError::InvalidHandle),
            Some(FenceState::Signaled) => Ok(()),
            Some(FenceState::Pending(_)) => {
                state.complete_fence(fence.as_raw());
                Ok(())
            }
            // nothing will ever signal it
            Some(FenceState::Unsignaled) => Err(GpuError::Vk(vk::Result::TIMEOUT)),
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> crate::Result<()> {
        let mut state = self.state();
        match state.fences.get(&fence.as_raw()) {
            None => Err(GpuError::InvalidHandle),
            Some(FenceState::Pending(_)) => Err(VALIDATION),
            Some(_) => {
                state.fences.insert(fence.as_raw(), FenceState::Unsignaled);
                Ok(())
            }
        }
    }

    fn fence_status(&self, fence: vk::Fence) -> crate::Result<bool> {
        match self.state().fences.get(&fence.as_raw()) {
            None => Err(GpuError::InvalidHandle),
            Some(state) => Ok(*state == FenceState::Signaled),
        }
    }

    fn create_semaphore(&self) -> crate::Result<vk::Semaphore> {
        let mut state = self.state();
        let handle = state.handle();
        state.semaphores.insert(handle, false);
        Ok(vk::Semaphore::from_raw(handle))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.state().semaphores.remove(&semaphore.as_raw());
    }

    fn create_command_pool(
        &self,
        _flags: vk::CommandPoolCreateFlags,
    ) -> crate::Result<vk::CommandPool> {
        let mut state = self.state();
        let handle = state.handle();
        state.command_pools.insert(handle);
        Ok(vk::CommandPool::from_raw(handle))
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        let mut state = self.state();
        state.command_pools.remove(&pool.as_raw());
        state
            .command_buffers
            .retain(|_, record| record.pool != pool.as_raw());
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> crate::Result<Vec<vk::CommandBuffer>> {
        let mut state = self.state();
        if !state.command_pools.contains(&pool.as_raw()) {
            return Err(GpuError::InvalidHandle);
        }
        Ok((0..count)
            .map(|_| {
                let handle = state.handle();
                state.command_buffers.insert(
                    handle,
                    CommandBufferRecord {
                        pool: pool.as_raw(),
                        state: CommandBufferState::Initial,
                        commands: Vec::new(),
                    },
                );
                vk::CommandBuffer::from_raw(handle)
            })
            .collect())
    }

    fn begin_command_buffer(
        &self,
        cmd: vk::CommandBuffer,
        _flags: vk::CommandBufferUsageFlags,
    ) -> crate::Result<()> {
        let mut state = self.state();
        let record = state
            .command_buffers
            .get_mut(&cmd.as_raw())
            .ok_or(GpuError::InvalidHandle)?;
        if matches!(
            record.state,
            CommandBufferState::Pending | CommandBufferState::Recording
        ) {
            return Err(VALIDATION);
        }
        record.state = CommandBufferState::Recording;
        record.commands.clear();
        state.track_in_flight();
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> crate::Result<()> {
        let mut state = self.state();
        let record = state
            .command_buffers
            .get_mut(&cmd.as_raw())
            .ok_or(GpuError::InvalidHandle)?;
        if record.state != CommandBufferState::Recording {
            return Err(VALIDATION);
        }
        record.state = CommandBufferState::Executable;
        Ok(())
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> crate::Result<()> {
        let mut state = self.state();
        let record = state
            .command_buffers
            .get_mut(&cmd.as_raw())
            .ok_or(GpuError::InvalidHandle)?;
        if record.state == CommandBufferState::Pending {
            return Err(VALIDATION);
        }
        record.state = CommandBufferState::Initial;
        record.commands.clear();
        Ok(())
    }

    fn cmd_copy_buffer(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[vk::BufferCopy],
    ) {
        self.state().push_command(
            cmd,
            RecordedCommand::CopyBuffer {
                src,
                dst,
                regions: regions.to_vec(),
            },
        );
    }

    fn cmd_copy_buffer_to_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        regions: &[vk::BufferImageCopy],
    ) {
        self.state().push_command(
            cmd,
            RecordedCommand::CopyBufferToImage {
                src,
                dst,
                regions: regions.to_vec(),
            },
        );
    }

    fn cmd_blit_image(
        &self,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        regions: &[vk::ImageBlit],
        _filter: vk::Filter,
    ) {
        self.state().push_command(
            cmd,
            RecordedCommand::BlitImage {
                image,
                regions: regions.to_vec(),
            },
        );
    }

    fn cmd_image_barrier(&self, cmd: vk::CommandBuffer, barrier: &ImageBarrier) {
        self.state()
            .push_command(cmd, RecordedCommand::Barrier(*barrier));
    }

    fn cmd_begin_rendering(&self, cmd: vk::CommandBuffer, desc: &RenderingDesc) {
        self.state().push_command(
            cmd,
            RecordedCommand::BeginRendering {
                extent: desc.extent,
                color: desc.color.view,
                depth: desc.depth.map(|depth| depth.view),
            },
        );
    }

    fn cmd_end_rendering(&self, cmd: vk::CommandBuffer) {
        self.state().push_command(cmd, RecordedCommand::EndRendering);
    }

    fn cmd_set_viewport_scissor(&self, cmd: vk::CommandBuffer, extent: vk::Extent2D) {
        self.state()
            .push_command(cmd, RecordedCommand::SetViewportScissor(extent));
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.state()
            .push_command(cmd, RecordedCommand::BindPipeline(pipeline));
    }

    fn cmd_bind_descriptor_set(
        &self,
        cmd: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        set_index: u32,
        set: vk::DescriptorSet,
    ) {
        self.state()
            .push_command(cmd, RecordedCommand::BindDescriptorSet { set_index, set });
    }

    fn cmd_push_constants(
        &self,
        cmd: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        _stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        self.state().push_command(
            cmd,
            RecordedCommand::PushConstants {
                offset,
                data: data.to_vec(),
            },
        );
    }

    fn cmd_bind_vertex_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer) {
        self.state()
            .push_command(cmd, RecordedCommand::BindVertexBuffer(buffer));
    }

    fn cmd_bind_index_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer) {
        self.state()
            .push_command(cmd, RecordedCommand::BindIndexBuffer(buffer));
    }

    fn cmd_draw_indexed(
        &self,
        cmd: vk::CommandBuffer,
        index_count: u32,
        first_index: u32,
        vertex_offset: i32,
    ) {
        self.state().push_command(
            cmd,
            RecordedCommand::DrawIndexed {
                index_count,
                first_index,
                vertex_offset,
            },
        );
    }

    fn queue_submit(&self, submit: &SubmitDesc) -> crate::Result<()> {
        let mut state = self.state();
        for cmd in submit.command_buffers {
            match state.command_buffers.get(&cmd.as_raw()) {
                Some(record) if record.state == CommandBufferState::Executable => {}
                Some(_) => return Err(VALIDATION),
                None => return Err(GpuError::InvalidHandle),
            }
        }
        if submit.fence != vk::Fence::null()
            && state.fences.get(&submit.fence.as_raw()) != Some(&FenceState::Unsignaled)
        {
            return Err(VALIDATION);
        }
        for wait in submit.wait {
            match state.semaphores.get(&wait.semaphore.as_raw()) {
                Some(true) => {}
                Some(false) => return Err(VALIDATION),
                None => return Err(GpuError::InvalidHandle),
            }
        }
        for signal in submit.signal {
            match state.semaphores.get(&signal.semaphore.as_raw()) {
                // signaling a semaphore someone has yet to wait on
                Some(true) => return Err(VALIDATION),
                Some(false) => {}
                None => return Err(GpuError::InvalidHandle),
            }
        }

        let commands: Vec<RecordedCommand> = submit
            .command_buffers
            .iter()
            .flat_map(|cmd| state.command_buffers[&cmd.as_raw()].commands.clone())
            .collect();
        state.execute(&commands)?;

        for wait in submit.wait {
            state.semaphores.insert(wait.semaphore.as_raw(), false);
        }
        for signal in submit.signal {
            state.semaphores.insert(signal.semaphore.as_raw(), true);
        }
        let next_state = if submit.fence == vk::Fence::null() {
            CommandBufferState::Executable
        } else {
            CommandBufferState::Pending
        };
        for cmd in submit.command_buffers {
            if let Some(record) = state.command_buffers.get_mut(&cmd.as_raw()) {
                record.state = next_state;
            }
        }
        if submit.fence != vk::Fence::null() {
            state.fences.insert(
                submit.fence.as_raw(),
                FenceState::Pending(
                    submit
                        .command_buffers
                        .iter()
                        .map(|cmd| cmd.as_raw())
                        .collect(),
                ),
            );
        }
        state.track_in_flight();
        state.submissions.push(Submission {
            command_buffers: submit.command_buffers.to_vec(),
            commands,
            wait: submit.wait.to_vec(),
            signal: submit.signal.to_vec(),
            fence: submit.fence,
        });
        Ok(())
    }

    fn device_wait_idle(&self) -> crate::Result<()> {
        let mut state = self.state();
        let pending: Vec<u64> = state
            .fences
            .iter()
            .filter(|(_, fence)| matches!(fence, FenceState::Pending(_)))
            .map(|(handle, _)| *handle)
            .collect();
        for fence in pending {
            state.complete_fence(fence);
        }
        Ok(())
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBinding],
    ) -> crate::Result<vk::DescriptorSetLayout> {
        let mut state = self.state();
        let handle = state.handle();
        state
            .descriptor_set_layouts
            .insert(handle, bindings.to_vec());
        Ok(vk::DescriptorSetLayout::from_raw(handle))
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.state()
            .descriptor_set_layouts
            .remove(&layout.as_raw());
    }

    fn create_descriptor_pool(
        &self,
        sizes: &[vk::DescriptorPoolSize],
        max_sets: u32,
    ) -> crate::Result<vk::DescriptorPool> {
        if max_sets == 0 || sizes.iter().any(|size| size.descriptor_count == 0) {
            return Err(VALIDATION);
        }
        let mut state = self.state();
        let handle = state.handle();
        state.descriptor_pools.insert(
            handle,
            DescriptorPoolRecord {
                max_sets,
                sets: Vec::new(),
            },
        );
        Ok(vk::DescriptorPool::from_raw(handle))
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        let mut state = self.state();
        if let Some(record) = state.descriptor_pools.remove(&pool.as_raw()) {
            for set in record.sets {
                state.descriptor_sets.remove(&set);
            }
        }
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> crate::Result<vk::DescriptorSet> {
        let mut state = self.state();
        if !state.descriptor_set_layouts.contains_key(&layout.as_raw()) {
            return Err(GpuError::InvalidHandle);
        }
        let handle = state.handle();
        let record = state
            .descriptor_pools
            .get_mut(&pool.as_raw())
            .ok_or(GpuError::InvalidHandle)?;
        if record.sets.len() as u32 >= record.max_sets {
            return Err(GpuError::Vk(vk::Result::ERROR_OUT_OF_POOL_MEMORY));
        }
        record.sets.push(handle);
        state.descriptor_sets.insert(handle, Vec::new());
        Ok(vk::DescriptorSet::from_raw(handle))
    }

    fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]) {
        if let Some(record) = self.state().descriptor_sets.get_mut(&set.as_raw()) {
            for write in writes {
                record.retain(|existing| existing.binding != write.binding);
                record.push(*write);
            }
        }
    }

    fn create_pipeline_layout(
        &self,
        _set_layouts: &[vk::DescriptorSetLayout],
        _push_constants: &[vk::PushConstantRange],
    ) -> crate::Result<vk::PipelineLayout> {
        let mut state = self.state();
        let handle = state.handle();
        state.pipeline_layouts.insert(handle);
        Ok(vk::PipelineLayout::from_raw(handle))
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.state().pipeline_layouts.remove(&layout.as_raw());
    }

    fn surface_support(&self) -> crate::Result<SurfaceSupport> {
        Ok(self.state().surface.support.clone())
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> crate::Result<vk::SwapchainKHR> {
        let mut state = self.state();
        if desc.extent.width == 0 || desc.extent.height == 0 {
            return Err(VALIDATION);
        }
        if desc.old_swapchain != vk::SwapchainKHR::null() {
            match state.swapchains.get_mut(&desc.old_swapchain.as_raw()) {
                Some(old) => old.retired = true,
                None => return Err(GpuError::InvalidHandle),
            }
        }
        let images: Vec<u64> = (0..desc.min_image_count)
            .map(|_| {
                let handle = state.handle();
                state.images.insert(
                    handle,
                    ImageRecord {
                        format: desc.format.format,
                        extent: vk::Extent3D {
                            width: desc.extent.width,
                            height: desc.extent.height,
                            depth: 1,
                        },
                        mip_levels: 1,
                        mips: BTreeMap::new(),
                        swapchain_owned: true,
                    },
                );
                handle
            })
            .collect();
        let handle = state.handle();
        state.swapchains.insert(
            handle,
            SwapchainRecord {
                images,
                extent: desc.extent,
                next_image: 0,
                retired: false,
                desc: *desc,
            },
        );
        state.swapchains_created += 1;
        Ok(vk::SwapchainKHR::from_raw(handle))
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut state = self.state();
        if let Some(record) = state.swapchains.remove(&swapchain.as_raw()) {
            for image in record.images {
                state.images.remove(&image);
            }
        }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> crate::Result<Vec<vk::Image>> {
        self.state()
            .swapchains
            .get(&swapchain.as_raw())
            .map(|record| {
                record
                    .images
                    .iter()
                    .map(|image| vk::Image::from_raw(*image))
                    .collect()
            })
            .ok_or(GpuError::InvalidHandle)
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout: u64,
        semaphore: vk::Semaphore,
    ) -> crate::Result<(u32, bool)> {
        let mut state = self.state();
        if let Some(result) = state.acquire_results.pop_front() {
            return Err(GpuError::Vk(result));
        }
        let current_extent = state.surface.support.capabilities.current_extent;
        match state.semaphores.get(&semaphore.as_raw()) {
            Some(false) => {}
            Some(true) => return Err(VALIDATION),
            None => return Err(GpuError::InvalidHandle),
        }
        let record = state
            .swapchains
            .get_mut(&swapchain.as_raw())
            .ok_or(GpuError::InvalidHandle)?;
        if record.retired || record.extent != current_extent {
            return Err(GpuError::Vk(vk::Result::ERROR_OUT_OF_DATE_KHR));
        }
        let index = record.next_image;
        record.next_image = (record.next_image + 1) % record.images.len() as u32;
        state.semaphores.insert(semaphore.as_raw(), true);
        Ok((index, false))
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> crate::Result<bool> {
        let mut state = self.state();
        match state.semaphores.get(&wait.as_raw()) {
            Some(true) => {}
            Some(false) => return Err(VALIDATION),
            None => return Err(GpuError::InvalidHandle),
        }
        // the wait is consumed whether or not presentation succeeds
        state.semaphores.insert(wait.as_raw(), false);
        if let Some(result) = state.present_results.pop_front() {
            return Err(GpuError::Vk(result));
        }
        let current_extent = state.surface.support.capabilities.current_extent;
        let record = state
            .swapchains
            .get(&swapchain.as_raw())
            .ok_or(GpuError::InvalidHandle)?;
        if image_index >= record.images.len() as u32 {
            return Err(VALIDATION);
        }
        let out_of_date = record.retired || record.extent != current_extent;
        trace!(present_mode = ?record.desc.present_mode, image_index, "Presenting");
        state.presentations.push(Presentation {
            swapchain,
            image_index,
            wait,
        });
        if out_of_date {
            return Err(GpuError::Vk(vk::Result::ERROR_OUT_OF_DATE_KHR));
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_command_buffer_cannot_be_rerecorded() {
        let device = HeadlessDevice::new();
        let pool = device
            .create_command_pool(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .unwrap();
        let cmd = device.allocate_command_buffers(pool, 1).unwrap()[0];
        let fence = device.create_fence(false).unwrap();

        device
            .begin_command_buffer(cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
            .unwrap();
        device.end_command_buffer(cmd).unwrap();
        device
            .queue_submit(&SubmitDesc {
                command_buffers: &[cmd],
                wait: &[],
                signal: &[],
                fence,
            })
            .unwrap();
        assert!(!device.fence_status(fence).unwrap());
        assert_eq!(
            device.begin_command_buffer(cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
            Err(VALIDATION)
        );

        device.wait_for_fence(fence, u64::MAX).unwrap();
        assert!(device.fence_status(fence).unwrap());
        device
            .begin_command_buffer(cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
            .unwrap();
        assert_eq!(device.max_command_buffers_in_flight(), 1);
    }

    #[test]
    fn waiting_on_an_unsubmitted_fence_times_out() {
        let device = HeadlessDevice::new();
        let fence = device.create_fence(false).unwrap();
        assert_eq!(
            device.wait_for_fence(fence, u64::MAX),
            Err(GpuError::Vk(vk::Result::TIMEOUT))
        );
    }

    #[test]
    fn resized_surface_invalidates_swapchain() {
        let device = HeadlessDevice::new();
        let semaphore = device.create_semaphore().unwrap();
        let swapchain = device
            .create_swapchain(&SwapchainDesc {
                min_image_count: 3,
                format: vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                extent: vk::Extent2D {
                    width: 1280,
                    height: 720,
                },
                usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
                pre_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                present_mode: vk::PresentModeKHR::FIFO,
                old_swapchain: vk::SwapchainKHR::null(),
            })
            .unwrap();
        assert_eq!(device.swapchain_images(swapchain).unwrap().len(), 3);
        assert_eq!(
            device.acquire_next_image(swapchain, u64::MAX, semaphore),
            Ok((0, false))
        );

        device.resize_surface(640, 480);
        let other = device.create_semaphore().unwrap();
        assert!(
            device
                .acquire_next_image(swapchain, u64::MAX, other)
                .unwrap_err()
                .is_out_of_date()
        );
    }
}
