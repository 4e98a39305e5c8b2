//! Command buffers are divided into [`CommandBuffer`], [`CommandBufferRecording`] and
//! [`CommandBufferExecutable`].
//!
//! This type state ensures that no commands are recorded or submitted when they're not supposed
//! to be. A failed transition hands back a [`CommandBufferInvalid`] which has to be reset before
//! it can be used again.

use std::sync::Arc;

use ash::vk;

use crate::GpuError;
use crate::device::{Device, ImageBarrier, RenderingDesc, SemaphoreOp, SubmitDesc};

/// Defines a command buffer in the failed state
#[derive(Debug)]
pub struct CommandBufferInvalid<D: Device> {
    handle: vk::CommandBuffer,
    device: Arc<D>,
    reason: GpuError,
}

impl<D: Device> CommandBufferInvalid<D> {
    pub fn error(&self) -> GpuError {
        self.reason
    }

    pub fn reset(self) -> crate::Result<CommandBuffer<D>> {
        self.device.reset_command_buffer(self.handle)?;
        Ok(CommandBuffer {
            handle: self.handle,
            device: self.device,
        })
    }
}

impl<D: Device> From<CommandBufferInvalid<D>> for GpuError {
    fn from(value: CommandBufferInvalid<D>) -> Self {
        value.reason
    }
}

/// A command buffer in the initial state
#[derive(Debug)]
pub struct CommandBuffer<D: Device> {
    handle: vk::CommandBuffer,
    device: Arc<D>,
}

impl<D: Device> Clone for CommandBuffer<D> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle,
            device: Arc::clone(&self.device),
        }
    }
}

impl<D: Device> CommandBuffer<D> {
    pub fn new(handle: vk::CommandBuffer, device: Arc<D>) -> Self {
        Self { handle, device }
    }

    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    /// If beginning fails, returns a [`CommandBufferInvalid`] containing the error details.
    pub fn begin(
        self,
        flags: vk::CommandBufferUsageFlags,
    ) -> Result<CommandBufferRecording<D>, CommandBufferInvalid<D>> {
        match self.device.begin_command_buffer(self.handle, flags) {
            Ok(()) => Ok(CommandBufferRecording {
                handle: self.handle,
                device: self.device,
            }),
            Err(reason) => Err(CommandBufferInvalid {
                handle: self.handle,
                device: self.device,
                reason,
            }),
        }
    }

    /// Resets the current command buffer
    pub fn reset(&self) -> crate::Result<()> {
        self.device.reset_command_buffer(self.handle)
    }
}

/// A command buffer accepting commands
#[derive(Debug)]
pub struct CommandBufferRecording<D: Device> {
    handle: vk::CommandBuffer,
    device: Arc<D>,
}

impl<D: Device> CommandBufferRecording<D> {
    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// Ends recording into the command buffer
    pub fn end(self) -> Result<CommandBufferExecutable<D>, CommandBufferInvalid<D>> {
        match self.device.end_command_buffer(self.handle) {
            Ok(()) => Ok(CommandBufferExecutable {
                handle: self.handle,
                device: self.device,
            }),
            Err(reason) => Err(CommandBufferInvalid {
                handle: self.handle,
                device: self.device,
                reason,
            }),
        }
    }

    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        self.device.cmd_copy_buffer(self.handle, src, dst, regions);
    }

    pub fn copy_buffer_to_image(
        &self,
        src: vk::Buffer,
        dst: vk::Image,
        regions: &[vk::BufferImageCopy],
    ) {
        self.device
            .cmd_copy_buffer_to_image(self.handle, src, dst, regions);
    }

    /// Blits between mip levels of the same image
    pub fn blit_image(&self, image: vk::Image, regions: &[vk::ImageBlit], filter: vk::Filter) {
        self.device
            .cmd_blit_image(self.handle, image, regions, filter);
    }

    pub fn image_barrier(&self, barrier: ImageBarrier) {
        self.device.cmd_image_barrier(self.handle, &barrier);
    }

    pub fn begin_rendering(&self, desc: &RenderingDesc) {
        self.device.cmd_begin_rendering(self.handle, desc);
    }

    pub fn end_rendering(&self) {
        self.device.cmd_end_rendering(self.handle);
    }

    pub fn set_viewport_scissor(&self, extent: vk::Extent2D) {
        self.device.cmd_set_viewport_scissor(self.handle, extent);
    }

    pub fn bind_pipeline(&self, pipeline: vk::Pipeline) {
        self.device.cmd_bind_pipeline(self.handle, pipeline);
    }

    pub fn bind_descriptor_set(
        &self,
        layout: vk::PipelineLayout,
        set_index: u32,
        set: vk::DescriptorSet,
    ) {
        self.device
            .cmd_bind_descriptor_set(self.handle, layout, set_index, set);
    }

    pub fn push_constants(
        &self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        self.device
            .cmd_push_constants(self.handle, layout, stages, offset, data);
    }

    pub fn bind_vertex_buffer(&self, buffer: vk::Buffer) {
        self.device.cmd_bind_vertex_buffer(self.handle, buffer);
    }

    pub fn bind_index_buffer(&self, buffer: vk::Buffer) {
        self.device.cmd_bind_index_buffer(self.handle, buffer);
    }

    pub fn draw_indexed(&self, index_count: u32, first_index: u32, vertex_offset: i32) {
        self.device
            .cmd_draw_indexed(self.handle, index_count, first_index, vertex_offset);
    }
}

/// Command buffer is in its executable state and can now be executed via queue submission
#[derive(Debug)]
pub struct CommandBufferExecutable<D: Device> {
    handle: vk::CommandBuffer,
    device: Arc<D>,
}

impl<D: Device> CommandBufferExecutable<D> {
    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    /// Submits the current command buffer to the queue
    pub fn submit(
        self,
        wait: &[SemaphoreOp],
        signal: &[SemaphoreOp],
        fence: vk::Fence,
    ) -> Result<CommandBuffer<D>, CommandBufferInvalid<D>> {
        let result = self.device.queue_submit(&SubmitDesc {
            command_buffers: &[self.handle],
            wait,
            signal,
            fence,
        });
        match result {
            Ok(()) => Ok(CommandBuffer {
                handle: self.handle,
                device: self.device,
            }),
            Err(reason) => Err(CommandBufferInvalid {
                handle: self.handle,
                device: self.device,
                reason,
            }),
        }
    }
}
