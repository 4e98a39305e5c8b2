use std::sync::Arc;

use skein_gpu::ash::vk;
use skein_gpu::command::{CommandBuffer, CommandPool};
use skein_gpu::descriptor::DescriptorPool;
use skein_gpu::device::{BufferDesc, DescriptorResource, DescriptorWrite, Device, MemoryLocation};
use skein_gpu::resource::Buffer;
use skein_gpu::sync::{BinarySemaphore, Fence};
use skein_gpu::GpuError;

use crate::camera::CameraUniform;

/// Everything one frame in flight owns.
///
/// A slot is only touched again once its fence has signaled.
#[derive(Debug)]
pub struct FrameSlot<D: Device> {
    /// Used by CPU to know when rendering is done
    pub render_fence: Fence<D>,
    /// Used to signal when image is available for rendering from swapchain
    pub swapchain_semaphore: BinarySemaphore<D>,
    /// Taken while recording, handed back after submission
    pub command_buffer: Option<CommandBuffer<D>>,
    pub camera: Buffer<D>,
    /// Set 0 of the scene pipeline, points at `camera`
    pub camera_set: vk::DescriptorSet,
    pub command_pool: CommandPool<D>,
}

impl<D: Device> FrameSlot<D> {
    pub fn new(
        device: Arc<D>,
        index: usize,
        camera_pool: &mut DescriptorPool<D>,
        camera_layout: vk::DescriptorSetLayout,
    ) -> skein_gpu::Result<Self> {
        let command_pool = CommandPool::new(
            device.clone(),
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;
        let command_buffer = command_pool
            .allocate(1)?
            .pop()
            .ok_or(GpuError::InvalidHandle)?;
        let camera = Buffer::new(
            device.clone(),
            &BufferDesc {
                name: &format!("frame {index} camera"),
                size: std::mem::size_of::<CameraUniform>() as vk::DeviceSize,
                usage: vk::BufferUsageFlags::UNIFORM_BUFFER,
                location: MemoryLocation::CpuToGpu,
            },
        )?;
        camera.write_pod(0, &CameraUniform::default())?;
        let camera_set = camera_pool.allocate(camera_layout)?;
        camera_pool.write(
            camera_set,
            &[DescriptorWrite {
                binding: 0,
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                resource: DescriptorResource::Buffer {
                    buffer: camera.handle(),
                    offset: 0,
                    range: camera.size(),
                },
            }],
        );
        Ok(Self {
            // signaled so the first wait on a fresh slot returns at once
            render_fence: Fence::new(device.clone(), true)?,
            swapchain_semaphore: BinarySemaphore::new(device)?,
            command_buffer: Some(command_buffer),
            camera,
            camera_set,
            command_pool,
        })
    }

    pub fn write_camera(&self, camera: &CameraUniform) -> skein_gpu::Result<()> {
        self.camera.write_pod(0, camera)
    }
}
