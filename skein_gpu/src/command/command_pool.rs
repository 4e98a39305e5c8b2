use std::sync::Arc;

use ash::vk;
#[cfg(feature = "log-lifetimes")]
use tracing::trace;

use crate::command::CommandBuffer;
use crate::device::Device;
use crate::traits::Destructible;

#[derive(Debug)]
pub struct CommandPool<D: Device> {
    handle: vk::CommandPool,
    device: Arc<D>,
}

impl<D: Device> CommandPool<D> {
    pub fn new(device: Arc<D>, flags: vk::CommandPoolCreateFlags) -> crate::Result<Self> {
        let handle = device.create_command_pool(flags)?;

        #[cfg(feature = "log-lifetimes")]
        trace!("Created VkCommandPool {:?}", handle);

        Ok(Self { handle, device })
    }

    pub fn handle(&self) -> vk::CommandPool {
        self.handle
    }

    pub fn get_device(&self) -> &Arc<D> {
        &self.device
    }

    /// Allocate primary command buffers from a command pool
    pub fn allocate(&self, count: u32) -> crate::Result<Vec<CommandBuffer<D>>> {
        Ok(self
            .device
            .allocate_command_buffers(self.handle, count)?
            .into_iter()
            .map(|buffer| CommandBuffer::new(buffer, self.device.clone()))
            .collect())
    }
}

impl<D: Device> Destructible for CommandPool<D> {
    fn destroy(&mut self) {
        if self.handle == vk::CommandPool::null() {
            return;
        }
        #[cfg(feature = "log-lifetimes")]
        trace!("Destroying VkCommandPool {:?}", self.handle);

        self.device.destroy_command_pool(self.handle);
        self.handle = vk::CommandPool::null();
    }
}

impl<D: Device> Drop for CommandPool<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}
