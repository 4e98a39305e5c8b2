use std::sync::Arc;

use ash::vk;

use crate::command::{CommandBuffer, CommandBufferRecording, CommandPool};
use crate::device::Device;
use crate::sync::Fence;
use crate::traits::Destructible;

/// Adds a basic struct which can immediately submit all commands
#[derive(Debug)]
pub struct ImmediateSubmit<D: Device> {
    fence: Fence<D>,
    command_buffer: CommandBuffer<D>,
    command_pool: CommandPool<D>,
    timeout: u64,
}

impl<D: Device> Destructible for ImmediateSubmit<D> {
    fn destroy(&mut self) {
        self.fence.destroy();
        self.command_pool.destroy();
    }
}

impl<D: Device> ImmediateSubmit<D> {
    pub fn new(device: Arc<D>, timeout: u64) -> crate::Result<Self> {
        let fence = Fence::new(device.clone(), true)?;
        let command_pool = CommandPool::new(
            device.clone(),
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER
                | vk::CommandPoolCreateFlags::TRANSIENT,
        )?;
        let command_buffer = command_pool
            .allocate(1)?
            .pop()
            .ok_or(crate::GpuError::Vk(vk::Result::ERROR_OUT_OF_HOST_MEMORY))?;
        Ok(Self {
            fence,
            command_buffer,
            command_pool,
            timeout,
        })
    }

    /// Immediately submit a function which fills out a command buffer, then block until the
    /// GPU has executed it
    pub fn submit<T: FnOnce(&CommandBufferRecording<D>)>(&self, function: T) -> crate::Result<()> {
        self.fence.reset()?;
        self.command_buffer.reset()?;
        let cmd = self
            .command_buffer
            .clone()
            .begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        function(&cmd);
        cmd.end()?.submit(&[], &[], self.fence.handle())?;
        self.fence.wait(self.timeout)
    }

    pub fn get_device(&self) -> &Arc<D> {
        self.command_pool.get_device()
    }
}
