use std::sync::Arc;

use ash::vk;
#[cfg(feature = "log-lifetimes")]
use tracing::trace;

use crate::device::{Device, SemaphoreOp};
use crate::traits::Destructible;

/// Owned binary [`vk::Semaphore`], destroyed on drop
#[derive(Debug)]
pub struct BinarySemaphore<D: Device> {
    handle: vk::Semaphore,
    device: Arc<D>,
}

impl<D: Device> BinarySemaphore<D> {
    pub fn new(device: Arc<D>) -> crate::Result<Self> {
        let handle = device.create_semaphore()?;

        #[cfg(feature = "log-lifetimes")]
        trace!("Creating binary VkSemaphore {:?}", handle);

        Ok(Self { handle, device })
    }

    pub fn handle(&self) -> vk::Semaphore {
        self.handle
    }

    /// Quickly get submission info for a single semaphore
    pub fn submit_info(&self, stage: vk::PipelineStageFlags2) -> SemaphoreOp {
        SemaphoreOp {
            semaphore: self.handle,
            stage,
        }
    }
}

impl<D: Device> Destructible for BinarySemaphore<D> {
    fn destroy(&mut self) {
        if self.handle == vk::Semaphore::null() {
            return;
        }
        #[cfg(feature = "log-lifetimes")]
        trace!("Destroying binary VkSemaphore {:?}", self.handle);

        self.device.destroy_semaphore(self.handle);
        self.handle = vk::Semaphore::null();
    }
}

impl<D: Device> Drop for BinarySemaphore<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}
