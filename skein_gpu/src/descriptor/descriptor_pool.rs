use std::sync::Arc;

use ash::vk;
#[cfg(feature = "log-lifetimes")]
use tracing::trace;
use tracing::error;

use crate::GpuError;
use crate::device::{DescriptorWrite, Device};
use crate::traits::Destructible;

/// Allocates descriptor sets, at most `max_sets` of them
#[derive(Debug)]
pub struct DescriptorPool<D: Device> {
    handle: vk::DescriptorPool,
    max_sets: u32,
    allocated: u32,
    device: Arc<D>,
}

impl<D: Device> DescriptorPool<D> {
    pub fn new(
        device: Arc<D>,
        sizes: &[vk::DescriptorPoolSize],
        max_sets: u32,
    ) -> crate::Result<Self> {
        let handle = device.create_descriptor_pool(sizes, max_sets)?;

        #[cfg(feature = "log-lifetimes")]
        trace!("Creating VkDescriptorPool {:?}", handle);

        Ok(Self {
            handle,
            max_sets,
            allocated: 0,
            device,
        })
    }

    pub fn handle(&self) -> vk::DescriptorPool {
        self.handle
    }

    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }

    pub fn allocated(&self) -> u32 {
        self.allocated
    }

    /// Allocates a single set. Running past `max_sets` is an error, never a silent grow.
    pub fn allocate(
        &mut self,
        layout: vk::DescriptorSetLayout,
    ) -> crate::Result<vk::DescriptorSet> {
        let exhausted = GpuError::DescriptorPoolExhausted {
            max_sets: self.max_sets,
        };
        if self.allocated >= self.max_sets {
            error!(max_sets = self.max_sets, "Descriptor pool over-allocated");
            return Err(exhausted);
        }
        let set = self
            .device
            .allocate_descriptor_set(self.handle, layout)
            .map_err(|err| match err {
                GpuError::Vk(vk::Result::ERROR_OUT_OF_POOL_MEMORY)
                | GpuError::Vk(vk::Result::ERROR_FRAGMENTED_POOL) => exhausted,
                err => err,
            })?;
        self.allocated += 1;
        Ok(set)
    }

    /// Writes resources into a set allocated from this pool
    pub fn write(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]) {
        self.device.update_descriptor_set(set, writes);
    }
}

impl<D: Device> Destructible for DescriptorPool<D> {
    fn destroy(&mut self) {
        if self.handle == vk::DescriptorPool::null() {
            return;
        }
        #[cfg(feature = "log-lifetimes")]
        trace!("Destroying VkDescriptorPool {:?}", self.handle);

        self.device.destroy_descriptor_pool(self.handle);
        self.handle = vk::DescriptorPool::null();
    }
}

impl<D: Device> Drop for DescriptorPool<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}
