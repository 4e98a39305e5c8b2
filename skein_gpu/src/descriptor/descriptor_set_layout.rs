use std::sync::Arc;

use ash::vk;
#[cfg(feature = "log-lifetimes")]
use tracing::trace;

use crate::device::{DescriptorBinding, Device};
use crate::traits::Destructible;

#[derive(Clone, Debug, Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<DescriptorBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Adds a single descriptor binding visible to `stages`
    pub fn add_binding(
        mut self,
        binding: u32,
        ty: vk::DescriptorType,
        stages: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(DescriptorBinding {
            binding,
            ty,
            count: 1,
            stages,
        });
        self
    }

    pub fn bindings(&self) -> &[DescriptorBinding] {
        &self.bindings
    }

    /// Clear of all bindings
    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    /// Builds the descriptor layout
    pub fn build<D: Device>(&self, device: Arc<D>) -> crate::Result<DescriptorSetLayout<D>> {
        let handle = device.create_descriptor_set_layout(&self.bindings)?;

        #[cfg(feature = "log-lifetimes")]
        trace!("Creating VkDescriptorSetLayout {:?}", handle);

        Ok(DescriptorSetLayout {
            handle,
            bindings: self.bindings.clone(),
            device,
        })
    }
}

#[derive(Debug)]
pub struct DescriptorSetLayout<D: Device> {
    handle: vk::DescriptorSetLayout,
    bindings: Vec<DescriptorBinding>,
    device: Arc<D>,
}

impl<D: Device> DescriptorSetLayout<D> {
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.handle
    }

    pub fn bindings(&self) -> &[DescriptorBinding] {
        &self.bindings
    }
}

impl<D: Device> Destructible for DescriptorSetLayout<D> {
    fn destroy(&mut self) {
        if self.handle == vk::DescriptorSetLayout::null() {
            return;
        }
        #[cfg(feature = "log-lifetimes")]
        trace!("Destroying VkDescriptorSetLayout {:?}", self.handle);

        self.device.destroy_descriptor_set_layout(self.handle);
        self.handle = vk::DescriptorSetLayout::null();
    }
}

impl<D: Device> Drop for DescriptorSetLayout<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}
