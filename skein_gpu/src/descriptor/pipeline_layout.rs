use std::sync::Arc;

use ash::vk;

use crate::device::Device;
use crate::traits::Destructible;

/// Owned [`vk::PipelineLayout`]. Pipelines themselves are built by the caller against it.
#[derive(Debug)]
pub struct PipelineLayout<D: Device> {
    handle: vk::PipelineLayout,
    push_constants: Vec<vk::PushConstantRange>,
    device: Arc<D>,
}

impl<D: Device> PipelineLayout<D> {
    pub fn new(
        device: Arc<D>,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constants: &[vk::PushConstantRange],
    ) -> crate::Result<Self> {
        let handle = device.create_pipeline_layout(set_layouts, push_constants)?;
        Ok(Self {
            handle,
            push_constants: push_constants.to_vec(),
            device,
        })
    }

    pub fn handle(&self) -> vk::PipelineLayout {
        self.handle
    }

    pub fn push_constants(&self) -> &[vk::PushConstantRange] {
        &self.push_constants
    }
}

impl<D: Device> Destructible for PipelineLayout<D> {
    fn destroy(&mut self) {
        if self.handle == vk::PipelineLayout::null() {
            return;
        }
        self.device.destroy_pipeline_layout(self.handle);
        self.handle = vk::PipelineLayout::null();
    }
}

impl<D: Device> Drop for PipelineLayout<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}
