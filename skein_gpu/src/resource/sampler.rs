use std::sync::Arc;

use ash::vk;

use crate::device::{Device, SamplerDesc};
use crate::traits::Destructible;

#[derive(Debug)]
pub struct Sampler<D: Device> {
    handle: vk::Sampler,
    desc: SamplerDesc,
    device: Arc<D>,
}

impl<D: Device> Sampler<D> {
    pub fn new(device: Arc<D>, desc: SamplerDesc) -> crate::Result<Self> {
        let handle = device.create_sampler(&desc)?;
        Ok(Self {
            handle,
            desc,
            device,
        })
    }

    pub fn handle(&self) -> vk::Sampler {
        self.handle
    }

    pub fn desc(&self) -> &SamplerDesc {
        &self.desc
    }
}

impl<D: Device> Destructible for Sampler<D> {
    fn destroy(&mut self) {
        if self.handle == vk::Sampler::null() {
            return;
        }
        self.device.destroy_sampler(self.handle);
        self.handle = vk::Sampler::null();
    }
}

impl<D: Device> Drop for Sampler<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}
