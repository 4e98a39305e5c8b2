use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ash::vk;
use tracing::debug;

use crate::descriptor::{DescriptorSetLayout, DescriptorSetLayoutBuilder};
use crate::device::Device;
use crate::transfer::StagingUploader;

/// Fence timeout used for blocking uploads, effectively infinite
pub const UPLOAD_TIMEOUT: u64 = u64::MAX;

/// State shared by every loaded asset and the frame scheduler.
///
/// Holds the device, the staging uploader and the two global descriptor set layouts. The layouts
/// are created on first use and live until [`GraphicsContext::reset`].
#[derive(Debug)]
pub struct GraphicsContext<D: Device> {
    device: Arc<D>,
    uploader: StagingUploader<D>,
    uniform_layout: Mutex<Option<DescriptorSetLayout<D>>>,
    /// Keyed by the number of image bindings
    material_layouts: Mutex<HashMap<u32, DescriptorSetLayout<D>>>,
}

impl<D: Device> GraphicsContext<D> {
    pub fn new(device: Arc<D>) -> crate::Result<Self> {
        let uploader = StagingUploader::new(device.clone(), UPLOAD_TIMEOUT)?;
        Ok(Self {
            device,
            uploader,
            uniform_layout: Mutex::new(None),
            material_layouts: Mutex::new(HashMap::new()),
        })
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    pub fn uploader(&self) -> &StagingUploader<D> {
        &self.uploader
    }

    /// Single uniform buffer at binding 0, read by the vertex stage
    pub fn uniform_layout(&self) -> crate::Result<vk::DescriptorSetLayout> {
        let mut layout = self.uniform_layout.lock()?;
        if let Some(layout) = layout.as_ref() {
            return Ok(layout.handle());
        }
        let created = DescriptorSetLayoutBuilder::default()
            .add_binding(
                0,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::VERTEX,
            )
            .build(self.device.clone())?;
        debug!("Created global uniform descriptor set layout");
        let handle = created.handle();
        *layout = Some(created);
        Ok(handle)
    }

    /// `bindings` combined image samplers starting at binding 0, read by the fragment stage
    pub fn material_layout(&self, bindings: u32) -> crate::Result<vk::DescriptorSetLayout> {
        let mut layouts = self.material_layouts.lock()?;
        if let Some(layout) = layouts.get(&bindings) {
            return Ok(layout.handle());
        }
        let created = (0..bindings)
            .fold(DescriptorSetLayoutBuilder::default(), |builder, binding| {
                builder.add_binding(
                    binding,
                    vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    vk::ShaderStageFlags::FRAGMENT,
                )
            })
            .build(self.device.clone())?;
        debug!(bindings, "Created global material descriptor set layout");
        let handle = created.handle();
        layouts.insert(bindings, created);
        Ok(handle)
    }

    /// Destroys the global layouts, the next request recreates them
    pub fn reset(&self) -> crate::Result<()> {
        self.uniform_layout.lock()?.take();
        self.material_layouts.lock()?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HeadlessDevice;

    #[test]
    fn layouts_are_created_once() {
        let device = Arc::new(HeadlessDevice::new());
        let context = GraphicsContext::new(device.clone()).unwrap();
        let before = device.live_objects();

        let uniform = context.uniform_layout().unwrap();
        assert_eq!(context.uniform_layout().unwrap(), uniform);
        let material = context.material_layout(2).unwrap();
        assert_eq!(context.material_layout(2).unwrap(), material);
        assert_eq!(device.live_objects(), before + 2);
        assert_eq!(
            device
                .descriptor_set_layout_bindings(material)
                .unwrap()
                .len(),
            2
        );

        context.reset().unwrap();
        assert_eq!(device.live_objects(), before);
        assert_ne!(context.uniform_layout().unwrap(), uniform);
    }
}
