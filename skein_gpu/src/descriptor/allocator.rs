use ash::vk;
use tracing::debug;

use crate::context::GraphicsContext;
use crate::descriptor::DescriptorPool;
use crate::device::{DescriptorResource, DescriptorWrite, Device};
use crate::resource::Buffer;

/// Number of descriptors an asset needs, counted before anything is allocated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DescriptorCounts {
    /// Nodes owning a mesh, each gets one uniform buffer set
    pub uniform_buffers: u32,
    /// Materials owning an image set
    pub image_sets: u32,
    /// Image bindings per material set
    pub image_bindings: u32,
}

impl DescriptorCounts {
    pub fn max_sets(&self) -> u32 {
        self.uniform_buffers + self.image_sets
    }

    pub fn pool_sizes(&self) -> Vec<vk::DescriptorPoolSize> {
        let mut sizes = Vec::with_capacity(2);
        if self.uniform_buffers > 0 {
            sizes.push(vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: self.uniform_buffers,
            });
        }
        if self.image_sets * self.image_bindings > 0 {
            sizes.push(vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: self.image_sets * self.image_bindings,
            });
        }
        sizes
    }
}

/// Hands out per-node and per-material descriptor sets from a pool sized exactly for one asset
#[derive(Debug)]
pub struct DescriptorAllocator<D: Device> {
    pool: Option<DescriptorPool<D>>,
    counts: DescriptorCounts,
    uniform_layout: vk::DescriptorSetLayout,
    material_layout: Option<vk::DescriptorSetLayout>,
}

impl<D: Device> DescriptorAllocator<D> {
    pub fn new(context: &GraphicsContext<D>, counts: DescriptorCounts) -> crate::Result<Self> {
        let pool = if counts.max_sets() > 0 {
            Some(DescriptorPool::new(
                context.device().clone(),
                &counts.pool_sizes(),
                counts.max_sets(),
            )?)
        } else {
            None
        };
        let material_layout = if counts.image_bindings > 0 {
            Some(context.material_layout(counts.image_bindings)?)
        } else {
            None
        };
        debug!(?counts, "Created descriptor allocator");
        Ok(Self {
            pool,
            counts,
            uniform_layout: context.uniform_layout()?,
            material_layout,
        })
    }

    pub fn counts(&self) -> DescriptorCounts {
        self.counts
    }

    pub fn allocated(&self) -> u32 {
        self.pool.as_ref().map(|pool| pool.allocated()).unwrap_or(0)
    }

    fn pool(&mut self) -> crate::Result<&mut DescriptorPool<D>> {
        self.pool
            .as_mut()
            .ok_or(crate::GpuError::DescriptorPoolExhausted { max_sets: 0 })
    }

    /// Set 2 of the scene pipeline: the node's uniform buffer at binding 0
    pub fn allocate_node_set(&mut self, uniform: &Buffer<D>) -> crate::Result<vk::DescriptorSet> {
        let layout = self.uniform_layout;
        let pool = self.pool()?;
        let set = pool.allocate(layout)?;
        pool.write(
            set,
            &[DescriptorWrite {
                binding: 0,
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                resource: DescriptorResource::Buffer {
                    buffer: uniform.handle(),
                    offset: 0,
                    range: uniform.size(),
                },
            }],
        );
        Ok(set)
    }

    /// Set 1 of the scene pipeline: one combined image sampler per binding, in binding order
    pub fn allocate_material_set(
        &mut self,
        images: &[(vk::ImageView, vk::Sampler)],
    ) -> crate::Result<vk::DescriptorSet> {
        let layout = self
            .material_layout
            .ok_or(crate::GpuError::DescriptorPoolExhausted { max_sets: 0 })?;
        let pool = self.pool()?;
        let set = pool.allocate(layout)?;
        let writes: Vec<DescriptorWrite> = images
            .iter()
            .enumerate()
            .map(|(binding, (view, sampler))| DescriptorWrite {
                binding: binding as u32,
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                resource: DescriptorResource::CombinedImageSampler {
                    view: *view,
                    sampler: *sampler,
                    layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                },
            })
            .collect();
        pool.write(set, &writes);
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::GpuError;
    use crate::device::{BufferDesc, HeadlessDevice, MemoryLocation};

    fn uniform(device: &Arc<HeadlessDevice>) -> Buffer<HeadlessDevice> {
        Buffer::new(
            device.clone(),
            &BufferDesc {
                name: "node uniform",
                size: 64,
                usage: vk::BufferUsageFlags::UNIFORM_BUFFER,
                location: MemoryLocation::CpuToGpu,
            },
        )
        .unwrap()
    }

    #[test]
    fn pool_is_sized_from_counts() {
        let counts = DescriptorCounts {
            uniform_buffers: 3,
            image_sets: 2,
            image_bindings: 2,
        };
        assert_eq!(counts.max_sets(), 5);
        let sizes = counts.pool_sizes();
        assert_eq!(sizes[0].descriptor_count, 3);
        assert_eq!(sizes[1].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(sizes[1].descriptor_count, 4);
    }

    #[test]
    fn over_allocation_is_fatal() {
        let device = Arc::new(HeadlessDevice::new());
        let context = GraphicsContext::new(device.clone()).unwrap();
        let mut allocator = DescriptorAllocator::new(
            &context,
            DescriptorCounts {
                uniform_buffers: 1,
                image_sets: 0,
                image_bindings: 0,
            },
        )
        .unwrap();
        let buffer = uniform(&device);
        let set = allocator.allocate_node_set(&buffer).unwrap();
        let writes = device.descriptor_writes(set).unwrap();
        assert_eq!(
            writes[0].resource,
            DescriptorResource::Buffer {
                buffer: buffer.handle(),
                offset: 0,
                range: 64
            }
        );
        assert_eq!(
            allocator.allocate_node_set(&buffer),
            Err(GpuError::DescriptorPoolExhausted { max_sets: 1 })
        );
        assert!(allocator.allocate_material_set(&[]).is_err());
    }

    #[test]
    fn material_sets_bind_in_order() {
        let device = Arc::new(HeadlessDevice::new());
        let context = GraphicsContext::new(device.clone()).unwrap();
        let mut allocator = DescriptorAllocator::new(
            &context,
            DescriptorCounts {
                uniform_buffers: 0,
                image_sets: 1,
                image_bindings: 2,
            },
        )
        .unwrap();
        let images = [
            (vk::ImageView::null(), vk::Sampler::null()),
            (vk::ImageView::null(), vk::Sampler::null()),
        ];
        let set = allocator.allocate_material_set(&images).unwrap();
        let writes = device.descriptor_writes(set).unwrap();
        assert_eq!(
            writes.iter().map(|write| write.binding).collect::<Vec<_>>(),
            vec![0, 1]
        );
        assert_eq!(allocator.allocated(), 1);
    }
}
