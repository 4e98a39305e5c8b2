use std::sync::Arc;

use ash::vk;
#[cfg(feature = "log-lifetimes")]
use tracing::trace;

use crate::device::{BufferDesc, Device, MemoryLocation};
use crate::traits::Destructible;

/// Owned [`vk::Buffer`] together with its memory
#[derive(Debug)]
pub struct Buffer<D: Device> {
    handle: vk::Buffer,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    location: MemoryLocation,
    name: String,
    device: Arc<D>,
}

impl<D: Device> Buffer<D> {
    pub fn new(device: Arc<D>, desc: &BufferDesc) -> crate::Result<Self> {
        let handle = device.create_buffer(desc)?;

        #[cfg(feature = "log-lifetimes")]
        trace!("Creating VkBuffer {:?} ({})", handle, desc.name);

        Ok(Self {
            handle,
            size: desc.size,
            usage: desc.usage,
            location: desc.location,
            name: desc.name.to_string(),
            device,
        })
    }

    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    pub fn location(&self) -> MemoryLocation {
        self.location
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Write bytes into the mapped memory of a host visible buffer
    pub fn write(&self, offset: vk::DeviceSize, data: &[u8]) -> crate::Result<()> {
        self.device.write_buffer(self.handle, offset, data)
    }

    /// Write a plain value with its in-memory layout
    pub fn write_pod<T: bytemuck::Pod>(
        &self,
        offset: vk::DeviceSize,
        value: &T,
    ) -> crate::Result<()> {
        self.write(offset, bytemuck::bytes_of(value))
    }

    /// Read bytes back from the mapped memory of a host visible buffer
    pub fn read(&self, offset: vk::DeviceSize, out: &mut [u8]) -> crate::Result<()> {
        self.device.read_buffer(self.handle, offset, out)
    }
}

impl<D: Device> Destructible for Buffer<D> {
    fn destroy(&mut self) {
        if self.handle == vk::Buffer::null() {
            return;
        }
        #[cfg(feature = "log-lifetimes")]
        trace!("Destroying VkBuffer {:?} ({})", self.handle, self.name);

        self.device.destroy_buffer(self.handle);
        self.handle = vk::Buffer::null();
    }
}

impl<D: Device> Drop for Buffer<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GpuError;
    use crate::device::HeadlessDevice;

    #[test]
    fn host_visible_write_read() {
        let device = Arc::new(HeadlessDevice::new());
        let buffer = Buffer::new(
            device.clone(),
            &BufferDesc {
                name: "uniform",
                size: 16,
                usage: vk::BufferUsageFlags::UNIFORM_BUFFER,
                location: MemoryLocation::CpuToGpu,
            },
        )
        .unwrap();
        buffer.write_pod(4, &[1.0f32, 2.0, 3.0]).unwrap();
        let mut out = [0u8; 12];
        buffer.read(4, &mut out).unwrap();
        let values: [f32; 3] = bytemuck::pod_read_unaligned(&out);
        assert_eq!(values, [1.0, 2.0, 3.0]);
        assert!(matches!(
            buffer.write(8, &[0; 16]),
            Err(GpuError::OutOfBounds { capacity: 16, .. })
        ));
    }

    #[test]
    fn device_local_is_not_mapped() {
        let device = Arc::new(HeadlessDevice::new());
        let buffer = Buffer::new(
            device,
            &BufferDesc {
                name: "vertices",
                size: 4,
                usage: vk::BufferUsageFlags::VERTEX_BUFFER,
                location: MemoryLocation::GpuOnly,
            },
        )
        .unwrap();
        assert_eq!(buffer.write(0, &[0; 4]), Err(GpuError::NoMappedPointer));
    }
}
