use std::sync::Arc;

use ash::vk;
#[cfg(feature = "log-lifetimes")]
use tracing::trace;

use crate::device::Device;
use crate::traits::Destructible;

/// Owned [`vk::Fence`], destroyed on drop
#[derive(Debug)]
pub struct Fence<D: Device> {
    handle: vk::Fence,
    device: Arc<D>,
}

impl<D: Device> Fence<D> {
    pub fn new(device: Arc<D>, signaled: bool) -> crate::Result<Self> {
        let handle = device.create_fence(signaled)?;

        #[cfg(feature = "log-lifetimes")]
        trace!("Creating VkFence {:?}", handle);

        Ok(Self { handle, device })
    }

    pub fn handle(&self) -> vk::Fence {
        self.handle
    }

    /// Waits on the current fence
    pub fn wait(&self, timeout: u64) -> crate::Result<()> {
        self.device.wait_for_fence(self.handle, timeout)
    }

    /// Resets the fence
    pub fn reset(&self) -> crate::Result<()> {
        self.device.reset_fence(self.handle)
    }

    /// Whether the fence is signaled, without blocking
    pub fn is_signaled(&self) -> crate::Result<bool> {
        self.device.fence_status(self.handle)
    }
}

impl<D: Device> Destructible for Fence<D> {
    fn destroy(&mut self) {
        if self.handle == vk::Fence::null() {
            return;
        }
        #[cfg(feature = "log-lifetimes")]
        trace!("Destroying VkFence {:?}", self.handle);

        self.device.destroy_fence(self.handle);
        self.handle = vk::Fence::null();
    }
}

impl<D: Device> Drop for Fence<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HeadlessDevice;

    #[test]
    fn signaled_fence_waits_immediately() {
        let device = Arc::new(HeadlessDevice::new());
        let fence = Fence::new(device.clone(), true).unwrap();
        fence.wait(u64::MAX).unwrap();
        assert!(fence.is_signaled().unwrap());
        fence.reset().unwrap();
        assert!(!fence.is_signaled().unwrap());
    }

    #[test]
    fn drop_destroys_fence() {
        let device = Arc::new(HeadlessDevice::new());
        {
            let _fence = Fence::new(device.clone(), false).unwrap();
            assert_eq!(device.live_fences().len(), 1);
        }
        assert!(device.live_fences().is_empty());
    }
}
