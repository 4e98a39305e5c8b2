use std::sync::PoisonError;

use ash::vk;
/// Possible errors
use thiserror::Error;

#[derive(Debug, Error, Copy, Clone, PartialEq, Eq, Hash)]
pub enum GpuError {
    #[error("No suitable physical device has been found")]
    NoSuitableDevice,

    #[error("No presentable surface is attached to the device")]
    NoSurface,

    #[error("None of the requested formats are supported")]
    UnsupportedFormat,

    #[error("Poisoned mutex")]
    PoisonError,

    #[error("Vulkan resource does not have a mapped pointer. You're most likely using GPU only")]
    NoMappedPointer,

    #[error("Write of {size} bytes at offset {offset} exceeds the resource size of {capacity}")]
    OutOfBounds {
        offset: u64,
        size: u64,
        capacity: u64,
    },

    #[error("Nothing to upload, the source data is empty")]
    EmptyUpload,

    #[error("Descriptor pool exhausted, it only holds {max_sets} sets")]
    DescriptorPoolExhausted { max_sets: u32 },

    #[error("Handle does not belong to this device")]
    InvalidHandle,

    #[error("Allocation error")]
    AllocationError,

    #[error("String contains null byte")]
    StringContainsNull,

    #[error(transparent)]
    Vk(#[from] vk::Result),
}

impl GpuError {
    /// Whether the swapchain has to be recreated before the call can succeed again
    pub fn is_out_of_date(&self) -> bool {
        matches!(
            self,
            GpuError::Vk(vk::Result::ERROR_OUT_OF_DATE_KHR)
                | GpuError::Vk(vk::Result::SUBOPTIMAL_KHR)
        )
    }
}

impl<T> From<PoisonError<T>> for GpuError {
    fn from(_: PoisonError<T>) -> Self {
        GpuError::PoisonError
    }
}

impl From<gpu_allocator::AllocationError> for GpuError {
    fn from(err: gpu_allocator::AllocationError) -> Self {
        tracing::error!(?err, "gpu-allocator failed");
        match err {
            gpu_allocator::AllocationError::OutOfMemory => {
                GpuError::Vk(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)
            }
            _ => GpuError::AllocationError,
        }
    }
}

impl From<std::ffi::NulError> for GpuError {
    fn from(_: std::ffi::NulError) -> Self {
        GpuError::StringContainsNull
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_date_classification() {
        assert!(GpuError::Vk(vk::Result::ERROR_OUT_OF_DATE_KHR).is_out_of_date());
        assert!(GpuError::Vk(vk::Result::SUBOPTIMAL_KHR).is_out_of_date());
        assert!(!GpuError::Vk(vk::Result::ERROR_DEVICE_LOST).is_out_of_date());
        assert!(!GpuError::NoMappedPointer.is_out_of_date());
    }
}
