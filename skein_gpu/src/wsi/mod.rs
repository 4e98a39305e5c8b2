pub mod swapchain;

pub use swapchain::{
    AcquireResult, PresentResult, SwapchainImage, SwapchainManager, SwapchainSettings,
};
