pub mod allocator;
pub mod descriptor_pool;
pub mod descriptor_set_layout;
pub mod pipeline_layout;

pub use allocator::{DescriptorAllocator, DescriptorCounts};
pub use descriptor_pool::DescriptorPool;
pub use descriptor_set_layout::{DescriptorSetLayout, DescriptorSetLayoutBuilder};
pub use pipeline_layout::PipelineLayout;
