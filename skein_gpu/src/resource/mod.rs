pub mod buffer;
pub mod image;
pub mod sampler;

pub use buffer::Buffer;
pub use image::Image;
pub use sampler::Sampler;
