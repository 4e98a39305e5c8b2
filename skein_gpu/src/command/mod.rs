pub mod command_buffer;
pub mod command_pool;

pub use command_buffer::{
    CommandBuffer, CommandBufferExecutable, CommandBufferInvalid, CommandBufferRecording,
};
pub use command_pool::CommandPool;
