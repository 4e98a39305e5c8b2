use skein_gpu::ash::vk;
use skein_gpu::command::CommandBufferRecording;
use skein_gpu::device::Device;

/// Where in the frame an overlay is being called from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameContext {
    /// Frame slot being recorded
    pub slot: usize,
    pub image_index: u32,
    pub extent: vk::Extent2D,
    /// Frames recorded since the scheduler was created
    pub frame_number: u64,
}

/// Debug UI and other passes drawn on top of the scene.
///
/// `update_buffers` runs once the slot's previous submission has retired and before recording
/// starts. `draw` runs inside the scene's rendering scope, after the main draw list.
pub trait Overlay<D: Device>: Send {
    fn update_buffers(&mut self, _frame: &FrameContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn draw(&mut self, cmd: &CommandBufferRecording<D>, frame: &FrameContext);
}
