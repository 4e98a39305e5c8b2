use std::sync::Arc;

use skein_assets::{DescriptorBindingFlags, MaterialConstants};
use skein_gpu::ash::vk;
use skein_gpu::descriptor::PipelineLayout;
use skein_gpu::device::Device;
use skein_gpu::GraphicsContext;

/// Set indices of the scene pipeline layout
pub const CAMERA_SET: u32 = 0;
pub const MATERIAL_SET: u32 = 1;
pub const NODE_SET: u32 = 2;

/// Layout every scene draw is recorded against, plus the pipeline built for it.
///
/// Shader compilation and pipeline creation live outside the renderer. Until a pipeline is set
/// draws are recorded against the layout alone.
#[derive(Debug)]
pub struct ScenePipeline<D: Device> {
    layout: PipelineLayout<D>,
    pipeline: vk::Pipeline,
    binding_flags: DescriptorBindingFlags,
}

impl<D: Device> ScenePipeline<D> {
    pub fn new(
        context: &GraphicsContext<D>,
        binding_flags: DescriptorBindingFlags,
    ) -> skein_gpu::Result<Self> {
        let set_layouts = [
            context.uniform_layout()?,
            context.material_layout(binding_flags.binding_count())?,
            context.uniform_layout()?,
        ];
        let layout = PipelineLayout::new(
            Arc::clone(context.device()),
            &set_layouts,
            &[Self::push_constant_range()],
        )?;
        Ok(Self {
            layout,
            pipeline: vk::Pipeline::null(),
            binding_flags,
        })
    }

    /// Material factors, read by the fragment stage
    pub fn push_constant_range() -> vk::PushConstantRange {
        vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            offset: 0,
            size: std::mem::size_of::<MaterialConstants>() as u32,
        }
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout.handle()
    }

    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// The caller keeps ownership of `pipeline` and must outlive its use
    pub fn set_pipeline(&mut self, pipeline: vk::Pipeline) {
        self.pipeline = pipeline;
    }

    pub fn binding_flags(&self) -> DescriptorBindingFlags {
        self.binding_flags
    }
}
