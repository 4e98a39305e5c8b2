use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use derivative::Derivative;
use skein_assets::SceneGraph;
use skein_gpu::ash::vk;
use skein_gpu::command::{CommandBuffer, CommandBufferRecording};
use skein_gpu::descriptor::DescriptorPool;
use skein_gpu::device::{AttachmentDesc, Device, ImageBarrier, RenderingDesc, SemaphoreOp};
use skein_gpu::sync::BinarySemaphore;
use skein_gpu::wsi::{AcquireResult, PresentResult, SwapchainImage, SwapchainManager};
use skein_gpu::{GpuError, GraphicsContext};
use tracing::{debug, error, info, warn};

use crate::camera::CameraUniform;
use crate::depth::DepthTarget;
use crate::draw_list::DrawList;
use crate::frame::FrameSlot;
use crate::overlay::{FrameContext, Overlay};
use crate::pipeline::{CAMERA_SET, ScenePipeline};
use crate::settings::RendererSettings;

/// Messages the window side sends to the render thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEvent {
    Resize { width: u32, height: u32 },
    Close,
}

/// What happened to a call of [`FrameScheduler::render_frame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// `recreated` is set when presentation reported the swapchain stale
    Presented { image_index: u32, recreated: bool },
    /// Recorded and submitted, but a resize arrived before presentation
    Dropped,
    /// Acquisition found the swapchain stale, nothing was submitted
    SwapchainRecreated,
    /// Not prepared, minimized or closing
    Skipped,
}

/// Drives frames through wait, acquire, record, submit and present.
///
/// Fences and acquire semaphores belong to the frame slots, render complete semaphores belong
/// to the swapchain images. Any recreation rebuilds the swapchain, the depth target and every
/// synchronization primitive together.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct FrameScheduler<D: Device> {
    device: Arc<D>,
    settings: RendererSettings,
    slots: Vec<FrameSlot<D>>,
    /// Indexed by swapchain image
    render_semaphores: Vec<BinarySemaphore<D>>,
    camera_pool: Option<DescriptorPool<D>>,
    camera_layout: vk::DescriptorSetLayout,
    depth: Option<DepthTarget<D>>,
    pipeline: ScenePipeline<D>,
    swapchain: SwapchainManager<D>,
    frame_index: usize,
    frame_number: u64,
    requested_extent: vk::Extent2D,
    event_sender: Sender<WindowEvent>,
    events: Receiver<WindowEvent>,
    pending_resize: Option<vk::Extent2D>,
    minimized: bool,
    prepared: bool,
    should_close: bool,
    #[derivative(Debug = "ignore")]
    overlay: Option<Box<dyn Overlay<D>>>,
}

impl<D: Device> FrameScheduler<D> {
    pub fn new(context: &GraphicsContext<D>, settings: RendererSettings) -> anyhow::Result<Self> {
        #[cfg(feature = "tracy")]
        tracy_client::Client::start();

        let device = context.device().clone();
        let pipeline = ScenePipeline::new(context, settings.binding_flags)?;
        let (event_sender, events) = crossbeam_channel::unbounded();
        Ok(Self {
            swapchain: SwapchainManager::new(device.clone(), settings.swapchain.clone()),
            device,
            slots: Vec::new(),
            render_semaphores: Vec::new(),
            camera_pool: None,
            camera_layout: context.uniform_layout()?,
            depth: None,
            pipeline,
            frame_index: 0,
            frame_number: 0,
            requested_extent: vk::Extent2D::default(),
            event_sender,
            events,
            pending_resize: None,
            minimized: false,
            prepared: false,
            should_close: false,
            overlay: None,
            settings,
        })
    }

    /// Builds the swapchain and everything sized to it. Frames are skipped until this succeeds.
    pub fn prepare(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        self.requested_extent = vk::Extent2D { width, height };
        self.recreate()?;
        self.prepared = true;
        info!(
            frames_in_flight = self.slots.len(),
            images = self.render_semaphores.len(),
            "Frame scheduler prepared"
        );
        Ok(())
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn should_close(&self) -> bool {
        self.should_close
    }

    /// Sender for resize and close events, may be cloned to other threads
    pub fn event_sender(&self) -> Sender<WindowEvent> {
        self.event_sender.clone()
    }

    pub fn handle_event(&mut self, event: WindowEvent) {
        match event {
            WindowEvent::Resize { width, height } => {
                debug!(width, height, "Resize requested");
                self.pending_resize = Some(vk::Extent2D { width, height });
            }
            WindowEvent::Close => self.should_close = true,
        }
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
        }
    }

    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    pub fn swapchain(&self) -> &SwapchainManager<D> {
        &self.swapchain
    }

    pub fn depth_format(&self) -> Option<vk::Format> {
        self.depth.as_ref().map(|depth| depth.format())
    }

    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline.layout()
    }

    /// Pipeline compiled against [`FrameScheduler::pipeline_layout`]
    pub fn set_pipeline(&mut self, pipeline: vk::Pipeline) {
        self.pipeline.set_pipeline(pipeline);
    }

    pub fn set_overlay(&mut self, overlay: Option<Box<dyn Overlay<D>>>) {
        self.overlay = overlay;
    }

    /// Slot the next frame will use
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_minimized(&self) -> bool {
        self.minimized
    }

    /// Tears down everything tied to the swapchain and builds it again at the requested extent.
    ///
    /// A zero sized extent leaves the scheduler minimized with nothing allocated.
    fn recreate(&mut self) -> anyhow::Result<()> {
        let _span = tracy_client::span!("Recreate Swapchain");
        self.device.device_wait_idle().inspect_err(|err| {
            error!(?err, "Failed waiting for the device before recreation");
        })?;
        self.slots.clear();
        self.render_semaphores.clear();
        self.camera_pool = None;
        self.depth = None;

        let vk::Extent2D { width, height } = self.requested_extent;
        if width == 0 || height == 0 {
            debug!("Window minimized, holding off swapchain recreation");
            self.minimized = true;
            return Ok(());
        }
        self.minimized = false;

        let image_count = self.swapchain.create_or_recreate(width, height, self.settings.vsync)?;
        let extent = self.swapchain.extent();
        self.depth = Some(DepthTarget::new(
            self.device.clone(),
            extent,
            &self.settings.depth_formats,
        )?);

        let frames = self.settings.max_frames_in_flight.max(1);
        let mut camera_pool = DescriptorPool::new(
            self.device.clone(),
            &[vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: frames as u32,
            }],
            frames as u32,
        )?;
        self.slots = (0..frames)
            .map(|index| {
                FrameSlot::new(
                    self.device.clone(),
                    index,
                    &mut camera_pool,
                    self.camera_layout,
                )
            })
            .collect::<skein_gpu::Result<_>>()?;
        self.camera_pool = Some(camera_pool);
        self.render_semaphores = (0..image_count)
            .map(|_| BinarySemaphore::new(self.device.clone()))
            .collect::<skein_gpu::Result<_>>()?;
        self.frame_index %= frames;

        debug!(
            width = extent.width,
            height = extent.height,
            frames,
            images = image_count,
            "Rebuilt swapchain resources"
        );
        Ok(())
    }

    /// Renders every scene with `camera` and presents the result.
    ///
    /// Out of date swapchains are recreated and reported through the outcome, every other
    /// failure is returned.
    pub fn render_frame(
        &mut self,
        scenes: &[&SceneGraph<D>],
        camera: &CameraUniform,
    ) -> anyhow::Result<FrameOutcome> {
        let _trace_frame = tracy_client::Client::running()
            .map(|client| client.non_continuous_frame(tracy_client::frame_name!("Frame")));
        let _render_span = tracy_client::span!("Render Frame");

        self.drain_events();
        if self.should_close || !self.prepared {
            return Ok(FrameOutcome::Skipped);
        }
        if let Some(extent) = self.pending_resize.take() {
            self.requested_extent = extent;
            self.recreate()?;
        }
        if self.minimized || self.slots.is_empty() {
            return Ok(FrameOutcome::Skipped);
        }

        let frame_index = self.frame_index;
        let timeout = self.settings.fence_timeout;

        let wait_span = tracy_client::span!("Wait");
        self.slots[frame_index]
            .render_fence
            .wait(timeout)
            .inspect_err(|err| error!(?err, frame_index, "Failed waiting on frame fence"))?;
        drop(wait_span);

        let acquire_span = tracy_client::span!("Acquire");
        let acquired = self
            .swapchain
            .acquire_next(self.slots[frame_index].swapchain_semaphore.handle(), timeout)
            .inspect_err(|err| error!(?err, "Failed to acquire next swapchain image"))?;
        drop(acquire_span);
        let (image_index, suboptimal) = match acquired {
            AcquireResult::Acquired { index, suboptimal } => (index, suboptimal),
            AcquireResult::OutOfDate => {
                warn!("Swapchain out of date on acquire, recreating");
                self.frame_index = (frame_index + 1) % self.slots.len();
                self.recreate()?;
                return Ok(FrameOutcome::SwapchainRecreated);
            }
        };

        let render_semaphore = match self.submit_frame(frame_index, image_index, scenes, camera) {
            Ok(render_semaphore) => render_semaphore,
            Err(err) => {
                // the acquire semaphore is still signaled and the image is never presented
                warn!(frame_index, "Frame failed before submission, rebuilding swapchain");
                if let Err(recreate_err) = self.recreate() {
                    error!(?recreate_err, "Failed to rebuild after a failed frame");
                }
                return Err(err);
            }
        };

        self.frame_number += 1;
        self.frame_index = (frame_index + 1) % self.slots.len();

        // a resize that arrived while recording cancels presentation
        self.drain_events();
        if let Some(extent) = self.pending_resize.take() {
            debug!(image_index, "Resize arrived mid-frame, dropping presentation");
            self.requested_extent = extent;
            self.recreate()?;
            return Ok(FrameOutcome::Dropped);
        }

        let present_span = tracy_client::span!("Present");
        let presented = self
            .swapchain
            .present(image_index, render_semaphore)
            .inspect_err(|err| error!(?err, "queue_present failed"))?;
        drop(present_span);
        let recreated = match (presented, suboptimal) {
            (PresentResult::Presented, false) => false,
            _ => {
                warn!("Swapchain out of date or suboptimal on present. Resizing imminent.");
                self.recreate()?;
                true
            }
        };
        Ok(FrameOutcome::Presented {
            image_index,
            recreated,
        })
    }

    /// Records and submits the frame for an acquired image, returning the semaphore presentation
    /// waits on
    fn submit_frame(
        &mut self,
        frame_index: usize,
        image_index: u32,
        scenes: &[&SceneGraph<D>],
        camera: &CameraUniform,
    ) -> anyhow::Result<vk::Semaphore> {
        self.slots[frame_index].write_camera(camera)?;

        let swapchain_image = *self
            .swapchain
            .image(image_index)
            .ok_or(GpuError::InvalidHandle)?;
        let render_semaphore = self
            .render_semaphores
            .get(image_index as usize)
            .ok_or(GpuError::InvalidHandle)?
            .handle();
        let frame = FrameContext {
            slot: frame_index,
            image_index,
            extent: self.swapchain.extent(),
            frame_number: self.frame_number,
        };
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.update_buffers(&frame)?;
        }

        let record_span = tracy_client::span!("Record");
        let cmd = self.slots[frame_index]
            .command_buffer
            .take()
            .ok_or(GpuError::InvalidHandle)?;
        if let Err(err) = cmd.reset() {
            error!(?err, frame_index, "Failed to reset frame command buffer");
            self.slots[frame_index].command_buffer = Some(cmd);
            return Err(err.into());
        }
        let recording = match cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT) {
            Ok(recording) => recording,
            Err(invalid) => {
                let reason = invalid.error();
                return Err(self.restore_command_buffer(frame_index, reason, invalid.reset()));
            }
        };
        self.record(
            &recording,
            &frame,
            swapchain_image,
            scenes,
            camera.view_projection(),
        );
        let executable = match recording.end() {
            Ok(executable) => executable,
            Err(invalid) => {
                let reason = invalid.error();
                return Err(self.restore_command_buffer(frame_index, reason, invalid.reset()));
            }
        };
        drop(record_span);

        let submit_span = tracy_client::span!("Submit");
        let slot = &self.slots[frame_index];
        let wait = [slot
            .swapchain_semaphore
            .submit_info(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)];
        let signal = [SemaphoreOp {
            semaphore: render_semaphore,
            stage: vk::PipelineStageFlags2::ALL_GRAPHICS,
        }];
        let fence = slot.render_fence.handle();
        // only reset once nothing but the submission itself can fail
        slot.render_fence.reset()?;
        match executable.submit(&wait, &signal, fence) {
            Ok(cmd) => self.slots[frame_index].command_buffer = Some(cmd),
            Err(invalid) => {
                let reason = invalid.error();
                error!(?reason, "Failed to submit frame");
                return Err(self.restore_command_buffer(frame_index, reason, invalid.reset()));
            }
        }
        drop(submit_span);
        Ok(render_semaphore)
    }

    /// Puts a failed command buffer back into its slot so the next frame can use it
    fn restore_command_buffer(
        &mut self,
        frame_index: usize,
        reason: GpuError,
        reset: skein_gpu::Result<CommandBuffer<D>>,
    ) -> anyhow::Error {
        error!(?reason, frame_index, "Frame command buffer failed");
        match reset {
            Ok(cmd) => {
                self.slots[frame_index].command_buffer = Some(cmd);
                reason.into()
            }
            Err(err) => anyhow::Error::from(err).context(reason),
        }
    }

    fn record(
        &mut self,
        cmd: &CommandBufferRecording<D>,
        frame: &FrameContext,
        swapchain_image: SwapchainImage,
        scenes: &[&SceneGraph<D>],
        view_projection: glam::Mat4,
    ) {
        // chains with the acquire semaphore wait
        cmd.image_barrier(
            ImageBarrier::transition(
                swapchain_image.image,
                vk::ImageAspectFlags::COLOR,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            )
            .after(
                vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                vk::AccessFlags2::NONE,
            ),
        );
        let depth = self.depth.as_ref().map(|depth| {
            cmd.image_barrier(depth.layout_transition());
            AttachmentDesc {
                view: depth.image().view(),
                layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                clear: vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: 1.0,
                        stencil: 0,
                    },
                },
            }
        });
        cmd.begin_rendering(&RenderingDesc {
            extent: frame.extent,
            color: AttachmentDesc {
                view: swapchain_image.view,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                clear: vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: self.settings.clear_color,
                    },
                },
            },
            depth,
        });
        cmd.set_viewport_scissor(frame.extent);
        if self.pipeline.pipeline() != vk::Pipeline::null() {
            cmd.bind_pipeline(self.pipeline.pipeline());
        }
        cmd.bind_descriptor_set(
            self.pipeline.layout(),
            CAMERA_SET,
            self.slots[frame.slot].camera_set,
        );

        for scene in scenes {
            let (Some(vertices), Some(indices)) = (scene.vertex_buffer(), scene.index_buffer())
            else {
                continue;
            };
            let draws = DrawList::build(scene, view_projection);
            if draws.is_empty() {
                continue;
            }
            cmd.bind_vertex_buffer(vertices.handle());
            cmd.bind_index_buffer(indices.handle());
            draws.record(scene, &self.pipeline, cmd);
        }

        if let Some(overlay) = self.overlay.as_mut() {
            overlay.draw(cmd, frame);
        }
        cmd.end_rendering();
        cmd.image_barrier(ImageBarrier::transition(
            swapchain_image.image,
            vk::ImageAspectFlags::COLOR,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        ));
    }
}

impl<D: Device> Drop for FrameScheduler<D> {
    fn drop(&mut self) {
        if let Err(err) = self.device.device_wait_idle() {
            error!(?err, "Failed waiting for the device before teardown");
        }
    }
}
