//! Frame scheduling on top of `skein_gpu`.
//!
//! [`FrameScheduler`] owns the swapchain, the depth target and a fixed number of frame slots. Each
//! call to [`FrameScheduler::render_frame`] records the visible primitives of the given scene
//! graphs into the next slot and presents the result.

pub mod camera;
pub mod depth;
pub mod draw_list;
pub mod frame;
pub mod overlay;
pub mod pipeline;
pub mod scheduler;
pub mod settings;

pub use camera::CameraUniform;
pub use depth::DepthTarget;
pub use draw_list::{DrawItem, DrawList};
pub use frame::FrameSlot;
pub use overlay::{FrameContext, Overlay};
pub use pipeline::ScenePipeline;
pub use scheduler::{FrameOutcome, FrameScheduler, WindowEvent};
pub use settings::RendererSettings;
