pub mod format;
pub mod immediate_submit;

pub use immediate_submit::ImmediateSubmit;
