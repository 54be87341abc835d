//! Presenter state machines
//!
//! - [`RenderStateMachine`] - lifecycle gate (Shutdown/Stopped/Started/Paused)
//! - [`FrameStepController`] - single-frame advance layered on top of it

mod frame_step;
mod render;

pub use frame_step::{FrameStepController, FrameStepState, StepDecision, StepProgress};
pub use render::{RenderState, RenderStateMachine};
