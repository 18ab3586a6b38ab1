//! Device lifecycle: pipeline state, statistics and shutdown coordination

mod controller;
mod state;

pub use controller::ShutdownController;
pub use state::{CaptureStats, PipelineState};
