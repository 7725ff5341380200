//! Engine orchestration: per-frame pipeline and motion model.

pub mod kalman;
pub mod prior;
pub mod slam;

pub use kalman::KalmanMotionModel;
pub use prior::{InterpolatedPosePrior, PosePrior};
pub use slam::{FrameSummary, Slam, StageDiagnostics};
