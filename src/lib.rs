//! GatiSLAM - LOAM-style LiDAR odometry and mapping for spinning multi-beam
//! sensors.
//!
//! Given a stream of sweeps (sparse 3D point clouds acquired across one
//! sensor revolution), the engine estimates the 6-DoF pose of the sensor in
//! a fixed world frame and incrementally builds a sparse keypoint map.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                      io/                            │  ← Persistence
//! │                 (trajectory log)                    │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                    engine/                          │  ← Orchestration
//! │          (per-frame pipeline, motion model)         │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                  algorithms/                        │  ← Core algorithms
//! │      (keypoints, match-and-solve, rolling map)      │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                   sensors/                          │  ← Sensor processing
//! │           (calibration, sweep splitting)            │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     core/                           │  ← Foundation
//! │                 (types, math)                       │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Pipeline per sweep
//!
//! 1. Sort the raw cloud into scan lines (vertical-angle order).
//! 2. Per-line curvature analysis labels edge and planar keypoints, with
//!    occlusion and beam-angle rejection.
//! 3. Ego-motion: register the keypoints against the previous sweep's
//!    keypoints (point-to-line and point-to-plane residuals minimised by
//!    Levenberg-Marquardt).
//! 4. Optionally undistort the sweep under a constant-velocity motion model.
//! 5. Mapping: refine the pose against a rolling voxel map of accumulated
//!    keypoints, then insert the sweep into the map.
//!
//! The engine never aborts on degraded input: frames with implausible
//! motion are rejected without touching state, and recoverable conditions
//! (sparse submaps, exhausted iteration budgets) surface as diagnostics on
//! the per-frame summary.

// ============================================================================
// Layer 1: Core foundation (no internal deps)
// ============================================================================
pub mod core;

// ============================================================================
// Layer 2: Configuration and errors
// ============================================================================
pub mod config;
pub mod error;

// ============================================================================
// Layer 3: Sensor processing (depends on core)
// ============================================================================
pub mod sensors;

// ============================================================================
// Layer 4: Algorithms (depends on core, config)
// ============================================================================
pub mod algorithms;

// ============================================================================
// Layer 5: Engine and I/O (depends on all layers)
// ============================================================================
pub mod engine;
pub mod io;

// ============================================================================
// Convenience re-exports (flat namespace for common use)
// ============================================================================

pub use config::{
    KalmanConfig, KeypointConfig, LmConfig, MatchingConfig, MotionModel, RollingGridConfig,
    SlamConfig,
};
pub use crate::core::types::{PointCloud, Pose6D, SweepPoint, Trajectory, TrajectoryEntry};
pub use error::{Result, SlamError};

pub use sensors::{LaserCalibration, RawPoint, SweepFrame};

pub use algorithms::keypoints::{ExtractedKeypoints, KeypointExtractor, PointLabel};
pub use algorithms::mapping::RollingGrid;
pub use algorithms::matching::{
    KeypointMap, MatchSolveKernel, MatchSolveResult, MotionPrior, Stage,
};

pub use engine::{FrameSummary, InterpolatedPosePrior, KalmanMotionModel, PosePrior, Slam};
