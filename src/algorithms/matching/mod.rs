//! Match-and-solve kernel.
//!
//! Given the keypoints of the current sweep and a neighbor source (the
//! previous sweep's keypoints for ego-motion, a rolling-map submap for
//! mapping), the kernel matches every current keypoint to a geometric
//! primitive fitted to its nearest neighbors on the reference side: a line
//! through edge neighbors, a plane through planar neighbors, optionally a
//! softened isotropic blob. Each match contributes a residual
//!
//! ```text
//! e(R, t) = sqrt(w) * L * (R * X + t - P)
//! ```
//!
//! where `L` is the square root of the primitive's distance matrix `A`
//! (`n*nᵀ` for planes, `(I - n*nᵀ)ᵀ(I - n*nᵀ)` for lines), `P` the anchor
//! on the primitive and `w` a bounded outlier attenuation. The 6-DoF pose
//! minimizing the summed squared residuals is found with
//! Levenberg-Marquardt; matching is re-run periodically as the pose moves.

mod kernel;
mod keypoint_map;
mod matcher;
mod primitives;

pub use kernel::{
    CurrentKeypoints, MatchSolveKernel, MatchSolveResult, MotionPrior, Stage, TerminationReason,
};
pub use keypoint_map::{KeypointMap, Neighbor};
pub use matcher::BlobParams;
pub use primitives::Residual;
