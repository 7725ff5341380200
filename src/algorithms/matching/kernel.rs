//! Levenberg-Marquardt driver for the match-and-solve kernel.
//!
//! The outer loop alternates closest-point matching (every `icp_frequence`
//! iterations) with damped Gauss-Newton steps on the 6-DoF pose. A step is
//! accepted when it reduces the summed squared residual; the damping is then
//! divided by `lambda_ratio`, otherwise multiplied by it and the step
//! reverted, interpolating between Gauss-Newton and gradient descent.

use log::debug;
use nalgebra::{Cholesky, Matrix3, Matrix6, Vector3, Vector6};

use crate::config::{LmConfig, MatchingConfig};
use crate::core::types::{PointCloud, Pose6D};

use super::keypoint_map::KeypointMap;
use super::matcher::{build_residuals, BlobParams, MatchCounts};
use super::primitives::Residual;

/// Which parameter group the kernel runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Frame-to-frame registration against the previous sweep's keypoints.
    EgoMotion,
    /// Frame-to-map refinement against the rolling-map submap.
    Mapping,
}

/// Reason the kernel stopped iterating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Step size dropped below threshold.
    Converged,
    /// Iteration budget exhausted without convergence.
    MaxIterations,
    /// Damping grew past its cap: no descent direction found.
    Diverged,
    /// The damped normal equations could not be factorized.
    SolveFailed,
    /// Matching produced too few residuals to constrain the pose.
    InsufficientMatches,
}

/// Soft prior pulling the mapping pose toward a motion-model prediction.
#[derive(Debug, Clone)]
pub struct MotionPrior {
    /// Predicted pose.
    pub pose: Pose6D,
    /// Per-parameter inverse variance of the prediction.
    pub inv_variance: Vector6<f64>,
}

/// Current-sweep keypoints handed to the kernel.
#[derive(Debug, Clone, Copy)]
pub struct CurrentKeypoints<'a> {
    pub edges: &'a PointCloud,
    pub planars: &'a PointCloud,
    pub blobs: &'a PointCloud,
}

/// Outcome of one kernel run.
#[derive(Debug, Clone)]
pub struct MatchSolveResult {
    /// Refined pose (the initial pose when matching failed).
    pub pose: Pose6D,
    /// Whether the optimization converged.
    pub converged: bool,
    /// Outer iterations performed.
    pub iterations: u32,
    /// Residual count of the last matching pass.
    pub residual_count: usize,
    /// Summed squared residual at the final pose.
    pub final_cost: f64,
    /// Matched edges in the last matching pass.
    pub matched_edges: usize,
    /// Matched planes in the last matching pass.
    pub matched_planes: usize,
    /// Matched blobs in the last matching pass.
    pub matched_blobs: usize,
    /// Pose covariance estimate from the normal equations.
    pub covariance: Matrix6<f64>,
    /// Why iteration stopped.
    pub termination: TerminationReason,
}

/// The match-and-solve kernel for one stage.
pub struct MatchSolveKernel<'a> {
    stage: Stage,
    matching: &'a MatchingConfig,
    lm: &'a LmConfig,
    blob: BlobParams,
    undistortion: bool,
}

/// Fewer residuals than this cannot meaningfully constrain six parameters.
const MIN_RESIDUALS: usize = 10;

/// Step-norm threshold for convergence.
const STEP_EPSILON: f64 = 1e-7;

/// Gradient-norm threshold for convergence.
const GRADIENT_EPSILON: f64 = 1e-10;

/// Damping cap beyond which the optimization is declared divergent.
const LAMBDA_MAX: f64 = 1e10;

impl<'a> MatchSolveKernel<'a> {
    /// Create a kernel for one stage.
    pub fn new(
        stage: Stage,
        matching: &'a MatchingConfig,
        lm: &'a LmConfig,
        blob: BlobParams,
        undistortion: bool,
    ) -> Self {
        Self {
            stage,
            matching,
            lm,
            blob,
            undistortion,
        }
    }

    /// Run matching and optimization from an initial pose estimate.
    pub fn run(
        &self,
        current: CurrentKeypoints<'_>,
        map: &KeypointMap,
        initial: Pose6D,
        prior: Option<&MotionPrior>,
    ) -> MatchSolveResult {
        let mut pose = initial;
        let mut lambda = self.lm.lambda0;
        let mut residuals: Vec<Residual> = Vec::new();
        let mut counts = MatchCounts::default();
        let mut iterations = 0u32;
        let mut converged = false;
        let mut termination = TerminationReason::MaxIterations;
        let mut hessian = Matrix6::identity();
        let mut final_cost = f64::INFINITY;

        for iter in 0..self.matching.max_iter {
            iterations = iter + 1;

            if iter % self.matching.icp_frequence == 0 {
                let (r, c) = build_residuals(
                    self.matching,
                    &self.blob,
                    current.edges,
                    current.planars,
                    current.blobs,
                    map,
                    &pose,
                    self.undistortion,
                );
                residuals = r;
                counts = c;
                if residuals.len() < MIN_RESIDUALS {
                    debug!(
                        "{:?} matching found only {} residuals",
                        self.stage,
                        residuals.len()
                    );
                    termination = TerminationReason::InsufficientMatches;
                    break;
                }
            }

            let (h, g, cost) = normal_equations(&residuals, &pose, prior);
            hessian = h;
            final_cost = cost;

            // Already at a stationary point: nothing left to gain.
            if g.norm() < GRADIENT_EPSILON {
                converged = true;
                termination = TerminationReason::Converged;
                break;
            }

            let mut damped = h;
            for i in 0..6 {
                damped[(i, i)] += lambda * h[(i, i)];
            }
            let delta = match Cholesky::new(damped) {
                Some(chol) => chol.solve(&(-g)),
                None => {
                    termination = TerminationReason::SolveFailed;
                    break;
                }
            };

            let candidate = Pose6D::from_vector(&(pose.as_vector() + delta));
            let candidate_cost = evaluate_cost(&residuals, &candidate, prior);

            if candidate_cost < cost {
                pose = candidate;
                final_cost = candidate_cost;
                lambda = (lambda / self.lm.lambda_ratio).max(1e-12);
                if delta.norm() < STEP_EPSILON {
                    converged = true;
                    termination = TerminationReason::Converged;
                    break;
                }
            } else {
                lambda *= self.lm.lambda_ratio;
                if lambda > LAMBDA_MAX {
                    termination = TerminationReason::Diverged;
                    break;
                }
            }
        }

        MatchSolveResult {
            pose,
            converged,
            iterations,
            residual_count: residuals.len(),
            final_cost: if final_cost.is_finite() { final_cost } else { 0.0 },
            matched_edges: counts.edges,
            matched_planes: counts.planes,
            matched_blobs: counts.blobs,
            covariance: covariance_estimate(&hessian, final_cost, residuals.len()),
            termination,
        }
    }
}

/// Residual vector of one match at a pose.
fn residual_vector(r: &Residual, pose: &Pose6D) -> Vector3<f64> {
    let moved = if r.time_fraction < 1.0 {
        pose.interpolate(r.time_fraction).transform_point(&r.x)
    } else {
        pose.transform_point(&r.x)
    };
    r.weight.sqrt() * (r.a_sqrt * (moved - r.p))
}

/// Summed squared residual, including the motion-model prior rows.
fn evaluate_cost(residuals: &[Residual], pose: &Pose6D, prior: Option<&MotionPrior>) -> f64 {
    let mut cost: f64 = residuals
        .iter()
        .map(|r| residual_vector(r, pose).norm_squared())
        .sum();
    if let Some(prior) = prior {
        let diff = pose.as_vector() - prior.pose.as_vector();
        for i in 0..6 {
            cost += prior.inv_variance[i] * diff[i] * diff[i];
        }
    }
    cost
}

/// Accumulate `JᵀJ`, `Jᵀr` and the cost at the current pose.
///
/// The rotation derivatives are the closed-form partials of the Euler
/// rotation `Rz * Ry * Rx`. Under undistortion a residual acquired at time
/// fraction `s` sees the interpolated pose, so its Jacobian carries the
/// chain-rule factor `s` and the derivatives are evaluated at the scaled
/// angles.
fn normal_equations(
    residuals: &[Residual],
    pose: &Pose6D,
    prior: Option<&MotionPrior>,
) -> (Matrix6<f64>, Vector6<f64>, f64) {
    let mut h = Matrix6::zeros();
    let mut g = Vector6::zeros();
    let mut cost = 0.0;

    for r in residuals {
        let s = r.time_fraction;
        let (value, d_rot) = if s < 1.0 {
            let value = residual_vector(r, pose);
            let d = rotation_derivatives(s * pose.rx, s * pose.ry, s * pose.rz);
            (value, d)
        } else {
            let value = residual_vector(r, pose);
            (value, rotation_derivatives(pose.rx, pose.ry, pose.rz))
        };
        cost += value.norm_squared();

        let sqrt_w = r.weight.sqrt();
        let weighted = sqrt_w * r.a_sqrt;

        // Columns 0..3: rotation parameters; columns 3..6: translation.
        let mut jacobian = [Vector3::zeros(); 6];
        for k in 0..3 {
            jacobian[k] = s * (weighted * (d_rot[k] * r.x));
        }
        for k in 0..3 {
            let mut unit = Vector3::zeros();
            unit[k] = s;
            jacobian[3 + k] = weighted * unit;
        }

        for a in 0..6 {
            g[a] += jacobian[a].dot(&value);
            for b in a..6 {
                let v = jacobian[a].dot(&jacobian[b]);
                h[(a, b)] += v;
                if a != b {
                    h[(b, a)] += v;
                }
            }
        }
    }

    if let Some(prior) = prior {
        let diff = pose.as_vector() - prior.pose.as_vector();
        for i in 0..6 {
            h[(i, i)] += prior.inv_variance[i];
            g[i] += prior.inv_variance[i] * diff[i];
            cost += prior.inv_variance[i] * diff[i] * diff[i];
        }
    }

    (h, g, cost)
}

/// Partial derivatives of `R = Rz(rz) * Ry(ry) * Rx(rx)` with respect to the
/// three angles.
fn rotation_derivatives(rx: f64, ry: f64, rz: f64) -> [Matrix3<f64>; 3] {
    let (sx, cx) = rx.sin_cos();
    let (sy, cy) = ry.sin_cos();
    let (sz, cz) = rz.sin_cos();

    let r_x = Matrix3::new(1.0, 0.0, 0.0, 0.0, cx, -sx, 0.0, sx, cx);
    let r_y = Matrix3::new(cy, 0.0, sy, 0.0, 1.0, 0.0, -sy, 0.0, cy);
    let r_z = Matrix3::new(cz, -sz, 0.0, sz, cz, 0.0, 0.0, 0.0, 1.0);

    let d_x = Matrix3::new(0.0, 0.0, 0.0, 0.0, -sx, -cx, 0.0, cx, -sx);
    let d_y = Matrix3::new(-sy, 0.0, cy, 0.0, 0.0, 0.0, -cy, 0.0, -sy);
    let d_z = Matrix3::new(-sz, -cz, 0.0, cz, -sz, 0.0, 0.0, 0.0, 0.0);

    [r_z * r_y * d_x, r_z * d_y * r_x, d_z * r_y * r_x]
}

/// Pose covariance from the Gauss-Newton Hessian, scaled by the residual
/// variance.
fn covariance_estimate(h: &Matrix6<f64>, cost: f64, residual_count: usize) -> Matrix6<f64> {
    let dof = (3 * residual_count).saturating_sub(6).max(1) as f64;
    let sigma2 = if cost.is_finite() { cost / dof } else { 1.0 };
    match h.try_inverse() {
        Some(inv) => inv * sigma2.max(1e-12),
        None => Matrix6::identity(),
    }
}
