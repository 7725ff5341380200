//! Constant-velocity Kalman motion model.
//!
//! The state is a 12-vector: the 6-DoF pose `(rx, ry, rz, tx, ty, tz)` and
//! its first time-derivatives. The transition model is constant velocity
//! over the inter-sweep interval; the process noise is parameterised by
//! worst-case linear and angular acceleration bounds. The mapping-stage pose
//! is the measurement; an auxiliary sensor can additionally observe the
//! velocity norm.

use nalgebra::{Matrix6, SMatrix, SVector, Vector6};

use crate::config::KalmanConfig;
use crate::core::types::Pose6D;

type State = SVector<f64, 12>;
type StateCov = SMatrix<f64, 12, 12>;

/// Prediction of the pose at a query time, with per-parameter variance.
#[derive(Debug, Clone)]
pub struct MotionPrediction {
    /// Predicted pose.
    pub pose: Pose6D,
    /// Predicted variance of each pose parameter.
    pub variance: Vector6<f64>,
}

/// 12-state constant-velocity predictor/corrector.
#[derive(Debug, Clone)]
pub struct KalmanMotionModel {
    config: KalmanConfig,
    state: State,
    covariance: StateCov,
    last_time: Option<f64>,
    n_measures: usize,
}

/// Initial variance of the pose block before any measurement.
const INITIAL_POSE_VARIANCE: f64 = 1e-2;

/// Initial variance of the velocity block before any measurement.
const INITIAL_VELOCITY_VARIANCE: f64 = 1.0;

impl KalmanMotionModel {
    /// Create a filter at rest with no measurements observed.
    pub fn new(config: KalmanConfig) -> Self {
        let mut filter = Self {
            config,
            state: State::zeros(),
            covariance: StateCov::zeros(),
            last_time: None,
            n_measures: 0,
        };
        filter.reset();
        filter
    }

    /// Forget all state and measurements.
    pub fn reset(&mut self) {
        self.state = State::zeros();
        self.covariance = StateCov::zeros();
        for i in 0..6 {
            self.covariance[(i, i)] = INITIAL_POSE_VARIANCE;
            self.covariance[(i + 6, i + 6)] = INITIAL_VELOCITY_VARIANCE;
        }
        self.last_time = None;
        self.n_measures = 0;
    }

    /// Number of pose measurements observed so far.
    #[inline]
    pub fn n_measures(&self) -> usize {
        self.n_measures
    }

    /// Current pose estimate.
    pub fn pose(&self) -> Pose6D {
        Pose6D::from_vector(&self.state.fixed_rows::<6>(0).into_owned())
    }

    /// Constant-velocity transition matrix over `dt`.
    fn transition(dt: f64) -> StateCov {
        let mut f = StateCov::identity();
        for i in 0..6 {
            f[(i, i + 6)] = dt;
        }
        f
    }

    /// Worst-case process covariance over `dt`.
    fn process_noise(&self, dt: f64) -> StateCov {
        let mut q = StateCov::zeros();
        for i in 0..6 {
            let accel = if i < 3 {
                self.config.max_angle_acceleration
            } else {
                self.config.max_velocity_acceleration
            };
            let pose_sigma = 0.5 * accel * dt * dt;
            let velocity_sigma = accel * dt;
            q[(i, i)] = pose_sigma * pose_sigma;
            q[(i + 6, i + 6)] = velocity_sigma * velocity_sigma;
        }
        q
    }

    /// Predict the pose at a query time without mutating the filter.
    ///
    /// Returns `None` until two measurements have been observed (the
    /// velocity block is unconstrained before that).
    pub fn predict_at(&self, time: f64) -> Option<MotionPrediction> {
        if self.n_measures < 2 {
            return None;
        }
        let dt = time - self.last_time?;
        let f = Self::transition(dt);
        let predicted = f * self.state;
        let cov = f * self.covariance * f.transpose() + self.process_noise(dt);

        let mut variance = Vector6::zeros();
        for i in 0..6 {
            variance[i] = cov[(i, i)].max(1e-12);
        }
        Some(MotionPrediction {
            pose: Pose6D::from_vector(&predicted.fixed_rows::<6>(0).into_owned()),
            variance,
        })
    }

    /// Observe a mapping-stage pose: predict to `time`, then update.
    pub fn observe(&mut self, pose: &Pose6D, measure_cov: &Matrix6<f64>, time: f64) {
        if self.n_measures == 0 {
            self.state.fixed_rows_mut::<6>(0).copy_from(&pose.as_vector());
            self.last_time = Some(time);
            self.n_measures = 1;
            return;
        }

        let dt = time - self.last_time.unwrap_or(time);
        let f = Self::transition(dt);
        self.state = f * self.state;
        self.covariance = f * self.covariance * f.transpose() + self.process_noise(dt);

        // Measurement model: the pose block directly.
        let mut h = SMatrix::<f64, 6, 12>::zeros();
        for i in 0..6 {
            h[(i, i)] = 1.0;
        }
        let innovation = pose.as_vector() - h * self.state;
        let s = h * self.covariance * h.transpose() + measure_cov;
        let Some(s_inv) = s.try_inverse() else {
            // Degenerate measurement covariance: trust the measurement.
            self.state.fixed_rows_mut::<6>(0).copy_from(&pose.as_vector());
            self.last_time = Some(time);
            self.n_measures += 1;
            return;
        };
        let gain = self.covariance * h.transpose() * s_inv;
        self.state += gain * innovation;
        self.covariance = (StateCov::identity() - gain * h) * self.covariance;

        self.last_time = Some(time);
        self.n_measures += 1;
    }

    /// Fuse an external velocity-norm measurement (auxiliary sensor mode).
    pub fn observe_velocity_norm(&mut self, speed: f64) {
        let velocity = self.state.fixed_rows::<3>(9).into_owned();
        let norm = velocity.norm();
        if norm < 1e-9 {
            return;
        }

        // Linearised measurement: d|v|/dv is the unit velocity direction.
        let mut h = SMatrix::<f64, 1, 12>::zeros();
        for i in 0..3 {
            h[(0, 9 + i)] = velocity[i] / norm;
        }
        let innovation = speed - norm;
        let s = (h * self.covariance * h.transpose())[(0, 0)] + self.config.velocity_norm_cov;
        if s <= 0.0 {
            return;
        }
        let gain = self.covariance * h.transpose() / s;
        self.state += gain * innovation;
        self.covariance = (StateCov::identity() - gain * h) * self.covariance;
    }
}
