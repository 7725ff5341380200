//! Motion-model Kalman filter parameters.

use serde::{Deserialize, Serialize};

/// Configuration for the constant-velocity motion model.
///
/// The acceleration bounds are treated as worst-case values endured by the
/// vehicle; the process covariance grows as `(a * dt)²`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KalmanConfig {
    /// Worst-case linear acceleration, m/s².
    pub max_velocity_acceleration: f64,

    /// Worst-case angular acceleration, rad/s².
    pub max_angle_acceleration: f64,

    /// Variance of the external velocity-norm measurement (mode with an
    /// auxiliary velocity sensor).
    pub velocity_norm_cov: f64,
}

impl Default for KalmanConfig {
    fn default() -> Self {
        Self {
            max_velocity_acceleration: 10.0,
            max_angle_acceleration: 2.0,
            velocity_norm_cov: 0.1,
        }
    }
}
