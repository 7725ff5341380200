//! Engine configuration.
//!
//! A single [`SlamConfig`] record covers the full recognised option set,
//! grouped per subsystem. Configurations can be built in code or loaded from
//! TOML; unknown keys are rejected at parse time and out-of-range values by
//! [`SlamConfig::validate`].

mod grid;
mod kalman;
mod keypoints;
mod matching;

pub use grid::RollingGridConfig;
pub use kalman::KalmanConfig;
pub use keypoints::KeypointConfig;
pub use matching::{LmConfig, MatchingConfig};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SlamError};

/// Motion-model selection for the mapping stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionModel {
    /// No motion model.
    None,
    /// Kalman-augmented mapping: a constant-velocity filter predicts the
    /// pose and softly constrains the mapping optimization.
    Kalman,
}

/// The full engine configuration record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SlamConfig {
    /// Attach per-point debug arrays (curvature, validity, labels) to the
    /// frame summary.
    pub display_mode: bool,

    /// When true, mapping inserts the sparse ego-motion planar keypoints;
    /// when false, a denser planar cloud (every non-invalidated
    /// low-curvature point) thickens the map.
    pub fast_slam: bool,

    /// Enable per-point motion undistortion inside the sweep.
    pub undistortion: bool,

    /// Motion model used to seed and stabilise mapping.
    pub motion_model: MotionModel,

    /// Sanity cap on the estimated inter-frame displacement, meters.
    /// Exceeding it rejects the frame.
    pub max_dist_between_frames: f64,

    /// Half-extent, meters, of the submap extracted around the sensor for
    /// frame-to-map matching.
    pub max_icp_matching_distance: f64,

    /// Maximal azimuthal angle resolution of the sensor, radians.
    pub angle_resolution: f64,

    /// Number of laser beams. When absent, the calibration is inferred from
    /// the first frame.
    pub n_lasers: Option<usize>,

    /// Keypoint extraction parameters.
    pub keypoints: KeypointConfig,

    /// Frame-to-frame matching parameters.
    #[serde(default = "MatchingConfig::ego_motion")]
    pub ego_motion: MatchingConfig,

    /// Frame-to-map matching parameters.
    #[serde(default = "MatchingConfig::mapping")]
    pub mapping: MatchingConfig,

    /// Rolling grid parameters.
    pub rolling_grid: RollingGridConfig,

    /// Levenberg-Marquardt damping schedule.
    pub lm: LmConfig,

    /// Motion-model Kalman filter parameters.
    pub kalman: KalmanConfig,
}

impl Default for SlamConfig {
    fn default() -> Self {
        Self {
            display_mode: false,
            fast_slam: true,
            undistortion: false,
            motion_model: MotionModel::None,
            max_dist_between_frames: 10.0,
            max_icp_matching_distance: 20.0,
            angle_resolution: 0.00698,
            n_lasers: None,
            keypoints: KeypointConfig::default(),
            ego_motion: MatchingConfig::ego_motion(),
            mapping: MatchingConfig::mapping(),
            rolling_grid: RollingGridConfig::default(),
            lm: LmConfig::default(),
            kalman: KalmanConfig::default(),
        }
    }
}

impl SlamConfig {
    /// Parse a configuration from TOML text. Unknown keys are rejected.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: SlamConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every option for range validity.
    pub fn validate(&self) -> Result<()> {
        fn positive(name: &str, value: f64) -> Result<()> {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(SlamError::ConfigInvalid(format!(
                    "{name} must be positive, got {value}"
                )))
            }
        }
        fn unit_interval(name: &str, value: f64) -> Result<()> {
            if value > 0.0 && value <= 1.0 {
                Ok(())
            } else {
                Err(SlamError::ConfigInvalid(format!(
                    "{name} must lie in (0, 1], got {value}"
                )))
            }
        }

        positive("max_dist_between_frames", self.max_dist_between_frames)?;
        positive("max_icp_matching_distance", self.max_icp_matching_distance)?;
        positive("angle_resolution", self.angle_resolution)?;
        if let Some(n) = self.n_lasers {
            if n == 0 {
                return Err(SlamError::ConfigInvalid("n_lasers must be non-zero".into()));
            }
        }

        let kp = &self.keypoints;
        if kp.neighbor_width == 0 {
            return Err(SlamError::ConfigInvalid(
                "keypoints.neighbor_width must be at least 1".into(),
            ));
        }
        if kp.max_edges_per_line == 0 || kp.max_planars_per_line == 0 {
            return Err(SlamError::ConfigInvalid(
                "keypoints.max_edges_per_line and max_planars_per_line must be at least 1".into(),
            ));
        }
        if kp.min_distance_to_sensor < 0.0 {
            return Err(SlamError::ConfigInvalid(
                "keypoints.min_distance_to_sensor must be non-negative".into(),
            ));
        }
        unit_interval("keypoints.edge_sin_angle_threshold", kp.edge_sin_angle_threshold)?;
        unit_interval("keypoints.plane_sin_angle_threshold", kp.plane_sin_angle_threshold)?;
        positive("keypoints.edge_depth_gap_threshold", kp.edge_depth_gap_threshold)?;
        unit_interval("keypoints.sphericity_threshold", kp.sphericity_threshold)?;
        positive("keypoints.incertitude_coef", kp.incertitude_coef)?;

        for (stage, m) in [("ego_motion", &self.ego_motion), ("mapping", &self.mapping)] {
            if m.max_iter == 0 || m.icp_frequence == 0 {
                return Err(SlamError::ConfigInvalid(format!(
                    "{stage}.max_iter and icp_frequence must be at least 1"
                )));
            }
            if m.line_neighbors < 2 {
                return Err(SlamError::ConfigInvalid(format!(
                    "{stage}.line_neighbors must be at least 2"
                )));
            }
            if m.min_line_neighbors < 2 || m.min_line_neighbors > m.line_neighbors {
                return Err(SlamError::ConfigInvalid(format!(
                    "{stage}.min_line_neighbors must lie in [2, line_neighbors]"
                )));
            }
            if m.plane_neighbors < 3 {
                return Err(SlamError::ConfigInvalid(format!(
                    "{stage}.plane_neighbors must be at least 3"
                )));
            }
            positive(&format!("{stage}.line_distance_factor"), m.line_distance_factor)?;
            positive(&format!("{stage}.plane_distance_factor1"), m.plane_distance_factor1)?;
            positive(&format!("{stage}.plane_distance_factor2"), m.plane_distance_factor2)?;
            positive(&format!("{stage}.max_line_distance"), m.max_line_distance)?;
            positive(&format!("{stage}.max_plane_distance"), m.max_plane_distance)?;
            if let Some(d) = m.line_max_dist_inlier {
                positive(&format!("{stage}.line_max_dist_inlier"), d)?;
            }
        }

        let grid = &self.rolling_grid;
        positive("rolling_grid.voxel_size", grid.voxel_size)?;
        positive("rolling_grid.leaf_filter_size", grid.leaf_filter_size)?;
        for (axis, &dim) in grid.grid_dims.iter().enumerate() {
            if dim < 3 {
                return Err(SlamError::ConfigInvalid(format!(
                    "rolling_grid.grid_dims[{axis}] must be at least 3"
                )));
            }
        }
        if grid.intra_voxel_dims.iter().any(|&d| d == 0) {
            return Err(SlamError::ConfigInvalid(
                "rolling_grid.intra_voxel_dims must be non-zero".into(),
            ));
        }

        positive("lm.lambda0", self.lm.lambda0)?;
        if self.lm.lambda_ratio <= 1.0 {
            return Err(SlamError::ConfigInvalid(
                "lm.lambda_ratio must be greater than 1".into(),
            ));
        }

        positive("kalman.max_velocity_acceleration", self.kalman.max_velocity_acceleration)?;
        positive("kalman.max_angle_acceleration", self.kalman.max_angle_acceleration)?;
        positive("kalman.velocity_norm_cov", self.kalman.velocity_norm_cov)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        SlamConfig::default().validate().unwrap();
    }

    #[test]
    fn test_unknown_option_rejected() {
        let toml = r#"
            fast_slam = true
            not_an_option = 3
        "#;
        let err = SlamConfig::from_toml_str(toml).unwrap_err();
        assert!(matches!(err, SlamError::ConfigInvalid(_)));
    }

    #[test]
    fn test_unknown_nested_option_rejected() {
        let toml = r#"
            [keypoints]
            neighbor_width = 5
            curvature_mode = "fancy"
        "#;
        assert!(SlamConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml = r#"
            undistortion = true

            [keypoints]
            min_distance_to_sensor = 0.5
        "#;
        let config = SlamConfig::from_toml_str(toml).unwrap();
        assert!(config.undistortion);
        assert_eq!(config.keypoints.min_distance_to_sensor, 0.5);
        assert_eq!(config.keypoints.neighbor_width, 4);
        assert_eq!(config.mapping.line_max_dist_inlier, Some(0.2));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut config = SlamConfig::default();
        config.keypoints.edge_sin_angle_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = SlamConfig::default();
        config.rolling_grid.grid_dims = [48, 2, 48];
        assert!(config.validate().is_err());

        let mut config = SlamConfig::default();
        config.lm.lambda_ratio = 0.5;
        assert!(config.validate().is_err());

        let mut config = SlamConfig::default();
        config.ego_motion.min_line_neighbors = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_motion_model_from_toml() {
        let config = SlamConfig::from_toml_str("motion_model = \"kalman\"").unwrap();
        assert_eq!(config.motion_model, MotionModel::Kalman);
    }
}
