//! Per-frame SLAM pipeline.
//!
//! For every incoming sweep: split into scan lines, extract keypoints,
//! register against the previous sweep's keypoints (ego-motion), guard
//! against implausible displacements, optionally undistort, refine against
//! the rolling map (mapping) and commit the refined pose, trajectory entry
//! and map insertions. The pipeline is single-threaded at sweep granularity;
//! parallelism only occurs inside extraction and matching, and all shared
//! state is written between those phases.

use log::warn;
use nalgebra::{Matrix4, Matrix6};

use crate::algorithms::keypoints::{ExtractedKeypoints, KeypointExtractor, ScanLineDebug};
use crate::algorithms::mapping::RollingGrid;
use crate::algorithms::matching::{
    BlobParams, CurrentKeypoints, KeypointMap, MatchSolveKernel, MatchSolveResult, MotionPrior,
    Stage, TerminationReason,
};
use crate::config::{MotionModel, SlamConfig};
use crate::core::types::{PointCloud, Pose6D, Trajectory};
use crate::error::{Result, SlamError};
use crate::sensors::{split_scan_lines, LaserCalibration, SweepFrame};

use super::kalman::KalmanMotionModel;
use super::prior::PosePrior;

/// Diagnostics of one kernel run.
#[derive(Debug, Clone)]
pub struct StageDiagnostics {
    /// Whether the optimization converged.
    pub converged: bool,
    /// Outer iterations performed.
    pub iterations: u32,
    /// Residuals in the last matching pass.
    pub residuals: usize,
    /// Summed squared residual at the final pose.
    pub final_cost: f64,
    /// Matched edge keypoints.
    pub matched_edges: usize,
    /// Matched planar keypoints.
    pub matched_planes: usize,
    /// Matched blob keypoints.
    pub matched_blobs: usize,
}

impl From<&MatchSolveResult> for StageDiagnostics {
    fn from(result: &MatchSolveResult) -> Self {
        Self {
            converged: result.converged,
            iterations: result.iterations,
            residuals: result.residual_count,
            final_cost: result.final_cost,
            matched_edges: result.matched_edges,
            matched_planes: result.matched_planes,
            matched_blobs: result.matched_blobs,
        }
    }
}

/// Per-frame output: the pose stream plus non-fatal diagnostics.
#[derive(Debug, Clone)]
pub struct FrameSummary {
    /// Timestamp of the processed sweep.
    pub timestamp: f64,
    /// Index of this frame among accepted frames.
    pub frame_index: u64,
    /// Pose of this sweep's end frame in the previous sweep's end frame.
    pub t_relative: Pose6D,
    /// Pose of this sweep's end frame in the world frame.
    pub t_world: Pose6D,
    /// Extracted edge keypoints.
    pub edge_count: usize,
    /// Extracted planar keypoints.
    pub planar_count: usize,
    /// Extracted blob keypoints.
    pub blob_count: usize,
    /// Ego-motion diagnostics (absent on the first frame).
    pub ego_motion: Option<StageDiagnostics>,
    /// Mapping diagnostics (absent on the first frame or when skipped).
    pub mapping: Option<StageDiagnostics>,
    /// True when the rolling-map submap was too sparse to refine against;
    /// the pose advanced by ego-motion alone.
    pub mapping_skipped: bool,
    /// Per-scan-line metric arrays, present in display mode.
    pub keypoint_debug: Option<Vec<ScanLineDebug>>,
}

/// The LOAM-style odometry and mapping engine.
pub struct Slam {
    config: SlamConfig,
    extractor: KeypointExtractor,
    calibration: Option<LaserCalibration>,
    t_world: Pose6D,
    trajectory: Trajectory,
    previous_keypoints: Option<KeypointMap>,
    edge_map: RollingGrid,
    planar_map: RollingGrid,
    blob_map: RollingGrid,
    kalman: KalmanMotionModel,
    pose_prior: Option<Box<dyn PosePrior>>,
    frames_processed: u64,
}

impl Slam {
    /// Create an engine from a validated configuration.
    pub fn new(config: SlamConfig) -> Result<Self> {
        config.validate()?;
        let extractor = KeypointExtractor::new(
            config.keypoints.clone(),
            config.angle_resolution,
            config.display_mode,
        );
        let kalman = KalmanMotionModel::new(config.kalman.clone());
        Ok(Self {
            extractor,
            kalman,
            calibration: None,
            t_world: Pose6D::identity(),
            trajectory: Trajectory::new(),
            previous_keypoints: None,
            edge_map: RollingGrid::new(config.rolling_grid.clone()),
            planar_map: RollingGrid::new(config.rolling_grid.clone()),
            blob_map: RollingGrid::new(config.rolling_grid.clone()),
            pose_prior: None,
            frames_processed: 0,
            config,
        })
    }

    /// Provide the sensor calibration: `mapping[laser_id]` is the
    /// vertical-angle rank of that beam.
    pub fn set_calibration(&mut self, mapping: Vec<usize>) -> Result<()> {
        self.calibration = Some(LaserCalibration::from_mapping(mapping)?);
        Ok(())
    }

    /// Whether a sensor calibration is available.
    pub fn has_calibration(&self) -> bool {
        self.calibration.is_some()
    }

    /// Install an external pose prior.
    pub fn set_pose_prior(&mut self, prior: Box<dyn PosePrior>) {
        self.pose_prior = Some(prior);
    }

    /// Feed an external velocity-norm measurement (wheel odometry, GPS
    /// speed) into the motion model. No-op unless the Kalman motion model
    /// is enabled.
    pub fn observe_velocity_norm(&mut self, speed: f64) {
        if self.config.motion_model == MotionModel::Kalman {
            self.kalman.observe_velocity_norm(speed);
        }
    }

    /// Current world pose of the sensor.
    pub fn world_pose(&self) -> Pose6D {
        self.t_world
    }

    /// Current world pose as a homogeneous matrix.
    pub fn world_transform(&self) -> Matrix4<f64> {
        self.t_world.to_matrix4()
    }

    /// The pose history, one entry per accepted sweep.
    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    /// Total point count across the rolling maps.
    pub fn map_point_count(&self) -> usize {
        self.edge_map.num_points() + self.planar_map.num_points() + self.blob_map.num_points()
    }

    /// The configuration in effect.
    pub fn config(&self) -> &SlamConfig {
        &self.config
    }

    /// Clear the map, trajectory and carried state; the configuration and
    /// sensor calibration survive.
    pub fn reset(&mut self) {
        self.t_world = Pose6D::identity();
        self.trajectory.clear();
        self.previous_keypoints = None;
        self.edge_map = RollingGrid::new(self.config.rolling_grid.clone());
        self.planar_map = RollingGrid::new(self.config.rolling_grid.clone());
        self.blob_map = RollingGrid::new(self.config.rolling_grid.clone());
        self.kalman.reset();
        self.frames_processed = 0;
    }

    /// Run keypoint extraction only, without advancing any state. Useful for
    /// inspecting what the extractor sees in a frame.
    pub fn keypoints_only(&mut self, frame: &SweepFrame) -> Result<ExtractedKeypoints> {
        self.ensure_calibration(frame)?;
        let calibration = self.calibration.as_ref().ok_or_else(|| {
            SlamError::ConfigInvalid("sensor calibration unavailable".into())
        })?;
        let scan_lines = split_scan_lines(frame, calibration)?;
        Ok(self.extractor.extract(&scan_lines))
    }

    /// Process one sweep: estimate the pose, update the trajectory and map.
    ///
    /// Returns `FrameRejected` when the sweep has no recognisable scan-line
    /// structure or the estimated displacement exceeds the inter-frame cap;
    /// in both cases the engine state is left untouched.
    pub fn process_frame(&mut self, frame: &SweepFrame) -> Result<FrameSummary> {
        self.ensure_calibration(frame)?;
        let calibration = self.calibration.as_ref().ok_or_else(|| {
            SlamError::ConfigInvalid("sensor calibration unavailable".into())
        })?;
        let scan_lines = split_scan_lines(frame, calibration)?;
        let keypoints = self.extractor.extract(&scan_lines);

        if self.frames_processed == 0 {
            return Ok(self.commit_first_frame(frame.timestamp, keypoints));
        }

        // === Ego-motion: register against the previous sweep's keypoints.
        let seed = self.ego_motion_seed(frame.timestamp);
        let Some(previous) = self.previous_keypoints.as_ref() else {
            return Err(SlamError::FrameRejected(
                "no previous keypoints available".into(),
            ));
        };
        let empty = PointCloud::new();
        let ego_kernel = MatchSolveKernel::new(
            Stage::EgoMotion,
            &self.config.ego_motion,
            &self.config.lm,
            BlobParams::disabled(),
            self.config.undistortion,
        );
        let ego_result = ego_kernel.run(
            CurrentKeypoints {
                edges: &keypoints.edges,
                planars: &keypoints.planars,
                blobs: &empty,
            },
            previous,
            seed,
            None,
        );
        if !ego_result.converged {
            warn!(
                "ego-motion did not converge ({:?} after {} iterations)",
                ego_result.termination, ego_result.iterations
            );
        }
        let t_relative = ego_result.pose;

        // === Over-speed guard: nothing has been mutated yet.
        if t_relative.translation_norm() > self.config.max_dist_between_frames {
            return Err(SlamError::FrameRejected(format!(
                "inter-frame displacement {:.2} m exceeds the {:.2} m cap",
                t_relative.translation_norm(),
                self.config.max_dist_between_frames
            )));
        }

        // === Express the sweep at its end frame (undistortion).
        let keypoints = if self.config.undistortion {
            Self::express_at_end(keypoints, &t_relative)
        } else {
            keypoints
        };

        // === Mapping: refine against the rolling-map submap.
        let provisional = self.t_world.compose(&t_relative);
        let mapping_planars = if self.config.fast_slam {
            &keypoints.planars
        } else {
            &keypoints.dense_planars
        };

        let half_extent_voxels = (self.config.max_icp_matching_distance
            / self.config.rolling_grid.voxel_size)
            .ceil() as usize;
        let sensor_position = provisional.translation();
        let edge_submap = self.edge_map.get(&sensor_position, half_extent_voxels);
        let planar_submap = self.planar_map.get(&sensor_position, half_extent_voxels);
        let blob_submap = if self.config.keypoints.use_blobs {
            self.blob_map.get(&sensor_position, half_extent_voxels)
        } else {
            PointCloud::new()
        };

        let submap_degenerate = edge_submap.len() < self.config.mapping.line_neighbors
            && planar_submap.len() < self.config.mapping.plane_neighbors;
        let mut mapping_skipped = false;
        let mut mapping_diag = None;
        let mut measure_cov = Matrix6::identity() * 1e-2;

        let t_world = if submap_degenerate {
            warn!(
                "rolling-map submap degenerate ({} edges, {} planars): mapping skipped",
                edge_submap.len(),
                planar_submap.len()
            );
            mapping_skipped = true;
            provisional
        } else {
            let motion_prior = if self.config.motion_model == MotionModel::Kalman {
                self.kalman
                    .predict_at(frame.timestamp)
                    .map(|prediction| MotionPrior {
                        pose: prediction.pose,
                        inv_variance: prediction.variance.map(|v| 1.0 / v),
                    })
            } else {
                None
            };
            let blob_params = if self.config.keypoints.use_blobs {
                BlobParams {
                    enabled: true,
                    sphericity_threshold: self.config.keypoints.sphericity_threshold,
                    incertitude_coef: self.config.keypoints.incertitude_coef,
                }
            } else {
                BlobParams::disabled()
            };
            let submap = KeypointMap::build(edge_submap, planar_submap, blob_submap);
            let mapping_kernel = MatchSolveKernel::new(
                Stage::Mapping,
                &self.config.mapping,
                &self.config.lm,
                blob_params,
                false,
            );
            let result = mapping_kernel.run(
                CurrentKeypoints {
                    edges: &keypoints.edges,
                    planars: mapping_planars,
                    blobs: &keypoints.blobs,
                },
                &submap,
                provisional,
                motion_prior.as_ref(),
            );
            mapping_diag = Some(StageDiagnostics::from(&result));
            if result.termination == TerminationReason::InsufficientMatches {
                warn!("mapping found too few matches: pose advanced by ego-motion alone");
                mapping_skipped = true;
                provisional
            } else {
                if !result.converged {
                    warn!(
                        "mapping did not converge ({:?} after {} iterations)",
                        result.termination, result.iterations
                    );
                }
                measure_cov = result.covariance;
                result.pose
            }
        };

        // === Commit: trajectory, maps, carried keypoints, motion model.
        self.t_world = t_world;
        self.trajectory.push(frame.timestamp, t_world);
        self.update_maps(&keypoints, mapping_planars.clone());
        if self.config.motion_model == MotionModel::Kalman {
            self.kalman.observe(&t_world, &measure_cov, frame.timestamp);
        }
        self.frames_processed += 1;

        Ok(FrameSummary {
            timestamp: frame.timestamp,
            frame_index: self.frames_processed - 1,
            t_relative,
            t_world,
            edge_count: keypoints.edges.len(),
            planar_count: keypoints.planars.len(),
            blob_count: keypoints.blobs.len(),
            ego_motion: Some(StageDiagnostics::from(&ego_result)),
            mapping: mapping_diag,
            mapping_skipped,
            keypoint_debug: keypoints.debug.clone(),
        })
    }

    /// First accepted sweep: the world frame is anchored here (or at the
    /// external prior's pose) and the keypoints seed the map.
    fn commit_first_frame(&mut self, timestamp: f64, keypoints: ExtractedKeypoints) -> FrameSummary {
        if let Some(prior) = &self.pose_prior {
            if let Some(initial) = prior.sample_at(timestamp) {
                self.t_world = initial;
            }
        }
        let mapping_planars = if self.config.fast_slam {
            keypoints.planars.clone()
        } else {
            keypoints.dense_planars.clone()
        };

        self.trajectory.push(timestamp, self.t_world);
        self.update_maps(&keypoints, mapping_planars);
        if self.config.motion_model == MotionModel::Kalman {
            self.kalman
                .observe(&self.t_world, &(Matrix6::identity() * 1e-4), timestamp);
        }
        self.frames_processed = 1;

        FrameSummary {
            timestamp,
            frame_index: 0,
            t_relative: Pose6D::identity(),
            t_world: self.t_world,
            edge_count: keypoints.edges.len(),
            planar_count: keypoints.planars.len(),
            blob_count: keypoints.blobs.len(),
            ego_motion: None,
            mapping: None,
            mapping_skipped: false,
            keypoint_debug: keypoints.debug.clone(),
        }
    }

    /// Infer or verify the calibration on the first opportunity.
    fn ensure_calibration(&mut self, frame: &SweepFrame) -> Result<()> {
        if self.calibration.is_none() {
            self.calibration = Some(LaserCalibration::infer_from_frame(
                frame,
                self.config.n_lasers,
            )?);
        }
        Ok(())
    }

    /// Seed for the ego-motion optimization: the external prior delta, the
    /// motion-model prediction delta, or identity.
    fn ego_motion_seed(&self, timestamp: f64) -> Pose6D {
        if let Some(prior) = &self.pose_prior {
            if let Some(sampled) = prior.sample_at(timestamp) {
                return self.t_world.inverse().compose(&sampled);
            }
        }
        if self.config.motion_model == MotionModel::Kalman {
            if let Some(prediction) = self.kalman.predict_at(timestamp) {
                return self.t_world.inverse().compose(&prediction.pose);
            }
        }
        Pose6D::identity()
    }

    /// Rewrite all keypoint clouds into the sweep-end frame.
    fn express_at_end(mut keypoints: ExtractedKeypoints, t_relative: &Pose6D) -> ExtractedKeypoints {
        for cloud in [
            &mut keypoints.edges,
            &mut keypoints.planars,
            &mut keypoints.blobs,
            &mut keypoints.dense_planars,
        ] {
            for p in cloud.iter_mut() {
                let moved = t_relative.transform_to_end(&p.position(), p.time_fraction);
                p.set_position(&moved);
                p.time_fraction = 1.0;
            }
        }
        keypoints
    }

    /// Roll the grids to the new sensor position, insert the world-frame
    /// keypoints and carry the sparse sets forward for the next ego-motion.
    fn update_maps(&mut self, keypoints: &ExtractedKeypoints, mapping_planars: PointCloud) {
        let sensor = self.t_world.translation();
        self.edge_map.roll(&sensor);
        self.planar_map.roll(&sensor);
        self.blob_map.roll(&sensor);

        self.edge_map
            .add(&Self::to_world(&keypoints.edges, &self.t_world));
        self.planar_map
            .add(&Self::to_world(&mapping_planars, &self.t_world));
        if self.config.keypoints.use_blobs {
            self.blob_map
                .add(&Self::to_world(&keypoints.blobs, &self.t_world));
        }

        self.previous_keypoints = Some(KeypointMap::build(
            keypoints.edges.clone(),
            keypoints.planars.clone(),
            keypoints.blobs.clone(),
        ));
    }

    /// Transform a cloud into the world frame.
    fn to_world(cloud: &PointCloud, pose: &Pose6D) -> PointCloud {
        cloud
            .iter()
            .map(|p| {
                let mut q = *p;
                q.set_position(&pose.transform_point(&p.position()));
                q
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = SlamConfig::default();
        config.max_dist_between_frames = -1.0;
        assert!(Slam::new(config).is_err());
    }

    #[test]
    fn test_fresh_engine_state() {
        let slam = Slam::new(SlamConfig::default()).unwrap();
        assert!(slam.trajectory().is_empty());
        assert_eq!(slam.map_point_count(), 0);
        assert_eq!(slam.world_pose(), Pose6D::identity());
        assert!(!slam.has_calibration());
    }

    #[test]
    fn test_set_calibration() {
        let mut slam = Slam::new(SlamConfig::default()).unwrap();
        slam.set_calibration(vec![1, 0, 2]).unwrap();
        assert!(slam.has_calibration());
        assert!(slam.set_calibration(vec![0, 0]).is_err());
    }

    #[test]
    fn test_reset_clears_state_keeps_calibration() {
        let mut slam = Slam::new(SlamConfig::default()).unwrap();
        slam.set_calibration(vec![0, 1]).unwrap();
        slam.reset();
        assert!(slam.trajectory().is_empty());
        assert_eq!(slam.map_point_count(), 0);
        assert!(slam.has_calibration());
    }

    #[test]
    fn test_empty_frame_rejected() {
        let mut slam = Slam::new(SlamConfig::default()).unwrap();
        slam.set_calibration(vec![0, 1]).unwrap();
        let frame = SweepFrame::new(0.0, vec![]);
        assert!(matches!(
            slam.process_frame(&frame),
            Err(SlamError::FrameRejected(_))
        ));
        assert!(slam.trajectory().is_empty());
    }
}
