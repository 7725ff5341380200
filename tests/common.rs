//! Shared test fixtures: a synthetic spinning LiDAR inside a box room.

use gati_slam::{
    KeypointConfig, MatchingConfig, Pose6D, RawPoint, RollingGridConfig, SlamConfig, SweepFrame,
};
use nalgebra::Vector3;

/// Laser elevations, degrees, listed top-down so the inferred calibration
/// has to reorder them.
pub const ELEVATIONS_DEG: [f64; 17] = [
    24.0, 21.0, 18.0, 15.0, 12.0, 9.0, 6.0, 3.0, 0.0, -3.0, -6.0, -9.0, -12.0, -15.0, -18.0,
    -21.0, -24.0,
];

/// Azimuth steps per revolution.
pub const N_AZIMUTHS: usize = 240;

/// An axis-aligned box room the sensor moves inside.
#[derive(Debug, Clone, Copy)]
pub struct BoxRoom {
    pub min: Vector3<f64>,
    pub max: Vector3<f64>,
}

impl BoxRoom {
    pub fn standard() -> Self {
        Self {
            min: Vector3::new(-5.0, -4.0, -2.0),
            max: Vector3::new(5.0, 4.0, 2.0),
        }
    }

    /// Range along a world-frame ray from an interior origin to the first
    /// wall.
    fn range(&self, origin: &Vector3<f64>, direction: &Vector3<f64>) -> f64 {
        let mut t_hit = f64::INFINITY;
        for axis in 0..3 {
            let d = direction[axis];
            if d > 1e-12 {
                t_hit = t_hit.min((self.max[axis] - origin[axis]) / d);
            } else if d < -1e-12 {
                t_hit = t_hit.min((self.min[axis] - origin[axis]) / d);
            }
        }
        t_hit
    }

    /// Simulate one full revolution from a sensor at `pose` (world frame).
    ///
    /// Points are emitted in azimuth order with the azimuth fraction as
    /// acquisition time, the way a spinning sensor delivers them.
    pub fn sweep(&self, pose: &Pose6D, timestamp: f64) -> SweepFrame {
        let rotation = pose.rotation();
        let origin = pose.translation();

        let mut points = Vec::with_capacity(N_AZIMUTHS * ELEVATIONS_DEG.len());
        for az_step in 0..N_AZIMUTHS {
            let azimuth = 2.0 * std::f64::consts::PI * az_step as f64 / N_AZIMUTHS as f64;
            let time = az_step as f64 / N_AZIMUTHS as f64;
            for (laser_id, elevation_deg) in ELEVATIONS_DEG.iter().enumerate() {
                let elevation = elevation_deg.to_radians();
                let d_sensor = Vector3::new(
                    elevation.cos() * azimuth.cos(),
                    elevation.cos() * azimuth.sin(),
                    elevation.sin(),
                );
                let d_world = rotation * d_sensor;
                let range = self.range(&origin, &d_world);
                if !range.is_finite() {
                    continue;
                }
                // Deterministic sub-millimeter range jitter: real returns are
                // never perfectly coplanar, and exact duplicates upset k-d
                // tree bucket splitting.
                let jitter = 1.0 + 1e-4 * ((az_step * 7 + laser_id * 13) as f64).sin();
                let p = range * jitter * d_sensor;
                points.push(RawPoint {
                    x: p.x,
                    y: p.y,
                    z: p.z,
                    intensity: 100.0,
                    laser_id: laser_id as u32,
                    time,
                });
            }
        }
        SweepFrame::new(timestamp, points)
    }
}

/// Configuration tuned for the synthetic room scenes.
pub fn test_config() -> SlamConfig {
    SlamConfig {
        keypoints: KeypointConfig {
            neighbor_width: 4,
            min_distance_to_sensor: 0.5,
            max_edges_per_line: 50,
            max_planars_per_line: 200,
            edge_sin_angle_threshold: 0.6,
            plane_sin_angle_threshold: 0.4,
            edge_depth_gap_threshold: 0.5,
            ..KeypointConfig::default()
        },
        ego_motion: MatchingConfig {
            max_iter: 25,
            icp_frequence: 2,
            line_neighbors: 6,
            min_line_neighbors: 3,
            plane_neighbors: 5,
            max_line_distance: 1.0,
            max_plane_distance: 1.0,
            ..MatchingConfig::ego_motion()
        },
        mapping: MatchingConfig {
            max_iter: 25,
            icp_frequence: 3,
            line_neighbors: 8,
            min_line_neighbors: 4,
            plane_neighbors: 5,
            max_line_distance: 0.6,
            max_plane_distance: 0.6,
            line_max_dist_inlier: Some(0.3),
            ..MatchingConfig::mapping()
        },
        rolling_grid: RollingGridConfig {
            voxel_size: 1.0,
            grid_dims: [48, 48, 48],
            intra_voxel_dims: [8, 8, 8],
            leaf_filter_size: 0.15,
        },
        ..SlamConfig::default()
    }
}
