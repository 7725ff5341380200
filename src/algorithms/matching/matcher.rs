//! Closest-point matching: from current keypoints to reference primitives.
//!
//! Every current keypoint is matched independently (read-only tree queries,
//! one residual slot per keypoint), so the match step runs keypoints in
//! parallel.

use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;

use crate::config::MatchingConfig;
use crate::core::types::{PointCloud, Pose6D, SweepPoint};

use super::keypoint_map::{KeypointMap, Neighbor};
use super::primitives::{fit_line, fit_plane, sphericity, Residual};

/// Blob matching parameters, taken from the keypoint configuration.
#[derive(Debug, Clone, Copy)]
pub struct BlobParams {
    /// Whether blob residuals participate at all.
    pub enabled: bool,
    /// Minimum eigenvalue ratio for a neighborhood to count as a blob.
    pub sphericity_threshold: f64,
    /// Softening scale applied to the blob neighborhood radius.
    pub incertitude_coef: f64,
}

impl BlobParams {
    /// Blobs disabled.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            sphericity_threshold: 0.0,
            incertitude_coef: 1.0,
        }
    }
}

/// How many matches each class produced.
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct MatchCounts {
    pub edges: usize,
    pub planes: usize,
    pub blobs: usize,
}

/// Run matching for all current keypoints at the given pose estimate.
pub(super) fn build_residuals(
    config: &MatchingConfig,
    blob: &BlobParams,
    edges: &PointCloud,
    planars: &PointCloud,
    blobs: &PointCloud,
    map: &KeypointMap,
    pose: &Pose6D,
    undistortion: bool,
) -> (Vec<Residual>, MatchCounts) {
    let edge_matches: Vec<Residual> = edges
        .points()
        .par_iter()
        .filter_map(|p| match_edge(config, map, p, pose, undistortion))
        .collect();
    let plane_matches: Vec<Residual> = planars
        .points()
        .par_iter()
        .filter_map(|p| match_plane(config, map, p, pose, undistortion))
        .collect();
    let blob_matches: Vec<Residual> = if blob.enabled {
        blobs
            .points()
            .par_iter()
            .filter_map(|p| match_blob(config, blob, map, p, pose, undistortion))
            .collect()
    } else {
        Vec::new()
    };

    let counts = MatchCounts {
        edges: edge_matches.len(),
        planes: plane_matches.len(),
        blobs: blob_matches.len(),
    };
    let mut residuals = edge_matches;
    residuals.extend(plane_matches);
    residuals.extend(blob_matches);
    (residuals, counts)
}

/// Express a keypoint in the reference frame at the current pose estimate,
/// honoring per-point acquisition time when undistortion is active.
fn transform_keypoint(point: &SweepPoint, pose: &Pose6D, undistortion: bool) -> (Vector3<f64>, f64) {
    if undistortion {
        let s = point.time_fraction;
        (pose.interpolate(s).transform_point(&point.position()), s)
    } else {
        (pose.transform_point(&point.position()), 1.0)
    }
}

fn match_edge(
    config: &MatchingConfig,
    map: &KeypointMap,
    point: &SweepPoint,
    pose: &Pose6D,
    undistortion: bool,
) -> Option<Residual> {
    let (transformed, s) = transform_keypoint(point, pose, undistortion);

    let neighbors = map.nearest_edges(&transformed, config.line_neighbors);
    if neighbors.len() < config.min_line_neighbors {
        return None;
    }
    let max_sq = config.max_line_distance * config.max_line_distance;
    if neighbors.last().map(|n| n.distance_sq)? > max_sq {
        return None;
    }

    let positions = neighbor_positions(map.edges(), &neighbors);

    let used = if let Some(max_inlier) = config.line_max_dist_inlier {
        // Sample-consensus variant: fit on the raw neighborhood, keep only
        // the inliers close to that line, then refit.
        let prelim = fit_line(&positions, 0.0)?;
        let inliers: Vec<Vector3<f64>> = positions
            .iter()
            .filter(|p| prelim.distance(p) < max_inlier)
            .copied()
            .collect();
        if inliers.len() < config.min_line_neighbors {
            return None;
        }
        inliers
    } else {
        // Frame-to-frame variant: the neighbors must span at least two scan
        // lines, otherwise the neighborhood is a single azimuthal arc and
        // carries no line information across beams.
        let first_line = map.edges()[neighbors[0].index].scan_line;
        if neighbors
            .iter()
            .all(|n| map.edges()[n.index].scan_line == first_line)
        {
            return None;
        }
        positions
    };

    let fit = fit_line(&used, config.line_distance_factor)?;
    let distance = fit.distance(&transformed);
    Some(Residual {
        a_sqrt: fit.a_sqrt(),
        x: point.position(),
        p: fit.centroid,
        time_fraction: s,
        weight: outlier_weight(distance, config.max_line_distance),
    })
}

fn match_plane(
    config: &MatchingConfig,
    map: &KeypointMap,
    point: &SweepPoint,
    pose: &Pose6D,
    undistortion: bool,
) -> Option<Residual> {
    let (transformed, s) = transform_keypoint(point, pose, undistortion);

    let neighbors = map.nearest_planars(&transformed, config.plane_neighbors);
    if neighbors.len() < config.plane_neighbors.min(3) {
        return None;
    }
    let max_sq = config.max_plane_distance * config.max_plane_distance;
    if neighbors.last().map(|n| n.distance_sq)? > max_sq {
        return None;
    }

    let positions = neighbor_positions(map.planars(), &neighbors);
    let fit = fit_plane(
        &positions,
        config.plane_distance_factor1,
        config.plane_distance_factor2,
    )?;
    let distance = fit.distance(&transformed).abs();
    Some(Residual {
        a_sqrt: fit.a_sqrt(),
        x: point.position(),
        p: fit.centroid,
        time_fraction: s,
        weight: outlier_weight(distance, config.max_plane_distance),
    })
}

fn match_blob(
    config: &MatchingConfig,
    blob: &BlobParams,
    map: &KeypointMap,
    point: &SweepPoint,
    pose: &Pose6D,
    undistortion: bool,
) -> Option<Residual> {
    let (transformed, s) = transform_keypoint(point, pose, undistortion);

    let neighbors = map.nearest_blobs(&transformed, config.plane_neighbors);
    if neighbors.len() < config.plane_neighbors.min(3) {
        return None;
    }
    let max_sq = config.max_plane_distance * config.max_plane_distance;
    if neighbors.last().map(|n| n.distance_sq)? > max_sq {
        return None;
    }

    let positions = neighbor_positions(map.blobs(), &neighbors);
    if sphericity(&positions) <= blob.sphericity_threshold {
        return None;
    }

    let anchor = crate::core::math::centroid(&positions);
    let radius = positions
        .iter()
        .map(|p| (p - anchor).norm())
        .fold(0.0f64, f64::max)
        .max(1e-6);
    // Softened isotropic distance: the larger the neighborhood radius, the
    // weaker the pull of its centroid.
    let scale = (1.0 / (blob.incertitude_coef * radius)).min(1.0);
    let distance = (transformed - anchor).norm();
    Some(Residual {
        a_sqrt: Matrix3::identity() * scale.sqrt(),
        x: point.position(),
        p: anchor,
        time_fraction: s,
        weight: outlier_weight(distance, config.max_plane_distance),
    })
}

fn neighbor_positions(cloud: &PointCloud, neighbors: &[Neighbor]) -> Vec<Vector3<f64>> {
    neighbors.iter().map(|n| cloud[n.index].position()).collect()
}

/// Bounded attenuation of residuals that survive matching but sit far from
/// their primitive: `exp(-d² / σ²)`.
fn outlier_weight(distance: f64, sigma: f64) -> f64 {
    (-(distance * distance) / (sigma * sigma)).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_cloud(normal_axis: usize, offset: f64, n: usize, spacing: f64) -> PointCloud {
        let mut cloud = PointCloud::new();
        for i in 0..n {
            for j in 0..n {
                let (a, b) = (i as f64 * spacing, j as f64 * spacing);
                // Tiny offset jitter keeps the grid away from exact
                // coplanarity.
                let o = offset + 1e-4 * ((i * 7 + j * 13) as f64).sin();
                let position = match normal_axis {
                    0 => Vector3::new(o, a, b),
                    1 => Vector3::new(a, o, b),
                    _ => Vector3::new(a, b, o),
                };
                let mut p = SweepPoint::from_position(position);
                p.scan_line = i;
                cloud.push(p);
            }
        }
        cloud
    }

    fn line_cloud(n: usize, spacing: f64) -> PointCloud {
        (0..n)
            .map(|i| {
                let mut p = SweepPoint::from_position(Vector3::new(1.0, 2.0, i as f64 * spacing));
                p.scan_line = i;
                p
            })
            .collect()
    }

    #[test]
    fn test_edge_match_on_vertical_line() {
        let map = KeypointMap::build(line_cloud(20, 0.2), PointCloud::new(), PointCloud::new());
        let config = MatchingConfig::ego_motion();
        let query = SweepPoint::from_position(Vector3::new(1.05, 2.0, 1.9));

        let r = match_edge(&config, &map, &query, &Pose6D::identity(), false).unwrap();
        // Anchor on the line, direction annihilated by the projector.
        assert!((r.p.x - 1.0).abs() < 1e-9);
        assert!((r.a_sqrt * Vector3::new(0.0, 0.0, 1.0)).norm() < 1e-9);
        assert!(r.weight > 0.9);
    }

    #[test]
    fn test_edge_match_rejects_single_scan_line() {
        // All neighbors on one scan line: no cross-beam information.
        let mut cloud = line_cloud(20, 0.2);
        for p in cloud.iter_mut() {
            p.scan_line = 3;
        }
        let map = KeypointMap::build(cloud, PointCloud::new(), PointCloud::new());
        let config = MatchingConfig::ego_motion();
        let query = SweepPoint::from_position(Vector3::new(1.0, 2.0, 1.9));

        assert!(match_edge(&config, &map, &query, &Pose6D::identity(), false).is_none());
    }

    #[test]
    fn test_edge_match_rejects_far_neighborhood() {
        let map = KeypointMap::build(line_cloud(20, 0.2), PointCloud::new(), PointCloud::new());
        let config = MatchingConfig::ego_motion();
        let query = SweepPoint::from_position(Vector3::new(10.0, 2.0, 1.0));

        assert!(match_edge(&config, &map, &query, &Pose6D::identity(), false).is_none());
    }

    #[test]
    fn test_plane_match_on_wall() {
        let map = KeypointMap::build(
            PointCloud::new(),
            grid_cloud(0, 5.0, 10, 0.3),
            PointCloud::new(),
        );
        let config = MatchingConfig::ego_motion();
        let query = SweepPoint::from_position(Vector3::new(5.1, 1.5, 1.5));

        let r = match_plane(&config, &map, &query, &Pose6D::identity(), false).unwrap();
        // Normal along x (up to the scene jitter): the projector keeps the
        // x component and drops the in-plane ones.
        let kept = r.a_sqrt * Vector3::new(1.0, 0.0, 0.0);
        assert!((kept.norm() - 1.0).abs() < 1e-3);
        let dropped = r.a_sqrt * Vector3::new(0.0, 1.0, 0.0);
        assert!(dropped.norm() < 1e-2);
    }

    #[test]
    fn test_plane_match_rejects_collinear_neighbors() {
        // A single row of points is not a plane.
        let map = KeypointMap::build(PointCloud::new(), line_cloud(20, 0.2), PointCloud::new());
        let config = MatchingConfig::ego_motion();
        let query = SweepPoint::from_position(Vector3::new(1.0, 2.0, 1.0));

        assert!(match_plane(&config, &map, &query, &Pose6D::identity(), false).is_none());
    }

    #[test]
    fn test_mapping_consensus_trims_outlier() {
        // A line with one far outlier among the nearest neighbors: the
        // consensus variant must trim it and still produce a clean fit.
        let mut cloud = line_cloud(10, 0.1);
        let mut outlier = SweepPoint::from_position(Vector3::new(1.35, 2.0, 0.45));
        outlier.scan_line = 99;
        cloud.push(outlier);
        let map = KeypointMap::build(cloud, PointCloud::new(), PointCloud::new());

        let mut config = MatchingConfig::mapping();
        config.line_neighbors = 11;
        config.max_line_distance = 1.0;
        let query = SweepPoint::from_position(Vector3::new(1.0, 2.0, 0.45));

        let r = match_edge(&config, &map, &query, &Pose6D::identity(), false).unwrap();
        // The fitted line is the z-axis line through (1, 2): its direction
        // survives the outlier trim.
        assert!((r.a_sqrt * Vector3::new(0.0, 0.0, 1.0)).norm() < 1e-6);
    }

    #[test]
    fn test_undistortion_uses_interpolated_pose() {
        let map = KeypointMap::build(
            PointCloud::new(),
            grid_cloud(2, 0.0, 10, 0.3),
            PointCloud::new(),
        );
        let config = MatchingConfig::ego_motion();
        // Full sweep motion raises the sensor by 1 m; a point at s = 0.5
        // only gets half of it.
        let pose = Pose6D::new(0.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        let mut query = SweepPoint::from_position(Vector3::new(1.5, 1.5, -0.5));
        query.time_fraction = 0.5;

        let r = match_plane(&config, &map, &query, &pose, true).unwrap();
        assert!((r.time_fraction - 0.5).abs() < 1e-12);
        // Residual evaluated at the interpolated pose sits on the plane.
        let moved = pose.interpolate(0.5).transform_point(&query.position());
        assert!(moved.z.abs() < 1e-9);
    }

    #[test]
    fn test_outlier_weight_bounds() {
        assert!((outlier_weight(0.0, 0.5) - 1.0).abs() < 1e-12);
        assert!(outlier_weight(0.5, 0.5) < 0.5);
        assert!(outlier_weight(2.0, 0.5) < 1e-6);
    }
}
