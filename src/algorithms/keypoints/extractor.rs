//! Per-scan-line curvature analysis and keypoint labelling.

use nalgebra::Vector3;
use rayon::prelude::*;

use crate::config::KeypointConfig;
use crate::core::math::{centroid, scatter_matrix, sin_angle, sorted_eigen};
use crate::core::types::PointCloud;

/// Classification of a point after labelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointLabel {
    /// Not selected as a keypoint.
    None,
    /// High-curvature point on its scan line.
    Edge,
    /// Low-curvature point on its scan line.
    Planar,
    /// Point with a locally isotropic 3D neighborhood.
    Blob,
}

/// Per-point metric and label arrays for one scan line, kept for display.
#[derive(Debug, Clone, Default)]
pub struct ScanLineDebug {
    /// Sine of the curvature angle per point.
    pub sin_angle: Vec<f64>,
    /// Largest consecutive range gap in the window per point.
    pub depth_gap: Vec<f64>,
    /// Sphericity score per point (zero when blobs are disabled).
    pub blob_score: Vec<f64>,
    /// Whether the point survived the validity criteria.
    pub valid: Vec<bool>,
    /// Final label per point.
    pub labels: Vec<PointLabel>,
}

/// Keypoint clouds extracted from one sweep.
#[derive(Debug, Clone, Default)]
pub struct ExtractedKeypoints {
    /// High-curvature keypoints.
    pub edges: PointCloud,
    /// Low-curvature keypoints, capped and suppressed.
    pub planars: PointCloud,
    /// Isotropic-neighborhood keypoints (empty unless blobs are enabled).
    pub blobs: PointCloud,
    /// Every non-invalidated low-curvature point, used to thicken the map
    /// when fast SLAM is disabled.
    pub dense_planars: PointCloud,
    /// Per-scan-line metric arrays, present in display mode.
    pub debug: Option<Vec<ScanLineDebug>>,
}

/// Keypoint extractor over the scan lines of a sweep.
#[derive(Debug, Clone)]
pub struct KeypointExtractor {
    config: KeypointConfig,
    /// Azimuthal resolution of the sensor, radians. Consecutive points
    /// separated by much more than this sit across missing returns.
    angle_resolution: f64,
    display_mode: bool,
}

struct LineResult {
    edges: PointCloud,
    planars: PointCloud,
    blobs: PointCloud,
    dense_planars: PointCloud,
    debug: Option<ScanLineDebug>,
}

impl KeypointExtractor {
    /// Create an extractor.
    pub fn new(config: KeypointConfig, angle_resolution: f64, display_mode: bool) -> Self {
        Self {
            config,
            angle_resolution,
            display_mode,
        }
    }

    /// Extract keypoints from a sweep split into scan lines.
    ///
    /// Scan lines are processed in parallel; each line is independent.
    pub fn extract(&self, scan_lines: &[PointCloud]) -> ExtractedKeypoints {
        let results: Vec<LineResult> = scan_lines
            .par_iter()
            .map(|line| self.process_line(line))
            .collect();

        let mut out = ExtractedKeypoints {
            debug: self.display_mode.then(Vec::new),
            ..Default::default()
        };
        for r in results {
            out.edges.extend_from(&r.edges);
            out.planars.extend_from(&r.planars);
            out.blobs.extend_from(&r.blobs);
            out.dense_planars.extend_from(&r.dense_planars);
            if let (Some(all), Some(one)) = (out.debug.as_mut(), r.debug) {
                all.push(one);
            }
        }
        out
    }

    fn process_line(&self, line: &PointCloud) -> LineResult {
        let n = line.len();
        let w = self.config.neighbor_width;

        let mut sin_angles = vec![0.0f64; n];
        let mut depth_gaps = vec![0.0f64; n];
        let mut blob_scores = vec![0.0f64; n];
        let mut valid = vec![true; n];
        let mut labels = vec![PointLabel::None; n];

        let mut result = LineResult {
            edges: PointCloud::new(),
            planars: PointCloud::new(),
            blobs: PointCloud::new(),
            dense_planars: PointCloud::new(),
            debug: None,
        };

        // A line shorter than one full window yields no keypoints.
        if n >= 2 * w + 1 {
            let positions: Vec<Vector3<f64>> = line.positions();
            let ranges: Vec<f64> = positions.iter().map(|p| p.norm()).collect();

            self.invalidate(&positions, &ranges, &mut valid);
            self.compute_metrics(
                &positions,
                &ranges,
                &valid,
                &mut sin_angles,
                &mut depth_gaps,
                &mut blob_scores,
            );
            self.label(
                line,
                &sin_angles,
                &depth_gaps,
                &blob_scores,
                &valid,
                &mut labels,
                &mut result,
            );
        }

        if self.display_mode {
            result.debug = Some(ScanLineDebug {
                sin_angle: sin_angles,
                depth_gap: depth_gaps,
                blob_score: blob_scores,
                valid,
                labels,
            });
        }
        result
    }

    /// Mark points that must not become keypoint candidates.
    fn invalidate(&self, positions: &[Vector3<f64>], ranges: &[f64], valid: &mut [bool]) {
        let n = positions.len();
        let w = self.config.neighbor_width;

        // Degenerate windows at the ends of the line.
        for i in 0..n {
            if i < w || i + w >= n {
                valid[i] = false;
            }
        }

        for i in 0..n {
            if ranges[i] < self.config.min_distance_to_sensor {
                valid[i] = false;
            }
        }

        // Grazing incidence: the beam is nearly parallel to the local
        // scan-line tangent, so the range samples are unreliable.
        for i in 1..n.saturating_sub(1) {
            let tangent = positions[i + 1] - positions[i - 1];
            if sin_angle(&positions[i], &tangent) < self.config.plane_sin_angle_threshold {
                valid[i] = false;
            }
        }

        // Boundaries of missing returns: across an angular jump much larger
        // than the sensor resolution, the windows on both sides span a hole
        // in the data.
        let max_adjacent_sin = (10.0 * self.angle_resolution).min(1.0);
        for i in 0..n.saturating_sub(1) {
            if sin_angle(&positions[i], &positions[i + 1]) > max_adjacent_sin {
                let start = i.saturating_sub(w);
                for v in valid[start..=i].iter_mut() {
                    *v = false;
                }
                let end = (i + 1 + w).min(n - 1);
                for v in valid[i + 1..=end].iter_mut() {
                    *v = false;
                }
            }
        }

        // Occlusion boundaries: across a large range discontinuity the
        // window adjacent to the gap on the farther side is partially
        // occluded by the nearer surface.
        for i in 0..n.saturating_sub(1) {
            let gap = (ranges[i + 1] - ranges[i]).abs();
            if gap <= self.config.edge_depth_gap_threshold {
                continue;
            }
            if ranges[i] > ranges[i + 1] {
                let start = i.saturating_sub(w);
                for v in valid[start..=i].iter_mut() {
                    *v = false;
                }
            } else {
                let end = (i + 1 + w).min(n - 1);
                for v in valid[i + 1..=end].iter_mut() {
                    *v = false;
                }
            }
        }
    }

    fn compute_metrics(
        &self,
        positions: &[Vector3<f64>],
        ranges: &[f64],
        valid: &[bool],
        sin_angles: &mut [f64],
        depth_gaps: &mut [f64],
        blob_scores: &mut [f64],
    ) {
        let n = positions.len();
        let w = self.config.neighbor_width;

        for i in w..n - w {
            if !valid[i] {
                continue;
            }

            let left = centroid(&positions[i - w..i]);
            let right = centroid(&positions[i + 1..=i + w]);
            let u = left - positions[i];
            let v = right - positions[i];
            sin_angles[i] = sin_angle(&u, &v);

            let mut max_gap = 0.0f64;
            for j in i - w..i + w {
                max_gap = max_gap.max((ranges[j + 1] - ranges[j]).abs());
            }
            depth_gaps[i] = max_gap;

            if self.config.use_blobs {
                let window = &positions[i - w..=i + w];
                let c = centroid(window);
                let eig = sorted_eigen(&scatter_matrix(window, &c));
                if eig.values[2] > 1e-12 {
                    blob_scores[i] = eig.values[0] / eig.values[2];
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn label(
        &self,
        line: &PointCloud,
        sin_angles: &[f64],
        depth_gaps: &[f64],
        blob_scores: &[f64],
        valid: &[bool],
        labels: &mut [PointLabel],
        result: &mut LineResult,
    ) {
        let n = line.len();
        let w = self.config.neighbor_width;

        // Edges: highest curvature first.
        let mut edge_candidates: Vec<usize> = (0..n)
            .filter(|&i| {
                valid[i]
                    && (sin_angles[i] > self.config.edge_sin_angle_threshold
                        || depth_gaps[i] > self.config.edge_depth_gap_threshold)
            })
            .collect();
        edge_candidates.sort_by(|&a, &b| {
            sin_angles[b]
                .partial_cmp(&sin_angles[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let mut suppressed = vec![false; n];
        for &i in &edge_candidates {
            if result.edges.len() >= self.config.max_edges_per_line {
                break;
            }
            if suppressed[i] {
                continue;
            }
            labels[i] = PointLabel::Edge;
            result.edges.push(line[i]);
            for s in suppressed[i.saturating_sub(w)..=(i + w).min(n - 1)].iter_mut() {
                *s = true;
            }
        }

        // Planars: flattest first. Edge-labelled points win over planar.
        let mut planar_candidates: Vec<usize> = (0..n)
            .filter(|&i| {
                valid[i]
                    && labels[i] == PointLabel::None
                    && sin_angles[i] < self.config.plane_sin_angle_threshold
            })
            .collect();
        planar_candidates.sort_by(|&a, &b| {
            sin_angles[a]
                .partial_cmp(&sin_angles[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for &i in &planar_candidates {
            result.dense_planars.push(line[i]);
        }
        let mut suppressed = vec![false; n];
        for &i in &planar_candidates {
            if result.planars.len() >= self.config.max_planars_per_line {
                break;
            }
            if suppressed[i] {
                continue;
            }
            labels[i] = PointLabel::Planar;
            result.planars.push(line[i]);
            for s in suppressed[i.saturating_sub(w)..=(i + w).min(n - 1)].iter_mut() {
                *s = true;
            }
        }

        // Blobs: only points not already claimed as edge or planar.
        if self.config.use_blobs {
            let mut blob_candidates: Vec<usize> = (0..n)
                .filter(|&i| {
                    valid[i]
                        && labels[i] == PointLabel::None
                        && blob_scores[i] > self.config.sphericity_threshold
                })
                .collect();
            blob_candidates.sort_by(|&a, &b| {
                blob_scores[b]
                    .partial_cmp(&blob_scores[a])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            let mut suppressed = vec![false; n];
            for &i in &blob_candidates {
                if result.blobs.len() >= self.config.max_edges_per_line {
                    break;
                }
                if suppressed[i] {
                    continue;
                }
                labels[i] = PointLabel::Blob;
                result.blobs.push(line[i]);
                for s in suppressed[i.saturating_sub(w)..=(i + w).min(n - 1)].iter_mut() {
                    *s = true;
                }
            }
        }
    }
}
