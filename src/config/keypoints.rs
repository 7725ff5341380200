//! Keypoint extraction parameters.

use serde::{Deserialize, Serialize};

/// Configuration for the per-scan-line keypoint extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeypointConfig {
    /// Half-width of the neighborhood used for the discrete differential
    /// operators (curvature, depth gap, scatter).
    pub neighbor_width: usize,

    /// Minimum point-to-sensor distance; closer returns are invalidated.
    pub min_distance_to_sensor: f64,

    /// Maximum number of edge keypoints kept per scan line.
    pub max_edges_per_line: usize,

    /// Maximum number of planar keypoints kept per scan line.
    pub max_planars_per_line: usize,

    /// Sine-of-angle above which a point qualifies as an edge candidate.
    pub edge_sin_angle_threshold: f64,

    /// Sine-of-angle below which a point qualifies as a planar candidate.
    /// Also the grazing-incidence gate: points whose beam is closer than
    /// this to the local scan-line tangent are invalidated.
    pub plane_sin_angle_threshold: f64,

    /// Range discontinuity (meters) that marks an edge candidate and, at
    /// occlusion boundaries, invalidates the occluded side.
    pub edge_depth_gap_threshold: f64,

    /// Whether to extract blob keypoints (isotropic neighborhoods).
    pub use_blobs: bool,

    /// Minimum eigenvalue ratio (smallest / largest of the window scatter)
    /// for a point to qualify as a blob.
    pub sphericity_threshold: f64,

    /// Scale applied to a blob neighborhood radius when softening its
    /// residual weight.
    pub incertitude_coef: f64,
}

impl Default for KeypointConfig {
    fn default() -> Self {
        Self {
            neighbor_width: 4,
            min_distance_to_sensor: 3.0,
            max_edges_per_line: 200,
            max_planars_per_line: 300,
            edge_sin_angle_threshold: 0.86,
            plane_sin_angle_threshold: 0.5,
            edge_depth_gap_threshold: 0.15,
            use_blobs: false,
            sphericity_threshold: 0.35,
            incertitude_coef: 3.0,
        }
    }
}
