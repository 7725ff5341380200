//! Match-and-solve kernel parameters.
//!
//! The kernel runs in two stages with the same shape but different
//! tolerances: ego-motion (frame-to-frame, loose gates, identity-ish seed)
//! and mapping (frame-to-map, tight gates, refined seed). Each stage owns a
//! [`MatchingConfig`] group.

use serde::{Deserialize, Serialize};

/// Parameter group for one stage of the match-and-solve kernel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatchingConfig {
    /// Maximum number of outer (Levenberg-Marquardt) iterations.
    pub max_iter: u32,

    /// Re-run closest-point matching every this many iterations (always at
    /// iteration 0); in between, residuals are re-evaluated at the current
    /// pose without re-matching.
    pub icp_frequence: u32,

    /// Number of nearest edge neighbors queried for line fitting.
    pub line_neighbors: usize,

    /// Minimum usable edge neighbors after filtering; fewer rejects the
    /// match.
    pub min_line_neighbors: usize,

    /// Elongation gate: the largest scatter eigenvalue must exceed this
    /// factor times the next largest for the neighborhood to count as a
    /// line.
    pub line_distance_factor: f64,

    /// Number of nearest planar neighbors queried for plane fitting.
    pub plane_neighbors: usize,

    /// Planarity gate, first factor: the largest eigenvalue must stay below
    /// this factor times the middle one (two comparable large eigenvalues).
    pub plane_distance_factor1: f64,

    /// Planarity gate, second factor: the middle eigenvalue must exceed this
    /// factor times the smallest (one near-zero eigenvalue).
    pub plane_distance_factor2: f64,

    /// Reject an edge match when the farthest of the queried neighbors is
    /// beyond this distance (meters).
    pub max_line_distance: f64,

    /// Reject a planar match when the farthest of the queried neighbors is
    /// beyond this distance (meters).
    pub max_plane_distance: f64,

    /// When set, edge neighborhoods are trimmed to the inliers within this
    /// distance of the fitted line and refitted (sample-consensus variant
    /// used by the mapping stage).
    pub line_max_dist_inlier: Option<f64>,
}

impl MatchingConfig {
    /// Parameters for the frame-to-frame ego-motion stage.
    pub fn ego_motion() -> Self {
        Self {
            max_iter: 15,
            icp_frequence: 3,
            line_neighbors: 8,
            min_line_neighbors: 3,
            line_distance_factor: 5.0,
            plane_neighbors: 5,
            plane_distance_factor1: 35.0,
            plane_distance_factor2: 8.0,
            max_line_distance: 1.0,
            max_plane_distance: 1.0,
            line_max_dist_inlier: None,
        }
    }

    /// Parameters for the frame-to-map mapping stage.
    pub fn mapping() -> Self {
        Self {
            max_iter: 20,
            icp_frequence: 5,
            line_neighbors: 10,
            min_line_neighbors: 4,
            line_distance_factor: 5.0,
            plane_neighbors: 5,
            plane_distance_factor1: 35.0,
            plane_distance_factor2: 8.0,
            max_line_distance: 0.5,
            max_plane_distance: 0.5,
            line_max_dist_inlier: Some(0.2),
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self::ego_motion()
    }
}

/// Levenberg-Marquardt damping schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LmConfig {
    /// Initial damping value.
    pub lambda0: f64,

    /// Factor applied to the damping on every accepted (divide) or rejected
    /// (multiply) step.
    pub lambda_ratio: f64,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            lambda0: 1e-3,
            lambda_ratio: 10.0,
        }
    }
}
