//! Geometric primitives fitted to keypoint neighborhoods, and the residual
//! each match contributes to the optimization.

use nalgebra::{Matrix3, Vector3};

use crate::core::math::{centroid, scatter_matrix, sorted_eigen};

/// One matched keypoint-to-primitive constraint.
///
/// The residual vector at pose `(R, t)` is
/// `sqrt(weight) * a_sqrt * (R(s) * x + t(s) - p)`, with `(R(s), t(s))` the
/// pose interpolated at the point's acquisition time when undistortion is
/// active.
#[derive(Debug, Clone)]
pub struct Residual {
    /// Square root of the distance matrix `A`. Line and plane projectors are
    /// symmetric idempotent, so they are their own square root.
    pub a_sqrt: Matrix3<f64>,
    /// The keypoint, in the frame being optimized.
    pub x: Vector3<f64>,
    /// Anchor point on the matched primitive.
    pub p: Vector3<f64>,
    /// Intra-sweep acquisition time (1.0 when undistortion is off).
    pub time_fraction: f64,
    /// Outlier attenuation in [0, 1].
    pub weight: f64,
}

/// A line fitted to an edge neighborhood.
pub(super) struct LineFit {
    /// Neighborhood centroid.
    pub centroid: Vector3<f64>,
    /// Unit direction of the line.
    pub direction: Vector3<f64>,
}

impl LineFit {
    /// Distance of a point to the fitted line.
    pub fn distance(&self, p: &Vector3<f64>) -> f64 {
        let d = p - self.centroid;
        (d - self.direction * d.dot(&self.direction)).norm()
    }

    /// Distance matrix square root: the orthogonal projector
    /// `I - n * nᵀ` onto the plane normal to the line direction.
    pub fn a_sqrt(&self) -> Matrix3<f64> {
        let projector = Matrix3::identity() - self.direction * self.direction.transpose();
        // A = projectorᵀ * projector; the projector is symmetric idempotent,
        // so A equals the projector and is its own square root.
        projector
    }
}

/// A plane fitted to a planar neighborhood.
pub(super) struct PlaneFit {
    /// Neighborhood centroid.
    pub centroid: Vector3<f64>,
    /// Unit normal of the plane.
    pub normal: Vector3<f64>,
}

impl PlaneFit {
    /// Signed distance of a point to the fitted plane.
    pub fn distance(&self, p: &Vector3<f64>) -> f64 {
        (p - self.centroid).dot(&self.normal)
    }

    /// Distance matrix square root `n * nᵀ`.
    pub fn a_sqrt(&self) -> Matrix3<f64> {
        self.normal * self.normal.transpose()
    }
}

/// Fit a line through a neighborhood; `None` unless the scatter passes the
/// elongation gate (largest eigenvalue above `factor` times the next).
pub(super) fn fit_line(points: &[Vector3<f64>], factor: f64) -> Option<LineFit> {
    if points.len() < 2 {
        return None;
    }
    let c = centroid(points);
    let eig = sorted_eigen(&scatter_matrix(points, &c));
    if eig.values[2] <= factor * eig.values[1] {
        return None;
    }
    Some(LineFit {
        centroid: c,
        direction: eig.vectors[2].normalize(),
    })
}

/// Fit a plane through a neighborhood; `None` unless the scatter shows the
/// planar eigenvalue pattern: two comparable large eigenvalues
/// (`λ_max < factor1 * λ_mid`) and one small one (`λ_mid > factor2 * λ_min`).
pub(super) fn fit_plane(points: &[Vector3<f64>], factor1: f64, factor2: f64) -> Option<PlaneFit> {
    if points.len() < 3 {
        return None;
    }
    let c = centroid(points);
    let eig = sorted_eigen(&scatter_matrix(points, &c));
    if eig.values[2] >= factor1 * eig.values[1] || eig.values[1] <= factor2 * eig.values[0] {
        return None;
    }
    Some(PlaneFit {
        centroid: c,
        normal: eig.vectors[0].normalize(),
    })
}

/// Sphericity of a neighborhood: smallest over largest scatter eigenvalue.
pub(super) fn sphericity(points: &[Vector3<f64>]) -> f64 {
    let c = centroid(points);
    let eig = sorted_eigen(&scatter_matrix(points, &c));
    if eig.values[2] > 1e-12 {
        eig.values[0] / eig.values[2]
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fit_line_on_collinear_points() {
        let pts: Vec<Vector3<f64>> = (0..8)
            .map(|i| Vector3::new(i as f64 * 0.5, 1.0, 2.0))
            .collect();
        let fit = fit_line(&pts, 5.0).unwrap();
        assert!(fit.direction.x.abs() > 0.999);
        assert_relative_eq!(fit.distance(&Vector3::new(10.0, 1.0, 2.0)), 0.0, epsilon = 1e-9);
        assert_relative_eq!(fit.distance(&Vector3::new(0.0, 2.0, 2.0)), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_fit_line_rejects_planar_spread() {
        let mut pts = Vec::new();
        for i in 0..4 {
            for j in 0..4 {
                pts.push(Vector3::new(i as f64, j as f64, 0.0));
            }
        }
        assert!(fit_line(&pts, 5.0).is_none());
    }

    #[test]
    fn test_fit_plane_on_grid() {
        let mut pts = Vec::new();
        for i in 0..4 {
            for j in 0..4 {
                pts.push(Vector3::new(i as f64, j as f64, 3.0));
            }
        }
        let fit = fit_plane(&pts, 35.0, 8.0).unwrap();
        assert!(fit.normal.z.abs() > 0.999);
        assert_relative_eq!(fit.distance(&Vector3::new(0.5, 0.5, 4.0)), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_fit_plane_rejects_collinear_points() {
        let pts: Vec<Vector3<f64>> = (0..8).map(|i| Vector3::new(i as f64, 0.0, 0.0)).collect();
        assert!(fit_plane(&pts, 35.0, 8.0).is_none());
    }

    #[test]
    fn test_line_projector_annihilates_direction() {
        let pts: Vec<Vector3<f64>> = (0..6).map(|i| Vector3::new(i as f64, 0.0, 0.0)).collect();
        let fit = fit_line(&pts, 5.0).unwrap();
        let a = fit.a_sqrt();
        let along = a * Vector3::new(1.0, 0.0, 0.0);
        assert!(along.norm() < 1e-9);
        let across = a * Vector3::new(0.0, 1.0, 0.0);
        assert_relative_eq!(across.norm(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_plane_projector_keeps_normal_only() {
        let mut pts = Vec::new();
        for i in 0..3 {
            for j in 0..3 {
                pts.push(Vector3::new(i as f64, j as f64, 0.0));
            }
        }
        let fit = fit_plane(&pts, 35.0, 8.0).unwrap();
        let a = fit.a_sqrt();
        let in_plane = a * Vector3::new(1.0, 1.0, 0.0);
        assert!(in_plane.norm() < 1e-9);
    }

    #[test]
    fn test_sphericity() {
        // A symmetric cross in 3D is isotropic.
        let pts = vec![
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(-1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(0.0, -1.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(0.0, 0.0, -1.0),
        ];
        assert_relative_eq!(sphericity(&pts), 1.0, epsilon = 1e-9);

        let flat: Vec<Vector3<f64>> = (0..6).map(|i| Vector3::new(i as f64, 0.0, 0.0)).collect();
        assert!(sphericity(&flat) < 1e-9);
    }
}
