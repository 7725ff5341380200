//! Shared geometric math: centroids, scatter matrices and sorted
//! eigendecompositions of 3D neighborhoods.
//!
//! Both the keypoint extractor and the matching kernel classify local point
//! neighborhoods by the eigenvalue pattern of their 3x3 scatter matrix:
//! one dominant eigenvalue means a line, one small eigenvalue means a plane,
//! three comparable eigenvalues mean an isotropic blob.

use nalgebra::{Matrix3, SymmetricEigen, Vector3};

/// Eigendecomposition of a symmetric 3x3 matrix with eigenvalues sorted
/// ascending (`values[0]` smallest) and eigenvectors matched by index.
#[derive(Debug, Clone)]
pub struct SortedEigen3 {
    /// Eigenvalues, ascending.
    pub values: [f64; 3],
    /// Unit eigenvectors, `vectors[i]` belongs to `values[i]`.
    pub vectors: [Vector3<f64>; 3],
}

/// Centroid of a set of positions. Returns the origin for an empty slice.
pub fn centroid(points: &[Vector3<f64>]) -> Vector3<f64> {
    if points.is_empty() {
        return Vector3::zeros();
    }
    let sum: Vector3<f64> = points.iter().sum();
    sum / points.len() as f64
}

/// Scatter (sample covariance, unnormalized) matrix of positions about a
/// given centroid.
pub fn scatter_matrix(points: &[Vector3<f64>], centroid: &Vector3<f64>) -> Matrix3<f64> {
    let mut scatter = Matrix3::zeros();
    for p in points {
        let d = p - centroid;
        scatter += d * d.transpose();
    }
    scatter
}

/// Eigendecomposition of a symmetric matrix, sorted ascending.
pub fn sorted_eigen(m: &Matrix3<f64>) -> SortedEigen3 {
    let eigen = SymmetricEigen::new(*m);
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[a]
            .partial_cmp(&eigen.eigenvalues[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    SortedEigen3 {
        values: [
            eigen.eigenvalues[order[0]],
            eigen.eigenvalues[order[1]],
            eigen.eigenvalues[order[2]],
        ],
        vectors: [
            eigen.eigenvectors.column(order[0]).into_owned(),
            eigen.eigenvectors.column(order[1]).into_owned(),
            eigen.eigenvectors.column(order[2]).into_owned(),
        ],
    }
}

/// Sine of the angle between two vectors, in [0, 1].
///
/// Returns 0 when either vector is degenerate.
pub fn sin_angle(u: &Vector3<f64>, v: &Vector3<f64>) -> f64 {
    let denom = u.norm() * v.norm();
    if denom < 1e-12 {
        return 0.0;
    }
    (u.cross(v).norm() / denom).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_centroid() {
        let pts = vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(2.0, 0.0, 0.0),
            Vector3::new(1.0, 3.0, 0.0),
        ];
        let c = centroid(&pts);
        assert_relative_eq!(c.x, 1.0);
        assert_relative_eq!(c.y, 1.0);
        assert_relative_eq!(c.z, 0.0);
    }

    #[test]
    fn test_centroid_empty() {
        assert_eq!(centroid(&[]), Vector3::zeros());
    }

    #[test]
    fn test_eigen_of_line_distribution() {
        // Points along the x axis: one dominant eigenvalue, direction x.
        let pts: Vec<Vector3<f64>> = (0..10)
            .map(|i| Vector3::new(i as f64, 0.001 * i as f64, 0.0))
            .collect();
        let c = centroid(&pts);
        let eig = sorted_eigen(&scatter_matrix(&pts, &c));

        assert!(eig.values[2] > 100.0 * eig.values[1]);
        assert!(eig.vectors[2].x.abs() > 0.99);
    }

    #[test]
    fn test_eigen_of_plane_distribution() {
        // Points on the z = 0 plane: smallest eigenvector is the normal.
        let mut pts = Vec::new();
        for i in 0..5 {
            for j in 0..5 {
                pts.push(Vector3::new(i as f64, j as f64, 0.0));
            }
        }
        let c = centroid(&pts);
        let eig = sorted_eigen(&scatter_matrix(&pts, &c));

        assert!(eig.values[0] < 1e-9);
        assert!(eig.values[1] > 1.0);
        assert!(eig.vectors[0].z.abs() > 0.99);
    }

    #[test]
    fn test_eigen_sorted_ascending() {
        let m = Matrix3::from_diagonal(&Vector3::new(5.0, 1.0, 3.0));
        let eig = sorted_eigen(&m);
        assert_relative_eq!(eig.values[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(eig.values[1], 3.0, epsilon = 1e-12);
        assert_relative_eq!(eig.values[2], 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sin_angle() {
        let x = Vector3::new(1.0, 0.0, 0.0);
        let y = Vector3::new(0.0, 2.0, 0.0);
        assert_relative_eq!(sin_angle(&x, &y), 1.0, epsilon = 1e-12);
        assert_relative_eq!(sin_angle(&x, &x), 0.0, epsilon = 1e-12);
        assert_relative_eq!(sin_angle(&x, &Vector3::zeros()), 0.0);
    }
}
