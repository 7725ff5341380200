//! 6-DoF rigid-body pose.
//!
//! A pose is stored as a 6-vector `(rx, ry, rz, tx, ty, tz)`: three Euler
//! angles (applied as Rz * Ry * Rx) and a translation. The same
//! parameterization is used by the Levenberg-Marquardt solver, so conversions
//! between the vector form and the rotation matrix form are exact inverses of
//! each other.
//!
//! For motion undistortion the pose of the sensor at intra-sweep time
//! fraction `s` is interpolated as `(Slerp(I, R, s), s * t)`, the constant
//! linear and angular velocity model.

use nalgebra::{Matrix4, Rotation3, UnitQuaternion, Vector3, Vector6};
use serde::{Deserialize, Serialize};

/// A rigid transform as Euler angles (radians) plus translation (meters).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose6D {
    /// Rotation about x.
    pub rx: f64,
    /// Rotation about y.
    pub ry: f64,
    /// Rotation about z.
    pub rz: f64,
    /// Translation along x.
    pub tx: f64,
    /// Translation along y.
    pub ty: f64,
    /// Translation along z.
    pub tz: f64,
}

impl Pose6D {
    /// Create a pose from its six parameters.
    #[inline]
    pub fn new(rx: f64, ry: f64, rz: f64, tx: f64, ty: f64, tz: f64) -> Self {
        Self {
            rx,
            ry,
            rz,
            tx,
            ty,
            tz,
        }
    }

    /// Identity transform.
    #[inline]
    pub fn identity() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0)
    }

    /// Build a pose from a rotation matrix and translation vector.
    pub fn from_rotation_translation(rotation: &Rotation3<f64>, translation: &Vector3<f64>) -> Self {
        let (rx, ry, rz) = rotation.euler_angles();
        Self::new(rx, ry, rz, translation.x, translation.y, translation.z)
    }

    /// Rotation matrix `Rz(rz) * Ry(ry) * Rx(rx)`.
    #[inline]
    pub fn rotation(&self) -> Rotation3<f64> {
        Rotation3::from_euler_angles(self.rx, self.ry, self.rz)
    }

    /// Translation vector.
    #[inline]
    pub fn translation(&self) -> Vector3<f64> {
        Vector3::new(self.tx, self.ty, self.tz)
    }

    /// The pose as a 6-vector `(rx, ry, rz, tx, ty, tz)`.
    #[inline]
    pub fn as_vector(&self) -> Vector6<f64> {
        Vector6::new(self.rx, self.ry, self.rz, self.tx, self.ty, self.tz)
    }

    /// Build a pose from a 6-vector `(rx, ry, rz, tx, ty, tz)`.
    #[inline]
    pub fn from_vector(v: &Vector6<f64>) -> Self {
        Self::new(v[0], v[1], v[2], v[3], v[4], v[5])
    }

    /// Compose two poses: `self ∘ other`.
    ///
    /// If `self` maps frame B to frame A and `other` maps frame C to frame B,
    /// the result maps frame C to frame A.
    pub fn compose(&self, other: &Pose6D) -> Pose6D {
        let r = self.rotation() * other.rotation();
        let t = self.rotation() * other.translation() + self.translation();
        Pose6D::from_rotation_translation(&r, &t)
    }

    /// Inverse transform.
    pub fn inverse(&self) -> Pose6D {
        let r_inv = self.rotation().inverse();
        let t_inv = -(r_inv * self.translation());
        Pose6D::from_rotation_translation(&r_inv, &t_inv)
    }

    /// Transform a point: `R * p + t`.
    #[inline]
    pub fn transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation() * p + self.translation()
    }

    /// Inverse-transform a point: `Rᵀ * (p - t)`.
    #[inline]
    pub fn inverse_transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation().inverse() * (p - self.translation())
    }

    /// Pose of the sensor at intra-sweep time fraction `s ∈ [0, 1]`, under
    /// the constant-velocity model: `(Slerp(I, R, s), s * t)`.
    pub fn interpolate(&self, s: f64) -> Pose6D {
        let q = UnitQuaternion::from_rotation_matrix(&self.rotation());
        let qs = UnitQuaternion::identity().slerp(&q, s);
        let t = s * self.translation();
        Pose6D::from_rotation_translation(&qs.to_rotation_matrix(), &t)
    }

    /// Express a point acquired at time fraction `s` in the sweep-end frame.
    ///
    /// The acquisition frame is the sensor frame at time `s`; the end frame
    /// is the sensor frame at `s = 1`.
    pub fn transform_to_end(&self, p: &Vector3<f64>, s: f64) -> Vector3<f64> {
        self.interpolate(1.0)
            .inverse()
            .transform_point(&self.interpolate(s).transform_point(p))
    }

    /// Inverse of [`Pose6D::transform_to_end`]: take a sweep-end-frame point
    /// back to the sensor frame at acquisition time `s`.
    pub fn transform_to_start(&self, p: &Vector3<f64>, s: f64) -> Vector3<f64> {
        self.interpolate(s)
            .inverse()
            .transform_point(&self.interpolate(1.0).transform_point(p))
    }

    /// Homogeneous 4x4 matrix of the transform.
    pub fn to_matrix4(&self) -> Matrix4<f64> {
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(self.rotation().matrix());
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation());
        m
    }

    /// Euclidean norm of the translation part.
    #[inline]
    pub fn translation_norm(&self) -> f64 {
        self.translation().norm()
    }
}

impl Default for Pose6D {
    fn default() -> Self {
        Self::identity()
    }
}
