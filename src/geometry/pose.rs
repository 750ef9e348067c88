//! Object pose parameterized for gradient-based refinement.
//!
//! The rigid base carries 6 parameters: 3 translation components and a
//! 3-component rotation update in the Lie algebra of SO(3), applied as a
//! left perturbation `exp([ω]×)·R` and folded back into the stored
//! quaternion after every step. Articulated joint angles ride along as
//! plain additive parameters after the rigid block, so a single joint fits
//! inside the 7-DOF cap.

use nalgebra::{Matrix4, UnitQuaternion, Vector3};

use crate::error::ConfigError;

/// Maximum number of degrees of freedom the refiner supports.
pub const MAX_DOFS: usize = 7;

/// DOFs of the rigid base (3 translation + 3 rotation).
pub const RIGID_DOFS: usize = 6;

/// Object-to-camera pose: rigid transform plus current joint angles.
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    pub translation: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
    /// Joint angles in depth-first joint order; empty for a rigid body.
    pub joints: Vec<f64>,
}

impl Pose {
    pub fn identity() -> Self {
        Self {
            translation: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            joints: Vec::new(),
        }
    }

    pub fn new(translation: Vector3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        Self {
            translation,
            rotation,
            joints: Vec::new(),
        }
    }

    /// Number of active degrees of freedom, rigid base plus joints.
    pub fn num_dofs(&self) -> usize {
        RIGID_DOFS + self.joints.len()
    }

    /// Homogeneous object-to-camera transform.
    pub fn matrix(&self) -> Matrix4<f64> {
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(self.rotation.to_rotation_matrix().matrix());
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        m
    }

    /// Map an object-space point into camera space.
    #[inline]
    pub fn transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * p + self.translation
    }

    /// Map a camera-space point back into object space.
    #[inline]
    pub fn inverse_transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.inverse() * (p - self.translation)
    }

    /// Derivative of a camera-space surface point with respect to one rigid
    /// DOF.
    ///
    /// `point_cam` is a point on the object surface at the *current* pose.
    /// DOFs 0..3 are translation; DOFs 3..6 are the rotation perturbation
    /// `exp([ω]×)·R` evaluated at ω = 0, which gives `eᵢ × (p − t)`. Joint
    /// DOFs are the model's concern, not the rigid pose's.
    pub fn dof_derivative(
        &self,
        dof: usize,
        point_cam: &Vector3<f64>,
    ) -> Result<Vector3<f64>, ConfigError> {
        if dof >= RIGID_DOFS {
            return Err(ConfigError::DofIndexOutOfRange {
                index: dof,
                dofs: RIGID_DOFS,
            });
        }

        let mut axis = Vector3::zeros();
        if dof < 3 {
            axis[dof] = 1.0;
            Ok(axis)
        } else {
            axis[dof - 3] = 1.0;
            Ok(axis.cross(&(point_cam - self.translation)))
        }
    }

    /// Apply an additive step to every DOF.
    ///
    /// Translation and joint angles add directly; the rotation components
    /// are an so(3) increment composed onto the quaternion, which stays
    /// normalized by construction.
    pub fn apply_step(&mut self, deltas: &[f64]) {
        debug_assert_eq!(deltas.len(), self.num_dofs());
        self.translation.x += deltas[0];
        self.translation.y += deltas[1];
        self.translation.z += deltas[2];

        let omega = Vector3::new(deltas[3], deltas[4], deltas[5]);
        self.rotation = UnitQuaternion::from_scaled_axis(omega) * self.rotation;

        for (joint, delta) in self.joints.iter_mut().zip(&deltas[RIGID_DOFS..]) {
            *joint += delta;
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_transform_roundtrip() {
        let pose = Pose::new(
            Vector3::new(0.5, -1.0, 12.0),
            UnitQuaternion::from_euler_angles(0.3, -0.2, 0.7),
        );
        let p = Vector3::new(1.0, 2.0, 3.0);
        let cam = pose.transform_point(&p);
        assert_relative_eq!(pose.inverse_transform_point(&cam), p, epsilon = 1e-12);
    }

    #[test]
    fn test_dof_index_out_of_range_is_fatal() {
        let pose = Pose::identity();
        let err = pose.dof_derivative(6, &Vector3::new(0.0, 0.0, 1.0));
        assert!(matches!(err, Err(ConfigError::DofIndexOutOfRange { .. })));
    }

    /// Analytic rigid DOF derivatives must agree with central finite
    /// differences of the perturbed transform.
    #[test]
    fn test_dof_derivatives_match_finite_differences() {
        let pose = Pose::new(
            Vector3::new(0.2, -0.4, 10.0),
            UnitQuaternion::from_euler_angles(0.1, 0.5, -0.3),
        );
        let obj = Vector3::new(0.7, -0.3, 1.1);
        let cam = pose.transform_point(&obj);
        let h = 1e-6;

        for dof in 0..RIGID_DOFS {
            let analytic = pose.dof_derivative(dof, &cam).unwrap();

            let eval = |delta: f64| -> Vector3<f64> {
                let mut t = pose.translation;
                let mut omega = Vector3::zeros();
                if dof < 3 {
                    t[dof] += delta;
                } else {
                    omega[dof - 3] = delta;
                }
                let rot = UnitQuaternion::from_scaled_axis(omega) * pose.rotation;
                rot * obj + t
            };

            let numeric = (eval(h) - eval(-h)) / (2.0 * h);
            assert_relative_eq!(analytic, numeric, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_apply_step_keeps_quaternion_normalized() {
        let mut pose = Pose::identity();
        pose.apply_step(&[0.1, 0.0, -0.2, 0.05, 0.3, -0.1]);
        assert_relative_eq!(pose.rotation.quaternion().norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(pose.translation.x, 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_apply_step_updates_joint_angles() {
        let mut pose = Pose::identity();
        pose.joints = vec![0.2];
        assert_eq!(pose.num_dofs(), 7);

        pose.apply_step(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, -0.05]);
        assert_relative_eq!(pose.joints[0], 0.15, epsilon = 1e-12);
        assert_relative_eq!(pose.translation.x, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rotation_step_composes_left() {
        let mut pose = Pose::new(
            Vector3::zeros(),
            UnitQuaternion::from_euler_angles(0.0, 0.0, 0.3),
        );
        pose.apply_step(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.1]);
        let expected =
            UnitQuaternion::from_scaled_axis(Vector3::new(0.0, 0.0, 0.1)) * UnitQuaternion::from_euler_angles(0.0, 0.0, 0.3);
        assert_relative_eq!(pose.rotation.angle(), expected.angle(), epsilon = 1e-12);
    }
}
