//! Tracked instrument model: gross geometry plus the kinematic tree.

use nalgebra::Vector3;

use crate::error::ConfigError;
use crate::geometry::{Pose, MAX_DOFS, RIGID_DOFS};
use crate::model::node::Node;

/// A minimally invasive instrument approximated by its shaft cylinder.
///
/// The shaft axis runs along object-space +x, centered on the origin. The
/// rigid base pose contributes 6 DOFs; any DH joints in the tree add one
/// each, capped at [`MAX_DOFS`] overall, so one articulated joint fits.
#[derive(Debug, Clone)]
pub struct InstrumentModel {
    /// Shaft radius in world units.
    pub radius: f64,
    /// Shaft length in world units.
    pub height: f64,
    root: Option<Node>,
    num_dofs: usize,
}

impl InstrumentModel {
    /// A purely rigid cylindrical instrument.
    pub fn cylinder(radius: f64, height: f64) -> Self {
        Self {
            radius,
            height,
            root: None,
            num_dofs: RIGID_DOFS,
        }
    }

    /// An articulated instrument with the given kinematic tree.
    ///
    /// Fails fast when the total DOF count (rigid base + joints) exceeds the
    /// supported maximum.
    pub fn articulated(radius: f64, height: f64, root: Node) -> Result<Self, ConfigError> {
        let num_dofs = RIGID_DOFS + root.count_joint_dofs();
        if num_dofs > MAX_DOFS {
            return Err(ConfigError::TooManyDofs {
                dofs: num_dofs,
                max: MAX_DOFS,
            });
        }
        Ok(Self {
            radius,
            height,
            root: Some(root),
            num_dofs,
        })
    }

    pub fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    /// Number of articulated joints beyond the rigid base.
    pub fn num_joints(&self) -> usize {
        self.num_dofs - RIGID_DOFS
    }

    /// Derivative of a camera-space surface point with respect to one DOF at
    /// the given pose.
    ///
    /// DOFs below [`RIGID_DOFS`] belong to the base pose; the remainder map
    /// onto DH joints in depth-first order.
    pub fn compute_jacobian(
        &self,
        pose: &Pose,
        point_cam: &Vector3<f64>,
        dof: usize,
    ) -> Result<Vector3<f64>, ConfigError> {
        if dof >= self.num_dofs {
            return Err(ConfigError::DofIndexOutOfRange {
                index: dof,
                dofs: self.num_dofs,
            });
        }
        if dof < RIGID_DOFS {
            return pose.dof_derivative(dof, point_cam);
        }

        let root = self
            .root
            .as_ref()
            .expect("joint DOF on a model without a kinematic tree");
        let frame = root
            .joint_frame(&pose.matrix(), dof - RIGID_DOFS)
            .ok_or(ConfigError::DofIndexOutOfRange {
                index: dof,
                dofs: self.num_dofs,
            })?;
        Ok(frame.point_derivative(point_cam))
    }

    /// All per-DOF derivatives at one point, in DOF order.
    pub fn compute_jacobians(
        &self,
        pose: &Pose,
        point_cam: &Vector3<f64>,
    ) -> Result<Vec<Vector3<f64>>, ConfigError> {
        (0..self.num_dofs)
            .map(|dof| self.compute_jacobian(pose, point_cam, dof))
            .collect()
    }
}
