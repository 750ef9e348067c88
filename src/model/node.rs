//! Kinematic tree of an articulated model.
//!
//! Instead of a class hierarchy the tree is a tagged variant walked
//! iteratively with an explicit stack: a `Rigid` node is fixed relative to
//! its parent, a `Dh` node adds one revolute degree of freedom described by
//! Denavit-Hartenberg parameters.

use nalgebra::{Matrix4, Vector3};

/// One element of the kinematic tree.
#[derive(Debug, Clone)]
pub enum Node {
    /// Rigidly attached part with a fixed transform relative to its parent.
    Rigid {
        relative: Matrix4<f64>,
        children: Vec<Node>,
    },
    /// Revolute DH joint contributing one degree of freedom. The current
    /// joint value lives in the pose, not the tree; the stored parameters
    /// describe the rest configuration.
    Dh {
        /// Angle about the common normal between links.
        alpha: f64,
        /// Fixed angle offset about the previous joint axis.
        theta: f64,
        /// Length of the common normal.
        a: f64,
        /// Offset along the previous joint axis.
        d: f64,
        children: Vec<Node>,
    },
}

impl Node {
    /// Transform between this node and its parent, at the rest
    /// configuration.
    pub fn relative_transform(&self) -> Matrix4<f64> {
        match self {
            Node::Rigid { relative, .. } => *relative,
            Node::Dh {
                alpha, theta, a, d, ..
            } => dh_transform(*alpha, *theta, *a, *d),
        }
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Node::Rigid { children, .. } | Node::Dh { children, .. } => children,
        }
    }

    /// Number of joint DOFs in the subtree rooted at this node.
    pub fn count_joint_dofs(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if matches!(node, Node::Dh { .. }) {
                count += 1;
            }
            stack.extend(node.children().iter());
        }
        count
    }

    /// World transform of the `joint_index`-th DH joint under `base`,
    /// together with the joint origin and rotation axis in world coordinates.
    ///
    /// Joints are numbered in depth-first order. Returns `None` when the
    /// index exceeds the number of joints in the tree.
    pub fn joint_frame(&self, base: &Matrix4<f64>, joint_index: usize) -> Option<JointFrame> {
        let mut seen = 0;
        // Depth-first walk carrying the parent world transform.
        let mut stack: Vec<(&Node, Matrix4<f64>)> = vec![(self, *base)];
        while let Some((node, parent_world)) = stack.pop() {
            if matches!(node, Node::Dh { .. }) {
                if seen == joint_index {
                    // A revolute DH joint rotates about the z axis of the
                    // parent frame, through the parent frame origin.
                    let origin = parent_world.fixed_view::<3, 1>(0, 3).into_owned();
                    let axis = parent_world.fixed_view::<3, 1>(0, 2).into_owned();
                    return Some(JointFrame { origin, axis });
                }
                seen += 1;
            }
            let world = parent_world * node.relative_transform();
            for child in node.children() {
                stack.push((child, world));
            }
        }
        None
    }
}

/// Origin and rotation axis of a revolute joint in world coordinates.
pub struct JointFrame {
    pub origin: Vector3<f64>,
    pub axis: Vector3<f64>,
}

impl JointFrame {
    /// Derivative of a world point with respect to the joint angle.
    #[inline]
    pub fn point_derivative(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.axis.cross(&(point - self.origin))
    }
}

/// Standard DH link transform.
fn dh_transform(alpha: f64, theta: f64, a: f64, d: f64) -> Matrix4<f64> {
    let (st, ct) = theta.sin_cos();
    let (sa, ca) = alpha.sin_cos();
    Matrix4::new(
        ct, -st * ca, st * sa, a * ct, //
        st, ct * ca, -ct * sa, a * st, //
        0.0, sa, ca, d, //
        0.0, 0.0, 0.0, 1.0,
    )
}
