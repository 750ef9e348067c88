//! Geometry utilities: rigid pose parameterization and DOF derivatives.

pub mod pose;

pub use pose::{Pose, MAX_DOFS, RIGID_DOFS};
