//! Articulated instrument models: kinematic node tree and DOF Jacobians.

pub mod instrument;
pub mod node;

pub use instrument::InstrumentModel;
pub use node::Node;
