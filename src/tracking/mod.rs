//! Level-set pose refinement: SDF construction, region energy, per-DOF
//! gradients, the fixed-budget optimization loop and per-object temporal
//! state.

pub mod energy;
pub mod frame;
pub mod init;
pub mod jacobian;
pub mod optimizer;
pub mod sdf;
pub mod state;
pub mod temporal;
pub mod tracker;

pub use frame::Frame;
pub use optimizer::{PwpRefiner, StepOutcome, StepStats};
pub use state::RefineState;
pub use temporal::TemporalPoseState;
pub use tracker::{ObjectStatus, TrackStepResult, Tracker};
