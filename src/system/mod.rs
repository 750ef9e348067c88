//! System-level wiring: the context object tying camera, renderer and
//! tracker together.

pub mod context;

pub use context::{FrameResult, TrackingContext};
