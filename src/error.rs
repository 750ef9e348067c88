//! Fatal configuration errors.
//!
//! Setup problems fail fast and are never recovered mid-frame. Degenerate
//! geometry (empty silhouette, collapsed contour band) is deliberately *not*
//! an error: it is reported in-band as a lost track so the caller can
//! re-acquire on the next detection.

use thiserror::Error;

/// Errors raised while wiring up the tracker, all fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A model declares more degrees of freedom than the refiner supports.
    #[error("model has {dofs} degrees of freedom, maximum supported is {max}")]
    TooManyDofs { dofs: usize, max: usize },

    /// A per-DOF derivative was requested for an out-of-range index.
    #[error("DOF index {index} out of range for a {dofs}-DOF model")]
    DofIndexOutOfRange { index: usize, dofs: usize },

    /// Classification map does not carry background + foreground channels.
    #[error("classification map has {channels} channels, need 2 to 4")]
    BadChannelCount { channels: usize },

    /// A raw buffer does not match its stated dimensions.
    #[error("buffer length {actual} does not match expected {expected}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// Renderer output or classification map does not match the tracked ROI.
    #[error("image size {actual_w}x{actual_h} does not match ROI {expected_w}x{expected_h}")]
    SizeMismatch {
        expected_w: usize,
        expected_h: usize,
        actual_w: usize,
        actual_h: usize,
    },
}
