//! Per-frame refinement state machine.

/// State of one tracked object's refinement loop within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefineState {
    /// No pose yet; waiting for a detection to seed from.
    Idle,
    /// Iterating pose updates on the current frame.
    Refining,
    /// Step budget exhausted; the pose is taken as converged for this frame
    /// and the loop waits for the next one.
    NeedsNewFrame,
    /// Silhouette degenerated mid-refinement; awaiting re-acquisition.
    Lost,
}

impl Default for RefineState {
    fn default() -> Self {
        Self::Idle
    }
}
