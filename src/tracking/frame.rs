//! A classified frame handed to the tracker.

use crate::image::ClassificationMap;

/// One video frame after pixel classification.
///
/// The classification map is produced once per frame by the external
/// classifier and is read-only for the duration of that frame.
pub struct Frame {
    pub classification: ClassificationMap,
    pub frame_index: u64,
}

impl Frame {
    pub fn new(classification: ClassificationMap, frame_index: u64) -> Self {
        Self {
            classification,
            frame_index,
        }
    }

    pub fn width(&self) -> usize {
        self.classification.width()
    }

    pub fn height(&self) -> usize {
        self.classification.height()
    }
}
