//! Row-major image buffers used throughout the refinement core.
//!
//! The core never touches encoded video frames; it only sees float buffers
//! produced by the classifier and the renderer, so a thin runtime-sized
//! container is all that is needed.

use crate::error::ConfigError;

/// Row-major, contiguous image buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Image<T> {
    width: usize,
    height: usize,
    data: Vec<T>,
}

impl<T: Copy + Default> Image<T> {
    /// Allocate a new image filled with `T::default()`.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![T::default(); width * height],
        }
    }

    /// Allocate a new image filled with `value`.
    pub fn filled(width: usize, height: usize, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        debug_assert!(x < self.width && y < self.height);
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        debug_assert!(x < self.width && y < self.height);
        self.data[y * self.width + x] = value;
    }

    /// True if `(x, y)` lies inside the image bounds.
    #[inline]
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Iterate over `(x, y, value)` triples in row-major order.
    pub fn iter_pixels(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        let width = self.width;
        self.data
            .iter()
            .enumerate()
            .map(move |(i, &v)| (i % width, i / width, v))
    }
}

/// Per-pixel class probabilities produced by the external classifier.
///
/// Channel 0 is the background probability, channel 1 the primary foreground
/// probability. Additional channels (sub-classes such as shaft/tip) are
/// carried but ignored by the refinement core.
#[derive(Debug, Clone)]
pub struct ClassificationMap {
    width: usize,
    height: usize,
    channels: usize,
    data: Vec<f32>,
}

/// Minimum number of channels: background + one foreground class.
pub const MIN_CLASSES: usize = 2;

/// Largest channel count seen in practice (background + 3 sub-classes).
pub const MAX_CLASSES: usize = 4;

impl ClassificationMap {
    /// Build a map from raw interleaved channel data.
    ///
    /// Fails fast if the channel count is outside `[MIN_CLASSES, MAX_CLASSES]`
    /// or the buffer length does not match the stated dimensions.
    pub fn from_raw(
        width: usize,
        height: usize,
        channels: usize,
        data: Vec<f32>,
    ) -> Result<Self, ConfigError> {
        if !(MIN_CLASSES..=MAX_CLASSES).contains(&channels) {
            return Err(ConfigError::BadChannelCount { channels });
        }
        if data.len() != width * height * channels {
            return Err(ConfigError::BufferSizeMismatch {
                expected: width * height * channels,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Allocate an all-background map (channel 0 = 1.0 everywhere).
    pub fn all_background(width: usize, height: usize) -> Self {
        let mut data = vec![0.0f32; width * height * MIN_CLASSES];
        for px in data.chunks_exact_mut(MIN_CLASSES) {
            px[0] = 1.0;
        }
        Self {
            width,
            height,
            channels: MIN_CLASSES,
            data,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Background probability at `(x, y)`.
    #[inline]
    pub fn background(&self, x: usize, y: usize) -> f32 {
        self.data[(y * self.width + x) * self.channels]
    }

    /// Primary foreground probability at `(x, y)`.
    #[inline]
    pub fn foreground(&self, x: usize, y: usize) -> f32 {
        self.data[(y * self.width + x) * self.channels + 1]
    }

    /// Set background and foreground probabilities at `(x, y)`.
    pub fn set_probabilities(&mut self, x: usize, y: usize, bg: f32, fg: f32) {
        let base = (y * self.width + x) * self.channels;
        self.data[base] = bg;
        self.data[base + 1] = fg;
    }
}
