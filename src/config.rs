//! Tracker configuration with per-field defaults and TOML loading.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct TrackerConfig {
    /// Half-width of the smoothed Heaviside transition band, in pixels.
    #[serde(default = "default_heaviside_width")]
    pub heaviside_width: f32,
    /// Fixed number of refinement steps per frame.
    #[serde(default = "default_num_steps")]
    pub num_steps: usize,
    /// Gradient step scale for the translation DOFs.
    #[serde(default = "default_translation_step")]
    pub translation_step: f64,
    /// Gradient step scale for the rotation and joint DOFs.
    #[serde(default = "default_rotation_step")]
    pub rotation_step: f64,
    /// Minimum contour-band pixel count below which the track is lost.
    #[serde(default = "default_min_contour_area")]
    pub min_contour_area: usize,
    /// Minimum foreground area (sum of Heaviside values) below which the
    /// track is lost.
    #[serde(default = "default_min_foreground_area")]
    pub min_foreground_area: f64,
}

fn default_heaviside_width() -> f32 {
    // Earlier experiments ran with a band of 6; 3 converges just as reliably
    // and halves the number of band pixels per step.
    3.0
}
fn default_num_steps() -> usize {
    45
}
fn default_translation_step() -> f64 {
    5e-3
}
fn default_rotation_step() -> f64 {
    5e-4
}
fn default_min_contour_area() -> usize {
    10
}
fn default_min_foreground_area() -> f64 {
    1.0
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            heaviside_width: default_heaviside_width(),
            num_steps: default_num_steps(),
            translation_step: default_translation_step(),
            rotation_step: default_rotation_step(),
            min_contour_area: default_min_contour_area(),
            min_foreground_area: default_min_foreground_area(),
        }
    }
}

impl TrackerConfig {
    /// Load configuration from a TOML file; missing fields take defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())
            .with_context(|| format!("reading config file {}", path.as_ref().display()))?;
        let config: Self = toml::from_str(&text).context("parsing tracker config")?;
        Ok(config)
    }
}
