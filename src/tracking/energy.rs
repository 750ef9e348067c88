//! Region energy: smoothed Heaviside/Dirac of the SDF, per-pixel region
//! agreement and negative log-likelihood, and area statistics.

use crate::image::{ClassificationMap, Image};

/// Epsilon applied to the probability mixture. One consistent guard is used
/// everywhere the mixture appears in a denominator or a logarithm.
pub const PROB_EPS: f32 = 1e-7;

/// Margin subtracted from the band half-width when counting contour pixels.
const BAND_MARGIN: f32 = 0.1;

/// Smoothed step of the SDF: 0 below the band, 1 above, sine-eased inside.
///
/// `w` is the transition half-width in pixels.
#[inline]
pub fn heaviside(s: f32, w: f32) -> f32 {
    if s <= -w {
        0.0
    } else if s >= w {
        1.0
    } else {
        0.5 * (1.0 + s / w + (std::f32::consts::PI * s / w).sin() / std::f32::consts::PI)
    }
}

/// Derivative of [`heaviside`]: a smoothed impulse supported on `|s| < w`.
#[inline]
pub fn dirac(s: f32, w: f32) -> f32 {
    if s.abs() >= w {
        0.0
    } else {
        (1.0 + (std::f32::consts::PI * s / w).cos()) / (2.0 * w)
    }
}

/// Probability mixture `H·Pf + (1−H)·Pb` at one pixel.
#[inline]
fn mixture(pf: f32, pb: f32, h: f32) -> f32 {
    h * pf + (1.0 - h) * pb
}

/// Per-pixel region agreement: how strongly the classification supports the
/// candidate silhouette at this SDF value.
#[inline]
pub fn region_agreement(pf: f32, pb: f32, h: f32) -> f32 {
    (pf - pb) / (mixture(pf, pb, h) + PROB_EPS)
}

/// Per-pixel negative log-likelihood, for diagnostics only.
#[inline]
pub fn error_value(pf: f32, pb: f32, h: f32) -> f32 {
    -(mixture(pf, pb, h) + PROB_EPS).ln()
}

/// Area statistics of one SDF, feeding the refiner's health checks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AreaStats {
    /// Sum of Heaviside values: the soft foreground area in pixels.
    pub foreground: f64,
    /// Sum of complementary Heaviside values.
    pub background: f64,
    /// Number of pixels inside the contour band.
    pub contour: usize,
}

/// Compute soft foreground/background areas and the contour-band pixel
/// count for an SDF with band half-width `w`.
pub fn compute_areas(sdf: &Image<f32>, w: f32) -> AreaStats {
    let mut foreground = 0.0f64;
    let mut background = 0.0f64;
    let mut contour = 0usize;
    let band = w - BAND_MARGIN;

    for &s in sdf.as_slice() {
        let h = heaviside(s, w) as f64;
        foreground += h;
        background += 1.0 - h;
        if s.abs() < band {
            contour += 1;
        }
    }

    AreaStats {
        foreground,
        background,
        contour,
    }
}

/// Total negative log-likelihood of the frame under the candidate pose.
pub fn total_error(sdf: &Image<f32>, classification: &ClassificationMap, w: f32) -> f64 {
    let mut total = 0.0f64;
    for (x, y, s) in sdf.iter_pixels() {
        let h = heaviside(s, w);
        total += error_value(
            classification.foreground(x, y),
            classification.background(x, y),
            h,
        ) as f64;
    }
    total
}
