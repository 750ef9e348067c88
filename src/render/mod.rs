//! Rendering boundary.
//!
//! Rasterizing the posed mesh is an external concern (in production a GPU
//! pass); the refinement core only depends on the [`GeometryRenderer`]
//! contract and on the [`service::RenderService`] that puts a renderer
//! behind a request/response channel, making the per-step blocking call
//! explicit and mockable.

pub mod cylinder;
pub mod service;

use crate::camera::CameraModel;
use crate::geometry::Pose;
use crate::image::Image;
use crate::model::InstrumentModel;

pub use cylinder::CylinderRenderer;
pub use service::{RenderHandle, RenderService};

/// Sentinel depth for "no intersection" pixels.
pub const FAR: f32 = 1000.0;

/// Tolerance when comparing a depth value against [`FAR`].
pub const FAR_EPS: f32 = 1e-4;

/// True if `depth` denotes a real surface intersection.
#[inline]
pub fn is_hit(depth: f32) -> bool {
    (depth - FAR).abs() > FAR_EPS
}

/// Output of one render pass: front/back depth plus the silhouette contour.
#[derive(Debug, Clone)]
pub struct RenderedBuffers {
    /// Depth of the first ray/surface intersection per pixel, [`FAR`] outside.
    pub front_depth: Image<f32>,
    /// Depth of the last ray/surface intersection per pixel, [`FAR`] outside.
    pub back_depth: Image<f32>,
    /// Binary silhouette contour (1 on contour pixels).
    pub contour: Image<u8>,
}

/// Produces depth and contour buffers for a posed model.
pub trait GeometryRenderer: Send {
    fn render(
        &self,
        model: &InstrumentModel,
        pose: &Pose,
        camera: &CameraModel,
        width: usize,
        height: usize,
    ) -> RenderedBuffers;
}

/// Mark silhouette contour pixels from a hit mask: a hit pixel with at least
/// one missed 4-neighbour (image borders count as missed).
pub(crate) fn contour_from_mask(mask: &Image<bool>) -> Image<u8> {
    let (w, h) = (mask.width(), mask.height());
    let mut contour = Image::<u8>::new(w, h);
    for y in 0..h {
        for x in 0..w {
            if !mask.get(x, y) {
                continue;
            }
            let on_edge = x == 0 || y == 0 || x == w - 1 || y == h - 1;
            let exposed = on_edge
                || !mask.get(x - 1, y)
                || !mask.get(x + 1, y)
                || !mask.get(x, y - 1)
                || !mask.get(x, y + 1);
            if exposed {
                contour.set(x, y, 1);
            }
        }
    }
    contour
}
