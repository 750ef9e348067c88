//! Monocular pinhole camera model.
//!
//! Projects camera-space points to pixels and unprojects pixels to
//! normalized rays. Distortion is assumed to have been removed upstream
//! (frames are rectified before classification), so only the intrinsic
//! matrix is carried here.

use std::sync::Arc;

use nalgebra::{Vector2, Vector3};
use parking_lot::RwLock;

/// Per-pixel unprojection lookup: for each pixel, the (x/z, y/z) ray
/// direction through that pixel. Built once per image size and shared.
pub struct UnprojectTable {
    width: usize,
    height: usize,
    rays: Vec<(f64, f64)>,
}

impl UnprojectTable {
    /// Normalized ray direction through pixel `(x, y)`, z component 1.
    #[inline]
    pub fn ray(&self, x: usize, y: usize) -> Vector3<f64> {
        debug_assert!(x < self.width && y < self.height);
        let (rx, ry) = self.rays[y * self.width + x];
        Vector3::new(rx, ry, 1.0)
    }
}

/// Intrinsic camera parameters plus the cached unprojection table.
pub struct CameraModel {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    /// Cached per-pixel rays, rebuilt only when the requested size changes.
    unproject_cache: RwLock<Option<Arc<UnprojectTable>>>,
}

impl CameraModel {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            unproject_cache: RwLock::new(None),
        }
    }

    /// Project a camera-space point onto the image plane (no rounding).
    #[inline]
    pub fn project(&self, p: &Vector3<f64>) -> Vector2<f64> {
        Vector2::new(
            self.fx * p.x / p.z + self.cx,
            self.fy * p.y / p.z + self.cy,
        )
    }

    /// Unproject a pixel to a ray with unit z component.
    #[inline]
    pub fn unproject(&self, u: f64, v: f64) -> Vector3<f64> {
        Vector3::new((u - self.cx) / self.fx, (v - self.cy) / self.fy, 1.0)
    }

    /// Full-image unprojection table for the given size.
    ///
    /// The table is cached; a request with a different size rebuilds it.
    pub fn unprojected_image_plane(&self, width: usize, height: usize) -> Arc<UnprojectTable> {
        {
            let cache = self.unproject_cache.read();
            if let Some(table) = cache.as_ref() {
                if table.width == width && table.height == height {
                    return table.clone();
                }
            }
        }

        let mut rays = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let r = self.unproject(x as f64, y as f64);
                rays.push((r.x, r.y));
            }
        }
        let table = Arc::new(UnprojectTable {
            width,
            height,
            rays,
        });
        *self.unproject_cache.write() = Some(table.clone());
        table
    }
}
