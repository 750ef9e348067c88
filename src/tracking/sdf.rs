//! Signed distance field and intersection images for a candidate pose.
//!
//! The rendered contour buffer is turned into an exact Euclidean distance
//! transform (Felzenszwalb-Huttenlocher, two 1-D passes over squared
//! distances), signed positive inside the silhouette. The depth buffers are
//! lifted to per-pixel 3D intersection points via the camera's cached
//! unprojection table.

use nalgebra::Vector3;

use crate::camera::CameraModel;
use crate::image::Image;
use crate::render::{is_hit, RenderedBuffers, FAR};

/// Stand-in for infinity inside the distance transform; keeps the parabola
/// intersection arithmetic finite.
const DT_LARGE: f32 = 1e12;

/// Per-pixel camera-space intersection point, `[FAR; 3]` where the ray
/// misses the model.
pub type IntersectionPoint = [f32; 3];

/// SDF plus front/back intersection images for one candidate pose.
pub struct SdfField {
    /// Signed distance in pixels: positive inside the silhouette, negative
    /// outside, zero on the contour.
    pub sdf: Image<f32>,
    pub front_intersections: Image<IntersectionPoint>,
    pub back_intersections: Image<IntersectionPoint>,
    /// Number of contour pixels in the render; zero means the silhouette is
    /// degenerate (pose off-screen) and the field is all-negative.
    pub contour_pixels: usize,
}

impl SdfField {
    /// Build the field from one render pass.
    pub fn build(buffers: &RenderedBuffers, camera: &CameraModel) -> Self {
        let width = buffers.front_depth.width();
        let height = buffers.front_depth.height();
        let rays = camera.unprojected_image_plane(width, height);

        let far_point: IntersectionPoint = [FAR, FAR, FAR];
        let mut front_intersections = Image::filled(width, height, far_point);
        let mut back_intersections = Image::filled(width, height, far_point);

        for y in 0..height {
            for x in 0..width {
                let ray = rays.ray(x, y);
                let fd = buffers.front_depth.get(x, y);
                if is_hit(fd) {
                    let p = fd as f64 * ray;
                    front_intersections.set(x, y, [p.x as f32, p.y as f32, p.z as f32]);
                }
                let bd = buffers.back_depth.get(x, y);
                if is_hit(bd) {
                    let p = bd as f64 * ray;
                    back_intersections.set(x, y, [p.x as f32, p.y as f32, p.z as f32]);
                }
            }
        }

        let (mut sdf, contour_pixels) = distance_transform(&buffers.contour);

        // Flip the sign for pixels outside the silhouette.
        for y in 0..height {
            for x in 0..width {
                if !is_hit(buffers.front_depth.get(x, y)) {
                    sdf.set(x, y, -sdf.get(x, y));
                }
            }
        }

        Self {
            sdf,
            front_intersections,
            back_intersections,
            contour_pixels,
        }
    }

    /// Nearest pixel inside the silhouette, for band pixels whose own ray
    /// misses the model. Searches square rings outward from the distance the
    /// SDF already promises.
    pub fn closest_inside(&self, x: usize, y: usize) -> Option<(usize, usize)> {
        let base = self.sdf.get(x, y).abs().ceil() as i64;
        // One extra ring covers diagonal rounding of the Euclidean distance.
        for radius in base..=base + 1 {
            if let Some(found) = self.search_ring(x as i64, y as i64, radius) {
                return Some(found);
            }
        }
        None
    }

    fn search_ring(&self, cx: i64, cy: i64, radius: i64) -> Option<(usize, usize)> {
        let mut check = |px: i64, py: i64| -> Option<(usize, usize)> {
            if self.sdf.contains(px, py) && self.sdf.get(px as usize, py as usize) >= 0.0 {
                Some((px as usize, py as usize))
            } else {
                None
            }
        };
        for dx in -radius..=radius {
            if let Some(p) = check(cx + dx, cy - radius) {
                return Some(p);
            }
            if let Some(p) = check(cx + dx, cy + radius) {
                return Some(p);
            }
        }
        for dy in -radius..=radius {
            if let Some(p) = check(cx - radius, cy + dy) {
                return Some(p);
            }
            if let Some(p) = check(cx + radius, cy + dy) {
                return Some(p);
            }
        }
        None
    }

    /// Finite-difference SDF gradient at `(x, y)` (central where possible).
    pub fn gradient(&self, x: usize, y: usize) -> (f32, f32) {
        let w = self.sdf.width();
        let h = self.sdf.height();
        let (x0, x1) = (x.saturating_sub(1), (x + 1).min(w - 1));
        let (y0, y1) = (y.saturating_sub(1), (y + 1).min(h - 1));
        let dx = (self.sdf.get(x1, y) - self.sdf.get(x0, y)) / (x1 - x0).max(1) as f32;
        let dy = (self.sdf.get(x, y1) - self.sdf.get(x, y0)) / (y1 - y0).max(1) as f32;
        (dx, dy)
    }

    /// Front intersection point as a vector, if the ray hits.
    pub fn front_point(&self, x: usize, y: usize) -> Option<Vector3<f64>> {
        point_of(self.front_intersections.get(x, y))
    }

    /// Back intersection point as a vector, if the ray hits.
    pub fn back_point(&self, x: usize, y: usize) -> Option<Vector3<f64>> {
        point_of(self.back_intersections.get(x, y))
    }
}

fn point_of(p: IntersectionPoint) -> Option<Vector3<f64>> {
    if is_hit(p[2]) {
        Some(Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64))
    } else {
        None
    }
}

/// Unsigned exact Euclidean distance (in pixels) to the nearest contour
/// pixel, clamped at [`FAR`]. Also returns the contour pixel count.
fn distance_transform(contour: &Image<u8>) -> (Image<f32>, usize) {
    let width = contour.width();
    let height = contour.height();
    let mut contour_pixels = 0;

    // Squared distances, column pass then row pass.
    let mut sq = vec![0.0f32; width * height];
    for y in 0..height {
        for x in 0..width {
            let on = contour.get(x, y) != 0;
            if on {
                contour_pixels += 1;
            }
            sq[y * width + x] = if on { 0.0 } else { DT_LARGE };
        }
    }

    let mut column = vec![0.0f32; height];
    let mut out_col = vec![0.0f32; height];
    for x in 0..width {
        for y in 0..height {
            column[y] = sq[y * width + x];
        }
        dt_1d(&column, &mut out_col);
        for y in 0..height {
            sq[y * width + x] = out_col[y];
        }
    }

    let mut out_row = vec![0.0f32; width];
    let mut dist = Image::<f32>::new(width, height);
    for y in 0..height {
        let row = &sq[y * width..(y + 1) * width];
        dt_1d(row, &mut out_row);
        for x in 0..width {
            dist.set(x, y, out_row[x].sqrt().min(FAR));
        }
    }

    (dist, contour_pixels)
}

/// 1-D squared distance transform via the lower envelope of parabolas.
fn dt_1d(f: &[f32], d: &mut [f32]) {
    let n = f.len();
    if n == 1 {
        d[0] = f[0];
        return;
    }

    let mut v = vec![0usize; n];
    let mut z = vec![0.0f32; n + 1];
    let mut k = 0usize;
    z[0] = f32::NEG_INFINITY;
    z[1] = f32::INFINITY;

    for q in 1..n {
        let mut s = intersect(f, q, v[k]);
        while k > 0 && s <= z[k] {
            k -= 1;
            s = intersect(f, q, v[k]);
        }
        k += 1;
        v[k] = q;
        z[k] = s;
        z[k + 1] = f32::INFINITY;
    }

    k = 0;
    for q in 0..n {
        while z[k + 1] < q as f32 {
            k += 1;
        }
        let dq = q as f32 - v[k] as f32;
        d[q] = dq * dq + f[v[k]];
    }
}

/// Horizontal position where the parabolas rooted at `q` and `p` intersect.
#[inline]
fn intersect(f: &[f32], q: usize, p: usize) -> f32 {
    let (qf, pf) = (q as f32, p as f32);
    ((f[q] + qf * qf) - (f[p] + pf * pf)) / (2.0 * qf - 2.0 * pf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::contour_from_mask;
    use approx::assert_relative_eq;

    /// Render-like buffers for a filled disk of the given radius.
    fn disk_buffers(width: usize, height: usize, radius: f64) -> RenderedBuffers {
        let (cx, cy) = (width as f64 / 2.0, height as f64 / 2.0);
        let mut front = Image::filled(width, height, FAR);
        let mut back = Image::filled(width, height, FAR);
        let mut mask = Image::<bool>::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let dx = x as f64 - cx;
                let dy = y as f64 - cy;
                if (dx * dx + dy * dy).sqrt() <= radius {
                    front.set(x, y, 50.0);
                    back.set(x, y, 52.0);
                    mask.set(x, y, true);
                }
            }
        }
        RenderedBuffers {
            front_depth: front,
            back_depth: back,
            contour: contour_from_mask(&mask),
        }
    }

    fn test_camera() -> CameraModel {
        CameraModel::new(500.0, 500.0, 50.0, 50.0)
    }

    #[test]
    fn test_dt_1d_single_feature() {
        let f = vec![DT_LARGE, DT_LARGE, 0.0, DT_LARGE, DT_LARGE];
        let mut d = vec![0.0; 5];
        dt_1d(&f, &mut d);
        assert_eq!(d, vec![4.0, 1.0, 0.0, 1.0, 4.0]);
    }

    #[test]
    fn test_disk_sdf_signs_and_magnitudes() {
        let buffers = disk_buffers(100, 100, 20.0);
        let field = SdfField::build(&buffers, &test_camera());

        // Center is inside, roughly one radius from the contour.
        let center = field.sdf.get(50, 50);
        assert!(center > 0.0);
        assert_relative_eq!(center, 20.0, epsilon = 1.5);

        // 30 px from the center is outside, roughly 10 px beyond the rim.
        let outside = field.sdf.get(80, 50);
        assert!(outside < 0.0);
        assert_relative_eq!(outside, -10.0, epsilon = 1.5);
    }

    #[test]
    fn test_sdf_sign_matches_silhouette_and_boundary_is_small() {
        let buffers = disk_buffers(100, 100, 20.0);
        let field = SdfField::build(&buffers, &test_camera());

        for (x, y, s) in field.sdf.iter_pixels() {
            let inside = is_hit(buffers.front_depth.get(x, y));
            if s > 0.0 {
                assert!(inside, "positive SDF outside silhouette at ({x},{y})");
            }
            if buffers.contour.get(x, y) != 0 {
                assert!(s.abs() < 1.0, "contour pixel with |sdf| = {}", s.abs());
            }
        }
    }

    #[test]
    fn test_intersection_points_lie_on_rays() {
        let buffers = disk_buffers(100, 100, 20.0);
        let camera = test_camera();
        let field = SdfField::build(&buffers, &camera);

        let p = field.front_point(50, 50).expect("center ray must hit");
        assert_relative_eq!(p.z, 50.0, epsilon = 1e-4);
        let expected = 50.0 * camera.unproject(50.0, 50.0);
        assert_relative_eq!(p, expected, epsilon = 1e-4);

        assert!(field.front_point(0, 0).is_none());
    }

    #[test]
    fn test_empty_silhouette_yields_all_negative_field() {
        let mut empty = disk_buffers(50, 50, 20.0);
        empty.front_depth = Image::filled(50, 50, FAR);
        empty.back_depth = Image::filled(50, 50, FAR);
        empty.contour = Image::new(50, 50);

        let field = SdfField::build(&empty, &test_camera());
        assert_eq!(field.contour_pixels, 0);
        assert!(field.sdf.as_slice().iter().all(|&s| s <= 0.0));
        assert!(field.sdf.as_slice().iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_closest_inside_finds_rim_pixel() {
        let buffers = disk_buffers(100, 100, 20.0);
        let field = SdfField::build(&buffers, &test_camera());

        // A pixel 2 px outside the rim borrows a nearby inside pixel.
        let (ix, iy) = field.closest_inside(72, 50).expect("rim should be near");
        assert!(field.sdf.get(ix, iy) >= 0.0);
        let dist = (((ix as f64 - 72.0).powi(2)) + ((iy as f64 - 50.0).powi(2))).sqrt();
        assert!(dist <= 4.0);
    }

    #[test]
    fn test_build_is_deterministic() {
        let buffers = disk_buffers(64, 64, 12.0);
        let camera = test_camera();
        let a = SdfField::build(&buffers, &camera);
        let b = SdfField::build(&buffers, &camera);
        assert_eq!(a.sdf, b.sdf);
        assert_eq!(a.front_intersections, b.front_intersections);
    }
}
