//! Analytic ray-cast renderer for the cylindrical instrument shaft.
//!
//! Stands in for the GPU rasterizer in the demo and in tests: every pixel
//! ray is intersected with the posed finite cylinder (wall plus end caps),
//! producing exact front/back depths.

use nalgebra::Vector3;

use crate::camera::CameraModel;
use crate::geometry::Pose;
use crate::image::Image;
use crate::model::InstrumentModel;

use super::{contour_from_mask, GeometryRenderer, RenderedBuffers, FAR};

/// Minimum accepted ray parameter; rejects intersections behind the camera.
const T_MIN: f64 = 1e-3;

pub struct CylinderRenderer;

impl GeometryRenderer for CylinderRenderer {
    fn render(
        &self,
        model: &InstrumentModel,
        pose: &Pose,
        camera: &CameraModel,
        width: usize,
        height: usize,
    ) -> RenderedBuffers {
        let mut front_depth = Image::filled(width, height, FAR);
        let mut back_depth = Image::filled(width, height, FAR);
        let mut mask = Image::<bool>::new(width, height);

        let rays = camera.unprojected_image_plane(width, height);
        let inv_rot = pose.rotation.inverse();
        // Camera origin and ray directions expressed in object space.
        let origin_obj = inv_rot * (-pose.translation);

        for y in 0..height {
            for x in 0..width {
                let dir_obj = inv_rot * rays.ray(x, y);
                if let Some((t_front, t_back)) =
                    intersect_cylinder(&origin_obj, &dir_obj, model.radius, model.height)
                {
                    // Rays carry unit z, so the parameter is the camera depth.
                    front_depth.set(x, y, t_front as f32);
                    back_depth.set(x, y, t_back as f32);
                    mask.set(x, y, true);
                }
            }
        }

        let contour = contour_from_mask(&mask);
        RenderedBuffers {
            front_depth,
            back_depth,
            contour,
        }
    }
}

/// Intersect a ray with the finite cylinder of radius `r` about the x axis,
/// spanning x in [-h/2, h/2]. Returns the (front, back) ray parameters.
fn intersect_cylinder(
    origin: &Vector3<f64>,
    dir: &Vector3<f64>,
    r: f64,
    h: f64,
) -> Option<(f64, f64)> {
    let half = h / 2.0;
    let mut t_front = f64::INFINITY;
    let mut t_back = f64::NEG_INFINITY;
    let mut any = false;
    let mut accept = |t: f64| {
        if t > T_MIN {
            t_front = t_front.min(t);
            t_back = t_back.max(t);
            any = true;
        }
    };

    // Wall: quadratic in the (y, z) components.
    let a = dir.y * dir.y + dir.z * dir.z;
    if a > 0.0 {
        let b = 2.0 * (origin.y * dir.y + origin.z * dir.z);
        let c = origin.y * origin.y + origin.z * origin.z - r * r;
        let disc = b * b - 4.0 * a * c;
        if disc >= 0.0 {
            let sq = disc.sqrt();
            for t in [(-b - sq) / (2.0 * a), (-b + sq) / (2.0 * a)] {
                let x = origin.x + t * dir.x;
                if x.abs() <= half {
                    accept(t);
                }
            }
        }
    }

    // End caps at x = ±h/2.
    if dir.x.abs() > 0.0 {
        for cap_x in [-half, half] {
            let t = (cap_x - origin.x) / dir.x;
            let y = origin.y + t * dir.y;
            let z = origin.z + t * dir.z;
            if y * y + z * z <= r * r {
                accept(t);
            }
        }
    }

    any.then_some((t_front, t_back))
}
