//! Per-DOF gradient accumulation over the contour band.
//!
//! For every pixel where the smoothed Dirac of the SDF is non-zero, the
//! model's 3D point derivatives at the front and back intersection points
//! are pushed through the pinhole projection chain rule, weighted by the
//! numeric SDF gradient, the Dirac value and the region agreement, and
//! summed per DOF. The result is the gradient of the frame's negative
//! log-likelihood with respect to the pose parameters; the refiner descends
//! it.

use nalgebra::Vector3;

use crate::camera::CameraModel;
use crate::error::ConfigError;
use crate::geometry::{Pose, MAX_DOFS};
use crate::image::ClassificationMap;
use crate::model::InstrumentModel;
use crate::tracking::energy::{dirac, heaviside, region_agreement};
use crate::tracking::sdf::SdfField;

/// Reject intersection points closer than this to the image plane; the
/// projection chain rule divides by z².
const MIN_Z: f64 = 1e-6;

/// Accumulated per-DOF gradient for one refinement step.
#[derive(Debug, Clone)]
pub struct Gradient {
    values: Vec<f64>,
    /// Number of band pixels that contributed.
    pub band_pixels: usize,
}

impl Gradient {
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn norm(&self) -> f64 {
        self.values.iter().map(|g| g * g).sum::<f64>().sqrt()
    }
}

/// Accumulate the pose gradient over all contour-band pixels.
///
/// The SDF field and classification map must both match the frame ROI and
/// be derived from the *current* candidate pose; nothing is cached between
/// steps.
pub fn accumulate(
    model: &InstrumentModel,
    pose: &Pose,
    camera: &CameraModel,
    field: &SdfField,
    classification: &ClassificationMap,
    heaviside_width: f32,
) -> Result<Gradient, ConfigError> {
    let num_dofs = model.num_dofs();
    if num_dofs > MAX_DOFS {
        return Err(ConfigError::TooManyDofs {
            dofs: num_dofs,
            max: MAX_DOFS,
        });
    }

    let mut values = vec![0.0f64; num_dofs];
    let mut band_pixels = 0usize;

    for (x, y, s) in field.sdf.iter_pixels() {
        let delta = dirac(s, heaviside_width);
        if delta == 0.0 {
            continue;
        }

        let h = heaviside(s, heaviside_width);
        let agreement = region_agreement(
            classification.foreground(x, y),
            classification.background(x, y),
            h,
        ) as f64;

        let (dsdf_dx, dsdf_dy) = field.gradient(x, y);

        // Band pixels outside the silhouette have no intersection of their
        // own; borrow the nearest inside pixel's.
        let points = match (field.front_point(x, y), field.back_point(x, y)) {
            (Some(f), Some(b)) => Some((f, b)),
            _ => field.closest_inside(x, y).and_then(|(ix, iy)| {
                match (field.front_point(ix, iy), field.back_point(ix, iy)) {
                    (Some(f), Some(b)) => Some((f, b)),
                    _ => None,
                }
            }),
        };
        let Some((front, back)) = points else {
            continue;
        };
        if front.z.abs() < MIN_Z || back.z.abs() < MIN_Z {
            continue;
        }

        band_pixels += 1;
        accumulate_pixel(
            model,
            pose,
            camera,
            &front,
            &back,
            s,
            dsdf_dx as f64,
            dsdf_dy as f64,
            delta as f64,
            agreement,
            &mut values,
        )?;
    }

    Ok(Gradient {
        values,
        band_pixels,
    })
}

#[allow(clippy::too_many_arguments)]
fn accumulate_pixel(
    model: &InstrumentModel,
    pose: &Pose,
    camera: &CameraModel,
    front: &Vector3<f64>,
    back: &Vector3<f64>,
    sdf: f32,
    dsdf_dx: f64,
    dsdf_dy: f64,
    delta: f64,
    agreement: f64,
    values: &mut [f64],
) -> Result<(), ConfigError> {
    let z_inv_sq_front = 1.0 / (front.z * front.z);
    let z_inv_sq_back = 1.0 / (back.z * back.z);

    let front_jacs = model.compute_jacobians(pose, front)?;
    let back_jacs = model.compute_jacobians(pose, back)?;

    for (dof, value) in values.iter_mut().enumerate() {
        let df = &front_jacs[dof];

        let (deriv_x, deriv_y) = if sdf == 0.0 {
            // Exactly on the contour only the front surface is visible.
            let dx = dsdf_dx * camera.fx * z_inv_sq_front * (front.z * df.x - front.x * df.z);
            let dy = dsdf_dy * camera.fy * z_inv_sq_front * (front.z * df.y - front.y * df.z);
            (dx, dy)
        } else {
            let db = &back_jacs[dof];
            let dx = dsdf_dx
                * (camera.fx * z_inv_sq_front * (front.z * df.x - front.x * df.z)
                    + camera.fx * z_inv_sq_back * (back.z * db.x - back.x * db.z));
            let dy = dsdf_dy
                * (camera.fy * z_inv_sq_front * (front.z * df.y - front.y * df.z)
                    + camera.fy * z_inv_sq_back * (back.z * db.y - back.y * db.z));
            (dx, dy)
        };

        *value += agreement * delta * (deriv_x + deriv_y);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{CylinderRenderer, GeometryRenderer};
    use crate::tracking::sdf::SdfField;
    use nalgebra::UnitQuaternion;

    const W: f32 = 3.0;
    const SIZE: usize = 96;

    fn scene() -> (InstrumentModel, CameraModel) {
        (
            InstrumentModel::cylinder(1.0, 10.0),
            CameraModel::new(150.0, 150.0, SIZE as f64 / 2.0, SIZE as f64 / 2.0),
        )
    }

    fn pose_at(tx: f64) -> Pose {
        Pose::new(Vector3::new(tx, 0.0, 20.0), UnitQuaternion::identity())
    }

    /// Classification map that labels the silhouette of `pose` as foreground.
    fn classify(model: &InstrumentModel, pose: &Pose, camera: &CameraModel) -> ClassificationMap {
        let buffers = CylinderRenderer.render(model, pose, camera, SIZE, SIZE);
        let mut map = ClassificationMap::all_background(SIZE, SIZE);
        for y in 0..SIZE {
            for x in 0..SIZE {
                if crate::render::is_hit(buffers.front_depth.get(x, y)) {
                    map.set_probabilities(x, y, 0.05, 0.95);
                } else {
                    map.set_probabilities(x, y, 0.95, 0.05);
                }
            }
        }
        map
    }

    fn gradient_at(candidate: &Pose, target: &Pose) -> Gradient {
        let (model, camera) = scene();
        let classification = classify(&model, target, &camera);
        let buffers = CylinderRenderer.render(&model, candidate, &camera, SIZE, SIZE);
        let field = SdfField::build(&buffers, &camera);
        accumulate(&model, candidate, &camera, &field, &classification, W).unwrap()
    }

    #[test]
    fn test_gradient_covers_band_pixels_only() {
        let pose = pose_at(0.0);
        let grad = gradient_at(&pose, &pose);
        assert!(grad.band_pixels > 0);
        assert!(grad.band_pixels < SIZE * SIZE / 2);
        assert_eq!(grad.values().len(), 6);
    }

    /// Descending the gradient must move the candidate toward the target:
    /// when the target silhouette sits at +x of the candidate, the
    /// translation-x component must be negative.
    #[test]
    fn test_translation_gradient_points_downhill() {
        let candidate = pose_at(0.0);
        let target = pose_at(0.8);
        let grad = gradient_at(&candidate, &target);
        assert!(
            grad.values()[0] < 0.0,
            "expected negative tx gradient, got {}",
            grad.values()[0]
        );
    }

    #[test]
    fn test_gradient_near_zero_at_correct_pose() {
        let pose = pose_at(0.0);
        let aligned = gradient_at(&pose, &pose);
        let misaligned = gradient_at(&pose, &pose_at(0.8));
        assert!(aligned.values()[0].abs() < misaligned.values()[0].abs());
    }

    #[test]
    fn test_accumulate_is_deterministic() {
        let candidate = pose_at(0.0);
        let target = pose_at(0.5);
        let a = gradient_at(&candidate, &target);
        let b = gradient_at(&candidate, &target);
        assert_eq!(a.values(), b.values());
        assert_eq!(a.band_pixels, b.band_pixels);
    }
}
