//! Initial pose estimation from a classified frame.
//!
//! The foreground region's center of mass and moment-of-inertia tensor give
//! a 2D center and principal axis; unprojecting the axis endpoints and
//! matching the blob width against the instrument's known shaft radius
//! recovers depth and a full 3D seed pose.

use nalgebra::{Matrix2, UnitQuaternion, Vector2, Vector3};

use crate::camera::CameraModel;
use crate::geometry::Pose;
use crate::image::ClassificationMap;
use crate::model::InstrumentModel;

/// Fewer foreground pixels than this is treated as "no detection".
const MIN_REGION_PIXELS: usize = 50;

/// Estimate a seed pose for the instrument from the classified frame.
///
/// Returns `None` when the foreground region is too small or degenerate to
/// commit to a pose.
pub fn seed_pose(
    model: &InstrumentModel,
    classification: &ClassificationMap,
    camera: &CameraModel,
) -> Option<Pose> {
    let mut region: Vec<Vector2<f64>> = Vec::new();
    for y in 0..classification.height() {
        for x in 0..classification.width() {
            if classification.foreground(x, y) > classification.background(x, y) {
                region.push(Vector2::new(x as f64, y as f64));
            }
        }
    }
    if region.len() < MIN_REGION_PIXELS {
        return None;
    }
    let n = region.len() as f64;

    let com = region.iter().copied().sum::<Vector2<f64>>() / n;

    // Moment-of-inertia tensor about the center of mass.
    let mut moi = Matrix2::zeros();
    for p in &region {
        let d = p - com;
        let r_sq = d.x * d.x + d.y * d.y;
        moi[(0, 0)] += r_sq - d.x * d.x;
        moi[(1, 1)] += r_sq - d.y * d.y;
        moi[(0, 1)] -= d.x * d.y;
    }
    moi[(1, 0)] = moi[(0, 1)];

    let eigen = moi.symmetric_eigen();
    let (small, large) = if eigen.eigenvalues[0] <= eigen.eigenvalues[1] {
        (0, 1)
    } else {
        (1, 0)
    };
    // Elongation direction has the smallest moment of inertia.
    let central_axis: Vector2<f64> = eigen.eigenvectors.column(small).into_owned().normalize();
    let horizontal_axis: Vector2<f64> = eigen.eigenvectors.column(large).into_owned().normalize();

    let blob_radius = (2.0 * eigen.eigenvalues[small].abs() / n).sqrt();
    let blob_length_sq = 12.0 * eigen.eigenvalues[large].abs() / n - 3.0 * blob_radius * blob_radius;
    if blob_radius <= 0.0 || blob_length_sq <= 0.0 {
        return None;
    }
    let blob_length = blob_length_sq.sqrt();

    // Depth from the apparent width of the shaft.
    let top = com + blob_radius * horizontal_axis;
    let bottom = com - blob_radius * horizontal_axis;
    let width_ray = camera.unproject(top.x, top.y) - camera.unproject(bottom.x, bottom.y);
    let apparent_width = width_ray.norm();
    if apparent_width <= 1e-12 {
        return None;
    }
    let z = 2.0 * model.radius / apparent_width;

    let center_3d = z * camera.unproject(com.x, com.y);
    let tip = com + 0.5 * blob_length * central_axis;
    let axis_3d = z * camera.unproject(tip.x, tip.y) - center_3d;

    // Object-space shaft axis is +x; align it with the observed axis.
    let rotation = UnitQuaternion::rotation_between(&Vector3::x(), &axis_3d)
        .unwrap_or_else(|| UnitQuaternion::from_euler_angles(0.0, std::f64::consts::PI, 0.0));

    tracing::debug!(
        pixels = region.len(),
        z,
        blob_length,
        "seeded pose from classified region"
    );

    let mut pose = Pose::new(center_3d, rotation);
    // Articulated joints start at the rest configuration.
    pose.joints = vec![0.0; model.num_joints()];
    Some(pose)
}
