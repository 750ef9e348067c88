//! Synthetic tracking demo.
//!
//! Renders a moving cylindrical instrument with the software renderer,
//! turns each silhouette into a classification map (standing in for the
//! external pixel classifier) and lets the tracker re-estimate the pose
//! frame by frame.

use std::sync::Arc;

use anyhow::Result;
use nalgebra::{UnitQuaternion, Vector3};

use pwp3d::camera::CameraModel;
use pwp3d::config::TrackerConfig;
use pwp3d::geometry::Pose;
use pwp3d::image::ClassificationMap;
use pwp3d::model::InstrumentModel;
use pwp3d::render::{is_hit, CylinderRenderer, GeometryRenderer};
use pwp3d::system::TrackingContext;

const WIDTH: usize = 128;
const HEIGHT: usize = 128;
const NUM_FRAMES: usize = 12;

/// Stand-in classifier: confident foreground inside the true silhouette.
fn classify(
    model: &InstrumentModel,
    pose: &Pose,
    camera: &CameraModel,
) -> ClassificationMap {
    let buffers = CylinderRenderer.render(model, pose, camera, WIDTH, HEIGHT);
    let mut map = ClassificationMap::all_background(WIDTH, HEIGHT);
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            if is_hit(buffers.front_depth.get(x, y)) {
                map.set_probabilities(x, y, 0.05, 0.95);
            } else {
                map.set_probabilities(x, y, 0.95, 0.05);
            }
        }
    }
    map
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let camera = Arc::new(CameraModel::new(
        200.0,
        200.0,
        WIDTH as f64 / 2.0,
        HEIGHT as f64 / 2.0,
    ));
    let model = Arc::new(InstrumentModel::cylinder(1.0, 10.0));

    let config = TrackerConfig::default();
    let mut ctx = TrackingContext::new(camera.clone(), Box::new(CylinderRenderer), config);
    ctx.add_model(model.clone());

    println!("frame |   true x |  est x |  est y |   est z | steps");
    for i in 0..NUM_FRAMES {
        // Ground truth drifts sideways with a slow roll.
        let true_pose = Pose::new(
            Vector3::new(0.08 * i as f64, 0.0, 20.0),
            UnitQuaternion::from_euler_angles(0.0, 0.0, 0.02 * i as f64),
        );

        let classification = classify(&model, &true_pose, &camera);
        let result = ctx.run_frame(classification, true)?;

        let est = &result.objects[0].pose;
        println!(
            "{:5} | {:8.3} | {:6.3} | {:6.3} | {:7.3} | {:5}",
            i,
            true_pose.translation.x,
            est.translation.x,
            est.translation.y,
            est.translation.z,
            result.steps,
        );
    }

    ctx.shutdown();
    Ok(())
}
