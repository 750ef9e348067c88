//! Fixed-budget gradient refinement of one object's pose.
//!
//! Each step renders the candidate pose, rebuilds the SDF and energy fields,
//! accumulates the pose gradient and applies one scaled descent step. The
//! loop terminates on a fixed step budget rather than a gradient threshold,
//! trading precision for bounded per-frame latency.

use std::sync::Arc;

use anyhow::Result;

use crate::camera::CameraModel;
use crate::config::TrackerConfig;
use crate::geometry::Pose;
use crate::image::ClassificationMap;
use crate::model::InstrumentModel;
use crate::render::RenderHandle;
use crate::tracking::energy::{compute_areas, total_error};
use crate::tracking::jacobian;
use crate::tracking::sdf::SdfField;
use crate::tracking::state::RefineState;

/// Diagnostics from one refinement step.
#[derive(Debug, Clone)]
pub struct StepStats {
    /// Negative log-likelihood of the frame under the stepped-from pose.
    pub energy: f64,
    /// Soft foreground area of the rendered silhouette.
    pub foreground_area: f64,
    /// Pixels inside the contour band.
    pub contour_area: usize,
    /// Band pixels that contributed to the gradient.
    pub band_pixels: usize,
    /// Euclidean norm of the accumulated gradient.
    pub gradient_norm: f64,
}

/// Result of one call to [`PwpRefiner::step`].
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// Step applied; more steps remain in the budget.
    Refining(StepStats),
    /// Step applied and the budget is now exhausted; the pose is taken as
    /// converged for this frame.
    NeedsNewFrame(StepStats),
    /// Silhouette or contour band collapsed; the track is lost.
    Lost,
}

/// Level-set pose refiner for a single tracked object.
pub struct PwpRefiner {
    config: TrackerConfig,
    render: RenderHandle,
    camera: Arc<CameraModel>,
    step: usize,
    state: RefineState,
}

impl PwpRefiner {
    /// Create a refiner that starts with its budget exhausted so the first
    /// question it answers is "give me a frame".
    pub fn new(config: TrackerConfig, render: RenderHandle, camera: Arc<CameraModel>) -> Self {
        let step = config.num_steps;
        Self {
            config,
            render,
            camera,
            step,
            state: RefineState::Idle,
        }
    }

    /// True once the step budget for the current frame is spent.
    pub fn needs_new_frame(&self) -> bool {
        self.step >= self.config.num_steps
    }

    pub fn state(&self) -> RefineState {
        self.state
    }

    /// Reset the step counter for a new frame.
    pub fn begin_frame(&mut self) {
        self.step = 0;
        self.state = RefineState::Refining;
    }

    /// Mark the refiner idle until a detection reseeds the pose.
    pub fn reset(&mut self) {
        self.step = self.config.num_steps;
        self.state = RefineState::Idle;
    }

    /// Run one refinement step, mutating `pose` in place.
    ///
    /// The render, SDF, energy and gradient are all rebuilt from the current
    /// candidate pose; nothing carries over from the previous step.
    pub fn step(
        &mut self,
        model: &InstrumentModel,
        pose: &mut Pose,
        classification: &ClassificationMap,
    ) -> Result<StepOutcome> {
        debug_assert!(self.step < self.config.num_steps, "step budget exhausted");

        let width = classification.width();
        let height = classification.height();

        // The one blocking call per step: wait for the rasterizer.
        let buffers = self.render.render(model, pose, width, height)?;
        let field = SdfField::build(&buffers, &self.camera);

        let w = self.config.heaviside_width;
        let areas = compute_areas(&field.sdf, w);
        if field.contour_pixels == 0
            || areas.contour < self.config.min_contour_area
            || areas.foreground < self.config.min_foreground_area
        {
            tracing::warn!(
                contour_pixels = field.contour_pixels,
                contour_area = areas.contour,
                foreground_area = areas.foreground,
                "silhouette degenerated, flagging track as lost"
            );
            self.state = RefineState::Lost;
            self.step = self.config.num_steps;
            return Ok(StepOutcome::Lost);
        }

        let gradient = jacobian::accumulate(model, pose, &self.camera, &field, classification, w)?;

        // Mean over the band keeps the step magnitude independent of the
        // ROI size and silhouette perimeter.
        let band = gradient.band_pixels.max(1) as f64;
        let mut deltas = vec![0.0f64; model.num_dofs()];
        for (dof, delta) in deltas.iter_mut().enumerate() {
            let scale = if dof < 3 {
                self.config.translation_step
            } else {
                self.config.rotation_step
            };
            *delta = -scale * gradient.values()[dof] / band;
        }
        pose.apply_step(&deltas);

        let stats = StepStats {
            energy: total_error(&field.sdf, classification, w),
            foreground_area: areas.foreground,
            contour_area: areas.contour,
            band_pixels: gradient.band_pixels,
            gradient_norm: gradient.norm(),
        };

        self.step += 1;
        if self.step >= self.config.num_steps {
            tracing::debug!(
                steps = self.step,
                energy = stats.energy,
                "step budget exhausted for this frame"
            );
            self.state = RefineState::NeedsNewFrame;
            Ok(StepOutcome::NeedsNewFrame(stats))
        } else {
            Ok(StepOutcome::Refining(stats))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{CylinderRenderer, GeometryRenderer, RenderService};
    use crate::tracking::sdf::SdfField;
    use nalgebra::{UnitQuaternion, Vector3};

    const SIZE: usize = 96;

    fn setup() -> (InstrumentModel, Arc<CameraModel>, RenderService) {
        let model = InstrumentModel::cylinder(1.0, 10.0);
        let camera = Arc::new(CameraModel::new(
            150.0,
            150.0,
            SIZE as f64 / 2.0,
            SIZE as f64 / 2.0,
        ));
        let service = RenderService::spawn(Box::new(CylinderRenderer), camera.clone());
        (model, camera, service)
    }

    fn pose_at(tx: f64, tz: f64) -> Pose {
        Pose::new(Vector3::new(tx, 0.0, tz), UnitQuaternion::identity())
    }

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

    #[test]
    fn test_refiner_starts_asking_for_a_frame() {
        let (_, camera, service) = setup();
        let refiner = PwpRefiner::new(TrackerConfig::default(), service.handle(), camera);
        assert!(refiner.needs_new_frame());
        assert_eq!(refiner.state(), RefineState::Idle);
    }

    #[test]
    fn test_step_budget_is_never_exceeded() {
        let (model, camera, service) = setup();
        let config = TrackerConfig {
            num_steps: 5,
            ..TrackerConfig::default()
        };
        let mut refiner = PwpRefiner::new(config, service.handle(), camera.clone());
        let target = pose_at(0.0, 20.0);
        let classification = classify(&model, &target, &camera);

        let mut pose = pose_at(0.3, 20.0);
        refiner.begin_frame();
        let mut steps = 0;
        while !refiner.needs_new_frame() {
            let outcome = refiner.step(&model, &mut pose, &classification).unwrap();
            steps += 1;
            assert!(steps <= 5, "refiner exceeded its step budget");
            if steps == 5 {
                assert!(matches!(outcome, StepOutcome::NeedsNewFrame(_)));
            } else {
                assert!(matches!(outcome, StepOutcome::Refining(_)));
            }
        }
        assert_eq!(steps, 5);
        assert_eq!(refiner.state(), RefineState::NeedsNewFrame);
    }

    #[test]
    fn test_refinement_reduces_energy() {
        let (model, camera, service) = setup();
        let config = TrackerConfig {
            num_steps: 20,
            ..TrackerConfig::default()
        };
        let mut refiner = PwpRefiner::new(config, service.handle(), camera.clone());
        let target = pose_at(0.0, 20.0);
        let classification = classify(&model, &target, &camera);

        let mut pose = pose_at(0.4, 20.0);
        refiner.begin_frame();
        let mut first_energy = None;
        let mut last_energy = 0.0;
        while !refiner.needs_new_frame() {
            match refiner.step(&model, &mut pose, &classification).unwrap() {
                StepOutcome::Refining(stats) | StepOutcome::NeedsNewFrame(stats) => {
                    first_energy.get_or_insert(stats.energy);
                    last_energy = stats.energy;
                }
                StepOutcome::Lost => panic!("track lost on a healthy scene"),
            }
        }
        assert!(
            last_energy < first_energy.unwrap(),
            "energy did not decrease: {} -> {}",
            first_energy.unwrap(),
            last_energy
        );
        // The pose should have moved toward the target along x.
        assert!(pose.translation.x.abs() < 0.4);
    }

    #[test]
    fn test_offscreen_pose_reports_lost_not_nan() {
        let (model, camera, service) = setup();
        let mut refiner =
            PwpRefiner::new(TrackerConfig::default(), service.handle(), camera.clone());
        let classification = classify(&model, &pose_at(0.0, 20.0), &camera);

        // Behind the camera: nothing renders.
        let mut pose = pose_at(0.0, -20.0);
        refiner.begin_frame();
        let outcome = refiner.step(&model, &mut pose, &classification).unwrap();
        assert!(matches!(outcome, StepOutcome::Lost));
        assert_eq!(refiner.state(), RefineState::Lost);
        assert!(refiner.needs_new_frame());
        assert!(pose.translation.iter().all(|t| t.is_finite()));
    }

    /// Re-rendering and re-scoring the same pose twice must be bit-identical.
    #[test]
    fn test_scoring_same_pose_is_idempotent() {
        let (model, camera, _service) = setup();
        let pose = pose_at(0.2, 20.0);
        let classification = classify(&model, &pose_at(0.0, 20.0), &camera);

        let score = || {
            let buffers = CylinderRenderer.render(&model, &pose, &camera, SIZE, SIZE);
            let field = SdfField::build(&buffers, &camera);
            let grad =
                jacobian::accumulate(&model, &pose, &camera, &field, &classification, 3.0).unwrap();
            (field.sdf, grad.values().to_vec())
        };

        let (sdf_a, grad_a) = score();
        let (sdf_b, grad_b) = score();
        assert_eq!(sdf_a, sdf_b);
        assert_eq!(grad_a, grad_b);
    }
}
