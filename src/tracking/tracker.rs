//! Tracker: owns the tracked instruments and drives their refiners.
//!
//! Callers feed classified frames with `run_step`, one refinement step per
//! call, until `needs_new_frame` reports the budget spent; the converged
//! poses then feed each object's temporal filter before the next frame.

use std::sync::Arc;

use anyhow::Result;

use crate::camera::CameraModel;
use crate::config::TrackerConfig;
use crate::error::ConfigError;
use crate::geometry::Pose;
use crate::model::InstrumentModel;
use crate::render::RenderHandle;
use crate::tracking::frame::Frame;
use crate::tracking::init;
use crate::tracking::optimizer::{PwpRefiner, StepOutcome, StepStats};
use crate::tracking::state::RefineState;
use crate::tracking::temporal::TemporalPoseState;

/// One instrument under track: model, temporal state and its refiner.
struct TrackedInstrument {
    model: Arc<InstrumentModel>,
    temporal: TemporalPoseState,
    refiner: PwpRefiner,
}

/// Per-object outcome of one `run_step` call.
#[derive(Debug, Clone)]
pub struct ObjectStatus {
    pub pose: Pose,
    pub state: RefineState,
    pub stats: Option<StepStats>,
}

/// Outcome of one `run_step` call across all tracked objects.
#[derive(Debug, Clone)]
pub struct TrackStepResult {
    pub objects: Vec<ObjectStatus>,
    pub frame_index: u64,
}

/// Level-set tracker over independent instrument instances.
pub struct Tracker {
    camera: Arc<CameraModel>,
    config: TrackerConfig,
    render: RenderHandle,
    tracked: Vec<TrackedInstrument>,
    /// ROI size locked in by the first frame.
    roi: Option<(usize, usize)>,
}

impl Tracker {
    pub fn new(camera: Arc<CameraModel>, config: TrackerConfig, render: RenderHandle) -> Self {
        Self {
            camera,
            config,
            render,
            tracked: Vec::new(),
            roi: None,
        }
    }

    /// Register an instrument to track. Its pose is seeded from the first
    /// detected frame.
    pub fn add_model(&mut self, model: Arc<InstrumentModel>) {
        let refiner = PwpRefiner::new(
            self.config.clone(),
            self.render.clone(),
            self.camera.clone(),
        );
        self.tracked.push(TrackedInstrument {
            model,
            temporal: TemporalPoseState::unseeded(),
            refiner,
        });
    }

    /// True when every object has spent its step budget on the current
    /// frame (or nothing is being tracked).
    pub fn needs_new_frame(&self) -> bool {
        self.tracked.iter().all(|t| t.refiner.needs_new_frame())
    }

    /// Currently tracked models and their poses.
    pub fn tracked_models(&self) -> Vec<(Arc<InstrumentModel>, Pose)> {
        self.tracked
            .iter()
            .map(|t| (t.model.clone(), t.temporal.pose().clone()))
            .collect()
    }

    /// Run one refinement step on every active object.
    ///
    /// `found` carries the external detector's verdict for this frame; a
    /// `false` drops all temporal state and waits for re-acquisition.
    pub fn run_step(&mut self, frame: &Frame, found: bool) -> Result<TrackStepResult> {
        self.check_roi(frame)?;

        if !found {
            for t in &mut self.tracked {
                if t.temporal.is_active() {
                    tracing::info!("detection lost, entering re-acquisition");
                }
                t.temporal.mark_lost();
                t.refiner.reset();
            }
            return Ok(self.snapshot(frame, Vec::new()));
        }

        // A fresh frame: predict forward and restart budgets, seeding any
        // object that is waiting for a detection.
        if self.needs_new_frame() {
            self.begin_frame(frame);
        }

        let mut stats: Vec<Option<StepStats>> = Vec::with_capacity(self.tracked.len());
        for t in &mut self.tracked {
            if !t.temporal.is_active() || t.refiner.needs_new_frame() {
                stats.push(None);
                continue;
            }
            let outcome = t
                .refiner
                .step(&t.model, t.temporal.pose_mut(), &frame.classification)?;
            match outcome {
                StepOutcome::Lost => {
                    t.temporal.mark_lost();
                    stats.push(None);
                }
                StepOutcome::NeedsNewFrame(s) => {
                    // Budget spent: the refined pose is this frame's
                    // observation for the temporal filter.
                    let converged = t.temporal.pose().clone();
                    t.temporal.correct(converged);
                    t.temporal.set_state(RefineState::NeedsNewFrame);
                    stats.push(Some(s));
                }
                StepOutcome::Refining(s) => stats.push(Some(s)),
            }
        }

        Ok(self.snapshot(frame, stats))
    }

    fn begin_frame(&mut self, frame: &Frame) {
        let camera = self.camera.clone();
        for t in &mut self.tracked {
            if t.temporal.is_active() {
                t.temporal.predict();
                t.refiner.begin_frame();
            } else if let Some(pose) = init::seed_pose(&t.model, &frame.classification, &camera) {
                tracing::info!(frame = frame.frame_index, "seeding new track");
                t.temporal.seed(pose);
                t.refiner.begin_frame();
            }
        }
    }

    fn check_roi(&mut self, frame: &Frame) -> Result<(), ConfigError> {
        match self.roi {
            None => {
                self.roi = Some((frame.width(), frame.height()));
                Ok(())
            }
            Some((w, h)) if w == frame.width() && h == frame.height() => Ok(()),
            Some((w, h)) => Err(ConfigError::SizeMismatch {
                expected_w: w,
                expected_h: h,
                actual_w: frame.width(),
                actual_h: frame.height(),
            }),
        }
    }

    fn snapshot(&self, frame: &Frame, mut stats: Vec<Option<StepStats>>) -> TrackStepResult {
        stats.resize(self.tracked.len(), None);
        let objects = self
            .tracked
            .iter()
            .zip(stats)
            .map(|(t, s)| ObjectStatus {
                pose: t.temporal.pose().clone(),
                state: t.temporal.state(),
                stats: s,
            })
            .collect();
        TrackStepResult {
            objects,
            frame_index: frame.frame_index,
        }
    }
}
