//! Top-level context owning the tracking pipeline for one camera.
//!
//! An explicit object with clear init/teardown boundaries: it owns the
//! camera model, the render service thread and the tracker, and is passed
//! to whatever drives frames through the system.

use std::sync::Arc;

use anyhow::Result;

use crate::camera::CameraModel;
use crate::config::TrackerConfig;
use crate::image::ClassificationMap;
use crate::model::InstrumentModel;
use crate::render::{GeometryRenderer, RenderService};
use crate::tracking::{Frame, ObjectStatus, Tracker};

/// Converged result for one fully refined frame.
#[derive(Debug, Clone)]
pub struct FrameResult {
    pub objects: Vec<ObjectStatus>,
    pub frame_index: u64,
    /// Refinement steps actually run on this frame.
    pub steps: usize,
}

/// Owns the tracking pipeline for one camera feed.
pub struct TrackingContext {
    camera: Arc<CameraModel>,
    service: RenderService,
    tracker: Tracker,
    frame_count: u64,
}

impl TrackingContext {
    /// Wire up the pipeline: spawns the render thread.
    pub fn new(
        camera: Arc<CameraModel>,
        renderer: Box<dyn GeometryRenderer>,
        config: TrackerConfig,
    ) -> Self {
        let service = RenderService::spawn(renderer, camera.clone());
        let tracker = Tracker::new(camera.clone(), config, service.handle());
        Self {
            camera,
            service,
            tracker,
            frame_count: 0,
        }
    }

    pub fn camera(&self) -> &Arc<CameraModel> {
        &self.camera
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Register an instrument to track.
    pub fn add_model(&mut self, model: Arc<InstrumentModel>) {
        self.tracker.add_model(model);
    }

    /// Run one classified frame to convergence.
    ///
    /// Loops refinement steps until every object's budget is spent, then
    /// returns the converged poses. `found` is the external detector's
    /// verdict for this frame.
    pub fn run_frame(&mut self, classification: ClassificationMap, found: bool) -> Result<FrameResult> {
        let frame = Frame::new(classification, self.frame_count);
        self.frame_count += 1;

        let mut steps = 0;
        let mut last = self.tracker.run_step(&frame, found)?;
        steps += 1;
        while found && !self.tracker.needs_new_frame() {
            last = self.tracker.run_step(&frame, found)?;
            steps += 1;
        }

        Ok(FrameResult {
            objects: last.objects,
            frame_index: frame.frame_index,
            steps,
        })
    }

    /// Tear down the pipeline; joins the render thread.
    pub fn shutdown(&mut self) {
        self.service.shutdown();
    }
}
