//! Per-object temporal pose state: prediction across frames and loss
//! handling.

use nalgebra::{UnitQuaternion, Vector3};

use crate::geometry::Pose;
use crate::tracking::state::RefineState;

/// Constant-velocity predictor over translation and rotation.
///
/// Velocity is the delta observed between the two most recent corrected
/// poses; prediction extrapolates it one frame forward.
#[derive(Debug, Clone)]
struct MotionPredictor {
    prev_pose: Option<Pose>,
    velocity: Vector3<f64>,
    angular_velocity: UnitQuaternion<f64>,
}

impl MotionPredictor {
    fn new() -> Self {
        Self {
            prev_pose: None,
            velocity: Vector3::zeros(),
            angular_velocity: UnitQuaternion::identity(),
        }
    }

    fn update(&mut self, pose: &Pose) {
        if let Some(ref prev) = self.prev_pose {
            self.velocity = pose.translation - prev.translation;
            self.angular_velocity = prev.rotation.inverse() * pose.rotation;
        }
        self.prev_pose = Some(pose.clone());
    }

    fn predict(&self) -> Option<Pose> {
        self.prev_pose.as_ref().map(|prev| Pose {
            translation: prev.translation + self.velocity,
            rotation: prev.rotation * self.angular_velocity,
            joints: prev.joints.clone(),
        })
    }

    fn reset(&mut self) {
        self.prev_pose = None;
        self.velocity = Vector3::zeros();
        self.angular_velocity = UnitQuaternion::identity();
    }
}

/// One tracked object's pose plus its temporal filter.
///
/// Created when a new object is detected, updated every tracked frame with
/// the refiner's converged pose, and put into re-acquisition mode when the
/// detector loses the object.
#[derive(Debug, Clone)]
pub struct TemporalPoseState {
    pose: Pose,
    predictor: MotionPredictor,
    state: RefineState,
}

impl TemporalPoseState {
    /// A state waiting for its first detection.
    pub fn unseeded() -> Self {
        Self {
            pose: Pose::identity(),
            predictor: MotionPredictor::new(),
            state: RefineState::Idle,
        }
    }

    /// Seed (or reseed) the pose from a detection; any velocity estimate
    /// from a previous track is discarded.
    pub fn seed(&mut self, pose: Pose) {
        self.predictor.reset();
        self.predictor.update(&pose);
        self.pose = pose;
        self.state = RefineState::Refining;
    }

    /// True when the state has a pose to refine.
    pub fn is_active(&self) -> bool {
        !matches!(self.state, RefineState::Idle | RefineState::Lost)
    }

    pub fn state(&self) -> RefineState {
        self.state
    }

    pub fn set_state(&mut self, state: RefineState) {
        self.state = state;
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn pose_mut(&mut self) -> &mut Pose {
        &mut self.pose
    }

    /// Advance the pose one frame with the constant-velocity prediction.
    pub fn predict(&mut self) {
        if let Some(predicted) = self.predictor.predict() {
            self.pose = predicted;
        }
        self.state = RefineState::Refining;
    }

    /// Feed the refiner's converged pose back as the frame's observation.
    pub fn correct(&mut self, observed: Pose) {
        self.predictor.update(&observed);
        self.pose = observed;
    }

    /// Detection lost: drop the velocity estimate and wait for a reseed.
    pub fn mark_lost(&mut self) {
        self.predictor.reset();
        self.state = RefineState::Lost;
    }
}

impl Default for TemporalPoseState {
    fn default() -> Self {
        Self::unseeded()
    }
}
