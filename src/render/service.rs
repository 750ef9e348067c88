//! Render requests as an explicit request/response boundary.
//!
//! The renderer runs on its own thread behind a bounded channel pair, so the
//! refiner's per-step dependency on the rasterizer is a visible blocking
//! call. Tests swap in a mock renderer without touching the refiner.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver, Sender};

use crate::camera::CameraModel;
use crate::geometry::Pose;
use crate::model::InstrumentModel;

use super::{GeometryRenderer, RenderedBuffers};

/// Capacity of the request channel. Refinement is sequential per object, so
/// a small buffer only matters when several objects are tracked at once.
const REQUEST_CHANNEL_CAPACITY: usize = 4;

struct RenderRequest {
    model: InstrumentModel,
    pose: Pose,
    width: usize,
    height: usize,
    reply: Sender<RenderedBuffers>,
}

enum RenderMessage {
    Request(RenderRequest),
    Quit,
}

/// Client handle used by refiners to submit render requests.
///
/// Cloneable; every tracked object holds its own handle.
#[derive(Clone)]
pub struct RenderHandle {
    tx: Sender<RenderMessage>,
}

impl RenderHandle {
    /// Submit a render request and block until the buffers come back.
    pub fn render(
        &self,
        model: &InstrumentModel,
        pose: &Pose,
        width: usize,
        height: usize,
    ) -> Result<RenderedBuffers> {
        let (reply_tx, reply_rx) = bounded(1);
        self.tx
            .send(RenderMessage::Request(RenderRequest {
                model: model.clone(),
                pose: pose.clone(),
                width,
                height,
                reply: reply_tx,
            }))
            .map_err(|_| anyhow!("render service has shut down"))?;
        reply_rx
            .recv()
            .map_err(|_| anyhow!("render service dropped the request"))
    }
}

/// Owns the render thread; [`RenderService::shutdown`] tears it down.
pub struct RenderService {
    tx: Sender<RenderMessage>,
    handle: Option<JoinHandle<()>>,
}

impl RenderService {
    /// Spawn the render thread around the given renderer and camera.
    pub fn spawn(renderer: Box<dyn GeometryRenderer>, camera: Arc<CameraModel>) -> Self {
        let (tx, rx): (Sender<RenderMessage>, Receiver<RenderMessage>) =
            bounded(REQUEST_CHANNEL_CAPACITY);
        let handle = thread::spawn(move || {
            tracing::debug!("render service thread started");
            for msg in rx.iter() {
                match msg {
                    RenderMessage::Request(req) => {
                        let buffers =
                            renderer.render(&req.model, &req.pose, &camera, req.width, req.height);
                        // A dropped reply receiver means the requester gave up.
                        let _ = req.reply.send(buffers);
                    }
                    RenderMessage::Quit => break,
                }
            }
            tracing::debug!("render service thread exiting");
        });
        Self {
            tx,
            handle: Some(handle),
        }
    }

    /// Get a client handle for submitting requests.
    pub fn handle(&self) -> RenderHandle {
        RenderHandle {
            tx: self.tx.clone(),
        }
    }

    /// Stop the render thread and wait for it to exit.
    ///
    /// Requests submitted after shutdown fail with an error.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.tx.send(RenderMessage::Quit);
            let _ = handle.join();
        }
    }
}

impl Drop for RenderService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Image;
    use crate::render::{contour_from_mask, FAR};

    /// Renderer producing a fixed filled square regardless of pose.
    struct SquareRenderer {
        half: usize,
    }

    impl GeometryRenderer for SquareRenderer {
        fn render(
            &self,
            _model: &InstrumentModel,
            _pose: &Pose,
            _camera: &CameraModel,
            width: usize,
            height: usize,
        ) -> RenderedBuffers {
            let mut front = Image::filled(width, height, FAR);
            let mut back = Image::filled(width, height, FAR);
            let mut mask = Image::<bool>::new(width, height);
            let (cx, cy) = (width / 2, height / 2);
            for y in cy - self.half..cy + self.half {
                for x in cx - self.half..cx + self.half {
                    front.set(x, y, 10.0);
                    back.set(x, y, 12.0);
                    mask.set(x, y, true);
                }
            }
            RenderedBuffers {
                front_depth: front,
                back_depth: back,
                contour: contour_from_mask(&mask),
            }
        }
    }

    #[test]
    fn test_round_trip_through_service_thread() {
        let camera = Arc::new(CameraModel::new(100.0, 100.0, 16.0, 16.0));
        let mut service = RenderService::spawn(Box::new(SquareRenderer { half: 4 }), camera);
        let handle = service.handle();

        let model = InstrumentModel::cylinder(1.0, 10.0);
        let buffers = handle
            .render(&model, &Pose::identity(), 32, 32)
            .expect("render should succeed");
        assert_eq!(buffers.front_depth.get(16, 16), 10.0);
        assert_eq!(buffers.front_depth.get(0, 0), FAR);

        service.shutdown();
    }

    #[test]
    fn test_render_after_shutdown_is_an_error() {
        let camera = Arc::new(CameraModel::new(100.0, 100.0, 16.0, 16.0));
        let mut service = RenderService::spawn(Box::new(SquareRenderer { half: 4 }), camera);
        let handle = service.handle();
        service.shutdown();

        let model = InstrumentModel::cylinder(1.0, 10.0);
        assert!(handle.render(&model, &Pose::identity(), 32, 32).is_err());
    }
}
