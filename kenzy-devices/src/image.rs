use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kenzy_bus::{Context, LocalDispatch, Response};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::sink::{CollectSink, SinkAttachable};
use crate::supervisor::RestartSignal;
use crate::traits::{FaceDetector, MotionDetector, ObjectDetector, VideoSource};

/// Capture -> motion/object/face detector stages -> emitter. Only runs the
/// object/face stages on frames motion actually flagged, since those are
/// the expensive ones.
pub struct ImageDevice {
    source: Arc<dyn VideoSource>,
    motion: Arc<dyn MotionDetector>,
    objects: Arc<dyn ObjectDetector>,
    faces: Arc<dyn FaceDetector>,
    sink: Mutex<Arc<dyn CollectSink>>,
    restart: RestartSignal,
    running: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl ImageDevice {
    pub fn new(
        source: Arc<dyn VideoSource>,
        motion: Arc<dyn MotionDetector>,
        objects: Arc<dyn ObjectDetector>,
        faces: Arc<dyn FaceDetector>,
        sink: Arc<dyn CollectSink>,
        restart: RestartSignal,
    ) -> Self {
        Self {
            source,
            motion,
            objects,
            faces,
            sink: Mutex::new(sink),
            restart,
            running: Arc::new(AtomicBool::new(false)),
            tasks: Mutex::new(Vec::new()),
            cancel: Mutex::new(None),
        }
    }

    pub fn restart_signal(&self) -> RestartSignal {
        self.restart.clone()
    }

    fn start(&self) -> Response {
        if self.running.swap(true, Ordering::SeqCst) {
            return Response::success_empty();
        }

        let cancel = CancellationToken::new();
        *self.cancel.lock().unwrap() = Some(cancel.clone());

        let task = tokio::spawn(detect_loop(
            self.source.clone(),
            self.motion.clone(),
            self.objects.clone(),
            self.faces.clone(),
            self.sink.lock().unwrap().clone(),
            cancel,
            self.restart.clone(),
        ));
        *self.tasks.lock().unwrap() = vec![task];

        Response::success_empty()
    }

    fn stop(&self) -> Response {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Response::success_empty();
        }
        if let Some(cancel) = self.cancel.lock().unwrap().take() {
            cancel.cancel();
        }
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
        Response::success_empty()
    }
}

async fn detect_loop(
    source: Arc<dyn VideoSource>,
    motion: Arc<dyn MotionDetector>,
    objects: Arc<dyn ObjectDetector>,
    faces: Arc<dyn FaceDetector>,
    sink: Arc<dyn CollectSink>,
    cancel: CancellationToken,
    restart: RestartSignal,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return,
            frame = source.next_frame() => frame,
        };

        let Some(frame) = frame else {
            log::error!("video source closed unexpectedly");
            restart.request_restart();
            return;
        };

        if !motion.detect(&frame).await {
            continue;
        }

        let (object_hits, face_hits) = tokio::join!(objects.detect(&frame), faces.detect(&frame));

        sink.emit(serde_json::json!({
            "type": "kenzy.image",
            "motion": true,
            "objects": object_hits,
            "faces": face_hits,
        }))
        .await;
    }
}

impl SinkAttachable for ImageDevice {
    fn attach_sink(&self, sink: Arc<dyn CollectSink>) {
        *self.sink.lock().unwrap() = sink;
    }
}

#[async_trait]
impl LocalDispatch for ImageDevice {
    fn accepts(&self) -> Vec<String> {
        vec![
            "start".into(),
            "stop".into(),
            "restart".into(),
            "status".into(),
        ]
    }

    async fn invoke(&self, action: &str, _payload: Value, _context: &Context) -> Response {
        match action {
            "start" => self.start(),
            "stop" => self.stop(),
            "restart" => {
                self.stop();
                self.start()
            }
            "status" => Response::success(serde_json::json!({
                "type": "kenzy.image",
                "running": self.running.load(Ordering::SeqCst),
            })),
            other => Response::failure(format!("Unrecognized command: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::RecordingSink;
    use crate::traits::{NullFaceDetector, NullMotionDetector, NullObjectDetector, NullVideoSource};

    #[tokio::test]
    async fn start_stop_are_idempotent() {
        let device = ImageDevice::new(
            Arc::new(NullVideoSource),
            Arc::new(NullMotionDetector),
            Arc::new(NullObjectDetector),
            Arc::new(NullFaceDetector),
            Arc::new(RecordingSink::new()),
            RestartSignal::new(),
        );

        assert!(device.invoke("start", Value::Null, &Context::default()).await.is_success());
        assert!(device.invoke("start", Value::Null, &Context::default()).await.is_success());
        assert!(device.invoke("stop", Value::Null, &Context::default()).await.is_success());
        assert!(device.invoke("stop", Value::Null, &Context::default()).await.is_success());
    }
}
