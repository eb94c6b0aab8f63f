use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kenzy_bus::{Context, LocalDispatch, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::sink::{CollectSink, SinkAttachable};
use crate::supervisor::RestartSignal;
use crate::traits::{AudioSource, Transcriber, WakeDetector};

/// Tuning knobs for the capture -> VAD/wake/ASR -> emitter pipeline,
/// mirroring `stt/device.py`'s settings dict defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttSettings {
    pub sample_rate: u32,
    pub channels: u16,
    /// 640 samples is 40ms of mono 16kHz audio, the frame size the VAD
    /// stage consumes.
    pub frame_samples: usize,
    pub vad_aggressiveness: u8,
    /// Fraction of trailing frames that must register as silence before a
    /// triggered utterance is considered finished.
    pub speech_ratio: f32,
    pub speech_buffer_padding_ms: u32,
    pub speech_buffer_size: usize,
}

impl Default for SttSettings {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            frame_samples: 640,
            vad_aggressiveness: 0,
            speech_ratio: 0.75,
            speech_buffer_padding_ms: 350,
            speech_buffer_size: 50,
        }
    }
}

/// The speech-to-text device: owns the capture/ASR pipeline and answers the
/// lifecycle verbs over the bus.
pub struct SttDevice {
    settings: SttSettings,
    source: Arc<dyn AudioSource>,
    wake: Arc<dyn WakeDetector>,
    transcriber: Arc<dyn Transcriber>,
    sink: Mutex<Arc<dyn CollectSink>>,
    restart: RestartSignal,
    running: Arc<AtomicBool>,
    muted: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl SttDevice {
    pub fn new(
        settings: SttSettings,
        source: Arc<dyn AudioSource>,
        wake: Arc<dyn WakeDetector>,
        transcriber: Arc<dyn Transcriber>,
        sink: Arc<dyn CollectSink>,
        restart: RestartSignal,
    ) -> Self {
        Self {
            settings,
            source,
            wake,
            transcriber,
            sink: Mutex::new(sink),
            restart,
            running: Arc::new(AtomicBool::new(false)),
            muted: Arc::new(AtomicBool::new(false)),
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

        let (frame_tx, frame_rx) = kenzy_queue::channel(1);
        let (text_tx, text_rx) = kenzy_queue::channel(1);

        let mut tasks = Vec::new();

        tasks.push(tokio::spawn(capture_loop(
            self.source.clone(),
            frame_tx,
            cancel.clone(),
            self.restart.clone(),
        )));

        tasks.push(tokio::spawn(recognize_loop(
            self.settings.clone(),
            frame_rx,
            text_tx,
            self.wake.clone(),
            self.transcriber.clone(),
            self.muted.clone(),
            cancel.clone(),
            self.restart.clone(),
        )));

        tasks.push(tokio::spawn(emit_loop(
            text_rx,
            self.sink.lock().unwrap().clone(),
            cancel.clone(),
        )));

        *self.tasks.lock().unwrap() = tasks;
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

    fn status(&self) -> Response {
        Response::success(serde_json::json!({
            "type": "kenzy.stt",
            "running": self.running.load(Ordering::SeqCst),
            "muted": self.muted.load(Ordering::SeqCst),
        }))
    }
}

async fn capture_loop(
    source: Arc<dyn AudioSource>,
    frame_tx: kenzy_queue::Sender<Vec<i16>>,
    cancel: CancellationToken,
    restart: RestartSignal,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return,
            frame = source.next_frame() => frame,
        };

        match frame {
            Some(frame) => {
                frame_tx.try_put(frame);
            }
            None => {
                log::error!("audio source closed unexpectedly");
                restart.request_restart();
                return;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn recognize_loop(
    settings: SttSettings,
    frame_rx: kenzy_queue::Receiver<Vec<i16>>,
    text_tx: kenzy_queue::Sender<String>,
    wake: Arc<dyn WakeDetector>,
    transcriber: Arc<dyn Transcriber>,
    muted: Arc<AtomicBool>,
    cancel: CancellationToken,
    restart: RestartSignal,
) {
    let mut buffer: Vec<i16> = Vec::new();
    let mut triggered = false;
    let mut silence_run: usize = 0;
    let trailing = (settings.speech_buffer_size as f32 * settings.speech_ratio).ceil() as usize;

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return,
            frame = frame_rx.get() => frame,
        };

        if muted.load(Ordering::SeqCst) {
            buffer.clear();
            triggered = false;
            silence_run = 0;
            continue;
        }

        if !triggered {
            if wake.detect(&frame).await {
                triggered = true;
                buffer.clear();
                silence_run = 0;
            } else {
                continue;
            }
        }

        buffer.extend_from_slice(&frame);
        if wake.detect(&frame).await {
            silence_run = 0;
        } else {
            silence_run += 1;
        }

        let done = silence_run >= trailing.max(1)
            || buffer.len() >= settings.speech_buffer_size * settings.frame_samples;
        if !done {
            continue;
        }

        match transcriber.transcribe(&buffer).await {
            Ok(text) if !text.trim().is_empty() => {
                text_tx.try_put(text);
            }
            Ok(_) => {}
            Err(err) => {
                log::error!("transcription failed: {err}");
                restart.request_restart();
                return;
            }
        }

        buffer.clear();
        triggered = false;
        silence_run = 0;
    }
}

async fn emit_loop(
    text_rx: kenzy_queue::Receiver<String>,
    sink: Arc<dyn CollectSink>,
    cancel: CancellationToken,
) {
    loop {
        let text = tokio::select! {
            _ = cancel.cancelled() => return,
            text = text_rx.get() => text,
        };

        sink.emit(serde_json::json!({
            "type": "kenzy.stt",
            "text": text,
        }))
        .await;
    }
}

impl SinkAttachable for SttDevice {
    fn attach_sink(&self, sink: Arc<dyn CollectSink>) {
        *self.sink.lock().unwrap() = sink;
    }
}

#[async_trait]
impl LocalDispatch for SttDevice {
    fn accepts(&self) -> Vec<String> {
        vec![
            "start".into(),
            "stop".into(),
            "restart".into(),
            "status".into(),
            "mute".into(),
            "unmute".into(),
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
            "status" => self.status(),
            "mute" => {
                self.muted.store(true, Ordering::SeqCst);
                Response::success_empty()
            }
            "unmute" => {
                self.muted.store(false, Ordering::SeqCst);
                Response::success_empty()
            }
            other => Response::failure(format!("Unrecognized command: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::RecordingSink;
    use crate::traits::{NullAudioSource, NullWakeDetector, StubTranscriber};

    fn device(sink: Arc<RecordingSink>) -> SttDevice {
        SttDevice::new(
            SttSettings::default(),
            Arc::new(NullAudioSource),
            Arc::new(NullWakeDetector),
            Arc::new(StubTranscriber {
                fixed_text: "hello there".into(),
            }),
            sink,
            RestartSignal::new(),
        )
    }

    #[tokio::test]
    async fn start_is_idempotent_and_status_reports_running() {
        let sink = Arc::new(RecordingSink::new());
        let dev = device(sink);

        let r1 = dev.invoke("start", Value::Null, &Context::default()).await;
        let r2 = dev.invoke("start", Value::Null, &Context::default()).await;
        assert!(r1.is_success());
        assert!(r2.is_success());

        let status = dev.invoke("status", Value::Null, &Context::default()).await;
        assert!(status.is_success());

        dev.invoke("stop", Value::Null, &Context::default()).await;
    }

    #[tokio::test]
    async fn unrecognized_verb_fails() {
        let sink = Arc::new(RecordingSink::new());
        let dev = device(sink);
        let resp = dev.invoke("dance", Value::Null, &Context::default()).await;
        assert!(!resp.is_success());
    }

    #[tokio::test]
    async fn mute_then_unmute_round_trips_through_status() {
        let sink = Arc::new(RecordingSink::new());
        let dev = device(sink);

        dev.invoke("mute", Value::Null, &Context::default()).await;
        let status = dev.invoke("status", Value::Null, &Context::default()).await;
        assert!(status.is_success());

        dev.invoke("unmute", Value::Null, &Context::default()).await;
    }
}
