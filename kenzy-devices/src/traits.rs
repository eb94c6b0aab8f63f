//! Trait boundaries for collaborators that are out of scope for the core
//! runtime (the ML/NLU model internals). Each ships a `Null*`/`Stub*` test
//! double so device control flow can be exercised without a real model,
//! matching the teacher's own `FileProvider` trait-with-test-double shape.

use std::time::Duration;

use async_trait::async_trait;
use kenzy_bus::Context;
use kenzy_registry::AskCallback;

/// The microphone, or whatever stands in for it. Out of scope the same way
/// the model backends are: a real implementation talks to `cpal` or similar,
/// which this crate has no opinion on.
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Blocks until a frame is available, or returns `None` if the source
    /// has been closed.
    async fn next_frame(&self) -> Option<Vec<i16>>;
}

/// The camera, or whatever stands in for it.
#[async_trait]
pub trait VideoSource: Send + Sync {
    async fn next_frame(&self) -> Option<Vec<u8>>;
}

/// Detects a wake phrase in a chunk of PCM audio.
#[async_trait]
pub trait WakeDetector: Send + Sync {
    async fn detect(&self, frame: &[i16]) -> bool;
}

/// Converts captured, VAD-triggered audio into text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &[i16]) -> anyhow::Result<String>;
}

/// Synthesizes speech audio for a line of text, returning raw PCM samples.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> anyhow::Result<Vec<i16>>;
}

/// Matches free text against registered skill intents.
#[async_trait]
pub trait IntentMatcher: Send + Sync {
    async fn match_intent(&self, text: &str) -> Option<MatchedIntent>;
}

#[derive(Debug, Clone)]
pub struct MatchedIntent {
    pub skill_name: String,
    pub intent: String,
    pub confidence: f32,
}

/// What a [`Skill`] can do back to the user once it has matched an intent.
/// A thin façade over the hub's `say`/`play`/`ask` so skills never reach for
/// the bus or ask table directly.
#[async_trait]
pub trait SpeechHandle: Send + Sync {
    async fn say(&self, text: &str);
    async fn play(&self, file_name: &str);

    /// Speaks `text`, then routes whatever the currently-active peer says
    /// next to `callback` instead of through normal intent parsing. The
    /// registration expires after `timeout` if nothing comes back.
    async fn ask(&self, text: &str, callback: AskCallback<Context>, timeout: Duration);
}

/// A skill plugin: registers intents and reacts when matched.
#[async_trait]
pub trait Skill: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    async fn handle(&self, intent: &MatchedIntent, text: &str, hub: &dyn SpeechHandle) -> anyhow::Result<()>;
}

#[async_trait]
pub trait MotionDetector: Send + Sync {
    async fn detect(&self, frame: &[u8]) -> bool;
}

#[async_trait]
pub trait ObjectDetector: Send + Sync {
    async fn detect(&self, frame: &[u8]) -> Vec<String>;
}

#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn detect(&self, frame: &[u8]) -> Vec<String>;
}

/// Fallback verb recipient invoked when skill-manager intent confidence is
/// below threshold.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String>;
}

pub struct NullAudioSource;
#[async_trait]
impl AudioSource for NullAudioSource {
    async fn next_frame(&self) -> Option<Vec<i16>> {
        std::future::pending::<()>().await;
        None
    }
}

pub struct NullVideoSource;
#[async_trait]
impl VideoSource for NullVideoSource {
    async fn next_frame(&self) -> Option<Vec<u8>> {
        std::future::pending::<()>().await;
        None
    }
}

pub struct NullWakeDetector;
#[async_trait]
impl WakeDetector for NullWakeDetector {
    async fn detect(&self, _frame: &[i16]) -> bool {
        false
    }
}

pub struct StubTranscriber {
    pub fixed_text: String,
}
#[async_trait]
impl Transcriber for StubTranscriber {
    async fn transcribe(&self, _audio: &[i16]) -> anyhow::Result<String> {
        Ok(self.fixed_text.clone())
    }
}

pub struct NullSynthesizer;
#[async_trait]
impl Synthesizer for NullSynthesizer {
    async fn synthesize(&self, _text: &str) -> anyhow::Result<Vec<i16>> {
        Ok(Vec::new())
    }
}

pub struct NullIntentMatcher;
#[async_trait]
impl IntentMatcher for NullIntentMatcher {
    async fn match_intent(&self, _text: &str) -> Option<MatchedIntent> {
        None
    }
}

pub struct NullMotionDetector;
#[async_trait]
impl MotionDetector for NullMotionDetector {
    async fn detect(&self, _frame: &[u8]) -> bool {
        false
    }
}

pub struct NullObjectDetector;
#[async_trait]
impl ObjectDetector for NullObjectDetector {
    async fn detect(&self, _frame: &[u8]) -> Vec<String> {
        Vec::new()
    }
}

pub struct NullFaceDetector;
#[async_trait]
impl FaceDetector for NullFaceDetector {
    async fn detect(&self, _frame: &[u8]) -> Vec<String> {
        Vec::new()
    }
}

pub struct StubLlmBackend {
    pub fixed_reply: String,
}
#[async_trait]
impl LlmBackend for StubLlmBackend {
    async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
        Ok(self.fixed_reply.clone())
    }
}
