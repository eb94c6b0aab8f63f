use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use kenzy_bus::{Bus, Command, Context, LocalDispatch, Response};
use kenzy_registry::{AskCallback, AskTable};
use serde_json::Value;

use crate::kenzy_logger::KenzyLogger;
use crate::traits::{IntentMatcher, Skill, SpeechHandle};

const DEFAULT_WAKE_WORDS: &[&str] = &["kenzy", "kenzie", "kenzi", "kinsay", "kinsy", "kinsey"];

/// Intents below this confidence are treated as a miss rather than acted on.
const CONFIDENCE_THRESHOLD: f32 = 0.6;

/// The skill hub: owns wake-word gating, ask-table consumption, and intent
/// dispatch. Mirrors `skillmanager/device.py`'s `SkillsDevice`.
pub struct SkillsDevice {
    bus: Mutex<Option<Weak<Bus>>>,
    ask_table: Mutex<Option<Arc<AskTable<Context>>>>,
    wake_words: Vec<String>,
    activation_timeout: Duration,
    activated_at: Mutex<Option<Instant>>,
    /// URL of the peer whose last `collect` is being handled, so a skill's
    /// `ask` knows whose next utterance to intercept.
    current_peer: Mutex<Option<String>>,
    matcher: Arc<dyn IntentMatcher>,
    skills: Vec<Arc<dyn Skill>>,
    logger: KenzyLogger,
}

impl SkillsDevice {
    pub fn new(
        wake_words: Vec<String>,
        activation_timeout: Duration,
        matcher: Arc<dyn IntentMatcher>,
        skills: Vec<Arc<dyn Skill>>,
    ) -> Self {
        let wake_words = if wake_words.is_empty() {
            DEFAULT_WAKE_WORDS.iter().map(|s| s.to_string()).collect()
        } else {
            wake_words
        };
        Self {
            bus: Mutex::new(None),
            ask_table: Mutex::new(None),
            wake_words,
            activation_timeout,
            activated_at: Mutex::new(None),
            current_peer: Mutex::new(None),
            matcher,
            skills,
            logger: KenzyLogger::new("KNZY-SKM"),
        }
    }

    /// Wires the hub to the bus it fronts, once the bus exists. Mirrors the
    /// original's `set_service`.
    pub fn attach(&self, bus: &Arc<Bus>) {
        *self.bus.lock().unwrap() = Some(Arc::downgrade(bus));
        *self.ask_table.lock().unwrap() = Some(bus.ask_table().clone());
    }

    fn bus(&self) -> Option<Arc<Bus>> {
        self.bus.lock().unwrap().as_ref().and_then(Weak::upgrade)
    }

    /// If `text` begins with a wake word, returns what's left after
    /// stripping it (and any following whitespace). `None` means no wake
    /// word opened the utterance.
    fn strip_wake_word(&self, text: &str) -> Option<String> {
        let lower = text.to_lowercase();
        self.wake_words
            .iter()
            .find(|w| lower.starts_with(w.as_str()))
            .map(|w| text[w.len()..].trim_start().to_string())
    }

    fn is_activated(&self) -> bool {
        self.activated_at
            .lock()
            .unwrap()
            .is_some_and(|t| t.elapsed() < self.activation_timeout)
    }

    fn activate(&self) {
        *self.activated_at.lock().unwrap() = Some(Instant::now());
    }

    async fn parse(&self, text: &str, _context: &Context) {
        let stripped = self.strip_wake_word(text);

        if !self.is_activated() && stripped.is_none() {
            self.logger.debug(format!("ignoring (no wake word): {text}"));
            return;
        }

        self.activate();
        let remainder = stripped.unwrap_or_else(|| text.to_string());

        if remainder.is_empty() {
            self.logger.debug("wake word only, playing ready cue");
            self.play("ready.wav").await;
            return;
        }

        let Some(matched) = self.matcher.match_intent(&remainder).await else {
            self.logger.debug(format!("no intent matched for: {remainder}"));
            return;
        };

        if matched.confidence < CONFIDENCE_THRESHOLD {
            self.logger.debug(format!(
                "intent {} matched below confidence threshold ({:.2} < {CONFIDENCE_THRESHOLD:.2}), ignoring",
                matched.intent, matched.confidence
            ));
            return;
        }

        let Some(skill) = self.skills.iter().find(|s| s.name() == matched.skill_name) else {
            self.logger
                .error(format!("matched skill {:?} not registered", matched.skill_name));
            return;
        };

        if let Err(err) = skill.handle(&matched, &remainder, self).await {
            self.logger.error(format!("skill {} failed: {err}", skill.name()));
        }
    }

    pub fn skill_summaries(&self) -> Value {
        let mut out = serde_json::Map::new();
        for skill in &self.skills {
            out.insert(
                skill.name().to_string(),
                serde_json::json!({ "description": skill.description() }),
            );
        }
        Value::Object(out)
    }
}

#[async_trait]
impl SpeechHandle for SkillsDevice {
    async fn say(&self, text: &str) {
        let Some(bus) = self.bus() else {
            self.logger.error("say requested before hub attached to a bus");
            return;
        };
        bus.send_request(Command::speak_with_mute_guard(text), false).await;
    }

    async fn play(&self, file_name: &str) {
        let Some(bus) = self.bus() else {
            self.logger.error("play requested before hub attached to a bus");
            return;
        };
        bus.send_request(Command::play(file_name), false).await;
    }

    async fn ask(&self, text: &str, callback: AskCallback<Context>, timeout: Duration) {
        let Some(bus) = self.bus() else {
            self.logger.error("ask requested before hub attached to a bus");
            return;
        };
        let Some(ask_table) = self.ask_table.lock().unwrap().clone() else {
            self.logger.error("ask requested before hub attached to an ask table");
            return;
        };
        let Some(peer) = self.current_peer.lock().unwrap().clone() else {
            self.logger.error("ask requested with no active peer to target");
            return;
        };

        ask_table.expect(peer, timeout, callback);
        bus.send_request(Command::speak_with_mute_guard(text), false).await;
    }
}

#[async_trait]
impl LocalDispatch for SkillsDevice {
    fn accepts(&self) -> Vec<String> {
        vec![
            "start".into(),
            "stop".into(),
            "restart".into(),
            "status".into(),
            "collect".into(),
            "download_skill".into(),
            "relay".into(),
        ]
    }

    async fn invoke(&self, action: &str, payload: Value, context: &Context) -> Response {
        match action {
            "start" | "restart" => Response::success_empty(),
            "stop" => Response::success_empty(),
            "status" => Response::success(serde_json::json!({
                "type": "kenzy.skillmanager",
                "skills": self.skill_summaries(),
                "logs": self.logger.tail(),
            })),
            "collect" => {
                let data = payload.get("data").unwrap_or(&payload);
                if data.get("type").and_then(Value::as_str) == Some("kenzy.stt") {
                    let text = data.get("text").and_then(Value::as_str).unwrap_or("").to_string();
                    let dev_url = context.url.clone().unwrap_or_else(|| "self".to_string());
                    *self.current_peer.lock().unwrap() = Some(dev_url.clone());

                    let callback = self
                        .ask_table
                        .lock()
                        .unwrap()
                        .clone()
                        .and_then(|table| table.take_if_pending(&dev_url));

                    if let Some(callback) = callback {
                        self.logger.debug("initiating ask callback");
                        callback(&text, context);
                        self.activate();
                    } else {
                        self.parse(&text, context).await;
                    }
                } else {
                    self.logger.debug(format!("collect: {data}"));
                }
                Response::success_empty()
            }
            "download_skill" => {
                self.logger.info("download_skill requested");
                Response::failure("Not implemented")
            }
            "relay" => {
                let Some(bus) = self.bus() else {
                    return Response::failure("Hub not attached to a bus.");
                };
                let Some(command) = payload.get("data").and_then(|d| d.get("command")) else {
                    return Response::failure("No command received");
                };
                let Ok(cmd) = serde_json::from_value::<Command>(command.clone()) else {
                    return Response::failure("Malformed relay command");
                };
                bus.send_request(cmd, false).await;
                Response::success("Command received successfully")
            }
            other => Response::failure(format!("Unrecognized command: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{MatchedIntent, NullIntentMatcher};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSkill {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Skill for CountingSkill {
        fn name(&self) -> &str {
            "counting"
        }
        fn description(&self) -> &str {
            "counts invocations"
        }
        async fn handle(&self, _intent: &MatchedIntent, _text: &str, _hub: &dyn SpeechHandle) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FixedMatcher;
    #[async_trait]
    impl IntentMatcher for FixedMatcher {
        async fn match_intent(&self, _text: &str) -> Option<MatchedIntent> {
            Some(MatchedIntent {
                skill_name: "counting".into(),
                intent: "noop".into(),
                confidence: 1.0,
            })
        }
    }

    struct LowConfidenceMatcher;
    #[async_trait]
    impl IntentMatcher for LowConfidenceMatcher {
        async fn match_intent(&self, _text: &str) -> Option<MatchedIntent> {
            Some(MatchedIntent {
                skill_name: "counting".into(),
                intent: "noop".into(),
                confidence: 0.3,
            })
        }
    }

    #[tokio::test]
    async fn status_lists_registered_skills() {
        let device = SkillsDevice::new(
            vec![],
            Duration::from_secs(45),
            Arc::new(NullIntentMatcher),
            vec![Arc::new(CountingSkill { calls: AtomicUsize::new(0) })],
        );
        let resp = device.invoke("status", Value::Null, &Context::default()).await;
        assert!(resp.is_success());
    }

    #[tokio::test]
    async fn collect_without_wake_word_is_ignored() {
        let device = SkillsDevice::new(
            vec!["kenzy".into()],
            Duration::from_secs(45),
            Arc::new(FixedMatcher),
            vec![Arc::new(CountingSkill { calls: AtomicUsize::new(0) })],
        );
        let payload = serde_json::json!({"data": {"type": "kenzy.stt", "text": "what time is it"}});
        device.invoke("collect", payload, &Context::default()).await;
    }

    #[tokio::test]
    async fn collect_with_wake_word_dispatches_to_matched_skill() {
        let skill = Arc::new(CountingSkill { calls: AtomicUsize::new(0) });
        let device = SkillsDevice::new(
            vec!["kenzy".into()],
            Duration::from_secs(45),
            Arc::new(FixedMatcher),
            vec![skill.clone()],
        );
        let payload = serde_json::json!({"data": {"type": "kenzy.stt", "text": "kenzy what time is it"}});
        device.invoke("collect", payload, &Context::default()).await;
        assert_eq!(skill.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn wake_word_only_plays_ready_cue_without_dispatch() {
        let skill = Arc::new(CountingSkill { calls: AtomicUsize::new(0) });
        let device = SkillsDevice::new(
            vec!["kenzy".into()],
            Duration::from_secs(45),
            Arc::new(FixedMatcher),
            vec![skill.clone()],
        );
        let payload = serde_json::json!({"data": {"type": "kenzy.stt", "text": "kenzy"}});
        device.invoke("collect", payload, &Context::default()).await;
        assert_eq!(skill.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn below_confidence_threshold_is_ignored() {
        let skill = Arc::new(CountingSkill { calls: AtomicUsize::new(0) });
        let device = SkillsDevice::new(
            vec!["kenzy".into()],
            Duration::from_secs(45),
            Arc::new(LowConfidenceMatcher),
            vec![skill.clone()],
        );
        let payload = serde_json::json!({"data": {"type": "kenzy.stt", "text": "kenzy what time is it"}});
        device.invoke("collect", payload, &Context::default()).await;
        assert_eq!(skill.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn mid_sentence_wake_word_does_not_activate() {
        let skill = Arc::new(CountingSkill { calls: AtomicUsize::new(0) });
        let device = SkillsDevice::new(
            vec!["kenzy".into()],
            Duration::from_secs(45),
            Arc::new(FixedMatcher),
            vec![skill.clone()],
        );
        let payload = serde_json::json!({"data": {"type": "kenzy.stt", "text": "hey kenzy what time is it"}});
        device.invoke("collect", payload, &Context::default()).await;
        assert_eq!(skill.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn relay_without_command_fails() {
        let device = SkillsDevice::new(
            vec![],
            Duration::from_secs(45),
            Arc::new(NullIntentMatcher),
            vec![],
        );
        let resp = device
            .invoke("relay", serde_json::json!({"data": {}}), &Context::default())
            .await;
        assert!(!resp.is_success());
    }
}
