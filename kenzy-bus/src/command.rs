use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Context;

/// A verb with its payload, context and routing hints.
///
/// Immutable once built. The original system modeled `speak`/`play`/
/// `register` as a class hierarchy (`SpeakCommand`, `PlayCommand`, ...); here
/// they are thin constructor functions that return a plain `Command`, since
/// the only thing that ever varied between them was the payload shape and
/// the pre/post children they attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub action: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub context: Context,
    /// Explicit recipient. `None` means "route by context".
    #[serde(default)]
    pub url: Option<String>,
    /// Per-request timeout in milliseconds; `None` means the bus default.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Commands to send before this one, in order.
    #[serde(default)]
    pub pre: Vec<Command>,
    /// Commands to send after this one, in order.
    #[serde(default)]
    pub post: Vec<Command>,
}

impl Command {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            payload: Value::Null,
            context: Context::default(),
            url: None,
            timeout_ms: None,
            pre: Vec::new(),
            post: Vec::new(),
        }
    }

    pub fn with_payload(mut self, payload: impl Serialize) -> Self {
        self.payload = serde_json::to_value(payload).unwrap_or(Value::Null);
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_pre(mut self, cmd: Command) -> Self {
        self.pre.push(cmd);
        self
    }

    pub fn with_post(mut self, cmd: Command) -> Self {
        self.post.push(cmd);
        self
    }

    pub fn is_empty_action(&self) -> bool {
        self.action.trim().is_empty()
    }

    /// `speak{text}` with no chained commands, the common case for
    /// fire-and-forget TTS.
    pub fn speak(text: impl Into<String>) -> Self {
        Command::new("speak").with_payload(serde_json::json!({ "text": text.into() }))
    }

    /// `speak` wrapped with a `mute` before and `unmute` after, so other STT
    /// devices in the same location don't pick up the hub's own voice.
    pub fn speak_with_mute_guard(text: impl Into<String>) -> Self {
        Command::speak(text)
            .with_pre(Command::mute())
            .with_post(Command::unmute())
    }

    pub fn mute() -> Self {
        Command::new("mute")
    }

    pub fn unmute() -> Self {
        Command::new("unmute")
    }

    pub fn play(url: impl Into<String>) -> Self {
        Command::new("play").with_payload(serde_json::json!({ "url": url.into() }))
    }

    pub fn register(
        url: impl Into<String>,
        device_type: impl Into<String>,
        accepts: Vec<String>,
    ) -> Self {
        Command::new("register").with_payload(serde_json::json!({
            "url": url.into(),
            "type": device_type.into(),
            "accepts": accepts,
        }))
    }

    pub fn shutdown() -> Self {
        Command::new("shutdown")
    }

    pub fn collect(data: impl Serialize) -> Self {
        Command::new("collect").with_payload(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speak_with_mute_guard_chains_in_order() {
        let cmd = Command::speak_with_mute_guard("hello");
        assert_eq!(cmd.pre.len(), 1);
        assert_eq!(cmd.pre[0].action, "mute");
        assert_eq!(cmd.post.len(), 1);
        assert_eq!(cmd.post[0].action, "unmute");
    }

    #[test]
    fn empty_action_is_detected() {
        assert!(Command::new("  ").is_empty_action());
        assert!(!Command::new("speak").is_empty_action());
    }

    #[test]
    fn register_payload_round_trips() {
        let cmd = Command::register("http://a:9700", "kenzy.stt", vec!["mute".into()]);
        let encoded = serde_json::to_string(&cmd).unwrap();
        let decoded: Command = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.action, "register");
        assert_eq!(decoded.payload["type"], "kenzy.stt");
    }
}
