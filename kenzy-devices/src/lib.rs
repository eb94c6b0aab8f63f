//! Device implementations: the concrete [`kenzy_bus::LocalDispatch`] a node
//! fronts. One of `stt`, `tts`, `skills` (the hub), `image`, or `llm` per
//! running process, selected by the `type` stanza in configuration.

mod error;
pub mod image;
mod kenzy_logger;
pub mod llm;
pub mod sink;
pub mod skills;
pub mod stt;
pub mod supervisor;
pub mod traits;
pub mod tts;

pub use error::DeviceError;
pub use image::ImageDevice;
pub use llm::LlmDevice;
pub use sink::{CollectSink, HubSink, NoopSink, SinkAttachable};
pub use skills::SkillsDevice;
pub use stt::{SttDevice, SttSettings};
pub use supervisor::{RestartSignal, Supervisor};
pub use tts::TtsDevice;

/// Which device kind a stanza configures. Matches the `type` field
/// (`kenzy.stt`, `kenzy.tts`, `kenzy.skillmanager`, `kenzy.image`,
/// `kenzy.llm`) configuration uses to select a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Stt,
    Tts,
    Skills,
    Image,
    Llm,
}

impl DeviceKind {
    pub fn from_type(device_type: &str) -> Option<Self> {
        match device_type {
            "kenzy.stt" => Some(DeviceKind::Stt),
            "kenzy.tts" => Some(DeviceKind::Tts),
            "kenzy.skillmanager" => Some(DeviceKind::Skills),
            "kenzy.image" => Some(DeviceKind::Image),
            "kenzy.llm" => Some(DeviceKind::Llm),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Stt => "kenzy.stt",
            DeviceKind::Tts => "kenzy.tts",
            DeviceKind::Skills => "kenzy.skillmanager",
            DeviceKind::Image => "kenzy.image",
            DeviceKind::Llm => "kenzy.llm",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_kind_round_trips_through_type_string() {
        for kind in [
            DeviceKind::Stt,
            DeviceKind::Tts,
            DeviceKind::Skills,
            DeviceKind::Image,
            DeviceKind::Llm,
        ] {
            assert_eq!(DeviceKind::from_type(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn unknown_type_is_none() {
        assert_eq!(DeviceKind::from_type("kenzy.unknown"), None);
    }
}
