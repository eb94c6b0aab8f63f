use async_trait::async_trait;
use serde_json::Value;

use crate::context::Context;
use crate::response::Response;

/// The local device a bus instance fronts. Implemented by `kenzy-devices`.
///
/// Kept as a trait so `kenzy-bus` never depends on `kenzy-devices` directly;
/// the dependency points the other way, matching the original's single
/// `KenzyHTTPServer.device` slot.
#[async_trait]
pub trait LocalDispatch: Send + Sync {
    /// Verbs this device answers, e.g. `["start", "stop", "mute", "unmute"]`.
    fn accepts(&self) -> Vec<String>;

    async fn invoke(&self, action: &str, payload: Value, context: &Context) -> Response;
}

/// Sends a JSON envelope to a remote peer over HTTP. Implemented by
/// `kenzy-transport`'s `reqwest`-backed client.
#[async_trait]
pub trait OutboundSender: Send + Sync {
    async fn send(
        &self,
        url: &str,
        envelope: &Value,
        timeout_ms: Option<u64>,
    ) -> anyhow::Result<Response>;
}
