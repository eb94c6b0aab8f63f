use std::time::Duration;

use async_trait::async_trait;
use kenzy_bus::{OutboundSender, Response};
use serde_json::Value;

/// Outbound `reqwest`-backed HTTP client used by `kenzy-bus`'s send path.
///
/// `danger_accept_invalid_certs` mirrors the original's `requests.post(...,
/// verify=False)` — peers on a trusted LAN commonly run self-signed certs,
/// and the original never verified them either.
pub struct HttpOutboundSender {
    client: reqwest::Client,
}

impl Default for HttpOutboundSender {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpOutboundSender {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .expect("reqwest client builds with static TLS config");
        Self { client }
    }
}

#[async_trait]
impl OutboundSender for HttpOutboundSender {
    async fn send(
        &self,
        url: &str,
        envelope: &Value,
        timeout_ms: Option<u64>,
    ) -> anyhow::Result<Response> {
        let mut request = self.client.post(url).json(envelope);
        if let Some(timeout_ms) = timeout_ms {
            request = request.timeout(Duration::from_millis(timeout_ms));
        }

        let response = request.send().await?;
        let body: Response = response.json().await?;
        Ok(body)
    }
}
