use std::sync::Arc;

use async_trait::async_trait;
use kenzy_bus::{Context, LocalDispatch, Response};
use serde_json::Value;

use crate::traits::LlmBackend;

/// Fallback verb recipient: the skill hub calls this when no intent in its
/// own registry matches with enough confidence.
pub struct LlmDevice {
    backend: Arc<dyn LlmBackend>,
}

impl LlmDevice {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl LocalDispatch for LlmDevice {
    fn accepts(&self) -> Vec<String> {
        vec!["status".into(), "complete".into()]
    }

    async fn invoke(&self, action: &str, payload: Value, _context: &Context) -> Response {
        match action {
            "status" => Response::success(serde_json::json!({ "type": "kenzy.llm" })),
            "complete" => {
                let prompt = payload.get("prompt").and_then(Value::as_str).unwrap_or("");
                if prompt.trim().is_empty() {
                    return Response::failure("Missing prompt.");
                }
                match self.backend.complete(prompt).await {
                    Ok(reply) => Response::success(serde_json::json!({ "reply": reply })),
                    Err(err) => Response::failure(format!("Completion failed: {err}")),
                }
            }
            other => Response::failure(format!("Unrecognized command: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StubLlmBackend;

    #[tokio::test]
    async fn complete_returns_backend_reply() {
        let device = LlmDevice::new(Arc::new(StubLlmBackend {
            fixed_reply: "42".into(),
        }));
        let resp = device
            .invoke(
                "complete",
                serde_json::json!({"prompt": "what is the answer"}),
                &Context::default(),
            )
            .await;
        assert!(resp.is_success());
    }

    #[tokio::test]
    async fn empty_prompt_fails() {
        let device = LlmDevice::new(Arc::new(StubLlmBackend {
            fixed_reply: "42".into(),
        }));
        let resp = device
            .invoke("complete", serde_json::json!({"prompt": ""}), &Context::default())
            .await;
        assert!(!resp.is_success());
    }
}
