use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The bus never raises across the wire; every failure becomes a `Response`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Response {
    Success {
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    #[serde(rename = "failed")]
    Failure {
        #[serde(skip_serializing_if = "Option::is_none")]
        errors: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
}

impl Response {
    pub fn success(data: impl Serialize) -> Self {
        Response::Success {
            data: serde_json::to_value(data).ok(),
        }
    }

    pub fn success_empty() -> Self {
        Response::Success { data: None }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Response::Failure {
            errors: Some(message.into()),
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success { .. })
    }

    pub fn errors(&self) -> Option<&str> {
        match self {
            Response::Failure { errors, .. } => errors.as_deref(),
            Response::Success { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_round_trips_through_json() {
        let resp = Response::success(serde_json::json!({"active": true}));
        let encoded = serde_json::to_string(&resp).unwrap();
        let decoded: Response = serde_json::from_str(&encoded).unwrap();
        assert!(decoded.is_success());
    }

    #[test]
    fn failure_carries_errors() {
        let resp = Response::failure("Unrecognized command");
        assert!(!resp.is_success());
        assert_eq!(resp.errors(), Some("Unrecognized command"));
    }
}
