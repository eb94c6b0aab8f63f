use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use kenzy_bus::Response as BusResponse;

/// Matches a request's `Authorization: Bearer <key>` header against the
/// configured `api_key`.
///
/// **An empty or unset `api_key` means "no auth required"** — this mirrors
/// `core.py::authenticate`'s behavior exactly (`server_key is None or
/// server_key == api_key`). It is a deliberate, preserved default, not an
/// oversight: deploying with no `api_key` set is equivalent to disabling
/// authentication entirely. Anyone relying on this transport for anything
/// beyond a trusted LAN must set `api_key`.
pub trait ApiKeyState: Send + Sync {
    fn api_key(&self) -> Option<&str>;
}

impl<T: ApiKeyState> ApiKeyState for std::sync::Arc<T> {
    fn api_key(&self) -> Option<&str> {
        (**self).api_key()
    }
}

pub struct BearerAuth {
    pub authorized: bool,
}

impl<S> FromRequestParts<S> for BearerAuth
where
    S: ApiKeyState + Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let configured = state.api_key().filter(|key| !key.is_empty());

        let Some(configured) = configured else {
            return Ok(Self { authorized: true });
        };

        let provided = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(|value| {
                value
                    .strip_prefix("Bearer ")
                    .or_else(|| value.strip_prefix("bearer "))
                    .unwrap_or(value)
                    .trim_matches(|c| c == '"' || c == '\'')
            });

        match provided {
            Some(key) if key == configured => Ok(Self { authorized: true }),
            _ => Err((StatusCode::OK, Json(BusResponse::failure("Unauthorized"))).into_response()),
        }
    }
}
