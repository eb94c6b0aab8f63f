use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use kenzy_bus::{Bus, Context};
use serde::Deserialize;
use serde_json::Value;
use tower_http::cors::CorsLayer;

use crate::assets::{serve_asset, TemplateVars};
use crate::auth::{ApiKeyState, BearerAuth};

pub struct AppState {
    pub bus: Arc<Bus>,
    pub local_url: String,
    pub service_url: String,
    pub api_key: Option<String>,
    pub server_uuid: String,
    pub version: String,
    pub app_name: String,
    pub app_title: String,
}

impl ApiKeyState for AppState {
    fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }
}

impl AppState {
    fn template_vars(&self) -> TemplateVars<'_> {
        TemplateVars {
            service_url: &self.service_url,
            server_uuid: &self.server_uuid,
            version: &self.version,
            app_name: &self.app_name,
            app_title: &self.app_title,
        }
    }

    fn is_hub(&self) -> bool {
        self.local_url == self.service_url
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(serve_static))
        .route("/{*path}", get(serve_static).post(handle_command))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn serve_static(State(state): State<Arc<AppState>>, uri: Uri) -> Response {
    let path = uri.path();

    if !state.is_hub() && !path.to_lowercase().starts_with("/api/") {
        let location = format!("{}{}", state.service_url.trim_end_matches('/'), path);
        return (StatusCode::FOUND, [(header::LOCATION, location)]).into_response();
    }

    let lower = path.to_lowercase();
    if lower == "/" || lower == "/admin" || lower.starts_with("/admin/") {
        return (StatusCode::FOUND, [(header::LOCATION, "/index.html")]).into_response();
    }

    serve_asset(path, &state.template_vars())
}

#[derive(Debug, Deserialize)]
struct RequestEnvelope {
    action: Option<String>,
    #[serde(default)]
    payload: Value,
    context: Option<Context>,
}

async fn handle_command(
    State(state): State<Arc<AppState>>,
    _auth: BearerAuth,
    Json(envelope): Json<RequestEnvelope>,
) -> Response {
    let action = match envelope.action.filter(|a| !a.trim().is_empty()) {
        Some(action) => action,
        None => return Json(kenzy_bus::Response::failure("Unrecognized request.")).into_response(),
    };

    let context = envelope.context.unwrap_or_default();
    Json(state.bus.command(&action, envelope.payload, context).await).into_response()
}
