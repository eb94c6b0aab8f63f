use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "web/"]
struct Assets;

/// Values substituted into `index.html`/`upnp.xml` at serve time, matching
/// `core.py::set_vars`'s four tokens.
pub struct TemplateVars<'a> {
    pub service_url: &'a str,
    pub server_uuid: &'a str,
    pub version: &'a str,
    pub app_name: &'a str,
    pub app_title: &'a str,
}

fn substitute(content: &str, vars: &TemplateVars<'_>) -> String {
    content
        .replace("{service_url}", vars.service_url)
        .replace("{server_uuid}", vars.server_uuid)
        .replace("{VERSION}", vars.version)
        .replace("{APP_NAME}", vars.app_name)
        .replace("{APP_TITLE}", vars.app_title)
}

/// Serves `path` from the embedded asset tree, applying template
/// substitution only to `index.html` and `upnp.xml` (the two files the
/// original templated; everything else is served byte-for-byte).
pub fn serve_asset(path: &str, vars: &TemplateVars<'_>) -> Response {
    let lookup = path.trim_start_matches('/');
    let Some(file) = Assets::get(lookup) else {
        return (StatusCode::NOT_FOUND, "Not Found").into_response();
    };

    let mime = mime_guess::from_path(lookup).first_or_octet_stream();

    if lookup == "index.html" || lookup == "upnp.xml" {
        let text = String::from_utf8_lossy(&file.data).into_owned();
        let rendered = substitute(&text, vars);
        return (StatusCode::OK, [(header::CONTENT_TYPE, mime.as_ref())], rendered).into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, mime.as_ref())],
        file.data.into_owned(),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> TemplateVars<'static> {
        TemplateVars {
            service_url: "http://192.168.1.5:9700",
            server_uuid: "abc-123",
            version: "0.1.0",
            app_name: "kenzy",
            app_title: "Kenzy",
        }
    }

    #[test]
    fn index_html_gets_template_substitution() {
        let response = serve_asset("/index.html", &vars());
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn unknown_path_is_404() {
        let response = serve_asset("/does-not-exist.bin", &vars());
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
