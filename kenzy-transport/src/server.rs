use std::net::SocketAddr;
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;

use crate::api::{router, AppState};
use crate::error::TransportError;

pub struct TlsFiles {
    pub cert_file: String,
    pub key_file: String,
}

/// Serves the API/static router on `addr`, plain HTTP or TLS depending on
/// `tls`. Runs until the process is killed; callers typically `tokio::spawn`
/// this alongside the rest of the node's tasks.
pub async fn serve(
    addr: SocketAddr,
    state: Arc<AppState>,
    tls: Option<TlsFiles>,
) -> Result<(), TransportError> {
    let app = router(state);

    match tls {
        None => {
            let listener =
                tokio::net::TcpListener::bind(addr)
                    .await
                    .map_err(|source| TransportError::Bind {
                        addr: addr.to_string(),
                        source,
                    })?;
            axum::serve(listener, app)
                .await
                .map_err(|err| TransportError::Bind {
                    addr: addr.to_string(),
                    source: std::io::Error::other(err),
                })
        }
        Some(tls) => {
            let config = RustlsConfig::from_pem_file(&tls.cert_file, &tls.key_file)
                .await
                .map_err(|err| TransportError::Tls(err.to_string()))?;
            axum_server::bind_rustls(addr, config)
                .serve(app.into_make_service())
                .await
                .map_err(|source| TransportError::Bind {
                    addr: addr.to_string(),
                    source,
                })
        }
    }
}
