use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("bind failed on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS configuration error: {0}")]
    Tls(String),
}
