use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("registry error: {0}")]
    Registry(#[from] kenzy_registry::RegistryError),

    #[error("send to {url} failed: {source}")]
    Send {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("no peer accepted action {0:?}")]
    NoRecipient(String),
}
