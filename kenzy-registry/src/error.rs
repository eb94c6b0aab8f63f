use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("peer url must not be empty")]
    EmptyUrl,

    #[error("no peer registered at {0}")]
    UnknownPeer(String),
}
