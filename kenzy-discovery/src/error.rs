use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("no multicast-capable network interface found")]
    NoInterfaces,

    #[error("socket setup failed: {0}")]
    Socket(#[from] std::io::Error),

    #[error("failed to fetch device description from {url}: {source}")]
    FetchLocation {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("could not parse presentationURL from {0}")]
    MissingPresentationUrl(String),
}
