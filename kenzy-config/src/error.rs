use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not find configuration file {0}")]
    NotFound(String),

    #[error("unexpected config file extension: {0}")]
    UnknownExtension(String),

    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("could not parse JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
