//! Configuration model and YAML/JSON loader for the `kenzy` binary.

mod error;
mod loader;
mod model;
mod multi;

pub use error::ConfigError;
pub use loader::{load, save};
pub use model::{KenzyConfig, ServiceConfig, SslConfig, StanzaConfig, StanzaDefaults, UpnpConfig, UpnpMode};
pub use multi::{resolve_stanzas, ResolvedStanza};
