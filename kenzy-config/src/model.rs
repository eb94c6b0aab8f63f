use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9700
}

fn default_upnp_timeout() -> u64 {
    45
}

/// `service.upnp.type`: whether this node advertises, discovers, or does
/// neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpnpMode {
    Server,
    Client,
    Standalone,
}

impl Default for UpnpMode {
    fn default() -> Self {
        UpnpMode::Standalone
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpnpConfig {
    #[serde(rename = "type", default)]
    pub mode: UpnpMode,
    #[serde(default = "default_upnp_timeout")]
    pub timeout: u64,
}

impl Default for UpnpConfig {
    fn default() -> Self {
        Self {
            mode: UpnpMode::default(),
            timeout: default_upnp_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SslConfig {
    #[serde(default)]
    pub enable: bool,
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub upnp: UpnpConfig,
    #[serde(default)]
    pub ssl: SslConfig,
    /// An empty or absent key means "no auth required" — preserved from the
    /// original default, see `kenzy-transport`'s `BearerAuth` rustdoc.
    pub api_key: Option<String>,
    pub service_url: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            upnp: UpnpConfig::default(),
            ssl: SslConfig::default(),
            api_key: None,
            service_url: None,
        }
    }
}

/// One device stanza: its type string and type-specific `device`/`service`
/// settings. Used both as the top-level single-instance config and as each
/// named entry under a `type: multi` config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StanzaConfig {
    #[serde(rename = "type")]
    pub device_type: String,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub device: Value,
}

/// The root of a loaded configuration file.
///
/// `type: multi` is distinguished by `device_type`; in that case `stanzas`
/// holds every other top-level key (skipping `type` and `default`) as a
/// named [`StanzaConfig`], and `default` holds the fallback values merged
/// into each stanza that doesn't set them explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KenzyConfig {
    #[serde(rename = "type")]
    pub device_type: String,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub device: Value,
    #[serde(default)]
    pub default: Option<StanzaDefaults>,
    /// Raw per-stanza objects for `type: multi` configs, kept unparsed until
    /// [`crate::multi::resolve_stanzas`] merges each against `default` —
    /// a stanza that omits a field should inherit it, which a typed struct
    /// can't distinguish from "explicitly set to the struct default".
    #[serde(flatten)]
    pub stanzas: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StanzaDefaults {
    #[serde(default)]
    pub service: Value,
    #[serde(default)]
    pub device: Value,
}

impl KenzyConfig {
    pub fn is_multi(&self) -> bool {
        matches!(self.device_type.to_lowercase().as_str(), "multi" | "multiple" | "many")
    }
}
