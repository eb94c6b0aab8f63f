use serde_json::Value;

use crate::error::ConfigError;
use crate::model::{KenzyConfig, StanzaConfig};

/// A fully-merged stanza from a `type: multi` config, ready to hand to
/// `startup()`.
pub struct ResolvedStanza {
    pub name: String,
    pub stanza: StanzaConfig,
}

fn merge_objects(stanza: &Value, defaults: &Value) -> Value {
    let mut merged = match defaults {
        Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };

    if let Value::Object(stanza_map) = stanza {
        for (key, value) in stanza_map {
            merged.insert(key.clone(), value.clone());
        }
    }

    Value::Object(merged)
}

/// Merges every `type: multi` stanza against `config.default`, then assigns
/// ascending ports starting from each stanza's own (or the default's) port,
/// bumping forward whenever a computed port would collide with the previous
/// stanza's. `kenzy.skillmanager` stanzas default `service.upnp.type` to
/// `server` when unset, matching the original's hub-by-default behavior.
pub fn resolve_stanzas(config: &KenzyConfig) -> Result<Vec<ResolvedStanza>, ConfigError> {
    let default_service = config
        .default
        .as_ref()
        .map(|d| d.service.clone())
        .unwrap_or(Value::Null);
    let default_device = config
        .default
        .as_ref()
        .map(|d| d.device.clone())
        .unwrap_or(Value::Null);

    let mut names: Vec<&String> = config.stanzas.keys().collect();
    names.sort();

    let mut resolved = Vec::new();
    let mut last_port: u16 = 0;

    for name in names {
        let raw = &config.stanzas[name];
        let raw_service = raw.get("service").cloned().unwrap_or(Value::Null);
        let raw_device = raw.get("device").cloned().unwrap_or(Value::Null);

        let mut merged_service = merge_objects(&raw_service, &default_service);
        let merged_device = merge_objects(&raw_device, &default_device);

        let device_type = raw
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("kenzy.skillmanager")
            .to_string();

        if device_type == "kenzy.skillmanager" {
            if let Value::Object(service_map) = &mut merged_service {
                service_map
                    .entry("upnp")
                    .or_insert_with(|| serde_json::json!({ "type": "server" }));
            }
        }

        let requested_port = merged_service
            .get("port")
            .and_then(Value::as_u64)
            .unwrap_or(9700) as u16;
        let port = if requested_port <= last_port {
            last_port + 1
        } else {
            requested_port
        };
        last_port = port;

        if let Value::Object(service_map) = &mut merged_service {
            service_map.insert("port".to_string(), serde_json::json!(port));
        }

        let stanza_value = serde_json::json!({
            "type": device_type,
            "service": merged_service,
            "device": merged_device,
        });

        let stanza: StanzaConfig = serde_json::from_value(stanza_value)?;

        resolved.push(ResolvedStanza {
            name: name.clone(),
            stanza,
        });
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_stanzas(json: Value) -> KenzyConfig {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn stanza_inherits_unset_fields_from_default() {
        let config = config_with_stanzas(serde_json::json!({
            "type": "multi",
            "default": { "service": { "host": "127.0.0.1", "api_key": "shh" } },
            "stt": { "type": "kenzy.stt", "service": { "port": 9701 } },
        }));

        let resolved = resolve_stanzas(&config).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].stanza.service.host, "127.0.0.1");
        assert_eq!(resolved[0].stanza.service.api_key.as_deref(), Some("shh"));
        assert_eq!(resolved[0].stanza.service.port, 9701);
    }

    #[test]
    fn ports_ascend_without_collision() {
        let config = config_with_stanzas(serde_json::json!({
            "type": "multi",
            "a": { "type": "kenzy.stt", "service": { "port": 9700 } },
            "b": { "type": "kenzy.tts", "service": { "port": 9700 } },
        }));

        let resolved = resolve_stanzas(&config).unwrap();
        assert_eq!(resolved[0].stanza.service.port, 9700);
        assert_eq!(resolved[1].stanza.service.port, 9701);
    }

    #[test]
    fn skillmanager_defaults_to_upnp_server() {
        let config = config_with_stanzas(serde_json::json!({
            "type": "multi",
            "hub": { "type": "kenzy.skillmanager", "service": { "port": 9700 } },
        }));

        let resolved = resolve_stanzas(&config).unwrap();
        assert_eq!(resolved[0].stanza.service.upnp.mode, crate::model::UpnpMode::Server);
    }
}
