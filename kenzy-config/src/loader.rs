use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::model::KenzyConfig;

fn default_config_path() -> PathBuf {
    directories::ProjectDirs::from("ai", "kenzy", "kenzy")
        .map(|dirs| dirs.config_dir().join("config.yml"))
        .unwrap_or_else(|| PathBuf::from("config.yml"))
}

/// Loads a config file, or an empty default if `path` is `None` and the
/// conventional path doesn't exist either — mirroring `settings.load`'s
/// "missing file is not an error, just an empty config" behavior.
pub fn load(path: Option<&Path>) -> Result<KenzyConfig, ConfigError> {
    let resolved = match path {
        Some(p) => {
            if !p.is_file() {
                return Err(ConfigError::NotFound(p.display().to_string()));
            }
            p.to_path_buf()
        }
        None => default_config_path(),
    };

    if !resolved.is_file() {
        return Ok(empty_config());
    }

    let contents = std::fs::read_to_string(&resolved).map_err(|source| ConfigError::Io {
        path: resolved.display().to_string(),
        source,
    })?;

    parse(&resolved, &contents)
}

fn parse(path: &Path, contents: &str) -> Result<KenzyConfig, ConfigError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "yml" | "yaml" => Ok(serde_yaml::from_str(contents)?),
        "jsn" | "json" => Ok(serde_json::from_str(contents)?),
        other => Err(ConfigError::UnknownExtension(other.to_string())),
    }
}

fn empty_config() -> KenzyConfig {
    serde_json::from_value(serde_json::json!({ "type": "" })).expect("empty config is valid")
}

pub fn save(config: &KenzyConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let rendered = match ext.as_str() {
        "yml" | "yaml" => serde_yaml::to_string(config)?,
        "jsn" | "json" => serde_json::to_string_pretty(config)?,
        other => return Err(ConfigError::UnknownExtension(other.to_string())),
    };

    std::fs::write(path, rendered).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_explicit_path_is_an_error() {
        let err = load(Some(Path::new("/no/such/config.yml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn round_trips_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");

        let config: KenzyConfig = serde_json::from_value(serde_json::json!({
            "type": "kenzy.stt",
            "service": { "port": 9701 },
        }))
        .unwrap();

        save(&config, &path).unwrap();
        let loaded = load(Some(&path)).unwrap();

        assert_eq!(loaded.device_type, "kenzy.stt");
        assert_eq!(loaded.service.port, 9701);
    }

    #[test]
    fn unreadable_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "type=kenzy.stt").unwrap();

        let err = load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownExtension(_)));
    }
}
