use serde::{Deserialize, Serialize};

/// Routing metadata attached to every command.
///
/// `location` is a user-chosen room label and `group` a broader zone; routing
/// decisions consume `location` first, then `group`, then fall back to any
/// peer accepting the verb.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Context {
    pub url: Option<String>,
    #[serde(rename = "type")]
    pub device_type: Option<String>,
    pub location: Option<String>,
    pub group: Option<String>,
}

impl Context {
    pub fn new(url: impl Into<String>, device_type: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            device_type: Some(device_type.into()),
            location: None,
            group: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.url.is_none()
            && self.device_type.is_none()
            && self.location.is_none()
            && self.group.is_none()
    }
}
