use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use dashmap::mapref::one::Ref;

use crate::error::RegistryError;
use crate::peer::PeerRecord;

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Tracks every peer that has registered with this node.
///
/// There is no TTL sweep: a peer that registers and then crashes without
/// sending `shutdown` stays listed (and routable) until this process
/// restarts. That matches the original server's behavior and is a deliberate
/// choice, not an oversight.
#[derive(Default)]
pub struct PeerRegistry {
    peers: DashMap<String, PeerRecord>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self {
            peers: DashMap::new(),
        }
    }

    /// Inserts a new peer or refreshes an existing one's `last_seen` and
    /// `accepts` list. Logs at info only the first time a URL is seen;
    /// refreshes are logged at debug to keep steady-state logs quiet.
    pub fn register(
        &self,
        url: impl Into<String>,
        device_type: impl Into<String>,
        location: Option<String>,
        group: Option<String>,
        accepts: Vec<String>,
    ) -> Result<(), RegistryError> {
        let url = url.into();
        if url.is_empty() {
            return Err(RegistryError::EmptyUrl);
        }

        let last_seen = now_secs();
        let device_type = device_type.into();

        match self.peers.entry(url.clone()) {
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                log::info!("registered new peer {url} ({device_type})");
                slot.insert(PeerRecord {
                    url,
                    device_type,
                    location,
                    group,
                    accepts,
                    active: true,
                    last_seen,
                });
            }
            dashmap::mapref::entry::Entry::Occupied(mut slot) => {
                log::debug!("refreshed peer {url}");
                let record = slot.get_mut();
                record.device_type = device_type;
                record.location = location;
                record.group = group;
                record.accepts = accepts;
                record.active = true;
                record.last_seen = last_seen;
            }
        }

        Ok(())
    }

    /// Removes a peer, e.g. on an explicit `shutdown` command.
    pub fn evict(&self, url: &str) -> Option<PeerRecord> {
        self.peers.remove(url).map(|(_, record)| record)
    }

    pub fn get(&self, url: &str) -> Option<Ref<'_, String, PeerRecord>> {
        self.peers.get(url)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Snapshots peers matching `location` (falling back to `group`, then to
    /// every active peer accepting `action`) before routing, per the
    /// single-writer/no-iterate-while-mutating policy.
    pub fn route_candidates(
        &self,
        action: &str,
        location: Option<&str>,
        group: Option<&str>,
    ) -> Vec<PeerRecord> {
        let accepting: Vec<PeerRecord> = self
            .peers
            .iter()
            .filter(|entry| entry.active && entry.accepts(action))
            .map(|entry| entry.value().clone())
            .collect();

        if let Some(location) = location {
            let by_location: Vec<PeerRecord> = accepting
                .iter()
                .filter(|p| p.location.as_deref() == Some(location))
                .cloned()
                .collect();
            if !by_location.is_empty() {
                return by_location;
            }
        }

        if let Some(group) = group {
            let by_group: Vec<PeerRecord> = accepting
                .iter()
                .filter(|p| p.group.as_deref() == Some(group))
                .cloned()
                .collect();
            if !by_group.is_empty() {
                return by_group;
            }
        }

        accepting
    }

    pub fn snapshot(&self) -> Vec<PeerRecord> {
        self.peers.iter().map(|e| e.value().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_refresh_does_not_duplicate() {
        let registry = PeerRegistry::new();
        registry
            .register("http://a:9700", "kenzy.stt", None, None, vec!["mute".into()])
            .unwrap();
        registry
            .register(
                "http://a:9700",
                "kenzy.stt",
                Some("kitchen".into()),
                None,
                vec!["mute".into(), "unmute".into()],
            )
            .unwrap();

        assert_eq!(registry.len(), 1);
        let record = registry.get("http://a:9700").unwrap();
        assert_eq!(record.location.as_deref(), Some("kitchen"));
        assert!(record.accepts("unmute"));
    }

    #[test]
    fn empty_url_is_rejected() {
        let registry = PeerRegistry::new();
        assert!(matches!(
            registry.register("", "kenzy.stt", None, None, vec![]),
            Err(RegistryError::EmptyUrl)
        ));
    }

    #[test]
    fn route_candidates_prefer_location_then_group_then_any() {
        let registry = PeerRegistry::new();
        registry
            .register(
                "http://a:9700",
                "kenzy.stt",
                Some("kitchen".into()),
                Some("downstairs".into()),
                vec!["mute".into()],
            )
            .unwrap();
        registry
            .register(
                "http://b:9700",
                "kenzy.stt",
                Some("den".into()),
                Some("downstairs".into()),
                vec!["mute".into()],
            )
            .unwrap();

        let by_location = registry.route_candidates("mute", Some("kitchen"), None);
        assert_eq!(by_location.len(), 1);
        assert_eq!(by_location[0].url, "http://a:9700");

        let by_group = registry.route_candidates("mute", Some("nowhere"), Some("downstairs"));
        assert_eq!(by_group.len(), 2);

        let any = registry.route_candidates("mute", None, None);
        assert_eq!(any.len(), 2);
    }

    #[test]
    fn eviction_removes_peer() {
        let registry = PeerRegistry::new();
        registry
            .register("http://a:9700", "kenzy.stt", None, None, vec![])
            .unwrap();
        assert!(registry.evict("http://a:9700").is_some());
        assert!(registry.is_empty());
    }
}
