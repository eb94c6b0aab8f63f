use std::time::Duration;

use tokio::time::Instant;

use crate::error::DiscoveryError;
use crate::sockets::bind_client_socket;
use crate::wire::{self, MULTICAST_GROUP, MULTICAST_PORT};

/// Default collection window for `M-SEARCH` replies.
pub const DEFAULT_SEARCH_WINDOW: Duration = Duration::from_secs(45);

/// Client-mode SSDP resolver: sends one `M-SEARCH`, collects replies for a
/// bounded window, and resolves the first valid `X-KENZY-SERVICE: core`
/// response's `presentationURL`.
pub struct SsdpClient {
    http: reqwest::Client,
    search_window: Duration,
}

impl Default for SsdpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SsdpClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            search_window: DEFAULT_SEARCH_WINDOW,
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.search_window = window;
        self
    }

    /// Resolves a hub's `service_url`, or an error if nothing answered
    /// within the window. Callers should keep whatever `service_url` they
    /// already had configured on failure, per the discovery contract.
    pub async fn resolve(&self) -> Result<String, DiscoveryError> {
        let socket = bind_client_socket().await?;
        let target = format!("{MULTICAST_GROUP}:{MULTICAST_PORT}");
        let msearch = wire::build_msearch(wire::SERVICE_TYPE);
        socket.send_to(msearch.as_bytes(), &target).await?;

        let deadline = Instant::now() + self.search_window;
        let mut buf = vec![0u8; 4096];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            let received = match tokio::time::timeout(remaining, socket.recv_from(&mut buf)).await
            {
                Ok(Ok(pair)) => pair,
                Ok(Err(err)) => {
                    log::warn!("SSDP client recv error: {err}");
                    continue;
                }
                Err(_) => break,
            };

            let (len, _addr) = received;
            let Ok(text) = std::str::from_utf8(&buf[..len]) else {
                continue;
            };
            let Some(msg) = wire::parse(text) else {
                continue;
            };
            if !msg.is_search_response() || !msg.is_kenzy_core() {
                continue;
            }
            let Some(location) = msg.header("LOCATION").map(str::to_string) else {
                continue;
            };

            match self.fetch_presentation_url(&location).await {
                Ok(url) => return Ok(url),
                Err(err) => {
                    log::debug!("discarding unresolvable candidate {location}: {err}");
                    continue;
                }
            }
        }

        Err(DiscoveryError::MissingPresentationUrl(
            "no SSDP response received within the search window".to_string(),
        ))
    }

    async fn fetch_presentation_url(&self, location: &str) -> Result<String, DiscoveryError> {
        let body = self
            .http
            .get(location)
            .send()
            .await
            .map_err(|source| DiscoveryError::FetchLocation {
                url: location.to_string(),
                source,
            })?
            .text()
            .await
            .map_err(|source| DiscoveryError::FetchLocation {
                url: location.to_string(),
                source,
            })?;

        parse_presentation_url(&body)
            .ok_or_else(|| DiscoveryError::MissingPresentationUrl(location.to_string()))
    }
}

fn parse_presentation_url(xml: &str) -> Option<String> {
    let root = xmltree::Element::parse(xml.as_bytes()).ok()?;
    find_presentation_url(&root)
}

fn find_presentation_url(element: &xmltree::Element) -> Option<String> {
    if element.name == "presentationURL" {
        return element.get_text().map(|text| text.trim().to_string());
    }

    for child in &element.children {
        if let xmltree::XMLNode::Element(child_el) = child {
            if let Some(found) = find_presentation_url(child_el) {
                return Some(found);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_presentation_url_from_nested_xml() {
        let xml = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <device>
    <presentationURL>http://192.168.1.5:9700/</presentationURL>
  </device>
</root>"#;
        assert_eq!(
            parse_presentation_url(xml),
            Some("http://192.168.1.5:9700/".to_string())
        );
    }

    #[test]
    fn missing_presentation_url_returns_none() {
        let xml = r#"<root><device><friendlyName>Kenzy</friendlyName></device></root>"#;
        assert_eq!(parse_presentation_url(xml), None);
    }
}
