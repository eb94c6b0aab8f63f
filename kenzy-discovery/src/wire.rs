//! SSDP text wire format: header sets, message builders, and parsing.

use std::collections::HashMap;
use std::net::Ipv4Addr;

pub const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
pub const MULTICAST_PORT: u16 = 1900;
pub const SERVICE_TYPE: &str = "urn:schemas-upnp-org:device:Kenzy-Core:1";
pub const SERVICE_DISCRIMINATOR: &str = "core";

/// Everything needed to build a NOTIFY/M-SEARCH-response message for this
/// node's advertised service.
pub struct Advertisement<'a> {
    pub usn_uuid: &'a str,
    pub service_url: &'a str,
    pub server_banner: &'a str,
}

fn header_block(ad: &Advertisement<'_>, nts_or_status: &str, is_response: bool) -> String {
    let host = format!("{MULTICAST_GROUP}:{MULTICAST_PORT}");
    let location = format!("{}/upnp.xml", ad.service_url.trim_end_matches('/'));
    let usn = format!("uuid:{}::{}", ad.usn_uuid, SERVICE_TYPE);

    let mut lines = Vec::new();
    if is_response {
        lines.push("HTTP/1.1 200 OK".to_string());
    } else {
        lines.push("NOTIFY * HTTP/1.1".to_string());
    }
    lines.push(format!("HOST: {host}"));
    lines.push("CACHE-CONTROL: max-age=1800".to_string());
    lines.push(format!("LOCATION: {location}"));
    lines.push(format!("NT: {SERVICE_TYPE}"));
    lines.push(format!("NTS: {nts_or_status}"));
    lines.push(format!("SERVER: {}", ad.server_banner));
    lines.push(format!("USN: {usn}"));
    lines.push(format!("X-KENZY-SERVICE: {SERVICE_DISCRIMINATOR}"));
    lines.push(String::new());
    lines.push(String::new());
    lines.join("\r\n")
}

pub fn build_notify_alive(ad: &Advertisement<'_>) -> String {
    header_block(ad, "ssdp:alive", false)
}

pub fn build_notify_byebye(ad: &Advertisement<'_>) -> String {
    header_block(ad, "ssdp:byebye", false)
}

pub fn build_search_response(ad: &Advertisement<'_>) -> String {
    header_block(ad, "ssdp:alive", true)
}

pub fn build_msearch(search_target: &str) -> String {
    let host = format!("{MULTICAST_GROUP}:{MULTICAST_PORT}");
    [
        "M-SEARCH * HTTP/1.1".to_string(),
        format!("HOST: {host}"),
        "MAN: \"ssdp:discover\"".to_string(),
        "MX: 3".to_string(),
        format!("ST: {search_target}"),
        String::new(),
        String::new(),
    ]
    .join("\r\n")
}

/// A parsed SSDP message: its start line plus a case-insensitive header map
/// (keys upper-cased).
#[derive(Debug, Clone)]
pub struct SsdpMessage {
    pub start_line: String,
    pub headers: HashMap<String, String>,
}

impl SsdpMessage {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_uppercase()).map(String::as_str)
    }

    pub fn is_msearch(&self) -> bool {
        self.start_line.starts_with("M-SEARCH")
    }

    pub fn is_notify(&self) -> bool {
        self.start_line.starts_with("NOTIFY")
    }

    pub fn is_search_response(&self) -> bool {
        self.start_line.starts_with("HTTP/1.1 200")
    }

    pub fn is_kenzy_core(&self) -> bool {
        self.header("X-KENZY-SERVICE")
            .map(|v| v.eq_ignore_ascii_case(SERVICE_DISCRIMINATOR))
            .unwrap_or(false)
    }

    /// True if an `M-SEARCH`'s `ST` should be answered by this service.
    pub fn matches_search_target(&self) -> bool {
        match self.header("ST") {
            Some(st) => st.eq_ignore_ascii_case("ssdp:all") || st == SERVICE_TYPE,
            None => false,
        }
    }
}

pub fn parse(raw: &str) -> Option<SsdpMessage> {
    let mut lines = raw.split("\r\n");
    let start_line = lines.next()?.trim().to_string();
    if start_line.is_empty() {
        return None;
    }

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_uppercase(), value.trim().to_string());
        }
    }

    Some(SsdpMessage { start_line, headers })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ad() -> Advertisement<'static> {
        Advertisement {
            usn_uuid: "abc-123",
            service_url: "http://192.168.1.5:9700",
            server_banner: "kenzy/0.1",
        }
    }

    #[test]
    fn notify_alive_contains_required_headers() {
        let msg = build_notify_alive(&ad());
        let parsed = parse(&msg).unwrap();
        assert!(parsed.is_notify());
        assert_eq!(parsed.header("NTS"), Some("ssdp:alive"));
        assert_eq!(
            parsed.header("LOCATION"),
            Some("http://192.168.1.5:9700/upnp.xml")
        );
        assert!(parsed.is_kenzy_core());
    }

    #[test]
    fn msearch_is_recognized_and_matches_wildcard() {
        let msg = build_msearch("ssdp:all");
        let parsed = parse(&msg).unwrap();
        assert!(parsed.is_msearch());
        assert!(parsed.matches_search_target());
    }

    #[test]
    fn msearch_for_unrelated_target_does_not_match() {
        let msg = build_msearch("urn:schemas-upnp-org:device:SomeOtherThing:1");
        let parsed = parse(&msg).unwrap();
        assert!(!parsed.matches_search_target());
    }

    #[test]
    fn search_response_round_trips() {
        let msg = build_search_response(&ad());
        let parsed = parse(&msg).unwrap();
        assert!(parsed.is_search_response());
        assert!(parsed.is_kenzy_core());
    }
}
