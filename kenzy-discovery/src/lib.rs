//! SSDP/UPnP discovery: server-mode advertising and client-mode resolution.

mod client;
mod error;
mod server;
mod sockets;
mod wire;

pub use client::{SsdpClient, DEFAULT_SEARCH_WINDOW};
pub use error::DiscoveryError;
pub use server::SsdpServer;
pub use sockets::primary_ipv4;
pub use wire::{SERVICE_TYPE, SERVICE_DISCRIMINATOR};

use std::time::Duration;

/// Which role this node's discovery layer plays, mirroring `service.upnp.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Server,
    Client,
    Standalone,
}

/// Unifies server/client/standalone discovery behind the two-operation
/// contract: `start()` (idempotent; blocks for the resolve window in client
/// mode) and `stop()` (byebye + socket teardown in server mode, a no-op
/// otherwise).
pub struct DiscoveryService {
    mode: Mode,
    server: Option<SsdpServer>,
    client: Option<SsdpClient>,
}

impl DiscoveryService {
    pub fn new(mode: Mode, usn_uuid: impl Into<String>, server_banner: impl Into<String>) -> Self {
        match mode {
            Mode::Server => Self {
                mode,
                server: Some(SsdpServer::new(usn_uuid, server_banner)),
                client: None,
            },
            Mode::Client => Self {
                mode,
                server: None,
                client: Some(SsdpClient::new()),
            },
            Mode::Standalone => Self {
                mode,
                server: None,
                client: None,
            },
        }
    }

    pub fn with_client_window(mut self, window: Duration) -> Self {
        if let Some(client) = self.client.take() {
            self.client = Some(client.with_window(window));
        }
        self
    }

    /// Server mode: starts advertising `service_url`. Client mode: resolves
    /// a hub and returns its `service_url`. Standalone: no-op, returns
    /// `service_url` unchanged.
    pub async fn start(&self, service_url: &str) -> Result<String, DiscoveryError> {
        match self.mode {
            Mode::Server => {
                self.server
                    .as_ref()
                    .expect("server mode always carries an SsdpServer")
                    .start(service_url.to_string())
                    .await?;
                Ok(service_url.to_string())
            }
            Mode::Client => {
                match self
                    .client
                    .as_ref()
                    .expect("client mode always carries an SsdpClient")
                    .resolve()
                    .await
                {
                    Ok(resolved) => Ok(resolved),
                    Err(err) => {
                        log::warn!("SSDP client resolution failed, keeping existing service_url: {err}");
                        Ok(service_url.to_string())
                    }
                }
            }
            Mode::Standalone => Ok(service_url.to_string()),
        }
    }

    pub async fn stop(&self, service_url: &str) {
        if let Some(server) = &self.server {
            server.stop(service_url).await;
        }
    }
}
