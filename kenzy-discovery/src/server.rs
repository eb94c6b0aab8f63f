use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::DiscoveryError;
use crate::sockets::bind_multicast_sockets;
use crate::wire::{self, Advertisement, MULTICAST_GROUP, MULTICAST_PORT};

/// Server-mode SSDP advertiser: periodic `NOTIFY ssdp:alive`, `M-SEARCH`
/// responder, and a single `ssdp:byebye` on shutdown.
///
/// `start()`/`stop()` are idempotent — calling `start()` twice without an
/// intervening `stop()` is a no-op, matching the contract in the original
/// `UPNPServer.start`/`stop`.
pub struct SsdpServer {
    usn_uuid: String,
    server_banner: String,
    announce_interval: Duration,
    sockets: Mutex<Option<Vec<Arc<UdpSocket>>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl SsdpServer {
    pub fn new(usn_uuid: impl Into<String>, server_banner: impl Into<String>) -> Self {
        Self {
            usn_uuid: usn_uuid.into(),
            server_banner: server_banner.into(),
            announce_interval: Duration::from_secs(30),
            sockets: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
            cancel: Mutex::new(None),
        }
    }

    pub fn with_announce_interval(mut self, interval: Duration) -> Self {
        self.announce_interval = interval;
        self
    }

    pub async fn start(&self, service_url: String) -> Result<(), DiscoveryError> {
        if self.cancel.lock().await.is_some() {
            return Ok(());
        }

        let sockets = bind_multicast_sockets().await?;
        let cancel = CancellationToken::new();
        *self.cancel.lock().await = Some(cancel.clone());
        *self.sockets.lock().await = Some(sockets.clone());

        let mut handles = Vec::with_capacity(sockets.len() + 1);

        for socket in &sockets {
            let socket = socket.clone();
            let cancel = cancel.clone();
            let usn_uuid = self.usn_uuid.clone();
            let server_banner = self.server_banner.clone();
            let service_url = service_url.clone();

            handles.push(tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        result = socket.recv_from(&mut buf) => {
                            match result {
                                Ok((len, addr)) => {
                                    handle_datagram(&socket, &buf[..len], addr, &usn_uuid, &service_url, &server_banner).await;
                                }
                                Err(err) => log::error!("SSDP recv error: {err}"),
                            }
                        }
                    }
                }
            }));
        }

        {
            let sockets = sockets.clone();
            let cancel = cancel.clone();
            let usn_uuid = self.usn_uuid.clone();
            let server_banner = self.server_banner.clone();
            let interval = self.announce_interval;

            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            let ad = Advertisement {
                                usn_uuid: &usn_uuid,
                                service_url: &service_url,
                                server_banner: &server_banner,
                            };
                            let msg = wire::build_notify_alive(&ad);
                            send_to_group(&sockets, msg.as_bytes()).await;
                        }
                    }
                }
            }));
        }

        *self.tasks.lock().await = handles;
        log::info!("SSDP server advertising {service_url} on {} interface(s)", sockets.len());
        Ok(())
    }

    pub async fn stop(&self, service_url: &str) {
        let cancel = self.cancel.lock().await.take();
        let Some(cancel) = cancel else { return };

        if let Some(sockets) = self.sockets.lock().await.take() {
            let ad = Advertisement {
                usn_uuid: &self.usn_uuid,
                service_url,
                server_banner: &self.server_banner,
            };
            let msg = wire::build_notify_byebye(&ad);
            send_to_group(&sockets, msg.as_bytes()).await;
        }

        cancel.cancel();
        for handle in self.tasks.lock().await.drain(..) {
            handle.abort();
        }
    }

    pub async fn is_running(&self) -> bool {
        self.cancel.lock().await.is_some()
    }
}

async fn send_to_group(sockets: &[Arc<UdpSocket>], msg: &[u8]) {
    let target = format!("{MULTICAST_GROUP}:{MULTICAST_PORT}");
    for socket in sockets {
        if let Err(err) = socket.send_to(msg, &target).await {
            log::warn!("SSDP send error on {:?}: {err}", socket.local_addr());
        }
    }
}

async fn handle_datagram(
    socket: &UdpSocket,
    data: &[u8],
    addr: std::net::SocketAddr,
    usn_uuid: &str,
    service_url: &str,
    server_banner: &str,
) {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Some(msg) = wire::parse(text) else {
        return;
    };

    if !msg.is_msearch() || !msg.matches_search_target() {
        return;
    }

    let ad = Advertisement {
        usn_uuid,
        service_url,
        server_banner,
    };
    let response = wire::build_search_response(&ad);

    if let Err(err) = socket.send_to(response.as_bytes(), addr).await {
        log::warn!("SSDP M-SEARCH reply failed to {addr}: {err}");
    }
}
