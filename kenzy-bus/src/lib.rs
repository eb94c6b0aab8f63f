//! The command bus: envelope types, routing, and pre/post chaining.
//!
//! A `Bus` fronts exactly one local device (through [`LocalDispatch`]) and
//! knows how to reach every other peer either directly (`url` set on the
//! command) or by fanning out over the peer registry by `location`, then
//! `group`, then any accepting peer. Outbound HTTP is behind
//! [`OutboundSender`] so this crate never depends on `kenzy-transport`.

mod command;
mod context;
mod dispatch;
mod error;
mod response;

pub use command::Command;
pub use context::Context;
pub use dispatch::{LocalDispatch, OutboundSender};
pub use error::BusError;
pub use response::Response;

use std::sync::Arc;
use std::time::Duration;

use kenzy_registry::{AskTable, PeerRegistry};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Caps how many fire-and-forget sends run concurrently, so a broad fan-out
/// can't exhaust sockets or file descriptors.
const MAX_CONCURRENT_SENDS: usize = 16;

pub struct Bus {
    local_url: String,
    service_url: String,
    registry: Arc<PeerRegistry>,
    ask_table: Arc<AskTable<Context>>,
    local: Arc<dyn LocalDispatch>,
    outbound: Arc<dyn OutboundSender>,
    send_pool: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl Bus {
    pub fn new(
        local_url: impl Into<String>,
        service_url: impl Into<String>,
        registry: Arc<PeerRegistry>,
        ask_table: Arc<AskTable<Context>>,
        local: Arc<dyn LocalDispatch>,
        outbound: Arc<dyn OutboundSender>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            local_url: local_url.into(),
            service_url: service_url.into(),
            registry,
            ask_table,
            local,
            outbound,
            send_pool: Arc::new(Semaphore::new(MAX_CONCURRENT_SENDS)),
            shutdown,
        }
    }

    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    pub fn ask_table(&self) -> &Arc<AskTable<Context>> {
        &self.ask_table
    }

    pub fn is_hub(&self) -> bool {
        self.local_url == self.service_url
    }

    /// The context this node stamps on commands it originates.
    pub fn local_context(&self) -> Context {
        Context::new(self.local_url.clone(), "kenzy.core")
    }

    /// Handles a command addressed to this node: `register`/`shutdown` are
    /// intercepted, everything else is routed to the local device if it
    /// accepts the verb.
    pub async fn command(&self, action: &str, payload: Value, context: Context) -> Response {
        let verb = action.trim().to_lowercase();

        if verb == "register" {
            return self.handle_register(payload);
        }

        if verb == "shutdown" {
            self.shutdown.cancel();
            return Response::success_empty();
        }

        if self.local.accepts().iter().any(|a| a == &verb) {
            return self.local.invoke(&verb, payload, &context).await;
        }

        Response::failure("Unrecognized command.")
    }

    fn handle_register(&self, payload: Value) -> Response {
        if !self.is_hub() {
            // Non-hub nodes relay registration upward; callers are expected
            // to use `send_request` with a `Command::register` instead of
            // calling `command` directly in that case.
            return Response::failure("Not the hub; cannot register peers.");
        }

        let url = match payload.get("url").and_then(Value::as_str) {
            Some(u) if !u.is_empty() => u.to_string(),
            _ => return Response::failure("Register payload missing url."),
        };
        let device_type = payload
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let location = payload
            .get("location")
            .and_then(Value::as_str)
            .map(str::to_string);
        let group = payload
            .get("group")
            .and_then(Value::as_str)
            .map(str::to_string);
        let accepts = payload
            .get("accepts")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        match self.registry.register(url, device_type, location, group, accepts) {
            Ok(()) => Response::success_empty(),
            Err(err) => Response::failure(err.to_string()),
        }
    }

    /// Sends `cmd`, first its `pre` children in order, then the command
    /// itself, then its `post` children. Each send is routed individually:
    /// an explicit `cmd.url` wins, otherwise the registry resolves by
    /// `location`/`group`/any-accepting-peer.
    ///
    /// `wait` mirrors the original's synchronous-vs-threadpool split: `true`
    /// awaits every send before returning, `false` spawns them on the bus's
    /// bounded send pool and returns immediately.
    pub async fn send_request(&self, cmd: Command, wait: bool) -> bool {
        let mut ok = true;

        for child in &cmd.pre {
            if !self.dispatch_one(child.clone(), wait).await {
                ok = false;
            }
        }

        if !self.dispatch_one(cmd.clone(), wait).await {
            ok = false;
        }

        for child in &cmd.post {
            if !self.dispatch_one(child.clone(), wait).await {
                ok = false;
            }
        }

        ok
    }

    async fn dispatch_one(&self, cmd: Command, wait: bool) -> bool {
        let context = if cmd.context.is_empty() {
            self.local_context()
        } else {
            cmd.context.clone()
        };

        let targets = self.resolve_targets(&cmd, &context);
        if targets.is_empty() {
            log::warn!("no recipient found for action {:?}", cmd.action);
            return false;
        }

        if wait {
            let mut ok = true;
            for url in targets {
                if self.send_to(&url, &cmd, &context).await.is_err() {
                    ok = false;
                }
            }
            ok
        } else {
            for url in targets {
                let outbound = self.outbound.clone();
                let permit = self.send_pool.clone();
                let cmd = cmd.clone();
                let context = context.clone();
                tokio::spawn(async move {
                    let _permit = permit.acquire_owned().await;
                    let envelope = serde_json::json!({
                        "action": cmd.action,
                        "payload": cmd.payload,
                        "context": context,
                    });
                    if let Err(err) = outbound.send(&url, &envelope, cmd.timeout_ms).await {
                        log::debug!("fire-and-forget send to {url} failed: {err}");
                    }
                });
            }
            true
        }
    }

    fn resolve_targets(&self, cmd: &Command, context: &Context) -> Vec<String> {
        if let Some(url) = &cmd.url {
            return vec![url.clone()];
        }

        if context.location.is_some() || context.group.is_some() {
            return self
                .registry
                .route_candidates(&cmd.action, context.location.as_deref(), context.group.as_deref())
                .into_iter()
                .map(|peer| peer.url)
                .collect();
        }

        vec![self.service_url.clone()]
    }

    async fn send_to(&self, url: &str, cmd: &Command, context: &Context) -> anyhow::Result<Response> {
        let envelope = serde_json::json!({
            "action": cmd.action,
            "payload": cmd.payload,
            "context": context,
        });
        let timeout_ms = cmd.timeout_ms.unwrap_or(5_000);
        self.outbound.send(url, &envelope, Some(timeout_ms)).await
    }
}

/// Default re-register tick for peer nodes, matching the original's 20s
/// cadence (`core.py::_register`'s 40 * 0.5s poll).
pub const REREGISTER_INTERVAL: Duration = Duration::from_secs(20);

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoDevice {
        accepted: Vec<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LocalDispatch for EchoDevice {
        fn accepts(&self) -> Vec<String> {
            self.accepted.clone()
        }

        async fn invoke(&self, action: &str, _payload: Value, _context: &Context) -> Response {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Response::success(serde_json::json!({ "echo": action }))
        }
    }

    struct NullSender;

    #[async_trait]
    impl OutboundSender for NullSender {
        async fn send(
            &self,
            _url: &str,
            _envelope: &Value,
            _timeout_ms: Option<u64>,
        ) -> anyhow::Result<Response> {
            Ok(Response::success_empty())
        }
    }

    fn test_bus(local: Arc<dyn LocalDispatch>) -> Bus {
        Bus::new(
            "http://hub:9700",
            "http://hub:9700",
            Arc::new(PeerRegistry::new()),
            Arc::new(AskTable::new()),
            local,
            Arc::new(NullSender),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn accepted_verb_reaches_local_device() {
        let device = Arc::new(EchoDevice {
            accepted: vec!["mute".into()],
            calls: AtomicUsize::new(0),
        });
        let bus = test_bus(device.clone());

        let resp = bus.command("mute", Value::Null, Context::default()).await;
        assert!(resp.is_success());
        assert_eq!(device.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_verb_fails_with_expected_message() {
        let device = Arc::new(EchoDevice {
            accepted: vec!["mute".into()],
            calls: AtomicUsize::new(0),
        });
        let bus = test_bus(device);

        let resp = bus.command("dance", Value::Null, Context::default()).await;
        assert_eq!(resp.errors(), Some("Unrecognized command."));
    }

    #[tokio::test]
    async fn register_populates_registry_on_hub() {
        let device = Arc::new(EchoDevice {
            accepted: vec![],
            calls: AtomicUsize::new(0),
        });
        let bus = test_bus(device);

        let payload = serde_json::json!({
            "url": "http://a:9700",
            "type": "kenzy.stt",
            "accepts": ["mute", "unmute"],
        });
        let resp = bus.command("register", payload, Context::default()).await;
        assert!(resp.is_success());
        assert_eq!(bus.registry().len(), 1);
    }

    #[tokio::test]
    async fn shutdown_cancels_token() {
        let device = Arc::new(EchoDevice {
            accepted: vec![],
            calls: AtomicUsize::new(0),
        });
        let shutdown = CancellationToken::new();
        let bus = Bus::new(
            "http://hub:9700",
            "http://hub:9700",
            Arc::new(PeerRegistry::new()),
            Arc::new(AskTable::new()),
            device,
            Arc::new(NullSender),
            shutdown.clone(),
        );

        bus.command("shutdown", Value::Null, Context::default()).await;
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn send_request_routes_pre_primary_post_in_order() {
        let device = Arc::new(EchoDevice {
            accepted: vec![],
            calls: AtomicUsize::new(0),
        });
        let bus = test_bus(device);

        let cmd = Command::speak_with_mute_guard("hi").with_url("http://a:9700");
        assert!(bus.send_request(cmd, true).await);
    }
}
