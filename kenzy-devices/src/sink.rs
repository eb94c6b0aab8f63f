use std::sync::{Arc, Weak};

use async_trait::async_trait;
use kenzy_bus::{Bus, Command};
use serde_json::Value;

/// Where a device pushes its `collect` events. Implemented over a `Bus`
/// handle so devices never reach for HTTP directly; the bus decides whether
/// that means a local hand-off or an outbound send.
#[async_trait]
pub trait CollectSink: Send + Sync {
    async fn emit(&self, payload: Value);
}

/// A device whose `CollectSink` is injected after construction, once its
/// owning `Bus` exists. Needed because a device is built *before* the `Bus`
/// that wraps it, so it can't be handed a `HubSink` at construction time.
pub trait SinkAttachable {
    fn attach_sink(&self, sink: Arc<dyn CollectSink>);
}

/// Sends `collect` up to the hub through the owning [`Bus`].
///
/// Holds a [`Weak`] reference: the `Bus` owns this device through
/// `Arc<dyn LocalDispatch>`, so a strong reference back here would be a
/// cycle neither side ever drops.
pub struct HubSink {
    bus: Weak<Bus>,
}

impl HubSink {
    pub fn new(bus: Weak<Bus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl CollectSink for HubSink {
    async fn emit(&self, payload: Value) {
        let Some(bus) = self.bus.upgrade() else {
            log::warn!("collect sink fired after bus was dropped");
            return;
        };
        let cmd = Command::collect(payload);
        bus.send_request(cmd, false).await;
    }
}

/// Placeholder sink for the window between a device's construction and its
/// owning `Bus` being built and calling [`SinkAttachable::attach_sink`].
/// Nothing should ever actually emit through it.
pub struct NoopSink;

#[async_trait]
impl CollectSink for NoopSink {
    async fn emit(&self, payload: Value) {
        log::warn!("collect emitted before sink attached, dropping: {payload}");
    }
}

#[cfg(test)]
pub struct RecordingSink {
    pub events: std::sync::Mutex<Vec<Value>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn new() -> Self {
        Self {
            events: std::sync::Mutex::new(Vec::new()),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl CollectSink for RecordingSink {
    async fn emit(&self, payload: Value) {
        self.events.lock().unwrap().push(payload);
    }
}
