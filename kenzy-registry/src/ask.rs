use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

/// A callback invoked with the raw text the peer sent next, and whatever
/// context type the caller's bus uses. Generic so this crate doesn't need to
/// depend on the bus crate's envelope types.
pub type AskCallback<C> = Box<dyn FnOnce(&str, &C) + Send>;

struct AskEntry<C> {
    deadline: SystemTime,
    callback: AskCallback<C>,
}

/// Tracks in-flight `ask` calls so the hub can route the *next* thing a peer
/// says back to whoever asked, instead of through normal intent parsing.
///
/// One entry per peer URL: the deadline an `ask` expires at and the callback
/// to run if a reply lands before it does. A new `ask` on the same URL
/// replaces any entry already there.
pub struct AskTable<C> {
    entries: Mutex<HashMap<String, AskEntry<C>>>,
}

impl<C> Default for AskTable<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> AskTable<C> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a callback for `url`, valid for `timeout`. Replaces any
    /// existing entry for the same URL.
    pub fn expect(&self, url: impl Into<String>, timeout: Duration, callback: AskCallback<C>) {
        let deadline = SystemTime::now() + timeout;
        self.entries
            .lock()
            .unwrap()
            .insert(url.into(), AskEntry { deadline, callback });
    }

    /// If `url` has a live (non-expired) entry, removes and returns its
    /// callback. Expired or absent entries return `None`, and an expired
    /// entry is dropped as a side effect so the table doesn't grow stale.
    pub fn take_if_pending(&self, url: &str) -> Option<AskCallback<C>> {
        let mut entries = self.entries.lock().unwrap();
        let is_live = entries
            .get(url)
            .map(|entry| entry.deadline > SystemTime::now())
            .unwrap_or(false);

        if is_live {
            entries.remove(url).map(|entry| entry.callback)
        } else {
            entries.remove(url);
            None
        }
    }

    pub fn is_pending(&self, url: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .get(url)
            .map(|entry| entry.deadline > SystemTime::now())
            .unwrap_or(false)
    }

    pub fn cancel(&self, url: &str) {
        self.entries.lock().unwrap().remove(url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn pending_ask_is_consumed_once() {
        let table: AskTable<()> = AskTable::new();
        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();

        table.expect(
            "http://a:9700",
            Duration::from_secs(5),
            Box::new(move |_text, _ctx| called_clone.store(true, Ordering::SeqCst)),
        );

        assert!(table.is_pending("http://a:9700"));
        let callback = table.take_if_pending("http://a:9700").expect("entry present");
        callback("yes", &());
        assert!(called.load(Ordering::SeqCst));

        assert!(table.take_if_pending("http://a:9700").is_none());
    }

    #[test]
    fn expired_ask_is_not_delivered() {
        let table: AskTable<()> = AskTable::new();
        table.expect(
            "http://a:9700",
            Duration::from_millis(0),
            Box::new(|_text, _ctx| panic!("must not run")),
        );
        std::thread::sleep(Duration::from_millis(5));
        assert!(!table.is_pending("http://a:9700"));
        assert!(table.take_if_pending("http://a:9700").is_none());
    }
}
