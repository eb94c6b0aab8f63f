//! A bounded, lossy queue for staged pipelines.
//!
//! Device pipelines (the STT capture -> VAD/ASR -> emitter chain, and the
//! analogous image pipeline) connect their stages with a queue of capacity
//! one where the newest item always wins: if the consumer hasn't drained the
//! previous item yet, `try_put` drops it rather than blocking the producer.
//! This keeps a real-time capture loop from backing up behind a slow model
//! stage.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

struct Shared<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
    notify: Notify,
}

/// The producing half of a [`channel`].
#[derive(Clone)]
pub struct Sender<T> {
    shared: Arc<Shared<T>>,
}

/// The consuming half of a [`channel`].
#[derive(Clone)]
pub struct Receiver<T> {
    shared: Arc<Shared<T>>,
}

/// Creates a bounded lossy queue with the given capacity.
///
/// A capacity of 1 gives the "newest wins" behavior the STT and image
/// pipelines rely on: once full, the oldest queued item is dropped to make
/// room for the new one instead of blocking the producer.
pub fn channel<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    assert!(capacity > 0, "channel capacity must be non-zero");

    let shared = Arc::new(Shared {
        queue: Mutex::new(VecDeque::with_capacity(capacity)),
        capacity,
        notify: Notify::new(),
    });

    (
        Sender {
            shared: shared.clone(),
        },
        Receiver { shared },
    )
}

impl<T> Sender<T> {
    /// Pushes `item` onto the queue, dropping the oldest entry if full.
    ///
    /// Never blocks. Returns the dropped item, if any, so callers can log or
    /// account for lost samples.
    pub fn try_put(&self, item: T) -> Option<T> {
        let mut queue = self.shared.queue.lock().unwrap();

        let dropped = if queue.len() >= self.shared.capacity {
            queue.pop_front()
        } else {
            None
        };

        queue.push_back(item);
        drop(queue);

        self.shared.notify.notify_one();
        dropped
    }

    /// Returns true if no consumer has taken the most recently queued item.
    pub fn is_pending(&self) -> bool {
        !self.shared.queue.lock().unwrap().is_empty()
    }
}

impl<T> Receiver<T> {
    /// Waits for and removes the next item, oldest-first.
    ///
    /// With a capacity-1 queue there is always at most one item, so this is
    /// equivalent to "wait for the latest item".
    pub async fn get(&self) -> T {
        loop {
            {
                let mut queue = self.shared.queue.lock().unwrap();
                if let Some(item) = queue.pop_front() {
                    return item;
                }
            }
            self.shared.notify.notified().await;
        }
    }

    /// Non-blocking poll: returns the next item if one is already queued.
    pub fn try_get(&self) -> Option<T> {
        self.shared.queue.lock().unwrap().pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn newest_wins_on_overflow() {
        let (tx, rx) = channel(1);

        assert_eq!(tx.try_put(1), None);
        assert_eq!(tx.try_put(2), Some(1), "capacity-1 queue must drop the oldest frame");

        assert_eq!(rx.get().await, 2);
    }

    #[tokio::test]
    async fn get_waits_for_producer() {
        let (tx, rx) = channel::<&str>(1);

        let waiter = tokio::spawn({
            let rx = rx.clone();
            async move { rx.get().await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.try_put("frame");

        assert_eq!(waiter.await.unwrap(), "frame");
    }

    #[test]
    fn try_get_is_non_blocking() {
        let (tx, rx) = channel(1);
        assert_eq!(rx.try_get(), None);

        tx.try_put(42);
        assert_eq!(rx.try_get(), Some(42));
        assert_eq!(rx.try_get(), None);
    }
}
