use std::collections::VecDeque;
use std::sync::Mutex;

const CAPACITY: usize = 200;

/// A small ring buffer of recent log lines, surfaced through the skill
/// hub's `status` response (`data.logs`) the way the original's
/// `KenzyLogger` kept an in-memory tail alongside the real logger.
pub struct KenzyLogger {
    target: &'static str,
    entries: Mutex<VecDeque<String>>,
}

impl KenzyLogger {
    pub fn new(target: &'static str) -> Self {
        Self {
            target,
            entries: Mutex::new(VecDeque::with_capacity(CAPACITY)),
        }
    }

    fn push(&self, line: String) {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= CAPACITY {
            entries.pop_front();
        }
        entries.push_back(line);
    }

    pub fn info(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        log::info!(target: self.target, "{message}");
        self.push(format!("INFO: {message}"));
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        log::debug!(target: self.target, "{message}");
        self.push(format!("DEBUG: {message}"));
    }

    pub fn error(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        log::error!(target: self.target, "{message}");
        self.push(format!("ERROR: {message}"));
    }

    /// Most recent first, matching the original's reversed tail.
    pub fn tail(&self) -> Vec<String> {
        self.entries.lock().unwrap().iter().rev().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_returns_newest_first() {
        let logger = KenzyLogger::new("test");
        logger.info("first");
        logger.info("second");
        assert_eq!(logger.tail()[0], "INFO: second");
    }

    #[test]
    fn ring_buffer_drops_oldest_past_capacity() {
        let logger = KenzyLogger::new("test");
        for i in 0..(CAPACITY + 10) {
            logger.info(format!("line {i}"));
        }
        assert_eq!(logger.entries.lock().unwrap().len(), CAPACITY);
    }
}
