// Per-key throttle for status updates
//
// Shared by every concurrent run, so the timestamp table sits behind a lock.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct ThrottledNotifier {
    interval: Duration,
    last: Mutex<HashMap<String, Instant>>,
}

impl ThrottledNotifier {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(HashMap::new()),
        }
    }

    /// True at most once per interval for `key`
    pub fn should_emit(&self, key: &str) -> bool {
        self.should_emit_at(key, Instant::now())
    }

    pub fn should_emit_at(&self, key: &str, now: Instant) -> bool {
        let mut last = self.last.lock();
        match last.get(key) {
            Some(prev) if now.saturating_duration_since(*prev) < self.interval => false,
            _ => {
                last.insert(key.to_string(), now);
                true
            }
        }
    }

    /// Milestones pass unconditionally
    pub fn gate(&self, key: &str, force: bool) -> bool {
        force || self.should_emit(key)
    }

    /// Drop every key that belongs to a finished run
    pub fn forget_prefix(&self, prefix: &str) {
        self.last.lock().retain(|key, _| !key.starts_with(prefix));
    }

    pub fn tracked_keys(&self) -> usize {
        self.last.lock().len()
    }
}

impl Default for ThrottledNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_most_once_per_window() {
        let notifier = ThrottledNotifier::new(Duration::from_secs(5));
        let t0 = Instant::now();

        assert!(notifier.should_emit_at("dl:a", t0));
        assert!(!notifier.should_emit_at("dl:a", t0 + Duration::from_secs(1)));
        assert!(!notifier.should_emit_at("dl:a", t0 + Duration::from_millis(4999)));
        assert!(notifier.should_emit_at("dl:a", t0 + Duration::from_secs(5)));
        assert!(!notifier.should_emit_at("dl:a", t0 + Duration::from_secs(6)));
    }

    #[test]
    fn keys_are_independent() {
        let notifier = ThrottledNotifier::new(Duration::from_secs(9));
        let t0 = Instant::now();

        assert!(notifier.should_emit_at("dl:a", t0));
        assert!(notifier.should_emit_at("up:a:1", t0));
        assert!(!notifier.should_emit_at("dl:a", t0));
        assert!(!notifier.should_emit_at("up:a:1", t0));
    }

    #[test]
    fn clock_going_backwards_is_suppressed() {
        let notifier = ThrottledNotifier::new(Duration::from_secs(5));
        let t0 = Instant::now() + Duration::from_secs(10);

        assert!(notifier.should_emit_at("k", t0));
        assert!(!notifier.should_emit_at("k", t0 - Duration::from_secs(3)));
    }

    #[test]
    fn force_bypasses_throttle() {
        let notifier = ThrottledNotifier::new(Duration::from_secs(60));

        assert!(notifier.gate("k", false));
        assert!(!notifier.gate("k", false));
        assert!(notifier.gate("k", true));
    }

    #[test]
    fn forget_prefix_only_drops_matching_keys() {
        let notifier = ThrottledNotifier::default();
        notifier.should_emit("dl:run1");
        notifier.should_emit("up:run1:1");
        notifier.should_emit("dl:run2");

        notifier.forget_prefix("dl:run1");

        assert_eq!(notifier.tracked_keys(), 2);
        assert!(notifier.should_emit("dl:run1"));
    }
}
