//! Log throttling
//!
//! A flapping link produces the same accept/send failure every poll tick;
//! these helpers keep one line per interval per key.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Limits how often the same message key is logged
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use bt_gamepad::utils::LogThrottler;
///
/// let throttler = LogThrottler::new(Duration::from_secs(5));
/// assert!(throttler.should_log("accept"));
/// assert!(!throttler.should_log("accept"));
/// ```
pub struct LogThrottler {
    last_logged: Mutex<HashMap<String, Instant>>,
    interval: Duration,
}

impl LogThrottler {
    pub fn new(interval: Duration) -> Self {
        Self {
            last_logged: Mutex::new(HashMap::new()),
            interval,
        }
    }

    pub fn with_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Returns `true` and records the time if `key` is not throttled
    pub fn should_log(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut map = self.last_logged.lock();
        if let Some(last) = map.get(key) {
            if now.duration_since(*last) < self.interval {
                return false;
            }
        }
        map.insert(key.to_string(), now);
        true
    }

    /// Forget `key` so its next failure logs immediately
    ///
    /// Call when the condition recovers, e.g. after a reconnect.
    pub fn clear(&self, key: &str) {
        self.last_logged.lock().remove(key);
    }

    pub fn clear_all(&self) {
        self.last_logged.lock().clear();
    }
}

impl Default for LogThrottler {
    /// 5 second interval
    fn default() -> Self {
        Self::with_secs(5)
    }
}

/// Throttled `tracing::warn!`
///
/// ```rust
/// use bt_gamepad::utils::LogThrottler;
/// use bt_gamepad::warn_throttled;
///
/// let throttler = LogThrottler::default();
/// warn_throttled!(throttler, "send", "Send failed: {}", "broken pipe");
/// ```
#[macro_export]
macro_rules! warn_throttled {
    ($throttler:expr, $key:expr, $($arg:tt)*) => {
        if $throttler.should_log($key) {
            tracing::warn!($($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_throttling() {
        let throttler = LogThrottler::new(Duration::from_millis(100));

        assert!(throttler.should_log("accept"));
        assert!(!throttler.should_log("accept"));
        assert!(!throttler.should_log("accept"));

        sleep(Duration::from_millis(150));
        assert!(throttler.should_log("accept"));
    }

    #[test]
    fn test_keys_are_independent() {
        let throttler = LogThrottler::new(Duration::from_secs(60));

        assert!(throttler.should_log("accept"));
        assert!(throttler.should_log("send"));
        assert!(!throttler.should_log("accept"));
        assert!(!throttler.should_log("send"));
    }

    #[test]
    fn test_clear() {
        let throttler = LogThrottler::new(Duration::from_secs(60));

        assert!(throttler.should_log("send"));
        assert!(!throttler.should_log("send"));

        throttler.clear("send");
        assert!(throttler.should_log("send"));

        assert!(throttler.should_log("accept"));
        throttler.clear_all();
        assert!(throttler.should_log("send"));
        assert!(throttler.should_log("accept"));
    }
}
