use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// A monotonic time source.
///
/// Time is expressed as the [`Duration`] elapsed since the device booted.
pub trait Clock {
    /// Returns the time elapsed since boot.
    fn now(&self) -> Duration;
}

/// A [`Clock`] backed by the operating system monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    boot: Instant,
}

impl SystemClock {
    /// Creates a [`SystemClock`] which starts counting now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            boot: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.boot.elapsed()
    }
}

/// A manually driven [`Clock`].
///
/// Clones share the same time, so a test can keep one handle while the node
/// owns another.
#[derive(Debug, Clone, Default)]
pub struct MockClock {
    now: Rc<Cell<Duration>>,
}

impl MockClock {
    /// Creates a [`MockClock`] at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a [`MockClock`] at the given time.
    #[must_use]
    pub fn at(now: Duration) -> Self {
        let clock = Self::default();
        clock.set(now);
        clock
    }

    /// Moves time forward.
    pub fn advance(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
    }

    /// Sets the current time.
    pub fn set(&self, now: Duration) {
        self.now.set(now);
    }
}

impl Clock for MockClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{Clock, MockClock};

    #[test]
    fn clones_share_time() {
        let clock = MockClock::new();
        let other = clock.clone();

        clock.advance(Duration::from_millis(250));
        assert_eq!(other.now(), Duration::from_millis(250));

        other.set(Duration::from_secs(3));
        assert_eq!(clock.now(), Duration::from_secs(3));
    }
}
