use std::time::Duration;

use tracing::{info, warn};

use crate::config::NetworkConfig;

use super::TimeSync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle { next_check: Duration },
    Syncing { started: Duration },
}

/// Keeps the wall clock synchronized while the network is up.
///
/// A synchronization is polled across ticks and bounded by a timeout. A
/// failure is retried later and never blocks the device.
#[derive(Debug)]
pub struct TimeKeeper {
    state: State,
    synced: bool,
}

impl TimeKeeper {
    /// Creates a [`TimeKeeper`] which synchronizes on its first tick.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: State::Idle {
                next_check: Duration::ZERO,
            },
            synced: false,
        }
    }

    /// Returns whether the wall clock was synchronized at least once.
    #[must_use]
    pub const fn is_synced(&self) -> bool {
        self.synced
    }

    /// Synchronizes on the next tick.
    pub fn reset(&mut self, now: Duration) {
        self.state = State::Idle { next_check: now };
    }

    /// Runs one step of the synchronization.
    pub fn tick(&mut self, now: Duration, sync: &mut dyn TimeSync, config: &NetworkConfig) {
        match self.state {
            State::Idle { next_check } if now >= next_check => match sync.start() {
                Ok(()) => self.state = State::Syncing { started: now },
                Err(e) => {
                    warn!("Could not start the time synchronization: {e}");
                    self.state = State::Idle {
                        next_check: now + config.time_sync_retry,
                    };
                }
            },
            State::Idle { .. } => {}
            State::Syncing { started } => {
                if sync.is_synced() {
                    info!("Wall clock synchronized");
                    self.synced = true;
                    self.state = State::Idle {
                        next_check: now + config.time_sync_period,
                    };
                } else if now.saturating_sub(started) >= config.time_sync_timeout {
                    warn!(
                        "Time synchronization timed out, retrying in {:?}",
                        config.time_sync_retry
                    );
                    self.state = State::Idle {
                        next_check: now + config.time_sync_retry,
                    };
                }
            }
        }
    }
}

impl Default for TimeKeeper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::config::NetworkConfig;

    use super::super::mock::MockTimeSync;
    use super::TimeKeeper;

    #[test]
    fn retries_then_rechecks_daily() {
        let config = NetworkConfig::new()
            .time_sync_timeout(Duration::from_secs(30))
            .time_sync_retry(Duration::from_secs(60));
        let mut sync = MockTimeSync::new();
        sync.set_reachable(false);
        let mut keeper = TimeKeeper::new();

        keeper.tick(Duration::ZERO, &mut sync, &config);
        assert_eq!(sync.requests(), 1);
        keeper.tick(Duration::from_secs(29), &mut sync, &config);
        assert!(!keeper.is_synced());

        // Timed out at 30 s, retried 60 s later.
        keeper.tick(Duration::from_secs(30), &mut sync, &config);
        keeper.tick(Duration::from_secs(89), &mut sync, &config);
        assert_eq!(sync.requests(), 1);

        sync.set_reachable(true);
        keeper.tick(Duration::from_secs(90), &mut sync, &config);
        keeper.tick(Duration::from_secs(91), &mut sync, &config);
        assert_eq!(sync.requests(), 2);
        assert!(keeper.is_synced());

        let day = Duration::from_secs(24 * 60 * 60);
        keeper.tick(Duration::from_secs(90) + day, &mut sync, &config);
        assert_eq!(sync.requests(), 2);
        keeper.tick(Duration::from_secs(91) + day, &mut sync, &config);
        assert_eq!(sync.requests(), 3);
    }
}
