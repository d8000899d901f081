use std::time::Duration;

use tracing::{info, warn};

use fieldnode::message::Message;
use fieldnode::system::Register;

use crate::config::{NetworkConfig, Secrets};
use crate::outbox::Outbox;

use super::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Down { next_attempt: Duration },
    Opening { started: Duration },
    Up { since: Duration },
}

/// Keeps the upstream session open while the WiFi link is up.
///
/// Each time the session opens, the device registers itself by sending its
/// firmware version and the names of the peripheral and task types it
/// supports.
#[derive(Debug)]
pub struct SessionKeeper {
    state: State,
    register: Register<'static>,
}

impl SessionKeeper {
    /// Creates a [`SessionKeeper`] announcing the device with `register`.
    #[must_use]
    pub const fn new(register: Register<'static>) -> Self {
        Self {
            state: State::Down {
                next_attempt: Duration::ZERO,
            },
            register,
        }
    }

    /// Returns whether the session is open.
    #[must_use]
    pub const fn is_up(&self) -> bool {
        matches!(self.state, State::Up { .. })
    }

    /// Runs one step of the session.
    pub fn tick(
        &mut self,
        now: Duration,
        wifi_up: bool,
        session: &mut dyn Session,
        secrets: &Secrets,
        outbox: &Outbox,
        config: &NetworkConfig,
    ) {
        if !wifi_up {
            if !matches!(self.state, State::Down { .. }) {
                session.close();
                info!("Session closed: the WiFi link is down");
            }
            self.state = State::Down { next_attempt: now };
            return;
        }

        match self.state {
            State::Down { next_attempt } if now >= next_attempt => match session.open(secrets) {
                Ok(()) => self.state = State::Opening { started: now },
                Err(e) => {
                    warn!("Could not open the session: {e}");
                    self.state = State::Down {
                        next_attempt: now + config.session_retry,
                    };
                }
            },
            State::Down { .. } => {}
            State::Opening { started } => {
                if session.is_open() {
                    info!("Session open");
                    outbox.send(Message::Register(self.register.clone()));
                    self.state = State::Up { since: now };
                } else if now.saturating_sub(started) >= config.session_connect_timeout {
                    session.close();
                    warn!("Session timed out, retrying in {:?}", config.session_retry);
                    self.state = State::Down {
                        next_attempt: now + config.session_retry,
                    };
                }
            }
            State::Up { since } => {
                if !session.is_open() {
                    warn!("Session lost after {:?}", now.saturating_sub(since));
                    self.state = State::Down {
                        next_attempt: now + config.session_retry,
                    };
                }
            }
        }
    }
}
