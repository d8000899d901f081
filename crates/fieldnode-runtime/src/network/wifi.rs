use std::cmp::Reverse;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::{AccessPointConfig, NetworkConfig};

use super::{LinkStatus, Radio, WifiMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScanMatch {
    id: usize,
    rssi: i8,
    bssid: [u8; 6],
}

#[derive(Debug, Clone)]
struct KnownNetwork {
    config: AccessPointConfig,
    scan: Option<ScanMatch>,
    // Failed during the current cycle.
    failed: bool,
}

impl KnownNetwork {
    const fn new(config: AccessPointConfig) -> Self {
        Self {
            config,
            scan: None,
            failed: false,
        }
    }
}

// Attempts and mode timers record the time they started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    FastConnect { attempt: Option<Duration> },
    Scanning { started: Option<Duration> },
    MultiConnect { index: usize, attempt: Option<Duration> },
    HiddenConnect { index: usize, attempt: Option<Duration> },
    CyclePower { off: bool },
    Connected,
    CaptivePortal { opened: Option<Duration> },
}

impl State {
    const fn mode(self) -> WifiMode {
        match self {
            Self::FastConnect { .. } => WifiMode::FastConnect,
            Self::Scanning { .. } => WifiMode::Scanning,
            Self::MultiConnect { .. } => WifiMode::MultiConnect,
            Self::HiddenConnect { .. } => WifiMode::HiddenConnect,
            Self::CyclePower { .. } => WifiMode::CyclePower,
            Self::Connected => WifiMode::Connected,
            Self::CaptivePortal { .. } => WifiMode::CaptivePortal,
        }
    }
}

enum Attempt {
    Pending,
    Succeeded,
    Failed,
}

fn poll_attempt(radio: &dyn Radio, started: Duration, now: Duration, timeout: Duration) -> Attempt {
    match radio.link_status() {
        LinkStatus::Connected => Attempt::Succeeded,
        LinkStatus::Failed | LinkStatus::Disconnected => Attempt::Failed,
        LinkStatus::Idle | LinkStatus::Connecting => {
            if now.saturating_sub(started) >= timeout {
                Attempt::Failed
            } else {
                Attempt::Pending
            }
        }
    }
}

/// What the WiFi state machine reports to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WifiEvent {
    /// The link came up.
    Connected,
    /// The link went down.
    Disconnected,
    /// New credentials were received through the captive portal.
    Provisioned(AccessPointConfig),
    /// Too many captive portal sessions ended without credentials.
    RestartRequired,
}

/// The WiFi acquisition state machine.
///
/// The machine walks through its modes, one radio operation per
/// [`tick`](WifiMachine::tick), until a link is up:
///
/// 1. `FastConnect` reconnects to the network the radio joined last.
/// 2. `Scanning` looks for known networks and ranks them by signal
///    strength.
/// 3. `MultiConnect` tries the scanned networks, strongest first.
/// 4. `HiddenConnect` tries every network which has not failed yet, without
///    a scan, to reach networks which do not broadcast their name.
/// 5. `CyclePower` powers the radio off and back on, then starts over.
///
/// After enough power cycles the machine opens a captive portal to receive
/// new credentials. Every attempt and every mode is bounded by a timeout, so
/// no mode is a sink.
#[derive(Debug)]
pub struct WifiMachine {
    config: NetworkConfig,
    state: State,
    networks: Vec<KnownNetwork>,
    cycles: u32,
    portal_timeouts: u32,
}

impl WifiMachine {
    /// Creates a [`WifiMachine`] knowing the given networks.
    #[must_use]
    pub fn new(config: NetworkConfig, networks: &[AccessPointConfig]) -> Self {
        Self {
            config,
            state: State::FastConnect { attempt: None },
            networks: networks.iter().cloned().map(KnownNetwork::new).collect(),
            cycles: 0,
            portal_timeouts: 0,
        }
    }

    /// Returns the current mode.
    #[must_use]
    pub const fn mode(&self) -> WifiMode {
        self.state.mode()
    }

    /// Returns the known networks, in the order they are tried.
    pub fn networks(&self) -> impl Iterator<Item = &AccessPointConfig> {
        self.networks.iter().map(|network| &network.config)
    }

    /// Returns the number of consecutive power cycles without a link.
    #[must_use]
    pub const fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Returns the number of consecutive captive portal timeouts.
    #[must_use]
    pub const fn portal_timeouts(&self) -> u32 {
        self.portal_timeouts
    }

    /// Adds a network, replacing one with the same name.
    pub fn add_network(&mut self, config: AccessPointConfig) {
        self.networks
            .retain(|network| network.config.ssid != config.ssid);
        self.networks.insert(0, KnownNetwork::new(config));
    }

    /// Returns how long to wait before the next tick, when the machine needs
    /// more than the regular period.
    #[must_use]
    pub const fn wait(&self) -> Option<Duration> {
        match self.state {
            State::CyclePower { off: true } => Some(self.config.power_off_time),
            _ => None,
        }
    }

    /// Runs one step of the machine.
    pub fn tick(&mut self, now: Duration, radio: &mut dyn Radio) -> Option<WifiEvent> {
        match self.state {
            State::FastConnect { attempt: None } => {
                match radio.cached_network() {
                    Some(ssid) => match radio.reconnect() {
                        Ok(()) => {
                            debug!("Reconnecting to {ssid}");
                            self.state = State::FastConnect {
                                attempt: Some(now),
                            };
                        }
                        Err(e) => {
                            warn!("Could not reconnect to {ssid}: {e}");
                            self.enter(State::Scanning { started: None });
                        }
                    },
                    None => self.enter(State::Scanning { started: None }),
                }
                None
            }
            State::FastConnect {
                attempt: Some(started),
            } => match poll_attempt(&*radio, started, now, self.config.fast_connect_timeout) {
                Attempt::Succeeded => self.connected(),
                Attempt::Failed => {
                    radio.disconnect();
                    self.enter(State::Scanning { started: None });
                    None
                }
                Attempt::Pending => None,
            },
            State::Scanning { started: None } => {
                for network in &mut self.networks {
                    network.scan = None;
                    network.failed = false;
                }
                match radio.start_scan() {
                    Ok(()) => self.state = State::Scanning { started: Some(now) },
                    Err(e) => {
                        warn!("Could not start a scan: {e}");
                        self.enter(State::HiddenConnect {
                            index: 0,
                            attempt: None,
                        });
                    }
                }
                None
            }
            State::Scanning {
                started: Some(started),
            } => {
                match radio.poll_scan() {
                    Ok(Some(count)) => {
                        let known = self.rank(count, &*radio);
                        info!("Scan found {count} networks, {known} of them known");
                        if known > 0 {
                            self.enter(State::MultiConnect {
                                index: 0,
                                attempt: None,
                            });
                        } else {
                            self.enter(State::HiddenConnect {
                                index: 0,
                                attempt: None,
                            });
                        }
                    }
                    Ok(None) => {
                        if now.saturating_sub(started) >= self.config.scan_timeout {
                            warn!("Scan timed out");
                            self.enter(State::HiddenConnect {
                                index: 0,
                                attempt: None,
                            });
                        }
                    }
                    Err(e) => {
                        warn!("Scan failed: {e}");
                        self.enter(State::HiddenConnect {
                            index: 0,
                            attempt: None,
                        });
                    }
                }
                None
            }
            State::MultiConnect {
                index,
                attempt: None,
            } => {
                self.start_scanned_attempt(index, now, radio);
                None
            }
            State::MultiConnect {
                index,
                attempt: Some(started),
            } => match poll_attempt(&*radio, started, now, self.config.connect_timeout) {
                Attempt::Succeeded => self.connected(),
                Attempt::Failed => {
                    self.attempt_failed(index, radio);
                    self.state = State::MultiConnect {
                        index: index + 1,
                        attempt: None,
                    };
                    None
                }
                Attempt::Pending => None,
            },
            State::HiddenConnect {
                index,
                attempt: None,
            } => {
                self.start_direct_attempt(index, now, radio);
                None
            }
            State::HiddenConnect {
                index,
                attempt: Some(started),
            } => match poll_attempt(&*radio, started, now, self.config.connect_timeout) {
                Attempt::Succeeded => self.connected(),
                Attempt::Failed => {
                    self.attempt_failed(index, radio);
                    self.state = State::HiddenConnect {
                        index: index + 1,
                        attempt: None,
                    };
                    None
                }
                Attempt::Pending => None,
            },
            State::CyclePower { off: false } => {
                radio.power_off();
                self.state = State::CyclePower { off: true };
                None
            }
            State::CyclePower { off: true } => {
                radio.power_on();
                self.cycles += 1;
                let threshold = self.config.captive_portal_after_cycles;
                if threshold > 0 && self.cycles >= threshold {
                    self.cycles = 0;
                    self.enter(State::CaptivePortal { opened: None });
                } else {
                    self.enter(State::FastConnect { attempt: None });
                }
                None
            }
            State::Connected => {
                if radio.link_status() == LinkStatus::Connected {
                    return None;
                }
                warn!("WiFi link lost");
                self.enter(State::FastConnect { attempt: None });
                Some(WifiEvent::Disconnected)
            }
            State::CaptivePortal { opened: None } => {
                match radio.start_access_point(self.config.portal_ssid) {
                    Ok(()) => {
                        info!("Captive portal open on {}", self.config.portal_ssid);
                        self.state = State::CaptivePortal { opened: Some(now) };
                        None
                    }
                    Err(e) => {
                        error!("Could not open the captive portal: {e}");
                        self.portal_timed_out()
                    }
                }
            }
            State::CaptivePortal {
                opened: Some(opened),
            } => {
                if let Some(config) = radio.poll_provisioning() {
                    radio.stop_access_point();
                    info!("Received credentials for {}", config.ssid);
                    self.portal_timeouts = 0;
                    self.add_network(config.clone());
                    self.enter(State::FastConnect { attempt: None });
                    return Some(WifiEvent::Provisioned(config));
                }
                if now.saturating_sub(opened) >= self.config.captive_portal_timeout {
                    radio.stop_access_point();
                    return self.portal_timed_out();
                }
                None
            }
        }
    }

    fn enter(&mut self, state: State) {
        let (from, to) = (self.state.mode(), state.mode());
        if from != to {
            info!("WiFi mode {from:?} -> {to:?}");
        }
        self.state = state;
    }

    fn connected(&mut self) -> Option<WifiEvent> {
        self.cycles = 0;
        self.portal_timeouts = 0;
        self.enter(State::Connected);
        Some(WifiEvent::Connected)
    }

    fn portal_timed_out(&mut self) -> Option<WifiEvent> {
        self.portal_timeouts += 1;
        warn!(
            "Captive portal closed without credentials, {} times in a row",
            self.portal_timeouts
        );
        self.enter(State::FastConnect { attempt: None });
        (self.portal_timeouts >= self.config.restart_after_portal_timeouts)
            .then_some(WifiEvent::RestartRequired)
    }

    // Keeps the strongest result of each known network, then sorts the
    // scanned networks first, strongest first.
    fn rank(&mut self, count: usize, radio: &dyn Radio) -> usize {
        for id in 0..count {
            let Some(result) = radio.scan_result(id) else {
                continue;
            };
            for network in self
                .networks
                .iter_mut()
                .filter(|network| network.config.ssid == result.ssid)
            {
                if network.scan.is_none_or(|scan| result.rssi > scan.rssi) {
                    network.scan = Some(ScanMatch {
                        id,
                        rssi: result.rssi,
                        bssid: result.bssid,
                    });
                }
            }
        }

        self.networks
            .sort_by_key(|network| Reverse(network.scan.map(|scan| scan.rssi)));
        self.networks
            .iter()
            .filter(|network| network.scan.is_some())
            .count()
    }

    fn start_scanned_attempt(&mut self, index: usize, now: Duration, radio: &mut dyn Radio) {
        let Some((config, scan)) = self
            .networks
            .get(index)
            .and_then(|network| Some((network.config.clone(), network.scan?)))
        else {
            self.enter(State::HiddenConnect {
                index: 0,
                attempt: None,
            });
            return;
        };

        let unchanged = radio
            .scan_result(scan.id)
            .is_some_and(|result| result.ssid == config.ssid && result.bssid == scan.bssid);
        if !unchanged {
            debug!("Skipping {}: its scan result changed", config.ssid);
            self.state = State::MultiConnect {
                index: index + 1,
                attempt: None,
            };
            return;
        }

        debug!("Connecting to {} at {} dBm", config.ssid, scan.rssi);
        match radio.connect(&config.ssid, &config.password, Some(scan.id)) {
            Ok(()) => {
                self.state = State::MultiConnect {
                    index,
                    attempt: Some(now),
                };
            }
            Err(e) => {
                warn!("Could not connect to {}: {e}", config.ssid);
                self.networks[index].failed = true;
                self.state = State::MultiConnect {
                    index: index + 1,
                    attempt: None,
                };
            }
        }
    }

    fn start_direct_attempt(&mut self, index: usize, now: Duration, radio: &mut dyn Radio) {
        let Some(next) = self
            .networks
            .iter()
            .skip(index)
            .position(|network| !network.failed)
            .map(|offset| index + offset)
        else {
            self.enter(State::CyclePower { off: false });
            return;
        };

        let config = self.networks[next].config.clone();
        debug!("Connecting to {} without a scan", config.ssid);
        match radio.connect(&config.ssid, &config.password, None) {
            Ok(()) => {
                self.state = State::HiddenConnect {
                    index: next,
                    attempt: Some(now),
                };
            }
            Err(e) => {
                warn!("Could not connect to {}: {e}", config.ssid);
                self.networks[next].failed = true;
                self.state = State::HiddenConnect {
                    index: next + 1,
                    attempt: None,
                };
            }
        }
    }

    fn attempt_failed(&mut self, index: usize, radio: &mut dyn Radio) {
        radio.disconnect();
        if let Some(network) = self.networks.get_mut(index) {
            warn!("Could not connect to {}", network.config.ssid);
            network.failed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::config::{AccessPointConfig, NetworkConfig};

    use super::super::WifiMode;
    use super::super::mock::{MockRadio, MockRadioHandle};
    use super::{WifiEvent, WifiMachine};

    const TICK: Duration = Duration::from_millis(100);

    struct Harness {
        machine: WifiMachine,
        radio: MockRadio,
        handle: MockRadioHandle,
        now: Duration,
    }

    impl Harness {
        fn new(config: NetworkConfig, known: &[AccessPointConfig]) -> Self {
            let radio = MockRadio::new();
            let handle = radio.handle();
            Self {
                machine: WifiMachine::new(config, known),
                radio,
                handle,
                now: Duration::ZERO,
            }
        }

        fn step(&mut self) -> Option<WifiEvent> {
            let event = self.machine.tick(self.now, &mut self.radio);
            self.now += self.machine.wait().unwrap_or(TICK);
            event
        }

        // Returns the visited modes, without repetitions.
        fn run_until(&mut self, mode: WifiMode, limit: usize) -> Vec<WifiMode> {
            let mut visited = vec![self.machine.mode()];
            for _ in 0..limit {
                let _ = self.step();
                let current = self.machine.mode();
                if visited.last() != Some(&current) {
                    visited.push(current);
                }
                if current == mode {
                    return visited;
                }
            }
            panic!("never reached {mode:?}, visited {visited:?}");
        }
    }

    #[test]
    fn no_network_ends_in_a_power_cycle() {
        let mut harness = Harness::new(
            NetworkConfig::new(),
            &[AccessPointConfig::new("orchard", "apple")],
        );

        let _ = harness.run_until(WifiMode::CyclePower, 20);
        let visited = harness.run_until(WifiMode::FastConnect, 5);
        assert_eq!(visited, [WifiMode::CyclePower, WifiMode::FastConnect]);
        assert_eq!(harness.handle.power_cycles(), 1);
        assert!(harness.handle.is_powered());
        assert_eq!(harness.machine.cycles(), 1);
        assert_eq!(
            harness.handle.attempts(),
            [("orchard".to_owned(), None)]
        );

        // Every cycle walks through the same modes.
        let visited = harness.run_until(WifiMode::CyclePower, 20);
        assert_eq!(
            visited,
            [
                WifiMode::FastConnect,
                WifiMode::Scanning,
                WifiMode::HiddenConnect,
                WifiMode::CyclePower,
            ]
        );
    }

    #[test]
    fn strongest_network_first() {
        let mut harness = Harness::new(
            NetworkConfig::new(),
            &[
                AccessPointConfig::new("X", "wrong"),
                AccessPointConfig::new("Y", "wrong"),
            ],
        );
        harness.handle.add_network("X", "x", -70, [1; 6]);
        harness.handle.add_network("Y", "y", -60, [2; 6]);
        harness.handle.add_network("Y", "y", -40, [3; 6]);

        let visited = harness.run_until(WifiMode::CyclePower, 20);
        assert_eq!(
            visited,
            [
                WifiMode::FastConnect,
                WifiMode::Scanning,
                WifiMode::MultiConnect,
                WifiMode::HiddenConnect,
                WifiMode::CyclePower,
            ]
        );
        // The strongest BSSID of Y, then X. Both failed, so the direct
        // attempts skip them.
        assert_eq!(
            harness.handle.attempts(),
            [("Y".to_owned(), Some(2)), ("X".to_owned(), Some(0))]
        );
        assert_eq!(
            harness
                .machine
                .networks()
                .map(|network| network.ssid.as_str())
                .collect::<Vec<_>>(),
            ["Y", "X"]
        );
    }

    #[test]
    fn reconnects_after_a_link_loss() {
        let mut harness = Harness::new(
            NetworkConfig::new(),
            &[AccessPointConfig::new("barn", "hay")],
        );
        harness.handle.add_network("barn", "hay", -55, [4; 6]);

        let mut events = Vec::new();
        for _ in 0..10 {
            events.extend(harness.step());
        }
        assert_eq!(events, [WifiEvent::Connected]);
        assert_eq!(harness.machine.mode(), WifiMode::Connected);

        harness.handle.clear_networks();
        assert_eq!(harness.step(), Some(WifiEvent::Disconnected));
        assert_eq!(harness.machine.mode(), WifiMode::FastConnect);

        // The radio remembers the network, but it is gone.
        harness.handle.add_network("barn", "hay", -55, [4; 6]);
        let visited = harness.run_until(WifiMode::Connected, 10);
        assert_eq!(visited, [WifiMode::FastConnect, WifiMode::Connected]);
    }

    #[test]
    fn hidden_network() {
        let mut harness = Harness::new(
            NetworkConfig::new(),
            &[AccessPointConfig::new("cellar", "wine")],
        );
        harness.handle.add_hidden_network("cellar", "wine", -67);

        let visited = harness.run_until(WifiMode::Connected, 10);
        assert_eq!(
            visited,
            [
                WifiMode::FastConnect,
                WifiMode::Scanning,
                WifiMode::HiddenConnect,
                WifiMode::Connected,
            ]
        );
        assert_eq!(harness.handle.attempts(), [("cellar".to_owned(), None)]);
    }

    #[test]
    fn captive_portal_provisioning() {
        let mut harness = Harness::new(NetworkConfig::new().portal_ssid("setup"), &[]);

        let _ = harness.run_until(WifiMode::CaptivePortal, 100);
        assert_eq!(harness.handle.power_cycles(), 3);
        let _ = harness.step();
        assert_eq!(harness.handle.portal().as_deref(), Some("setup"));

        harness.handle.add_network("greenhouse", "tomato", -48, [5; 6]);
        let credentials = AccessPointConfig::new("greenhouse", "tomato");
        harness.handle.provision(credentials.clone());
        assert_eq!(harness.step(), Some(WifiEvent::Provisioned(credentials)));
        assert_eq!(harness.machine.mode(), WifiMode::FastConnect);
        assert_eq!(harness.handle.portal(), None);

        let _ = harness.run_until(WifiMode::Connected, 10);
        assert_eq!(
            harness.machine.networks().next().map(|network| network.ssid.as_str()),
            Some("greenhouse")
        );
    }

    #[test]
    fn portal_timeouts_request_a_restart() {
        let config = NetworkConfig::new()
            .captive_portal_after_cycles(1)
            .captive_portal_timeout(Duration::from_secs(10))
            .restart_after_portal_timeouts(2);
        let mut harness = Harness::new(config, &[]);

        let mut events = Vec::new();
        for _ in 0..1000 {
            events.extend(harness.step());
            if !events.is_empty() {
                break;
            }
        }

        assert_eq!(events, [WifiEvent::RestartRequired]);
        assert_eq!(harness.machine.portal_timeouts(), 2);
        assert_eq!(harness.handle.portal(), None);
        assert_eq!(harness.machine.mode(), WifiMode::FastConnect);
    }
}
