use std::cell::Cell;
use std::rc::Rc;

use crate::config::{AccessPointConfig, Secrets};
use crate::error::Result;

mod manager;
/// Mock network drivers for host testing and simulation.
pub mod mock;
mod session;
mod time;
mod wifi;

pub use manager::{NetworkDrivers, NetworkManager};
pub use session::SessionKeeper;
pub use time::TimeKeeper;
pub use wifi::{WifiEvent, WifiMachine};

/// A network found by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    /// Network name.
    pub ssid: String,
    /// Signal strength, in dBm.
    pub rssi: i8,
    /// Hardware address of the access point.
    pub bssid: [u8; 6],
}

/// The state of the WiFi link as reported by the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// No connection was requested.
    Idle,
    /// A connection attempt is running.
    Connecting,
    /// The link is up.
    Connected,
    /// The last connection attempt failed.
    Failed,
    /// The link went down.
    Disconnected,
}

/// The WiFi radio of a device.
///
/// Every method returns right away: scans and connection attempts are
/// started here and polled on later ticks.
pub trait Radio {
    /// Returns the name of the network the radio joined last, if any.
    fn cached_network(&self) -> Option<String>;

    /// Reconnects to the cached network.
    ///
    /// # Errors
    ///
    /// An error is returned when the attempt cannot start.
    fn reconnect(&mut self) -> Result<()>;

    /// Starts a scan.
    ///
    /// # Errors
    ///
    /// An error is returned when the scan cannot start.
    fn start_scan(&mut self) -> Result<()>;

    /// Returns the number of networks found once the scan is complete.
    ///
    /// # Errors
    ///
    /// An error is returned when the scan failed.
    fn poll_scan(&mut self) -> Result<Option<usize>>;

    /// Returns a result of the last scan.
    fn scan_result(&self, id: usize) -> Option<ScanResult>;

    /// Connects to a network.
    ///
    /// A scan identifier pins the attempt to the access point found by the
    /// scan.
    ///
    /// # Errors
    ///
    /// An error is returned when the attempt cannot start.
    fn connect(&mut self, ssid: &str, password: &str, scan_id: Option<usize>) -> Result<()>;

    /// Returns the state of the link.
    fn link_status(&self) -> LinkStatus;

    /// Drops the link or aborts a connection attempt.
    fn disconnect(&mut self);

    /// Powers the radio off.
    fn power_off(&mut self);

    /// Powers the radio on.
    fn power_on(&mut self);

    /// Returns the signal strength of the link, in dBm.
    fn rssi(&self) -> Option<i8>;

    /// Opens an access point serving the provisioning portal.
    ///
    /// # Errors
    ///
    /// An error is returned when the access point cannot start.
    fn start_access_point(&mut self, ssid: &str) -> Result<()>;

    /// Closes the provisioning access point.
    fn stop_access_point(&mut self);

    /// Returns the credentials submitted through the portal, once.
    fn poll_provisioning(&mut self) -> Option<AccessPointConfig>;
}

/// The upstream session with the server.
pub trait Session {
    /// Starts opening the session.
    ///
    /// # Errors
    ///
    /// An error is returned when the attempt cannot start.
    fn open(&mut self, secrets: &Secrets) -> Result<()>;

    /// Returns whether the session is open.
    fn is_open(&self) -> bool;

    /// Closes the session.
    fn close(&mut self);
}

/// The wall clock synchronization service.
pub trait TimeSync {
    /// Starts a synchronization.
    ///
    /// # Errors
    ///
    /// An error is returned when the request cannot be sent.
    fn start(&mut self) -> Result<()>;

    /// Returns whether the wall clock is synchronized.
    fn is_synced(&self) -> bool;
}

/// The mode of the WiFi state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WifiMode {
    /// Reconnecting to the cached network.
    #[default]
    FastConnect,
    /// Looking for known networks.
    Scanning,
    /// Trying the scanned networks, strongest first.
    MultiConnect,
    /// Trying every known network directly.
    HiddenConnect,
    /// Power cycling the radio.
    CyclePower,
    /// Connected.
    Connected,
    /// Serving the provisioning portal.
    CaptivePortal,
}

/// A copy of the network state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkSnapshot {
    /// WiFi mode.
    pub mode: WifiMode,
    /// Whether the upstream session is open.
    pub session_up: bool,
    /// Signal strength of the WiFi link, in dBm.
    pub rssi: Option<i8>,
    /// Whether the wall clock is synchronized.
    pub time_synced: bool,
}

/// The network state, readable by every task.
///
/// Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct NetworkStatus {
    snapshot: Rc<Cell<NetworkSnapshot>>,
}

impl NetworkStatus {
    /// Creates a [`NetworkStatus`] for a disconnected device.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the state.
    #[must_use]
    pub fn snapshot(&self) -> NetworkSnapshot {
        self.snapshot.get()
    }

    /// Returns the WiFi mode.
    #[must_use]
    pub fn mode(&self) -> WifiMode {
        self.snapshot().mode
    }

    /// Returns whether the WiFi link is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.mode() == WifiMode::Connected
    }

    /// Returns whether the upstream session is open.
    #[must_use]
    pub fn is_session_up(&self) -> bool {
        self.snapshot().session_up
    }

    /// Returns the signal strength of the WiFi link.
    #[must_use]
    pub fn rssi(&self) -> Option<i8> {
        self.snapshot().rssi
    }

    pub(crate) fn publish(&self, snapshot: NetworkSnapshot) {
        self.snapshot.set(snapshot);
    }
}
