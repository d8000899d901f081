use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::config::{AccessPointConfig, Secrets};
use crate::error::{Error, ErrorKind, Result};

use super::{LinkStatus, Radio, ScanResult, Session, TimeSync};

#[derive(Debug, Clone)]
struct MockAccessPoint {
    ssid: String,
    password: String,
    rssi: i8,
    bssid: [u8; 6],
    hidden: bool,
}

#[derive(Debug)]
struct RadioState {
    access_points: Vec<MockAccessPoint>,
    cached: Option<String>,
    scanning: bool,
    scan_results: Vec<ScanResult>,
    link: LinkStatus,
    connected_to: Option<usize>,
    powered: bool,
    power_cycles: usize,
    attempts: Vec<(String, Option<usize>)>,
    portal: Option<String>,
    provisioning: Option<AccessPointConfig>,
}

impl Default for RadioState {
    fn default() -> Self {
        Self {
            access_points: Vec::new(),
            cached: None,
            scanning: false,
            scan_results: Vec::new(),
            link: LinkStatus::Idle,
            connected_to: None,
            powered: true,
            power_cycles: 0,
            attempts: Vec::new(),
            portal: None,
            provisioning: None,
        }
    }
}

impl RadioState {
    fn join(&mut self, ssid: &str, password: &str) {
        let found = self
            .access_points
            .iter()
            .position(|ap| ap.ssid == ssid && ap.password == password);
        self.connected_to = found;
        if found.is_some() {
            self.link = LinkStatus::Connected;
            self.cached = Some(ssid.to_owned());
        } else {
            self.link = LinkStatus::Failed;
        }
    }
}

fn radio_off() -> Error {
    Error::new(ErrorKind::Network, "Radio is off")
}

/// A [`Radio`] simulating the access points around a device.
///
/// Scans complete on the first poll and connection attempts are resolved
/// right away. The radio is driven through a [`MockRadioHandle`].
#[derive(Debug, Default)]
pub struct MockRadio {
    state: Rc<RefCell<RadioState>>,
}

impl MockRadio {
    /// Creates a [`MockRadio`] with no access points around.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle to the radio state.
    #[must_use]
    pub fn handle(&self) -> MockRadioHandle {
        MockRadioHandle {
            state: Rc::clone(&self.state),
        }
    }
}

impl Radio for MockRadio {
    fn cached_network(&self) -> Option<String> {
        self.state.borrow().cached.clone()
    }

    fn reconnect(&mut self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if !state.powered {
            return Err(radio_off());
        }
        let Some(ssid) = state.cached.clone() else {
            return Err(Error::new(ErrorKind::Network, "No cached network"));
        };
        let password = state
            .access_points
            .iter()
            .find(|ap| ap.ssid == ssid)
            .map(|ap| ap.password.clone())
            .unwrap_or_default();
        state.join(&ssid, &password);
        Ok(())
    }

    fn start_scan(&mut self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if !state.powered {
            return Err(radio_off());
        }
        state.scanning = true;
        Ok(())
    }

    fn poll_scan(&mut self) -> Result<Option<usize>> {
        let mut state = self.state.borrow_mut();
        if !state.scanning {
            return Err(Error::new(ErrorKind::Network, "No scan in progress"));
        }
        state.scanning = false;
        state.scan_results = state
            .access_points
            .iter()
            .filter(|ap| !ap.hidden)
            .map(|ap| ScanResult {
                ssid: ap.ssid.clone(),
                rssi: ap.rssi,
                bssid: ap.bssid,
            })
            .collect();
        Ok(Some(state.scan_results.len()))
    }

    fn scan_result(&self, id: usize) -> Option<ScanResult> {
        self.state.borrow().scan_results.get(id).cloned()
    }

    fn connect(&mut self, ssid: &str, password: &str, scan_id: Option<usize>) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if !state.powered {
            return Err(radio_off());
        }
        state.attempts.push((ssid.to_owned(), scan_id));
        state.join(ssid, password);
        Ok(())
    }

    fn link_status(&self) -> LinkStatus {
        self.state.borrow().link
    }

    fn disconnect(&mut self) {
        let mut state = self.state.borrow_mut();
        state.link = LinkStatus::Idle;
        state.connected_to = None;
    }

    fn power_off(&mut self) {
        let mut state = self.state.borrow_mut();
        state.powered = false;
        state.link = LinkStatus::Idle;
        state.connected_to = None;
    }

    fn power_on(&mut self) {
        let mut state = self.state.borrow_mut();
        state.powered = true;
        state.power_cycles += 1;
    }

    fn rssi(&self) -> Option<i8> {
        let state = self.state.borrow();
        state
            .connected_to
            .and_then(|index| state.access_points.get(index))
            .map(|ap| ap.rssi)
    }

    fn start_access_point(&mut self, ssid: &str) -> Result<()> {
        self.state.borrow_mut().portal = Some(ssid.to_owned());
        Ok(())
    }

    fn stop_access_point(&mut self) {
        self.state.borrow_mut().portal = None;
    }

    fn poll_provisioning(&mut self) -> Option<AccessPointConfig> {
        self.state.borrow_mut().provisioning.take()
    }
}

/// A handle to drive and inspect a [`MockRadio`].
#[derive(Debug, Clone)]
pub struct MockRadioHandle {
    state: Rc<RefCell<RadioState>>,
}

impl MockRadioHandle {
    /// Places a broadcasting access point around the device.
    pub fn add_network(&self, ssid: &str, password: &str, rssi: i8, bssid: [u8; 6]) {
        self.state.borrow_mut().access_points.push(MockAccessPoint {
            ssid: ssid.into(),
            password: password.into(),
            rssi,
            bssid,
            hidden: false,
        });
    }

    /// Places a hidden access point around the device.
    pub fn add_hidden_network(&self, ssid: &str, password: &str, rssi: i8) {
        self.state.borrow_mut().access_points.push(MockAccessPoint {
            ssid: ssid.into(),
            password: password.into(),
            rssi,
            bssid: [0; 6],
            hidden: true,
        });
    }

    /// Sets the network the radio joined last.
    pub fn set_cached(&self, ssid: &str) {
        self.state.borrow_mut().cached = Some(ssid.into());
    }

    /// Removes every access point, dropping the link.
    pub fn clear_networks(&self) {
        let mut state = self.state.borrow_mut();
        state.access_points.clear();
        if state.link == LinkStatus::Connected {
            state.link = LinkStatus::Disconnected;
        }
        state.connected_to = None;
    }

    /// Returns the connection attempts, as network name and scan identifier.
    #[must_use]
    pub fn attempts(&self) -> Vec<(String, Option<usize>)> {
        self.state.borrow().attempts.clone()
    }

    /// Returns the results of the last scan.
    #[must_use]
    pub fn scan_results(&self) -> Vec<ScanResult> {
        self.state.borrow().scan_results.clone()
    }

    /// Returns whether the radio is powered.
    #[must_use]
    pub fn is_powered(&self) -> bool {
        self.state.borrow().powered
    }

    /// Returns how many times the radio was powered back on.
    #[must_use]
    pub fn power_cycles(&self) -> usize {
        self.state.borrow().power_cycles
    }

    /// Returns the name of the provisioning access point, while open.
    #[must_use]
    pub fn portal(&self) -> Option<String> {
        self.state.borrow().portal.clone()
    }

    /// Submits credentials through the provisioning portal.
    pub fn provision(&self, access_point: AccessPointConfig) {
        self.state.borrow_mut().provisioning = Some(access_point);
    }
}

#[derive(Debug, Default)]
struct SessionState {
    reachable: bool,
    open: bool,
    opened: usize,
    token: Option<String>,
}

/// A [`Session`] opening as soon as the server is reachable.
///
/// Clones share the same session.
#[derive(Debug, Clone, Default)]
pub struct MockSession {
    state: Rc<RefCell<SessionState>>,
}

impl MockSession {
    /// Creates a [`MockSession`] with a reachable server.
    #[must_use]
    pub fn new() -> Self {
        let session = Self::default();
        session.state.borrow_mut().reachable = true;
        session
    }

    /// Makes the server reachable or not, closing an open session.
    pub fn set_reachable(&self, reachable: bool) {
        let mut state = self.state.borrow_mut();
        state.reachable = reachable;
        if !reachable {
            state.open = false;
        }
    }

    /// Returns how many times the session was opened.
    #[must_use]
    pub fn opened(&self) -> usize {
        self.state.borrow().opened
    }

    /// Returns the token the session was last opened with.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.state.borrow().token.clone()
    }
}

impl Session for MockSession {
    fn open(&mut self, secrets: &Secrets) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.token.clone_from(&secrets.ws_token);
        if state.reachable {
            state.open = true;
            state.opened += 1;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.borrow().open
    }

    fn close(&mut self) {
        self.state.borrow_mut().open = false;
    }
}

/// A [`TimeSync`] which either always or never succeeds.
///
/// Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MockTimeSync {
    reachable: Rc<Cell<bool>>,
    synced: Rc<Cell<bool>>,
    requests: Rc<Cell<usize>>,
}

impl MockTimeSync {
    /// Creates a [`MockTimeSync`] with a reachable time server.
    #[must_use]
    pub fn new() -> Self {
        let sync = Self::default();
        sync.reachable.set(true);
        sync
    }

    /// Makes the time server reachable or not.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.set(reachable);
    }

    /// Returns how many synchronizations were started.
    #[must_use]
    pub fn requests(&self) -> usize {
        self.requests.get()
    }
}

impl TimeSync for MockTimeSync {
    fn start(&mut self) -> Result<()> {
        self.requests.set(self.requests.get() + 1);
        if self.reachable.get() {
            self.synced.set(true);
        }
        Ok(())
    }

    fn is_synced(&self) -> bool {
        self.synced.get()
    }
}
