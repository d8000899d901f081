use std::cell::RefCell;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tracing::{debug, info, warn};

use crate::error::{Error, ErrorKind, Result};

// Default path of the secrets file.
const DEFAULT_SECRETS_PATH: &str = "/secrets.json";
// Default name of the provisioning access point.
const DEFAULT_PORTAL_SSID: &str = "fieldnode-setup";

/// A WiFi network the device knows the credentials of.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPointConfig {
    /// Network name.
    pub ssid: String,
    /// Network password.
    #[serde(default)]
    pub password: String,
}

impl AccessPointConfig {
    /// Creates an [`AccessPointConfig`].
    #[must_use]
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            password: password.into(),
        }
    }
}

/// The credentials a device keeps across restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Secrets {
    /// Known WiFi networks.
    pub wifi_aps: Vec<AccessPointConfig>,
    /// Domain of the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub core_domain: Option<String>,
    /// Token authenticating the session with the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_token: Option<String>,
}

impl Secrets {
    /// Adds a network, replacing the credentials of a network with the same
    /// name.
    ///
    /// The network is tried first from now on.
    pub fn upsert_access_point(&mut self, access_point: AccessPointConfig) {
        self.wifi_aps.retain(|known| known.ssid != access_point.ssid);
        self.wifi_aps.insert(0, access_point);
    }
}

/// Persistent storage of the [`Secrets`].
pub trait Storage {
    /// Loads the secrets.
    ///
    /// # Errors
    ///
    /// An error is returned when the storage cannot be read.
    fn load_secrets(&self) -> Result<Secrets>;

    /// Stores the secrets.
    ///
    /// # Errors
    ///
    /// An error is returned when the storage cannot be written.
    fn store_secrets(&mut self, secrets: &Secrets) -> Result<()>;
}

/// A [`Storage`] keeping the secrets in a JSON file.
///
/// A missing file holds no secrets, and so does a malformed one, which lets
/// the captive portal provision the device again. Stores go through a
/// staging file renamed over the previous one, so an interrupted store
/// leaves the previous secrets intact.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    /// Creates a [`JsonFileStorage`] at the default path.
    #[must_use]
    pub fn new() -> Self {
        Self::at(DEFAULT_SECRETS_PATH)
    }

    /// Creates a [`JsonFileStorage`] at the given path.
    #[must_use]
    pub fn at(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Returns the path of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    // New secrets are written next to the file, then renamed over it.
    fn staging_path(&self) -> PathBuf {
        self.path.with_extension("tmp")
    }
}

impl Default for JsonFileStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for JsonFileStorage {
    fn load_secrets(&self) -> Result<Secrets> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                info!("No secrets found at {}", self.path.display());
                return Ok(Secrets::default());
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_reader(BufReader::new(file)) {
            Ok(secrets) => Ok(secrets),
            Err(e) if e.is_io() => Err(Error::new(
                ErrorKind::Storage,
                format!("Could not read {}: {e}", self.path.display()),
            )),
            // A truncated or corrupt document is replaced on the next store.
            Err(e) => {
                warn!(
                    "Ignoring the malformed secrets at {}: {e}",
                    self.path.display()
                );
                Ok(Secrets::default())
            }
        }
    }

    fn store_secrets(&mut self, secrets: &Secrets) -> Result<()> {
        let staging = self.staging_path();
        let mut writer = BufWriter::new(File::create(&staging)?);
        serde_json::to_writer_pretty(&mut writer, secrets).map_err(|e| {
            Error::new(
                ErrorKind::Storage,
                format!("Could not write {}: {e}", staging.display()),
            )
        })?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        drop(writer);

        // The previous secrets stay in place until the new ones are complete.
        fs::rename(&staging, &self.path)?;
        debug!("Stored secrets at {}", self.path.display());
        Ok(())
    }
}

/// A [`Storage`] kept in memory.
///
/// Clones share the same secrets.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    secrets: Rc<RefCell<Secrets>>,
}

impl MemoryStorage {
    /// Creates a [`MemoryStorage`] holding the given secrets.
    #[must_use]
    pub fn new(secrets: Secrets) -> Self {
        Self {
            secrets: Rc::new(RefCell::new(secrets)),
        }
    }

    /// Returns a copy of the stored secrets.
    #[must_use]
    pub fn secrets(&self) -> Secrets {
        self.secrets.borrow().clone()
    }
}

impl Storage for MemoryStorage {
    fn load_secrets(&self) -> Result<Secrets> {
        Ok(self.secrets())
    }

    fn store_secrets(&mut self, secrets: &Secrets) -> Result<()> {
        let _ = self.secrets.replace(secrets.clone());
        Ok(())
    }
}

/// Timeouts and thresholds of network acquisition.
///
/// Every mode of the WiFi state machine is bounded by one of these
/// durations, measured from the moment the mode, or the attempt, started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkConfig {
    pub(crate) tick_period: Duration,
    pub(crate) fast_connect_timeout: Duration,
    pub(crate) scan_timeout: Duration,
    pub(crate) connect_timeout: Duration,
    pub(crate) power_off_time: Duration,
    pub(crate) captive_portal_after_cycles: u32,
    pub(crate) captive_portal_timeout: Duration,
    pub(crate) restart_after_portal_timeouts: u32,
    pub(crate) portal_ssid: &'static str,
    pub(crate) time_sync_timeout: Duration,
    pub(crate) time_sync_retry: Duration,
    pub(crate) time_sync_period: Duration,
    pub(crate) session_connect_timeout: Duration,
    pub(crate) session_retry: Duration,
}

impl NetworkConfig {
    /// Creates a [`NetworkConfig`] with the default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tick_period: Duration::from_millis(100),
            fast_connect_timeout: Duration::from_secs(10),
            scan_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            power_off_time: Duration::from_secs(1),
            captive_portal_after_cycles: 3,
            captive_portal_timeout: Duration::from_secs(300),
            restart_after_portal_timeouts: 3,
            portal_ssid: DEFAULT_PORTAL_SSID,
            time_sync_timeout: Duration::from_secs(30),
            time_sync_retry: Duration::from_secs(60),
            time_sync_period: Duration::from_secs(24 * 60 * 60),
            session_connect_timeout: Duration::from_secs(10),
            session_retry: Duration::from_secs(5),
        }
    }

    /// Sets the time between two runs of the network manager.
    #[must_use]
    pub const fn tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }

    /// Sets how long reconnecting to the last network may take.
    #[must_use]
    pub const fn fast_connect_timeout(mut self, timeout: Duration) -> Self {
        self.fast_connect_timeout = timeout;
        self
    }

    /// Sets how long a scan may take.
    #[must_use]
    pub const fn scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Sets how long connecting to a single network may take.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets how long the radio stays off during a power cycle.
    #[must_use]
    pub const fn power_off_time(mut self, time: Duration) -> Self {
        self.power_off_time = time;
        self
    }

    /// Sets after how many power cycles without a network the captive
    /// portal opens.
    #[must_use]
    pub const fn captive_portal_after_cycles(mut self, cycles: u32) -> Self {
        self.captive_portal_after_cycles = cycles;
        self
    }

    /// Sets how long the captive portal stays open.
    #[must_use]
    pub const fn captive_portal_timeout(mut self, timeout: Duration) -> Self {
        self.captive_portal_timeout = timeout;
        self
    }

    /// Sets after how many consecutive captive portal timeouts the device
    /// restarts.
    #[must_use]
    pub const fn restart_after_portal_timeouts(mut self, timeouts: u32) -> Self {
        self.restart_after_portal_timeouts = timeouts;
        self
    }

    /// Sets the name of the provisioning access point.
    #[must_use]
    pub const fn portal_ssid(mut self, ssid: &'static str) -> Self {
        self.portal_ssid = ssid;
        self
    }

    /// Sets how long a time synchronization may take.
    #[must_use]
    pub const fn time_sync_timeout(mut self, timeout: Duration) -> Self {
        self.time_sync_timeout = timeout;
        self
    }

    /// Sets the time before retrying a failed time synchronization.
    #[must_use]
    pub const fn time_sync_retry(mut self, retry: Duration) -> Self {
        self.time_sync_retry = retry;
        self
    }

    /// Sets the time between two successful time synchronizations.
    #[must_use]
    pub const fn time_sync_period(mut self, period: Duration) -> Self {
        self.time_sync_period = period;
        self
    }

    /// Sets how long opening the server session may take.
    #[must_use]
    pub const fn session_connect_timeout(mut self, timeout: Duration) -> Self {
        self.session_connect_timeout = timeout;
        self
    }

    /// Sets the time before opening the server session again.
    #[must_use]
    pub const fn session_retry(mut self, retry: Duration) -> Self {
        self.session_retry = retry;
        self
    }

    /// Returns the time between two runs of the network manager.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.tick_period
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// The configuration of a [`Node`](crate::node::Node).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub(crate) network: NetworkConfig,
    pub(crate) system_monitor_interval: Duration,
    pub(crate) restart_delay: Duration,
    pub(crate) firmware_version: String,
}

impl NodeConfig {
    /// Creates a [`NodeConfig`] with the default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            network: NetworkConfig::new(),
            system_monitor_interval: Duration::from_secs(60),
            restart_delay: Duration::from_secs(10),
            firmware_version: env!("CARGO_PKG_VERSION").into(),
        }
    }

    /// Sets the network configuration.
    #[must_use]
    pub fn network(mut self, network: NetworkConfig) -> Self {
        self.network = network;
        self
    }

    /// Sets the time between two health reports.
    #[must_use]
    pub fn system_monitor_interval(mut self, interval: Duration) -> Self {
        self.system_monitor_interval = interval;
        self
    }

    /// Sets the time between a fatal error and the restart.
    #[must_use]
    pub fn restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    /// Sets the firmware version announced to the server.
    #[must_use]
    pub fn firmware_version(mut self, version: impl Into<String>) -> Self {
        self.firmware_version = version.into();
        self
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::error::ErrorKind;

    use super::{AccessPointConfig, JsonFileStorage, MemoryStorage, Secrets, Storage};

    fn scratch_file(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("fieldnode-{}-{name}.json", std::process::id()))
    }

    #[test]
    fn missing_file_holds_no_secrets() {
        let storage = JsonFileStorage::at(scratch_file("missing"));
        assert_eq!(storage.load_secrets().unwrap(), Secrets::default());
    }

    #[test]
    fn file_round_trip() {
        let path = scratch_file("round-trip");
        let mut storage = JsonFileStorage::at(&path);
        let secrets = Secrets {
            wifi_aps: vec![AccessPointConfig::new("greenhouse", "tomato")],
            core_domain: Some("core.example.org".into()),
            ws_token: None,
        };

        storage.store_secrets(&secrets).unwrap();
        assert_eq!(storage.load_secrets().unwrap(), secrets);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn truncated_file_holds_no_secrets() {
        let path = scratch_file("truncated");
        fs::write(&path, r#"{"wifi_aps": [{"ssid": "a"#).unwrap();

        let mut storage = JsonFileStorage::at(&path);
        assert_eq!(storage.load_secrets().unwrap(), Secrets::default());

        // The next store replaces the truncated document.
        let secrets = Secrets {
            wifi_aps: vec![AccessPointConfig::new("barn", "hay")],
            ..Secrets::default()
        };
        storage.store_secrets(&secrets).unwrap();
        assert_eq!(storage.load_secrets().unwrap(), secrets);
        assert!(!path.with_extension("tmp").exists());
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn unreadable_file() {
        let path = scratch_file("directory");
        fs::create_dir_all(&path).unwrap();

        let error = JsonFileStorage::at(&path).load_secrets().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Storage);
        fs::remove_dir(path).unwrap();
    }

    #[test]
    fn failed_store_keeps_the_previous_secrets() {
        let path = scratch_file("interrupted");
        let mut storage = JsonFileStorage::at(&path);
        let previous = Secrets {
            wifi_aps: vec![AccessPointConfig::new("barn", "hay")],
            ..Secrets::default()
        };
        storage.store_secrets(&previous).unwrap();

        // The staging file cannot be created.
        let staging = path.with_extension("tmp");
        fs::create_dir_all(&staging).unwrap();
        let next = Secrets {
            wifi_aps: vec![AccessPointConfig::new("greenhouse", "tomato")],
            ..Secrets::default()
        };
        assert!(storage.store_secrets(&next).is_err());

        assert_eq!(storage.load_secrets().unwrap(), previous);
        fs::remove_dir(staging).unwrap();
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn upsert_moves_the_network_first() {
        let mut secrets = Secrets {
            wifi_aps: vec![
                AccessPointConfig::new("barn", "hay"),
                AccessPointConfig::new("greenhouse", "tomato"),
            ],
            ..Secrets::default()
        };
        secrets.upsert_access_point(AccessPointConfig::new("greenhouse", "basil"));

        assert_eq!(
            secrets.wifi_aps,
            vec![
                AccessPointConfig::new("greenhouse", "basil"),
                AccessPointConfig::new("barn", "hay"),
            ]
        );

        let mut storage = MemoryStorage::default();
        let shared = storage.clone();
        storage.store_secrets(&secrets).unwrap();
        assert_eq!(shared.secrets(), secrets);
    }
}
