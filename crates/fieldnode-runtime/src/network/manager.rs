use tracing::{error, info};

use fieldnode::system::Register;

use crate::config::{NetworkConfig, Secrets, Storage};
use crate::error::{Error, ErrorKind, Result};
use crate::outbox::Outbox;
use crate::task::{Context, Flow, Schedule, Task};

use super::{
    NetworkSnapshot, NetworkStatus, Radio, Session, SessionKeeper, TimeKeeper, TimeSync,
    WifiEvent, WifiMachine, WifiMode,
};

/// The drivers of the network stack.
pub struct NetworkDrivers {
    /// WiFi radio.
    pub radio: Box<dyn Radio>,
    /// Upstream session.
    pub session: Box<dyn Session>,
    /// Wall clock synchronization.
    pub time_sync: Box<dyn TimeSync>,
}

impl std::fmt::Debug for NetworkDrivers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkDrivers").finish_non_exhaustive()
    }
}

/// The system task bringing the device online and keeping it there.
///
/// Each run steps the WiFi state machine and, once the link is up, the
/// wall clock synchronization and the upstream session. The resulting state
/// is published through a [`NetworkStatus`].
pub struct NetworkManager {
    config: NetworkConfig,
    drivers: NetworkDrivers,
    storage: Box<dyn Storage>,
    secrets: Secrets,
    wifi: WifiMachine,
    time: TimeKeeper,
    session: SessionKeeper,
    status: NetworkStatus,
    outbox: Outbox,
}

impl NetworkManager {
    /// Type name.
    pub const TYPE_NAME: &'static str = "NetworkManager";

    /// Creates a [`NetworkManager`] knowing the networks listed in
    /// `secrets`.
    #[must_use]
    pub fn new(
        config: NetworkConfig,
        drivers: NetworkDrivers,
        storage: Box<dyn Storage>,
        secrets: Secrets,
        register: Register<'static>,
        outbox: Outbox,
    ) -> Self {
        Self {
            wifi: WifiMachine::new(config, &secrets.wifi_aps),
            config,
            drivers,
            storage,
            secrets,
            time: TimeKeeper::new(),
            session: SessionKeeper::new(register),
            status: NetworkStatus::new(),
            outbox,
        }
    }

    /// Returns the published network state.
    #[must_use]
    pub fn status(&self) -> NetworkStatus {
        self.status.clone()
    }

    fn provisioned(&mut self, secrets: Secrets) {
        self.secrets = secrets;
        if let Err(e) = self.storage.store_secrets(&self.secrets) {
            error!("Could not store the provisioned network: {e}");
        }
    }
}

impl std::fmt::Debug for NetworkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkManager")
            .field("config", &self.config)
            .field("wifi", &self.wifi)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl Task for NetworkManager {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn on_enable(&mut self, ctx: &mut Context<'_>) -> Result<Schedule> {
        self.time.reset(ctx.now());
        Ok(Schedule::every(self.config.tick_period))
    }

    fn callback(&mut self, ctx: &mut Context<'_>) -> Result<Flow> {
        let now = ctx.now();

        match self.wifi.tick(now, self.drivers.radio.as_mut()) {
            Some(WifiEvent::Connected) => {
                info!("WiFi connected");
                self.time.reset(now);
            }
            Some(WifiEvent::Disconnected) => info!("WiFi disconnected"),
            Some(WifiEvent::Provisioned(access_point)) => {
                let mut secrets = self.secrets.clone();
                secrets.upsert_access_point(access_point);
                self.provisioned(secrets);
            }
            Some(WifiEvent::RestartRequired) => {
                return Err(Error::new(
                    ErrorKind::Fatal,
                    format!(
                        "No network after {} captive portal timeouts",
                        self.wifi.portal_timeouts()
                    ),
                ));
            }
            None => {}
        }

        let connected = self.wifi.mode() == WifiMode::Connected;
        if connected {
            self.time
                .tick(now, self.drivers.time_sync.as_mut(), &self.config);
        }
        self.session.tick(
            now,
            connected,
            self.drivers.session.as_mut(),
            &self.secrets,
            &self.outbox,
            &self.config,
        );

        self.status.publish(NetworkSnapshot {
            mode: self.wifi.mode(),
            session_up: self.session.is_up(),
            rssi: if connected {
                self.drivers.radio.rssi()
            } else {
                None
            },
            time_synced: self.time.is_synced(),
        });

        Ok(self.wifi.wait().map_or(Flow::Continue, Flow::Delay))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use fieldnode::message::Message;

    use crate::clock::MockClock;
    use crate::config::{AccessPointConfig, MemoryStorage, NetworkConfig, Secrets};
    use crate::error::ErrorKind;
    use crate::task::TaskController;
    use crate::tests::{TestOutbox, test_register, test_task_factory};

    use super::super::mock::{MockRadio, MockRadioHandle, MockSession, MockTimeSync};
    use super::{NetworkDrivers, NetworkManager};

    const TICK: Duration = Duration::from_millis(100);

    fn manager(
        config: NetworkConfig,
        secrets: Secrets,
        storage: &MemoryStorage,
        outbox: &TestOutbox,
    ) -> (NetworkManager, MockRadioHandle, MockTimeSync) {
        let radio = MockRadio::new();
        let handle = radio.handle();
        let time_sync = MockTimeSync::new();
        let drivers = NetworkDrivers {
            radio: Box::new(radio),
            session: Box::new(MockSession::new()),
            time_sync: Box::new(time_sync.clone()),
        };
        let manager = NetworkManager::new(
            config,
            drivers,
            Box::new(storage.clone()),
            secrets,
            test_register(),
            outbox.outbox().clone(),
        );
        (manager, handle, time_sync)
    }

    #[test]
    fn comes_online() {
        let outbox = TestOutbox::new();
        let storage = MemoryStorage::default();
        let secrets = Secrets {
            wifi_aps: vec![AccessPointConfig::new("barn", "hay")],
            ..Secrets::default()
        };
        let (manager, radio, time_sync) =
            manager(NetworkConfig::new(), secrets, &storage, &outbox);
        radio.add_network("barn", "hay", -55, [7; 6]);
        let status = manager.status();

        let mut controller = TaskController::new(test_task_factory());
        let _ = controller
            .spawn_system(Box::new(manager), Duration::ZERO)
            .unwrap();
        for step in 0..20 {
            assert!(controller.tick(&MockClock::at(TICK * step)).is_empty());
        }

        assert!(status.is_connected());
        assert!(status.is_session_up());
        assert!(status.snapshot().time_synced);
        assert_eq!(status.rssi(), Some(-55));
        assert_eq!(time_sync.requests(), 1);

        let messages = outbox.drain();
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0], Message::Register(_)));
    }

    #[test]
    fn stores_provisioned_networks() {
        let outbox = TestOutbox::new();
        let storage = MemoryStorage::default();
        let config = NetworkConfig::new().captive_portal_after_cycles(1);
        let (manager, radio, _) = manager(config, Secrets::default(), &storage, &outbox);
        let status = manager.status();

        let mut controller = TaskController::new(test_task_factory());
        let _ = controller
            .spawn_system(Box::new(manager), Duration::ZERO)
            .unwrap();

        let mut now = Duration::ZERO;
        while radio.portal().is_none() {
            assert!(now < Duration::from_secs(10), "the portal never opened");
            let _ = controller.tick(&MockClock::at(now));
            now += TICK;
        }

        radio.add_network("greenhouse", "tomato", -61, [8; 6]);
        radio.provision(AccessPointConfig::new("greenhouse", "tomato"));
        for _ in 0..10 {
            let _ = controller.tick(&MockClock::at(now));
            now += TICK;
        }

        assert!(status.is_connected());
        assert_eq!(
            storage.secrets().wifi_aps,
            [AccessPointConfig::new("greenhouse", "tomato")]
        );
    }

    #[test]
    fn exhausted_portal_is_fatal() {
        let outbox = TestOutbox::new();
        let storage = MemoryStorage::default();
        let config = NetworkConfig::new()
            .captive_portal_after_cycles(1)
            .captive_portal_timeout(Duration::from_secs(1))
            .restart_after_portal_timeouts(1);
        let (manager, _, _) = manager(config, Secrets::default(), &storage, &outbox);

        let mut controller = TaskController::new(test_task_factory());
        let _ = controller
            .spawn_system(Box::new(manager), Duration::ZERO)
            .unwrap();

        let mut now = Duration::ZERO;
        let removed = loop {
            assert!(now < Duration::from_secs(60), "the manager never gave up");
            let removed = controller.tick(&MockClock::at(now));
            if !removed.is_empty() {
                break removed;
            }
            now += TICK;
        };

        assert_eq!(removed[0].uuid, None);
        assert_eq!(removed[0].type_name, NetworkManager::TYPE_NAME);
        assert_eq!(
            removed[0].error.as_ref().map(|e| e.kind()),
            Some(ErrorKind::Fatal)
        );
    }
}
