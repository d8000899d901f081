use std::borrow::Cow;
use std::time::Duration;

use flume::Receiver;

use tracing::{error, info, warn};

use fieldnode::command::Command;
use fieldnode::message::Message;
use fieldnode::response::{ErrorMessage, ResultMessage};
use fieldnode::system::Register;

use crate::clock::Clock;
use crate::config::{NodeConfig, Secrets, Storage};
use crate::error::ErrorKind;
use crate::hal::{Board, Hardware};
use crate::network::{NetworkDrivers, NetworkManager, NetworkStatus};
use crate::outbox::Outbox;
use crate::peripheral::{PeripheralController, PeripheralFactory, peripherals};
use crate::task::tasks::{self, SystemMonitor};
use crate::task::{Task, TaskController, TaskEnv, TaskFactory};

// Context of the errors raised while decoding an envelope.
const NODE_CONTEXT: &str = "Node";

/// A device: its peripherals, its tasks and its network.
///
/// Every peripheral and task type is registered when the node is created,
/// before the first tick. The node then spawns its system tasks: the
/// network manager and the system monitor.
///
/// Messages for the server are queued and drained with
/// [`Node::drain_messages`].
pub struct Node {
    config: NodeConfig,
    clock: Box<dyn Clock>,
    hardware: Hardware,
    peripherals: PeripheralController,
    tasks: TaskController,
    network: NetworkStatus,
    outbox: Outbox,
    messages: Receiver<Message<'static>>,
    restart_at: Option<Duration>,
}

impl Node {
    /// Creates a [`Node`].
    ///
    /// A storage which cannot be read is fatal: the node starts without
    /// secrets and restarts once the restart delay has elapsed. Malformed
    /// secrets are not an error, see [`JsonFileStorage`](crate::config::JsonFileStorage).
    #[must_use]
    pub fn new(
        config: NodeConfig,
        board: impl Board + 'static,
        clock: impl Clock + 'static,
        drivers: NetworkDrivers,
        storage: Box<dyn Storage>,
    ) -> Self {
        let hardware = Hardware::new(board);

        let mut peripheral_factory = PeripheralFactory::new();
        peripherals::register_all(&mut peripheral_factory);
        let mut task_factory = TaskFactory::new();
        tasks::register_all(&mut task_factory);

        let register = Register {
            version: Cow::Owned(config.firmware_version.clone()),
            peripherals: peripheral_factory.factory_names().map(Cow::Borrowed).collect(),
            tasks: task_factory.factory_names().map(Cow::Borrowed).collect(),
        };

        let (outbox, messages) = Outbox::new();
        let (secrets, storage_error) = match storage.load_secrets() {
            Ok(secrets) => (secrets, None),
            Err(e) => (Secrets::default(), Some(e)),
        };

        let manager = NetworkManager::new(
            config.network,
            drivers,
            storage,
            secrets,
            register,
            outbox.clone(),
        );
        let network = manager.status();
        let monitor = SystemMonitor::new(
            hardware.clone(),
            outbox.clone(),
            network.clone(),
            config.system_monitor_interval,
        );

        let mut node = Self {
            peripherals: PeripheralController::new(peripheral_factory, hardware.clone()),
            tasks: TaskController::new(task_factory),
            config,
            clock: Box::new(clock),
            hardware,
            network,
            outbox,
            messages,
            restart_at: None,
        };

        if let Some(e) = storage_error {
            node.request_restart(&e.attributed("Storage"));
        }

        let now = node.clock.now();
        for task in [
            Box::new(manager) as Box<dyn Task>,
            Box::new(monitor),
        ] {
            if let Err(e) = node.tasks.spawn_system(task, now) {
                node.request_restart(&e.attributed("Node"));
            }
        }

        info!("Node started, firmware {}", node.config.firmware_version);
        node
    }

    /// Returns the peripherals.
    #[must_use]
    pub const fn peripherals(&self) -> &PeripheralController {
        &self.peripherals
    }

    /// Returns the tasks.
    #[must_use]
    pub const fn tasks(&self) -> &TaskController {
        &self.tasks
    }

    /// Returns the network state.
    #[must_use]
    pub const fn network(&self) -> &NetworkStatus {
        &self.network
    }

    /// Returns the time between two ticks.
    #[must_use]
    pub const fn tick_period(&self) -> Duration {
        self.config.network.period()
    }

    /// Returns when the device restarts, if a restart is pending.
    #[must_use]
    pub const fn restart_at(&self) -> Option<Duration> {
        self.restart_at
    }

    /// Processes a text envelope.
    ///
    /// An envelope which cannot be decoded is answered with an error
    /// message, echoing its request identifier when it can be recovered.
    pub fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<Command>(text) {
            Ok(command) => self.handle_command(&command),
            Err(e) => {
                error!("Invalid command: {e}");
                let mut message = ErrorMessage::new(NODE_CONTEXT, format!("Invalid command: {e}"));
                if let Some(request_id) = request_id(text) {
                    message = message.request_id(request_id);
                }
                self.outbox.send(Message::Error(message));
            }
        }
    }

    /// Processes a command envelope.
    ///
    /// The results of every item are sent in a single result message,
    /// followed by the status report when one is requested.
    pub fn handle_command(&mut self, command: &Command) {
        let now = self.clock.now();
        let mut result = ResultMessage::new(command.request_id.clone());
        let mut status = None;

        if let Some(commands) = &command.peripheral {
            result = result.peripheral(self.peripherals.handle(commands));
        }
        if let Some(commands) = &command.task {
            let env = TaskEnv {
                peripherals: &self.peripherals,
                outbox: &self.outbox,
                now,
            };
            let (results, report) = self.tasks.handle(commands, &env);
            result = result.task(results);
            status = report;
        }

        if !result.is_empty() {
            self.outbox.send(Message::Result(result));
        }
        if let Some(report) = status {
            self.outbox.send(Message::Status(report));
        }
    }

    /// Runs every due task.
    ///
    /// Removed tasks are reported in a result message. A task which failed
    /// with a fatal error schedules a restart. Once its deadline has passed,
    /// the board restarts instead.
    pub fn tick(&mut self) {
        let now = self.clock.now();
        if self.restart_at.is_some_and(|at| now >= at) {
            warn!("Restarting");
            self.restart_at = None;
            self.hardware.board().restart();
            return;
        }

        let removed = self.tasks.tick(self.clock.as_ref());
        for task in &removed {
            if let Some(e) = &task.error
                && e.kind() == ErrorKind::Fatal
            {
                self.request_restart(&e.attributed(task.type_name));
            }
        }

        let results = TaskController::removal_results(&removed);
        if !results.is_empty() {
            self.outbox
                .send(Message::Result(ResultMessage::new(None).task(results)));
        }
    }

    /// Schedules a restart after the restart delay.
    ///
    /// A pending restart is never postponed.
    pub fn request_restart(&mut self, reason: &str) {
        if self.restart_at.is_some() {
            return;
        }
        let delay = self.config.restart_delay;
        error!("Restarting in {delay:?}: {reason}");
        self.restart_at = Some(self.clock.now() + delay);
    }

    /// Drains the messages queued for the server.
    pub fn drain_messages(&self) -> impl Iterator<Item = Message<'static>> + '_ {
        self.messages.drain()
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("config", &self.config)
            .field("peripherals", &self.peripherals)
            .field("tasks", &self.tasks)
            .field("network", &self.network)
            .field("restart_at", &self.restart_at)
            .finish_non_exhaustive()
    }
}

// Recovers the request identifier of an envelope which is valid JSON.
fn request_id(text: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()?
        .get("request_id")?
        .as_str()
        .map(str::to_owned)
}
