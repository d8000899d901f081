use std::borrow::Cow;
use std::time::Duration;

use flume::Receiver;

use uuid::Uuid;

use fieldnode::message::Message;
use fieldnode::system::Register;

use crate::clock::MockClock;
use crate::config::{MemoryStorage, NodeConfig, Secrets};
use crate::hal::Hardware;
use crate::hal::mock::{MockBoard, MockHandle};
use crate::network::NetworkDrivers;
use crate::network::mock::{MockRadio, MockRadioHandle, MockSession, MockTimeSync};
use crate::node::Node;
use crate::outbox::Outbox;
use crate::peripheral::{Peripheral, PeripheralController, PeripheralFactory, peripherals};
use crate::task::{TaskFactory, tasks};

pub(crate) const DATA_POINT_TYPE: &str = "00000000-0000-0000-0000-0000000000d1";
pub(crate) const OTHER_DATA_POINT_TYPE: &str = "00000000-0000-0000-0000-0000000000d2";

pub(crate) fn data_point_type() -> Uuid {
    DATA_POINT_TYPE.parse().unwrap()
}

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub(crate) fn controller_with(board: MockBoard) -> PeripheralController {
    let mut factory = PeripheralFactory::new();
    peripherals::register_all(&mut factory);
    PeripheralController::new(factory, Hardware::new(board))
}

pub(crate) fn test_controller() -> (PeripheralController, MockHandle) {
    let board = MockBoard::new();
    let handle = board.handle();
    (controller_with(board), handle)
}

pub(crate) fn test_task_factory() -> TaskFactory {
    let mut factory = TaskFactory::new();
    tasks::register_all(&mut factory);
    factory
}

pub(crate) fn test_register() -> Register<'static> {
    Register {
        version: Cow::Borrowed("0.1.0"),
        peripherals: vec![Cow::Borrowed("DigitalOut")],
        tasks: vec![Cow::Borrowed("SetValue")],
    }
}

pub(crate) struct TestPeripheral {
    name: &'static str,
}

impl TestPeripheral {
    pub(crate) const fn named(name: &'static str) -> Self {
        Self { name }
    }
}

impl Peripheral for TestPeripheral {
    fn type_name(&self) -> &'static str {
        self.name
    }
}

pub(crate) struct TestOutbox {
    outbox: Outbox,
    receiver: Receiver<Message<'static>>,
}

impl TestOutbox {
    pub(crate) fn new() -> Self {
        let (outbox, receiver) = Outbox::new();
        Self { outbox, receiver }
    }

    pub(crate) const fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub(crate) fn drain(&self) -> Vec<Message<'static>> {
        self.receiver.drain().collect()
    }
}

pub(crate) struct TestNode {
    pub(crate) node: Node,
    pub(crate) board: MockHandle,
    pub(crate) clock: MockClock,
    pub(crate) radio: MockRadioHandle,
    pub(crate) storage: MemoryStorage,
}

impl TestNode {
    pub(crate) fn new(secrets: Secrets) -> Self {
        Self::with_config(NodeConfig::new().firmware_version("0.1.0"), secrets)
    }

    pub(crate) fn with_config(config: NodeConfig, secrets: Secrets) -> Self {
        let board = MockBoard::new();
        let handle = board.handle();
        let clock = MockClock::new();
        let radio = MockRadio::new();
        let radio_handle = radio.handle();
        let storage = MemoryStorage::new(secrets);
        let drivers = NetworkDrivers {
            radio: Box::new(radio),
            session: Box::new(MockSession::new()),
            time_sync: Box::new(MockTimeSync::new()),
        };

        let node = Node::new(
            config,
            board,
            clock.clone(),
            drivers,
            Box::new(storage.clone()),
        );
        Self {
            node,
            board: handle,
            clock,
            radio: radio_handle,
            storage,
        }
    }

    // Advances time by `duration`, ticking the node every 100 ms.
    pub(crate) fn run_for(&mut self, duration: Duration) {
        let step = Duration::from_millis(100);
        let mut elapsed = Duration::ZERO;
        while elapsed < duration {
            self.clock.advance(step);
            self.node.tick();
            elapsed += step;
        }
    }

    pub(crate) fn messages(&self) -> Vec<Message<'static>> {
        self.node.drain_messages().collect()
    }
}
