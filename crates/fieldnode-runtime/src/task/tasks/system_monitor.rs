use std::time::Duration;

use fieldnode::message::Message;
use fieldnode::system::SystemHealth;

use crate::error::Result;
use crate::hal::Hardware;
use crate::network::NetworkStatus;
use crate::outbox::Outbox;

use super::super::{Context, Flow, Schedule, Task};

/// Reports the health of the device every `interval`.
///
/// The productive share is the time spent inside task callbacks since the
/// previous report.
#[derive(Debug)]
pub struct SystemMonitor {
    hardware: Hardware,
    outbox: Outbox,
    network: NetworkStatus,
    interval: Duration,
    last: (Duration, Duration),
}

impl SystemMonitor {
    /// Type name.
    pub const TYPE_NAME: &'static str = "SystemMonitor";

    /// Creates the task.
    #[must_use]
    pub fn new(
        hardware: Hardware,
        outbox: Outbox,
        network: NetworkStatus,
        interval: Duration,
    ) -> Self {
        Self {
            hardware,
            outbox,
            network,
            interval,
            last: (Duration::ZERO, Duration::ZERO),
        }
    }

    fn productive_percent(&mut self, now: Duration, busy: Duration) -> f32 {
        let (last_now, last_busy) = std::mem::replace(&mut self.last, (now, busy));
        let elapsed = now.saturating_sub(last_now);
        if elapsed.is_zero() {
            return 0.0;
        }
        let percent = busy.saturating_sub(last_busy).as_secs_f32() * 100.0 / elapsed.as_secs_f32();
        percent.clamp(0.0, 100.0)
    }
}

impl Task for SystemMonitor {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn on_enable(&mut self, ctx: &mut Context<'_>) -> Result<Schedule> {
        self.last = (ctx.now(), ctx.stats().busy());
        Ok(Schedule::every(self.interval).delayed(self.interval))
    }

    fn callback(&mut self, ctx: &mut Context<'_>) -> Result<Flow> {
        let productive_percent = self.productive_percent(ctx.now(), ctx.stats().busy());
        let memory = self.hardware.board().memory();

        self.outbox.send(Message::System(SystemHealth {
            free_memory_bytes: memory.free_bytes,
            least_free_bytes: memory.least_free_bytes,
            heap_fragmentation_percent: memory.fragmentation_percent(),
            productive_percent,
            wifi_rssi: self.network.rssi(),
        }));
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use fieldnode::message::Message;

    use crate::clock::MockClock;
    use crate::hal::mock::MockBoard;
    use crate::hal::{Hardware, MemoryStats};
    use crate::network::NetworkStatus;
    use crate::task::TaskController;
    use crate::tests::{TestOutbox, test_task_factory};

    use super::SystemMonitor;

    #[test]
    fn reports_memory_every_interval() {
        let board = MockBoard::new();
        let handle = board.handle();
        handle.set_memory(MemoryStats {
            free_bytes: 1000,
            least_free_bytes: 400,
            largest_free_block: 900,
        });

        let outbox = TestOutbox::new();
        let monitor = SystemMonitor::new(
            Hardware::new(board),
            outbox.outbox().clone(),
            NetworkStatus::new(),
            Duration::from_secs(60),
        );
        let mut controller = TaskController::new(test_task_factory());
        let _ = controller
            .spawn_system(Box::new(monitor), Duration::ZERO)
            .unwrap();

        let _ = controller.tick(&MockClock::at(Duration::from_secs(59)));
        assert!(outbox.drain().is_empty());

        let _ = controller.tick(&MockClock::at(Duration::from_secs(60)));
        let messages = outbox.drain();
        assert_eq!(messages.len(), 1);
        let Message::System(health) = &messages[0] else {
            panic!("expected a health report, got {messages:?}");
        };
        assert_eq!(health.free_memory_bytes, 1000);
        assert_eq!(health.least_free_bytes, 400);
        assert!((health.heap_fragmentation_percent - 10.0).abs() < 1e-3);
        assert!((0.0..=100.0).contains(&health.productive_percent));
        assert_eq!(health.wifi_rssi, None);

        let _ = controller.tick(&MockClock::at(Duration::from_secs(120)));
        assert_eq!(outbox.drain().len(), 1);
    }
}
