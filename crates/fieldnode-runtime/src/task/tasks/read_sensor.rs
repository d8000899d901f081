use std::time::Duration;

use fieldnode::parameters::Parameters;

use crate::error::Result;

use super::super::{Context, Flow, Schedule, Task, TaskEnv};
use super::Sampler;

/// Sends the values of a sensor once, then finishes.
#[derive(Debug)]
pub struct ReadSensor {
    sampler: Sampler,
    first_reading: Duration,
}

impl ReadSensor {
    /// Type name.
    pub const TYPE_NAME: &'static str = "ReadSensor";

    /// Creates the task, starting a measurement when the sensor needs one.
    ///
    /// # Errors
    ///
    /// An error is returned when the peripheral cannot be read or when the
    /// measurement cannot start.
    pub fn new(parameters: &Parameters<'_>, env: &TaskEnv<'_>) -> Result<Self> {
        let sampler = Sampler::new(parameters, env)?;
        let first_reading = sampler.start(parameters)?;
        Ok(Self {
            sampler,
            first_reading,
        })
    }

    pub(crate) fn create(parameters: &Parameters<'_>, env: &TaskEnv<'_>) -> Result<Box<dyn Task>> {
        Ok(Box::new(Self::new(parameters, env)?))
    }
}

impl Task for ReadSensor {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn on_enable(&mut self, _ctx: &mut Context<'_>) -> Result<Schedule> {
        Ok(Schedule::default().delayed(self.first_reading))
    }

    fn callback(&mut self, _ctx: &mut Context<'_>) -> Result<Flow> {
        Ok(match self.sampler.sample()? {
            Some(wait) => Flow::Delay(wait),
            None => Flow::Finish,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use fieldnode::message::Message;
    use fieldnode::parameters::Parameters;

    use crate::clock::MockClock;
    use crate::task::TaskController;
    use crate::tests::{DATA_POINT_TYPE, TestOutbox, test_controller, test_task_factory};

    use super::super::super::TaskEnv;

    #[test]
    fn reads_once() {
        let (mut peripherals, board) = test_controller();
        let sensor = "00000000-0000-0000-0000-0000000000d1";
        let input = json!({
            "uuid": sensor,
            "type": "AnalogIn",
            "pin": 34,
            "voltage_data_point_type": DATA_POINT_TYPE,
        });
        let _ = peripherals
            .add(&Parameters::from_value(&input).unwrap())
            .unwrap();
        board.set_adc(34, 4095);

        let outbox = TestOutbox::new();
        let env = TaskEnv {
            peripherals: &peripherals,
            outbox: outbox.outbox(),
            now: Duration::ZERO,
        };
        let mut controller = TaskController::new(test_task_factory());
        let task = json!({
            "uuid": "00000000-0000-0000-0000-0000000000d2",
            "type": "ReadSensor",
            "peripheral": sensor,
        });
        let _ = controller
            .start(&Parameters::from_value(&task).unwrap(), &env)
            .unwrap();

        let removed = controller.tick(&MockClock::at(Duration::ZERO));
        assert_eq!(removed.len(), 1);
        assert!(removed[0].error.is_none());

        let messages = outbox.drain();
        assert_eq!(messages.len(), 1);
        let Message::Telemetry(telemetry) = &messages[0] else {
            panic!("expected telemetry, got {messages:?}");
        };
        assert_eq!(telemetry.data_points.len(), 1);
        assert!(telemetry.data_points[0].value > 3.2);
    }
}
