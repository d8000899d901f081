mod alert_sensor;
mod calibrate;
mod poll_sensor;
mod read_sensor;
mod set_rgb_led;
mod set_value;
mod system_monitor;

pub use alert_sensor::AlertSensor;
pub use calibrate::CalibrateSensor;
pub use poll_sensor::PollSensor;
pub use read_sensor::ReadSensor;
pub use set_rgb_led::SetRgbLed;
pub use set_value::SetActuator;
pub use system_monitor::SystemMonitor;

use std::time::Duration;

use uuid::Uuid;

use fieldnode::message::Message;
use fieldnode::parameters::{ParameterError, Parameters};
use fieldnode::telemetry::Telemetry;

use crate::error::Result;
use crate::outbox::Outbox;
use crate::peripheral::{Capability, Step};

use super::{BoundPeripheral, TaskEnv, TaskFactory};

pub(crate) const INTERVAL_KEY: &str = "interval_ms";
pub(crate) const DURATION_KEY: &str = "duration_ms";

/// Registers every built-in task type.
pub fn register_all(factory: &mut TaskFactory) {
    let _ = factory.register(PollSensor::TYPE_NAME, PollSensor::create);
    let _ = factory.register(ReadSensor::TYPE_NAME, ReadSensor::create);
    let _ = factory.register(SetActuator::TYPE_NAME, SetActuator::create);
    let _ = factory.register(CalibrateSensor::TYPE_NAME, CalibrateSensor::create);
    let _ = factory.register(AlertSensor::TYPE_NAME, AlertSensor::create);
    let _ = factory.register(SetRgbLed::TYPE_NAME, SetRgbLed::create);
}

// Reads a strictly positive interval in milliseconds.
fn interval(parameters: &Parameters<'_>, default: Option<u64>) -> Result<Duration> {
    let interval = match default {
        Some(default) => parameters.optional_u64(INTERVAL_KEY)?.unwrap_or(default),
        None => parameters.u64(INTERVAL_KEY)?,
    };
    if interval == 0 {
        return Err(ParameterError::invalid(INTERVAL_KEY, "unsigned int above 0").into());
    }
    Ok(Duration::from_millis(interval))
}

/// Reads a sensor and sends its values as telemetry.
///
/// A sensor with the [`StartMeasurement`](crate::peripheral::StartMeasurement)
/// capability is read only once its measurement is done.
#[derive(Debug)]
struct Sampler {
    task_id: Uuid,
    sensor: BoundPeripheral,
    outbox: Outbox,
    measures: bool,
}

impl Sampler {
    fn new(parameters: &Parameters<'_>, env: &TaskEnv<'_>) -> Result<Self> {
        let task_id = parameters.id()?;
        let sensor = BoundPeripheral::resolve(parameters, env, Capability::GetValues)?;
        let measures = sensor.supports(Capability::StartMeasurement);

        Ok(Self {
            task_id,
            sensor,
            outbox: env.outbox.clone(),
            measures,
        })
    }

    // Returns how long to wait before the first reading.
    fn start(&self, parameters: &Parameters<'_>) -> Result<Duration> {
        if !self.measures {
            return Ok(Duration::ZERO);
        }
        Ok(match self.sensor.start_measurement(parameters)? {
            Step::Wait(wait) => wait,
            Step::Done => Duration::ZERO,
        })
    }

    // Returns the time to wait while the measurement is not ready.
    fn sample(&self) -> Result<Option<Duration>> {
        if self.measures {
            if let Step::Wait(wait) = self.sensor.handle_measurement()? {
                return Ok(Some(wait));
            }
        }

        let values = self.sensor.get_values()?;
        self.outbox.send(Message::Telemetry(Telemetry::new(
            self.task_id,
            *self.sensor.uuid(),
            values,
        )));
        Ok(None)
    }
}
