use std::time::Duration;

use uuid::Uuid;

use fieldnode::message::Message;
use fieldnode::parameters::{ParameterError, Parameters};
use fieldnode::telemetry::{Alert, TriggerType, ValueUnit};

use crate::error::{Error, Result};
use crate::outbox::Outbox;
use crate::peripheral::Capability;

use super::super::{BoundPeripheral, Context, Flow, Iterations, Schedule, Task, TaskEnv};
use super::{DURATION_KEY, interval};

const DEFAULT_INTERVAL_MS: u64 = 100;

// Number of samples taken every `interval` within `duration_ms`.
fn samples(duration_ms: u64, interval: Duration) -> Result<u64> {
    let samples = u64::try_from(interval.as_millis())
        .ok()
        .and_then(|interval_ms| duration_ms.checked_div(interval_ms))
        .unwrap_or(0);
    if samples == 0 {
        return Err(ParameterError::invalid(DURATION_KEY, "at least one interval").into());
    }
    Ok(samples)
}

/// Watches a value and sends an alert when it crosses a threshold.
///
/// The sensor is sampled every `interval_ms` (100 by default). With
/// `duration_ms`, the task stops after as many samples as fit in that
/// duration, which must hold at least one sample.
#[derive(Debug)]
pub struct AlertSensor {
    task_id: Uuid,
    sensor: BoundPeripheral,
    outbox: Outbox,
    trigger_type: TriggerType,
    threshold: f32,
    data_point_type: Uuid,
    interval: Duration,
    iterations: Iterations,
    last_value: Option<f32>,
}

impl AlertSensor {
    /// Type name.
    pub const TYPE_NAME: &'static str = "AlertSensor";

    /// Creates the task.
    ///
    /// # Errors
    ///
    /// An error is returned when a parameter is missing or malformed, when
    /// `duration_ms` is shorter than the interval, or when the peripheral
    /// cannot be read.
    pub fn new(parameters: &Parameters<'_>, env: &TaskEnv<'_>) -> Result<Self> {
        let task_id = parameters.id()?;
        let sensor = BoundPeripheral::resolve(parameters, env, Capability::GetValues)?;

        let trigger_type = TriggerType::from_name(parameters.str("trigger_type")?)
            .ok_or(ParameterError::invalid("trigger_type", "rising, falling or either"))?;
        let threshold = parameters.f32("threshold")?;
        let interval = interval(parameters, Some(DEFAULT_INTERVAL_MS))?;
        let iterations = match parameters.optional_u64(DURATION_KEY)? {
            Some(duration) => Iterations::Finite(samples(duration, interval)?),
            None => Iterations::Forever,
        };
        let data_point_type = parameters.uuid(ValueUnit::DATA_POINT_TYPE_KEY)?;

        Ok(Self {
            task_id,
            sensor,
            outbox: env.outbox.clone(),
            trigger_type,
            threshold,
            data_point_type,
            interval,
            iterations,
            last_value: None,
        })
    }

    pub(crate) fn create(parameters: &Parameters<'_>, env: &TaskEnv<'_>) -> Result<Box<dyn Task>> {
        Ok(Box::new(Self::new(parameters, env)?))
    }

    // Returns the direction in which the threshold was crossed.
    fn crossing(&self, value: f32) -> Option<TriggerType> {
        let last = self.last_value?;
        if value > self.threshold && last < self.threshold {
            Some(TriggerType::Rising)
        } else if value < self.threshold && last > self.threshold {
            Some(TriggerType::Falling)
        } else {
            None
        }
    }
}

impl Task for AlertSensor {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn on_enable(&mut self, _ctx: &mut Context<'_>) -> Result<Schedule> {
        Ok(Schedule::every(self.interval).iterations(self.iterations))
    }

    fn callback(&mut self, _ctx: &mut Context<'_>) -> Result<Flow> {
        let value = self
            .sensor
            .get_values()?
            .into_iter()
            .find(|value| value.data_point_type == self.data_point_type)
            .ok_or_else(|| {
                Error::runtime(format!(
                    "Data point type not found: {}",
                    self.data_point_type
                ))
            })?
            .value;

        if let Some(crossing) = self.crossing(value)
            && self.trigger_type.accepts(crossing)
        {
            self.outbox.send(Message::Alert(Alert {
                task_id: self.task_id,
                peripheral: *self.sensor.uuid(),
                threshold: self.threshold,
                trigger_type: crossing,
            }));
        }

        self.last_value = Some(value);
        Ok(Flow::Continue)
    }
}
