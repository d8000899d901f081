use std::time::Duration;

use fieldnode::parameters::Parameters;

use crate::error::Result;
use crate::peripheral::{Capability, Step};

use super::super::{BoundPeripheral, Context, Flow, Schedule, Task, TaskEnv};

/// Walks a sensor through its calibration sequence.
///
/// The calibration starts when the task is created. Each step waits for as
/// long as the sensor asks before advancing it.
#[derive(Debug)]
pub struct CalibrateSensor {
    sensor: BoundPeripheral,
    first_step: Duration,
}

impl CalibrateSensor {
    /// Type name.
    pub const TYPE_NAME: &'static str = "Calibrate";

    /// Creates the task and starts the calibration.
    ///
    /// # Errors
    ///
    /// An error is returned when the peripheral cannot be calibrated or
    /// rejects the calibration parameters.
    pub fn new(parameters: &Parameters<'_>, env: &TaskEnv<'_>) -> Result<Self> {
        let sensor = BoundPeripheral::resolve(parameters, env, Capability::Calibrate)?;
        let first_step = match sensor.start_calibration(parameters)? {
            Step::Wait(wait) => wait,
            Step::Done => Duration::ZERO,
        };
        Ok(Self { sensor, first_step })
    }

    pub(crate) fn create(parameters: &Parameters<'_>, env: &TaskEnv<'_>) -> Result<Box<dyn Task>> {
        Ok(Box::new(Self::new(parameters, env)?))
    }
}

impl Task for CalibrateSensor {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn on_enable(&mut self, _ctx: &mut Context<'_>) -> Result<Schedule> {
        Ok(Schedule::default().delayed(self.first_step))
    }

    fn callback(&mut self, _ctx: &mut Context<'_>) -> Result<Flow> {
        Ok(match self.sensor.handle_calibration()? {
            Step::Wait(wait) => Flow::Delay(wait),
            Step::Done => Flow::Finish,
        })
    }
}
