use std::time::Duration;

use fieldnode::parameters::Parameters;

use crate::error::Result;

use super::super::{Context, Flow, Schedule, Task, TaskEnv};
use super::{DURATION_KEY, Sampler, interval};

/// Sends the values of a sensor every `interval_ms`.
///
/// With `duration_ms`, the task finishes on its own once that time has
/// elapsed since it was created. Otherwise it runs until stopped.
#[derive(Debug)]
pub struct PollSensor {
    sampler: Sampler,
    interval: Duration,
    run_until: Option<Duration>,
    first_reading: Duration,
}

impl PollSensor {
    /// Type name.
    pub const TYPE_NAME: &'static str = "PollSensor";

    /// Creates the task, starting a measurement when the sensor needs one.
    ///
    /// # Errors
    ///
    /// An error is returned when a parameter is missing or malformed, when
    /// the peripheral cannot be read, or when the measurement cannot start.
    pub fn new(parameters: &Parameters<'_>, env: &TaskEnv<'_>) -> Result<Self> {
        let interval = interval(parameters, None)?;
        let run_until = parameters
            .optional_u64(DURATION_KEY)?
            .map(|duration| env.now + Duration::from_millis(duration));
        let sampler = Sampler::new(parameters, env)?;
        let first_reading = sampler.start(parameters)?;

        Ok(Self {
            sampler,
            interval,
            run_until,
            first_reading,
        })
    }

    pub(crate) fn create(parameters: &Parameters<'_>, env: &TaskEnv<'_>) -> Result<Box<dyn Task>> {
        Ok(Box::new(Self::new(parameters, env)?))
    }
}

impl Task for PollSensor {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn on_enable(&mut self, _ctx: &mut Context<'_>) -> Result<Schedule> {
        Ok(Schedule::every(self.interval).delayed(self.first_reading))
    }

    fn callback(&mut self, ctx: &mut Context<'_>) -> Result<Flow> {
        if let Some(wait) = self.sampler.sample()? {
            return Ok(Flow::Delay(wait));
        }

        if self.run_until.is_some_and(|until| ctx.now() >= until) {
            Ok(Flow::Finish)
        } else {
            Ok(Flow::Continue)
        }
    }
}
