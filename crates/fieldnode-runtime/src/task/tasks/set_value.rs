use fieldnode::parameters::Parameters;
use fieldnode::telemetry::ValueUnit;

use crate::error::Result;
use crate::peripheral::Capability;

use super::super::{BoundPeripheral, Context, Flow, Schedule, Task, TaskEnv};

/// Applies a single value to an actuator.
#[derive(Debug)]
pub struct SetActuator {
    actuator: BoundPeripheral,
    value: ValueUnit,
}

impl SetActuator {
    /// Type name.
    pub const TYPE_NAME: &'static str = "SetValue";

    /// Creates the task.
    ///
    /// # Errors
    ///
    /// An error is returned when a parameter is missing or malformed, or
    /// when the peripheral is not an actuator.
    pub fn new(parameters: &Parameters<'_>, env: &TaskEnv<'_>) -> Result<Self> {
        let actuator = BoundPeripheral::resolve(parameters, env, Capability::SetValue)?;
        let value = ValueUnit::new(
            parameters.f32(ValueUnit::VALUE_KEY)?,
            parameters.uuid(ValueUnit::DATA_POINT_TYPE_KEY)?,
        );
        Ok(Self { actuator, value })
    }

    pub(crate) fn create(parameters: &Parameters<'_>, env: &TaskEnv<'_>) -> Result<Box<dyn Task>> {
        Ok(Box::new(Self::new(parameters, env)?))
    }
}

impl Task for SetActuator {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn on_enable(&mut self, _ctx: &mut Context<'_>) -> Result<Schedule> {
        Ok(Schedule::once())
    }

    fn callback(&mut self, _ctx: &mut Context<'_>) -> Result<Flow> {
        self.actuator.set_value(&self.value)?;
        Ok(Flow::Finish)
    }
}
