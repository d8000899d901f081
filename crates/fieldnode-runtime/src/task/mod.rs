use std::cell::RefMut;
use std::time::Duration;

use uuid::Uuid;

use fieldnode::color::Color;
use fieldnode::parameters::Parameters;
use fieldnode::telemetry::ValueUnit;

use crate::error::{Error, Result};
use crate::outbox::Outbox;
use crate::peripheral::{
    Capability, Peripheral, PeripheralController, PeripheralRef, Step, unsupported_capability,
};

mod controller;
mod factory;
mod scheduler;
/// Every task type a server can start.
pub mod tasks;

pub use controller::TaskController;
pub use factory::{TaskConstructor, TaskFactory};
pub use scheduler::{RemovedTask, Scheduler, SchedulerStats, TaskHandle, TaskInfo, TaskState};

/// The key of the peripheral a task operates on.
pub const PERIPHERAL_KEY: &str = "peripheral";

/// The type name reported for tasks the device starts on its own.
pub const SYSTEM_TASK_TYPE: &str = "SystemTask";

/// What a callback asks the scheduler to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Run again after the task interval.
    Continue,
    /// Run again after the given duration.
    Delay(Duration),
    /// Stop the task.
    Finish,
}

/// How many times a task callback runs before the task stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iterations {
    /// Until the task finishes on its own or is stopped.
    Forever,
    /// A fixed number of times.
    Finite(u64),
}

impl Iterations {
    // Consumes one iteration, returning whether any remains.
    pub(crate) fn consume(&mut self) -> bool {
        match self {
            Self::Forever => true,
            Self::Finite(n) => {
                *n = n.saturating_sub(1);
                *n > 0
            }
        }
    }
}

/// How a task is scheduled once enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// Time between two callbacks.
    pub interval: Duration,
    /// Number of callbacks.
    pub iterations: Iterations,
    /// Time before the first callback.
    pub delay: Duration,
}

impl Schedule {
    /// A single callback, as soon as possible.
    #[must_use]
    pub const fn once() -> Self {
        Self {
            interval: Duration::ZERO,
            iterations: Iterations::Finite(1),
            delay: Duration::ZERO,
        }
    }

    /// Callbacks every `interval`, until the task finishes.
    #[must_use]
    pub const fn every(interval: Duration) -> Self {
        Self {
            interval,
            iterations: Iterations::Forever,
            delay: Duration::ZERO,
        }
    }

    /// Sets the number of callbacks.
    #[must_use]
    pub const fn iterations(mut self, iterations: Iterations) -> Self {
        self.iterations = iterations;
        self
    }

    /// Delays the first callback.
    #[must_use]
    pub const fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self::every(Duration::ZERO)
    }
}

/// What a task sees while it runs.
#[derive(Debug)]
pub struct Context<'a> {
    now: Duration,
    uuid: Option<Uuid>,
    stats: &'a SchedulerStats,
}

impl<'a> Context<'a> {
    pub(crate) const fn new(now: Duration, uuid: Option<Uuid>, stats: &'a SchedulerStats) -> Self {
        Self { now, uuid, stats }
    }

    /// Returns the current time.
    #[must_use]
    pub const fn now(&self) -> Duration {
        self.now
    }

    /// Returns the identifier of the running task, if it has one.
    #[must_use]
    pub const fn uuid(&self) -> Option<Uuid> {
        self.uuid
    }

    /// Returns the scheduler statistics.
    #[must_use]
    pub const fn stats(&self) -> &SchedulerStats {
        self.stats
    }
}

/// A unit of scheduled work.
///
/// A task is built already validated: anything that can fail while parsing
/// its parameters fails in its constructor, before the task reaches the
/// scheduler. Any error returned afterwards invalidates the task, which is
/// then disabled and never called again.
pub trait Task {
    /// Returns the type name the task was registered under.
    fn type_name(&self) -> &'static str;

    /// Returns the error which made the task invalid, if any.
    fn error(&self) -> Option<&Error> {
        None
    }

    /// Prepares the task and returns how it has to be scheduled.
    ///
    /// # Errors
    ///
    /// An error is returned when the task cannot be activated.
    fn on_enable(&mut self, _ctx: &mut Context<'_>) -> Result<Schedule> {
        Ok(Schedule::default())
    }

    /// Runs one step of the task.
    ///
    /// # Errors
    ///
    /// An error invalidates the task.
    fn callback(&mut self, ctx: &mut Context<'_>) -> Result<Flow>;

    /// Tears the task down once it has been disabled.
    fn on_disable(&mut self, _ctx: &mut Context<'_>) {}
}

/// What a task constructor may use.
#[derive(Debug, Clone, Copy)]
pub struct TaskEnv<'a> {
    /// The live peripherals.
    pub peripherals: &'a PeripheralController,
    /// Where messages for the server go.
    pub outbox: &'a Outbox,
    /// The current time.
    pub now: Duration,
}

/// The sentinel returned when a task could not be constructed.
#[derive(Debug)]
pub struct InvalidTask {
    error: Error,
}

impl InvalidTask {
    /// Creates an [`InvalidTask`] carrying the reason of the failure.
    #[must_use]
    pub const fn new(error: Error) -> Self {
        Self { error }
    }
}

impl Task for InvalidTask {
    fn type_name(&self) -> &'static str {
        "InvalidTask"
    }

    fn error(&self) -> Option<&Error> {
        Some(&self.error)
    }

    fn on_enable(&mut self, _ctx: &mut Context<'_>) -> Result<Schedule> {
        Err(self.error.clone())
    }

    fn callback(&mut self, _ctx: &mut Context<'_>) -> Result<Flow> {
        Err(self.error.clone())
    }
}

/// A peripheral a task has resolved and checked for a capability.
///
/// Holding it keeps the peripheral alive.
#[derive(Clone)]
pub struct BoundPeripheral {
    uuid: Uuid,
    peripheral: PeripheralRef,
}

impl BoundPeripheral {
    /// Resolves the peripheral named by the `peripheral` parameter.
    ///
    /// # Errors
    ///
    /// An error is returned when the parameter is missing, when the
    /// peripheral does not exist or is invalid, or when it does not support
    /// the capability.
    pub fn resolve(
        parameters: &Parameters<'_>,
        env: &TaskEnv<'_>,
        capability: Capability,
    ) -> Result<Self> {
        let uuid = parameters.uuid(PERIPHERAL_KEY)?;
        let peripheral = env
            .peripherals
            .get(&uuid)
            .ok_or_else(|| Error::construction(format!("Could not find peripheral: {uuid}")))?;

        {
            let mut borrowed = peripheral.borrow_mut();
            if let Some(e) = borrowed.error() {
                return Err(Error::construction(format!("Peripheral {uuid} is invalid: {e}")));
            }
            if !borrowed.supports(capability) {
                return Err(unsupported_capability(capability, &uuid, borrowed.type_name()));
            }
        }

        Ok(Self { uuid, peripheral })
    }

    /// Returns the peripheral identifier.
    #[must_use]
    pub const fn uuid(&self) -> &Uuid {
        &self.uuid
    }

    /// Returns the peripheral.
    #[must_use]
    pub const fn peripheral(&self) -> &PeripheralRef {
        &self.peripheral
    }

    /// Returns whether the peripheral supports a capability.
    #[must_use]
    pub fn supports(&self, capability: Capability) -> bool {
        self.peripheral.borrow_mut().supports(capability)
    }

    /// Reads the values of the peripheral.
    ///
    /// # Errors
    ///
    /// An error is returned when the peripheral is busy, lacks the
    /// capability, or fails to read.
    pub fn get_values(&self) -> Result<Vec<ValueUnit>> {
        let mut peripheral = self.borrow()?;
        let type_name = peripheral.type_name();
        peripheral
            .as_get_values()
            .ok_or_else(|| unsupported_capability(Capability::GetValues, &self.uuid, type_name))?
            .get_values()
    }

    /// Applies a value to the peripheral.
    ///
    /// # Errors
    ///
    /// An error is returned when the peripheral is busy, lacks the
    /// capability, or rejects the value.
    pub fn set_value(&self, value: &ValueUnit) -> Result<()> {
        let mut peripheral = self.borrow()?;
        let type_name = peripheral.type_name();
        peripheral
            .as_set_value()
            .ok_or_else(|| unsupported_capability(Capability::SetValue, &self.uuid, type_name))?
            .set_value(value)
    }

    /// Starts a measurement.
    ///
    /// # Errors
    ///
    /// An error is returned when the peripheral is busy, lacks the
    /// capability, or cannot start the measurement.
    pub fn start_measurement(&self, parameters: &Parameters<'_>) -> Result<Step> {
        let mut peripheral = self.borrow()?;
        let type_name = peripheral.type_name();
        peripheral
            .as_start_measurement()
            .ok_or_else(|| {
                unsupported_capability(Capability::StartMeasurement, &self.uuid, type_name)
            })?
            .start_measurement(parameters)
    }

    /// Checks on a running measurement.
    ///
    /// # Errors
    ///
    /// An error is returned when the peripheral is busy, lacks the
    /// capability, or the measurement failed.
    pub fn handle_measurement(&self) -> Result<Step> {
        let mut peripheral = self.borrow()?;
        let type_name = peripheral.type_name();
        peripheral
            .as_start_measurement()
            .ok_or_else(|| {
                unsupported_capability(Capability::StartMeasurement, &self.uuid, type_name)
            })?
            .handle_measurement()
    }

    /// Starts a calibration.
    ///
    /// # Errors
    ///
    /// An error is returned when the peripheral is busy, lacks the
    /// capability, or rejects the calibration.
    pub fn start_calibration(&self, parameters: &Parameters<'_>) -> Result<Step> {
        let mut peripheral = self.borrow()?;
        let type_name = peripheral.type_name();
        peripheral
            .as_calibrate()
            .ok_or_else(|| unsupported_capability(Capability::Calibrate, &self.uuid, type_name))?
            .start_calibration(parameters)
    }

    /// Advances a running calibration.
    ///
    /// # Errors
    ///
    /// An error is returned when the peripheral is busy, lacks the
    /// capability, or the calibration failed.
    pub fn handle_calibration(&self) -> Result<Step> {
        let mut peripheral = self.borrow()?;
        let type_name = peripheral.type_name();
        peripheral
            .as_calibrate()
            .ok_or_else(|| unsupported_capability(Capability::Calibrate, &self.uuid, type_name))?
            .handle_calibration()
    }

    /// Shows a color on the peripheral.
    ///
    /// # Errors
    ///
    /// An error is returned when the peripheral is busy, lacks the
    /// capability, or cannot be updated.
    pub fn turn_on(&self, color: Color) -> Result<()> {
        let mut peripheral = self.borrow()?;
        let type_name = peripheral.type_name();
        peripheral
            .as_led_strip()
            .ok_or_else(|| unsupported_capability(Capability::LedStrip, &self.uuid, type_name))?
            .turn_on(color)
    }

    fn borrow(&self) -> Result<RefMut<'_, dyn Peripheral + 'static>> {
        self.peripheral
            .try_borrow_mut()
            .map_err(|_| Error::runtime(format!("Peripheral {} is busy", self.uuid)))
    }
}

impl std::fmt::Debug for BoundPeripheral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundPeripheral")
            .field("uuid", &self.uuid)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use fieldnode::parameters::Parameters;

    use crate::peripheral::Capability;
    use crate::tests::{DATA_POINT_TYPE, TestOutbox, test_controller};

    use super::{BoundPeripheral, Iterations, TaskEnv};

    #[test]
    fn iterations() {
        let mut forever = Iterations::Forever;
        assert!(forever.consume());

        let mut twice = Iterations::Finite(2);
        assert!(twice.consume());
        assert!(!twice.consume());
        assert!(!twice.consume());
    }

    #[test]
    fn capability_mismatch() {
        let (mut controller, _) = test_controller();
        let uuid = "00000000-0000-0000-0000-0000000000b2";
        let input = json!({
            "uuid": uuid,
            "type": "DigitalIn",
            "pin": 4,
            "data_point_type": DATA_POINT_TYPE,
            "input_type": "floating",
        });
        let _ = controller
            .add(&Parameters::from_value(&input).unwrap())
            .unwrap();

        let outbox = TestOutbox::new();
        let env = TaskEnv {
            peripherals: &controller,
            outbox: outbox.outbox(),
            now: std::time::Duration::ZERO,
        };
        let task = json!({"peripheral": uuid});
        let error = BoundPeripheral::resolve(
            &Parameters::from_value(&task).unwrap(),
            &env,
            Capability::SetValue,
        )
        .unwrap_err();

        assert_eq!(
            error.to_string(),
            format!("SetValue capability not supported: {uuid} is a DigitalIn")
        );
        // Only the controller holds the peripheral.
        assert_eq!(controller.len(), 1);
        assert_eq!(
            controller.use_count(&uuid.parse().unwrap()),
            Some(1)
        );
    }

    #[test]
    fn missing_peripheral() {
        let (controller, _) = test_controller();
        let outbox = TestOutbox::new();
        let env = TaskEnv {
            peripherals: &controller,
            outbox: outbox.outbox(),
            now: std::time::Duration::ZERO,
        };

        let error = BoundPeripheral::resolve(
            &Parameters::from_value(&json!({})).unwrap(),
            &env,
            Capability::GetValues,
        )
        .unwrap_err();
        assert_eq!(error.to_string(), "Missing property: peripheral (uuid)");

        let uuid = "00000000-0000-0000-0000-0000000000c3";
        let error = BoundPeripheral::resolve(
            &Parameters::from_value(&json!({"peripheral": uuid})).unwrap(),
            &env,
            Capability::GetValues,
        )
        .unwrap_err();
        assert_eq!(error.to_string(), format!("Could not find peripheral: {uuid}"));
    }
}
