use std::cell::RefCell;
use std::rc::Rc;

use uuid::Uuid;

use crate::error::{Error, ErrorKind};
use crate::hal::Hardware;

mod capabilities;
mod controller;
mod factory;
/// Every peripheral type a device can construct.
pub mod peripherals;

pub use capabilities::{
    Calibrate, Capability, GetValues, LedStrip, SetValue, StartMeasurement, Step,
};
pub use controller::PeripheralController;
pub(crate) use controller::item_uuid;
pub use factory::{PeripheralConstructor, PeripheralFactory};

use peripherals::I2cAdapter;

/// A shared reference to a peripheral.
///
/// The [`PeripheralController`] holds the canonical reference, while each
/// task using the peripheral holds another one for its whole lifetime.
pub type PeripheralRef = Rc<RefCell<dyn Peripheral>>;

/// A logical sensor or actuator.
///
/// A peripheral exposes what it can do through capability accessors, each
/// returning [`None`] unless the peripheral implements that capability.
pub trait Peripheral {
    /// Returns the type name the peripheral was registered under.
    fn type_name(&self) -> &'static str;

    /// Returns the error which made the peripheral invalid, if any.
    fn error(&self) -> Option<&Error> {
        None
    }

    /// Returns whether the peripheral can be used.
    fn is_valid(&self) -> bool {
        self.error().is_none()
    }

    /// Returns the [`GetValues`] capability.
    fn as_get_values(&mut self) -> Option<&mut dyn GetValues> {
        None
    }

    /// Returns the [`SetValue`] capability.
    fn as_set_value(&mut self) -> Option<&mut dyn SetValue> {
        None
    }

    /// Returns the [`Calibrate`] capability.
    fn as_calibrate(&mut self) -> Option<&mut dyn Calibrate> {
        None
    }

    /// Returns the [`StartMeasurement`] capability.
    fn as_start_measurement(&mut self) -> Option<&mut dyn StartMeasurement> {
        None
    }

    /// Returns the [`LedStrip`] capability.
    fn as_led_strip(&mut self) -> Option<&mut dyn LedStrip> {
        None
    }

    /// Returns the peripheral as an I²C bus adapter.
    fn as_i2c_adapter(&mut self) -> Option<&mut I2cAdapter> {
        None
    }

    /// Returns whether the peripheral implements a capability.
    fn supports(&mut self, capability: Capability) -> bool {
        match capability {
            Capability::GetValues => self.as_get_values().is_some(),
            Capability::SetValue => self.as_set_value().is_some(),
            Capability::Calibrate => self.as_calibrate().is_some(),
            Capability::StartMeasurement => self.as_start_measurement().is_some(),
            Capability::LedStrip => self.as_led_strip().is_some(),
        }
    }
}

/// What a peripheral constructor may use.
#[derive(Debug, Clone, Copy)]
pub struct PeripheralEnv<'a> {
    /// The device hardware.
    pub hardware: &'a Hardware,
    /// The live peripherals, for peripherals built on top of others.
    pub peripherals: &'a PeripheralController,
}

/// The sentinel returned when a peripheral could not be constructed.
#[derive(Debug)]
pub struct InvalidPeripheral {
    error: Error,
}

impl InvalidPeripheral {
    /// Creates an [`InvalidPeripheral`] carrying the reason of the failure.
    #[must_use]
    pub const fn new(error: Error) -> Self {
        Self { error }
    }
}

impl Peripheral for InvalidPeripheral {
    fn type_name(&self) -> &'static str {
        "InvalidPeripheral"
    }

    fn error(&self) -> Option<&Error> {
        Some(&self.error)
    }
}

pub(crate) fn shared(peripheral: impl Peripheral + 'static) -> PeripheralRef {
    Rc::new(RefCell::new(peripheral))
}

/// Creates the error returned when a peripheral lacks a capability.
#[must_use]
pub fn unsupported_capability(capability: Capability, uuid: &Uuid, type_name: &str) -> Error {
    Error::new(
        ErrorKind::Protocol,
        format!("{capability} capability not supported: {uuid} is a {type_name}"),
    )
}

/// Creates the error returned when a value targets another data point type.
#[must_use]
pub fn mismatching_data_point_type(expected: &Uuid, received: &Uuid) -> Error {
    Error::runtime(format!(
        "Mismatching data point type. Got: {received} instead of {expected}"
    ))
}
