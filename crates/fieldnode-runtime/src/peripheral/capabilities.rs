use std::time::Duration;

use fieldnode::color::Color;
use fieldnode::parameters::Parameters;
use fieldnode::telemetry::ValueUnit;

use crate::error::Result;

/// The outcome of one step of a multi-step operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Call again once the duration has elapsed.
    Wait(Duration),
    /// The operation is complete.
    Done,
}

/// A narrow interface a peripheral may implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// See [`GetValues`].
    GetValues,
    /// See [`SetValue`].
    SetValue,
    /// See [`Calibrate`].
    Calibrate,
    /// See [`StartMeasurement`].
    StartMeasurement,
    /// See [`LedStrip`].
    LedStrip,
}

impl Capability {
    /// Every capability.
    pub const ALL: [Self; 5] = [
        Self::GetValues,
        Self::SetValue,
        Self::Calibrate,
        Self::StartMeasurement,
        Self::LedStrip,
    ];

    /// Returns the capability name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::GetValues => "GetValues",
            Self::SetValue => "SetValue",
            Self::Calibrate => "Calibrate",
            Self::StartMeasurement => "StartMeasurement",
            Self::LedStrip => "LedStrip",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.name().fmt(f)
    }
}

/// Reads the current values of a peripheral.
pub trait GetValues {
    /// Reads one value per data point type the peripheral provides.
    ///
    /// # Errors
    ///
    /// An error is returned when the hardware cannot be read.
    fn get_values(&mut self) -> Result<Vec<ValueUnit>>;
}

/// Drives an actuator.
pub trait SetValue {
    /// Applies a value.
    ///
    /// # Errors
    ///
    /// An error is returned when the data point type does not belong to the
    /// peripheral or when the hardware cannot be written.
    fn set_value(&mut self, value: &ValueUnit) -> Result<()>;
}

/// Calibrates a sensor through a sequence of timed steps.
pub trait Calibrate {
    /// Starts a calibration.
    ///
    /// # Errors
    ///
    /// An error is returned when the parameters are invalid or when the
    /// sensor rejects the calibration.
    fn start_calibration(&mut self, parameters: &Parameters<'_>) -> Result<Step>;

    /// Advances a running calibration.
    ///
    /// # Errors
    ///
    /// An error is returned when the calibration fails.
    fn handle_calibration(&mut self) -> Result<Step>;
}

/// Requests a measurement whose result is ready only after some time.
///
/// Once [`StartMeasurement::handle_measurement`] returns [`Step::Done`], the
/// values are read through [`GetValues`].
pub trait StartMeasurement {
    /// Starts a measurement.
    ///
    /// # Errors
    ///
    /// An error is returned when the measurement cannot be started.
    fn start_measurement(&mut self, parameters: &Parameters<'_>) -> Result<Step>;

    /// Checks whether the measurement is ready.
    ///
    /// # Errors
    ///
    /// An error is returned when the measurement failed.
    fn handle_measurement(&mut self) -> Result<Step>;
}

/// Controls a strip of LEDs.
pub trait LedStrip {
    /// Shows a color on the whole strip.
    ///
    /// # Errors
    ///
    /// An error is returned when the strip cannot be updated.
    fn turn_on(&mut self, color: Color) -> Result<()>;

    /// Turns the strip off.
    ///
    /// # Errors
    ///
    /// An error is returned when the strip cannot be updated.
    fn turn_off(&mut self) -> Result<()>;
}
