use uuid::Uuid;

use fieldnode::parameters::{ParameterError, Parameters};
use fieldnode::telemetry::ValueUnit;

use crate::error::Result;
use crate::hal::{DynInputPin, Pull, interface_error};

use super::super::{Capability, GetValues, Peripheral, PeripheralEnv, PeripheralRef, shared};
use super::{DATA_POINT_TYPE_KEY, PIN_KEY};

const INPUT_TYPE_KEY: &str = "input_type";

/// A GPIO input, read as `0` or `1`.
pub struct DigitalIn {
    pin_number: u8,
    pin: DynInputPin,
    data_point_type: Uuid,
}

impl DigitalIn {
    /// Type name.
    pub const TYPE_NAME: &'static str = "DigitalIn";
    /// Implemented capabilities.
    pub const CAPABILITIES: &'static [Capability] = &[Capability::GetValues];

    /// Configures the input.
    ///
    /// The `input_type` parameter selects the internal resistor: one of
    /// `floating`, `pullup`, or `pulldown`.
    ///
    /// # Errors
    ///
    /// An error is returned when a parameter is missing or malformed, or
    /// when the pin cannot be configured.
    pub fn new(parameters: &Parameters<'_>, env: &PeripheralEnv<'_>) -> Result<Self> {
        let pin_number = parameters.pin(PIN_KEY)?;
        let data_point_type = parameters.uuid(DATA_POINT_TYPE_KEY)?;
        let pull = Pull::from_name(parameters.str(INPUT_TYPE_KEY)?).ok_or(
            ParameterError::invalid(INPUT_TYPE_KEY, "floating, pullup or pulldown"),
        )?;

        let pin = env.hardware.board().input_pin(pin_number, pull)?;

        Ok(Self {
            pin_number,
            pin,
            data_point_type,
        })
    }

    pub(crate) fn create(
        parameters: &Parameters<'_>,
        env: &PeripheralEnv<'_>,
    ) -> Result<PeripheralRef> {
        Self::new(parameters, env).map(shared)
    }
}

impl GetValues for DigitalIn {
    fn get_values(&mut self) -> Result<Vec<ValueUnit>> {
        let high = self
            .pin
            .is_high()
            .map_err(|e| interface_error(format_args!("Pin {}", self.pin_number), e))?;

        Ok(vec![ValueUnit::new(
            f32::from(u8::from(high)),
            self.data_point_type,
        )])
    }
}

impl Peripheral for DigitalIn {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn as_get_values(&mut self) -> Option<&mut dyn GetValues> {
        Some(self)
    }
}
