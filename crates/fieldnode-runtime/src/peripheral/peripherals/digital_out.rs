use embedded_hal::digital::PinState;

use uuid::Uuid;

use fieldnode::parameters::Parameters;
use fieldnode::telemetry::ValueUnit;

use crate::error::Result;
use crate::hal::{DynOutputPin, interface_error};

use super::super::{
    Capability, GetValues, Peripheral, PeripheralEnv, PeripheralRef, SetValue,
    mismatching_data_point_type, shared,
};
use super::{DATA_POINT_TYPE_KEY, PIN_KEY};

/// A GPIO output.
///
/// Values are clamped to `[0, 1]` and rounded, so anything from `0.5`
/// upwards switches the output on.
pub struct DigitalOut {
    pin_number: u8,
    pin: DynOutputPin,
    data_point_type: Uuid,
    active_low: bool,
    state: bool,
}

impl DigitalOut {
    /// Type name.
    pub const TYPE_NAME: &'static str = "DigitalOut";
    /// Implemented capabilities.
    pub const CAPABILITIES: &'static [Capability] = &[Capability::SetValue, Capability::GetValues];

    /// Configures the output.
    ///
    /// # Errors
    ///
    /// An error is returned when a parameter is missing or malformed, or
    /// when the pin cannot be configured.
    pub fn new(parameters: &Parameters<'_>, env: &PeripheralEnv<'_>) -> Result<Self> {
        let pin_number = parameters.pin(PIN_KEY)?;
        let data_point_type = parameters.uuid(DATA_POINT_TYPE_KEY)?;
        let initial_state = parameters.optional_bool("initial_state")?;
        let active_low = parameters.optional_bool("active_low")?.unwrap_or(false);

        let pin = env.hardware.board().output_pin(pin_number)?;
        let mut output = Self {
            pin_number,
            pin,
            data_point_type,
            active_low,
            state: false,
        };
        if let Some(state) = initial_state {
            output.write(state)?;
        }

        Ok(output)
    }

    pub(crate) fn create(
        parameters: &Parameters<'_>,
        env: &PeripheralEnv<'_>,
    ) -> Result<PeripheralRef> {
        Self::new(parameters, env).map(shared)
    }

    fn write(&mut self, state: bool) -> Result<()> {
        let level = PinState::from(state != self.active_low);
        self.pin
            .set_state(level)
            .map_err(|e| interface_error(format_args!("Pin {}", self.pin_number), e))?;
        self.state = state;
        Ok(())
    }
}

impl SetValue for DigitalOut {
    fn set_value(&mut self, value: &ValueUnit) -> Result<()> {
        if value.data_point_type != self.data_point_type {
            return Err(mismatching_data_point_type(
                &self.data_point_type,
                &value.data_point_type,
            ));
        }

        self.write(value.value.clamp(0.0, 1.0).round() >= 1.0)
    }
}

impl GetValues for DigitalOut {
    fn get_values(&mut self) -> Result<Vec<ValueUnit>> {
        Ok(vec![ValueUnit::new(
            f32::from(u8::from(self.state)),
            self.data_point_type,
        )])
    }
}

impl Peripheral for DigitalOut {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn as_set_value(&mut self) -> Option<&mut dyn SetValue> {
        Some(self)
    }

    fn as_get_values(&mut self) -> Option<&mut dyn GetValues> {
        Some(self)
    }
}
