use uuid::Uuid;

use fieldnode::parameters::Parameters;
use fieldnode::telemetry::ValueUnit;

use crate::error::{Error, Result};
use crate::hal::{ADC_REFERENCE_VOLTAGE, DacChannel};

use super::super::{
    Capability, Peripheral, PeripheralEnv, PeripheralRef, SetValue, mismatching_data_point_type,
    shared,
};
use super::PIN_KEY;

const DAC_PINS: [u8; 2] = [25, 26];

#[derive(Debug, Clone, Copy)]
enum Scale {
    Voltage(Uuid),
    Percent(Uuid),
}

/// An analog output of the DAC.
///
/// Values are either a voltage in `[0, 3.3]` or a fraction in `[0, 1]`,
/// depending on which data point type was configured.
pub struct AnalogOut {
    channel: Box<dyn DacChannel>,
    scale: Scale,
}

impl AnalogOut {
    /// Type name.
    pub const TYPE_NAME: &'static str = "AnalogOut";
    /// Implemented capabilities.
    pub const CAPABILITIES: &'static [Capability] = &[Capability::SetValue];

    /// Configures the output.
    ///
    /// Exactly one of `voltage_data_point_type` and `percent_data_point_type`
    /// must be set.
    ///
    /// # Errors
    ///
    /// An error is returned when the pin is not a DAC pin or when the data
    /// point types are not set correctly.
    pub fn new(parameters: &Parameters<'_>, env: &PeripheralEnv<'_>) -> Result<Self> {
        let pin = parameters.pin(PIN_KEY)?;
        if !DAC_PINS.contains(&pin) {
            return Err(Error::construction("Pin # not valid (only 25, 26)"));
        }

        let scale = match (
            parameters.optional_uuid("voltage_data_point_type")?,
            parameters.optional_uuid("percent_data_point_type")?,
        ) {
            (Some(voltage), None) => Scale::Voltage(voltage),
            (None, Some(percent)) => Scale::Percent(percent),
            _ => {
                return Err(Error::construction(
                    "Set either voltage_data_point_type or percent_data_point_type",
                ));
            }
        };

        let channel = env.hardware.board().dac_channel(pin)?;

        Ok(Self { channel, scale })
    }

    pub(crate) fn create(
        parameters: &Parameters<'_>,
        env: &PeripheralEnv<'_>,
    ) -> Result<PeripheralRef> {
        Self::new(parameters, env).map(shared)
    }
}

impl SetValue for AnalogOut {
    fn set_value(&mut self, value: &ValueUnit) -> Result<()> {
        let (data_point_type, max) = match self.scale {
            Scale::Voltage(data_point_type) => (data_point_type, ADC_REFERENCE_VOLTAGE),
            Scale::Percent(data_point_type) => (data_point_type, 1.0),
        };
        if value.data_point_type != data_point_type {
            return Err(mismatching_data_point_type(
                &data_point_type,
                &value.data_point_type,
            ));
        }

        let clamped = value.value.clamp(0.0, max);
        self.channel.write((clamped * 255.0 / max).round() as u8)
    }
}

impl Peripheral for AnalogOut {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn as_set_value(&mut self) -> Option<&mut dyn SetValue> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use fieldnode::parameters::Parameters;
    use fieldnode::telemetry::ValueUnit;

    use crate::tests::{DATA_POINT_TYPE, OTHER_DATA_POINT_TYPE, data_point_type, test_controller};

    use super::super::super::Peripheral;
    use super::AnalogOut;

    #[test]
    fn scales_voltage() {
        let (controller, board) = test_controller();
        let value = json!({"pin": 25, "voltage_data_point_type": DATA_POINT_TYPE});
        let parameters = Parameters::from_value(&value).unwrap();
        let mut output = AnalogOut::new(&parameters, &controller.env()).unwrap();

        let set_value = output.as_set_value().unwrap();
        set_value
            .set_value(&ValueUnit::new(1.65, data_point_type()))
            .unwrap();
        assert_eq!(board.dac(25), Some(128));

        set_value
            .set_value(&ValueUnit::new(10.0, data_point_type()))
            .unwrap();
        assert_eq!(board.dac(25), Some(255));
    }

    #[test]
    fn exactly_one_data_point_type() {
        let (controller, _) = test_controller();
        let value = json!({
            "pin": 26,
            "voltage_data_point_type": DATA_POINT_TYPE,
            "percent_data_point_type": OTHER_DATA_POINT_TYPE,
        });
        let parameters = Parameters::from_value(&value).unwrap();

        assert!(AnalogOut::new(&parameters, &controller.env()).is_err());
    }
}
