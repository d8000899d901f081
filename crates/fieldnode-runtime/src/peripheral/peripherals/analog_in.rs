use std::ops::RangeInclusive;

use uuid::Uuid;

use fieldnode::parameters::{ParameterError, Parameters};
use fieldnode::telemetry::ValueUnit;

use crate::error::{Error, Result};
use crate::hal::{ADC_REFERENCE_VOLTAGE, ADC_RESOLUTION, AdcChannel};

use super::super::{Capability, GetValues, Peripheral, PeripheralEnv, PeripheralRef, shared};
use super::PIN_KEY;

const ADC_PINS: RangeInclusive<u8> = 32..=39;

// Linear mapping from a voltage onto an arbitrary unit.
#[derive(Debug, Clone, Copy, PartialEq)]
struct UnitMapping {
    data_point_type: Uuid,
    min_v: f32,
    min_unit: f32,
    max_unit: f32,
    slope: f32,
    limit: bool,
}

impl UnitMapping {
    fn parse(parameters: &Parameters<'_>) -> Result<Option<Self>> {
        let Some(data_point_type) = parameters.optional_uuid("unit_data_point_type")? else {
            return Ok(None);
        };

        let min_v = parameters.f32("min_v")?;
        let max_v = parameters.f32("max_v")?;
        let min_unit = parameters.f32("min_unit")?;
        let max_unit = parameters.f32("max_unit")?;
        let limit = parameters.optional_bool("limit_unit")?.unwrap_or(false);

        if (max_v - min_v).abs() < f32::EPSILON {
            return Err(ParameterError::invalid("max_v", "float different from min_v").into());
        }

        Ok(Some(Self {
            data_point_type,
            min_v,
            min_unit,
            max_unit,
            slope: (max_unit - min_unit) / (max_v - min_v),
            limit,
        }))
    }

    fn map(&self, voltage: f32) -> f32 {
        let value = self.min_unit + self.slope * (voltage - self.min_v);
        if !self.limit {
            return value;
        }

        let (low, high) = if self.min_unit < self.max_unit {
            (self.min_unit, self.max_unit)
        } else {
            (self.max_unit, self.min_unit)
        };
        value.clamp(low, high)
    }
}

/// An analog input of the ADC.
///
/// Each sample can be reported as a voltage, as a fraction of the full
/// scale, and as a value linearly mapped onto another unit.
pub struct AnalogIn {
    channel: Box<dyn AdcChannel>,
    voltage_data_point_type: Option<Uuid>,
    percent_data_point_type: Option<Uuid>,
    unit: Option<UnitMapping>,
}

impl AnalogIn {
    /// Type name.
    pub const TYPE_NAME: &'static str = "AnalogIn";
    /// Implemented capabilities.
    pub const CAPABILITIES: &'static [Capability] = &[Capability::GetValues];

    /// Configures the input.
    ///
    /// # Errors
    ///
    /// An error is returned when the pin is not an ADC pin, when no data
    /// point type is set, or when the unit mapping is malformed.
    pub fn new(parameters: &Parameters<'_>, env: &PeripheralEnv<'_>) -> Result<Self> {
        let pin = parameters.pin(PIN_KEY)?;
        if !ADC_PINS.contains(&pin) {
            return Err(Error::construction("Pin # not valid (only ADC1: 32 - 39)"));
        }

        let voltage_data_point_type = parameters.optional_uuid("voltage_data_point_type")?;
        let percent_data_point_type = parameters.optional_uuid("percent_data_point_type")?;
        let unit = UnitMapping::parse(parameters)?;
        if voltage_data_point_type.is_none() && percent_data_point_type.is_none() && unit.is_none()
        {
            return Err(Error::construction("No data point type set"));
        }

        let channel = env.hardware.board().adc_channel(pin)?;

        Ok(Self {
            channel,
            voltage_data_point_type,
            percent_data_point_type,
            unit,
        })
    }

    pub(crate) fn create(
        parameters: &Parameters<'_>,
        env: &PeripheralEnv<'_>,
    ) -> Result<PeripheralRef> {
        Self::new(parameters, env).map(shared)
    }
}

impl GetValues for AnalogIn {
    fn get_values(&mut self) -> Result<Vec<ValueUnit>> {
        let raw = f32::from(self.channel.read_raw()?);
        let fraction = raw / f32::from(ADC_RESOLUTION);
        let voltage = fraction * ADC_REFERENCE_VOLTAGE;

        let mut values = Vec::with_capacity(3);
        if let Some(data_point_type) = self.voltage_data_point_type {
            values.push(ValueUnit::new(voltage, data_point_type));
        }
        if let Some(data_point_type) = self.percent_data_point_type {
            values.push(ValueUnit::new(fraction, data_point_type));
        }
        if let Some(unit) = &self.unit {
            values.push(ValueUnit::new(unit.map(voltage), unit.data_point_type));
        }

        Ok(values)
    }
}

impl Peripheral for AnalogIn {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn as_get_values(&mut self) -> Option<&mut dyn GetValues> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use fieldnode::parameters::Parameters;

    use crate::tests::{DATA_POINT_TYPE, OTHER_DATA_POINT_TYPE, test_controller};

    use super::super::super::Peripheral;
    use super::AnalogIn;

    #[test]
    fn voltage_and_limited_unit() {
        let (controller, board) = test_controller();
        let value = json!({
            "pin": 34,
            "voltage_data_point_type": DATA_POINT_TYPE,
            "unit_data_point_type": OTHER_DATA_POINT_TYPE,
            "min_v": 0.0,
            "max_v": 1.0,
            "min_unit": 0.0,
            "max_unit": 100.0,
            "limit_unit": true,
        });
        let parameters = Parameters::from_value(&value).unwrap();
        let mut input = AnalogIn::new(&parameters, &controller.env()).unwrap();

        board.set_adc(34, 2048);
        let values = input.as_get_values().unwrap().get_values().unwrap();

        assert_eq!(values.len(), 2);
        assert!((values[0].value - 1.65).abs() < 1e-4);
        // 1.65 V maps to 165 units, limited to 100.
        assert!((values[1].value - 100.0).abs() < 1e-4);
    }

    #[test]
    fn rejects_non_adc_pins() {
        let (controller, _) = test_controller();
        let value = json!({"pin": 4, "voltage_data_point_type": DATA_POINT_TYPE});
        let parameters = Parameters::from_value(&value).unwrap();

        assert_eq!(
            AnalogIn::new(&parameters, &controller.env())
                .err()
                .unwrap()
                .to_string(),
            "Pin # not valid (only ADC1: 32 - 39)"
        );
    }

    #[test]
    fn requires_a_data_point_type() {
        let (controller, _) = test_controller();
        let value = json!({"pin": 33});
        let parameters = Parameters::from_value(&value).unwrap();

        assert_eq!(
            AnalogIn::new(&parameters, &controller.env())
                .err()
                .unwrap()
                .to_string(),
            "No data point type set"
        );
    }
}
