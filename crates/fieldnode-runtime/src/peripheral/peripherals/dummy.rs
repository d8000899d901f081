use std::time::Duration;

use uuid::Uuid;

use fieldnode::parameters::Parameters;
use fieldnode::telemetry::ValueUnit;

use crate::error::{Error, Result};

use super::super::{
    Calibrate, Capability, GetValues, Peripheral, PeripheralEnv, PeripheralRef, SetValue,
    StartMeasurement, Step, mismatching_data_point_type, shared,
};
use super::DATA_POINT_TYPE_KEY;

const DEFAULT_STEP: Duration = Duration::from_millis(100);

/// A software peripheral holding a single value.
///
/// It implements every sensor and actuator capability without touching any
/// hardware, which makes it useful to commission a device and to exercise
/// tasks. A measurement waits `measurement_ms` (100 by default), and a
/// calibration runs `steps` steps of `step_ms` each before storing
/// `calibration_value`, if any.
pub struct DummyPeripheral {
    data_point_type: Uuid,
    value: f32,
    step: Duration,
    remaining_steps: Option<u64>,
    calibration_value: Option<f32>,
}

impl DummyPeripheral {
    /// Type name.
    pub const TYPE_NAME: &'static str = "DummyPeripheral";
    /// Implemented capabilities.
    pub const CAPABILITIES: &'static [Capability] = &[
        Capability::GetValues,
        Capability::SetValue,
        Capability::StartMeasurement,
        Capability::Calibrate,
    ];

    /// Creates the peripheral, holding an optional `initial_value`.
    ///
    /// # Errors
    ///
    /// An error is returned when a parameter is missing or malformed.
    pub fn new(parameters: &Parameters<'_>, _env: &PeripheralEnv<'_>) -> Result<Self> {
        Ok(Self {
            data_point_type: parameters.uuid(DATA_POINT_TYPE_KEY)?,
            value: parameters.optional_f32("initial_value")?.unwrap_or(0.0),
            step: DEFAULT_STEP,
            remaining_steps: None,
            calibration_value: None,
        })
    }

    pub(crate) fn create(
        parameters: &Parameters<'_>,
        env: &PeripheralEnv<'_>,
    ) -> Result<PeripheralRef> {
        Self::new(parameters, env).map(shared)
    }

    /// Returns the stored value.
    #[must_use]
    pub const fn value(&self) -> f32 {
        self.value
    }

    /// Returns whether a calibration is running.
    #[must_use]
    pub const fn is_calibrating(&self) -> bool {
        self.remaining_steps.is_some()
    }
}

impl GetValues for DummyPeripheral {
    fn get_values(&mut self) -> Result<Vec<ValueUnit>> {
        Ok(vec![ValueUnit::new(self.value, self.data_point_type)])
    }
}

impl SetValue for DummyPeripheral {
    fn set_value(&mut self, value: &ValueUnit) -> Result<()> {
        if value.data_point_type != self.data_point_type {
            return Err(mismatching_data_point_type(
                &self.data_point_type,
                &value.data_point_type,
            ));
        }
        self.value = value.value;
        Ok(())
    }
}

impl StartMeasurement for DummyPeripheral {
    fn start_measurement(&mut self, parameters: &Parameters<'_>) -> Result<Step> {
        let wait = parameters
            .optional_u64("measurement_ms")?
            .map_or(DEFAULT_STEP, Duration::from_millis);
        Ok(Step::Wait(wait))
    }

    fn handle_measurement(&mut self) -> Result<Step> {
        Ok(Step::Done)
    }
}

impl Calibrate for DummyPeripheral {
    fn start_calibration(&mut self, parameters: &Parameters<'_>) -> Result<Step> {
        if self.is_calibrating() {
            return Err(Error::runtime("Calibration already running"));
        }

        let steps = parameters.optional_u64("steps")?.unwrap_or(1);
        self.step = parameters
            .optional_u64("step_ms")?
            .map_or(DEFAULT_STEP, Duration::from_millis);
        self.calibration_value = parameters.optional_f32("calibration_value")?;
        self.remaining_steps = Some(steps);

        Ok(Step::Wait(self.step))
    }

    fn handle_calibration(&mut self) -> Result<Step> {
        let Some(remaining) = self.remaining_steps else {
            return Err(Error::runtime("No calibration running"));
        };

        if remaining > 1 {
            self.remaining_steps = Some(remaining - 1);
            return Ok(Step::Wait(self.step));
        }

        self.remaining_steps = None;
        if let Some(value) = self.calibration_value.take() {
            self.value = value;
        }
        Ok(Step::Done)
    }
}

impl Peripheral for DummyPeripheral {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn as_get_values(&mut self) -> Option<&mut dyn GetValues> {
        Some(self)
    }

    fn as_set_value(&mut self) -> Option<&mut dyn SetValue> {
        Some(self)
    }

    fn as_calibrate(&mut self) -> Option<&mut dyn Calibrate> {
        Some(self)
    }

    fn as_start_measurement(&mut self) -> Option<&mut dyn StartMeasurement> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use fieldnode::parameters::Parameters;
    use fieldnode::telemetry::ValueUnit;

    use crate::tests::{DATA_POINT_TYPE, data_point_type, test_controller};

    use super::super::super::{Calibrate, Step};
    use super::DummyPeripheral;

    #[test]
    fn calibration_steps() {
        let (controller, _) = test_controller();
        let value = json!({"data_point_type": DATA_POINT_TYPE});
        let mut dummy =
            DummyPeripheral::new(&Parameters::from_value(&value).unwrap(), &controller.env())
                .unwrap();

        let calibration = json!({"steps": 2, "step_ms": 50, "calibration_value": 7.0});
        assert_eq!(
            dummy
                .start_calibration(&Parameters::from_value(&calibration).unwrap())
                .unwrap(),
            Step::Wait(Duration::from_millis(50))
        );
        assert!(dummy.start_calibration(&Parameters::from_value(&calibration).unwrap()).is_err());

        assert_eq!(
            dummy.handle_calibration().unwrap(),
            Step::Wait(Duration::from_millis(50))
        );
        assert_eq!(dummy.handle_calibration().unwrap(), Step::Done);
        assert!(!dummy.is_calibrating());
        assert!((dummy.value() - 7.0).abs() < f32::EPSILON);
    }

    #[test]
    fn stores_values() {
        use super::super::super::{GetValues, SetValue};

        let (controller, _) = test_controller();
        let value = json!({"data_point_type": DATA_POINT_TYPE, "initial_value": 1.5});
        let mut dummy =
            DummyPeripheral::new(&Parameters::from_value(&value).unwrap(), &controller.env())
                .unwrap();

        assert_eq!(
            dummy.get_values().unwrap(),
            vec![ValueUnit::new(1.5, data_point_type())]
        );
        dummy
            .set_value(&ValueUnit::new(3.0, data_point_type()))
            .unwrap();
        assert!((dummy.value() - 3.0).abs() < f32::EPSILON);
    }
}
