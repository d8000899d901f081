use uuid::Uuid;

use fieldnode::parameters::Parameters;
use fieldnode::telemetry::ValueUnit;

use crate::error::Result;
use crate::hal::{DynPwm, PwmChannel, interface_error};

use super::super::{
    Capability, Peripheral, PeripheralEnv, PeripheralRef, SetValue, mismatching_data_point_type,
    shared,
};
use super::{DATA_POINT_TYPE_KEY, PIN_KEY};

/// A PWM output driven by one of the hardware channels.
///
/// The channel is given back when the peripheral is destroyed.
pub struct Pwm {
    output: DynPwm,
    channel: PwmChannel,
    data_point_type: Uuid,
}

impl Pwm {
    /// Type name.
    pub const TYPE_NAME: &'static str = "PWM";
    /// Implemented capabilities.
    pub const CAPABILITIES: &'static [Capability] = &[Capability::SetValue];

    /// Attaches the pin to a free channel.
    ///
    /// # Errors
    ///
    /// An error is returned when a parameter is missing or malformed, or
    /// when all channels are taken.
    pub fn new(parameters: &Parameters<'_>, env: &PeripheralEnv<'_>) -> Result<Self> {
        let pin = parameters.pin(PIN_KEY)?;
        let data_point_type = parameters.uuid(DATA_POINT_TYPE_KEY)?;

        let channel = env.hardware.take_pwm_channel()?;
        let output = env.hardware.board().pwm_output(pin, channel.channel())?;

        Ok(Self {
            output,
            channel,
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

impl SetValue for Pwm {
    fn set_value(&mut self, value: &ValueUnit) -> Result<()> {
        if value.data_point_type != self.data_point_type {
            return Err(mismatching_data_point_type(
                &self.data_point_type,
                &value.data_point_type,
            ));
        }

        let max = f32::from(self.output.max_duty_cycle());
        let duty = (value.value.clamp(0.0, 1.0) * max).round() as u16;
        self.output
            .set_duty_cycle(duty)
            .map_err(|e| interface_error(format_args!("PWM channel {}", self.channel.channel()), e))
    }
}

impl Peripheral for Pwm {
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

    use crate::tests::{DATA_POINT_TYPE, data_point_type, test_controller};

    use super::super::super::Peripheral;
    use super::Pwm;

    #[test]
    fn duty_cycle_and_channel_release() {
        let (controller, board) = test_controller();
        let value = json!({"pin": 32, "data_point_type": DATA_POINT_TYPE});
        let parameters = Parameters::from_value(&value).unwrap();

        let mut pwm = Pwm::new(&parameters, &controller.env()).unwrap();
        pwm.as_set_value()
            .unwrap()
            .set_value(&ValueUnit::new(0.5, data_point_type()))
            .unwrap();
        assert_eq!(board.duty(32), Some(128));

        let mut channels = (1..16)
            .map(|_| Pwm::new(&parameters, &controller.env()).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(
            Pwm::new(&parameters, &controller.env())
                .err()
                .unwrap()
                .to_string(),
            "No remaining PWM channels available"
        );

        let _ = channels.pop();
        assert!(Pwm::new(&parameters, &controller.env()).is_ok());
        drop(pwm);
    }
}
