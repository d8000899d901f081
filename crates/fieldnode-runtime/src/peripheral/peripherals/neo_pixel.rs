use fieldnode::color::Color;
use fieldnode::parameters::{ParameterError, Parameters};

use crate::error::{Error, Result};
use crate::hal::{ColorEncoding, LedDriver};

use super::super::{Capability, LedStrip, Peripheral, PeripheralEnv, PeripheralRef, shared};

const COLOR_ENCODING_KEY: &str = "color_encoding";

/// A strip of addressable RGB or RGBW LEDs.
pub struct NeoPixel {
    driver: Box<dyn LedDriver>,
    encoding: ColorEncoding,
    color: Color,
}

impl NeoPixel {
    /// Type name.
    pub const TYPE_NAME: &'static str = "NeoPixel";
    /// Implemented capabilities.
    pub const CAPABILITIES: &'static [Capability] = &[Capability::LedStrip];

    /// Configures the strip.
    ///
    /// The `color_encoding` parameter is any ordering of `rgb` or `rgbw`,
    /// such as `grb` or `WRGB`.
    ///
    /// # Errors
    ///
    /// An error is returned when a parameter is missing or malformed.
    pub fn new(parameters: &Parameters<'_>, env: &PeripheralEnv<'_>) -> Result<Self> {
        let name = parameters.str(COLOR_ENCODING_KEY)?;
        let pin = parameters.pin("led_pin")?;
        let led_count = u16::try_from(parameters.u64("led_count")?)
            .map_err(|_| ParameterError::invalid("led_count", "unsigned int up to 65535"))?;

        let encoding = ColorEncoding::from_name(name)
            .ok_or_else(|| Error::construction(format!("Invalid color encoding value: {name}")))?;

        let driver = env.hardware.board().led_strip(pin, led_count, encoding)?;

        Ok(Self {
            driver,
            encoding,
            color: Color::default(),
        })
    }

    pub(crate) fn create(
        parameters: &Parameters<'_>,
        env: &PeripheralEnv<'_>,
    ) -> Result<PeripheralRef> {
        Self::new(parameters, env).map(shared)
    }

    /// Returns the color currently shown.
    #[must_use]
    pub const fn color(&self) -> Color {
        self.color
    }

    /// Returns the color encoding of the strip.
    #[must_use]
    pub const fn encoding(&self) -> ColorEncoding {
        self.encoding
    }
}

impl LedStrip for NeoPixel {
    fn turn_on(&mut self, color: Color) -> Result<()> {
        self.driver.fill(color)?;
        self.color = color;
        Ok(())
    }

    fn turn_off(&mut self) -> Result<()> {
        self.driver.fill(Color::default())?;
        self.color = Color::default();
        Ok(())
    }
}

impl Peripheral for NeoPixel {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn as_led_strip(&mut self) -> Option<&mut dyn LedStrip> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use fieldnode::color::Color;
    use fieldnode::parameters::Parameters;

    use crate::tests::test_controller;

    use super::super::super::Peripheral;
    use super::NeoPixel;

    #[test]
    fn turn_on_and_off() {
        let (controller, board) = test_controller();
        let value = json!({"color_encoding": "GRBW", "led_pin": 27, "led_count": 8});
        let parameters = Parameters::from_value(&value).unwrap();
        let mut strip = NeoPixel::new(&parameters, &controller.env()).unwrap();
        assert!(strip.encoding().has_white());

        let color = Color::rgb(255, 64, 0);
        strip.as_led_strip().unwrap().turn_on(color).unwrap();
        assert_eq!(board.strip(27), Some(color));

        strip.as_led_strip().unwrap().turn_off().unwrap();
        assert_eq!(board.strip(27), Some(Color::default()));
        assert!(strip.color().is_off());
    }

    #[test]
    fn invalid_color_encoding() {
        let (controller, _) = test_controller();
        let value = json!({"color_encoding": "rgbx", "led_pin": 27, "led_count": 8});
        let parameters = Parameters::from_value(&value).unwrap();

        assert_eq!(
            NeoPixel::new(&parameters, &controller.env())
                .err()
                .unwrap()
                .to_string(),
            "Invalid color encoding value: rgbx"
        );
    }
}
