use fieldnode::color::Color;
use fieldnode::parameters::Parameters;

use crate::error::{Error, Result};
use crate::peripheral::Capability;

use super::super::{BoundPeripheral, Context, Flow, Schedule, Task, TaskEnv};

/// Shows a color on an LED strip.
///
/// Takes either a `color` object (`red`, `green`, `blue`, optional `white`)
/// or a `brightness` between 0 and 1 applied to every channel.
#[derive(Debug)]
pub struct SetRgbLed {
    strip: BoundPeripheral,
    color: Color,
}

impl SetRgbLed {
    /// Type name.
    pub const TYPE_NAME: &'static str = "SetRgbLed";

    /// Creates the task.
    ///
    /// # Errors
    ///
    /// An error is returned when both or none of `color` and `brightness`
    /// are set, when a color component is malformed, or when the peripheral
    /// is not an LED strip.
    pub fn new(parameters: &Parameters<'_>, env: &TaskEnv<'_>) -> Result<Self> {
        let strip = BoundPeripheral::resolve(parameters, env, Capability::LedStrip)?;

        let brightness = parameters.optional_f32("brightness")?;
        let color = match (parameters.contains("color"), brightness) {
            (true, None) => {
                let color = parameters.object("color")?;
                Color::rgbw(
                    color.u8("red")?,
                    color.u8("green")?,
                    color.u8("blue")?,
                    color.optional_u8("white")?.unwrap_or(0),
                )
            }
            (false, Some(brightness)) => Color::from_brightness(brightness),
            _ => {
                return Err(Error::construction(
                    "Either set brightness (float) or color (object)",
                ));
            }
        };

        Ok(Self { strip, color })
    }

    pub(crate) fn create(parameters: &Parameters<'_>, env: &TaskEnv<'_>) -> Result<Box<dyn Task>> {
        Ok(Box::new(Self::new(parameters, env)?))
    }
}

impl Task for SetRgbLed {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn on_enable(&mut self, _ctx: &mut Context<'_>) -> Result<Schedule> {
        Ok(Schedule::once())
    }

    fn callback(&mut self, _ctx: &mut Context<'_>) -> Result<Flow> {
        self.strip.turn_on(self.color)?;
        Ok(Flow::Finish)
    }
}
