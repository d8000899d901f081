use std::cell::{RefCell, RefMut};
use std::rc::Rc;

use embedded_hal::digital::{self, InputPin, OutputPin};
use embedded_hal::i2c::{self, I2c};
use embedded_hal::pwm::{self, SetDutyCycle};

use fieldnode::color::Color;

use crate::error::{Error, Result};

/// Mock hardware for host testing and simulation.
pub mod mock;
mod resources;

pub use resources::{I2cBusLease, PwmChannel, ResourcePool};

/// A type-erased digital output pin.
pub type DynOutputPin = Box<dyn OutputPin<Error = digital::ErrorKind>>;
/// A type-erased digital input pin.
pub type DynInputPin = Box<dyn InputPin<Error = digital::ErrorKind>>;
/// A type-erased PWM output.
pub type DynPwm = Box<dyn SetDutyCycle<Error = pwm::ErrorKind>>;
/// A type-erased I²C bus.
pub type DynI2c = Box<dyn I2c<Error = i2c::ErrorKind>>;

/// Resolution of the analog-to-digital converter, in counts.
pub const ADC_RESOLUTION: u16 = 4096;
/// Reference voltage of the analog-to-digital converter.
pub const ADC_REFERENCE_VOLTAGE: f32 = 3.3;

// Wraps the error of an `embedded-hal` interface.
pub(crate) fn interface_error(context: impl std::fmt::Display, e: impl std::fmt::Debug) -> Error {
    Error::hardware(format!("{context}: {e:?}"))
}

/// The internal resistor configuration of an input pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    /// No internal resistor.
    Floating,
    /// Internal pull-up resistor.
    Up,
    /// Internal pull-down resistor.
    Down,
}

impl Pull {
    /// Parses a [`Pull`] from its parameter name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "floating" => Some(Self::Floating),
            "pullup" => Some(Self::Up),
            "pulldown" => Some(Self::Down),
            _ => None,
        }
    }
}

/// A color channel of an LED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Red.
    Red,
    /// Green.
    Green,
    /// Blue.
    Blue,
    /// White.
    White,
}

/// The order in which an LED strip expects its color channels.
///
/// Parsed from any permutation of `rgb` or `rgbw`, ignoring case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorEncoding {
    order: [Channel; 4],
    len: usize,
}

impl ColorEncoding {
    /// Parses a [`ColorEncoding`] from its parameter name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let mut order = [Channel::White; 4];
        let mut len = 0;
        for c in name.chars() {
            let channel = match c.to_ascii_lowercase() {
                'r' => Channel::Red,
                'g' => Channel::Green,
                'b' => Channel::Blue,
                'w' => Channel::White,
                _ => return None,
            };
            if len == order.len() || order[..len].contains(&channel) {
                return None;
            }
            order[len] = channel;
            len += 1;
        }

        let colors = order[..len]
            .iter()
            .filter(|channel| **channel != Channel::White)
            .count();
        (colors == 3).then_some(Self { order, len })
    }

    /// Returns the channels in transmission order.
    #[must_use]
    pub fn channels(&self) -> &[Channel] {
        &self.order[..self.len]
    }

    /// Returns whether the strip has a white channel.
    #[must_use]
    pub fn has_white(&self) -> bool {
        self.len == 4
    }

    /// Orders the components of a color for transmission.
    #[must_use]
    pub fn encode(&self, color: Color) -> Vec<u8> {
        self.channels()
            .iter()
            .map(|channel| match channel {
                Channel::Red => color.red,
                Channel::Green => color.green,
                Channel::Blue => color.blue,
                Channel::White => color.white,
            })
            .collect()
    }
}

/// A channel of the analog-to-digital converter.
pub trait AdcChannel {
    /// Reads a raw sample in the `[0, ADC_RESOLUTION)` range.
    ///
    /// # Errors
    ///
    /// An error is returned when the converter cannot be sampled.
    fn read_raw(&mut self) -> Result<u16>;
}

/// A channel of the digital-to-analog converter.
pub trait DacChannel {
    /// Outputs a raw 8-bit value.
    ///
    /// # Errors
    ///
    /// An error is returned when the converter cannot be written.
    fn write(&mut self, value: u8) -> Result<()>;
}

/// A driver for a strip of addressable LEDs.
pub trait LedDriver {
    /// Fills the whole strip with a color and shows it.
    ///
    /// # Errors
    ///
    /// An error is returned when the strip cannot be updated.
    fn fill(&mut self, color: Color) -> Result<()>;
}

/// Heap memory figures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Currently free bytes.
    pub free_bytes: u32,
    /// The lowest amount of free bytes ever observed.
    pub least_free_bytes: u32,
    /// The largest block which can currently be allocated.
    pub largest_free_block: u32,
}

impl MemoryStats {
    /// Returns the heap fragmentation estimate in percent.
    ///
    /// A fully contiguous free heap has no fragmentation.
    #[must_use]
    pub fn fragmentation_percent(&self) -> f32 {
        if self.free_bytes == 0 {
            return 0.0;
        }
        100.0 - (self.largest_free_block as f32 * 100.0 / self.free_bytes as f32)
    }
}

/// The hardware of a device.
///
/// Every method hands out a handle to an interface identified by its pin.
/// Resource bookkeeping (PWM channels, I²C buses) is handled by the
/// [`ResourcePool`], so implementations only need to wire the hardware.
pub trait Board {
    /// Configures a pin as a digital output.
    ///
    /// # Errors
    ///
    /// An error is returned when the pin cannot be used as an output.
    fn output_pin(&mut self, pin: u8) -> Result<DynOutputPin>;

    /// Configures a pin as a digital input.
    ///
    /// # Errors
    ///
    /// An error is returned when the pin cannot be used as an input.
    fn input_pin(&mut self, pin: u8, pull: Pull) -> Result<DynInputPin>;

    /// Configures a pin as an analog input.
    ///
    /// # Errors
    ///
    /// An error is returned when the pin is not connected to the converter.
    fn adc_channel(&mut self, pin: u8) -> Result<Box<dyn AdcChannel>>;

    /// Configures a pin as an analog output.
    ///
    /// # Errors
    ///
    /// An error is returned when the pin is not connected to the converter.
    fn dac_channel(&mut self, pin: u8) -> Result<Box<dyn DacChannel>>;

    /// Attaches a pin to a PWM channel.
    ///
    /// # Errors
    ///
    /// An error is returned when the pin cannot be attached.
    fn pwm_output(&mut self, pin: u8, channel: u8) -> Result<DynPwm>;

    /// Initializes an I²C bus on the given pins.
    ///
    /// # Errors
    ///
    /// An error is returned when the bus cannot be initialized.
    fn i2c_bus(&mut self, bus: u8, scl: u8, sda: u8) -> Result<DynI2c>;

    /// Initializes an LED strip driver.
    ///
    /// # Errors
    ///
    /// An error is returned when the driver cannot be initialized.
    fn led_strip(
        &mut self,
        pin: u8,
        led_count: u16,
        encoding: ColorEncoding,
    ) -> Result<Box<dyn LedDriver>>;

    /// Returns the heap memory figures.
    fn memory(&self) -> MemoryStats;

    /// Restarts the device.
    fn restart(&mut self);
}

/// The board and its singleton resources, shared by every peripheral.
#[derive(Clone)]
pub struct Hardware {
    board: Rc<RefCell<dyn Board>>,
    resources: Rc<RefCell<ResourcePool>>,
}

impl Hardware {
    /// Creates a [`Hardware`] from a [`Board`].
    #[must_use]
    pub fn new(board: impl Board + 'static) -> Self {
        Self {
            board: Rc::new(RefCell::new(board)),
            resources: Rc::new(RefCell::new(ResourcePool::new())),
        }
    }

    /// Borrows the board.
    ///
    /// The borrow must not be held across calls into peripherals.
    #[must_use]
    pub fn board(&self) -> RefMut<'_, dyn Board> {
        self.board.borrow_mut()
    }

    /// Takes the first free PWM channel.
    ///
    /// # Errors
    ///
    /// An error is returned when all channels are taken.
    pub fn take_pwm_channel(&self) -> Result<PwmChannel> {
        ResourcePool::take_pwm_channel(&self.resources)
    }

    /// Takes the first free I²C bus.
    ///
    /// # Errors
    ///
    /// An error is returned when all buses are taken.
    pub fn take_i2c_bus(&self) -> Result<I2cBusLease> {
        ResourcePool::take_i2c_bus(&self.resources)
    }
}

impl std::fmt::Debug for Hardware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hardware")
            .field("resources", &self.resources)
            .finish_non_exhaustive()
    }
}
