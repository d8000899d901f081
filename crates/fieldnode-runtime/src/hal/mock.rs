use std::cell::RefCell;
use std::rc::Rc;

use embedded_hal::digital::{self, InputPin, OutputPin};
use embedded_hal::pwm::{self, SetDutyCycle};

use hashbrown::HashMap;

use fieldnode::color::Color;

use crate::error::{Error, Result};

use super::{
    AdcChannel, Board, ColorEncoding, DacChannel, DynI2c, DynInputPin, DynOutputPin, DynPwm,
    LedDriver, MemoryStats, Pull,
};

const PWM_MAX_DUTY: u16 = 255;

#[derive(Debug, Default)]
struct MockState {
    levels: HashMap<u8, bool>,
    inputs: HashMap<u8, bool>,
    pulls: HashMap<u8, Pull>,
    adc: HashMap<u8, u16>,
    dac: HashMap<u8, u8>,
    duties: HashMap<u8, u16>,
    strips: HashMap<u8, Color>,
    memory: MemoryStats,
    restarts: usize,
}

/// A [`Board`] which records every hardware interaction.
///
/// The board is driven and inspected through a [`MockHandle`], which shares
/// its state.
#[derive(Default)]
pub struct MockBoard {
    state: Rc<RefCell<MockState>>,
    i2c_buses: [Option<DynI2c>; 2],
}

impl MockBoard {
    /// Creates a [`MockBoard`].
    #[must_use]
    pub fn new() -> Self {
        let board = Self::default();
        board.state.borrow_mut().memory = MemoryStats {
            free_bytes: 200_000,
            least_free_bytes: 180_000,
            largest_free_block: 150_000,
        };
        board
    }

    /// Wires an I²C bus.
    ///
    /// The bus is handed out once, to the first adapter taking that bus.
    #[must_use]
    pub fn with_i2c_bus(mut self, bus: u8, i2c: DynI2c) -> Self {
        if let Some(slot) = self.i2c_buses.get_mut(usize::from(bus)) {
            *slot = Some(i2c);
        }
        self
    }

    /// Returns a handle to the board state.
    #[must_use]
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Rc::clone(&self.state),
        }
    }
}

impl Board for MockBoard {
    fn output_pin(&mut self, pin: u8) -> Result<DynOutputPin> {
        let _ = self.state.borrow_mut().levels.insert(pin, false);
        Ok(Box::new(MockOutputPin {
            pin,
            state: Rc::clone(&self.state),
        }))
    }

    fn input_pin(&mut self, pin: u8, pull: Pull) -> Result<DynInputPin> {
        let _ = self.state.borrow_mut().pulls.insert(pin, pull);
        Ok(Box::new(MockInputPin {
            pin,
            state: Rc::clone(&self.state),
        }))
    }

    fn adc_channel(&mut self, pin: u8) -> Result<Box<dyn AdcChannel>> {
        Ok(Box::new(MockAdc {
            pin,
            state: Rc::clone(&self.state),
        }))
    }

    fn dac_channel(&mut self, pin: u8) -> Result<Box<dyn DacChannel>> {
        Ok(Box::new(MockDac {
            pin,
            state: Rc::clone(&self.state),
        }))
    }

    fn pwm_output(&mut self, pin: u8, _channel: u8) -> Result<DynPwm> {
        let _ = self.state.borrow_mut().duties.insert(pin, 0);
        Ok(Box::new(MockPwm {
            pin,
            state: Rc::clone(&self.state),
        }))
    }

    fn i2c_bus(&mut self, bus: u8, _scl: u8, _sda: u8) -> Result<DynI2c> {
        self.i2c_buses
            .get_mut(usize::from(bus))
            .and_then(Option::take)
            .ok_or_else(|| Error::hardware(format!("I2C bus {bus} is not wired")))
    }

    fn led_strip(
        &mut self,
        pin: u8,
        _led_count: u16,
        _encoding: ColorEncoding,
    ) -> Result<Box<dyn LedDriver>> {
        Ok(Box::new(MockStrip {
            pin,
            state: Rc::clone(&self.state),
        }))
    }

    fn memory(&self) -> MemoryStats {
        self.state.borrow().memory
    }

    fn restart(&mut self) {
        self.state.borrow_mut().restarts += 1;
    }
}

/// A handle to inspect and drive a [`MockBoard`].
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Rc<RefCell<MockState>>,
}

impl MockHandle {
    /// Returns the level of an output pin, if configured.
    #[must_use]
    pub fn level(&self, pin: u8) -> Option<bool> {
        self.state.borrow().levels.get(&pin).copied()
    }

    /// Sets the level read by an input pin.
    pub fn set_input(&self, pin: u8, high: bool) {
        let _ = self.state.borrow_mut().inputs.insert(pin, high);
    }

    /// Returns the pull configuration of an input pin, if configured.
    #[must_use]
    pub fn pull(&self, pin: u8) -> Option<Pull> {
        self.state.borrow().pulls.get(&pin).copied()
    }

    /// Sets the raw sample read by an analog input.
    pub fn set_adc(&self, pin: u8, raw: u16) {
        let _ = self.state.borrow_mut().adc.insert(pin, raw);
    }

    /// Returns the last value written to an analog output.
    #[must_use]
    pub fn dac(&self, pin: u8) -> Option<u8> {
        self.state.borrow().dac.get(&pin).copied()
    }

    /// Returns the duty cycle of a PWM output, if configured.
    #[must_use]
    pub fn duty(&self, pin: u8) -> Option<u16> {
        self.state.borrow().duties.get(&pin).copied()
    }

    /// Returns the color shown by an LED strip.
    #[must_use]
    pub fn strip(&self, pin: u8) -> Option<Color> {
        self.state.borrow().strips.get(&pin).copied()
    }

    /// Sets the reported memory figures.
    pub fn set_memory(&self, memory: MemoryStats) {
        self.state.borrow_mut().memory = memory;
    }

    /// Returns how many times the board was restarted.
    #[must_use]
    pub fn restarts(&self) -> usize {
        self.state.borrow().restarts
    }
}

struct MockOutputPin {
    pin: u8,
    state: Rc<RefCell<MockState>>,
}

impl digital::ErrorType for MockOutputPin {
    type Error = digital::ErrorKind;
}

impl OutputPin for MockOutputPin {
    fn set_low(&mut self) -> core::result::Result<(), Self::Error> {
        let _ = self.state.borrow_mut().levels.insert(self.pin, false);
        Ok(())
    }

    fn set_high(&mut self) -> core::result::Result<(), Self::Error> {
        let _ = self.state.borrow_mut().levels.insert(self.pin, true);
        Ok(())
    }
}

struct MockInputPin {
    pin: u8,
    state: Rc<RefCell<MockState>>,
}

impl digital::ErrorType for MockInputPin {
    type Error = digital::ErrorKind;
}

impl InputPin for MockInputPin {
    fn is_high(&mut self) -> core::result::Result<bool, Self::Error> {
        Ok(self
            .state
            .borrow()
            .inputs
            .get(&self.pin)
            .copied()
            .unwrap_or(false))
    }

    fn is_low(&mut self) -> core::result::Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

struct MockAdc {
    pin: u8,
    state: Rc<RefCell<MockState>>,
}

impl AdcChannel for MockAdc {
    fn read_raw(&mut self) -> Result<u16> {
        Ok(self.state.borrow().adc.get(&self.pin).copied().unwrap_or(0))
    }
}

struct MockDac {
    pin: u8,
    state: Rc<RefCell<MockState>>,
}

impl DacChannel for MockDac {
    fn write(&mut self, value: u8) -> Result<()> {
        let _ = self.state.borrow_mut().dac.insert(self.pin, value);
        Ok(())
    }
}

struct MockPwm {
    pin: u8,
    state: Rc<RefCell<MockState>>,
}

impl pwm::ErrorType for MockPwm {
    type Error = pwm::ErrorKind;
}

impl SetDutyCycle for MockPwm {
    fn max_duty_cycle(&self) -> u16 {
        PWM_MAX_DUTY
    }

    fn set_duty_cycle(&mut self, duty: u16) -> core::result::Result<(), Self::Error> {
        let _ = self
            .state
            .borrow_mut()
            .duties
            .insert(self.pin, duty.min(PWM_MAX_DUTY));
        Ok(())
    }
}

struct MockStrip {
    pin: u8,
    state: Rc<RefCell<MockState>>,
}

impl LedDriver for MockStrip {
    fn fill(&mut self, color: Color) -> Result<()> {
        let _ = self.state.borrow_mut().strips.insert(self.pin, color);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Board, Pull};
    use super::MockBoard;

    #[test]
    fn records_interactions() {
        let mut board = MockBoard::new();
        let handle = board.handle();

        let mut output = board.output_pin(5).unwrap();
        output.set_high().unwrap();
        assert_eq!(handle.level(5), Some(true));

        let mut input = board.input_pin(4, Pull::Up).unwrap();
        assert_eq!(handle.pull(4), Some(Pull::Up));
        assert!(input.is_low().unwrap());
        handle.set_input(4, true);
        assert!(input.is_high().unwrap());

        let mut pwm = board.pwm_output(12, 0).unwrap();
        pwm.set_duty_cycle_percent(100).unwrap();
        assert_eq!(handle.duty(12), Some(255));

        board.restart();
        assert_eq!(handle.restarts(), 1);
    }

    #[test]
    fn unwired_i2c_bus() {
        let mut board = MockBoard::new();
        assert_eq!(
            board.i2c_bus(0, 22, 21).err().unwrap().to_string(),
            "I2C bus 0 is not wired"
        );
    }
}
