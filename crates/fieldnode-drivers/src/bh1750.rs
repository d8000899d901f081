//! # BH1750 Driver
//!
//! This module provides a non-blocking, architecture-agnostic driver for the
//! BH1750 ambient light sensor, reading light intensity in lux over the I²C
//! protocol.
//!
//! The driver never waits on its own. Starting a measurement returns the time
//! the sensor needs to integrate, and the caller comes back once that time
//! has elapsed to read the result. This lets a cooperative scheduler keep
//! running other work in the meantime.
//!
//! The bus is passed to every operation instead of being owned, so several
//! devices can share a single I²C bus.
//!
//! For detailed information and specifications, see the [datasheet](https://www.alldatasheet.com/datasheet-pdf/pdf/338083/ROHM/BH1750FVI.html).

use embedded_hal::i2c::I2c;

// Instruction set architecture opcodes.
const POWER_DOWN: u8 = 0x00;
const POWER_ON: u8 = 0x01;
const RESET: u8 = 0x07;

// MTreg configuration opcodes.
// The 8-bit MTreg value is split into a high and a low instruction byte.
const MTREG_HIGH: u8 = 0x40;
const MTREG_LOW: u8 = 0x60;

/// Minimum allowed `MTreg` value.
pub const MTREG_MIN: u8 = 31;
/// Maximum allowed `MTreg` value.
pub const MTREG_MAX: u8 = 254;
const DEFAULT_MTREG: u8 = 69; // Default per datasheet.

/// Errors that may occur while interacting with the BH1750 sensor.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Bh1750Error<E> {
    /// I²C bus error.
    I2c(E),
    /// A result was requested before any measurement had been started.
    MeasurementNotStarted,
}

impl<E> From<E> for Bh1750Error<E> {
    fn from(e: E) -> Self {
        Bh1750Error::I2c(e)
    }
}

/// I²C address of the BH1750 sensor.
///
/// The sensor supports two possible addresses depending on how the ADD pin is connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address {
    /// Low: `0x23` when ADD is connected to GND or floating.
    Low = 0x23,
    /// High: `0x5C` when ADD is connected to VCC.
    High = 0x5C,
}

impl TryFrom<u8> for Address {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x23 => Ok(Self::Low),
            0x5C => Ok(Self::High),
            other => Err(other),
        }
    }
}

/// Measurement resolution modes for the BH1750 sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// High resolution mode: 1 lx per count.
    ///
    /// Measurement time is 120 ms, assuming default `MTreg` value.
    High,
    /// High resolution mode 2: 0.5 lx per count.
    ///
    /// Measurement time is 120 ms, assuming default `MTreg` value.
    High2,
    /// Low resolution mode: 4 lx per count.
    ///
    /// Measurement time is 16 ms, assuming default `MTreg` value.
    Low,
}

impl Resolution {
    #[inline]
    const fn continuous_measurement_opcode(self) -> u8 {
        match self {
            Self::High => 0x10,
            Self::High2 => 0x11,
            Self::Low => 0x13,
        }
    }

    #[inline]
    const fn one_time_measurement_opcode(self) -> u8 {
        match self {
            Self::High => 0x20,
            Self::High2 => 0x21,
            Self::Low => 0x23,
        }
    }

    #[inline]
    const fn default_measurement_time_ms(self) -> u32 {
        match self {
            Self::High | Self::High2 => 120,
            Self::Low => 16,
        }
    }

    #[inline]
    const fn default_resolution_lx_count(self) -> f32 {
        match self {
            Self::High => 1.0,
            Self::High2 => 0.5,
            Self::Low => 4.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Idle,
    OneTime(Resolution),
    Continuous(Resolution),
}

/// BH1750 driver.
#[derive(Debug)]
pub struct Bh1750 {
    address: Address,
    mtreg: u8,
    mode: Mode,
}

impl Bh1750 {
    /// Creates a new [`Bh1750`] driver for the device at the given address.
    ///
    /// The `MTreg` is initialized to its default value.
    #[must_use]
    pub const fn new(address: Address) -> Self {
        Self {
            address,
            mtreg: DEFAULT_MTREG,
            mode: Mode::Idle,
        }
    }

    /// Returns the device address.
    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Returns whether a measurement has been started and not read yet, or
    /// whether a continuous measurement is running.
    #[must_use]
    pub const fn is_measuring(&self) -> bool {
        !matches!(self.mode, Mode::Idle)
    }

    /// Checks whether the sensor acknowledges its address.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying I²C bus operation fails, which
    /// includes a missing acknowledgement.
    pub fn probe<I: I2c>(&self, i2c: &mut I) -> Result<(), Bh1750Error<I::Error>> {
        i2c.write(self.address as u8, &[])?;
        Ok(())
    }

    /// Puts the sensor into the `Power On` state.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying I²C bus operation fails.
    pub fn power_on<I: I2c>(&mut self, i2c: &mut I) -> Result<(), Bh1750Error<I::Error>> {
        self.send_instruction(i2c, POWER_ON)
    }

    /// Puts the sensor into the `Power Down` state, which also stops a
    /// continuous measurement.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying I²C bus operation fails.
    pub fn power_down<I: I2c>(&mut self, i2c: &mut I) -> Result<(), Bh1750Error<I::Error>> {
        self.send_instruction(i2c, POWER_DOWN)?;
        self.mode = Mode::Idle;
        Ok(())
    }

    /// Resets the sensor data register.
    ///
    /// Must be called only when the sensor is in the `Power On` state.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying I²C bus operation fails.
    pub fn reset<I: I2c>(&mut self, i2c: &mut I) -> Result<(), Bh1750Error<I::Error>> {
        self.send_instruction(i2c, RESET)
    }

    /// Sets the measurement time register (`MTreg`) to adjust sensitivity.
    ///
    /// The value is clamped between [`MTREG_MIN`] and [`MTREG_MAX`].
    ///
    /// # Errors
    ///
    /// Returns an error if writing to the sensor via I²C fails.
    pub fn set_mtreg<I: I2c>(&mut self, i2c: &mut I, mtreg: u8) -> Result<(), Bh1750Error<I::Error>> {
        let mt = mtreg.clamp(MTREG_MIN, MTREG_MAX);

        self.send_instruction(i2c, MTREG_HIGH | (mt >> 5))?;
        self.send_instruction(i2c, MTREG_LOW | (mt & 0x1F))?;

        self.mtreg = mt;

        Ok(())
    }

    /// Starts a one-time measurement and returns the time, in milliseconds,
    /// to wait before calling [`Bh1750::read_measurement`].
    ///
    /// The sensor automatically powers down after the measurement.
    ///
    /// # Errors
    ///
    /// Returns an error if communication over I²C fails.
    pub fn start_one_time_measurement<I: I2c>(
        &mut self,
        i2c: &mut I,
        res: Resolution,
    ) -> Result<u32, Bh1750Error<I::Error>> {
        self.send_instruction(i2c, res.one_time_measurement_opcode())?;
        self.mode = Mode::OneTime(res);

        Ok(self.measurement_time_ms(res))
    }

    /// Starts a continuous measurement at the given resolution and returns
    /// the time, in milliseconds, each new result takes.
    ///
    /// # Errors
    ///
    /// Returns an error if writing the configuration instruction via I²C fails.
    pub fn start_continuous_measurement<I: I2c>(
        &mut self,
        i2c: &mut I,
        res: Resolution,
    ) -> Result<u32, Bh1750Error<I::Error>> {
        self.send_instruction(i2c, res.continuous_measurement_opcode())?;
        self.mode = Mode::Continuous(res);

        Ok(self.measurement_time_ms(res))
    }

    /// Reads the result of the running measurement in lux.
    ///
    /// A one-time measurement is consumed by this call, while a continuous
    /// one keeps running.
    ///
    /// # Errors
    ///
    /// Returns:
    /// - [`Bh1750Error::MeasurementNotStarted`] if no measurement is running.
    /// - An I²C error if communication with the device fails.
    pub fn read_measurement<I: I2c>(&mut self, i2c: &mut I) -> Result<f32, Bh1750Error<I::Error>> {
        let res = match self.mode {
            Mode::Idle => return Err(Bh1750Error::MeasurementNotStarted),
            Mode::OneTime(res) | Mode::Continuous(res) => res,
        };

        let mut buf = [0u8; 2];
        i2c.read(self.address as u8, &mut buf)?;

        if matches!(self.mode, Mode::OneTime(_)) {
            self.mode = Mode::Idle;
        }

        Ok(self.raw_to_lux(u16::from_be_bytes(buf), res))
    }

    fn raw_to_lux(&self, raw: u16, res: Resolution) -> f32 {
        // lux = (raw / 1.2) * resolution_factor * (MTreg / 69)
        f32::from(raw)
            * res.default_resolution_lx_count()
            * (f32::from(self.mtreg) / f32::from(DEFAULT_MTREG))
            / 1.2
    }

    #[inline]
    fn measurement_time_ms(&self, res: Resolution) -> u32 {
        // The measurement time scales linearly with MTreg.
        res.default_measurement_time_ms() * u32::from(self.mtreg) / u32::from(DEFAULT_MTREG)
    }

    #[inline]
    fn send_instruction<I: I2c>(&mut self, i2c: &mut I, instr: u8) -> Result<(), Bh1750Error<I::Error>> {
        i2c.write(self.address as u8, &[instr])?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern crate std;
    use std::vec;

    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    fn raw_to_lux(raw: u16, res: Resolution, mtreg: u8) -> f32 {
        f32::from(raw)
            * res.default_resolution_lx_count()
            * (f32::from(mtreg) / f32::from(DEFAULT_MTREG))
            / 1.2
    }

    #[test]
    fn test_power_cycle() {
        let expectations = [
            I2cTransaction::write(0x23, vec![0x01]), // POWER_ON.
            I2cTransaction::write(0x23, vec![0x07]), // RESET.
            I2cTransaction::write(0x23, vec![0x00]), // POWER_DOWN.
        ];

        let mut i2c = I2cMock::new(&expectations);
        let mut bh1750 = Bh1750::new(Address::Low);

        bh1750.power_on(&mut i2c).unwrap();
        bh1750.reset(&mut i2c).unwrap();
        bh1750.power_down(&mut i2c).unwrap();
        assert!(!bh1750.is_measuring());

        i2c.done();
    }

    #[test]
    fn test_set_mtreg_clamping_high() {
        // MTreg equal to 255 should be clamped to 254 (max).
        let high = 0x40 | (254 >> 5);
        let low = 0x60 | (254 & 0x1F);
        let expectations = [
            I2cTransaction::write(0x5C, vec![high]),
            I2cTransaction::write(0x5C, vec![low]),
        ];

        let mut i2c = I2cMock::new(&expectations);
        let mut bh1750 = Bh1750::new(Address::High);

        bh1750.set_mtreg(&mut i2c, 255).unwrap();
        assert_eq!(bh1750.mtreg, 254);

        i2c.done();
    }

    #[test]
    fn test_one_time_measurement_is_split() {
        let expectations = [
            I2cTransaction::write(0x23, vec![0x20]), // Start one-time, high resolution.
            I2cTransaction::read(0x23, vec![0x12, 0x34]),
        ];

        let mut i2c = I2cMock::new(&expectations);
        let mut bh1750 = Bh1750::new(Address::Low);

        let wait_ms = bh1750
            .start_one_time_measurement(&mut i2c, Resolution::High)
            .unwrap();
        assert_eq!(wait_ms, 120);
        assert!(bh1750.is_measuring());

        let lux = bh1750.read_measurement(&mut i2c).unwrap();
        assert!((lux - raw_to_lux(0x1234, Resolution::High, DEFAULT_MTREG)).abs() < f32::EPSILON);

        // The one-time result has been consumed.
        assert_eq!(
            bh1750.read_measurement(&mut i2c),
            Err(Bh1750Error::MeasurementNotStarted)
        );

        i2c.done();
    }

    #[test]
    fn test_continuous_measurement_keeps_running() {
        let expectations = [
            I2cTransaction::write(0x23, vec![0x13]), // Start continuous, low resolution.
            I2cTransaction::read(0x23, vec![0x00, 0x0C]),
            I2cTransaction::read(0x23, vec![0x00, 0x18]),
        ];

        let mut i2c = I2cMock::new(&expectations);
        let mut bh1750 = Bh1750::new(Address::Low);

        assert_eq!(
            bh1750
                .start_continuous_measurement(&mut i2c, Resolution::Low)
                .unwrap(),
            16
        );
        assert!((bh1750.read_measurement(&mut i2c).unwrap() - 40.0).abs() < 1e-3);
        assert!((bh1750.read_measurement(&mut i2c).unwrap() - 80.0).abs() < 1e-3);
        assert!(bh1750.is_measuring());

        i2c.done();
    }

    #[test]
    fn test_bus_error_is_reported() {
        let expectations =
            [I2cTransaction::write(0x23, vec![0x21]).with_error(ErrorKind::Other)];

        let mut i2c = I2cMock::new(&expectations);
        let mut bh1750 = Bh1750::new(Address::Low);

        assert_eq!(
            bh1750.start_one_time_measurement(&mut i2c, Resolution::High2),
            Err(Bh1750Error::I2c(ErrorKind::Other))
        );
        assert!(!bh1750.is_measuring());

        i2c.done();
    }

    #[test]
    fn test_address_conversion() {
        assert_eq!(Address::try_from(0x23), Ok(Address::Low));
        assert_eq!(Address::try_from(0x5C), Ok(Address::High));
        assert_eq!(Address::try_from(0x10), Err(0x10));
    }
}
