use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use crate::error::{Error, ErrorKind, Result};

/// Number of hardware PWM channels.
pub const PWM_CHANNELS: u8 = 16;
/// Number of hardware I²C buses.
pub const I2C_BUSES: u8 = 2;

/// Bookkeeping of the singleton hardware resources.
///
/// A resource is handed out as a lease which gives it back when dropped, so
/// a resource is free again as soon as the peripheral using it is destroyed.
#[derive(Debug, Default)]
pub struct ResourcePool {
    pwm_channels: u16,
    i2c_buses: u8,
}

impl ResourcePool {
    /// Creates a [`ResourcePool`] with every resource free.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pwm_channels: 0,
            i2c_buses: 0,
        }
    }

    /// Returns the number of PWM channels currently taken.
    #[must_use]
    pub const fn pwm_channels_taken(&self) -> u32 {
        self.pwm_channels.count_ones()
    }

    /// Returns the number of I²C buses currently taken.
    #[must_use]
    pub const fn i2c_buses_taken(&self) -> u32 {
        self.i2c_buses.count_ones()
    }

    pub(super) fn take_pwm_channel(pool: &Rc<RefCell<Self>>) -> Result<PwmChannel> {
        let mut resources = pool.borrow_mut();
        let channel = (0..PWM_CHANNELS)
            .find(|channel| resources.pwm_channels & (1 << channel) == 0)
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::Construction,
                    "No remaining PWM channels available",
                )
            })?;
        resources.pwm_channels |= 1 << channel;
        debug!("Took PWM channel {channel}");

        Ok(PwmChannel {
            pool: Rc::clone(pool),
            channel,
        })
    }

    pub(super) fn take_i2c_bus(pool: &Rc<RefCell<Self>>) -> Result<I2cBusLease> {
        let mut resources = pool.borrow_mut();
        let bus = (0..I2C_BUSES)
            .find(|bus| resources.i2c_buses & (1 << bus) == 0)
            .ok_or_else(|| Error::new(ErrorKind::Construction, "Both I2C buses already taken"))?;
        resources.i2c_buses |= 1 << bus;
        debug!("Took I2C bus {bus}");

        Ok(I2cBusLease {
            pool: Rc::clone(pool),
            bus,
        })
    }
}

/// A leased PWM channel, released on drop.
#[derive(Debug)]
pub struct PwmChannel {
    pool: Rc<RefCell<ResourcePool>>,
    channel: u8,
}

impl PwmChannel {
    /// Returns the channel number.
    #[must_use]
    pub const fn channel(&self) -> u8 {
        self.channel
    }
}

impl Drop for PwmChannel {
    fn drop(&mut self) {
        self.pool.borrow_mut().pwm_channels &= !(1 << self.channel);
        debug!("Released PWM channel {}", self.channel);
    }
}

/// A leased I²C bus, released on drop.
#[derive(Debug)]
pub struct I2cBusLease {
    pool: Rc<RefCell<ResourcePool>>,
    bus: u8,
}

impl I2cBusLease {
    /// Returns the bus number.
    #[must_use]
    pub const fn bus(&self) -> u8 {
        self.bus
    }
}

impl Drop for I2cBusLease {
    fn drop(&mut self) {
        self.pool.borrow_mut().i2c_buses &= !(1 << self.bus);
        debug!("Released I2C bus {}", self.bus);
    }
}
