use embedded_hal::i2c::{self, I2c};

use fieldnode::parameters::Parameters;

use crate::error::Result;
use crate::hal::{DynI2c, I2cBusLease};

use super::super::{Capability, Peripheral, PeripheralEnv, PeripheralRef, shared};

/// One of the I²C buses, shared by the sensors attached to it.
pub struct I2cAdapter {
    bus: DynI2c,
    lease: I2cBusLease,
}

impl I2cAdapter {
    /// Type name.
    pub const TYPE_NAME: &'static str = "I2CAdapter";
    /// Implemented capabilities.
    pub const CAPABILITIES: &'static [Capability] = &[];

    /// Initializes a free bus on the `scl` and `sda` pins.
    ///
    /// # Errors
    ///
    /// An error is returned when a pin is missing or when both buses are
    /// taken.
    pub fn new(parameters: &Parameters<'_>, env: &PeripheralEnv<'_>) -> Result<Self> {
        let scl = parameters.pin("scl")?;
        let sda = parameters.pin("sda")?;

        let lease = env.hardware.take_i2c_bus()?;
        let bus = env.hardware.board().i2c_bus(lease.bus(), scl, sda)?;

        Ok(Self { bus, lease })
    }

    pub(crate) fn create(
        parameters: &Parameters<'_>,
        env: &PeripheralEnv<'_>,
    ) -> Result<PeripheralRef> {
        Self::new(parameters, env).map(shared)
    }

    /// Returns the bus number.
    #[must_use]
    pub const fn bus_number(&self) -> u8 {
        self.lease.bus()
    }

    /// Returns the bus.
    pub fn bus(&mut self) -> &mut dyn I2c<Error = i2c::ErrorKind> {
        &mut *self.bus
    }
}

impl Peripheral for I2cAdapter {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn as_i2c_adapter(&mut self) -> Option<&mut I2cAdapter> {
        Some(self)
    }
}
