use std::time::Duration;

use embedded_hal::i2c::{self, I2c};

use tracing::warn;

use uuid::Uuid;

use fieldnode::parameters::{ParameterError, Parameters};
use fieldnode::telemetry::ValueUnit;

use fieldnode_drivers::bh1750::{Address, Bh1750, Resolution};

use crate::error::{Error, Result};
use crate::hal::interface_error;

use super::super::{
    Capability, GetValues, Peripheral, PeripheralEnv, PeripheralRef, StartMeasurement, Step,
    shared,
};
use super::DATA_POINT_TYPE_KEY;

const ADAPTER_KEY: &str = "i2c_adapter";
const ADDRESS_KEY: &str = "i2c_address";

// Borrows the bus of an adapter peripheral.
fn bus_of<'a>(
    peripheral: &'a mut dyn Peripheral,
    uuid: &Uuid,
) -> Result<&'a mut dyn I2c<Error = i2c::ErrorKind>> {
    peripheral
        .as_i2c_adapter()
        .map(|adapter| adapter.bus())
        .ok_or_else(|| Error::construction(format!("{uuid} is not a valid I2CAdapter")))
}

/// A BH1750 ambient light sensor, reporting lux.
///
/// The sensor measures continuously in high resolution mode from the moment
/// it is constructed, so a measurement only needs to wait for the first
/// integration to complete. The adapter it is attached to cannot be removed
/// while the sensor lives.
pub struct Bh1750Sensor {
    adapter: PeripheralRef,
    adapter_uuid: Uuid,
    driver: Bh1750,
    measurement_time: Duration,
    data_point_type: Uuid,
}

impl Bh1750Sensor {
    /// Type name.
    pub const TYPE_NAME: &'static str = "BH1750";
    /// Implemented capabilities.
    pub const CAPABILITIES: &'static [Capability] =
        &[Capability::StartMeasurement, Capability::GetValues];

    /// Powers the sensor on and starts a continuous measurement.
    ///
    /// The `i2c_address` parameter defaults to `0x23`.
    ///
    /// # Errors
    ///
    /// An error is returned when a parameter is missing or malformed, when
    /// the adapter does not exist or is not a valid I²C adapter, or when the
    /// sensor does not answer.
    pub fn new(parameters: &Parameters<'_>, env: &PeripheralEnv<'_>) -> Result<Self> {
        let adapter_uuid = parameters.uuid(ADAPTER_KEY)?;
        let data_point_type = parameters.uuid(DATA_POINT_TYPE_KEY)?;
        let address = parameters
            .optional_u8(ADDRESS_KEY)?
            .map_or(Ok(Address::Low), Address::try_from)
            .map_err(|_| ParameterError::invalid(ADDRESS_KEY, "0x23 or 0x5C"))?;

        let adapter = env.peripherals.get(&adapter_uuid).ok_or_else(|| {
            Error::construction(format!("Could not find peripheral: {adapter_uuid}"))
        })?;

        let mut driver = Bh1750::new(address);
        let wait_ms = {
            let mut peripheral = adapter.borrow_mut();
            if !peripheral.is_valid() {
                return Err(Error::construction(format!(
                    "{adapter_uuid} is not a valid I2CAdapter"
                )));
            }
            let mut bus = bus_of(&mut *peripheral, &adapter_uuid)?;
            driver
                .power_on(&mut bus)
                .and_then(|()| driver.start_continuous_measurement(&mut bus, Resolution::High))
                .map_err(|e| interface_error(Self::TYPE_NAME, e))?
        };

        Ok(Self {
            adapter,
            adapter_uuid,
            driver,
            measurement_time: Duration::from_millis(u64::from(wait_ms)),
            data_point_type,
        })
    }

    pub(crate) fn create(
        parameters: &Parameters<'_>,
        env: &PeripheralEnv<'_>,
    ) -> Result<PeripheralRef> {
        Self::new(parameters, env).map(shared)
    }

    /// Returns the identifier of the adapter the sensor is attached to.
    #[must_use]
    pub const fn adapter(&self) -> &Uuid {
        &self.adapter_uuid
    }
}

impl StartMeasurement for Bh1750Sensor {
    fn start_measurement(&mut self, _parameters: &Parameters<'_>) -> Result<Step> {
        Ok(Step::Wait(self.measurement_time))
    }

    fn handle_measurement(&mut self) -> Result<Step> {
        Ok(Step::Done)
    }
}

impl GetValues for Bh1750Sensor {
    fn get_values(&mut self) -> Result<Vec<ValueUnit>> {
        let mut peripheral = self.adapter.borrow_mut();
        let mut bus = bus_of(&mut *peripheral, &self.adapter_uuid)?;
        let lux = self
            .driver
            .read_measurement(&mut bus)
            .map_err(|e| interface_error(Self::TYPE_NAME, e))?;

        Ok(vec![ValueUnit::new(lux, self.data_point_type)])
    }
}

impl Peripheral for Bh1750Sensor {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn as_get_values(&mut self) -> Option<&mut dyn GetValues> {
        Some(self)
    }

    fn as_start_measurement(&mut self) -> Option<&mut dyn StartMeasurement> {
        Some(self)
    }
}

impl Drop for Bh1750Sensor {
    fn drop(&mut self) {
        let Ok(mut peripheral) = self.adapter.try_borrow_mut() else {
            return;
        };
        if let Ok(mut bus) = bus_of(&mut *peripheral, &self.adapter_uuid) {
            if let Err(e) = self.driver.power_down(&mut bus) {
                warn!("Could not power down the BH1750: {e:?}");
            }
        }
    }
}
