mod analog_in;
mod analog_out;
mod bh1750;
mod digital_in;
mod digital_out;
mod dummy;
mod i2c_adapter;
mod neo_pixel;
mod pwm;

pub use analog_in::AnalogIn;
pub use analog_out::AnalogOut;
pub use bh1750::Bh1750Sensor;
pub use digital_in::DigitalIn;
pub use digital_out::DigitalOut;
pub use dummy::DummyPeripheral;
pub use i2c_adapter::I2cAdapter;
pub use neo_pixel::NeoPixel;
pub use pwm::Pwm;

use super::PeripheralFactory;

/// The key of the data point type of single-valued peripherals.
pub(crate) const DATA_POINT_TYPE_KEY: &str = "data_point_type";
pub(crate) const PIN_KEY: &str = "pin";

/// Registers every built-in peripheral type.
pub fn register_all(factory: &mut PeripheralFactory) {
    let _ = factory.register(DigitalOut::TYPE_NAME, DigitalOut::CAPABILITIES, DigitalOut::create);
    let _ = factory.register(DigitalIn::TYPE_NAME, DigitalIn::CAPABILITIES, DigitalIn::create);
    let _ = factory.register(AnalogIn::TYPE_NAME, AnalogIn::CAPABILITIES, AnalogIn::create);
    let _ = factory.register(AnalogOut::TYPE_NAME, AnalogOut::CAPABILITIES, AnalogOut::create);
    let _ = factory.register(Pwm::TYPE_NAME, Pwm::CAPABILITIES, Pwm::create);
    let _ = factory.register(I2cAdapter::TYPE_NAME, I2cAdapter::CAPABILITIES, I2cAdapter::create);
    let _ = factory.register(
        Bh1750Sensor::TYPE_NAME,
        Bh1750Sensor::CAPABILITIES,
        Bh1750Sensor::create,
    );
    let _ = factory.register(NeoPixel::TYPE_NAME, NeoPixel::CAPABILITIES, NeoPixel::create);
    let _ = factory.register(
        DummyPeripheral::TYPE_NAME,
        DummyPeripheral::CAPABILITIES,
        DummyPeripheral::create,
    );
}

#[cfg(test)]
mod tests {
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    use serde_json::json;

    use fieldnode::parameters::Parameters;

    use crate::hal::mock::MockBoard;
    use crate::tests::{DATA_POINT_TYPE, controller_with};

    use super::super::{Capability, PeripheralFactory};
    use super::register_all;

    #[test]
    fn declared_capabilities_match_the_accessors() {
        let expectations = [
            I2cTransaction::write(0x23, vec![0x01]),
            I2cTransaction::write(0x23, vec![0x10]),
            I2cTransaction::write(0x23, vec![0x00]),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let mut controller =
            controller_with(MockBoard::new().with_i2c_bus(0, Box::new(i2c.clone())));
        let mut factory = PeripheralFactory::new();
        register_all(&mut factory);

        let adapter = "00000000-0000-0000-0000-00000000c0c0";
        let peripherals = [
            json!({"type": "DigitalOut", "pin": 5, "data_point_type": DATA_POINT_TYPE}),
            json!({
                "type": "DigitalIn",
                "pin": 14,
                "data_point_type": DATA_POINT_TYPE,
                "input_type": "floating",
            }),
            json!({"type": "AnalogIn", "pin": 34, "voltage_data_point_type": DATA_POINT_TYPE}),
            json!({"type": "AnalogOut", "pin": 25, "voltage_data_point_type": DATA_POINT_TYPE}),
            json!({"type": "PWM", "pin": 32, "data_point_type": DATA_POINT_TYPE}),
            json!({"uuid": adapter, "type": "I2CAdapter", "scl": 22, "sda": 21}),
            json!({"type": "BH1750", "i2c_adapter": adapter, "data_point_type": DATA_POINT_TYPE}),
            json!({"type": "NeoPixel", "color_encoding": "GRB", "led_pin": 27, "led_count": 8}),
            json!({"type": "DummyPeripheral", "data_point_type": DATA_POINT_TYPE}),
        ];

        let mut checked = Vec::new();
        for (index, mut value) in peripherals.into_iter().enumerate() {
            if value.get("uuid").is_none() {
                value["uuid"] = json!(format!("00000000-0000-0000-0000-{:012x}", index + 1));
            }
            let uuid = controller
                .add(&Parameters::from_value(&value).unwrap())
                .unwrap();

            let peripheral = controller.get(&uuid).unwrap();
            let mut peripheral = peripheral.borrow_mut();
            let type_name = peripheral.type_name();
            let declared = factory.capabilities(type_name).unwrap();
            for capability in Capability::ALL {
                assert_eq!(
                    peripheral.supports(capability),
                    declared.contains(&capability),
                    "{type_name}: {capability}"
                );
            }
            checked.push(type_name);
        }

        // Every built-in type is covered.
        assert_eq!(factory.factory_names().collect::<Vec<_>>(), checked);

        drop(controller);
        i2c.done();
    }
}
