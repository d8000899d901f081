use std::rc::Rc;

use indexmap::IndexMap;

use tracing::{error, info};

use uuid::Uuid;

use fieldnode::command::PeripheralCommands;
use fieldnode::parameters::Parameters;
use fieldnode::response::{ActionResults, ResultEntry};

use crate::error::{Error, ErrorKind, Result};
use crate::hal::Hardware;

use super::{PeripheralEnv, PeripheralFactory, PeripheralRef};

/// The owner of every live peripheral.
///
/// A peripheral is destroyed only once no task references it anymore.
pub struct PeripheralController {
    factory: PeripheralFactory,
    hardware: Hardware,
    peripherals: IndexMap<Uuid, PeripheralRef>,
}

impl PeripheralController {
    /// Creates a [`PeripheralController`] with no peripherals.
    #[must_use]
    pub fn new(factory: PeripheralFactory, hardware: Hardware) -> Self {
        Self {
            factory,
            hardware,
            peripherals: IndexMap::new(),
        }
    }

    /// Returns the [`PeripheralFactory`].
    #[must_use]
    pub const fn factory(&self) -> &PeripheralFactory {
        &self.factory
    }

    /// Returns the [`Hardware`].
    #[must_use]
    pub const fn hardware(&self) -> &Hardware {
        &self.hardware
    }

    /// Returns the environment handed to peripheral constructors.
    #[must_use]
    pub const fn env(&self) -> PeripheralEnv<'_> {
        PeripheralEnv {
            hardware: &self.hardware,
            peripherals: self,
        }
    }

    /// Constructs and stores a peripheral.
    ///
    /// # Errors
    ///
    /// An error is returned when the identifier is missing or already used,
    /// or when the peripheral cannot be constructed. In the latter case the
    /// peripheral's own error is returned and nothing is stored.
    pub fn add(&mut self, parameters: &Parameters<'_>) -> Result<Uuid> {
        let uuid = parameters.id()?;
        if self.peripherals.contains_key(&uuid) {
            return Err(Error::new(
                ErrorKind::Protocol,
                format!("Peripheral already exists: {uuid}"),
            ));
        }

        let peripheral = self.factory.create(parameters, &self.env());
        if let Some(e) = peripheral.borrow().error() {
            return Err(e.clone());
        }

        info!(
            "Added peripheral {uuid} ({})",
            peripheral.borrow().type_name()
        );
        let _ = self.peripherals.insert(uuid, peripheral);
        Ok(uuid)
    }

    /// Removes a peripheral.
    ///
    /// Removing an unknown identifier succeeds.
    ///
    /// # Errors
    ///
    /// An error is returned when a task still references the peripheral.
    pub fn remove(&mut self, uuid: &Uuid) -> Result<()> {
        if let Some(count) = self.use_count(uuid) {
            if count > 1 {
                return Err(Error::new(
                    ErrorKind::Protocol,
                    format!("Object is still in use. Try again later for {uuid}"),
                ));
            }
            let _ = self.peripherals.shift_remove(uuid);
            info!("Removed peripheral {uuid}");
        }
        Ok(())
    }

    /// Returns a new reference to a peripheral.
    ///
    /// The peripheral cannot be removed while the returned reference lives.
    #[must_use]
    pub fn get(&self, uuid: &Uuid) -> Option<PeripheralRef> {
        self.peripherals.get(uuid).map(Rc::clone)
    }

    /// Returns how many references to a peripheral exist, the controller's
    /// own included.
    #[must_use]
    pub fn use_count(&self, uuid: &Uuid) -> Option<usize> {
        self.peripherals.get(uuid).map(Rc::strong_count)
    }

    /// Returns the identifiers of the live peripherals, in insertion order.
    pub fn uuids(&self) -> impl Iterator<Item = &Uuid> {
        self.peripherals.keys()
    }

    /// Returns the number of live peripherals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.peripherals.len()
    }

    /// Returns whether there are no live peripherals.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peripherals.is_empty()
    }

    /// Processes a batch of commands, producing one result per item.
    pub fn handle(&mut self, commands: &PeripheralCommands) -> ActionResults {
        let mut results = ActionResults::new();

        for item in &commands.add {
            results.add.push(self.handle_add(item));
        }
        for item in &commands.remove {
            results.remove.push(self.handle_remove(item));
        }

        results
    }

    fn handle_add(&mut self, item: &serde_json::Value) -> ResultEntry {
        let uuid = item_uuid(item);
        match Parameters::from_value(item)
            .map_err(Error::from)
            .and_then(|parameters| self.add(&parameters))
        {
            Ok(uuid) => ResultEntry::success(uuid.to_string()),
            Err(e) => {
                error!("Could not add peripheral {uuid}: {e}");
                ResultEntry::fail(uuid, e.to_string())
            }
        }
    }

    fn handle_remove(&mut self, item: &serde_json::Value) -> ResultEntry {
        let uuid = item_uuid(item);
        match Parameters::from_value(item)
            .and_then(|parameters| parameters.id())
            .map_err(Error::from)
            .and_then(|id| self.remove(&id))
        {
            Ok(()) => ResultEntry::success(uuid),
            Err(e) => {
                error!("Could not remove peripheral {uuid}: {e}");
                ResultEntry::fail(uuid, e.to_string())
            }
        }
    }
}

impl std::fmt::Debug for PeripheralController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeripheralController")
            .field("factory", &self.factory)
            .field("peripherals", &self.peripherals.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

// The identifier echoed back in a result entry, even when malformed.
pub(crate) fn item_uuid(item: &serde_json::Value) -> String {
    item.get(fieldnode::parameters::UUID_KEY)
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use fieldnode::command::PeripheralCommands;
    use fieldnode::parameters::Parameters;
    use fieldnode::response::{ResultEntry, Status};

    use crate::tests::{DATA_POINT_TYPE, test_controller};

    use super::super::Capability;

    fn digital_out(uuid: &str) -> serde_json::Value {
        json!({
            "uuid": uuid,
            "type": "DigitalOut",
            "pin": 5,
            "data_point_type": DATA_POINT_TYPE,
        })
    }

    #[test]
    fn duplicate_add_keeps_original() {
        let (mut controller, board) = test_controller();
        let uuid = "00000000-0000-0000-0000-0000000000a1";

        let first = digital_out(uuid);
        let id = controller
            .add(&Parameters::from_value(&first).unwrap())
            .unwrap();
        let original = controller.get(&id).unwrap();

        let second = json!({
            "uuid": uuid,
            "type": "DigitalOut",
            "pin": 6,
            "data_point_type": DATA_POINT_TYPE,
        });
        let error = controller
            .add(&Parameters::from_value(&second).unwrap())
            .unwrap_err();
        assert_eq!(error.to_string(), format!("Peripheral already exists: {uuid}"));

        assert_eq!(controller.len(), 1);
        assert!(std::rc::Rc::ptr_eq(&original, &controller.get(&id).unwrap()));
        // The second peripheral never touched its pin.
        assert_eq!(board.level(6), None);
    }

    #[test]
    fn removal_waits_for_users() {
        let (mut controller, _) = test_controller();
        let value = digital_out("00000000-0000-0000-0000-0000000000a1");
        let id = controller
            .add(&Parameters::from_value(&value).unwrap())
            .unwrap();

        assert_eq!(controller.use_count(&id), Some(1));
        let user = controller.get(&id).unwrap();
        assert_eq!(controller.use_count(&id), Some(2));

        assert_eq!(
            controller.remove(&id).unwrap_err().to_string(),
            format!("Object is still in use. Try again later for {id}")
        );
        assert!(controller.get(&id).is_some());

        drop(user);
        controller.remove(&id).unwrap();
        assert!(controller.get(&id).is_none());
        assert!(controller.is_empty());
    }

    #[test]
    fn invalid_peripherals_are_not_stored() {
        let (mut controller, _) = test_controller();
        let value = json!({
            "uuid": "00000000-0000-0000-0000-0000000000a1",
            "type": "DigitalOut",
            "data_point_type": DATA_POINT_TYPE,
        });

        assert_eq!(
            controller
                .add(&Parameters::from_value(&value).unwrap())
                .unwrap_err()
                .to_string(),
            "Missing property: pin (unsigned int)"
        );
        assert!(controller.is_empty());
    }

    #[test]
    fn batch_results() {
        let (mut controller, _) = test_controller();
        let good = "00000000-0000-0000-0000-0000000000a1";
        let commands = PeripheralCommands {
            add: vec![
                digital_out(good),
                json!({"uuid": "00000000-0000-0000-0000-0000000000a2", "type": "Teapot"}),
                json!({"type": "DigitalOut"}),
            ],
            remove: vec![json!({"uuid": good})],
        };

        let results = controller.handle(&commands);

        assert_eq!(results.add.len(), 3);
        assert_eq!(results.add[0], ResultEntry::success(good));
        assert_eq!(
            results.add[1],
            ResultEntry::fail(
                "00000000-0000-0000-0000-0000000000a2",
                "Unknown peripheral type: Teapot"
            )
        );
        assert_eq!(results.add[2].status, Status::Fail);
        assert_eq!(
            results.add[2].detail.as_deref(),
            Some("Missing property: uuid (uuid)")
        );
        assert_eq!(results.remove, vec![ResultEntry::success(good)]);
        assert!(controller.is_empty());
    }

    #[test]
    fn registered_capabilities() {
        let (controller, _) = test_controller();
        let factory = controller.factory();

        assert_eq!(
            factory.capabilities("DigitalIn"),
            Some(&[Capability::GetValues][..])
        );
        assert!(factory.factory_names().any(|name| name == "BH1750"));
    }
}
