use alloc::string::String;
use alloc::vec::Vec;

use serde::Serialize;
use serde_json::Value;

/// Commands which add or remove peripherals.
///
/// Every item is a parameter object. An `add` item contains at least the
/// `uuid` and `type` of the new peripheral, while a `remove` item only
/// contains the `uuid` of the peripheral to remove.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct PeripheralCommands {
    /// Peripherals to add.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add: Vec<Value>,
    /// Peripherals to remove.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove: Vec<Value>,
}

/// Commands which start or stop tasks.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct TaskCommands {
    /// Tasks to start.
    #[serde(default, alias = "create", skip_serializing_if = "Vec::is_empty")]
    pub start: Vec<Value>,
    /// Tasks to stop.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<Value>,
    /// When present, whatever its value, a status report is requested.
    ///
    /// A `null` status is present too, it deserializes to
    /// `Some(Value::Null)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "deserialize", serde(deserialize_with = "present"))]
    pub status: Option<Value>,
}

impl TaskCommands {
    /// Returns whether a status report is requested.
    #[must_use]
    #[inline]
    pub fn wants_status(&self) -> bool {
        self.status.is_some()
    }
}

// Keeps an explicit `null` apart from a missing field.
#[cfg(feature = "deserialize")]
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    <Value as serde::Deserialize>::deserialize(deserializer).map(Some)
}

/// A command envelope sent by a server.
///
/// The optional `request_id` is echoed back in every result generated by
/// the envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct Command {
    /// Request identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Peripheral commands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peripheral: Option<PeripheralCommands>,
    /// Task commands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskCommands>,
}

impl Command {
    /// Creates an empty [`Command`].
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            request_id: None,
            peripheral: None,
            task: None,
        }
    }

    /// Sets the request identifier.
    #[must_use]
    #[inline]
    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Adds a peripheral described by its parameters.
    #[must_use]
    #[inline]
    pub fn add_peripheral(mut self, parameters: Value) -> Self {
        self.peripheral
            .get_or_insert_with(PeripheralCommands::default)
            .add
            .push(parameters);
        self
    }

    /// Removes the peripheral with the given identifier.
    #[must_use]
    #[inline]
    pub fn remove_peripheral(mut self, uuid: &str) -> Self {
        self.peripheral
            .get_or_insert_with(PeripheralCommands::default)
            .remove
            .push(uuid_object(uuid));
        self
    }

    /// Starts a task described by its parameters.
    #[must_use]
    #[inline]
    pub fn start_task(mut self, parameters: Value) -> Self {
        self.task
            .get_or_insert_with(TaskCommands::default)
            .start
            .push(parameters);
        self
    }

    /// Stops the task with the given identifier.
    #[must_use]
    #[inline]
    pub fn stop_task(mut self, uuid: &str) -> Self {
        self.task
            .get_or_insert_with(TaskCommands::default)
            .stop
            .push(uuid_object(uuid));
        self
    }

    /// Requests a task status report.
    #[must_use]
    #[inline]
    pub fn task_status(mut self) -> Self {
        self.task.get_or_insert_with(TaskCommands::default).status = Some(Value::Bool(true));
        self
    }
}

fn uuid_object(uuid: &str) -> Value {
    let mut map = serde_json::Map::new();
    let _ = map.insert(
        crate::parameters::UUID_KEY.into(),
        Value::String(uuid.into()),
    );
    Value::Object(map)
}

#[cfg(test)]
#[cfg(feature = "deserialize")]
mod tests {
    use alloc::vec;

    use serde_json::json;

    use crate::{deserialize, serialize};

    use super::{Command, PeripheralCommands, TaskCommands};

    #[test]
    fn full_envelope() {
        let command: Command = deserialize(json!({
            "request_id": "r1",
            "peripheral": {
                "add": [{ "uuid": "a", "type": "DigitalOut" }],
                "remove": [{ "uuid": "b" }],
            },
            "task": {
                "create": [{ "uuid": "c", "type": "PollSensor" }],
                "stop": [{ "uuid": "d" }],
                "status": {},
            },
        }));

        assert_eq!(command.request_id.as_deref(), Some("r1"));
        let peripheral = command.peripheral.unwrap();
        assert_eq!(peripheral.add.len(), 1);
        assert_eq!(peripheral.remove, [json!({ "uuid": "b" })]);
        let task = command.task.unwrap();
        assert_eq!(task.start, [json!({ "uuid": "c", "type": "PollSensor" })]);
        assert!(task.wants_status());
    }

    #[test]
    fn sparse_envelope() {
        let command: Command = deserialize(json!({ "task": { "stop": [{ "uuid": "d" }] } }));

        assert_eq!(command.request_id, None);
        assert_eq!(command.peripheral, None);
        assert_eq!(
            command.task,
            Some(TaskCommands {
                start: vec![],
                stop: vec![json!({ "uuid": "d" })],
                status: None,
            })
        );
    }

    #[test]
    fn builder_matches_wire_shape() {
        let command = Command::empty()
            .request_id("r2")
            .add_peripheral(json!({ "uuid": "a", "type": "DummyPeripheral" }))
            .remove_peripheral("b")
            .task_status();

        assert_eq!(
            serialize(&command),
            json!({
                "request_id": "r2",
                "peripheral": {
                    "add": [{ "uuid": "a", "type": "DummyPeripheral" }],
                    "remove": [{ "uuid": "b" }],
                },
                "task": { "status": true },
            })
        );
        assert_eq!(
            deserialize::<Command>(serialize(&command)).peripheral,
            Some(PeripheralCommands {
                add: vec![json!({ "uuid": "a", "type": "DummyPeripheral" })],
                remove: vec![json!({ "uuid": "b" })],
            })
        );
    }

    #[test]
    fn null_status_is_a_request() {
        let command: Command = deserialize(json!({ "task": { "status": null } }));
        let task = command.task.unwrap();
        assert_eq!(task.status, Some(serde_json::Value::Null));
        assert!(task.wants_status());

        let command: Command = deserialize(json!({ "task": { "start": [] } }));
        assert!(!command.task.unwrap().wants_status());
    }
}
