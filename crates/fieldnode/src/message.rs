use serde::Serialize;

use crate::response::{ErrorMessage, ResultMessage};
use crate::system::{Register, StatusReport, SystemHealth};
use crate::telemetry::{Alert, Telemetry};

/// Every message a device sends to its server.
///
/// The variant is encoded in the `type` field of the JSON object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
#[serde(tag = "type")]
pub enum Message<'a> {
    /// Results of a command envelope.
    #[serde(rename = "result")]
    Result(ResultMessage),
    /// Values read by a task.
    #[serde(rename = "tel")]
    Telemetry(Telemetry),
    /// A threshold crossing.
    #[serde(rename = "alert")]
    Alert(Alert),
    /// Device health figures.
    #[serde(rename = "sys")]
    System(SystemHealth),
    /// The list of live tasks.
    #[serde(rename = "status")]
    Status(StatusReport<'a>),
    /// Device registration.
    #[serde(rename = "reg")]
    Register(Register<'a>),
    /// A rejected envelope.
    #[serde(rename = "err")]
    Error(ErrorMessage<'a>),
}

impl Message<'_> {
    /// Returns the wire name of the message kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Result(_) => "result",
            Self::Telemetry(_) => "tel",
            Self::Alert(_) => "alert",
            Self::System(_) => "sys",
            Self::Status(_) => "status",
            Self::Register(_) => "reg",
            Self::Error(_) => "err",
        }
    }

    /// Converts the message into one which owns all its data.
    #[must_use]
    pub fn into_owned(self) -> Message<'static> {
        use alloc::borrow::Cow;

        fn own(value: Cow<'_, str>) -> Cow<'static, str> {
            Cow::Owned(value.into_owned())
        }

        match self {
            Self::Result(message) => Message::Result(message),
            Self::Telemetry(telemetry) => Message::Telemetry(telemetry),
            Self::Alert(alert) => Message::Alert(alert),
            Self::System(health) => Message::System(health),
            Self::Status(report) => Message::Status(StatusReport {
                tasks: report
                    .tasks
                    .into_iter()
                    .map(|status| crate::system::TaskStatus {
                        task: status.task,
                        kind: own(status.kind),
                    })
                    .collect(),
            }),
            Self::Register(register) => Message::Register(Register {
                version: own(register.version),
                peripherals: register.peripherals.into_iter().map(own).collect(),
                tasks: register.tasks.into_iter().map(own).collect(),
            }),
            Self::Error(error) => Message::Error(ErrorMessage {
                context: own(error.context),
                message: own(error.message),
                request_id: error.request_id.map(own),
            }),
        }
    }
}

impl From<ResultMessage> for Message<'_> {
    fn from(message: ResultMessage) -> Self {
        Self::Result(message)
    }
}

impl From<Telemetry> for Message<'_> {
    fn from(telemetry: Telemetry) -> Self {
        Self::Telemetry(telemetry)
    }
}

impl From<Alert> for Message<'_> {
    fn from(alert: Alert) -> Self {
        Self::Alert(alert)
    }
}

impl From<SystemHealth> for Message<'_> {
    fn from(health: SystemHealth) -> Self {
        Self::System(health)
    }
}

#[cfg(test)]
mod tests {
    use alloc::borrow::Cow;
    use alloc::vec;

    use serde_json::json;

    use uuid::Uuid;

    use crate::response::{ActionResults, ErrorMessage, ResultEntry, ResultMessage};
    use crate::serialize;
    use crate::system::Register;
    use crate::telemetry::{Alert, TriggerType};

    use super::Message;

    #[test]
    fn tagged_result() {
        let message = Message::from(ResultMessage::new(Some("r1".into())).peripheral(
            ActionResults {
                add: vec![ResultEntry::success("a1")],
                ..ActionResults::new()
            },
        ));

        assert_eq!(message.kind(), "result");
        assert_eq!(
            serialize(&message),
            json!({
                "type": "result",
                "request_id": "r1",
                "peripheral": { "add": [{ "uuid": "a1", "status": "success" }] },
            })
        );
    }

    #[test]
    fn tagged_alert() {
        let message = Message::from(Alert {
            task_id: Uuid::from_u128(1),
            peripheral: Uuid::from_u128(2),
            threshold: 20.0,
            trigger_type: TriggerType::Rising,
        });

        assert_eq!(
            serialize(message),
            json!({
                "type": "alert",
                "task_id": "00000000-0000-0000-0000-000000000001",
                "peripheral": "00000000-0000-0000-0000-000000000002",
                "threshold": 20.0,
                "trigger_type": "rising",
            })
        );
    }

    #[test]
    fn tagged_register_and_error() {
        let register = Message::Register(Register {
            version: Cow::Borrowed("0.1.0"),
            peripherals: vec![Cow::Borrowed("DigitalOut")],
            tasks: vec![Cow::Borrowed("PollSensor")],
        });
        assert_eq!(
            serialize(register.into_owned()),
            json!({
                "type": "reg",
                "version": "0.1.0",
                "peripherals": ["DigitalOut"],
                "tasks": ["PollSensor"],
            })
        );

        let error = Message::Error(ErrorMessage::new("Node", "Invalid JSON"));
        assert_eq!(
            serialize(error),
            json!({ "type": "err", "context": "Node", "message": "Invalid JSON" })
        );
    }

    #[cfg(feature = "deserialize")]
    #[test]
    fn parse_tagged_message() {
        let message: Message<'static> = crate::deserialize(json!({
            "type": "result",
            "task": { "start": [{ "uuid": "t1", "status": "fail", "detail": "boom" }] },
        }));

        let Message::Result(result) = message else {
            panic!("expected a result message");
        };
        assert_eq!(
            result.task.unwrap().start,
            [ResultEntry::fail("t1", "boom")]
        );
    }
}
