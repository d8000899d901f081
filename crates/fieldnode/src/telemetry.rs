use alloc::vec::Vec;

use serde::Serialize;

use uuid::Uuid;

/// A value together with the identifier of the kind of data it represents.
///
/// A data point type is a server-defined identifier, such as the one of
/// "temperature in °C" or "relative humidity in %".
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct ValueUnit {
    /// Value.
    pub value: f32,
    /// Data point type identifier.
    pub data_point_type: Uuid,
}

impl ValueUnit {
    /// The key of the value.
    pub const VALUE_KEY: &'static str = "value";
    /// The key of the data point type.
    pub const DATA_POINT_TYPE_KEY: &'static str = "data_point_type";

    /// Creates a [`ValueUnit`].
    #[must_use]
    pub const fn new(value: f32, data_point_type: Uuid) -> Self {
        Self {
            value,
            data_point_type,
        }
    }
}

/// Values read from a peripheral on behalf of a task.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct Telemetry {
    /// The task which read the values.
    pub task_id: Uuid,
    /// The peripheral the values come from.
    pub peripheral: Uuid,
    /// The values read.
    pub data_points: Vec<ValueUnit>,
}

impl Telemetry {
    /// Creates a [`Telemetry`].
    #[must_use]
    pub const fn new(task_id: Uuid, peripheral: Uuid, data_points: Vec<ValueUnit>) -> Self {
        Self {
            task_id,
            peripheral,
            data_points,
        }
    }
}

/// The direction of a threshold crossing which raises an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    /// The value rises above the threshold.
    Rising,
    /// The value falls below the threshold.
    Falling,
    /// The value crosses the threshold in any direction.
    Either,
}

impl TriggerType {
    /// Parses a [`TriggerType`] from its wire name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "rising" => Some(Self::Rising),
            "falling" => Some(Self::Falling),
            "either" => Some(Self::Either),
            _ => None,
        }
    }

    /// Returns whether a crossing in the given direction raises an alert.
    ///
    /// `crossing` is expected to be either [`TriggerType::Rising`] or
    /// [`TriggerType::Falling`].
    #[must_use]
    pub fn accepts(self, crossing: Self) -> bool {
        self == Self::Either || self == crossing
    }
}

/// A threshold crossing detected by a task.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct Alert {
    /// The task which detected the crossing.
    pub task_id: Uuid,
    /// The monitored peripheral.
    pub peripheral: Uuid,
    /// The crossed threshold.
    pub threshold: f32,
    /// The direction of the crossing.
    pub trigger_type: TriggerType,
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use serde_json::json;

    use uuid::Uuid;

    use crate::serialize;

    use super::{Telemetry, TriggerType, ValueUnit};

    #[test]
    fn telemetry_shape() {
        let task = Uuid::from_u128(1);
        let peripheral = Uuid::from_u128(2);
        let data_point_type = Uuid::from_u128(3);

        assert_eq!(
            serialize(Telemetry::new(
                task,
                peripheral,
                vec![ValueUnit::new(1.5, data_point_type)]
            )),
            json!({
                "task_id": "00000000-0000-0000-0000-000000000001",
                "peripheral": "00000000-0000-0000-0000-000000000002",
                "data_points": [{
                    "value": 1.5,
                    "data_point_type": "00000000-0000-0000-0000-000000000003",
                }],
            })
        );
    }

    #[test]
    fn trigger_types() {
        assert_eq!(TriggerType::from_name("falling"), Some(TriggerType::Falling));
        assert_eq!(TriggerType::from_name("up"), None);
        assert!(TriggerType::Either.accepts(TriggerType::Rising));
        assert!(!TriggerType::Falling.accepts(TriggerType::Rising));
    }
}
