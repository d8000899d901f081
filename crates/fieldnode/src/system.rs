use alloc::borrow::Cow;
use alloc::vec::Vec;

use serde::Serialize;

use uuid::Uuid;

/// Periodic health figures of a device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct SystemHealth {
    /// Currently free heap memory, in bytes.
    pub free_memory_bytes: u32,
    /// The lowest amount of free heap memory ever observed, in bytes.
    pub least_free_bytes: u32,
    /// Heap fragmentation estimate, in percent.
    pub heap_fragmentation_percent: f32,
    /// Share of time spent running task callbacks, in percent.
    pub productive_percent: f32,
    /// Signal strength of the current WiFi link, in dBm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wifi_rssi: Option<i8>,
}

/// A live task as reported in a [`StatusReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct TaskStatus<'a> {
    /// Task identifier. System tasks have none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<Uuid>,
    /// Task type name.
    #[serde(rename = "type")]
    pub kind: Cow<'a, str>,
}

/// The list of tasks currently known to the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct StatusReport<'a> {
    /// Live tasks.
    pub tasks: Vec<TaskStatus<'a>>,
}

/// The message a device sends each time its session with the server opens.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct Register<'a> {
    /// Firmware version.
    pub version: Cow<'a, str>,
    /// Names of the peripheral types the device can construct.
    pub peripherals: Vec<Cow<'a, str>>,
    /// Names of the task types the device can start.
    pub tasks: Vec<Cow<'a, str>>,
}
