//! The communication interface between a `fieldnode` device and its server.
//!
//! This crate provides APIs to:
//!
//! - Decode the command envelopes a server sends to a device. A command
//!   envelope adds or removes peripherals, starts or stops tasks, and asks
//!   for the status of the running tasks.
//! - Encode every message a device sends back: per-item command results,
//!   telemetry, alerts, system health, task status, the registration
//!   message sent when a session opens, and protocol errors.
//! - Read the declarative parameter objects which describe a peripheral or a
//!   task, reporting a precise message for each missing or malformed
//!   property.
//!
//! A device always needs to serialize its messages, so serialization is
//! always available. Deserialization is enabled by the `deserialize`
//! feature, which is on by default.
//!
//! This crate can be compiled for both `std` and `no_std` environments.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![no_std]

extern crate alloc;

/// Colors for LED strips.
pub mod color;
/// Inbound command envelopes.
pub mod command;
/// All messages a device sends to its server.
pub mod message;
/// Declarative parameter objects.
pub mod parameters;
/// Per-item command results and protocol errors.
pub mod response;
/// Device health and task status reports.
pub mod system;
/// Telemetry data points and alerts.
pub mod telemetry;

pub use uuid::Uuid;

#[cfg(test)]
pub(crate) fn serialize<T: serde::Serialize>(value: T) -> serde_json::Value {
    serde_json::to_value(value).unwrap()
}

#[cfg(test)]
#[cfg(feature = "deserialize")]
pub(crate) fn deserialize<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> T {
    serde_json::from_value(value).unwrap()
}
