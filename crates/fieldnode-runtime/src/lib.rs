//! The `fieldnode-runtime` library crate is the kernel running on every
//! `fieldnode` device.
//!
//! A device receives command envelopes from a server and answers them with
//! messages. The kernel is made of three parts:
//!
//! - A peripheral registry, constructing drivers from JSON parameters and
//!   exposing their capabilities
//! - A task manager, running cooperative tasks which read and drive the
//!   peripherals on a shared timeline
//! - A network state machine, bringing the device online through its known
//!   WiFi networks, a captive portal as last resort, and keeping the server
//!   session open
//!
//! Everything runs on a single thread. A [`node::Node`] is ticked either by
//! the firmware main loop or by the `tokio` based [`runner::run`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

/// Time sources.
pub mod clock;
/// Device configuration and persisted secrets.
pub mod config;
/// Error management.
pub mod error;
/// Hardware abstraction layer.
pub mod hal;
/// Network acquisition and the server session.
pub mod network;
/// The device kernel.
pub mod node;
/// Queue of the messages sent to the server.
pub mod outbox;
/// Peripheral registry and drivers.
pub mod peripheral;
/// An asynchronous loop driving a node.
pub mod runner;
/// Task lifecycle and built-in tasks.
pub mod task;

#[cfg(test)]
mod tests;
