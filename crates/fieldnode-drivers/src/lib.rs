//! `fieldnode-drivers` is a library crate that provides architecture-agnostic
//! drivers for the sensors a `fieldnode` device can drive.
//!
//! All drivers are implemented using only the [`embedded-hal`] traits,
//! ensuring compatibility with any platform that supports these abstractions.
//!
//! Drivers never block: an operation which needs the device to settle returns
//! the time to wait, and the caller polls again once it has elapsed.
//!
//! [`embedded-hal`]: https://crates.io/crates/embedded-hal

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![no_std]

/// The `BH1750` driver.
#[cfg(feature = "bh1750")]
pub mod bh1750;
