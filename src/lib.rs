//! SafeBeacon library: signaling core of a wearable LoRa panic button.
//!
//! A press opens a three-second confirmation window; a second press inside
//! the window cancels, otherwise an emergency packet goes out over LoRa.
//! Everything here is `no_std`, allocation-free and reaches hardware only
//! through the traits in [`hal`] (plus `embedded-hal`'s `OutputPin` and
//! `DelayNs`), so the whole protocol is testable on the host with
//! `cargo test`. The ESP32 firmware binary is a thin consumer that provides
//! the GPIO edge task, the confirmation timer and the SPI bus.
//!
//! Layout, leaves first:
//! - `debounce`, `packet`, `state`: pure building blocks
//! - `signal`: lock-free mailboxes shared with the asynchronous producers
//! - `transmit`: encode-and-send policy with one bounded retry
//! - `indicator`, `battery`: LED patterns and charge estimation
//! - `session`: the emergency state machine that ties them together
//! - `protocol`, `comm`: NDJSON status reports on the serial console
//! - `radio`: SX127x LoRa driver implementing [`hal::RadioLink`]
//! - `receiver`: framing and validation on the gateway side
//! - `config`, `board`: compile-time settings and pin maps

#![cfg_attr(not(test), no_std)]

pub mod battery;
pub mod board;
pub mod comm;
pub mod config;
pub mod debounce;
pub mod hal;
pub mod indicator;
pub mod packet;
pub mod protocol;
pub mod radio;
pub mod receiver;
pub mod session;
pub mod signal;
pub mod state;
pub mod transmit;
