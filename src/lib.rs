//! bt-gamepad - Bluetooth HID gamepad emulation
//!
//! Makes a Linux machine with a BlueZ adapter appear to hosts as a
//! wireless gamepad: builds the HID report descriptor and SDP record,
//! registers them with BlueZ, accepts the HID control and interrupt
//! channels and streams input reports polled from a controller source.

pub mod bluetooth;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod hid;
pub mod sdp;
pub mod utils;

pub use error::{AppError, Result};
