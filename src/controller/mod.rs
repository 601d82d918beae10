//! Controller sources and the polling loop
//!
//! A [`ControllerSource`] is whatever produces button/axis readings: a
//! physical joystick driver, a virtual controller, or the demo sources in
//! [`fake`]. The [`Poller`] reads it at a fixed rate and drives the
//! [`DeviceSession`](crate::bluetooth::DeviceSession).

pub mod fake;
pub mod poller;

use std::collections::BTreeMap;

use crate::error::Result;
use crate::hid::{Axis, GamepadKind, HatDirection, ReportLayout};

pub use fake::{FakeController, IdleController};
pub use poller::{Poller, PollerConfig, SendMode, TickOutcome};

/// Input device feeding the gamepad
///
/// The `defined_*` methods describe the device and must not change between
/// calls; reads may block.
pub trait ControllerSource: Send {
    fn defined_button_count(&self) -> usize;

    /// Axes in report order
    fn defined_axes(&self) -> Vec<Axis>;

    fn defined_has_hat_switch(&self) -> bool {
        false
    }

    fn read_axes(&mut self) -> Result<BTreeMap<Axis, i8>>;

    fn read_buttons(&mut self) -> Result<Vec<bool>>;

    fn read_hat(&mut self) -> Result<Option<HatDirection>> {
        Ok(None)
    }
}

/// Report layout matching what a source declares
pub fn layout_for(kind: GamepadKind, source: &dyn ControllerSource) -> Result<ReportLayout> {
    ReportLayout::new(
        kind,
        source.defined_button_count(),
        source.defined_axes(),
        source.defined_has_hat_switch(),
    )
}
