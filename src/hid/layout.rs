//! Input report layout shared by the descriptor builder and the report packer
//!
//! Report format (after the 0xA1 0x01 prefix):
//!   [0..B)     Buttons, one bit each, LSB first, zero padded to a byte
//!   [B..B+A)   Axes, one signed byte each (-127..127), declared order
//!   [B+A]      Hat switch (low nibble), only when enabled

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Largest button count accepted for a single report
pub const MAX_BUTTONS: usize = 128;

/// Axis usages available in the Generic Desktop page
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
    Rx,
    Ry,
    Rz,
    Slider,
    Dial,
    Wheel,
}

impl Axis {
    /// Generic Desktop usage ID
    pub fn usage(&self) -> u8 {
        match self {
            Axis::X => 0x30,
            Axis::Y => 0x31,
            Axis::Z => 0x32,
            Axis::Rx => 0x33,
            Axis::Ry => 0x34,
            Axis::Rz => 0x35,
            Axis::Slider => 0x36,
            Axis::Dial => 0x37,
            Axis::Wheel => 0x38,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
            Axis::Rx => "rx",
            Axis::Ry => "ry",
            Axis::Rz => "rz",
            Axis::Slider => "slider",
            Axis::Dial => "dial",
            Axis::Wheel => "wheel",
        }
    }
}

/// Top-level application usage of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamepadKind {
    Joystick,
    #[default]
    Gamepad,
    MultiAxis,
}

impl GamepadKind {
    /// Generic Desktop usage ID for the application collection
    pub fn usage(&self) -> u8 {
        match self {
            GamepadKind::Joystick => 0x04,
            GamepadKind::Gamepad => 0x05,
            GamepadKind::MultiAxis => 0x08,
        }
    }
}

/// Fixed byte layout of one input report
///
/// Built once and never mutated; a different layout means a new
/// descriptor, a new SDP record and a new session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLayout {
    kind: GamepadKind,
    button_count: usize,
    axes: Vec<Axis>,
    has_hat_switch: bool,
}

impl ReportLayout {
    /// Validate and build a layout
    pub fn new(
        kind: GamepadKind,
        button_count: usize,
        axes: Vec<Axis>,
        has_hat_switch: bool,
    ) -> Result<Self> {
        if button_count == 0 && axes.is_empty() && !has_hat_switch {
            return Err(AppError::InvalidLayout(
                "layout declares no buttons, axes or hat switch".to_string(),
            ));
        }
        if button_count > MAX_BUTTONS {
            return Err(AppError::InvalidLayout(format!(
                "{} buttons requested, at most {} supported",
                button_count, MAX_BUTTONS
            )));
        }
        for (i, axis) in axes.iter().enumerate() {
            if axes[..i].contains(axis) {
                return Err(AppError::InvalidLayout(format!(
                    "axis {} declared twice",
                    axis.name()
                )));
            }
        }

        Ok(Self {
            kind,
            button_count,
            axes,
            has_hat_switch,
        })
    }

    pub fn kind(&self) -> GamepadKind {
        self.kind
    }

    pub fn button_count(&self) -> usize {
        self.button_count
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    pub fn has_hat_switch(&self) -> bool {
        self.has_hat_switch
    }

    /// Bytes used by the button bitmap
    pub fn button_bytes(&self) -> usize {
        self.button_count.div_ceil(8)
    }

    /// Constant bits appended after the last button
    pub fn button_padding_bits(&self) -> usize {
        match self.button_count % 8 {
            0 => 0,
            used => 8 - used,
        }
    }

    /// Offset of the first axis byte within the payload
    pub fn axis_offset(&self) -> usize {
        self.button_bytes()
    }

    /// Offset of the hat byte within the payload, if any
    pub fn hat_offset(&self) -> Option<usize> {
        self.has_hat_switch
            .then(|| self.button_bytes() + self.axes.len())
    }

    /// Payload length, excluding the transport prefix
    pub fn payload_len(&self) -> usize {
        self.button_bytes() + self.axes.len() + usize::from(self.has_hat_switch)
    }
}

impl Default for ReportLayout {
    /// 14 buttons, two sticks, no hat switch
    fn default() -> Self {
        Self {
            kind: GamepadKind::Gamepad,
            button_count: 14,
            axes: vec![Axis::X, Axis::Y, Axis::Rx, Axis::Ry],
            has_hat_switch: false,
        }
    }
}
