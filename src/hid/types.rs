//! Controller state types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::layout::{Axis, ReportLayout};

/// Lowest axis value put on the wire
pub const AXIS_MIN: i8 = -127;
/// Highest axis value put on the wire
pub const AXIS_MAX: i8 = 127;

/// Hat switch position
///
/// Rest is encoded as 0, the eight directions as 1..8 clockwise from north,
/// matching Logical Minimum 0 / Logical Maximum 8 in the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HatDirection {
    #[default]
    Centered,
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl HatDirection {
    /// 4-bit wire code
    pub fn code(&self) -> u8 {
        match self {
            HatDirection::Centered => 0,
            HatDirection::North => 1,
            HatDirection::NorthEast => 2,
            HatDirection::East => 3,
            HatDirection::SouthEast => 4,
            HatDirection::South => 5,
            HatDirection::SouthWest => 6,
            HatDirection::West => 7,
            HatDirection::NorthWest => 8,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => HatDirection::Centered,
            1 => HatDirection::North,
            2 => HatDirection::NorthEast,
            3 => HatDirection::East,
            4 => HatDirection::SouthEast,
            5 => HatDirection::South,
            6 => HatDirection::SouthWest,
            7 => HatDirection::West,
            8 => HatDirection::NorthWest,
            _ => return None,
        })
    }

    /// Direction from a screen-space offset (y grows downwards)
    ///
    /// Only the sign of each component is used; (0, 0) is `Centered`.
    pub fn from_xy(x: i32, y: i32) -> Self {
        match (x.signum(), y.signum()) {
            (0, -1) => HatDirection::North,
            (1, -1) => HatDirection::NorthEast,
            (1, 0) => HatDirection::East,
            (1, 1) => HatDirection::SouthEast,
            (0, 1) => HatDirection::South,
            (-1, 1) => HatDirection::SouthWest,
            (-1, 0) => HatDirection::West,
            (-1, -1) => HatDirection::NorthWest,
            _ => HatDirection::Centered,
        }
    }
}

/// One poll of the controller, normalized to a layout
///
/// Axes outside the layout are dropped, missing axes read as 0 and values
/// are clamped to -127..127. The button list always has exactly
/// `layout.button_count()` entries. Two snapshots compare equal iff they
/// would produce the same input report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSnapshot {
    axes: BTreeMap<Axis, i8>,
    buttons: Vec<bool>,
    hat: Option<HatDirection>,
}

impl ControllerSnapshot {
    pub fn capture(
        layout: &ReportLayout,
        axes: &BTreeMap<Axis, i8>,
        buttons: &[bool],
        hat: Option<HatDirection>,
    ) -> Self {
        let axes = layout
            .axes()
            .iter()
            .map(|axis| {
                let value = axes.get(axis).copied().unwrap_or(0);
                (*axis, value.clamp(AXIS_MIN, AXIS_MAX))
            })
            .collect();

        let buttons = (0..layout.button_count())
            .map(|i| buttons.get(i).copied().unwrap_or(false))
            .collect();

        let hat = layout
            .has_hat_switch()
            .then(|| hat.unwrap_or_default());

        Self { axes, buttons, hat }
    }

    /// Rest state: nothing pressed, sticks centered
    pub fn rest(layout: &ReportLayout) -> Self {
        Self::capture(layout, &BTreeMap::new(), &[], None)
    }

    pub fn axis(&self, axis: Axis) -> Option<i8> {
        self.axes.get(&axis).copied()
    }

    pub fn axes(&self) -> &BTreeMap<Axis, i8> {
        &self.axes
    }

    pub fn buttons(&self) -> &[bool] {
        &self.buttons
    }

    pub fn hat(&self) -> Option<HatDirection> {
        self.hat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hid::layout::GamepadKind;

    #[test]
    fn test_hat_from_xy() {
        assert_eq!(HatDirection::from_xy(0, 0), HatDirection::Centered);
        assert_eq!(HatDirection::from_xy(0, -1), HatDirection::North);
        assert_eq!(HatDirection::from_xy(1, -1), HatDirection::NorthEast);
        assert_eq!(HatDirection::from_xy(-1, 0), HatDirection::West);
        assert_eq!(HatDirection::from_xy(-1, -1), HatDirection::NorthWest);
        assert_eq!(HatDirection::from_xy(5, 3), HatDirection::SouthEast);
    }

    #[test]
    fn test_hat_codes() {
        for code in 0..=8 {
            let dir = HatDirection::from_code(code).unwrap();
            assert_eq!(dir.code(), code);
        }
        assert_eq!(HatDirection::from_code(9), None);
    }

    #[test]
    fn test_capture_normalizes() {
        let layout = ReportLayout::default();
        let mut axes = BTreeMap::new();
        axes.insert(Axis::X, -128);
        axes.insert(Axis::Z, 50);

        let snap = ControllerSnapshot::capture(&layout, &axes, &[true; 20], Some(HatDirection::East));
        assert_eq!(snap.axis(Axis::X), Some(-127));
        assert_eq!(snap.axis(Axis::Y), Some(0));
        assert_eq!(snap.axis(Axis::Z), None);
        assert_eq!(snap.buttons().len(), 14);
        // Layout has no hat switch
        assert_eq!(snap.hat(), None);
    }

    #[test]
    fn test_snapshot_equality() {
        let layout =
            ReportLayout::new(GamepadKind::Gamepad, 4, vec![Axis::X], true).unwrap();
        let a = ControllerSnapshot::rest(&layout);
        let b = ControllerSnapshot::capture(&layout, &BTreeMap::new(), &[false, false], None);
        assert_eq!(a, b);
        assert_eq!(a.hat(), Some(HatDirection::Centered));

        let c = ControllerSnapshot::capture(&layout, &BTreeMap::new(), &[false, true], None);
        assert_ne!(a, c);
    }
}
