//! Input report packing
//!
//! Wire format on the interrupt channel:
//!   [0] 0xA1 (HIDP DATA | Input)
//!   [1] Report ID (0x01)
//!   [2..] payload laid out by [`ReportLayout`]

use super::layout::ReportLayout;
use super::report_desc::INPUT_REPORT_ID;
use super::types::ControllerSnapshot;

/// HIDP transaction header for an input DATA message
pub const HIDP_DATA_INPUT: u8 = 0xA1;

/// Bytes preceding the payload
pub const REPORT_PREFIX: [u8; 2] = [HIDP_DATA_INPUT, INPUT_REPORT_ID];

/// Full message length for a layout, prefix included
pub fn report_len(layout: &ReportLayout) -> usize {
    REPORT_PREFIX.len() + layout.payload_len()
}

/// Pack a snapshot into an interrupt-channel message
///
/// The snapshot must have been captured against the same layout.
pub fn pack_input_report(layout: &ReportLayout, snapshot: &ControllerSnapshot) -> Vec<u8> {
    let mut data = Vec::with_capacity(report_len(layout));
    data.extend_from_slice(&REPORT_PREFIX);

    let buttons_start = data.len();
    data.resize(buttons_start + layout.button_bytes(), 0);
    for (i, pressed) in snapshot.buttons().iter().take(layout.button_count()).enumerate() {
        if *pressed {
            data[buttons_start + i / 8] |= 1 << (i % 8);
        }
    }

    for axis in layout.axes() {
        let value = snapshot.axis(*axis).unwrap_or(0);
        data.push(value as u8);
    }

    if layout.has_hat_switch() {
        let code = snapshot.hat().map(|h| h.code()).unwrap_or(0);
        data.push(code & 0x0F);
    }

    data
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::hid::layout::{Axis, GamepadKind};
    use crate::hid::types::HatDirection;

    fn sticks() -> Vec<Axis> {
        vec![Axis::X, Axis::Y, Axis::Rx, Axis::Ry]
    }

    #[test]
    fn test_default_layout_is_eight_bytes() {
        let layout = ReportLayout::new(GamepadKind::Gamepad, 14, sticks(), false).unwrap();
        let report = pack_input_report(&layout, &ControllerSnapshot::rest(&layout));
        assert_eq!(report.len(), 8);
        assert_eq!(report, vec![0xA1, 0x01, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_hat_layout_is_nine_bytes() {
        let layout = ReportLayout::new(GamepadKind::Gamepad, 15, sticks(), true).unwrap();
        let snap = ControllerSnapshot::capture(
            &layout,
            &BTreeMap::new(),
            &[],
            Some(HatDirection::NorthWest),
        );
        let report = pack_input_report(&layout, &snap);
        assert_eq!(report.len(), 9);
        assert_eq!(report[8], 8);
        assert!(report[8] & 0x0F <= 8);
        assert_eq!(report[8] & 0xF0, 0);
    }

    #[test]
    fn test_button_bits() {
        let layout = ReportLayout::default();
        let mut buttons = vec![false; 14];
        buttons[0] = true;
        buttons[2] = true;
        let snap = ControllerSnapshot::capture(&layout, &BTreeMap::new(), &buttons, None);
        let report = pack_input_report(&layout, &snap);
        assert_eq!(report[2], 0x05);
        assert_eq!(report[3], 0x00);
    }

    #[test]
    fn test_button_bit_matches_state() {
        let layout = ReportLayout::new(GamepadKind::Gamepad, 13, vec![], false).unwrap();
        let buttons: Vec<bool> = (0..13).map(|i| i % 3 == 1).collect();
        let snap = ControllerSnapshot::capture(&layout, &BTreeMap::new(), &buttons, None);
        let report = pack_input_report(&layout, &snap);
        for (i, pressed) in buttons.iter().enumerate() {
            let bit = report[2 + i / 8] & (1 << (i % 8)) != 0;
            assert_eq!(bit, *pressed, "button {}", i);
        }
        // Unused high bits of the last byte stay clear
        assert_eq!(report[3] & 0xE0, 0);
    }

    #[test]
    fn test_axes_in_declared_order() {
        let layout =
            ReportLayout::new(GamepadKind::Joystick, 8, vec![Axis::Ry, Axis::X], false).unwrap();
        let mut axes = BTreeMap::new();
        axes.insert(Axis::X, -127);
        axes.insert(Axis::Ry, 100);
        let snap = ControllerSnapshot::capture(&layout, &axes, &[true; 8], None);
        let report = pack_input_report(&layout, &snap);
        assert_eq!(report, vec![0xA1, 0x01, 0xFF, 100, 0x81]);
    }

    #[test]
    fn test_report_length_formula() {
        for buttons in [1usize, 7, 8, 9, 16, 33] {
            for axes in [vec![], vec![Axis::X], sticks()] {
                for hat in [false, true] {
                    let layout =
                        ReportLayout::new(GamepadKind::Gamepad, buttons, axes.clone(), hat)
                            .unwrap();
                    let report = pack_input_report(&layout, &ControllerSnapshot::rest(&layout));
                    let expected = 2 + buttons.div_ceil(8) + axes.len() + usize::from(hat);
                    assert_eq!(report.len(), expected);
                    assert_eq!(report_len(&layout), expected);
                }
            }
        }
    }
}
