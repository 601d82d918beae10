//! Class of Device bit fields
//!
//! Full assigned-numbers table for the fields below, kept for building
//! classes other than the defaults.
//!
//! Layout of the 24-bit value:
//!   bits 13..23  major service classes
//!   bits  8..12  major device class
//!   bits  2..7   minor device class

/// Limited discoverable mode flag (bit 13)
pub const LIMITED_DISCOVERABLE_MODE: u32 = 0x00_2000;

/// Major service classes
pub mod service {
    pub const POSITIONING: u32 = 0x01_0000;
    pub const NETWORKING: u32 = 0x02_0000;
    pub const RENDERING: u32 = 0x04_0000;
    pub const CAPTURING: u32 = 0x08_0000;
    pub const OBJECT_TRANSFER: u32 = 0x10_0000;
    pub const AUDIO: u32 = 0x20_0000;
    pub const TELEPHONY: u32 = 0x40_0000;
    pub const INFORMATION: u32 = 0x80_0000;
}

/// Major device classes
pub mod major {
    pub const MISCELLANEOUS: u32 = 0x0000;
    pub const COMPUTER: u32 = 0x0100;
    pub const PHONE: u32 = 0x0200;
    pub const NETWORK_ACCESS_POINT: u32 = 0x0300;
    pub const AUDIO_VIDEO: u32 = 0x0400;
    pub const PERIPHERAL: u32 = 0x0500;
    pub const IMAGING: u32 = 0x0600;
    pub const WEARABLE: u32 = 0x0700;
    pub const TOY: u32 = 0x0800;
    pub const HEALTH: u32 = 0x0900;
    pub const UNCATEGORIZED: u32 = 0x1F00;
}

/// Minor classes of the peripheral major class
pub mod peripheral {
    pub const UNCATEGORIZED: u32 = 0x00;
    pub const JOYSTICK: u32 = 0x04;
    pub const GAMEPAD: u32 = 0x08;
    pub const REMOTE_CONTROL: u32 = 0x0C;
    pub const SENSING_DEVICE: u32 = 0x10;
    pub const DIGITIZER_TABLET: u32 = 0x14;
    pub const CARD_READER: u32 = 0x18;
    pub const KEYBOARD: u32 = 0x40;
    pub const POINTING_DEVICE: u32 = 0x80;
}

/// Default class advertised by the gamepad: 0x002508
pub const GAMEPAD_DEVICE_CLASS: u32 =
    LIMITED_DISCOVERABLE_MODE | major::PERIPHERAL | peripheral::GAMEPAD;

/// Peripheral class for a given HID subclass byte
pub fn peripheral_class(subclass: u8) -> u32 {
    LIMITED_DISCOVERABLE_MODE | major::PERIPHERAL | (u32::from(subclass) & 0xFC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gamepad_class() {
        assert_eq!(GAMEPAD_DEVICE_CLASS, 0x002508);
        assert_eq!(GAMEPAD_DEVICE_CLASS & 0x1F00, major::PERIPHERAL);
        assert_eq!(GAMEPAD_DEVICE_CLASS & 0xFC, peripheral::GAMEPAD);
    }

    #[test]
    fn test_peripheral_class() {
        assert_eq!(peripheral_class(0x04), 0x002504);
        assert_eq!(peripheral_class(0x08), GAMEPAD_DEVICE_CLASS);
        assert_eq!(peripheral_class(0x00), LIMITED_DISCOVERABLE_MODE | major::PERIPHERAL);
    }
}
