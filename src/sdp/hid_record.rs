//! HID profile service record
//!
//! Attribute IDs come from the Bluetooth Core (universal attributes) and
//! HID profile specifications. Hosts match on them, so they are a fixed
//! contract.

use super::record::{SdpRecord, SdpValue};
use crate::error::{AppError, Result};
use crate::hid::{GamepadKind, ReportDescriptor};

/// Universal and HID attribute IDs
pub mod attr {
    pub const SERVICE_RECORD_HANDLE: u16 = 0x0000;
    pub const SERVICE_CLASS_ID_LIST: u16 = 0x0001;
    pub const SERVICE_RECORD_STATE: u16 = 0x0002;
    pub const SERVICE_ID: u16 = 0x0003;
    pub const PROTOCOL_DESCRIPTOR_LIST: u16 = 0x0004;
    pub const BROWSE_GROUP_LIST: u16 = 0x0005;
    pub const LANGUAGE_BASE_ATTRIBUTE_ID_LIST: u16 = 0x0006;
    pub const SERVICE_INFO_TIME_TO_LIVE: u16 = 0x0007;
    pub const SERVICE_AVAILABILITY: u16 = 0x0008;
    pub const BLUETOOTH_PROFILE_DESCRIPTOR_LIST: u16 = 0x0009;
    pub const DOCUMENTATION_URL: u16 = 0x000A;
    pub const CLIENT_EXECUTABLE_URL: u16 = 0x000B;
    pub const ICON_URL: u16 = 0x000C;
    pub const ADDITIONAL_PROTOCOL_DESCRIPTOR_LISTS: u16 = 0x000D;

    // Offsets from a language base
    pub const SERVICE_NAME_OFFSET: u16 = 0x0000;
    pub const SERVICE_DESCRIPTION_OFFSET: u16 = 0x0001;
    pub const PROVIDER_NAME_OFFSET: u16 = 0x0002;

    pub const HID_DEVICE_RELEASE_NUMBER: u16 = 0x0200;
    pub const HID_PARSER_VERSION: u16 = 0x020B;
    pub const HID_PROFILE_VERSION: u16 = 0x0201;
    pub const HID_DEVICE_SUBCLASS: u16 = 0x0202;
    pub const HID_COUNTRY_CODE: u16 = 0x0203;
    pub const HID_VIRTUAL_CABLE: u16 = 0x0204;
    pub const HID_RECONNECT_INITIATE: u16 = 0x0205;
    pub const HID_DESCRIPTOR_LIST: u16 = 0x0206;
    pub const HID_LANGID_BASE_LIST: u16 = 0x0207;
    pub const HID_SDP_DISABLE: u16 = 0x0208;
    pub const HID_BATTERY_POWER: u16 = 0x0209;
    pub const HID_REMOTE_WAKE: u16 = 0x020A;
    pub const HID_SUPERVISION_TIMEOUT: u16 = 0x020C;
    pub const HID_NORMALLY_CONNECTABLE: u16 = 0x020D;
    pub const HID_BOOT_DEVICE: u16 = 0x020E;
    pub const HID_SSR_HOST_MAX_LATENCY: u16 = 0x020F;
    pub const HID_SSR_HOST_MIN_TIMEOUT: u16 = 0x0210;
}

/// Protocol UUIDs and PSMs
pub mod protocol {
    pub const L2CAP: u16 = 0x0100;
    pub const HIDP: u16 = 0x0011;
    /// PSM of the HID control channel
    pub const PSM_HID_CONTROL: u16 = 0x0011;
    /// PSM of the HID interrupt channel
    pub const PSM_HID_INTERRUPT: u16 = 0x0013;
}

/// Service class / profile UUIDs
pub mod service_class {
    pub const PUBLIC_BROWSE_GROUP: u16 = 0x1002;
    pub const HUMAN_INTERFACE_DEVICE: u16 = 0x1124;
}

/// Minor device class values for the Peripheral major class, as used by
/// HIDDeviceSubclass
pub mod subclass {
    pub const UNCATEGORIZED: u8 = 0x00;
    pub const JOYSTICK: u8 = 0x04;
    pub const GAMEPAD: u8 = 0x08;
}

/// HIDDescriptorList entry type for a report descriptor
pub const DESCRIPTOR_TYPE_REPORT: u8 = 0x22;

/// IANA MIBenum for UTF-8
pub const ENCODING_UTF8: u16 = 0x006A;
/// Attribute base for the primary language
pub const PRIMARY_LANGUAGE_BASE: u16 = 0x0100;
/// USB LANGID for English (United States)
pub const LANGID_EN_US: u16 = 0x0409;

/// One LanguageBaseAttributeIDList triplet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageBase {
    /// ISO 639-1 code packed as two ASCII bytes, e.g. "en" = 0x656e
    pub language: u16,
    pub encoding: u16,
    pub base: u16,
}

impl LanguageBase {
    pub fn new(iso_639_1: &str, encoding: u16, base: u16) -> Result<Self> {
        let bytes = iso_639_1.as_bytes();
        if bytes.len() != 2 || !bytes.iter().all(u8::is_ascii_alphabetic) {
            return Err(AppError::InvalidAttribute(format!(
                "expected two letter ISO 639-1 code, got '{}'",
                iso_639_1
            )));
        }
        Ok(Self {
            language: u16::from_be_bytes([bytes[0], bytes[1]]),
            encoding,
            base,
        })
    }
}

/// Text and flags of the HID service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HidServiceInfo {
    pub service_name: String,
    pub service_description: String,
    pub provider: String,
    pub subclass: u8,
    pub virtual_cable: bool,
    pub reconnect_initiate: bool,
    pub normally_connectable: bool,
    pub boot_device: bool,
}

impl Default for HidServiceInfo {
    fn default() -> Self {
        Self {
            service_name: "A Virtual Gamepad Controller".to_string(),
            service_description: "Keyboard > BT Gamepad".to_string(),
            provider: "GCC".to_string(),
            subclass: subclass::GAMEPAD,
            virtual_cable: false,
            reconnect_initiate: false,
            normally_connectable: true,
            boot_device: false,
        }
    }
}

/// HIDDeviceSubclass matching the application usage
pub fn subclass_for(kind: GamepadKind) -> u8 {
    match kind {
        GamepadKind::Gamepad => subclass::GAMEPAD,
        GamepadKind::Joystick => subclass::JOYSTICK,
        GamepadKind::MultiAxis => subclass::UNCATEGORIZED,
    }
}

/// Build the complete HID service record around a report descriptor
pub fn build_hid_record(info: &HidServiceInfo, descriptor: &ReportDescriptor) -> Result<SdpRecord> {
    use SdpValue::{Bool, UInt16, UInt8, Uuid16};

    let language = LanguageBase::new("en", ENCODING_UTF8, PRIMARY_LANGUAGE_BASE)?;
    let l2cap_psm = |psm| SdpValue::seq([Uuid16(protocol::L2CAP), UInt16(psm)]);
    let hidp = || SdpValue::seq([Uuid16(protocol::HIDP)]);

    let record = SdpRecord::new()
        .with(
            attr::SERVICE_CLASS_ID_LIST,
            SdpValue::seq([Uuid16(service_class::HUMAN_INTERFACE_DEVICE)]),
        )
        .with(
            attr::PROTOCOL_DESCRIPTOR_LIST,
            SdpValue::seq([l2cap_psm(protocol::PSM_HID_CONTROL), hidp()]),
        )
        .with(
            attr::BROWSE_GROUP_LIST,
            SdpValue::seq([Uuid16(service_class::PUBLIC_BROWSE_GROUP)]),
        )
        .with(
            attr::LANGUAGE_BASE_ATTRIBUTE_ID_LIST,
            SdpValue::seq([
                UInt16(language.language),
                UInt16(language.encoding),
                UInt16(language.base),
            ]),
        )
        .with(
            attr::BLUETOOTH_PROFILE_DESCRIPTOR_LIST,
            SdpValue::seq([SdpValue::seq([
                Uuid16(service_class::HUMAN_INTERFACE_DEVICE),
                UInt16(0x0100),
            ])]),
        )
        .with(
            attr::ADDITIONAL_PROTOCOL_DESCRIPTOR_LISTS,
            SdpValue::seq([SdpValue::seq([
                l2cap_psm(protocol::PSM_HID_INTERRUPT),
                hidp(),
            ])]),
        )
        .with(
            language.base + attr::SERVICE_NAME_OFFSET,
            SdpValue::text(&info.service_name),
        )
        .with(
            language.base + attr::SERVICE_DESCRIPTION_OFFSET,
            SdpValue::text(&info.service_description),
        )
        .with(
            language.base + attr::PROVIDER_NAME_OFFSET,
            SdpValue::text(&info.provider),
        )
        // Deprecated, release 1.0
        .with(attr::HID_DEVICE_RELEASE_NUMBER, UInt16(0x0100))
        .with(attr::HID_PROFILE_VERSION, UInt16(0x0111))
        .with(attr::HID_DEVICE_SUBCLASS, UInt8(info.subclass))
        .with(attr::HID_COUNTRY_CODE, UInt8(0x00))
        .with(attr::HID_VIRTUAL_CABLE, Bool(info.virtual_cable))
        .with(attr::HID_RECONNECT_INITIATE, Bool(info.reconnect_initiate))
        .with(
            attr::HID_DESCRIPTOR_LIST,
            SdpValue::seq([SdpValue::seq([
                UInt8(DESCRIPTOR_TYPE_REPORT),
                SdpValue::encoded_text(descriptor.hex(), "hex"),
            ])]),
        )
        .with(
            attr::HID_LANGID_BASE_LIST,
            SdpValue::seq([SdpValue::seq([
                UInt16(LANGID_EN_US),
                UInt16(PRIMARY_LANGUAGE_BASE),
            ])]),
        )
        .with(attr::HID_PARSER_VERSION, UInt16(0x0100))
        // 3200 slots = 2 s
        .with(attr::HID_SUPERVISION_TIMEOUT, UInt16(0x0C80))
        .with(attr::HID_NORMALLY_CONNECTABLE, Bool(info.normally_connectable))
        .with(attr::HID_BOOT_DEVICE, Bool(info.boot_device))
        .with(attr::HID_SSR_HOST_MAX_LATENCY, UInt16(0x0640))
        .with(attr::HID_SSR_HOST_MIN_TIMEOUT, UInt16(0x0320));

    Ok(record)
}
