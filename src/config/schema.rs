use serde::{Deserialize, Serialize};

use crate::bluetooth::device_class::peripheral_class;
use crate::controller::{PollerConfig, SendMode};
use crate::hid::{Axis, GamepadKind};
use crate::sdp::{subclass_for, HidServiceInfo};

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Adapter and advertised identity
    pub device: DeviceConfig,
    /// Report layout of the emulated gamepad
    pub layout: LayoutConfig,
    /// HID flags of the service record
    pub sdp: SdpConfig,
    /// Polling loop
    pub poll: PollConfig,
    /// Startup pairing state
    pub pairing: PairingConfig,
}

/// Adapter and advertised identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Adapter alias seen by hosts
    pub name: String,
    /// Class of Device; derived from the layout kind when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<u32>,
    /// Local adapter, e.g. "hci0"
    pub adapter: String,
    pub service_name: String,
    pub service_description: String,
    pub provider: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "gcc-bt-joystick".to_string(),
            class: None,
            adapter: "hci0".to_string(),
            service_name: "A Virtual Gamepad Controller".to_string(),
            service_description: "Keyboard > BT Gamepad".to_string(),
            provider: "GCC".to_string(),
        }
    }
}

/// Report layout of the built-in controller sources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub kind: GamepadKind,
    pub buttons: usize,
    pub axes: Vec<Axis>,
    pub hat_switch: bool,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            kind: GamepadKind::Gamepad,
            buttons: 14,
            axes: vec![Axis::X, Axis::Y, Axis::Rx, Axis::Ry],
            hat_switch: false,
        }
    }
}

/// HID profile flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdpConfig {
    pub virtual_cable: bool,
    pub reconnect_initiate: bool,
    pub normally_connectable: bool,
    pub boot_device: bool,
}

impl Default for SdpConfig {
    fn default() -> Self {
        Self {
            virtual_cable: false,
            reconnect_initiate: false,
            normally_connectable: true,
            boot_device: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Polls per second
    pub rate_hz: u32,
    pub send_mode: SendMode,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            rate_hz: 10,
            send_mode: SendMode::OnChange,
        }
    }
}

impl PollConfig {
    pub fn poller(&self) -> PollerConfig {
        PollerConfig {
            rate_hz: self.rate_hz,
            send_mode: self.send_mode,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    /// Accept pairing requests from startup
    pub pairable: bool,
    /// Discoverable from startup
    pub discoverable: bool,
    /// Length of the window opened by SIGUSR1
    pub window_secs: u64,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            pairable: false,
            discoverable: false,
            window_secs: 60,
        }
    }
}

impl AppConfig {
    /// Configured Class of Device, or the peripheral class matching the
    /// HID subclass of the layout kind
    pub fn device_class(&self) -> u32 {
        self.device
            .class
            .unwrap_or_else(|| peripheral_class(subclass_for(self.layout.kind)))
    }

    /// Service record text and flags for a layout kind
    pub fn service_info(&self) -> HidServiceInfo {
        HidServiceInfo {
            service_name: self.device.service_name.clone(),
            service_description: self.device.service_description.clone(),
            provider: self.device.provider.clone(),
            subclass: subclass_for(self.layout.kind),
            virtual_cable: self.sdp.virtual_cable,
            reconnect_initiate: self.sdp.reconnect_initiate,
            normally_connectable: self.sdp.normally_connectable,
            boot_device: self.sdp.boot_device,
        }
    }
}
