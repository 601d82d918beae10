//! Bluetooth side of the gamepad
//!
//! Everything that talks to BlueZ or the kernel lives behind three
//! collaborator traits and the channel transport, so the session and the
//! pairing agent can be driven without a radio:
//!
//! - [`AdapterControl`]: name, class, discoverable/pairable of the adapter
//! - [`BluetoothDaemon`]: profile and agent registration
//! - [`DeviceTrust`]: marking a paired device trusted
//! - [`transport::ChannelTransport`]: the two L2CAP channels

pub mod agent;
pub mod bluez;
pub mod device_class;
pub mod l2cap;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

pub use crate::sdp::hid_record::protocol::{PSM_HID_CONTROL, PSM_HID_INTERRUPT};
pub use agent::{AgentError, PairingAgent, PairingControls};
pub use bluez::Bluez;
pub use session::{DeviceSession, SessionBackends, SessionConfig, SessionState};
pub use transport::{ChannelListener, ChannelTransport, L2capTransport, ReportChannel};

/// HID service class UUID registered with the profile manager
pub const HID_SERVICE_UUID: &str = "00001124-0000-1000-8000-00805f9b34fb";

/// Object path of the exported Profile1 object
pub const PROFILE_PATH: &str = "/bluez/gcc/gcc_joy_profile";

/// Object path of the exported Agent1 object
pub const AGENT_PATH: &str = "/org/gcc/btservice";

/// IO capability announced to the agent manager
pub const AGENT_CAPABILITY: &str = "NoInputNoOutput";

/// Options passed to `ProfileManager1.RegisterProfile`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRegistration {
    pub path: String,
    pub uuid: String,
    pub service_record: String,
    pub role: String,
    pub require_authentication: bool,
    pub require_authorization: bool,
}

impl ProfileRegistration {
    /// HID server profile carrying a service record
    pub fn hid_server(service_record: String) -> Self {
        Self {
            path: PROFILE_PATH.to_string(),
            uuid: HID_SERVICE_UUID.to_string(),
            service_record,
            role: "server".to_string(),
            require_authentication: false,
            require_authorization: false,
        }
    }
}

/// Local adapter configuration
#[async_trait]
pub trait AdapterControl: Send + Sync {
    /// Power the adapter and set its alias and Class of Device
    async fn bring_up(&self, name: &str, class: u32) -> Result<()>;

    async fn set_discoverable(&self, discoverable: bool) -> Result<()>;

    async fn set_pairable(&self, pairable: bool) -> Result<()>;
}

/// Profile and agent registration with the Bluetooth daemon
#[async_trait]
pub trait BluetoothDaemon: Send + Sync {
    async fn register_profile(&self, profile: &ProfileRegistration) -> Result<()>;

    async fn unregister_profile(&self, path: &str) -> Result<()>;

    /// Export `agent` at `path`, register it and make it the default agent
    async fn register_agent(
        &self,
        path: &str,
        capability: &str,
        agent: Arc<PairingAgent>,
    ) -> Result<()>;

    async fn unregister_agent(&self, path: &str) -> Result<()>;
}

/// Per-device trust
#[async_trait]
pub trait DeviceTrust: Send + Sync {
    /// `device` is the daemon's object path for the remote device
    async fn set_trusted(&self, device: &str, trusted: bool) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdp::{build_hid_record, HidServiceInfo, SdpValue};
    use crate::hid::{ReportDescriptor, ReportLayout};

    #[test]
    fn test_record_psms_match_sockets() {
        let desc = ReportDescriptor::for_layout(&ReportLayout::default()).unwrap();
        let record = build_hid_record(&HidServiceInfo::default(), &desc).unwrap();

        let control = SdpValue::seq([
            SdpValue::seq([SdpValue::Uuid16(0x0100), SdpValue::UInt16(PSM_HID_CONTROL)]),
            SdpValue::seq([SdpValue::Uuid16(0x0011)]),
        ]);
        assert_eq!(record.get(0x0004), Some(&control));

        let interrupt = SdpValue::seq([SdpValue::seq([
            SdpValue::seq([SdpValue::Uuid16(0x0100), SdpValue::UInt16(PSM_HID_INTERRUPT)]),
            SdpValue::seq([SdpValue::Uuid16(0x0011)]),
        ])]);
        assert_eq!(record.get(0x000D), Some(&interrupt));
    }

    #[test]
    fn test_hid_server_profile() {
        let profile = ProfileRegistration::hid_server("<record />".to_string());
        assert_eq!(profile.uuid, HID_SERVICE_UUID);
        assert!(profile.uuid.starts_with("00001124"));
        assert_eq!(profile.role, "server");
        assert!(!profile.require_authentication);
        assert!(!profile.require_authorization);
    }
}
