//! System event types
//!
//! Defines all event types that can be broadcast through the event bus.

use serde::{Deserialize, Serialize};

use crate::bluetooth::SessionState;

/// System event enumeration
///
/// Events serialize as:
/// ```json
/// {
///   "event": "session.state_changed",
///   "data": { "state": "listening" }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum SystemEvent {
    // ============================================================================
    // Session Events
    // ============================================================================
    /// Device session moved to a new state
    #[serde(rename = "session.state_changed")]
    SessionStateChanged { state: SessionState },

    /// A host connected one of the two HID channels
    #[serde(rename = "session.channel_accepted")]
    ChannelAccepted {
        /// "control" or "interrupt"
        channel: String,
        /// Peer address, e.g. "AA:BB:CC:DD:EE:FF"
        peer: String,
    },

    /// Sending on the interrupt channel failed and both channels were dropped
    #[serde(rename = "session.channel_lost")]
    ReportChannelLost { reason: String },

    // ============================================================================
    // Pairing Events
    // ============================================================================
    /// The daemon asked the agent to confirm a pairing
    #[serde(rename = "pairing.request")]
    PairingRequest {
        /// D-Bus object path of the device
        device: String,
        accepted: bool,
    },

    #[serde(rename = "pairing.discoverable_changed")]
    DiscoverableChanged { discoverable: bool },

    #[serde(rename = "pairing.pairable_changed")]
    PairableChanged { pairable: bool },
}

impl SystemEvent {
    /// Get the event name (for logging)
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::SessionStateChanged { .. } => "session.state_changed",
            Self::ChannelAccepted { .. } => "session.channel_accepted",
            Self::ReportChannelLost { .. } => "session.channel_lost",
            Self::PairingRequest { .. } => "pairing.request",
            Self::DiscoverableChanged { .. } => "pairing.discoverable_changed",
            Self::PairableChanged { .. } => "pairing.pairable_changed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_name() {
        let event = SystemEvent::SessionStateChanged {
            state: SessionState::Connected,
        };
        assert_eq!(event.event_name(), "session.state_changed");

        let event = SystemEvent::PairingRequest {
            device: "/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF".to_string(),
            accepted: false,
        };
        assert_eq!(event.event_name(), "pairing.request");
    }

    #[test]
    fn test_serialization() {
        let event = SystemEvent::SessionStateChanged {
            state: SessionState::Listening,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("session.state_changed"));
        assert!(json.contains("listening"));

        let deserialized: SystemEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            deserialized,
            SystemEvent::SessionStateChanged {
                state: SessionState::Listening
            }
        ));
    }
}
