//! Pairing agent and discoverable/pairable toggles
//!
//! BlueZ calls the agent on its own schedule. Every handler here answers
//! from an atomic flag and at most one trust call, never waiting on the
//! poll loop.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{AdapterControl, DeviceTrust};
use crate::error::Result;
use crate::events::{EventBus, SystemEvent};

/// Errors returned to the daemon over D-Bus
#[derive(Debug, zbus::DBusError)]
#[zbus(prefix = "org.bluez.Error")]
pub enum AgentError {
    #[zbus(error)]
    ZBus(zbus::Error),
    Rejected(String),
    Canceled(String),
}

/// Answers the daemon's pairing callbacks
pub struct PairingAgent {
    pairable: Arc<AtomicBool>,
    trust: Arc<dyn DeviceTrust>,
    events: Arc<EventBus>,
}

impl PairingAgent {
    pub fn new(
        pairable: Arc<AtomicBool>,
        trust: Arc<dyn DeviceTrust>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            pairable,
            trust,
            events,
        }
    }

    pub fn is_pairable(&self) -> bool {
        self.pairable.load(Ordering::SeqCst)
    }

    /// Accept and trust the device only while pairing is allowed
    pub async fn request_confirmation(
        &self,
        device: &str,
        passkey: u32,
    ) -> std::result::Result<(), AgentError> {
        info!("RequestConfirmation ({}, {:06})", device, passkey);

        if !self.is_pairable() {
            info!("Rejecting pairing with {}: not pairable", device);
            self.publish(device, false);
            return Err(AgentError::Rejected("Try again".to_string()));
        }

        if let Err(e) = self.trust.set_trusted(device, true).await {
            warn!("Failed to trust {}: {}", device, e);
            self.publish(device, false);
            return Err(AgentError::Rejected(format!("Cannot trust device: {}", e)));
        }

        info!("Approved pairing with {}", device);
        self.publish(device, true);
        Ok(())
    }

    pub fn authorize_service(&self, device: &str, uuid: &str) -> std::result::Result<(), AgentError> {
        debug!("AuthorizeService ({}, {})", device, uuid);
        Ok(())
    }

    pub fn request_authorization(&self, device: &str) -> std::result::Result<(), AgentError> {
        debug!("RequestAuthorization ({})", device);
        Ok(())
    }

    /// No input capability, so legacy PIN pairing is refused
    pub fn request_pin_code(&self, device: &str) -> std::result::Result<String, AgentError> {
        debug!("RequestPinCode ({})", device);
        Err(AgentError::Rejected("No input capability".to_string()))
    }

    pub fn request_passkey(&self, device: &str) -> std::result::Result<u32, AgentError> {
        debug!("RequestPasskey ({})", device);
        Err(AgentError::Rejected("No input capability".to_string()))
    }

    pub fn display_passkey(&self, device: &str, passkey: u32, entered: u16) {
        debug!("DisplayPasskey ({}, {:06} entered {})", device, passkey, entered);
    }

    pub fn display_pin_code(&self, device: &str, pincode: &str) {
        debug!("DisplayPinCode ({}, {})", device, pincode);
    }

    pub fn cancel(&self) {
        debug!("Agent request canceled");
    }

    pub fn release(&self) {
        info!("Agent released by the daemon");
    }

    fn publish(&self, device: &str, accepted: bool) {
        self.events.publish(SystemEvent::PairingRequest {
            device: device.to_string(),
            accepted,
        });
    }
}

/// Discoverable/pairable flags, mirrored to the adapter
///
/// Cloning shares the flags.
#[derive(Clone)]
pub struct PairingControls {
    pairable: Arc<AtomicBool>,
    discoverable: Arc<AtomicBool>,
    window: Arc<AtomicU64>,
    adapter: Arc<dyn AdapterControl>,
    events: Arc<EventBus>,
}

impl PairingControls {
    /// Both flags start off
    pub fn new(adapter: Arc<dyn AdapterControl>, events: Arc<EventBus>) -> Self {
        Self {
            pairable: Arc::new(AtomicBool::new(false)),
            discoverable: Arc::new(AtomicBool::new(false)),
            window: Arc::new(AtomicU64::new(0)),
            adapter,
            events,
        }
    }

    /// Flag read by [`PairingAgent`]
    pub fn pairable_flag(&self) -> Arc<AtomicBool> {
        self.pairable.clone()
    }

    pub fn is_pairable(&self) -> bool {
        self.pairable.load(Ordering::SeqCst)
    }

    pub fn is_discoverable(&self) -> bool {
        self.discoverable.load(Ordering::SeqCst)
    }

    pub async fn set_pairable(&self, pairable: bool) -> Result<()> {
        // Close the agent gate before the adapter, open it after
        if !pairable {
            self.pairable.store(false, Ordering::SeqCst);
        }
        self.adapter.set_pairable(pairable).await?;
        self.pairable.store(pairable, Ordering::SeqCst);

        info!("Pairable: {}", pairable);
        self.events.publish(SystemEvent::PairableChanged { pairable });
        Ok(())
    }

    pub async fn set_discoverable(&self, discoverable: bool) -> Result<()> {
        self.adapter.set_discoverable(discoverable).await?;
        self.discoverable.store(discoverable, Ordering::SeqCst);

        info!("Discoverable: {}", discoverable);
        self.events
            .publish(SystemEvent::DiscoverableChanged { discoverable });
        Ok(())
    }

    /// Make the device discoverable and pairable for `duration`
    ///
    /// A window opened while another is running extends it; only the most
    /// recent window closes the flags.
    pub async fn open_window(&self, duration: Duration) -> Result<()> {
        let generation = self.window.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Pairing window open for {}s", duration.as_secs());

        self.set_discoverable(true).await?;
        self.set_pairable(true).await?;

        tokio::time::sleep(duration).await;

        if self.window.load(Ordering::SeqCst) != generation {
            debug!("Pairing window superseded");
            return Ok(());
        }

        info!("Pairing window closed");
        self.set_pairable(false).await?;
        self.set_discoverable(false).await
    }
}
