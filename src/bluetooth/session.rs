//! Device session state machine
//!
//! ```text
//! Idle -> Advertising -> Listening -> Connected
//!                          ^              |
//!                          |              v
//!                          +------- Disconnected -> Idle (close)
//! ```
//!
//! The session owns the two channel listeners and connections. Reports go
//! out only while both the control and the interrupt channel are
//! accepted; a failed send drops both and re-binds.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use super::agent::{PairingAgent, PairingControls};
use super::transport::{ChannelListener, ChannelTransport, ReportChannel};
use super::{
    AdapterControl, BluetoothDaemon, DeviceTrust, ProfileRegistration, AGENT_CAPABILITY,
    AGENT_PATH, PROFILE_PATH, PSM_HID_CONTROL, PSM_HID_INTERRUPT,
};
use crate::error::{AppError, Result};
use crate::events::{EventBus, SystemEvent};
use crate::hid::{ReportDescriptor, ReportLayout};
use crate::sdp::{build_hid_record, HidServiceInfo, SdpRecord};
use crate::utils::LogThrottler;
use crate::warn_throttled;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Nothing registered
    Idle,
    /// Adapter configured, profile and agent registered
    Advertising,
    /// Both PSMs bound, waiting for a host
    Listening,
    /// Control and interrupt channels accepted
    Connected,
    /// Channels dropped after a send failure
    Disconnected,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Advertising => "advertising",
            Self::Listening => "listening",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pending control channel without its interrupt channel is dropped after this
pub const PENDING_CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

/// One of the two HID L2CAP channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Control,
    Interrupt,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Control => "control",
            Self::Interrupt => "interrupt",
        }
    }

    pub fn psm(&self) -> u16 {
        match self {
            Self::Control => PSM_HID_CONTROL,
            Self::Interrupt => PSM_HID_INTERRUPT,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the emulated device
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub device_name: String,
    pub device_class: u32,
    pub layout: ReportLayout,
    pub service: HidServiceInfo,
}

/// External collaborators of a session
#[derive(Clone)]
pub struct SessionBackends {
    pub adapter: Arc<dyn AdapterControl>,
    pub daemon: Arc<dyn BluetoothDaemon>,
    pub trust: Arc<dyn DeviceTrust>,
    pub transport: Arc<dyn ChannelTransport>,
}

struct Listeners {
    control: Box<dyn ChannelListener>,
    interrupt: Box<dyn ChannelListener>,
}

/// One emulated HID device
pub struct DeviceSession {
    config: SessionConfig,
    descriptor: ReportDescriptor,
    record: Option<SdpRecord>,
    backends: SessionBackends,
    controls: PairingControls,
    agent: Arc<PairingAgent>,
    events: Arc<EventBus>,
    state: SessionState,
    listeners: Option<Listeners>,
    control: Option<Box<dyn ReportChannel>>,
    /// When the pending control channel was accepted
    control_since: Option<Instant>,
    interrupt: Option<Box<dyn ReportChannel>>,
    throttler: LogThrottler,
}

impl DeviceSession {
    /// Build the descriptor for the layout; nothing is registered yet
    pub fn new(
        config: SessionConfig,
        backends: SessionBackends,
        events: Arc<EventBus>,
    ) -> Result<Self> {
        let descriptor = ReportDescriptor::for_layout(&config.layout)?;
        let controls = PairingControls::new(backends.adapter.clone(), events.clone());
        let agent = Arc::new(PairingAgent::new(
            controls.pairable_flag(),
            backends.trust.clone(),
            events.clone(),
        ));

        Ok(Self {
            config,
            descriptor,
            record: None,
            backends,
            controls,
            agent,
            events,
            state: SessionState::Idle,
            listeners: None,
            control: None,
            control_since: None,
            interrupt: None,
            throttler: LogThrottler::default(),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn layout(&self) -> &ReportLayout {
        &self.config.layout
    }

    pub fn descriptor(&self) -> &ReportDescriptor {
        &self.descriptor
    }

    /// Record registered by [`open`](Self::open)
    pub fn record(&self) -> Option<&SdpRecord> {
        self.record.as_ref()
    }

    /// Discoverable/pairable toggles, shareable with other tasks
    pub fn controls(&self) -> &PairingControls {
        &self.controls
    }

    pub fn agent(&self) -> &Arc<PairingAgent> {
        &self.agent
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!("Session {} -> {}", self.state, state);
            self.state = state;
            self.events
                .publish(SystemEvent::SessionStateChanged { state });
        }
    }

    /// Idle -> Advertising
    ///
    /// Configures the adapter, registers the profile and the agent. Any
    /// failure here is fatal and returned as is.
    pub async fn open(&mut self) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(AppError::Internal(format!(
                "session already open ({})",
                self.state
            )));
        }

        self.backends
            .adapter
            .bring_up(&self.config.device_name, self.config.device_class)
            .await?;
        self.controls.set_discoverable(false).await?;
        self.controls.set_pairable(false).await?;

        let record = build_hid_record(&self.config.service, &self.descriptor)?;
        self.backends
            .daemon
            .register_profile(&ProfileRegistration::hid_server(record.xml()))
            .await?;
        self.record = Some(record);

        if let Err(e) = self
            .backends
            .daemon
            .register_agent(AGENT_PATH, AGENT_CAPABILITY, self.agent.clone())
            .await
        {
            if let Err(cleanup) = self.backends.daemon.unregister_profile(PROFILE_PATH).await {
                warn!("Failed to unregister profile: {}", cleanup);
            }
            self.record = None;
            return Err(e);
        }

        info!(
            "Session open as '{}' ({} byte descriptor)",
            self.config.device_name,
            self.descriptor.len()
        );
        self.set_state(SessionState::Advertising);
        Ok(())
    }

    /// Bind both PSMs: Advertising | Disconnected -> Listening
    pub async fn listen(&mut self) -> Result<()> {
        match self.state {
            SessionState::Advertising | SessionState::Disconnected => {}
            SessionState::Listening => return Ok(()),
            other => {
                return Err(AppError::Internal(format!("cannot listen while {}", other)));
            }
        }

        let transport = &self.backends.transport;
        let control = transport
            .listen(Channel::Control.psm())
            .await
            .map_err(|e| AppError::channel_io(Channel::Control.as_str(), "bind", e))?;
        let interrupt = transport
            .listen(Channel::Interrupt.psm())
            .await
            .map_err(|e| AppError::channel_io(Channel::Interrupt.as_str(), "bind", e))?;

        self.listeners = Some(Listeners { control, interrupt });
        info!(
            "Listening on PSM {} (control) and {} (interrupt)",
            PSM_HID_CONTROL, PSM_HID_INTERRUPT
        );
        self.set_state(SessionState::Listening);
        Ok(())
    }

    /// Try to complete the connection within `timeout`
    ///
    /// Accepts the control channel, then the interrupt channel. An accepted
    /// control channel is kept across calls while the interrupt channel is
    /// still missing, for at most [`PENDING_CONTROL_TIMEOUT`]. Both channels
    /// must come from the same peer. Returns `Ok(true)` once both are up.
    pub async fn poll_accept(&mut self, timeout: Duration) -> Result<bool> {
        match self.state {
            SessionState::Connected => return Ok(true),
            SessionState::Idle => {
                return Err(AppError::Internal("session not open".to_string()));
            }
            SessionState::Advertising | SessionState::Disconnected => self.listen().await?,
            SessionState::Listening => {}
        }

        let deadline = Instant::now() + timeout;

        let stale = self
            .control_since
            .is_some_and(|since| since.elapsed() >= PENDING_CONTROL_TIMEOUT);
        if stale {
            if let Some(control) = self.control.as_ref() {
                warn!(
                    "No interrupt channel from {} after {:?}, dropping control channel",
                    control.peer(),
                    PENDING_CONTROL_TIMEOUT
                );
            }
            self.drop_channels();
        }

        if self.control.is_none() {
            match self.accept_one(Channel::Control, deadline).await {
                Ok(Some(channel)) => {
                    self.control = Some(channel);
                    self.control_since = Some(Instant::now());
                }
                Ok(None) => return Ok(false),
                Err(e) => {
                    self.teardown();
                    self.set_state(SessionState::Disconnected);
                    return Err(e);
                }
            }
        }

        let interrupt = match self.accept_one(Channel::Interrupt, deadline).await {
            Ok(Some(channel)) => channel,
            Ok(None) => {
                debug!("Control channel up, waiting for interrupt channel");
                return Ok(false);
            }
            Err(e) => {
                self.teardown();
                self.set_state(SessionState::Disconnected);
                return Err(e);
            }
        };

        let control_peer = self.control.as_ref().map(|c| c.peer()).unwrap_or_default();
        let interrupt_peer = interrupt.peer();
        if control_peer != interrupt_peer {
            warn!(
                "Interrupt channel from {} does not match control channel from {}, dropping both",
                interrupt_peer, control_peer
            );
            self.drop_channels();
            return Ok(false);
        }

        self.interrupt = Some(interrupt);
        self.control_since = None;
        self.throttler.clear_all();
        info!("Host {} connected", control_peer);
        self.set_state(SessionState::Connected);
        Ok(true)
    }

    async fn accept_one(
        &self,
        channel: Channel,
        deadline: Instant,
    ) -> Result<Option<Box<dyn ReportChannel>>> {
        let Some(listeners) = self.listeners.as_ref() else {
            return Err(AppError::Internal("not listening".to_string()));
        };
        let listener = match channel {
            Channel::Control => &listeners.control,
            Channel::Interrupt => &listeners.interrupt,
        };

        match tokio::time::timeout_at(deadline, listener.accept()).await {
            Err(_elapsed) => Ok(None),
            Ok(Ok(conn)) => {
                let peer = conn.peer();
                info!("Accepted {} channel from {}", channel, peer);
                self.events.publish(SystemEvent::ChannelAccepted {
                    channel: channel.as_str().to_string(),
                    peer,
                });
                Ok(Some(conn))
            }
            Ok(Err(e)) => Err(AppError::channel_io(channel.as_str(), "accept", e)),
        }
    }

    /// Send one input report on the interrupt channel
    ///
    /// On failure both channels are dropped and the PSMs re-bound, so the
    /// session is back to Listening (or Disconnected when re-binding also
    /// failed). The send is not retried.
    pub async fn send_report(&mut self, report: &[u8]) -> Result<()> {
        if self.state != SessionState::Connected {
            return Err(AppError::Channel {
                channel: Channel::Interrupt.as_str().to_string(),
                reason: format!("not connected ({})", self.state),
                error_code: "enotconn".to_string(),
            });
        }
        let Some(interrupt) = self.interrupt.as_ref() else {
            return Err(AppError::Internal("connected without interrupt channel".to_string()));
        };

        let error = match interrupt.send(report).await {
            Ok(n) if n == report.len() => {
                trace!("Sent report {:02X?}", report);
                return Ok(());
            }
            Ok(n) => AppError::Channel {
                channel: Channel::Interrupt.as_str().to_string(),
                reason: format!("short write {} of {} bytes", n, report.len()),
                error_code: "short_write".to_string(),
            },
            Err(e) => AppError::channel_io(Channel::Interrupt.as_str(), "send", e),
        };

        warn!("Report channel lost: {}", error);
        self.events.publish(SystemEvent::ReportChannelLost {
            reason: error.to_string(),
        });
        self.teardown();
        self.set_state(SessionState::Disconnected);

        if let Err(e) = self.listen().await {
            warn_throttled!(self.throttler, "relisten", "Re-listen failed: {}", e);
        }
        Err(error)
    }

    /// Drop connected channels, keep the listeners
    fn drop_channels(&mut self) {
        self.interrupt = None;
        self.control = None;
        self.control_since = None;
    }

    fn teardown(&mut self) {
        self.drop_channels();
        self.listeners = None;
    }

    /// Drop channels, deregister agent and profile: any state -> Idle
    ///
    /// Cleanup keeps going past individual failures.
    pub async fn close(&mut self) {
        if self.state == SessionState::Idle {
            return;
        }

        self.teardown();

        if let Err(e) = self.controls.set_discoverable(false).await {
            warn!("Failed to clear discoverable: {}", e);
        }
        if let Err(e) = self.controls.set_pairable(false).await {
            warn!("Failed to clear pairable: {}", e);
        }
        if let Err(e) = self.backends.daemon.unregister_agent(AGENT_PATH).await {
            warn!("Failed to unregister agent: {}", e);
        }
        if let Err(e) = self.backends.daemon.unregister_profile(PROFILE_PATH).await {
            warn!("Failed to unregister profile: {}", e);
        }

        self.record = None;
        info!("Session closed");
        self.set_state(SessionState::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::testing::{backends, FakeChannel, Mocks};
    use crate::hid::{pack_input_report, ControllerSnapshot};

    const TICK: Duration = Duration::from_millis(20);

    fn session(mocks: &Mocks) -> DeviceSession {
        let config = SessionConfig {
            device_name: "test-pad".to_string(),
            device_class: 0x002508,
            layout: ReportLayout::default(),
            service: HidServiceInfo::default(),
        };
        DeviceSession::new(config, backends(mocks), Arc::new(EventBus::new())).unwrap()
    }

    async fn connected(mocks: &Mocks) -> (DeviceSession, FakeChannel) {
        let mut s = session(mocks);
        s.open().await.unwrap();
        mocks.transport.queue(PSM_HID_CONTROL, FakeChannel::new("AA:BB:CC:DD:EE:FF"));
        let interrupt = FakeChannel::new("AA:BB:CC:DD:EE:FF");
        mocks.transport.queue(PSM_HID_INTERRUPT, interrupt.clone());
        assert!(s.poll_accept(TICK).await.unwrap());
        (s, interrupt)
    }

    #[tokio::test]
    async fn test_open_registers_and_fails_closed() {
        let mocks = Mocks::default();
        let mut s = session(&mocks);
        s.open().await.unwrap();

        assert_eq!(s.state(), SessionState::Advertising);
        assert_eq!(mocks.adapter.brought_up(), vec![("test-pad".to_string(), 0x002508)]);
        assert_eq!(mocks.adapter.discoverable_calls(), vec![false]);
        assert_eq!(mocks.adapter.pairable_calls(), vec![false]);

        let profile = mocks.daemon.profile().unwrap();
        assert_eq!(profile.uuid, "00001124-0000-1000-8000-00805f9b34fb");
        assert_eq!(profile.path, PROFILE_PATH);
        assert!(profile.service_record.contains(&s.descriptor().hex()));
        assert_eq!(
            mocks.daemon.agents(),
            vec![(AGENT_PATH.to_string(), "NoInputNoOutput".to_string())]
        );
        assert!(s.record().is_some());
    }

    #[tokio::test]
    async fn test_registration_failure_is_fatal() {
        let mocks = Mocks::default();
        mocks.daemon.fail_profile();
        let mut s = session(&mocks);

        assert!(s.open().await.is_err());
        assert_eq!(s.state(), SessionState::Idle);
        assert!(mocks.daemon.agents().is_empty());
    }

    #[tokio::test]
    async fn test_agent_failure_unregisters_profile() {
        let mocks = Mocks::default();
        mocks.daemon.fail_agent();
        let mut s = session(&mocks);

        assert!(s.open().await.is_err());
        assert_eq!(s.state(), SessionState::Idle);
        assert!(mocks.daemon.profile().is_none());
        assert!(s.record().is_none());
    }

    #[tokio::test]
    async fn test_accept_timeout_is_not_an_error() {
        let mocks = Mocks::default();
        let mut s = session(&mocks);
        s.open().await.unwrap();

        assert!(!s.poll_accept(TICK).await.unwrap());
        assert_eq!(s.state(), SessionState::Listening);
        assert_eq!(mocks.transport.bound(), vec![PSM_HID_CONTROL, PSM_HID_INTERRUPT]);
    }

    #[tokio::test]
    async fn test_never_connected_with_one_channel() {
        let mocks = Mocks::default();
        let mut s = session(&mocks);
        s.open().await.unwrap();

        mocks.transport.queue(PSM_HID_CONTROL, FakeChannel::new("AA:BB:CC:DD:EE:FF"));
        assert!(!s.poll_accept(TICK).await.unwrap());
        assert_eq!(s.state(), SessionState::Listening);
        assert!(s.send_report(&[0xA1, 0x01]).await.is_err());

        // Control channel is kept; the interrupt channel completes the pair
        mocks.transport.queue(PSM_HID_INTERRUPT, FakeChannel::new("AA:BB:CC:DD:EE:FF"));
        assert!(s.poll_accept(TICK).await.unwrap());
        assert_eq!(s.state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn test_channels_from_different_hosts_not_paired() {
        let mocks = Mocks::default();
        let mut s = session(&mocks);
        s.open().await.unwrap();

        // Host A opens control only, host B then opens both
        mocks.transport.queue(PSM_HID_CONTROL, FakeChannel::new("AA:AA:AA:AA:AA:AA"));
        assert!(!s.poll_accept(TICK).await.unwrap());
        mocks.transport.queue(PSM_HID_CONTROL, FakeChannel::new("BB:BB:BB:BB:BB:BB"));
        mocks.transport.queue(PSM_HID_INTERRUPT, FakeChannel::new("BB:BB:BB:BB:BB:BB"));

        assert!(!s.poll_accept(TICK).await.unwrap());
        assert!(!s.is_connected());
        assert_eq!(s.state(), SessionState::Listening);

        // B retries its interrupt channel and pairs with its own control channel
        let interrupt = FakeChannel::new("BB:BB:BB:BB:BB:BB");
        mocks.transport.queue(PSM_HID_INTERRUPT, interrupt.clone());
        assert!(s.poll_accept(TICK).await.unwrap());
        s.send_report(&[0xA1, 0x01]).await.unwrap();
        assert_eq!(interrupt.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_control_channel_expires() {
        let mocks = Mocks::default();
        let mut s = session(&mocks);
        s.open().await.unwrap();

        mocks.transport.queue(PSM_HID_CONTROL, FakeChannel::new("AA:AA:AA:AA:AA:AA"));
        assert!(!s.poll_accept(TICK).await.unwrap());

        tokio::time::advance(PENDING_CONTROL_TIMEOUT).await;

        mocks.transport.queue(PSM_HID_CONTROL, FakeChannel::new("BB:BB:BB:BB:BB:BB"));
        mocks.transport.queue(PSM_HID_INTERRUPT, FakeChannel::new("BB:BB:BB:BB:BB:BB"));
        assert!(s.poll_accept(TICK).await.unwrap());
        assert!(s.is_connected());
    }

    #[test]
    fn test_channel_names_and_psms() {
        assert_eq!(Channel::Control.as_str(), "control");
        assert_eq!(Channel::Interrupt.to_string(), "interrupt");
        assert_eq!(Channel::Control.psm(), 17);
        assert_eq!(Channel::Interrupt.psm(), 19);
    }

    #[tokio::test]
    async fn test_interrupt_alone_does_not_connect() {
        let mocks = Mocks::default();
        let mut s = session(&mocks);
        s.open().await.unwrap();

        mocks.transport.queue(PSM_HID_INTERRUPT, FakeChannel::new("AA:BB:CC:DD:EE:FF"));
        assert!(!s.poll_accept(TICK).await.unwrap());
        assert!(!s.is_connected());
    }

    #[tokio::test]
    async fn test_send_report() {
        let mocks = Mocks::default();
        let (mut s, interrupt) = connected(&mocks).await;

        let layout = s.layout().clone();
        let report = pack_input_report(&layout, &ControllerSnapshot::rest(&layout));
        s.send_report(&report).await.unwrap();
        assert_eq!(interrupt.sent(), vec![report]);
    }

    #[tokio::test]
    async fn test_send_failure_relistens() {
        let mocks = Mocks::default();
        let (mut s, interrupt) = connected(&mocks).await;
        let events = s.events.clone();
        let mut rx = events.subscribe();

        interrupt.fail_with(libc::EPIPE);
        let err = s.send_report(&[0xA1, 0x01, 0, 0]).await.unwrap_err();
        assert!(matches!(err, AppError::Channel { ref error_code, .. } if error_code == "epipe"));

        assert_eq!(s.state(), SessionState::Listening);
        assert!(!s.is_connected());
        // Both PSMs bound twice: initial listen and the re-listen
        assert_eq!(mocks.transport.bound().len(), 4);

        let mut saw_lost = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, SystemEvent::ReportChannelLost { .. }) {
                saw_lost = true;
            }
        }
        assert!(saw_lost);

        // A new host connects again
        mocks.transport.queue(PSM_HID_CONTROL, FakeChannel::new("11:22:33:44:55:66"));
        mocks.transport.queue(PSM_HID_INTERRUPT, FakeChannel::new("11:22:33:44:55:66"));
        assert!(s.poll_accept(TICK).await.unwrap());
    }

    #[tokio::test]
    async fn test_relisten_failure_leaves_disconnected() {
        let mocks = Mocks::default();
        let (mut s, interrupt) = connected(&mocks).await;

        interrupt.fail_with(libc::ECONNRESET);
        mocks.transport.fail_next_listen();
        assert!(s.send_report(&[0xA1]).await.is_err());
        assert_eq!(s.state(), SessionState::Disconnected);

        // Next poll re-binds
        assert!(!s.poll_accept(TICK).await.unwrap());
        assert_eq!(s.state(), SessionState::Listening);
    }

    #[tokio::test]
    async fn test_close_deregisters() {
        let mocks = Mocks::default();
        let (mut s, _interrupt) = connected(&mocks).await;
        s.controls().set_pairable(true).await.unwrap();

        s.close().await;
        assert_eq!(s.state(), SessionState::Idle);
        assert!(!s.controls().is_pairable());
        assert!(mocks.daemon.agents().is_empty());
        assert!(mocks.daemon.profile().is_none());
        assert!(s.record().is_none());
    }

    #[tokio::test]
    async fn test_open_twice_rejected() {
        let mocks = Mocks::default();
        let mut s = session(&mocks);
        s.open().await.unwrap();
        assert!(s.open().await.is_err());
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(
            serde_json::to_string(&SessionState::Disconnected).unwrap(),
            "\"disconnected\""
        );
        assert_eq!(SessionState::Connected.to_string(), "connected");
    }
}
