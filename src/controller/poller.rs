//! Fixed-rate poll and transmit loop
//!
//! Each tick reads the controller, then either works on the connection
//! (bounded accept, at most one period) or sends the packed report when
//! the snapshot changed. The loop is the only writer of session state
//! while it runs.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::ControllerSource;
use crate::bluetooth::DeviceSession;
use crate::error::{AppError, Result};
use crate::hid::{pack_input_report, ControllerSnapshot};
use crate::utils::LogThrottler;
use crate::warn_throttled;

/// When to transmit a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendMode {
    /// Only when the snapshot differs from the last one sent
    #[default]
    OnChange,
    /// Every tick
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub rate_hz: u32,
    pub send_mode: SendMode,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            rate_hz: 10,
            send_mode: SendMode::OnChange,
        }
    }
}

impl PollerConfig {
    /// Tick period, also the accept timeout
    pub fn period(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.rate_hz.max(1)))
    }
}

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Controller read failed; nothing else happened
    ReadFailed,
    /// No host yet (or only the control channel)
    Waiting,
    /// Both channels were accepted during this tick
    Connected,
    /// Snapshot equal to the last one sent
    Unchanged,
    Sent,
    /// Send failed and the session went back to listening
    SendFailed,
}

/// Drives a [`DeviceSession`] from a [`ControllerSource`]
pub struct Poller {
    session: DeviceSession,
    source: Arc<Mutex<Box<dyn ControllerSource>>>,
    config: PollerConfig,
    last_sent: Option<ControllerSnapshot>,
    throttler: LogThrottler,
}

impl Poller {
    /// `session` should already be open
    pub fn new(
        session: DeviceSession,
        source: Box<dyn ControllerSource>,
        config: PollerConfig,
    ) -> Self {
        Self {
            session,
            source: Arc::new(Mutex::new(source)),
            config,
            last_sent: None,
            throttler: LogThrottler::default(),
        }
    }

    pub fn session(&self) -> &DeviceSession {
        &self.session
    }

    pub fn into_session(self) -> DeviceSession {
        self.session
    }

    async fn read_snapshot(&self) -> Result<ControllerSnapshot> {
        let source = self.source.clone();
        let layout = self.session.layout().clone();

        tokio::task::spawn_blocking(move || -> Result<ControllerSnapshot> {
            let mut source = source.lock();
            let axes = source.read_axes()?;
            let buttons = source.read_buttons()?;
            let hat = source.read_hat()?;
            Ok(ControllerSnapshot::capture(&layout, &axes, &buttons, hat))
        })
        .await
        .map_err(|e| AppError::Controller(format!("read task failed: {}", e)))?
    }

    /// Run one poll cycle
    pub async fn tick(&mut self) -> TickOutcome {
        let snapshot = match self.read_snapshot().await {
            Ok(snapshot) => {
                self.throttler.clear("read");
                snapshot
            }
            Err(e) => {
                warn_throttled!(self.throttler, "read", "Controller read failed: {}", e);
                return TickOutcome::ReadFailed;
            }
        };

        if !self.session.is_connected() {
            return match self.session.poll_accept(self.config.period()).await {
                Ok(true) => {
                    self.throttler.clear("accept");
                    // New host: the first report after connecting is always sent
                    self.last_sent = None;
                    TickOutcome::Connected
                }
                Ok(false) => TickOutcome::Waiting,
                Err(e) => {
                    warn_throttled!(self.throttler, "accept", "Accept failed: {}", e);
                    TickOutcome::Waiting
                }
            };
        }

        if self.config.send_mode == SendMode::OnChange
            && self.last_sent.as_ref() == Some(&snapshot)
        {
            return TickOutcome::Unchanged;
        }

        let report = pack_input_report(self.session.layout(), &snapshot);
        match self.session.send_report(&report).await {
            Ok(()) => {
                self.last_sent = Some(snapshot);
                TickOutcome::Sent
            }
            Err(e) => {
                debug!("Report dropped: {}", e);
                self.last_sent = None;
                TickOutcome::SendFailed
            }
        }
    }

    /// Tick at the configured rate until `cancel` fires, then hand the
    /// session back for cleanup
    pub async fn run(mut self, cancel: CancellationToken) -> DeviceSession {
        let mut interval = tokio::time::interval(self.config.period());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Polling at {} Hz ({:?})",
            self.config.rate_hz, self.config.send_mode
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }

        info!("Polling stopped");
        self.session
    }
}
