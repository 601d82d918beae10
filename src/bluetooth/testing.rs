//! In-memory collaborators for session, agent and poller tests

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::agent::PairingAgent;
use super::session::SessionBackends;
use super::transport::{ChannelListener, ChannelTransport, ReportChannel};
use super::{AdapterControl, BluetoothDaemon, DeviceTrust, ProfileRegistration};
use crate::error::{AppError, Result};

#[derive(Default)]
pub struct MockAdapter {
    brought_up: Mutex<Vec<(String, u32)>>,
    discoverable: Mutex<Vec<bool>>,
    pairable: Mutex<Vec<bool>>,
}

impl MockAdapter {
    pub fn brought_up(&self) -> Vec<(String, u32)> {
        self.brought_up.lock().clone()
    }

    pub fn discoverable_calls(&self) -> Vec<bool> {
        self.discoverable.lock().clone()
    }

    pub fn pairable_calls(&self) -> Vec<bool> {
        self.pairable.lock().clone()
    }
}

#[async_trait]
impl AdapterControl for MockAdapter {
    async fn bring_up(&self, name: &str, class: u32) -> Result<()> {
        self.brought_up.lock().push((name.to_string(), class));
        Ok(())
    }

    async fn set_discoverable(&self, discoverable: bool) -> Result<()> {
        self.discoverable.lock().push(discoverable);
        Ok(())
    }

    async fn set_pairable(&self, pairable: bool) -> Result<()> {
        self.pairable.lock().push(pairable);
        Ok(())
    }
}

#[derive(Default)]
pub struct MockDaemon {
    profile: Mutex<Option<ProfileRegistration>>,
    agents: Mutex<Vec<(String, String)>>,
    fail_profile: AtomicBool,
    fail_agent: AtomicBool,
}

impl MockDaemon {
    pub fn profile(&self) -> Option<ProfileRegistration> {
        self.profile.lock().clone()
    }

    pub fn agents(&self) -> Vec<(String, String)> {
        self.agents.lock().clone()
    }

    pub fn fail_profile(&self) {
        self.fail_profile.store(true, Ordering::SeqCst);
    }

    pub fn fail_agent(&self) {
        self.fail_agent.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl BluetoothDaemon for MockDaemon {
    async fn register_profile(&self, profile: &ProfileRegistration) -> Result<()> {
        if self.fail_profile.load(Ordering::SeqCst) {
            return Err(AppError::bluetooth("RegisterProfile", "org.bluez.Error.AlreadyExists"));
        }
        *self.profile.lock() = Some(profile.clone());
        Ok(())
    }

    async fn unregister_profile(&self, _path: &str) -> Result<()> {
        self.profile.lock().take();
        Ok(())
    }

    async fn register_agent(
        &self,
        path: &str,
        capability: &str,
        _agent: Arc<PairingAgent>,
    ) -> Result<()> {
        if self.fail_agent.load(Ordering::SeqCst) {
            return Err(AppError::bluetooth("RequestDefaultAgent", "org.bluez.Error.DoesNotExist"));
        }
        self.agents
            .lock()
            .push((path.to_string(), capability.to_string()));
        Ok(())
    }

    async fn unregister_agent(&self, path: &str) -> Result<()> {
        self.agents.lock().retain(|(p, _)| p != path);
        Ok(())
    }
}

#[derive(Default)]
pub struct MockTrust {
    trusted: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl MockTrust {
    pub fn trusted(&self) -> Vec<String> {
        self.trusted.lock().clone()
    }

    pub fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl DeviceTrust for MockTrust {
    async fn set_trusted(&self, device: &str, trusted: bool) -> Result<()> {
        if self.fail.swap(false, Ordering::SeqCst) {
            return Err(AppError::bluetooth("set Trusted", "org.bluez.Error.Failed"));
        }
        if trusted {
            self.trusted.lock().push(device.to_string());
        }
        Ok(())
    }
}

/// Connected channel recording every message
#[derive(Clone)]
pub struct FakeChannel {
    peer: String,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    fail: Arc<Mutex<Option<i32>>>,
}

impl FakeChannel {
    pub fn new(peer: &str) -> Self {
        Self {
            peer: peer.to_string(),
            sent: Arc::default(),
            fail: Arc::default(),
        }
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    /// Every following send fails with `errno`
    pub fn fail_with(&self, errno: i32) {
        *self.fail.lock() = Some(errno);
    }
}

#[async_trait]
impl ReportChannel for FakeChannel {
    fn peer(&self) -> String {
        self.peer.clone()
    }

    async fn send(&self, data: &[u8]) -> io::Result<usize> {
        if let Some(errno) = *self.fail.lock() {
            return Err(io::Error::from_raw_os_error(errno));
        }
        self.sent.lock().push(data.to_vec());
        Ok(data.len())
    }
}

type Pending = Arc<Mutex<HashMap<u16, VecDeque<FakeChannel>>>>;

/// Transport whose listeners hand out queued [`FakeChannel`]s
#[derive(Default)]
pub struct FakeTransport {
    pending: Pending,
    bound: Mutex<Vec<u16>>,
    fail_listen: AtomicBool,
}

impl FakeTransport {
    /// Make `channel` the next peer accepted on `psm`
    pub fn queue(&self, psm: u16, channel: FakeChannel) {
        self.pending.lock().entry(psm).or_default().push_back(channel);
    }

    /// PSMs bound so far, in order
    pub fn bound(&self) -> Vec<u16> {
        self.bound.lock().clone()
    }

    pub fn fail_next_listen(&self) {
        self.fail_listen.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChannelTransport for FakeTransport {
    async fn listen(&self, psm: u16) -> io::Result<Box<dyn ChannelListener>> {
        if self.fail_listen.swap(false, Ordering::SeqCst) {
            return Err(io::Error::from_raw_os_error(libc::EADDRINUSE));
        }
        self.bound.lock().push(psm);
        Ok(Box::new(FakeListener {
            psm,
            pending: self.pending.clone(),
        }))
    }
}

struct FakeListener {
    psm: u16,
    pending: Pending,
}

#[async_trait]
impl ChannelListener for FakeListener {
    async fn accept(&self) -> io::Result<Box<dyn ReportChannel>> {
        loop {
            let next = self
                .pending
                .lock()
                .get_mut(&self.psm)
                .and_then(|queue| queue.pop_front());
            if let Some(channel) = next {
                return Ok(Box::new(channel));
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    fn psm(&self) -> u16 {
        self.psm
    }
}

/// All fakes, kept so tests can inspect them after handing out the backends
#[derive(Default)]
pub struct Mocks {
    pub adapter: Arc<MockAdapter>,
    pub daemon: Arc<MockDaemon>,
    pub trust: Arc<MockTrust>,
    pub transport: Arc<FakeTransport>,
}

pub fn backends(mocks: &Mocks) -> SessionBackends {
    SessionBackends {
        adapter: mocks.adapter.clone(),
        daemon: mocks.daemon.clone(),
        trust: mocks.trust.clone(),
        transport: mocks.transport.clone(),
    }
}
