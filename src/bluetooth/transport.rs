//! Report channel abstraction
//!
//! The session only needs "bind a PSM", "accept a peer" and "send one
//! message". Production uses [`super::l2cap`]; tests swap in in-memory
//! channels.

use std::io;

use async_trait::async_trait;

use super::l2cap::{L2capListener, L2capStream};

/// Binds listeners on L2CAP PSMs
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn listen(&self, psm: u16) -> io::Result<Box<dyn ChannelListener>>;
}

/// Bound, listening channel
#[async_trait]
pub trait ChannelListener: Send + Sync {
    /// Wait for the next peer
    ///
    /// Must be cancel safe: the session drops this future on timeout.
    async fn accept(&self) -> io::Result<Box<dyn ReportChannel>>;

    fn psm(&self) -> u16;
}

/// Connected channel carrying one HIDP message per write
#[async_trait]
pub trait ReportChannel: Send + Sync {
    /// Peer Bluetooth address
    fn peer(&self) -> String;

    /// Send one message, returning the number of bytes written
    async fn send(&self, data: &[u8]) -> io::Result<usize>;
}

/// L2CAP seqpacket transport on the local adapter
#[derive(Debug, Default, Clone, Copy)]
pub struct L2capTransport;

#[async_trait]
impl ChannelTransport for L2capTransport {
    async fn listen(&self, psm: u16) -> io::Result<Box<dyn ChannelListener>> {
        Ok(Box::new(L2capListener::bind(psm)?))
    }
}

#[async_trait]
impl ChannelListener for L2capListener {
    async fn accept(&self) -> io::Result<Box<dyn ReportChannel>> {
        let stream = L2capListener::accept(self).await?;
        Ok(Box::new(stream))
    }

    fn psm(&self) -> u16 {
        L2capListener::psm(self)
    }
}

#[async_trait]
impl ReportChannel for L2capStream {
    fn peer(&self) -> String {
        self.peer_addr().to_string()
    }

    async fn send(&self, data: &[u8]) -> io::Result<usize> {
        L2capStream::send(self, data).await
    }
}
