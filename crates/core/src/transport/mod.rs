//! Network transport layer for RTSP signaling and RTP media delivery.
//!
//! RTSP uses a split transport model:
//!
//! - **TCP** ([`tcp`]): carries RTSP request/response signaling. One TCP
//!   connection per client, with a thread per connection.
//!
//! - **RTP transports** ([`RtpTransport`]): carry media for one session.
//!   - [`udp::UdpPairTransport`]: a dedicated even/odd socket pair, one
//!     receive thread per socket.
//!   - [`interleaved::InterleavedTransport`]: `$`-framed packets on the
//!     RTSP TCP connection itself (RFC 2326 §10.12).
//!
//! Multicast is negotiated at the protocol layer but has no transport here;
//! SETUP answers it with 461.
//!
//! Inbound packets (client RTCP receiver reports) are not pushed through
//! callbacks. Each transport owns a bounded [`Inbox`] that the session
//! manager drains on its own schedule.

pub mod interleaved;
pub mod tcp;
pub mod udp;

use std::io::Write;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

use parking_lot::Mutex;

use crate::error::Result;

pub use interleaved::InterleavedTransport;
pub use udp::UdpPairTransport;

/// Write half of an RTSP control connection.
///
/// Shared between the response writer and any interleaved transport so
/// RTSP text and `$` frames never interleave mid-message.
pub type ConnectionWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Inbound packets buffered per transport before the oldest are dropped.
const INBOX_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Udp,
    Interleaved,
}

/// RTP (data) or RTCP (control) half of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubChannel {
    Data,
    Control,
}

/// One inbound packet from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedPacket {
    pub sub_channel: SubChannel,
    /// Local UDP port or interleaved channel id it arrived on.
    pub channel: u16,
    pub payload: Vec<u8>,
}

/// Media transport bound to one session stream.
///
/// Implementations are shared between the session arena and their own
/// receive threads, so every method takes `&self`.
pub trait RtpTransport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Begin receiving. Calling it twice is an error.
    fn start(&self) -> Result<()>;

    /// Stop receiving and refuse further writes. Idempotent.
    fn stop(&self);

    /// Send one RTP packet.
    fn write_data(&self, packet: &[u8]) -> Result<()>;

    /// Send one RTCP packet.
    fn write_control(&self, packet: &[u8]) -> Result<()>;

    /// Next buffered inbound packet, if any.
    fn try_recv(&self) -> Option<ReceivedPacket>;

    /// Offer a `$` frame read from the control connection. Returns `true`
    /// if the channel belongs to this transport.
    fn deliver_interleaved(&self, _channel: u8, _payload: &[u8]) -> bool {
        false
    }
}

/// Bounded single-consumer queue of inbound packets.
///
/// Producers never block: when the queue is full the packet is dropped.
pub(crate) struct Inbox {
    tx: SyncSender<ReceivedPacket>,
    rx: Mutex<Receiver<ReceivedPacket>>,
}

impl Inbox {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::sync_channel(INBOX_CAPACITY);
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    pub(crate) fn sender(&self) -> SyncSender<ReceivedPacket> {
        self.tx.clone()
    }

    pub(crate) fn try_recv(&self) -> Option<ReceivedPacket> {
        self.rx.lock().try_recv().ok()
    }
}

/// Queue a packet, dropping it when the consumer has fallen behind.
pub(crate) fn offer(tx: &SyncSender<ReceivedPacket>, packet: ReceivedPacket) {
    match tx.try_send(packet) {
        Ok(()) => {}
        Err(TrySendError::Full(p)) => {
            tracing::trace!(channel = p.channel, "inbox full, dropping packet");
        }
        Err(TrySendError::Disconnected(_)) => {}
    }
}
