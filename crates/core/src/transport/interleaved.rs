//! Interleaved RTP/RTCP over the RTSP TCP connection (RFC 2326 §10.12).
//!
//! ```text
//! +-----+---------+----------------+------------------+
//! | '$' | channel | length (u16 BE)| payload ...      |
//! +-----+---------+----------------+------------------+
//! ```

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};

use super::{ConnectionWriter, Inbox, ReceivedPacket, RtpTransport, SubChannel, TransportKind};
use crate::error::{Result, RtspError};
use crate::session::transport::ChannelPair;

/// Leading byte of every interleaved frame.
pub const FRAME_MARKER: u8 = b'$';

/// Wrap `payload` in a `$` frame for `channel`.
pub fn encode_frame(channel: u8, payload: &[u8]) -> Result<Vec<u8>> {
    let len = u16::try_from(payload.len()).map_err(|_| RtspError::FrameTooLarge(payload.len()))?;
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.push(FRAME_MARKER);
    frame.push(channel);
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Read one `$` frame, marker included, from `reader`.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<(u8, Vec<u8>)> {
    let mut header = [0u8; 4];
    reader.read_exact(&mut header)?;
    if header[0] != FRAME_MARKER {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "interleaved frame without '$' marker",
        ));
    }
    let len = u16::from_be_bytes([header[2], header[3]]) as usize;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok((header[1], payload))
}

/// RTP transport multiplexed onto the control connection.
///
/// Writes take the connection writer lock for a whole frame, so concurrent
/// RTSP responses and RTP packets never split each other.
pub struct InterleavedTransport {
    writer: ConnectionWriter,
    channels: ChannelPair,
    inbox: Inbox,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl InterleavedTransport {
    pub fn new(writer: ConnectionWriter, channels: ChannelPair) -> Self {
        Self {
            writer,
            channels,
            inbox: Inbox::new(),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn channels(&self) -> ChannelPair {
        self.channels
    }

    fn write_frame(&self, channel: u8, payload: &[u8]) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(RtspError::TransportStopped);
        }
        let frame = encode_frame(channel, payload)?;
        let mut writer = self.writer.lock();
        writer.write_all(&frame)?;
        writer.flush()?;
        Ok(())
    }
}

impl RtpTransport for InterleavedTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Interleaved
    }

    /// Reading happens on the connection thread; this only arms the transport.
    fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(RtspError::TransportAlreadyStarted);
        }
        Ok(())
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn write_data(&self, packet: &[u8]) -> Result<()> {
        self.write_frame(self.channels.data, packet)
    }

    fn write_control(&self, packet: &[u8]) -> Result<()> {
        self.write_frame(self.channels.control, packet)
    }

    fn try_recv(&self) -> Option<ReceivedPacket> {
        self.inbox.try_recv()
    }

    fn deliver_interleaved(&self, channel: u8, payload: &[u8]) -> bool {
        let sub_channel = if channel == self.channels.data {
            SubChannel::Data
        } else if channel == self.channels.control {
            SubChannel::Control
        } else {
            return false;
        };
        if !self.stopped.load(Ordering::SeqCst) {
            super::offer(
                &self.inbox.sender(),
                ReceivedPacket {
                    sub_channel,
                    channel: u16::from(channel),
                    payload: payload.to_vec(),
                },
            );
        }
        true
    }
}
