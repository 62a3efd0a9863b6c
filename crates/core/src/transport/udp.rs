use std::io;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::SyncSender;
use std::thread;
use std::time::Duration;

use super::{Inbox, ReceivedPacket, RtpTransport, SubChannel, TransportKind};
use crate::error::{Result, RtspError};
use crate::session::transport::PortPair;

/// Read timeout that bounds how long a receive loop takes to notice `stop`.
const RECV_POLL: Duration = Duration::from_millis(100);

const MAX_DATAGRAM: usize = 2048;

/// Dedicated even/odd UDP socket pair for one session stream.
///
/// RTP goes out of the even (data) port to the client's RTP port, RTCP out
/// of the odd (control) port to the client's RTCP port. Each socket gets a
/// receive thread after [`start`](RtpTransport::start); inbound datagrams
/// land in the transport's inbox.
pub struct UdpPairTransport {
    data: UdpSocket,
    control: UdpSocket,
    data_port: u16,
    control_port: u16,
    data_dest: SocketAddr,
    control_dest: SocketAddr,
    inbox: Inbox,
    started: AtomicBool,
    cancel: Arc<AtomicBool>,
}

impl UdpPairTransport {
    /// Probe `port_range` upward for a free even/odd pair and bind both.
    ///
    /// Probing starts at the first even port in the range; the odd port of
    /// the pair must stay below the range end.
    pub fn bind(port_range: (u16, u16), client_ip: IpAddr, client_ports: PortPair) -> Result<Self> {
        let (start, end) = port_range;
        let (data, control) = probe_pair(start, end)?;
        let data_port = data.local_addr()?.port();
        let control_port = control.local_addr()?.port();

        tracing::debug!(data_port, control_port, %client_ip, "bound UDP port pair");

        Ok(Self {
            data,
            control,
            data_port,
            control_port,
            data_dest: SocketAddr::new(client_ip, client_ports.rtp),
            control_dest: SocketAddr::new(client_ip, client_ports.rtcp),
            inbox: Inbox::new(),
            started: AtomicBool::new(false),
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn data_port(&self) -> u16 {
        self.data_port
    }

    pub fn control_port(&self) -> u16 {
        self.control_port
    }

    pub fn server_ports(&self) -> PortPair {
        PortPair::new(self.data_port, self.control_port)
    }

    fn spawn_receiver(&self, socket: &UdpSocket, sub_channel: SubChannel, port: u16) -> Result<()> {
        let socket = socket.try_clone()?;
        socket.set_read_timeout(Some(RECV_POLL))?;
        let cancel = self.cancel.clone();
        let tx = self.inbox.sender();
        thread::Builder::new()
            .name(format!("rtp-udp-{port}"))
            .spawn(move || receive_loop(socket, sub_channel, port, tx, cancel))?;
        Ok(())
    }

    fn send(&self, socket: &UdpSocket, packet: &[u8], dest: SocketAddr) -> Result<()> {
        if self.cancel.load(Ordering::SeqCst) {
            return Err(RtspError::TransportStopped);
        }
        socket.send_to(packet, dest)?;
        Ok(())
    }
}

impl RtpTransport for UdpPairTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Udp
    }

    fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(RtspError::TransportAlreadyStarted);
        }
        self.spawn_receiver(&self.data, SubChannel::Data, self.data_port)?;
        self.spawn_receiver(&self.control, SubChannel::Control, self.control_port)?;
        Ok(())
    }

    fn stop(&self) {
        if !self.cancel.swap(true, Ordering::SeqCst) {
            tracing::debug!(data_port = self.data_port, "UDP transport stopped");
        }
    }

    fn write_data(&self, packet: &[u8]) -> Result<()> {
        self.send(&self.data, packet, self.data_dest)
    }

    fn write_control(&self, packet: &[u8]) -> Result<()> {
        self.send(&self.control, packet, self.control_dest)
    }

    fn try_recv(&self) -> Option<ReceivedPacket> {
        self.inbox.try_recv()
    }
}

impl Drop for UdpPairTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

fn probe_pair(start: u16, end: u16) -> Result<(UdpSocket, UdpSocket)> {
    let mut port = u32::from(start) + u32::from(start) % 2;
    while port + 1 < u32::from(end) {
        if let Ok(data) = UdpSocket::bind(("0.0.0.0", port as u16)) {
            if let Ok(control) = UdpSocket::bind(("0.0.0.0", (port + 1) as u16)) {
                return Ok((data, control));
            }
        }
        port += 2;
    }
    tracing::warn!(start, end, "no free UDP port pair");
    Err(RtspError::PortRangeExhausted { start, end })
}

/// Blocking receive loop for one socket.
///
/// Polls `cancel` between reads. Any socket error other than a read
/// timeout ends the loop quietly; lost datagrams are the RTP layer's
/// problem.
fn receive_loop(
    socket: UdpSocket,
    sub_channel: SubChannel,
    port: u16,
    tx: SyncSender<ReceivedPacket>,
    cancel: Arc<AtomicBool>,
) {
    let mut buf = [0u8; MAX_DATAGRAM];
    while !cancel.load(Ordering::SeqCst) {
        match socket.recv_from(&mut buf) {
            Ok((len, from)) => {
                tracing::trace!(port, %from, len, "UDP datagram received");
                super::offer(
                    &tx,
                    ReceivedPacket {
                        sub_channel,
                        channel: port,
                        payload: buf[..len].to_vec(),
                    },
                );
            }
            Err(ref e)
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => {}
            Err(e) => {
                tracing::debug!(port, error = %e, "UDP receive loop ended");
                return;
            }
        }
    }
    tracing::trace!(port, "UDP receive loop cancelled");
}
