//! RTSP session management (RFC 2326 §3, §12.37).
//!
//! Every accepted control connection gets an entry in the session arena.
//! The entry becomes a real RTSP session on its first successful SETUP,
//! when the session ID is minted, and tracks:
//!
//! - The playback state: Init -> Ready -> Playing <-> Ready.
//! - The video RTP stream: sequence number, SSRC, packet/octet counters,
//!   and the transport negotiated during SETUP.
//! - The last time the client sent any RTSP request, for keepalive reaping.
//!
//! ## Session lifecycle (RFC 2326 §A.1)
//!
//! ```text
//! connect        -> Init     (no session ID yet)
//! SETUP          -> Ready
//! PLAY           -> Playing
//! PAUSE          -> Ready
//! TEARDOWN       -> Closed   (removed)
//! TCP disconnect -> Closed   (removed)
//! idle > timeout -> Closed   (all but interleaved, via check_timeouts)
//! ```
//!
//! ## Locking
//!
//! One `parking_lot::Mutex` guards the whole arena. It is held for scans
//! and mutations only. Media fan-out snapshots what it needs under the
//! lock, sends outside it, then writes the counters back.

pub mod transport;

use std::collections::HashMap;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

use crate::auth::Authenticator;
use crate::error::{Result, RtspError};
use crate::media::rtcp::{self, NtpTimestamp, SenderReport};
use crate::media::rtp::{self, RTP_HEADER_LEN};
use crate::media::{Frame, Payloadizer};
use crate::server::ServerConfig;
use crate::transport::{ConnectionWriter, RtpTransport, TransportKind};
pub use transport::{ChannelPair, LowerTransport, PortPair, TransportSpec};

/// Arena key: one per accepted control connection.
pub type ConnectionId = u64;

/// RTSP session state machine (RFC 2326 §A.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no SETUP yet.
    Init,
    /// Transport bound, not delivering.
    Ready,
    /// Media is being delivered.
    Playing,
    Closed,
}

/// Handle to the control connection that owns a session.
///
/// Holds only the shared writer and a socket handle for shutdown, never
/// a reference back into the arena.
#[derive(Clone)]
pub struct ControlConnection {
    pub peer_addr: SocketAddr,
    pub writer: ConnectionWriter,
    closer: Option<Arc<TcpStream>>,
}

impl ControlConnection {
    pub fn new(peer_addr: SocketAddr, writer: ConnectionWriter) -> Self {
        Self {
            peer_addr,
            writer,
            closer: None,
        }
    }

    /// Socket to shut down when the session is closed server-side.
    pub fn with_closer(mut self, stream: TcpStream) -> Self {
        self.closer = Some(Arc::new(stream));
        self
    }

    /// Shut the connection down so its read loop exits.
    pub fn close(&self) {
        if let Some(stream) = &self.closer {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

/// Per-stream RTP bookkeeping.
pub struct RtpStream {
    pub sequence: u16,
    pub packet_count: u32,
    /// Payload octets sent, RTP headers excluded (RFC 3550 §6.4.1).
    pub octet_count: u32,
    pub ssrc: u32,
    /// A sender report goes out before the next frame.
    pub rtcp_due: bool,
    pub rtcp_received: u64,
    pub transport: Option<Arc<dyn RtpTransport>>,
}

impl RtpStream {
    fn new() -> Self {
        Self {
            sequence: rand::random::<u16>().max(1),
            packet_count: 0,
            octet_count: 0,
            ssrc: rand::random::<u32>(),
            rtcp_due: false,
            rtcp_received: 0,
            transport: None,
        }
    }

    fn is_interleaved(&self) -> bool {
        self.transport
            .as_ref()
            .is_some_and(|t| t.kind() == TransportKind::Interleaved)
    }
}

pub struct Session {
    pub id: Option<String>,
    pub state: SessionState,
    pub last_keepalive: Instant,
    pub video: RtpStream,
    pub control: ControlConnection,
}

impl Session {
    fn new(control: ControlConnection) -> Self {
        Self {
            id: None,
            state: SessionState::Init,
            last_keepalive: Instant::now(),
            video: RtpStream::new(),
            control,
        }
    }

    fn matches(&self, id: &str) -> bool {
        self.id.as_deref() == Some(id)
    }

    /// Stop the transport, leaving the control connection to its owner.
    fn release(&mut self) {
        self.state = SessionState::Closed;
        if let Some(transport) = self.video.transport.take() {
            transport.stop();
        }
    }

    /// Release the transport and the control connection.
    fn close(mut self) {
        self.release();
        self.control.close();
    }
}

/// Result of a successful SETUP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupReply {
    pub session_id: String,
    pub ssrc: u32,
}

/// Read-only view of one session, for status reporting and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: String,
    pub state: SessionState,
    pub peer_addr: SocketAddr,
    pub sequence: u16,
    pub ssrc: u32,
    pub packet_count: u32,
    pub octet_count: u32,
    pub rtcp_received: u64,
    pub transport: Option<TransportKind>,
}

/// Outcome of one [`SessionManager::feed_frame`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedReport {
    /// Playing sessions the frame was offered to.
    pub sessions: usize,
    pub packets_sent: usize,
    /// Sessions dropped after a send failure.
    pub removed: usize,
}

/// Outcome of one [`SessionManager::check_timeouts`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeoutReport {
    /// Sessions (past SETUP) still alive.
    pub sessions: usize,
    pub playing: usize,
    pub removed: usize,
}

/// Snapshot of one playing stream taken for fan-out.
struct Delivery {
    conn: ConnectionId,
    transport: Arc<dyn RtpTransport>,
    sequence: u16,
    ssrc: u32,
    packet_count: u32,
    octet_count: u32,
    rtcp_due: bool,
    failed: bool,
}

/// Owner of every live session.
///
/// Cheap to clone; clones share the same arena.
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<Mutex<HashMap<ConnectionId, Session>>>,
    next_connection: Arc<AtomicU64>,
    config: Arc<ServerConfig>,
    auth: Option<Arc<dyn Authenticator>>,
    payloadizer: Arc<dyn Payloadizer>,
}

impl SessionManager {
    pub fn new(
        config: Arc<ServerConfig>,
        auth: Option<Arc<dyn Authenticator>>,
        payloadizer: Arc<dyn Payloadizer>,
    ) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            next_connection: Arc::new(AtomicU64::new(1)),
            config,
            auth,
            payloadizer,
        }
    }

    pub fn config(&self) -> &Arc<ServerConfig> {
        &self.config
    }

    pub fn authenticator(&self) -> Option<&Arc<dyn Authenticator>> {
        self.auth.as_ref()
    }

    pub fn payloadizer(&self) -> &Arc<dyn Payloadizer> {
        &self.payloadizer
    }

    /// Add an `Init` entry for a freshly accepted control connection.
    pub fn register_connection(&self, control: ControlConnection) -> ConnectionId {
        let conn = self.next_connection.fetch_add(1, Ordering::SeqCst);
        let peer_addr = control.peer_addr;
        self.sessions.lock().insert(conn, Session::new(control));
        tracing::debug!(conn, %peer_addr, "connection registered");
        conn
    }

    /// Drop whatever the connection owned. The transport is stopped; the
    /// control socket is already gone.
    pub fn connection_closed(&self, conn: ConnectionId) {
        let removed = self.sessions.lock().remove(&conn);
        if let Some(mut session) = removed {
            if let Some(id) = &session.id {
                tracing::info!(session_id = %id, "session closed on disconnect");
            }
            session.release();
        }
    }

    /// Refresh the keepalive of every session owned by `peer_addr`.
    pub fn touch(&self, peer_addr: SocketAddr) {
        self.touch_at(peer_addr, Instant::now());
    }

    pub fn touch_at(&self, peer_addr: SocketAddr, now: Instant) {
        for session in self.sessions.lock().values_mut() {
            if session.control.peer_addr == peer_addr {
                session.last_keepalive = now;
            }
        }
    }

    /// Bind `transport` to the connection's video stream.
    ///
    /// The first SETUP mints the session ID; later ones reuse it and
    /// replace (and stop) the previous transport.
    pub fn setup(&self, conn: ConnectionId, transport: Arc<dyn RtpTransport>) -> Result<SetupReply> {
        transport.start()?;

        let (reply, previous) = {
            let mut sessions = self.sessions.lock();
            let Some(session) = sessions.get_mut(&conn) else {
                transport.stop();
                return Err(RtspError::SessionNotFound(format!("connection {conn}")));
            };
            let id = session
                .id
                .get_or_insert_with(|| format!("{:016X}", rand::random::<u64>()))
                .clone();
            if session.state == SessionState::Init {
                session.state = SessionState::Ready;
            }
            let previous = session.video.transport.replace(transport);
            (
                SetupReply {
                    session_id: id,
                    ssrc: session.video.ssrc,
                },
                previous,
            )
        };

        if let Some(previous) = previous {
            previous.stop();
        }
        tracing::info!(session_id = %reply.session_id, conn, "session set up");
        Ok(reply)
    }

    /// Start delivery. Returns the next RTP sequence number for `RTP-Info`.
    pub fn play(&self, session_id: &str) -> Result<u16> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .values_mut()
            .find(|s| s.matches(session_id))
            .ok_or_else(|| RtspError::SessionNotFound(session_id.to_string()))?;
        if session.video.transport.is_none() {
            return Err(RtspError::UnsupportedTransport("no transport bound".to_string()));
        }
        session.state = SessionState::Playing;
        session.video.rtcp_due = true;
        tracing::info!(session_id, "session playing");
        Ok(session.video.sequence)
    }

    pub fn pause(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .values_mut()
            .find(|s| s.matches(session_id))
            .ok_or_else(|| RtspError::SessionNotFound(session_id.to_string()))?;
        session.state = SessionState::Ready;
        tracing::debug!(session_id, "session paused");
        Ok(())
    }

    /// Remove every session with this ID and release its resources.
    /// Returns the connections that owned them.
    ///
    /// Control connections other than `requester` are shut down here. The
    /// requester's own connection is left open so it can write the reply;
    /// its owner closes it afterwards.
    pub fn teardown(&self, requester: ConnectionId, session_id: &str) -> Vec<ConnectionId> {
        let closed: Vec<(ConnectionId, Session)> = {
            let mut sessions = self.sessions.lock();
            let owners: Vec<ConnectionId> = sessions
                .iter()
                .filter(|(_, s)| s.matches(session_id))
                .map(|(conn, _)| *conn)
                .collect();
            owners
                .into_iter()
                .filter_map(|conn| sessions.remove(&conn).map(|s| (conn, s)))
                .collect()
        };

        let mut owners = Vec::with_capacity(closed.len());
        for (conn, mut session) in closed {
            if conn == requester {
                session.release();
            } else {
                session.close();
            }
            owners.push(conn);
        }
        if !owners.is_empty() {
            tracing::info!(session_id, "session torn down");
        }
        owners
    }

    /// Close every entry: transports are stopped and control connections
    /// shut down. Used on server shutdown.
    pub fn close_all(&self) -> usize {
        let drained: Vec<Session> = self.sessions.lock().drain().map(|(_, s)| s).collect();
        let count = drained.len();
        for session in drained {
            session.close();
        }
        if count > 0 {
            tracing::info!(count, "closed all connections");
        }
        count
    }

    /// Route a `$` frame read from connection `conn` to its transport.
    pub fn deliver_interleaved(&self, conn: ConnectionId, channel: u8, payload: &[u8]) -> bool {
        let transport = self
            .sessions
            .lock()
            .get(&conn)
            .and_then(|s| s.video.transport.clone());
        match transport {
            Some(t) => t.deliver_interleaved(channel, payload),
            None => false,
        }
    }

    /// Payloadize one frame and send it to every playing session.
    ///
    /// Returns immediately when nothing is playing. A payload error drops
    /// the frame for everyone; a send error drops only that session.
    pub fn feed_frame(&self, timestamp_ms: u32, data: &[u8], width: u16, height: u16) -> Result<FeedReport> {
        let mut deliveries: Vec<Delivery> = {
            let sessions = self.sessions.lock();
            sessions
                .iter()
                .filter(|(_, s)| s.state == SessionState::Playing)
                .filter_map(|(conn, s)| {
                    let transport = s.video.transport.clone()?;
                    Some(Delivery {
                        conn: *conn,
                        transport,
                        sequence: s.video.sequence,
                        ssrc: s.video.ssrc,
                        packet_count: s.video.packet_count,
                        octet_count: s.video.octet_count,
                        rtcp_due: s.video.rtcp_due,
                        failed: false,
                    })
                })
                .collect()
        };
        if deliveries.is_empty() {
            return Ok(FeedReport::default());
        }

        let frame = Frame {
            timestamp_ms,
            data,
            width,
            height,
        };
        let packets = self.payloadizer.payloadize(&frame).inspect_err(|e| {
            tracing::warn!(error = %e, "dropping frame");
        })?;
        let rtp_timestamp = rtp::video_timestamp(timestamp_ms);

        let mut report = FeedReport {
            sessions: deliveries.len(),
            ..FeedReport::default()
        };
        for delivery in &mut deliveries {
            report.packets_sent += send_frame(delivery, &packets, rtp_timestamp);
        }

        let mut removed = Vec::new();
        {
            let mut sessions = self.sessions.lock();
            for delivery in &deliveries {
                let Some(session) = sessions.get_mut(&delivery.conn) else {
                    continue;
                };
                let same_transport = session
                    .video
                    .transport
                    .as_ref()
                    .is_some_and(|t| Arc::ptr_eq(t, &delivery.transport));
                if !same_transport {
                    continue;
                }
                if delivery.failed {
                    if let Some(session) = sessions.remove(&delivery.conn) {
                        removed.push(session);
                    }
                    continue;
                }
                session.video.sequence = delivery.sequence;
                session.video.packet_count = delivery.packet_count;
                session.video.octet_count = delivery.octet_count;
                session.video.rtcp_due = delivery.rtcp_due;
            }
        }

        report.removed = removed.len();
        for session in removed {
            tracing::warn!(session_id = ?session.id, "send failed, removing session");
            session.close();
        }
        Ok(report)
    }

    pub fn check_timeouts(&self) -> TimeoutReport {
        self.check_timeouts_at(Instant::now())
    }

    /// Reap idle entries and drain inbound packets.
    ///
    /// Connections that never completed SETUP are reaped like UDP
    /// sessions. Interleaved sessions are never reaped here; they end when
    /// their control connection drops.
    pub fn check_timeouts_at(&self, now: Instant) -> TimeoutReport {
        let timeout = self.config.session_timeout;
        let mut report = TimeoutReport::default();
        let expired: Vec<Session> = {
            let mut sessions = self.sessions.lock();
            for session in sessions.values_mut() {
                drain_inbound(&mut session.video);
            }
            let idle: Vec<ConnectionId> = sessions
                .iter()
                .filter(|(_, s)| !s.video.is_interleaved())
                .filter(|(_, s)| now.saturating_duration_since(s.last_keepalive) > timeout)
                .map(|(conn, _)| *conn)
                .collect();
            let expired: Vec<Session> = idle.iter().filter_map(|c| sessions.remove(c)).collect();

            for session in sessions.values().filter(|s| s.id.is_some()) {
                report.sessions += 1;
                if session.state == SessionState::Playing {
                    report.playing += 1;
                }
            }
            expired
        };

        report.removed = expired.len();
        for session in expired {
            tracing::info!(session_id = ?session.id, "session timed out");
            session.close();
        }
        report
    }

    /// Control connections in the arena, with or without a session.
    pub fn connection_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Sessions that have completed SETUP.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().values().filter(|s| s.id.is_some()).count()
    }

    pub fn playing_count(&self) -> usize {
        self.sessions
            .lock()
            .values()
            .filter(|s| s.state == SessionState::Playing)
            .count()
    }

    pub fn session_info(&self, session_id: &str) -> Option<SessionInfo> {
        self.sessions
            .lock()
            .values()
            .find(|s| s.matches(session_id))
            .map(|s| SessionInfo {
                id: session_id.to_string(),
                state: s.state,
                peer_addr: s.control.peer_addr,
                sequence: s.video.sequence,
                ssrc: s.video.ssrc,
                packet_count: s.video.packet_count,
                octet_count: s.video.octet_count,
                rtcp_received: s.video.rtcp_received,
                transport: s.video.transport.as_ref().map(|t| t.kind()),
            })
    }
}

/// Send one frame to one session. Returns the number of RTP packets sent.
fn send_frame(delivery: &mut Delivery, packets: &[Vec<u8>], rtp_timestamp: u32) -> usize {
    if delivery.rtcp_due {
        let sr = SenderReport {
            ssrc: delivery.ssrc,
            ntp: NtpTimestamp::now(),
            rtp_timestamp,
            packet_count: delivery.packet_count,
            octet_count: delivery.octet_count,
        };
        match delivery.transport.write_control(&sr.to_bytes()) {
            Ok(()) => delivery.rtcp_due = false,
            Err(e) => tracing::debug!(ssrc = delivery.ssrc, error = %e, "sender report not sent"),
        }
    }

    let mut sent = 0;
    let mut buf = Vec::new();
    for packet in packets {
        buf.clear();
        buf.extend_from_slice(packet);
        rtp::stamp(&mut buf, delivery.sequence, delivery.ssrc);

        delivery.sequence = delivery.sequence.wrapping_add(1);
        delivery.packet_count = delivery.packet_count.wrapping_add(1);
        let payload_len = packet.len().saturating_sub(RTP_HEADER_LEN) as u32;
        delivery.octet_count = delivery.octet_count.wrapping_add(payload_len);

        if let Err(e) = delivery.transport.write_data(&buf) {
            tracing::debug!(ssrc = delivery.ssrc, error = %e, "RTP send failed");
            delivery.failed = true;
            break;
        }
        sent += 1;
    }
    tracing::trace!(ssrc = delivery.ssrc, sent, "frame delivered");
    sent
}

fn drain_inbound(stream: &mut RtpStream) {
    let Some(transport) = stream.transport.as_ref() else {
        return;
    };
    while let Some(packet) = transport.try_recv() {
        if let Some(pt) = rtcp::packet_type(&packet.payload) {
            stream.rtcp_received += 1;
            tracing::trace!(ssrc = stream.ssrc, packet_type = pt, "RTCP received");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::mjpeg::JpegPayloadizer;
    use crate::media::rtp::RtpHeader;
    use crate::testutil::{RecordingTransport, SharedBuffer, jpeg_frame};
    use crate::transport::{ReceivedPacket, SubChannel};
    use std::time::Duration;

    fn manager() -> SessionManager {
        SessionManager::new(
            Arc::new(ServerConfig::default()),
            None,
            Arc::new(JpegPayloadizer::new().with_mtu(500)),
        )
    }

    fn connect(manager: &SessionManager, port: u16) -> ConnectionId {
        let peer: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
        manager.register_connection(ControlConnection::new(peer, SharedBuffer::default().writer()))
    }

    fn playing(manager: &SessionManager, transport: &Arc<RecordingTransport>) -> String {
        let conn = connect(manager, 40000);
        let id = manager.setup(conn, transport.clone()).unwrap().session_id;
        manager.play(&id).unwrap();
        id
    }

    fn set_sequence(manager: &SessionManager, id: &str, sequence: u16) {
        let mut sessions = manager.sessions.lock();
        let session = sessions.values_mut().find(|s| s.matches(id)).unwrap();
        session.video.sequence = sequence;
    }

    #[test]
    fn setup_mints_id_and_reuses_it() {
        let m = manager();
        let conn = connect(&m, 40000);
        let first = RecordingTransport::udp();
        let second = RecordingTransport::udp();

        let a = m.setup(conn, first.clone()).unwrap();
        let b = m.setup(conn, second.clone()).unwrap();

        assert_eq!(a.session_id.len(), 16);
        assert_eq!(a, b);
        assert!(first.is_stopped());
        assert!(second.is_started());
        assert_eq!(m.session_count(), 1);
    }

    #[test]
    fn setup_on_unknown_connection_fails() {
        let m = manager();
        let t = RecordingTransport::udp();
        assert!(matches!(m.setup(99, t.clone()), Err(RtspError::SessionNotFound(_))));
        assert!(t.is_stopped());
    }

    #[test]
    fn play_and_pause_unknown_session() {
        let m = manager();
        assert!(matches!(m.play("nope"), Err(RtspError::SessionNotFound(_))));
        assert!(matches!(m.pause("nope"), Err(RtspError::SessionNotFound(_))));
    }

    #[test]
    fn feed_without_playing_sessions_does_nothing() {
        let m = manager();
        let conn = connect(&m, 40000);
        let t = RecordingTransport::udp();
        m.setup(conn, t.clone()).unwrap();
        // not even a valid JPEG: payloadizer must not run
        let report = m.feed_frame(0, b"junk", 640, 480).unwrap();
        assert_eq!(report, FeedReport::default());
        assert!(t.data().is_empty());
    }

    #[test]
    fn first_frame_after_play_sends_sender_report() {
        let m = manager();
        let t = RecordingTransport::udp();
        let id = playing(&m, &t);
        let frame = jpeg_frame(1200, 2);

        m.feed_frame(40, &frame, 640, 480).unwrap();
        m.feed_frame(80, &frame, 640, 480).unwrap();

        let control = t.control();
        assert_eq!(control.len(), 1);
        let sr = SenderReport::parse(&control[0]).unwrap();
        assert_eq!(sr.ssrc, m.session_info(&id).unwrap().ssrc);
        assert_eq!(sr.packet_count, 0);
        assert_eq!(sr.rtp_timestamp, 40 * 90);
    }

    #[test]
    fn failed_sender_report_is_retried() {
        let m = manager();
        let t = RecordingTransport::udp();
        t.fail_control(true);
        playing(&m, &t);
        let frame = jpeg_frame(100, 2);

        m.feed_frame(0, &frame, 640, 480).unwrap();
        assert!(t.control().is_empty());
        t.fail_control(false);
        m.feed_frame(40, &frame, 640, 480).unwrap();
        assert_eq!(t.control().len(), 1);
    }

    #[test]
    fn packets_are_stamped_per_session() {
        let m = manager();
        let t = RecordingTransport::udp();
        let id = playing(&m, &t);
        set_sequence(&m, &id, 100);
        let frame = jpeg_frame(1200, 2);

        let report = m.feed_frame(0, &frame, 640, 480).unwrap();

        let data = t.data();
        assert_eq!(report.packets_sent, data.len());
        let info = m.session_info(&id).unwrap();
        for (i, packet) in data.iter().enumerate() {
            let header = RtpHeader::parse(packet).unwrap();
            assert_eq!(header.sequence, 100 + i as u16);
            assert_eq!(header.ssrc, info.ssrc);
        }
        assert_eq!(info.sequence, 100 + data.len() as u16);
        assert_eq!(info.packet_count, data.len() as u32);
        let payload: usize = data.iter().map(|p| p.len() - 12).sum();
        assert_eq!(info.octet_count, payload as u32);
    }

    #[test]
    fn sequence_wraps_without_error() {
        let m = manager();
        let t = RecordingTransport::udp();
        let id = playing(&m, &t);
        set_sequence(&m, &id, 65534);
        let frame = jpeg_frame(1200, 2);

        m.feed_frame(0, &frame, 640, 480).unwrap();

        let n = t.data().len() as u16;
        assert!(n >= 3);
        let sequences: Vec<u16> = t
            .data()
            .iter()
            .map(|p| RtpHeader::parse(p).unwrap().sequence)
            .collect();
        assert_eq!(&sequences[..3], &[65534, 65535, 0]);
        assert_eq!(m.session_info(&id).unwrap().sequence, 65534u16.wrapping_add(n));
    }

    #[test]
    fn send_failure_drops_only_that_session() {
        let m = manager();
        let good = RecordingTransport::udp();
        let bad = RecordingTransport::udp();
        bad.fail_data_after(1);
        let good_id = playing(&m, &good);
        let bad_id = playing(&m, &bad);
        let frame = jpeg_frame(1200, 2);

        let report = m.feed_frame(0, &frame, 640, 480).unwrap();

        assert_eq!(report.sessions, 2);
        assert_eq!(report.removed, 1);
        assert_eq!(bad.data().len(), 1);
        assert!(bad.is_stopped());
        assert!(m.session_info(&bad_id).is_none());
        assert_eq!(m.session_info(&good_id).unwrap().state, SessionState::Playing);
        assert!(good.data().len() > 1);
    }

    #[test]
    fn bad_frame_is_dropped_and_sessions_survive() {
        let m = manager();
        let t = RecordingTransport::udp();
        let id = playing(&m, &t);

        assert!(m.feed_frame(0, &jpeg_frame(100, 3), 640, 480).is_err());
        assert!(t.data().is_empty());
        assert!(m.session_info(&id).is_some());
    }

    #[test]
    fn paused_sessions_get_nothing() {
        let m = manager();
        let t = RecordingTransport::udp();
        let id = playing(&m, &t);
        m.pause(&id).unwrap();

        m.feed_frame(0, &jpeg_frame(100, 2), 640, 480).unwrap();
        assert!(t.data().is_empty());
        assert_eq!(m.session_info(&id).unwrap().state, SessionState::Ready);
    }

    #[test]
    fn idle_udp_session_is_reaped() {
        let m = manager();
        let t = RecordingTransport::udp();
        let id = playing(&m, &t);
        let start = Instant::now();
        m.touch_at("127.0.0.1:40000".parse().unwrap(), start);

        let report = m.check_timeouts_at(start + Duration::from_secs(69));
        assert_eq!(report.removed, 0);
        assert_eq!(report.playing, 1);

        let report = m.check_timeouts_at(start + Duration::from_secs(71));
        assert_eq!(report.removed, 1);
        assert_eq!(report.sessions, 0);
        assert!(m.session_info(&id).is_none());
        assert!(t.is_stopped());
    }

    #[test]
    fn interleaved_session_is_never_reaped() {
        let m = manager();
        let t = RecordingTransport::interleaved();
        let id = playing(&m, &t);

        let report = m.check_timeouts_at(Instant::now() + Duration::from_secs(3600));
        assert_eq!(report.removed, 0);
        assert!(m.session_info(&id).is_some());
    }

    #[test]
    fn touch_refreshes_by_peer_address() {
        let m = manager();
        let t = RecordingTransport::udp();
        let id = playing(&m, &t);
        let start = Instant::now();

        m.touch_at("127.0.0.1:40000".parse().unwrap(), start + Duration::from_secs(60));
        m.touch_at("127.0.0.1:40001".parse().unwrap(), start + Duration::from_secs(120));

        assert_eq!(m.check_timeouts_at(start + Duration::from_secs(100)).removed, 0);
        assert_eq!(m.check_timeouts_at(start + Duration::from_secs(131)).removed, 1);
        assert!(m.session_info(&id).is_none());
    }

    #[test]
    fn inbound_rtcp_is_counted_not_keepalive() {
        let m = manager();
        let t = RecordingTransport::udp();
        let id = playing(&m, &t);
        let start = Instant::now();
        m.touch_at("127.0.0.1:40000".parse().unwrap(), start);
        t.push_inbound(ReceivedPacket {
            sub_channel: SubChannel::Control,
            channel: 1,
            payload: vec![0x80, 201, 0, 1, 0, 0, 0, 0],
        });

        m.check_timeouts_at(start + Duration::from_secs(10));
        assert_eq!(m.session_info(&id).unwrap().rtcp_received, 1);
        assert_eq!(m.check_timeouts_at(start + Duration::from_secs(71)).removed, 1);
    }

    #[test]
    fn teardown_removes_and_stops() {
        let m = manager();
        let conn = connect(&m, 40000);
        let t = RecordingTransport::udp();
        let id = m.setup(conn, t.clone()).unwrap().session_id;
        m.play(&id).unwrap();

        assert_eq!(m.teardown(conn, &id), vec![conn]);
        assert!(m.teardown(conn, &id).is_empty());
        assert!(t.is_stopped());
        assert!(m.session_info(&id).is_none());
        assert_eq!(m.check_timeouts().sessions, 0);
        // the entry is gone, not reset: a new SETUP on it fails
        assert!(m.setup(conn, RecordingTransport::udp()).is_err());
    }

    #[test]
    fn idle_connection_without_setup_is_reaped() {
        let m = manager();
        connect(&m, 40000);
        let start = Instant::now();
        m.touch_at("127.0.0.1:40000".parse().unwrap(), start);

        assert_eq!(m.check_timeouts_at(start + Duration::from_secs(69)).removed, 0);
        let report = m.check_timeouts_at(start + Duration::from_secs(71));
        assert_eq!(report.removed, 1);
        assert_eq!(report.sessions, 0);
        assert_eq!(m.connection_count(), 0);
    }

    #[test]
    fn close_all_empties_the_arena() {
        let m = manager();
        let udp = RecordingTransport::udp();
        let tcp = RecordingTransport::interleaved();
        playing(&m, &udp);
        playing(&m, &tcp);
        connect(&m, 40001);

        assert_eq!(m.close_all(), 3);
        assert!(udp.is_stopped());
        assert!(tcp.is_stopped());
        assert_eq!(m.connection_count(), 0);
        assert_eq!(m.feed_frame(0, &jpeg_frame(100, 2), 640, 480).unwrap(), FeedReport::default());
    }

    #[test]
    fn disconnect_removes_session() {
        let m = manager();
        let conn = connect(&m, 40000);
        let t = RecordingTransport::interleaved();
        let id = m.setup(conn, t.clone()).unwrap().session_id;

        m.connection_closed(conn);
        assert!(m.session_info(&id).is_none());
        assert!(t.is_stopped());
    }
}
