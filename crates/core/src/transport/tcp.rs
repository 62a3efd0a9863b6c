use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use super::ConnectionWriter;
use super::interleaved::{self, FRAME_MARKER};
use crate::protocol::MethodHandler;
use crate::protocol::RtspRequest;
use crate::session::{ConnectionId, ControlConnection, SessionManager};

/// Largest request head (request line and headers) accepted.
const MAX_HEAD: usize = 16 * 1024;

/// Largest request body accepted on the control connection.
const MAX_BODY: usize = 64 * 1024;

/// Non-blocking TCP accept loop.
///
/// Checks the `running` flag between accepts with a 50ms poll interval
/// so that [`crate::server::Server::stop`] can terminate it promptly.
pub fn accept_loop(listener: TcpListener, session_manager: SessionManager, running: Arc<AtomicBool>) {
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }
                let sm = session_manager.clone();
                let r = running.clone();
                let spawned = thread::Builder::new()
                    .name("rtsp-conn".to_string())
                    .spawn(move || {
                        Connection::handle(stream, sm, r);
                    });
                if let Err(e) = spawned {
                    tracing::warn!(error = %e, "failed to spawn connection thread");
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "TCP accept error");
                }
            }
        }
    }
    tracing::debug!("accept loop exited");
}

/// A single RTSP client connection with its own lifecycle.
///
/// The read side carries both RTSP text and `$`-framed RTP/RTCP; the first
/// byte of each message tells them apart.
struct Connection {
    reader: BufReader<TcpStream>,
    writer: ConnectionWriter,
    handler: MethodHandler,
    session_manager: SessionManager,
    conn: ConnectionId,
    peer_addr: SocketAddr,
}

impl Connection {
    /// Entry point: set up a connection and run its request loop.
    pub fn handle(stream: TcpStream, session_manager: SessionManager, running: Arc<AtomicBool>) {
        let peer_addr = match stream.peer_addr() {
            Ok(addr) => addr,
            Err(_) => return,
        };

        tracing::info!(%peer_addr, "client connected");

        let (reader_stream, closer) = match (stream.try_clone(), stream.try_clone()) {
            (Ok(r), Ok(c)) => (r, c),
            _ => return,
        };

        let writer: ConnectionWriter = Arc::new(Mutex::new(Box::new(stream)));
        let control = ControlConnection::new(peer_addr, writer.clone()).with_closer(closer);
        let conn = session_manager.register_connection(control);
        let handler = MethodHandler::new(session_manager.clone(), conn, peer_addr, writer.clone());

        let mut connection = Connection {
            reader: BufReader::new(reader_stream),
            writer,
            handler,
            session_manager,
            conn,
            peer_addr,
        };

        let reason = connection.run(&running);
        connection.session_manager.connection_closed(conn);

        tracing::info!(%peer_addr, reason, "client disconnected");
    }

    /// Request/response loop. Returns the reason for exiting.
    fn run(&mut self, running: &Arc<AtomicBool>) -> &'static str {
        while running.load(Ordering::SeqCst) {
            let first = match self.reader.fill_buf() {
                Ok([]) => return "connection closed by client",
                Ok(buf) => buf[0],
                Err(_) => return "read error",
            };

            if first == FRAME_MARKER {
                match interleaved::read_frame(&mut self.reader) {
                    Ok((channel, payload)) => {
                        if !self.session_manager.deliver_interleaved(self.conn, channel, &payload) {
                            tracing::trace!(peer = %self.peer_addr, channel, "interleaved frame on unbound channel");
                        }
                    }
                    Err(_) => return "read error",
                }
                continue;
            }

            let raw = match read_message(&mut self.reader) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(reason) => return reason,
            };

            let request = RtspRequest::parse(&raw).unwrap_or_else(|e| {
                tracing::warn!(peer = %self.peer_addr, error = %e, "parse error");
                RtspRequest::unparseable(&raw)
            });

            tracing::debug!(
                peer = %self.peer_addr,
                method = %request.method_token(),
                uri = %request.uri,
                cseq = ?request.cseq(),
                "request"
            );

            let response = self.handler.handle(&request);

            tracing::debug!(
                peer = %self.peer_addr,
                status = response.status_code(),
                "response"
            );

            {
                let mut writer = self.writer.lock();
                if writer.write_all(&response.serialize()).is_err() || writer.flush().is_err() {
                    return "write error";
                }
            }

            if self.handler.should_close() {
                return "closed after response";
            }
        }

        "server shutting down"
    }
}

/// Read one RTSP message: header lines up to the blank line, then a
/// `Content-Length` body. `Ok(None)` for stray blank lines.
fn read_message<R: BufRead>(reader: &mut R) -> Result<Option<String>, &'static str> {
    let mut head = Vec::new();
    loop {
        let before = head.len();
        let budget = (MAX_HEAD - head.len()) as u64;
        match (&mut *reader).take(budget).read_until(b'\n', &mut head) {
            Ok(0) if head.len() >= MAX_HEAD => return Err("request head too large"),
            Ok(0) => return Err("connection closed by client"),
            Ok(_) => {
                let line = &head[before..];
                if line == b"\r\n" || line == b"\n" {
                    break;
                }
            }
            Err(_) => return Err("read error"),
        }
    }

    let mut raw = String::from_utf8_lossy(&head).into_owned();
    if raw.trim().is_empty() {
        return Ok(None);
    }

    let length = content_length(&raw);
    if length > MAX_BODY {
        return Err("request body too large");
    }
    if length > 0 {
        let mut body = vec![0u8; length];
        if reader.read_exact(&mut body).is_err() {
            return Err("read error");
        }
        raw.push_str(&String::from_utf8_lossy(&body));
    }
    Ok(Some(raw))
}

fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("Content-Length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}
