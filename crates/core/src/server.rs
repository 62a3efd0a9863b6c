use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::auth::Authenticator;
use crate::error::{Result, RtspError};
use crate::media::Payloadizer;
use crate::media::mjpeg::JpegPayloadizer;
use crate::session::{FeedReport, SessionManager, TimeoutReport};
use crate::transport::tcp;

/// Default keepalive window before an idle UDP session is reaped.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(70);

/// Server-level configuration used by protocol handlers and sessions.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Public host advertised in SDP `o=` and `c=` lines.
    /// When `None`, host is inferred from request URI/client address.
    pub public_host: Option<String>,
    /// SDP origin username field (`o=<username> ...`).
    pub sdp_username: String,
    /// SDP origin session id field (`o=... <session-id> ...`).
    pub sdp_session_id: String,
    /// SDP origin session version field (`o=... ... <session-version> ...`).
    pub sdp_session_version: String,
    /// SDP session name (`s=`).
    pub sdp_session_name: String,
    /// Ports probed for server RTP/RTCP pairs, `[start, end)`.
    pub udp_port_range: (u16, u16),
    /// Idle time after which a non-interleaved session is closed.
    pub session_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            public_host: None,
            sdp_username: "-".to_string(),
            sdp_session_id: "0".to_string(),
            sdp_session_version: "0".to_string(),
            sdp_session_name: "Stream".to_string(),
            udp_port_range: (50000, 51000),
            session_timeout: DEFAULT_SESSION_TIMEOUT,
        }
    }
}

/// High-level RTSP server orchestrator.
///
/// Owns the session manager and the accept thread. Frames are pushed in
/// with [`feed_frame`](Self::feed_frame) and idle sessions reaped with
/// [`check_timeouts`](Self::check_timeouts); the server schedules neither.
pub struct Server {
    session_manager: SessionManager,
    running: Arc<AtomicBool>,
    bind_addr: String,
    local_addr: Option<SocketAddr>,
    config: Arc<ServerConfig>,
}

impl Server {
    /// Open server streaming JPEG with default settings.
    pub fn new(bind_addr: &str) -> Self {
        Self::with_config(bind_addr, ServerConfig::default())
    }

    pub fn with_config(bind_addr: &str, config: ServerConfig) -> Self {
        Self::build(bind_addr, config, None, Arc::new(JpegPayloadizer::new()))
    }

    /// Require credentials on every request but OPTIONS.
    pub fn with_auth(bind_addr: &str, config: ServerConfig, auth: Arc<dyn Authenticator>) -> Self {
        Self::build(bind_addr, config, Some(auth), Arc::new(JpegPayloadizer::new()))
    }

    /// Fully custom server: optional authenticator and payloadizer.
    pub fn build(
        bind_addr: &str,
        config: ServerConfig,
        auth: Option<Arc<dyn Authenticator>>,
        payloadizer: Arc<dyn Payloadizer>,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            session_manager: SessionManager::new(config.clone(), auth, payloadizer),
            running: Arc::new(AtomicBool::new(false)),
            bind_addr: bind_addr.to_string(),
            local_addr: None,
            config,
        }
    }

    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(RtspError::AlreadyRunning);
        }

        let listener = TcpListener::bind(&self.bind_addr)?;
        listener.set_nonblocking(true)?;
        self.local_addr = Some(listener.local_addr()?);

        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let session_manager = self.session_manager.clone();

        tracing::info!(addr = %self.bind_addr, "RTSP server listening");

        thread::Builder::new()
            .name("rtsp-accept".to_string())
            .spawn(move || {
                tcp::accept_loop(listener, session_manager, running);
            })?;

        Ok(())
    }

    /// Stop accepting and close every connection and transport.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let closed = self.session_manager.close_all();
        tracing::info!(closed, "server stopping");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Address the listener is bound to, once started.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.local_addr.ok_or(RtspError::NotStarted)
    }

    /// Payloadize one frame and send it to every playing session.
    pub fn feed_frame(&self, timestamp_ms: u32, data: &[u8], width: u16, height: u16) -> Result<FeedReport> {
        if !self.is_running() {
            return Err(RtspError::NotStarted);
        }
        self.session_manager.feed_frame(timestamp_ms, data, width, height)
    }

    /// Reap idle sessions; call about once per second.
    pub fn check_timeouts(&self) -> TimeoutReport {
        self.session_manager.check_timeouts()
    }

    pub fn session_manager(&self) -> &SessionManager {
        &self.session_manager
    }

    /// Returns the server's protocol configuration.
    pub fn config(&self) -> Arc<ServerConfig> {
        self.config.clone()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if self.running.swap(false, Ordering::SeqCst) {
            self.session_manager.close_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpStream;

    #[test]
    fn feed_before_start_is_an_error() {
        let server = Server::new("127.0.0.1:0");
        assert!(matches!(server.feed_frame(0, &[], 0, 0), Err(RtspError::NotStarted)));
        assert!(matches!(server.local_addr(), Err(RtspError::NotStarted)));
    }

    #[test]
    fn start_twice_fails() {
        let mut server = Server::new("127.0.0.1:0");
        server.start().unwrap();
        assert!(server.is_running());
        assert!(server.local_addr().unwrap().port() != 0);
        assert!(matches!(server.start(), Err(RtspError::AlreadyRunning)));
        server.stop();
        assert!(!server.is_running());
    }

    #[test]
    fn stop_closes_client_connections() {
        let mut server = Server::new("127.0.0.1:0");
        server.start().unwrap();
        let mut client = TcpStream::connect(server.local_addr().unwrap()).unwrap();
        client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while server.session_manager().connection_count() == 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(server.session_manager().connection_count(), 1);
        server.stop();
        assert_eq!(server.session_manager().connection_count(), 0);

        let mut buf = [0u8; 16];
        assert_eq!(client.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.udp_port_range, (50000, 51000));
        assert_eq!(config.session_timeout, Duration::from_secs(70));
    }
}
