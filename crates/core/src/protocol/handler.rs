use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::RtspError;
use crate::protocol::request::{Method, RequestPayload, RtspRequest};
use crate::protocol::response::RtspResponse;
use crate::protocol::sdp;
use crate::session::transport::{ChannelPair, LowerTransport, TransportSpec};
use crate::session::{ConnectionId, SessionManager};
use crate::transport::{ConnectionWriter, InterleavedTransport, RtpTransport, UdpPairTransport};

const PUBLIC_METHODS: &str = "OPTIONS, DESCRIBE, SETUP, PLAY, PAUSE, TEARDOWN, GET_PARAMETER";

/// Handles RTSP method requests for a single TCP connection.
///
/// Refreshes the keepalive, applies the authentication gate and
/// dispatches on [`Method`]. Session state itself lives in the
/// [`SessionManager`]; the handler only knows its own connection.
pub struct MethodHandler {
    session_manager: SessionManager,
    conn: ConnectionId,
    client_addr: SocketAddr,
    writer: ConnectionWriter,
    closing: bool,
}

impl MethodHandler {
    pub fn new(
        session_manager: SessionManager,
        conn: ConnectionId,
        client_addr: SocketAddr,
        writer: ConnectionWriter,
    ) -> Self {
        MethodHandler {
            session_manager,
            conn,
            client_addr,
            writer,
            closing: false,
        }
    }

    /// Set after bad credentials or a TEARDOWN of this connection's own
    /// session; the connection is closed once the response is written.
    pub fn should_close(&self) -> bool {
        self.closing
    }

    pub fn handle(&mut self, request: &RtspRequest) -> RtspResponse {
        self.session_manager.touch(self.client_addr);

        if let Some(rejection) = self.authenticate(request) {
            return rejection;
        }

        match request.method {
            Method::Options => self.handle_options(request),
            Method::Describe => self.handle_describe(request),
            Method::Setup => self.handle_setup(request),
            Method::Play => self.handle_play(request),
            Method::Pause => self.handle_pause(request),
            Method::Teardown => self.handle_teardown(request),
            Method::GetParameter => self.handle_get_parameter(request),
            Method::Announce
            | Method::Record
            | Method::SetParameter
            | Method::Redirect
            | Method::Unknown => {
                tracing::warn!(method = %request.method_token(), "unsupported RTSP method");
                request.create_response().with_status(501)
            }
        }
    }

    /// Returns a 401 when the request must be rejected. OPTIONS is exempt
    /// so clients can probe capabilities before sending credentials.
    fn authenticate(&mut self, request: &RtspRequest) -> Option<RtspResponse> {
        let auth = self.session_manager.authenticator()?;
        if request.method == Method::Options {
            return None;
        }

        let present = request.get_header("Authorization").is_some();
        if present && auth.validate(request) {
            return None;
        }

        if present {
            tracing::warn!(peer = %self.client_addr, method = %request.method, "invalid credentials, closing");
            self.closing = true;
        } else {
            tracing::debug!(peer = %self.client_addr, method = %request.method, "authorization required");
        }
        Some(
            request
                .create_response()
                .with_status(401)
                .add_header("WWW-Authenticate", &auth.challenge()),
        )
    }

    fn handle_options(&self, request: &RtspRequest) -> RtspResponse {
        tracing::debug!(cseq = ?request.cseq(), "OPTIONS");
        request.create_response().add_header("Public", PUBLIC_METHODS)
    }

    /// Parses host from an RTSP URI (e.g. rtsp://host:8554/path -> host). Falls back to client IP if invalid.
    fn host_from_uri_or_client(&self, uri: &str) -> String {
        if let Some(host) = &self.session_manager.config().public_host {
            return host.clone();
        }

        if let Some(after_scheme) = uri
            .strip_prefix("rtsp://")
            .or_else(|| uri.strip_prefix("rtsps://"))
        {
            let host = after_scheme
                .split('/')
                .next()
                .and_then(|host_port| host_port.rsplit('@').next())
                .and_then(|host_port| host_port.split(':').next())
                .unwrap_or("")
                .trim();
            if !host.is_empty() {
                return host.to_string();
            }
        }
        self.client_addr.ip().to_string()
    }

    fn handle_describe(&self, request: &RtspRequest) -> RtspResponse {
        tracing::debug!(uri = %request.uri, "DESCRIBE");

        let host = self.host_from_uri_or_client(&request.uri);
        let body = sdp::generate_sdp(
            self.session_manager.payloadizer().as_ref(),
            &host,
            self.session_manager.config(),
        );

        request
            .create_response()
            .add_header("Content-Type", "application/sdp")
            .add_header("Content-Base", &request.uri)
            .with_body(body)
    }

    /// First acceptable offer wins. Multicast and UDP offers without
    /// client ports are skipped; nothing usable means 461.
    fn handle_setup(&self, request: &RtspRequest) -> RtspResponse {
        let offers = match request.payload() {
            RequestPayload::Setup { offers } => offers.as_slice(),
            RequestPayload::None => &[],
        };

        for offer in offers {
            let Some((transport, mut reply)) = self.build_transport(offer) else {
                continue;
            };

            let setup = match self.session_manager.setup(self.conn, transport) {
                Ok(setup) => setup,
                Err(e) => {
                    tracing::warn!(error = %e, "SETUP failed to bind transport");
                    return request.create_response().with_status(461);
                }
            };
            reply.ssrc = Some(setup.ssrc);

            tracing::info!(
                session_id = %setup.session_id,
                peer = %self.client_addr,
                transport = %reply,
                "SETUP"
            );

            let timeout = self.session_manager.config().session_timeout.as_secs();
            return request
                .create_response()
                .add_header("Transport", &reply.to_string())
                .add_header("Session", &format!("{};timeout={}", setup.session_id, timeout));
        }

        tracing::warn!(
            transport = request.get_header("Transport").unwrap_or(""),
            "no acceptable transport offered"
        );
        request.create_response().with_status(461)
    }

    /// Build the transport for one offer plus the `Transport` reply for it.
    fn build_transport(&self, offer: &TransportSpec) -> Option<(Arc<dyn RtpTransport>, TransportSpec)> {
        if offer.multicast {
            tracing::debug!("multicast transport not supported");
            return None;
        }

        match offer.lower {
            LowerTransport::Tcp => {
                let channels = offer.interleaved.unwrap_or(ChannelPair::new(0, 1));
                let transport: Arc<dyn RtpTransport> =
                    Arc::new(InterleavedTransport::new(self.writer.clone(), channels));
                let reply = TransportSpec {
                    interleaved: Some(channels),
                    ..TransportSpec::new(LowerTransport::Tcp)
                };
                Some((transport, reply))
            }
            LowerTransport::Udp => {
                let client_ports = offer.client_port?;
                let range = self.session_manager.config().udp_port_range;
                match UdpPairTransport::bind(range, self.client_addr.ip(), client_ports) {
                    Ok(transport) => {
                        let reply = TransportSpec {
                            client_port: Some(client_ports),
                            server_port: Some(transport.server_ports()),
                            ..TransportSpec::new(LowerTransport::Udp)
                        };
                        let transport: Arc<dyn RtpTransport> = Arc::new(transport);
                        Some((transport, reply))
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "UDP port allocation failed");
                        None
                    }
                }
            }
        }
    }

    fn handle_play(&self, request: &RtspRequest) -> RtspResponse {
        let Some(session_id) = request.session_id() else {
            tracing::warn!(cseq = ?request.cseq(), "PLAY missing Session header");
            return request.create_response().with_status(454);
        };

        match self.session_manager.play(session_id) {
            Ok(sequence) => request
                .create_response()
                .add_header("Range", "npt=0-")
                .add_header("RTP-Info", &format!("url={};seq={}", request.uri, sequence)),
            Err(RtspError::SessionNotFound(_)) => {
                tracing::warn!(session_id, "PLAY for unknown session");
                request.create_response().with_status(454)
            }
            Err(e) => {
                tracing::warn!(session_id, error = %e, "PLAY rejected");
                request.create_response().with_status(455)
            }
        }
    }

    fn handle_pause(&self, request: &RtspRequest) -> RtspResponse {
        let found = request
            .session_id()
            .is_some_and(|id| self.session_manager.pause(id).is_ok());
        if found {
            request.create_response()
        } else {
            tracing::warn!(session = ?request.session_id(), "PAUSE for unknown session");
            request.create_response().with_status(454)
        }
    }

    /// Always 200; only matching sessions are closed.
    fn handle_teardown(&mut self, request: &RtspRequest) -> RtspResponse {
        if let Some(session_id) = request.session_id() {
            let owners = self.session_manager.teardown(self.conn, session_id);
            tracing::debug!(session_id, closed = owners.len(), "TEARDOWN");
            if owners.contains(&self.conn) {
                self.closing = true;
            }
        }
        request.create_response()
    }

    /// GET_PARAMETER is used by clients (e.g. VLC) as a keepalive (RFC 2326 §10.8).
    fn handle_get_parameter(&self, request: &RtspRequest) -> RtspResponse {
        tracing::trace!(cseq = ?request.cseq(), "GET_PARAMETER keepalive");
        request.create_response()
    }
}
