use crate::protocol::headers::Headers;

/// An RTSP response (RFC 2326 §7).
///
/// Serializes to the standard text format:
///
/// ```text
/// RTSP/1.0 200 OK\r\n
/// CSeq: 1\r\n
/// Content-Type: application/sdp\r\n
/// Content-Length: 142\r\n
/// \r\n
/// v=0\r\n...
/// ```
///
/// Responses are only created through
/// [`RtspRequest::create_response`](crate::protocol::RtspRequest::create_response),
/// then adjusted with the builder methods. `Content-Length` is computed
/// from the body at serialization time.
#[must_use]
#[derive(Debug, Clone)]
pub struct RtspResponse {
    status_code: u16,
    reason: &'static str,
    pub headers: Headers,
    body: Vec<u8>,
}

/// Server identification string included in every RTSP response
/// per RFC 2326 §12.36.
pub const SERVER_AGENT: &str = "rtsp-engine/0.1";

/// Reason phrase for the status codes this server emits (RFC 2326 §7.1.1).
pub fn reason_phrase(status_code: u16) -> &'static str {
    match status_code {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        454 => "Session Not Found",
        455 => "Method Not Valid in This State",
        461 => "Unsupported Transport",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        _ => "Unknown",
    }
}

impl RtspResponse {
    pub(crate) fn new(status_code: u16) -> Self {
        let mut headers = Headers::new();
        headers.insert("Server", SERVER_AGENT);
        RtspResponse {
            status_code,
            reason: reason_phrase(status_code),
            headers,
            body: Vec::new(),
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self.reason = reason_phrase(status_code);
        self
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn reason(&self) -> &str {
        self.reason
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Serialize to the RTSP text wire format.
    ///
    /// If a body is present, `Content-Length` is appended automatically
    /// (RFC 2326 §12.14), replacing any stale value set by the caller.
    pub fn serialize(&self) -> Vec<u8> {
        let mut head = format!("RTSP/1.0 {} {}\r\n", self.status_code, self.reason);
        self.headers.write_to(&mut head);
        if !self.body.is_empty() {
            head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        }
        head.push_str("\r\n");

        let mut out = head.into_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}
