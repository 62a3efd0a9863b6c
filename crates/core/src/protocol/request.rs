use std::fmt;

use crate::error::{ParseErrorKind, Result, RtspError};
use crate::protocol::headers::Headers;
use crate::protocol::response::RtspResponse;
use crate::session::transport::TransportSpec;

/// RTSP request verb (RFC 2326 §10).
///
/// Tokens are matched case-insensitively. Anything unrecognised, including
/// a missing token, maps to [`Method::Unknown`] so the request still reaches
/// the dispatcher and can be answered with 501.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Options,
    Describe,
    Setup,
    Play,
    Pause,
    Teardown,
    GetParameter,
    Announce,
    Record,
    SetParameter,
    Redirect,
    Unknown,
}

impl Method {
    const KNOWN: [Method; 11] = [
        Method::Options,
        Method::Describe,
        Method::Setup,
        Method::Play,
        Method::Pause,
        Method::Teardown,
        Method::GetParameter,
        Method::Announce,
        Method::Record,
        Method::SetParameter,
        Method::Redirect,
    ];

    pub fn from_token(token: &str) -> Self {
        Self::KNOWN
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(token))
            .unwrap_or(Method::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Options => "OPTIONS",
            Method::Describe => "DESCRIBE",
            Method::Setup => "SETUP",
            Method::Play => "PLAY",
            Method::Pause => "PAUSE",
            Method::Teardown => "TEARDOWN",
            Method::GetParameter => "GET_PARAMETER",
            Method::Announce => "ANNOUNCE",
            Method::Record => "RECORD",
            Method::SetParameter => "SET_PARAMETER",
            Method::Redirect => "REDIRECT",
            Method::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verb-specific data parsed alongside the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPayload {
    None,
    /// Transport offers from the `Transport` header, in client preference
    /// order. Offers that fail to parse are dropped.
    Setup { offers: Vec<TransportSpec> },
}

/// A parsed RTSP request (RFC 2326 §6).
///
/// RTSP requests follow HTTP/1.1 syntax:
///
/// ```text
/// Method SP Request-URI SP RTSP-Version CRLF
/// *(Header: Value CRLF)
/// CRLF
/// [body]
/// ```
///
/// Header lookup is case-insensitive per RFC 2326 §4.2.
#[derive(Debug, Clone)]
pub struct RtspRequest {
    /// Dispatch verb.
    pub method: Method,
    method_token: String,
    /// Request-URI (e.g. `rtsp://host:port/stream/track1`), `*` when absent.
    pub uri: String,
    /// Protocol version (expected: `RTSP/1.0`).
    pub version: String,
    pub headers: Headers,
    pub body: Vec<u8>,
    payload: RequestPayload,
}

impl RtspRequest {
    /// Build a request from scratch (client side and tests).
    pub fn new(method: Method, uri: &str) -> Self {
        Self {
            method,
            method_token: method.as_str().to_string(),
            uri: uri.to_string(),
            version: "RTSP/1.0".to_string(),
            headers: Headers::new(),
            body: Vec::new(),
            payload: RequestPayload::None,
        }
        .with_payload()
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name, value);
        self.with_payload()
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Parse a request from its command line and header lines.
    ///
    /// A command line with missing or unrecognised tokens still yields a
    /// request (verb [`Method::Unknown`]); only a header without a colon
    /// is a hard [`RtspError::Parse`] failure.
    pub fn from_parts(command_line: &str, header_lines: &[&str]) -> Result<Self> {
        let mut tokens = command_line.split_whitespace();
        let method_token = tokens.next().unwrap_or_default().to_string();
        let uri = tokens.next().unwrap_or("*").to_string();
        let version = tokens.next().unwrap_or("RTSP/1.0").to_string();

        if version != "RTSP/1.0" {
            tracing::warn!(version, "client sent non-RTSP/1.0 version");
        }

        let mut headers = Headers::new();
        for line in header_lines {
            if line.is_empty() {
                break;
            }
            let colon_pos = line.find(':').ok_or(RtspError::Parse {
                kind: ParseErrorKind::InvalidHeader,
            })?;
            headers.insert(line[..colon_pos].trim(), line[colon_pos + 1..].trim());
        }

        Ok(Self {
            method: Method::from_token(&method_token),
            method_token,
            uri,
            version,
            headers,
            body: Vec::new(),
            payload: RequestPayload::None,
        }
        .with_payload())
    }

    /// Parse a complete request: request line, headers, blank line and an
    /// optional body.
    pub fn parse(raw: &str) -> Result<Self> {
        let (head, body) = match raw.find("\r\n\r\n") {
            Some(pos) => (&raw[..pos], &raw[pos + 4..]),
            None => match raw.find("\n\n") {
                Some(pos) => (&raw[..pos], &raw[pos + 2..]),
                None => (raw, ""),
            },
        };

        let mut lines = head.lines();
        let command_line = lines
            .next()
            .filter(|l| !l.trim().is_empty())
            .ok_or(RtspError::Parse {
                kind: ParseErrorKind::EmptyRequest,
            })?;
        let header_lines: Vec<&str> = lines.collect();

        Ok(Self::from_parts(command_line, &header_lines)?.with_body(body.as_bytes().to_vec()))
    }

    /// Best-effort request for text that failed to parse, so the caller can
    /// still answer it. Keeps only the `CSeq` header if one can be found.
    pub fn unparseable(raw: &str) -> Self {
        let mut request = Self::new(Method::Unknown, "*");
        request.method_token = raw
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        if let Some(cseq) = raw.lines().find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.trim()
                .eq_ignore_ascii_case("CSeq")
                .then(|| value.trim().to_string())
        }) {
            request.headers.insert("CSeq", &cseq);
        }
        request
    }

    /// The verb token exactly as received.
    pub fn method_token(&self) -> &str {
        &self.method_token
    }

    pub fn payload(&self) -> &RequestPayload {
        &self.payload
    }

    /// Look up a header value by name (case-insensitive, per RFC 2326 §4.2).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Returns the CSeq header value, which numbers and orders RTSP
    /// request/response pairs (RFC 2326 §12.17).
    ///
    /// Every RTSP request must include a CSeq, and the response must echo it.
    pub fn cseq(&self) -> Option<&str> {
        self.get_header("CSeq")
    }

    /// Session ID from the `Session` header, without the `;timeout=` suffix.
    pub fn session_id(&self) -> Option<&str> {
        self.get_header("Session")
            .map(|s| s.split(';').next().unwrap_or(s).trim())
            .filter(|s| !s.is_empty())
    }

    /// A 200 OK response echoing this request's `CSeq` and `Session`.
    ///
    /// This is the only way to build a response, which keeps CSeq echo
    /// correct by construction.
    pub fn create_response(&self) -> RtspResponse {
        let mut response = RtspResponse::new(200);
        if let Some(cseq) = self.cseq() {
            response.headers.insert("CSeq", cseq);
        }
        if let Some(session) = self.get_header("Session") {
            response.headers.insert("Session", session);
        }
        response
    }

    /// Serialize to the RTSP text wire format. `Content-Length` is
    /// recomputed from the body.
    pub fn serialize(&self) -> Vec<u8> {
        let mut head = format!("{} {} {}\r\n", self.method_token, self.uri, self.version);
        self.headers.write_to(&mut head);
        if !self.body.is_empty() {
            head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        }
        head.push_str("\r\n");

        let mut out = head.into_bytes();
        out.extend_from_slice(&self.body);
        out
    }

    fn with_payload(mut self) -> Self {
        self.payload = match self.method {
            Method::Setup => RequestPayload::Setup {
                offers: self
                    .get_header("Transport")
                    .map(TransportSpec::parse_offers)
                    .unwrap_or_default(),
            },
            _ => RequestPayload::None,
        };
        self
    }
}
