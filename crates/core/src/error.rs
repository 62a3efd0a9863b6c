//! Error types for the RTSP engine.

use std::fmt;

/// Errors that can occur in the RTSP engine.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Protocol**: [`Parse`](Self::Parse): malformed RTSP messages.
/// - **Transport**: [`Io`](Self::Io), [`PortRangeExhausted`](Self::PortRangeExhausted),
///   [`UnsupportedTransport`](Self::UnsupportedTransport),
///   [`FrameTooLarge`](Self::FrameTooLarge),
///   [`TransportAlreadyStarted`](Self::TransportAlreadyStarted),
///   [`TransportStopped`](Self::TransportStopped).
/// - **Session**: [`SessionNotFound`](Self::SessionNotFound).
/// - **Media**: [`InvalidJpeg`](Self::InvalidJpeg),
///   [`TooManyQuantizationTables`](Self::TooManyQuantizationTables).
/// - **Server**: [`NotStarted`](Self::NotStarted),
///   [`AlreadyRunning`](Self::AlreadyRunning).
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No session with the given ID exists in the [`SessionManager`](crate::session::SessionManager).
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The client offered no transport this server can serve (RFC 2326 §12.39).
    #[error("unsupported transport: {0}")]
    UnsupportedTransport(String),

    /// No free even/odd UDP port pair was found in the configured range.
    #[error("no free UDP port pair in range {start}-{end}")]
    PortRangeExhausted { start: u16, end: u16 },

    /// [`RtpTransport::start`](crate::transport::RtpTransport::start) was called twice.
    #[error("transport already started")]
    TransportAlreadyStarted,

    /// The transport was stopped and can no longer send.
    #[error("transport stopped")]
    TransportStopped,

    /// Interleaved frames carry a 16-bit length (RFC 2326 §10.12).
    #[error("frame of {0} bytes does not fit interleaved framing")]
    FrameTooLarge(usize),

    /// The JPEG frame could not be walked to its scan data.
    #[error("invalid JPEG frame: {0}")]
    InvalidJpeg(&'static str),

    /// RFC 2435 carries at most two quantization tables per frame here.
    #[error("JPEG frame has {0} quantization tables (at most 2 supported)")]
    TooManyQuantizationTables(usize),

    /// [`Server::start`](crate::Server::start) has not been called yet.
    #[error("server not started")]
    NotStarted,

    /// [`Server::start`](crate::Server::start) was called while already running.
    #[error("server already running")]
    AlreadyRunning,

    /// Failed to parse an RTSP request message (RFC 2326 §6).
    #[error("RTSP parse error: {kind}")]
    Parse { kind: ParseErrorKind },
}

/// Specific kind of RTSP parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Input was empty (no request line).
    EmptyRequest,
    /// A header line did not contain a colon separator.
    InvalidHeader,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRequest => write!(f, "empty request"),
            Self::InvalidHeader => write!(f, "invalid header"),
        }
    }
}

/// Convenience alias for `Result<T, RtspError>`.
pub type Result<T> = std::result::Result<T, RtspError>;
