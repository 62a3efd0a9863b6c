//! Media payloadization and the RTP/RTCP codec.
//!
//! This module provides the [`Payloadizer`] trait and the JPEG
//! implementation that converts raw frames into RTP packets.
//!
//! ## RTP overview (RFC 3550)
//!
//! Each encoded video frame is split into one or more RTP packets.
//! Every RTP packet carries a 12-byte fixed header ([`rtp::RtpHeader`])
//! containing:
//!
//! - **Sequence number** (16-bit, wrapping): for reordering and loss detection.
//! - **Timestamp** (32-bit): media clock, 90 kHz for video.
//! - **SSRC** (32-bit): identifies the sender.
//! - **Marker bit**: set on the last packet of a frame.
//!
//! Payloadizers leave sequence number and SSRC at zero. Those belong to
//! each receiving session and are stamped during fan-out.
//!
//! ## Supported codecs
//!
//! | Codec | Module | RFC |
//! |-------|--------|-----|
//! | MJPEG | [`mjpeg`] | [RFC 2435](https://tools.ietf.org/html/rfc2435) |

pub mod mjpeg;
pub mod rtcp;
pub mod rtp;

use crate::error::Result;

/// One raw frame handed in by the frame source.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    /// Capture time in milliseconds; converted to the media clock.
    pub timestamp_ms: u32,
    pub data: &'a [u8],
    pub width: u16,
    pub height: u16,
}

/// Codec-specific RTP payloadizer.
///
/// Each supported codec implements this trait, providing:
/// - **Payloadization**: splitting a frame into MTU-sized RTP packets
/// - **SDP attributes**: codec parameters for the DESCRIBE response
/// - **RTP metadata**: payload type and clock rate
pub trait Payloadizer: Send + Sync {
    /// Split one frame into complete RTP packets (header plus payload).
    ///
    /// Only the final packet carries the marker bit. A frame that cannot
    /// be encoded returns an error and produces no packets at all.
    fn payloadize(&self, frame: &Frame<'_>) -> Result<Vec<Vec<u8>>>;

    /// Codec name for the SDP `a=rtpmap` attribute (e.g. `"JPEG"`).
    fn codec_name(&self) -> &'static str;

    /// RTP clock rate in Hz.
    fn clock_rate(&self) -> u32;

    /// RTP payload type number (RFC 3551).
    fn payload_type(&self) -> u8;

    /// SDP media-level attribute lines, `a=` prefix included.
    fn sdp_attributes(&self) -> Vec<String>;
}
