//! MJPEG RTP payloadizer (RFC 2435).
//!
//! - Each JPEG frame maps to one or more RTP packets.
//! - RTP payload starts with an 8-byte JPEG-specific header
//!   (type-specific, fragment offset, type, Q, width/8, height/8).
//! - With Q >= 128 the first fragment also carries the quantization
//!   tables, so the receiver can rebuild the JPEG headers.
//! - Uses static payload type 26: `a=rtpmap:26 JPEG/90000`

use std::cmp;

use super::rtp::{RtpHeader, video_timestamp};
use super::{Frame, Payloadizer};
use crate::error::{Result, RtspError};

/// Static payload type for JPEG (RFC 3551 §6).
pub const JPEG_PAYLOAD_TYPE: u8 = 26;

const DEFAULT_MTU: usize = 1400;
const JPEG_HEADER_LEN: usize = 8;
const MAX_QUANTIZATION_TABLES: usize = 2;
/// Fragment offsets are 24-bit.
const MAX_SCAN_LEN: usize = 0x00FF_FFFF;
/// Width and height travel in units of 8 pixels in one byte.
const MAX_DIMENSION: u16 = 2040;

const SOI: u16 = 0xFFD8;
const EOI: [u8; 2] = [0xFF, 0xD9];
const DQT: u16 = 0xFFDB;
const SOS: u16 = 0xFFDA;

/// JPEG over RTP payloadizer.
///
/// Walks the frame headers, keeps the quantization tables and fragments
/// the entropy-coded scan data into packets of at most `mtu` payload
/// bytes after the JPEG header.
#[derive(Debug, Clone)]
pub struct JpegPayloadizer {
    mtu: usize,
    quality: u8,
    jpeg_type: u8,
}

impl Default for JpegPayloadizer {
    fn default() -> Self {
        Self::new()
    }
}

impl JpegPayloadizer {
    /// Type 1 (4:2:0) with Q=255: tables are always sent in-band.
    pub fn new() -> Self {
        Self {
            mtu: DEFAULT_MTU,
            quality: 255,
            jpeg_type: 1,
        }
    }

    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu.max(1);
        self
    }

    /// Q values 1-99 select the standard scaled tables on the receiver;
    /// 128-255 mean the tables travel in the first fragment.
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_type(mut self, jpeg_type: u8) -> Self {
        self.jpeg_type = jpeg_type;
        self
    }

    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Quantization table header (RFC 2435 §3.1.8) followed by the table bytes.
    fn quantization_header(tables: &[&[u8]]) -> Vec<u8> {
        let mut precision = 0u8;
        let mut length = 0usize;
        for (i, table) in tables.iter().enumerate() {
            if table[0] >> 4 != 0 {
                precision |= 1 << i;
            }
            length += table.len() - 1;
        }

        let mut out = Vec::with_capacity(4 + length);
        out.push(0); // MBZ
        out.push(precision);
        out.extend_from_slice(&(length as u16).to_be_bytes());
        for table in tables {
            out.extend_from_slice(&table[1..]);
        }
        out
    }
}

impl Payloadizer for JpegPayloadizer {
    fn payloadize(&self, frame: &Frame<'_>) -> Result<Vec<Vec<u8>>> {
        if frame.width > MAX_DIMENSION || frame.height > MAX_DIMENSION {
            return Err(RtspError::InvalidJpeg("dimensions exceed 2040 pixels"));
        }
        let parts = split_frame(frame.data)?;
        if parts.scan.is_empty() {
            return Err(RtspError::InvalidJpeg("no scan data"));
        }
        if parts.scan.len() > MAX_SCAN_LEN {
            return Err(RtspError::InvalidJpeg("scan data exceeds 24-bit fragment offset"));
        }

        let tables = if self.quality >= 128 && !parts.tables.is_empty() {
            Self::quantization_header(&parts.tables)
        } else {
            Vec::new()
        };

        let timestamp = video_timestamp(frame.timestamp_ms);
        let scan = parts.scan;
        let mut packets = Vec::new();
        let mut offset = 0usize;

        while offset < scan.len() {
            let extra: &[u8] = if offset == 0 { &tables } else { &[] };
            let room = cmp::max(self.mtu.saturating_sub(extra.len()), 1);
            let chunk = cmp::min(room, scan.len() - offset);
            let last = offset + chunk == scan.len();

            let mut packet = Vec::with_capacity(12 + JPEG_HEADER_LEN + extra.len() + chunk);
            packet.extend_from_slice(&RtpHeader::new(JPEG_PAYLOAD_TYPE, timestamp, last).write());
            // type-specific byte, then the 24-bit fragment offset
            packet.extend_from_slice(&(offset as u32 & 0x00FF_FFFF).to_be_bytes());
            packet.push(self.jpeg_type);
            packet.push(self.quality);
            packet.push((frame.width / 8) as u8);
            packet.push((frame.height / 8) as u8);
            packet.extend_from_slice(extra);
            packet.extend_from_slice(&scan[offset..offset + chunk]);
            packets.push(packet);

            offset += chunk;
        }

        tracing::trace!(
            frame_bytes = frame.data.len(),
            scan_bytes = scan.len(),
            tables = parts.tables.len(),
            rtp_packets = packets.len(),
            "JPEG frame payloadized"
        );

        Ok(packets)
    }

    fn codec_name(&self) -> &'static str {
        "JPEG"
    }

    fn clock_rate(&self) -> u32 {
        90000
    }

    fn payload_type(&self) -> u8 {
        JPEG_PAYLOAD_TYPE
    }

    fn sdp_attributes(&self) -> Vec<String> {
        vec![
            format!(
                "a=rtpmap:{} {}/{}",
                self.payload_type(),
                self.codec_name(),
                self.clock_rate()
            ),
            "a=control:trackID=0".to_string(),
        ]
    }
}

/// Quantization tables (each starting with its Pq/Tq byte) and scan data.
struct JpegParts<'a> {
    tables: Vec<&'a [u8]>,
    scan: &'a [u8],
}

/// One marker segment: marker code and body after the length field.
struct Segment<'a> {
    marker: u16,
    body: &'a [u8],
}

/// Iterate marker segments after SOI, up to and including SOS.
///
/// Returns the segments and the offset of the first byte after SOS.
fn segments(jpeg: &[u8]) -> Result<(Vec<Segment<'_>>, usize)> {
    if jpeg.len() < 4 || u16::from_be_bytes([jpeg[0], jpeg[1]]) != SOI {
        return Err(RtspError::InvalidJpeg("missing SOI marker"));
    }

    let mut pos = 2;
    let mut found = Vec::new();
    loop {
        if pos + 4 > jpeg.len() {
            return Err(RtspError::InvalidJpeg("truncated before start of scan"));
        }
        let marker = u16::from_be_bytes([jpeg[pos], jpeg[pos + 1]]);
        let size = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
        if marker & 0xFF00 != 0xFF00 {
            return Err(RtspError::InvalidJpeg("expected marker"));
        }
        if size < 2 || pos + 2 + size > jpeg.len() {
            return Err(RtspError::InvalidJpeg("segment overruns frame"));
        }
        found.push(Segment {
            marker,
            body: &jpeg[pos + 4..pos + 2 + size],
        });
        pos += 2 + size;
        if marker == SOS {
            return Ok((found, pos));
        }
    }
}

/// Skip APPn and the other table/frame headers, collect DQT tables, and
/// return the scan data between SOS and EOI.
fn split_frame(jpeg: &[u8]) -> Result<JpegParts<'_>> {
    let (segments, scan_start) = segments(jpeg)?;

    let mut tables = Vec::new();
    for segment in segments.iter().filter(|s| s.marker == DQT) {
        let mut body = segment.body;
        while !body.is_empty() {
            let len = if body[0] >> 4 == 0 { 65 } else { 129 };
            if body.len() < len {
                return Err(RtspError::InvalidJpeg("truncated quantization table"));
            }
            tables.push(&body[..len]);
            body = &body[len..];
        }
        if tables.len() > MAX_QUANTIZATION_TABLES {
            tracing::warn!(tables = tables.len(), "too many quantization tables, dropping frame");
            return Err(RtspError::TooManyQuantizationTables(tables.len()));
        }
    }

    let mut scan = &jpeg[scan_start..];
    if scan.ends_with(&EOI) {
        scan = &scan[..scan.len() - 2];
    }
    Ok(JpegParts { tables, scan })
}

/// Frame width and height from the SOF segment, for sources that do not
/// track them.
pub fn frame_dimensions(jpeg: &[u8]) -> Option<(u16, u16)> {
    let (segments, _) = segments(jpeg).ok()?;
    segments
        .iter()
        .find(|s| matches!(s.marker, 0xFFC0..=0xFFC2))
        .filter(|s| s.body.len() >= 5)
        .map(|s| {
            let height = u16::from_be_bytes([s.body[1], s.body[2]]);
            let width = u16::from_be_bytes([s.body[3], s.body[4]]);
            (width, height)
        })
}
