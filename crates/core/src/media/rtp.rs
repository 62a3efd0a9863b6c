/// RTP version written into every packet.
pub const RTP_VERSION: u8 = 2;

/// Size of the fixed RTP header without CSRCs.
pub const RTP_HEADER_LEN: usize = 12;

/// RTP fixed header (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Payloadizers write the header once per fragment with sequence number
/// and SSRC left at zero. The session fan-out stamps both per receiver
/// with [`stamp`] just before sending, so one packetized frame can be
/// shared by every playing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RtpHeader {
    pub padding: bool,
    pub extension: bool,
    pub csrc_count: u8,
    /// Set on the last packet of a frame.
    pub marker: bool,
    /// RTP payload type (7-bit, RFC 3551).
    pub payload_type: u8,
    pub sequence: u16,
    /// Media clock units (90 kHz for video).
    pub timestamp: u32,
    pub ssrc: u32,
}

impl RtpHeader {
    pub fn new(payload_type: u8, timestamp: u32, marker: bool) -> Self {
        Self {
            payload_type,
            timestamp,
            marker,
            ..Self::default()
        }
    }

    /// Serialize the 12-byte fixed header.
    pub fn write(&self) -> [u8; RTP_HEADER_LEN] {
        let mut header = [0u8; RTP_HEADER_LEN];
        header[0] = (RTP_VERSION << 6)
            | ((self.padding as u8) << 5)
            | ((self.extension as u8) << 4)
            | (self.csrc_count & 0x0f);
        header[1] = ((self.marker as u8) << 7) | (self.payload_type & 0x7f);
        header[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        header[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        header[8..12].copy_from_slice(&self.ssrc.to_be_bytes());
        header
    }

    /// Read the fixed header; `None` if too short or not version 2.
    pub fn parse(packet: &[u8]) -> Option<Self> {
        if packet.len() < RTP_HEADER_LEN || packet[0] >> 6 != RTP_VERSION {
            return None;
        }
        Some(Self {
            padding: packet[0] & 0x20 != 0,
            extension: packet[0] & 0x10 != 0,
            csrc_count: packet[0] & 0x0f,
            marker: packet[1] & 0x80 != 0,
            payload_type: packet[1] & 0x7f,
            sequence: u16::from_be_bytes([packet[2], packet[3]]),
            timestamp: u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]),
            ssrc: u32::from_be_bytes([packet[8], packet[9], packet[10], packet[11]]),
        })
    }
}

/// Overwrite the sequence number and SSRC of a serialized RTP packet.
pub fn stamp(packet: &mut [u8], sequence: u16, ssrc: u32) {
    if packet.len() < RTP_HEADER_LEN {
        return;
    }
    packet[2..4].copy_from_slice(&sequence.to_be_bytes());
    packet[8..12].copy_from_slice(&ssrc.to_be_bytes());
}

/// Convert a millisecond wall-clock timestamp to 90 kHz RTP units.
pub fn video_timestamp(timestamp_ms: u32) -> u32 {
    timestamp_ms.wrapping_mul(90)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_header() -> RtpHeader {
        RtpHeader {
            ssrc: 0xAABBCCDD,
            sequence: 7,
            ..RtpHeader::new(96, 3000, false)
        }
    }

    #[test]
    fn version_is_2() {
        let buf = make_header().write();
        assert_eq!(buf[0] >> 6, 2);
    }

    #[test]
    fn marker_bit() {
        let no_marker = make_header().write();
        assert_eq!(no_marker[1] & 0x80, 0);

        let with_marker = RtpHeader {
            marker: true,
            ..make_header()
        }
        .write();
        assert_eq!(with_marker[1] & 0x80, 0x80);
    }

    #[test]
    fn payload_type() {
        let buf = make_header().write();
        assert_eq!(buf[1] & 0x7f, 96);
    }

    #[test]
    fn flag_bits_and_csrc_count() {
        let buf = RtpHeader {
            padding: true,
            extension: true,
            csrc_count: 3,
            ..make_header()
        }
        .write();
        assert_eq!(buf[0], 0b1011_0011);
    }

    #[test]
    fn ssrc_and_timestamp_written() {
        let buf = make_header().write();
        assert_eq!(u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]), 3000);
        assert_eq!(u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]), 0xAABBCCDD);
    }

    #[test]
    fn parse_reads_back_fields() {
        let header = RtpHeader {
            marker: true,
            ..make_header()
        };
        assert_eq!(RtpHeader::parse(&header.write()), Some(header));
        assert_eq!(RtpHeader::parse(&[0x80, 0x60]), None);
        assert_eq!(RtpHeader::parse(&[0u8; 12]), None);
    }

    #[test]
    fn stamp_overwrites_sequence_and_ssrc() {
        let mut buf = make_header().write().to_vec();
        buf.extend_from_slice(&[1, 2, 3]);
        stamp(&mut buf, 0xFFFF, 0x01020304);
        let header = RtpHeader::parse(&buf).unwrap();
        assert_eq!(header.sequence, 0xFFFF);
        assert_eq!(header.ssrc, 0x01020304);
        assert_eq!(header.timestamp, 3000);
        assert_eq!(&buf[12..], &[1, 2, 3]);
    }

    #[test]
    fn video_clock_wraps() {
        assert_eq!(video_timestamp(1000), 90_000);
        assert_eq!(video_timestamp(u32::MAX), u32::MAX.wrapping_mul(90));
    }
}
