//! RTCP sender reports (RFC 3550 §6.4.1).
//!
//! Only the fixed 28-byte report with zero reception report blocks is
//! produced; it lets receivers map RTP timestamps to wall-clock time.

use std::time::{SystemTime, UNIX_EPOCH};

pub const RTCP_VERSION: u8 = 2;
pub const PT_SENDER_REPORT: u8 = 200;
pub const PT_RECEIVER_REPORT: u8 = 201;

/// Length of a sender report without report blocks.
pub const SENDER_REPORT_LEN: usize = 28;

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// 64-bit NTP timestamp: seconds since 1900 and a 32-bit binary fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NtpTimestamp {
    pub seconds: u32,
    pub fraction: u32,
}

impl NtpTimestamp {
    pub fn from_system_time(time: SystemTime) -> Self {
        let since_unix = time.duration_since(UNIX_EPOCH).unwrap_or_default();
        let seconds = (since_unix.as_secs() + NTP_UNIX_OFFSET) as u32;
        let fraction = ((u64::from(since_unix.subsec_nanos()) << 32) / 1_000_000_000) as u32;
        Self { seconds, fraction }
    }

    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }
}

/// Sender report for one RTP stream.
///
/// ```text
///  0                   1                   2                   3
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|    RC   |   PT=SR=200   |             length            |
/// |                         SSRC of sender                        |
/// |              NTP timestamp, most significant word             |
/// |             NTP timestamp, least significant word             |
/// |                         RTP timestamp                         |
/// |                     sender's packet count                     |
/// |                      sender's octet count                     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderReport {
    pub ssrc: u32,
    pub ntp: NtpTimestamp,
    pub rtp_timestamp: u32,
    pub packet_count: u32,
    pub octet_count: u32,
}

impl SenderReport {
    pub fn to_bytes(&self) -> [u8; SENDER_REPORT_LEN] {
        let mut out = [0u8; SENDER_REPORT_LEN];
        // no padding, report count 0
        out[0] = RTCP_VERSION << 6;
        out[1] = PT_SENDER_REPORT;
        // length in 32-bit words minus one
        out[2..4].copy_from_slice(&((SENDER_REPORT_LEN / 4 - 1) as u16).to_be_bytes());
        out[4..8].copy_from_slice(&self.ssrc.to_be_bytes());
        out[8..12].copy_from_slice(&self.ntp.seconds.to_be_bytes());
        out[12..16].copy_from_slice(&self.ntp.fraction.to_be_bytes());
        out[16..20].copy_from_slice(&self.rtp_timestamp.to_be_bytes());
        out[20..24].copy_from_slice(&self.packet_count.to_be_bytes());
        out[24..28].copy_from_slice(&self.octet_count.to_be_bytes());
        out
    }

    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < SENDER_REPORT_LEN || packet_type(buf) != Some(PT_SENDER_REPORT) {
            return None;
        }
        let word = |at: usize| u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        Some(Self {
            ssrc: word(4),
            ntp: NtpTimestamp {
                seconds: word(8),
                fraction: word(12),
            },
            rtp_timestamp: word(16),
            packet_count: word(20),
            octet_count: word(24),
        })
    }
}

/// Packet type of the first packet in an RTCP datagram, if it looks like RTCP.
pub fn packet_type(buf: &[u8]) -> Option<u8> {
    if buf.len() < 4 || buf[0] >> 6 != RTCP_VERSION {
        return None;
    }
    Some(buf[1]).filter(|pt| (200..=206).contains(pt))
}
