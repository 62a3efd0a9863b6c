//! SDP (Session Description Protocol) generation (RFC 4566 / RFC 8866).
//!
//! Produces the SDP body returned by DESCRIBE responses. The format:
//!
//! ```text
//! v=0                                          ← protocol version
//! o=<user> <sess-id> <sess-ver> IN IP4 <addr>  ← origin
//! s=<session-name>                              ← session name
//! c=IN IP4 <addr>                               ← connection address
//! t=0 0                                         ← timing (live stream)
//! a=tool:rtsp-engine                            ← server software (§6)
//! a=sendonly                                    ← direction (§6)
//! m=video 0 RTP/AVP 26                          ← media description
//! a=rtpmap:26 JPEG/90000                        ← codec/clock rate
//! a=control:trackID=0                           ← track control URL
//! ```
//!
//! Session/origin fields come from [`ServerConfig`](crate::ServerConfig);
//! media attributes come from the [`Payloadizer`].

use crate::media::Payloadizer;
use crate::server::ServerConfig;

/// Generate the SDP session description for the single video stream.
pub fn generate_sdp(payloadizer: &dyn Payloadizer, ip: &str, config: &ServerConfig) -> String {
    let mut sdp: Vec<String> = Vec::new();

    sdp.push("v=0".to_string());
    sdp.push(format!(
        "o={} {} {} IN IP4 {}",
        config.sdp_username, config.sdp_session_id, config.sdp_session_version, ip
    ));
    sdp.push(format!("s={}", config.sdp_session_name));
    sdp.push(format!("c=IN IP4 {}", ip));
    sdp.push("t=0 0".to_string());
    sdp.push("a=tool:rtsp-engine".to_string());
    sdp.push("a=sendonly".to_string());
    sdp.push(format!("m=video 0 RTP/AVP {}", payloadizer.payload_type()));
    sdp.extend(payloadizer.sdp_attributes());

    tracing::trace!("SDP: {}", sdp.join("\r\n"));

    format!("{}\r\n", sdp.join("\r\n"))
}
