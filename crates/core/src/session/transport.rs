use std::fmt;

/// Lower transport named in the `Transport` header profile
/// (`RTP/AVP` = UDP, `RTP/AVP/TCP` = interleaved on the control connection).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LowerTransport {
    Udp,
    Tcp,
}

/// An RTP/RTCP port pair, `rtp-rtcp` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortPair {
    pub rtp: u16,
    pub rtcp: u16,
}

impl PortPair {
    pub fn new(rtp: u16, rtcp: u16) -> Self {
        Self { rtp, rtcp }
    }

    /// Parses `a-b`, or a lone `a` meaning `a-(a+1)`.
    fn parse(value: &str) -> Option<Self> {
        match value.split_once('-') {
            Some((rtp, rtcp)) => Some(Self::new(rtp.trim().parse().ok()?, rtcp.trim().parse().ok()?)),
            None => {
                let rtp: u16 = value.trim().parse().ok()?;
                Some(Self::new(rtp, rtp.checked_add(1)?))
            }
        }
    }
}

impl fmt::Display for PortPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.rtp, self.rtcp)
    }
}

/// Interleaved channel ids for RTP and RTCP on the control connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelPair {
    pub data: u8,
    pub control: u8,
}

impl ChannelPair {
    pub fn new(data: u8, control: u8) -> Self {
        Self { data, control }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.split_once('-') {
            Some((data, control)) => {
                Some(Self::new(data.trim().parse().ok()?, control.trim().parse().ok()?))
            }
            None => {
                let data: u8 = value.trim().parse().ok()?;
                Some(Self::new(data, data.checked_add(1)?))
            }
        }
    }
}

impl fmt::Display for ChannelPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.data, self.control)
    }
}

/// One transport specification from an RTSP `Transport` header (RFC 2326 §12.39).
///
/// ## Wire format examples
///
/// ```text
/// Client → Server:
///   Transport: RTP/AVP;unicast;client_port=8000-8001
///   Transport: RTP/AVP/TCP;unicast;interleaved=0-1
///
/// Server → Client:
///   Transport: RTP/AVP;unicast;client_port=8000-8001;server_port=50000-50001;ssrc=4321FADE
/// ```
///
/// The same type describes what the client offered and what the server
/// replies with; fields are present depending on the negotiated mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSpec {
    pub lower: LowerTransport,
    pub multicast: bool,
    pub interleaved: Option<ChannelPair>,
    pub client_port: Option<PortPair>,
    pub server_port: Option<PortPair>,
    /// Multicast port pair (`port=`).
    pub port: Option<PortPair>,
    pub ssrc: Option<u32>,
}

impl TransportSpec {
    pub fn new(lower: LowerTransport) -> Self {
        Self {
            lower,
            multicast: false,
            interleaved: None,
            client_port: None,
            server_port: None,
            port: None,
            ssrc: None,
        }
    }

    /// Parse a single transport specification.
    ///
    /// Returns `None` for non-RTP profiles or malformed parameters.
    /// Unrecognised parameters are ignored.
    ///
    /// ## Examples
    ///
    /// ```
    /// use rtsp::session::transport::{LowerTransport, TransportSpec};
    ///
    /// let spec = TransportSpec::parse("RTP/AVP;unicast;client_port=8000-8001").unwrap();
    /// assert_eq!(spec.lower, LowerTransport::Udp);
    /// assert_eq!(spec.client_port.unwrap().rtcp, 8001);
    ///
    /// assert!(TransportSpec::parse("RAW/RAW/UDP;unicast").is_none());
    /// ```
    pub fn parse(spec: &str) -> Option<Self> {
        let mut parts = spec.split(';').map(str::trim);
        let profile = parts.next()?.to_ascii_uppercase();
        let lower = match profile.as_str() {
            "RTP/AVP" | "RTP/AVP/UDP" => LowerTransport::Udp,
            "RTP/AVP/TCP" => LowerTransport::Tcp,
            _ => return None,
        };

        let mut parsed = Self::new(lower);
        for part in parts {
            let (key, value) = part.split_once('=').unwrap_or((part, ""));
            match key.to_ascii_lowercase().as_str() {
                "unicast" => parsed.multicast = false,
                "multicast" => parsed.multicast = true,
                "interleaved" => parsed.interleaved = Some(ChannelPair::parse(value)?),
                "client_port" => parsed.client_port = Some(PortPair::parse(value)?),
                "server_port" => parsed.server_port = Some(PortPair::parse(value)?),
                "port" => parsed.port = Some(PortPair::parse(value)?),
                "ssrc" => parsed.ssrc = Some(u32::from_str_radix(value.trim(), 16).ok()?),
                _ => {}
            }
        }
        Some(parsed)
    }

    /// Parse every comma-separated offer, keeping client preference order.
    pub fn parse_offers(header: &str) -> Vec<Self> {
        header
            .split(',')
            .filter(|offer| !offer.trim().is_empty())
            .filter_map(|offer| {
                let parsed = Self::parse(offer);
                if parsed.is_none() {
                    tracing::debug!(offer = offer.trim(), "ignoring unparseable transport offer");
                }
                parsed
            })
            .collect()
    }
}

impl fmt::Display for TransportSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.lower {
            LowerTransport::Udp => f.write_str("RTP/AVP")?,
            LowerTransport::Tcp => f.write_str("RTP/AVP/TCP")?,
        }
        f.write_str(if self.multicast { ";multicast" } else { ";unicast" })?;
        if let Some(channels) = self.interleaved {
            write!(f, ";interleaved={channels}")?;
        }
        if let Some(ports) = self.client_port {
            write!(f, ";client_port={ports}")?;
        }
        if let Some(ports) = self.server_port {
            write!(f, ";server_port={ports}")?;
        }
        if let Some(ports) = self.port {
            write!(f, ";port={ports}")?;
        }
        if let Some(ssrc) = self.ssrc {
            write!(f, ";ssrc={ssrc:08X}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_udp_unicast() {
        let spec = TransportSpec::parse("RTP/AVP;unicast;client_port=5000-5001").unwrap();
        assert_eq!(spec.lower, LowerTransport::Udp);
        assert!(!spec.multicast);
        assert_eq!(spec.client_port, Some(PortPair::new(5000, 5001)));
        assert_eq!(spec.interleaved, None);
    }

    #[test]
    fn parse_tcp_interleaved() {
        let spec = TransportSpec::parse("RTP/AVP/TCP;unicast;interleaved=2-3").unwrap();
        assert_eq!(spec.lower, LowerTransport::Tcp);
        assert_eq!(spec.interleaved, Some(ChannelPair::new(2, 3)));
    }

    #[test]
    fn parse_multicast() {
        let spec = TransportSpec::parse("RTP/AVP;multicast;port=7000-7001").unwrap();
        assert!(spec.multicast);
        assert_eq!(spec.port, Some(PortPair::new(7000, 7001)));
    }

    #[test]
    fn single_port_implies_pair() {
        let spec = TransportSpec::parse("RTP/AVP;unicast;client_port=6000").unwrap();
        assert_eq!(spec.client_port, Some(PortPair::new(6000, 6001)));
    }

    #[test]
    fn malformed_port_rejects_offer() {
        assert!(TransportSpec::parse("RTP/AVP;unicast;client_port=abc-def").is_none());
    }

    #[test]
    fn parse_no_client_port() {
        let spec = TransportSpec::parse("RTP/AVP;unicast").unwrap();
        assert!(spec.client_port.is_none());
    }

    #[test]
    fn parse_multiple_offers_in_order() {
        let offers = TransportSpec::parse_offers(
            "RTP/AVP;multicast, bogus, RTP/AVP/TCP;unicast;interleaved=0-1",
        );
        assert_eq!(offers.len(), 2);
        assert!(offers[0].multicast);
        assert_eq!(offers[1].lower, LowerTransport::Tcp);
    }

    #[test]
    fn display_udp_reply() {
        let mut reply = TransportSpec::new(LowerTransport::Udp);
        reply.client_port = Some(PortPair::new(5000, 5001));
        reply.server_port = Some(PortPair::new(50000, 50001));
        reply.ssrc = Some(0x4321FADE);
        assert_eq!(
            reply.to_string(),
            "RTP/AVP;unicast;client_port=5000-5001;server_port=50000-50001;ssrc=4321FADE"
        );
    }

    #[test]
    fn display_then_parse_interleaved() {
        let mut reply = TransportSpec::new(LowerTransport::Tcp);
        reply.interleaved = Some(ChannelPair::new(0, 1));
        reply.ssrc = Some(0xA);
        assert_eq!(reply.to_string(), "RTP/AVP/TCP;unicast;interleaved=0-1;ssrc=0000000A");
        assert_eq!(TransportSpec::parse(&reply.to_string()), Some(reply));
    }
}
