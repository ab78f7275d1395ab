use std::fmt;
use std::str::FromStr;

/// How RTP travels to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamProtocol {
    /// Separate RTP and RTCP datagram sockets per track.
    Udp,
    /// RTP/RTCP interleaved on the RTSP control connection (RFC 2326 §10.12).
    Tcp,
}

impl fmt::Display for StreamProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Udp => write!(f, "UDP"),
            Self::Tcp => write!(f, "TCP"),
        }
    }
}

/// Caller's transport choice for a session.
///
/// `Auto` tries UDP and falls back to TCP once if the server answers
/// `461 Unsupported Transport`. Whatever is chosen applies to every track
/// of the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportPreference {
    #[default]
    Auto,
    Udp,
    Tcp,
}

impl FromStr for TransportPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "udp" => Ok(Self::Udp),
            "tcp" => Ok(Self::Tcp),
            other => Err(format!("unknown transport '{other}' (expected auto, udp or tcp)")),
        }
    }
}

/// Parameters of an RTSP `Transport` header (RFC 2326 §12.39), as far as a
/// publisher cares about them.
///
/// ## Wire format examples
///
/// ```text
/// Client → Server (UDP):
///   Transport: RTP/AVP;unicast;client_port=40000-40001;mode=record
/// Server → Client:
///   Transport: RTP/AVP;unicast;client_port=40000-40001;server_port=5000-5001
///
/// Client → Server (TCP):
///   Transport: RTP/AVP/TCP;unicast;interleaved=0-1;mode=record
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportHeader {
    pub protocol: StreamProtocol,
    pub client_port: Option<(u16, u16)>,
    pub server_port: Option<(u16, u16)>,
    pub interleaved: Option<(u8, u8)>,
}

impl TransportHeader {
    /// Request for a UDP port pair bound by the client.
    pub fn udp(rtp_port: u16, rtcp_port: u16) -> Self {
        Self {
            protocol: StreamProtocol::Udp,
            client_port: Some((rtp_port, rtcp_port)),
            server_port: None,
            interleaved: None,
        }
    }

    /// Request for an interleaved channel pair.
    pub fn tcp(rtp_channel: u8, rtcp_channel: u8) -> Self {
        Self {
            protocol: StreamProtocol::Tcp,
            client_port: None,
            server_port: None,
            interleaved: Some((rtp_channel, rtcp_channel)),
        }
    }

    /// Header value for a SETUP request in record mode.
    pub fn to_request_value(&self) -> String {
        let mut value = match self.protocol {
            StreamProtocol::Udp => "RTP/AVP;unicast".to_string(),
            StreamProtocol::Tcp => "RTP/AVP/TCP;unicast".to_string(),
        };
        if let Some((rtp, rtcp)) = self.client_port {
            value.push_str(&format!(";client_port={rtp}-{rtcp}"));
        }
        if let Some((rtp, rtcp)) = self.interleaved {
            value.push_str(&format!(";interleaved={rtp}-{rtcp}"));
        }
        value.push_str(";mode=record");
        value
    }

    /// Parse a `Transport` header value.
    ///
    /// Only the first transport spec of a comma-separated list is read.
    ///
    /// ```
    /// use rtsp_publish::session::transport::{StreamProtocol, TransportHeader};
    ///
    /// let th = TransportHeader::parse("RTP/AVP;unicast;client_port=8000-8001;server_port=9000-9001").unwrap();
    /// assert_eq!(th.protocol, StreamProtocol::Udp);
    /// assert_eq!(th.server_port, Some((9000, 9001)));
    ///
    /// let th = TransportHeader::parse("RTP/AVP/TCP;unicast;interleaved=2-3").unwrap();
    /// assert_eq!(th.interleaved, Some((2, 3)));
    ///
    /// assert!(TransportHeader::parse("RAW/RAW/UDP;unicast").is_none());
    /// ```
    pub fn parse(header: &str) -> Option<Self> {
        let spec = header.split(',').next()?;
        let mut parts = spec.split(';').map(str::trim);

        let protocol = match parts.next()? {
            "RTP/AVP" | "RTP/AVP/UDP" => StreamProtocol::Udp,
            "RTP/AVP/TCP" => StreamProtocol::Tcp,
            _ => return None,
        };

        let mut th = Self {
            protocol,
            client_port: None,
            server_port: None,
            interleaved: None,
        };

        for part in parts {
            if let Some(v) = part.strip_prefix("client_port=") {
                th.client_port = Some(parse_pair(v)?);
            } else if let Some(v) = part.strip_prefix("server_port=") {
                th.server_port = Some(parse_pair(v)?);
            } else if let Some(v) = part.strip_prefix("interleaved=") {
                th.interleaved = Some(parse_pair(v)?);
            }
        }

        Some(th)
    }
}

/// Parse `a-b`, or a lone `a` meaning `a-(a+1)`.
fn parse_pair<T>(value: &str) -> Option<(T, T)>
where
    T: FromStr + Copy + TryFrom<u32>,
    u32: From<T>,
{
    match value.split_once('-') {
        Some((a, b)) => Some((a.trim().parse().ok()?, b.trim().parse().ok()?)),
        None => {
            let a: T = value.trim().parse().ok()?;
            let next = T::try_from(u32::from(a) + 1).ok()?;
            Some((a, next))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn udp_request_value() {
        assert_eq!(
            TransportHeader::udp(40000, 40001).to_request_value(),
            "RTP/AVP;unicast;client_port=40000-40001;mode=record"
        );
    }

    #[test]
    fn tcp_request_value() {
        assert_eq!(
            TransportHeader::tcp(2, 3).to_request_value(),
            "RTP/AVP/TCP;unicast;interleaved=2-3;mode=record"
        );
    }

    #[test]
    fn parse_udp_reply() {
        let th = TransportHeader::parse(
            "RTP/AVP/UDP;unicast;client_port=5000-5001;server_port=6970-6971;ssrc=1234",
        )
        .unwrap();
        assert_eq!(th.protocol, StreamProtocol::Udp);
        assert_eq!(th.client_port, Some((5000, 5001)));
        assert_eq!(th.server_port, Some((6970, 6971)));
    }

    #[test]
    fn parse_single_value_pairs() {
        let th = TransportHeader::parse("RTP/AVP/TCP;interleaved=4").unwrap();
        assert_eq!(th.interleaved, Some((4, 5)));
        assert!(TransportHeader::parse("RTP/AVP/TCP;interleaved=255").is_none());
    }

    #[test]
    fn parse_rejects_garbage_ports() {
        assert!(TransportHeader::parse("RTP/AVP;server_port=x-y").is_none());
    }

    #[test]
    fn preference_from_str() {
        assert_eq!("TCP".parse::<TransportPreference>(), Ok(TransportPreference::Tcp));
        assert_eq!("auto".parse::<TransportPreference>(), Ok(TransportPreference::Auto));
        assert!("sctp".parse::<TransportPreference>().is_err());
    }
}
