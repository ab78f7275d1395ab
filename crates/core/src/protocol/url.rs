use std::fmt;

use crate::error::{Result, RtspError};

/// Default RTSP port (RFC 2326 §3.2).
pub const DEFAULT_RTSP_PORT: u16 = 554;

/// An `rtsp://host[:port][/path]` control URL.
///
/// ```
/// use rtsp_publish::protocol::RtspUrl;
///
/// let url = RtspUrl::parse("rtsp://localhost:8554/mystream").unwrap();
/// assert_eq!(url.host(), "localhost");
/// assert_eq!(url.port(), 8554);
/// assert_eq!(url.track_url(0), "rtsp://localhost:8554/mystream/trackID=0");
///
/// assert!(RtspUrl::parse("http://localhost/").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtspUrl {
    host: String,
    port: u16,
    path: String,
}

impl RtspUrl {
    pub fn parse(url: &str) -> Result<Self> {
        let invalid = || RtspError::InvalidUrl(url.to_string());

        let after_scheme = url.strip_prefix("rtsp://").ok_or_else(invalid)?;
        let (authority, path) = match after_scheme.find('/') {
            Some(slash) => after_scheme.split_at(slash),
            None => (after_scheme, ""),
        };
        // Credentials are not used for publishing; drop them from the authority.
        let host_port = authority.rsplit('@').next().unwrap_or(authority);

        let (host, port) = if let Some(rest) = host_port.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
            let port = match tail.strip_prefix(':') {
                Some(p) => p.parse().map_err(|_| invalid())?,
                None if tail.is_empty() => DEFAULT_RTSP_PORT,
                None => return Err(invalid()),
            };
            (host, port)
        } else {
            match host_port.split_once(':') {
                Some((host, p)) => (host, p.parse().map_err(|_| invalid())?),
                None => (host_port, DEFAULT_RTSP_PORT),
            }
        };

        if host.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            host: host.to_string(),
            port,
            path: path.trim_end_matches('/').to_string(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Path without trailing slash, e.g. `/mystream` (empty for the root).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// `host:port` form accepted by `ToSocketAddrs`.
    pub fn socket_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Control URL of one announced track (`<url>/trackID=<id>`).
    pub fn track_url(&self, track_id: usize) -> String {
        format!("{self}/{}", track_control(track_id))
    }
}

/// Value of the SDP `a=control` attribute for a track.
pub fn track_control(track_id: usize) -> String {
    format!("trackID={track_id}")
}

impl fmt::Display for RtspUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rtsp://{}{}", self.socket_addr(), self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port() {
        let url = RtspUrl::parse("rtsp://camera.local/live").unwrap();
        assert_eq!(url.port(), DEFAULT_RTSP_PORT);
        assert_eq!(url.to_string(), "rtsp://camera.local:554/live");
    }

    #[test]
    fn no_path() {
        let url = RtspUrl::parse("rtsp://127.0.0.1:8554").unwrap();
        assert_eq!(url.path(), "");
        assert_eq!(url.track_url(1), "rtsp://127.0.0.1:8554/trackID=1");
    }

    #[test]
    fn strips_credentials_and_trailing_slash() {
        let url = RtspUrl::parse("rtsp://user:pw@10.0.0.2:8554/a/b/").unwrap();
        assert_eq!(url.host(), "10.0.0.2");
        assert_eq!(url.path(), "/a/b");
    }

    #[test]
    fn ipv6_host() {
        let url = RtspUrl::parse("rtsp://[::1]:8554/s").unwrap();
        assert_eq!(url.host(), "::1");
        assert_eq!(url.socket_addr(), "[::1]:8554");
    }

    #[test]
    fn rejects_bad_urls() {
        assert!(RtspUrl::parse("rtsps://h/x").is_err());
        assert!(RtspUrl::parse("rtsp:///x").is_err());
        assert!(RtspUrl::parse("rtsp://h:port/x").is_err());
        assert!(RtspUrl::parse("rtsp://[::1/x").is_err());
    }
}
