use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::protocol::request::USER_AGENT;
use crate::session::{PublishSession, TransportPreference};
use crate::track::Track;

/// Client-side options for a publish session.
///
/// Timeouts are per operation: `read_timeout` bounds each handshake round
/// trip (OPTIONS, ANNOUNCE, SETUP, RECORD) and `write_timeout` each
/// request or media write.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Deadline for opening the TCP control connection.
    pub connect_timeout: Duration,
    /// Deadline for each response read.
    pub read_timeout: Duration,
    /// Deadline for each write, including every published frame.
    pub write_timeout: Duration,
    /// UDP, TCP, or automatic choice with TCP fallback.
    pub transport: TransportPreference,
    /// `User-Agent` request header.
    pub user_agent: String,
    /// SDP origin username field (`o=<username> ...`).
    pub sdp_username: String,
    /// SDP session name (`s=`).
    pub sdp_session_name: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            transport: TransportPreference::Auto,
            user_agent: USER_AGENT.to_string(),
            sdp_username: "-".to_string(),
            sdp_session_name: "Stream".to_string(),
        }
    }
}

impl ClientConfig {
    /// Connect to `url`, announce `tracks`, set them up and start recording.
    ///
    /// Returns a session in the Recording state, ready for
    /// [`PublishSession::publish_frame`].
    pub fn dial_publish(&self, url: &str, tracks: &[Arc<Track>]) -> Result<PublishSession> {
        let mut session = PublishSession::new(self.clone());
        session.connect(url)?;
        session.options()?;
        session.announce(tracks)?;
        session.setup(self.transport)?;
        session.record()?;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.read_timeout, Duration::from_secs(10));
        assert_eq!(config.write_timeout, Duration::from_secs(10));
        assert_eq!(config.transport, TransportPreference::Auto);
        assert_eq!(config.user_agent, "rtsp-publish/0.1");
    }
}
