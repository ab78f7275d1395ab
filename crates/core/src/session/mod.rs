//! RTSP publish session (RFC 2326 §10, record mode).
//!
//! A [`PublishSession`] walks the client side of the record handshake and
//! then forwards media:
//!
//! ```text
//! Unconnected --connect--> Connected --announce--> Announced
//! Announced --setup--> Announced --record--> Recording
//! Recording --publish_frame--> Recording
//! any --close--> Closed
//! any --I/O or protocol failure--> Failed
//! ```
//!
//! Every method checks the current state first and fails with
//! [`RtspError::InvalidState`] without touching the network when the call
//! is out of order. Failed and Closed are terminal: the connection and all
//! transport channels are released, and a new session is needed to retry.
//!
//! ## Transport selection
//!
//! [`setup`](PublishSession::setup) negotiates one transport for all tracks.
//! With [`TransportPreference::Auto`] the first track asks for UDP; if the
//! server answers `461 Unsupported Transport`, that SETUP is retried once
//! with TCP interleaving and every track uses TCP. No other request is ever
//! retried.

pub mod transport;

use std::fmt;
use std::sync::Arc;

use crate::client::ClientConfig;
use crate::error::{ParseErrorKind, Result, RtspError};
use crate::media::h264::H264Packetizer;
use crate::protocol::{RtspRequest, RtspResponse, RtspUrl, sdp};
use crate::track::Track;
use crate::transport::{ChannelKind, ControlConnection, TransportChannel, UdpChannel};

pub use transport::{StreamProtocol, TransportHeader, TransportPreference};

/// Lifecycle state of a [`PublishSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, no control connection yet.
    Unconnected,
    /// Control connection open.
    Connected,
    /// Tracks announced; transports may be set up.
    Announced,
    /// RECORD accepted; media may be published.
    Recording,
    /// Closed by the caller.
    Closed,
    /// A fatal error occurred; the session is unusable.
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unconnected => "unconnected",
            Self::Connected => "connected",
            Self::Announced => "announced",
            Self::Recording => "recording",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Interleaved channel IDs are a byte and each track takes two.
const MAX_TRACKS: usize = 128;

/// Client side of an RTSP record session.
///
/// Used by one producer at a time; every method takes `&mut self`.
pub struct PublishSession {
    config: ClientConfig,
    state: SessionState,
    url: Option<RtspUrl>,
    control: Option<ControlConnection>,
    cseq: u32,
    session_id: Option<String>,
    tracks: Vec<Arc<Track>>,
    protocol: Option<StreamProtocol>,
    /// Indexed by track ID once SETUP has completed.
    channels: Vec<TransportChannel>,
}

impl PublishSession {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            state: SessionState::Unconnected,
            url: None,
            control: None,
            cseq: 0,
            session_id: None,
            tracks: Vec::new(),
            protocol: None,
            channels: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Transport negotiated by [`setup`](Self::setup), if it has run.
    pub fn protocol(&self) -> Option<StreamProtocol> {
        self.protocol
    }

    /// Announced tracks; a track's ID is its index.
    pub fn tracks(&self) -> &[Arc<Track>] {
        &self.tracks
    }

    /// Server-assigned session identifier from the first SETUP reply.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Open the control connection to `url` (`rtsp://host[:port]/path`).
    pub fn connect(&mut self, url: &str) -> Result<()> {
        self.expect_state("connect", &[SessionState::Unconnected])?;
        let url = RtspUrl::parse(url)?;

        let conn = match ControlConnection::connect(&url.socket_addr(), self.config.connect_timeout)
        {
            Ok(conn) => conn,
            Err(e) => return Err(self.fail("connect", e)),
        };
        if let Err(e) = conn.set_timeouts(self.config.read_timeout, self.config.write_timeout) {
            return Err(self.fail("connect", e));
        }

        tracing::info!(%url, peer = %conn.peer_addr(), "control connection established");
        self.control = Some(conn);
        self.url = Some(url);
        self.state = SessionState::Connected;
        Ok(())
    }

    /// Probe the server with OPTIONS. A 404 is tolerated; servers may not
    /// implement OPTIONS on a publishing path.
    pub fn options(&mut self) -> Result<()> {
        self.expect_state("send OPTIONS", &[SessionState::Connected])?;
        let uri = self.base_url();

        let resp = self.request(RtspRequest::new("OPTIONS", &uri))?;
        if !resp.is_success() && resp.status_code != 404 {
            return Err(self.fail("OPTIONS", protocol_error(&resp)));
        }
        if let Some(public) = resp.get_header("Public") {
            tracing::debug!(public, "server methods");
        }
        Ok(())
    }

    /// Send ANNOUNCE with an SDP body describing `tracks`. Track IDs are
    /// assigned in order, starting at 0.
    pub fn announce(&mut self, tracks: &[Arc<Track>]) -> Result<()> {
        self.expect_state("announce", &[SessionState::Connected])?;
        if tracks.is_empty() || tracks.len() > MAX_TRACKS {
            return Err(RtspError::InvalidTrack(format!(
                "cannot announce {} tracks",
                tracks.len()
            )));
        }

        let host = self.local_host();
        let body = sdp::generate_sdp(
            tracks,
            &host,
            &self.config.sdp_username,
            &self.config.sdp_session_name,
        );
        let uri = self.base_url();
        let request = RtspRequest::new("ANNOUNCE", &uri)
            .add_header("Content-Type", "application/sdp")
            .with_body(body);

        let resp = self.request(request)?;
        if !resp.is_success() {
            return Err(self.fail("ANNOUNCE", protocol_error(&resp)));
        }

        self.tracks = tracks.to_vec();
        self.state = SessionState::Announced;
        tracing::info!(tracks = tracks.len(), "tracks announced");
        Ok(())
    }

    /// SETUP every announced track with one transport for the whole session.
    pub fn setup(&mut self, preference: TransportPreference) -> Result<()> {
        self.expect_state("setup", &[SessionState::Announced])?;
        if !self.channels.is_empty() {
            return Err(RtspError::InvalidState {
                operation: "setup twice",
                state: self.state,
            });
        }

        let mut protocol = match preference {
            TransportPreference::Tcp => StreamProtocol::Tcp,
            TransportPreference::Auto | TransportPreference::Udp => StreamProtocol::Udp,
        };

        for track_id in 0..self.tracks.len() {
            let channel = match self.setup_track(track_id, protocol) {
                Ok(channel) => channel,
                Err(RtspError::TransportRejected(reason))
                    if preference == TransportPreference::Auto
                        && protocol == StreamProtocol::Udp
                        && track_id == 0 =>
                {
                    tracing::warn!(%reason, "UDP transport rejected, retrying with TCP");
                    protocol = StreamProtocol::Tcp;
                    match self.setup_track(track_id, protocol) {
                        Ok(channel) => channel,
                        Err(e) => return Err(self.fail("SETUP", e)),
                    }
                }
                Err(e) => return Err(self.fail("SETUP", e)),
            };
            self.channels.push(channel);
        }

        self.protocol = Some(protocol);
        tracing::info!(%protocol, tracks = self.channels.len(), "transport negotiated");
        Ok(())
    }

    /// Send RECORD. On success media may be published.
    pub fn record(&mut self) -> Result<()> {
        self.expect_state("record", &[SessionState::Announced])?;
        if self.channels.len() != self.tracks.len() {
            return Err(RtspError::InvalidState {
                operation: "record before setup",
                state: self.state,
            });
        }

        let uri = self.base_url();
        let resp = self.request(RtspRequest::new("RECORD", &uri))?;
        if !resp.is_success() {
            return Err(self.fail("RECORD", protocol_error(&resp)));
        }

        self.state = SessionState::Recording;
        tracing::info!(session_id = ?self.session_id, "recording");
        Ok(())
    }

    /// Forward one RTP (or RTCP) packet for `track_id`.
    ///
    /// Nothing is buffered or retried. A failed or timed-out write moves the
    /// session to [`SessionState::Failed`].
    pub fn publish_frame(&mut self, track_id: usize, kind: ChannelKind, payload: &[u8]) -> Result<()> {
        self.expect_state("publish", &[SessionState::Recording])?;
        let channel = self
            .channels
            .get(track_id)
            .ok_or(RtspError::TrackNotFound(track_id))?;
        if matches!(channel, TransportChannel::Interleaved(_)) && payload.len() > u16::MAX as usize {
            return Err(RtspError::FrameTooLarge(payload.len()));
        }

        match channel.send(kind, payload) {
            Ok(()) => {
                tracing::trace!(track_id, ?kind, len = payload.len(), "frame published");
                Ok(())
            }
            Err(e) => Err(self.fail("publish", e)),
        }
    }

    /// Packetize an Annex B access unit with `packetizer` and publish every
    /// resulting RTP packet on `track_id`.
    pub fn publish_access_unit(
        &mut self,
        track_id: usize,
        packetizer: &mut H264Packetizer,
        access_unit: &[u8],
        timestamp_increment: u32,
    ) -> Result<()> {
        self.expect_state("publish", &[SessionState::Recording])?;
        if track_id >= self.channels.len() {
            return Err(RtspError::TrackNotFound(track_id));
        }

        for packet in packetizer.packetize(access_unit, timestamp_increment) {
            self.publish_frame(track_id, ChannelKind::Media, &packet)?;
        }
        Ok(())
    }

    /// Tear the session down and release the connection and all channels.
    /// Safe to call in any state; TEARDOWN is best-effort.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }

        let has_server_session = matches!(
            self.state,
            SessionState::Announced | SessionState::Recording
        );
        if has_server_session && self.control.is_some() {
            let uri = self.base_url();
            if let Err(e) = self.exchange(RtspRequest::new("TEARDOWN", &uri)) {
                tracing::debug!(error = %e, "TEARDOWN failed");
            }
        }

        self.release();
        tracing::info!(from = %self.state, "session closed");
        self.state = SessionState::Closed;
    }

    /// SETUP one track without touching session state on failure.
    fn setup_track(&mut self, track_id: usize, protocol: StreamProtocol) -> Result<TransportChannel> {
        let (local_ip, server_ip) = {
            let control = self.control_ref()?;
            (control.local_addr().ip(), control.peer_addr().ip())
        };

        let (header, udp) = match protocol {
            StreamProtocol::Udp => {
                let channel = UdpChannel::bind_pair(local_ip)?;
                let (rtp, rtcp) = channel.local_ports()?;
                (TransportHeader::udp(rtp, rtcp), Some(channel))
            }
            StreamProtocol::Tcp => {
                let rtp = (track_id * 2) as u8;
                (TransportHeader::tcp(rtp, rtp + 1), None)
            }
        };

        let uri = self.track_url(track_id);
        let request =
            RtspRequest::new("SETUP", &uri).add_header("Transport", &header.to_request_value());
        let resp = self.exchange(request)?;

        if resp.status_code == 461 {
            return Err(RtspError::TransportRejected(format!(
                "{} for {protocol}",
                resp.status_text
            )));
        }
        if !resp.is_success() {
            return Err(protocol_error(&resp));
        }

        if self.session_id.is_none() {
            self.session_id = resp.session_id().map(str::to_string);
        }

        let reply = resp
            .get_header("Transport")
            .and_then(TransportHeader::parse)
            .ok_or(RtspError::parse(ParseErrorKind::InvalidTransport))?;

        tracing::debug!(track_id, %protocol, transport = ?reply, "track set up");

        match udp {
            Some(mut channel) => {
                let server_ports = reply
                    .server_port
                    .ok_or(RtspError::parse(ParseErrorKind::InvalidTransport))?;
                channel.set_peer(server_ip, server_ports, self.config.write_timeout)?;
                Ok(TransportChannel::Udp(channel))
            }
            None => {
                let (rtp, rtcp) = reply.interleaved.or(header.interleaved).unwrap_or_default();
                Ok(TransportChannel::Interleaved(
                    self.control_ref()?.interleaved(rtp, rtcp),
                ))
            }
        }
    }

    /// Send a request and fail the session if the round trip errors.
    fn request(&mut self, request: RtspRequest) -> Result<RtspResponse> {
        let method = request.method.clone();
        match self.exchange(request) {
            Ok(resp) => Ok(resp),
            Err(e) => Err(self.fail(&method, e)),
        }
    }

    /// One request/response round trip with the common headers filled in.
    fn exchange(&mut self, request: RtspRequest) -> Result<RtspResponse> {
        self.cseq += 1;
        let mut request = request
            .add_header("CSeq", &self.cseq.to_string())
            .add_header("User-Agent", &self.config.user_agent);
        if let Some(id) = &self.session_id {
            request = request.add_header("Session", id);
        }

        let state = self.state;
        let control = self.control.as_mut().ok_or(RtspError::InvalidState {
            operation: "send a request",
            state,
        })?;

        tracing::debug!(method = %request.method, uri = %request.uri, cseq = self.cseq, "request");
        control.send(&request)?;
        let resp = control.read_response()?;
        tracing::debug!(status = resp.status_code, cseq = ?resp.get_header("CSeq"), "response");
        Ok(resp)
    }

    /// Move to Failed, releasing every resource, and hand `err` back.
    fn fail(&mut self, operation: &str, err: RtspError) -> RtspError {
        tracing::warn!(operation, from = %self.state, error = %err, "session failed");
        self.release();
        self.state = SessionState::Failed;
        err
    }

    fn release(&mut self) {
        self.channels.clear();
        if let Some(control) = self.control.take() {
            control.shutdown();
        }
    }

    fn expect_state(&self, operation: &'static str, allowed: &[SessionState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(RtspError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn control_ref(&self) -> Result<&ControlConnection> {
        self.control.as_ref().ok_or(RtspError::InvalidState {
            operation: "use the control connection",
            state: self.state,
        })
    }

    fn base_url(&self) -> String {
        self.url.as_ref().map(ToString::to_string).unwrap_or_default()
    }

    fn track_url(&self, track_id: usize) -> String {
        self.url
            .as_ref()
            .map(|u| u.track_url(track_id))
            .unwrap_or_default()
    }

    fn local_host(&self) -> String {
        self.control
            .as_ref()
            .map_or_else(|| "0.0.0.0".to_string(), |c| c.local_addr().ip().to_string())
    }
}

fn protocol_error(resp: &RtspResponse) -> RtspError {
    RtspError::Protocol {
        status: resp.status_code,
        reason: resp.status_text.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::NalUnit;

    fn track() -> Arc<Track> {
        Arc::new(
            Track::new(
                96,
                NalUnit::new(vec![0x67, 0x42, 0x00, 0x1e]),
                NalUnit::new(vec![0x68, 0xce, 0x38, 0x80]),
            )
            .unwrap(),
        )
    }

    fn invalid_state(result: Result<()>) -> bool {
        matches!(result, Err(RtspError::InvalidState { .. }))
    }

    #[test]
    fn starts_unconnected() {
        let session = PublishSession::new(ClientConfig::default());
        assert_eq!(session.state(), SessionState::Unconnected);
        assert!(session.protocol().is_none());
    }

    #[test]
    fn out_of_order_calls_fail_without_io() {
        let mut session = PublishSession::new(ClientConfig::default());
        assert!(invalid_state(session.record()));
        assert!(invalid_state(session.announce(&[track()])));
        assert!(invalid_state(session.setup(TransportPreference::Auto)));
        assert!(invalid_state(session.options()));
        assert!(invalid_state(session.publish_frame(0, ChannelKind::Media, &[0x80])));
        assert_eq!(session.state(), SessionState::Unconnected);
    }

    #[test]
    fn invalid_url_keeps_state() {
        let mut session = PublishSession::new(ClientConfig::default());
        assert!(matches!(
            session.connect("http://example.com/"),
            Err(RtspError::InvalidUrl(_))
        ));
        assert_eq!(session.state(), SessionState::Unconnected);
    }

    #[test]
    fn refused_connection_fails_session() {
        // Bind then drop to obtain a port with nothing listening.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let mut session = PublishSession::new(ClientConfig::default());
        assert!(session.connect(&format!("rtsp://127.0.0.1:{port}/s")).is_err());
        assert_eq!(session.state(), SessionState::Failed);
        assert!(invalid_state(session.connect("rtsp://127.0.0.1/s")));
    }

    #[test]
    fn close_from_any_state_is_terminal() {
        let mut session = PublishSession::new(ClientConfig::default());
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(invalid_state(session.connect("rtsp://127.0.0.1/s")));
    }
}
