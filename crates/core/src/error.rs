//! Error types for the RTSP publishing library.

use std::fmt;
use std::io;

use crate::session::SessionState;

/// Errors that can occur while extracting parameter sets or publishing.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Media**: [`MalformedPacket`](Self::MalformedPacket): an RTP packet
///   or H.264 payload that cannot be parsed. The depacketizer swallows these.
/// - **Track**: [`InvalidTrack`](Self::InvalidTrack): a track description
///   violating its construction contract.
/// - **Protocol**: [`Protocol`](Self::Protocol), [`Parse`](Self::Parse),
///   [`TransportRejected`](Self::TransportRejected): the server replied
///   with a failure or with something unparseable.
/// - **Transport**: [`Io`](Self::Io), [`Timeout`](Self::Timeout): socket
///   failures and expired read/write deadlines.
/// - **Session**: [`InvalidState`](Self::InvalidState),
///   [`TrackNotFound`](Self::TrackNotFound),
///   [`FrameTooLarge`](Self::FrameTooLarge): misuse detected before any I/O.
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(io::Error),

    /// A blocking read, write or connect exceeded its configured deadline.
    #[error("operation timed out")]
    Timeout,

    /// The server answered with a status code outside 200–299.
    #[error("server replied {status} {reason}")]
    Protocol { status: u16, reason: String },

    /// Failed to parse an RTSP message.
    #[error("RTSP parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// The server refused the requested transport (461 Unsupported Transport).
    #[error("transport rejected by server: {0}")]
    TransportRejected(String),

    /// Track parameters violate the track contract.
    #[error("invalid track: {0}")]
    InvalidTrack(String),

    /// A session method was called in a state that does not allow it.
    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// The control URL is not a usable `rtsp://host[:port]/path` URL.
    #[error("invalid RTSP URL: {0}")]
    InvalidUrl(String),

    /// An RTP packet or its H.264 payload could not be parsed.
    #[error("malformed packet: {0}")]
    MalformedPacket(&'static str),

    /// No announced track has this ID.
    #[error("track not found: {0}")]
    TrackNotFound(usize),

    /// Payload exceeds the 16-bit length field of interleaved framing.
    #[error("frame of {0} bytes does not fit an interleaved frame")]
    FrameTooLarge(usize),

    /// No free even/odd UDP port pair could be bound.
    #[error("no free RTP/RTCP port pair found")]
    PortRangeExhausted,
}

impl From<io::Error> for RtspError {
    /// Std sockets report an expired read/write timeout as `WouldBlock`
    /// (Unix) or `TimedOut` (Windows).
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => RtspError::Timeout,
            _ => RtspError::Io(err),
        }
    }
}

impl RtspError {
    /// Build a [`Parse`](Self::Parse) error of the given kind.
    pub fn parse(kind: ParseErrorKind) -> Self {
        RtspError::Parse { kind }
    }
}

/// Specific kind of RTSP parse failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Input was empty (no start line).
    EmptyMessage,
    /// Request line did not have the expected `Method URI Version` format.
    InvalidRequestLine,
    /// Status line did not have the expected `RTSP/1.0 Code Reason` format.
    InvalidStatusLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// `Content-Length` was not a number or exceeds the body limit.
    InvalidContentLength,
    /// Status line and headers exceed the header limit.
    MessageTooLarge,
    /// SETUP reply had no usable `Transport` header.
    InvalidTransport,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "empty message"),
            Self::InvalidRequestLine => write!(f, "invalid request line"),
            Self::InvalidStatusLine => write!(f, "invalid status line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::InvalidContentLength => write!(f, "invalid Content-Length"),
            Self::MessageTooLarge => write!(f, "message header too large"),
            Self::InvalidTransport => write!(f, "missing or invalid Transport header"),
        }
    }
}

/// Convenience alias for `Result<T, RtspError>`.
pub type Result<T> = std::result::Result<T, RtspError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_timeouts_map_to_timeout() {
        let would_block: RtspError = io::Error::from(io::ErrorKind::WouldBlock).into();
        assert!(matches!(would_block, RtspError::Timeout));

        let timed_out: RtspError = io::Error::from(io::ErrorKind::TimedOut).into();
        assert!(matches!(timed_out, RtspError::Timeout));
    }

    #[test]
    fn other_io_errors_stay_io() {
        let refused: RtspError = io::Error::from(io::ErrorKind::ConnectionRefused).into();
        assert!(matches!(refused, RtspError::Io(_)));
    }
}
