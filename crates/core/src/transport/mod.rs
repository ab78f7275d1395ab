//! Network transport for RTSP signaling and RTP media delivery.
//!
//! - **TCP** ([`tcp`]): the RTSP control connection. In interleaved mode
//!   (RFC 2326 §10.12) RTP/RTCP also travel on it, each frame prefixed with
//!   `$`, a channel byte and a 16-bit length.
//!
//! - **UDP** ([`udp`]): one RTP and one RTCP socket per track, sending to
//!   the server ports announced in the SETUP reply.
//!
//! [`TransportChannel`] hides the difference from the session: it routes a
//! payload to the media or control channel of one track.

pub mod tcp;
pub mod udp;

use crate::error::Result;

pub use tcp::{ControlConnection, InterleavedChannel};
pub use udp::UdpChannel;

/// Which of a track's two RTP channels a payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// RTP media packets.
    Media,
    /// RTCP packets. Routed to their own channel; no RTCP semantics applied.
    Control,
}

/// Bound per-track carriage for outgoing RTP/RTCP.
#[derive(Debug)]
pub enum TransportChannel {
    Udp(UdpChannel),
    Interleaved(InterleavedChannel),
}

impl TransportChannel {
    /// Write one payload to the given channel. Blocks at most for the write
    /// timeout configured on the underlying socket.
    pub fn send(&self, kind: ChannelKind, payload: &[u8]) -> Result<()> {
        match self {
            Self::Udp(ch) => ch.send(kind, payload),
            Self::Interleaved(ch) => ch.send(kind, payload),
        }
    }
}
