//! H.264 media units, RTP parsing and (de)packetization.
//!
//! ## RTP overview (RFC 3550)
//!
//! A live H.264 stream arrives as RTP packets. Every packet carries a
//! 12-byte fixed header ([`rtp::RtpPacket`]) followed by an RFC 6184
//! payload:
//!
//! - **Single NAL unit** (types 1–23): the payload is the NAL unit.
//! - **STAP-A** (type 24): several small NAL units, each prefixed with a
//!   16-bit length.
//! - **FU-A** (type 28): one fragment of a NAL unit too large for a packet.
//!
//! The [`depacketizer`] turns packets back into [`NalUnit`]s; the
//! [`h264`] packetizer goes the other way.
//!
//! ## Parameter sets
//!
//! Before a stream can be announced, the server needs the Sequence and
//! Picture Parameter Sets (NAL types 7 and 8).
//! [`H264Depacketizer::read_sps_pps`](depacketizer::H264Depacketizer::read_sps_pps)
//! blocks until it has seen one of each.

pub mod depacketizer;
pub mod h264;
pub mod rtp;

use std::collections::VecDeque;
use std::io;
use std::net::UdpSocket;
use std::time::Instant;

use crate::error::{Result, RtspError};

/// Largest datagram accepted from a packet source.
pub const MAX_PACKET_SIZE: usize = 2048;

/// H.264 NAL unit type (5-bit `nal_unit_type`, ITU-T H.264 Table 7-1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalType {
    /// Type 0 and the unassigned types 30–31.
    Unspecified,
    /// Coded slice of a non-IDR picture (1).
    NonIdrSlice,
    /// Coded slice of an IDR picture (5).
    IdrSlice,
    /// Supplemental enhancement information (6).
    Sei,
    /// Sequence parameter set (7).
    Sps,
    /// Picture parameter set (8).
    Pps,
    /// Access unit delimiter (9).
    AccessUnitDelimiter,
    /// Any other assigned type, kept as its raw value.
    Other(u8),
}

impl NalType {
    /// Classify the low five bits of a NAL header byte.
    pub fn from_header(header: u8) -> Self {
        match header & 0x1f {
            0 | 30 | 31 => NalType::Unspecified,
            1 => NalType::NonIdrSlice,
            5 => NalType::IdrSlice,
            6 => NalType::Sei,
            7 => NalType::Sps,
            8 => NalType::Pps,
            9 => NalType::AccessUnitDelimiter,
            other => NalType::Other(other),
        }
    }
}

/// One complete H.264 NAL unit, header byte included, no start code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NalUnit {
    data: Vec<u8>,
}

impl NalUnit {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Type from the header byte; an empty unit is [`NalType::Unspecified`].
    pub fn nal_type(&self) -> NalType {
        self.data
            .first()
            .map_or(NalType::Unspecified, |&b| NalType::from_header(b))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Blocking pull source of raw RTP packets.
///
/// The capture side of the publisher: whatever delivers RTP/H.264 from the
/// encoder. Errors are terminal for the reader. A read timeout configured on
/// the source surfaces as [`RtspError::Timeout`](crate::RtspError::Timeout).
pub trait PacketSource {
    /// Block until the next packet arrives and return its bytes.
    fn read_packet(&mut self) -> Result<Vec<u8>>;

    /// Like [`read_packet`](Self::read_packet), but give up with
    /// [`RtspError::Timeout`] once `deadline` passes.
    ///
    /// The default only checks the deadline before blocking; sources that
    /// can bound a blocking read should override it.
    fn read_packet_until(&mut self, deadline: Instant) -> Result<Vec<u8>> {
        if Instant::now() >= deadline {
            return Err(RtspError::Timeout);
        }
        self.read_packet()
    }
}

impl PacketSource for UdpSocket {
    fn read_packet(&mut self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        let (n, _) = self.recv_from(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Narrows the socket's read timeout to the time left, restoring the
    /// caller's timeout afterwards.
    fn read_packet_until(&mut self, deadline: Instant) -> Result<Vec<u8>> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(RtspError::Timeout);
        }

        let previous = self.read_timeout()?;
        let bounded = previous.map_or(remaining, |t| t.min(remaining));
        self.set_read_timeout(Some(bounded))?;
        let result = self.read_packet();
        self.set_read_timeout(previous)?;
        result
    }
}

/// Replays a captured packet sequence; exhausting it reads as end of stream.
impl PacketSource for VecDeque<Vec<u8>> {
    fn read_packet(&mut self) -> Result<Vec<u8>> {
        self.pop_front().ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "packet source exhausted").into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nal_type_classification() {
        assert_eq!(NalType::from_header(0x67), NalType::Sps);
        assert_eq!(NalType::from_header(0x68), NalType::Pps);
        assert_eq!(NalType::from_header(0x65), NalType::IdrSlice);
        assert_eq!(NalType::from_header(0x41), NalType::NonIdrSlice);
        assert_eq!(NalType::from_header(0x06), NalType::Sei);
        assert_eq!(NalType::from_header(0x09), NalType::AccessUnitDelimiter);
        assert_eq!(NalType::from_header(0x0c), NalType::Other(12));
    }

    #[test]
    fn reserved_types_are_unspecified() {
        assert_eq!(NalType::from_header(0x00), NalType::Unspecified);
        assert_eq!(NalType::from_header(0x1e), NalType::Unspecified);
        assert_eq!(NalType::from_header(0x1f), NalType::Unspecified);
    }

    #[test]
    fn empty_nal_unit_is_unspecified() {
        assert_eq!(NalUnit::new(Vec::new()).nal_type(), NalType::Unspecified);
    }

    #[test]
    fn replay_source_drains_then_errors() {
        let mut source: VecDeque<Vec<u8>> = VecDeque::from(vec![vec![1, 2, 3]]);
        assert_eq!(source.read_packet().unwrap(), vec![1, 2, 3]);
        assert!(matches!(source.read_packet(), Err(crate::RtspError::Io(_))));
    }
}
