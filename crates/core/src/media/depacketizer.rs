use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use super::h264::{FU_A, STAP_A};
use super::rtp::RtpPacket;
use super::{NalType, NalUnit, PacketSource};
use crate::error::{Result, RtspError};

/// Largest NAL unit FU-A reassembly will buffer.
pub const MAX_NAL_SIZE: usize = 1024 * 1024;

/// In-flight FU-A reassembly for one payload type.
#[derive(Debug)]
struct Fragments {
    /// Reconstructed NAL unit so far, header byte first.
    data: Vec<u8>,
    /// Sequence number the next fragment must carry.
    next_sequence: u16,
}

/// H.264 RTP depacketizer (RFC 6184, non-interleaved mode).
///
/// Pulls packets from a [`PacketSource`] and yields complete NAL units:
///
/// - **Single NAL unit** packets are returned as-is.
/// - **STAP-A** packets are split into their aggregated units, which are
///   returned one per call in packet order.
/// - **FU-A** fragments are buffered per payload type and returned when the
///   end fragment arrives. A new start fragment discards any partial unit;
///   so does a sequence gap or a continuation without a start.
///
/// Malformed packets are logged and skipped. Errors from the source are
/// returned to the caller.
pub struct H264Depacketizer<S> {
    source: S,
    fragments: HashMap<u8, Fragments>,
    ready: VecDeque<NalUnit>,
    timeout: Option<Duration>,
    last_timestamp: u32,
}

impl<S: PacketSource> H264Depacketizer<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            fragments: HashMap::new(),
            ready: VecDeque::new(),
            timeout: None,
            last_timestamp: 0,
        }
    }

    /// Overall deadline for [`read_sps_pps`](Self::read_sps_pps). It also
    /// bounds each blocking read through
    /// [`PacketSource::read_packet_until`].
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// RTP timestamp of the packet that completed the last returned unit.
    pub fn last_timestamp(&self) -> u32 {
        self.last_timestamp
    }

    pub fn into_inner(self) -> S {
        self.source
    }

    /// Block until the next complete NAL unit is available.
    pub fn read_next_nal(&mut self) -> Result<NalUnit> {
        self.next_nal(None)
    }

    fn next_nal(&mut self, deadline: Option<Instant>) -> Result<NalUnit> {
        loop {
            if let Some(nal) = self.ready.pop_front() {
                return Ok(nal);
            }

            let raw = match deadline {
                Some(d) => self.source.read_packet_until(d)?,
                None => self.source.read_packet()?,
            };
            let packet = match RtpPacket::parse(&raw) {
                Ok(packet) => packet,
                Err(e) => {
                    tracing::trace!(error = %e, len = raw.len(), "dropping RTP packet");
                    continue;
                }
            };

            if let Err(e) = self.push(packet) {
                tracing::trace!(error = %e, "dropping H.264 payload");
            }
        }
    }

    /// Read NAL units until one SPS and one PPS have been seen, in either
    /// order. Slices and other units read meanwhile are discarded; repeated
    /// parameter sets keep the first one seen.
    ///
    /// Reassembly state is cleared before returning.
    pub fn read_sps_pps(&mut self) -> Result<(NalUnit, NalUnit)> {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut sps: Option<NalUnit> = None;
        let mut pps: Option<NalUnit> = None;

        loop {
            let nal = self.next_nal(deadline).inspect_err(|e| {
                if matches!(e, RtspError::Timeout) {
                    tracing::warn!(
                        have_sps = sps.is_some(),
                        have_pps = pps.is_some(),
                        "no SPS/PPS before deadline"
                    );
                }
            })?;
            match nal.nal_type() {
                NalType::Sps if sps.is_none() => {
                    tracing::debug!(len = nal.len(), "SPS received");
                    sps = Some(nal);
                }
                NalType::Pps if pps.is_none() => {
                    tracing::debug!(len = nal.len(), "PPS received");
                    pps = Some(nal);
                }
                other => tracing::trace!(nal_type = ?other, "skipping NAL unit"),
            }

            if let (Some(s), Some(p)) = (&sps, &pps) {
                let found = (s.clone(), p.clone());
                self.fragments.clear();
                self.ready.clear();
                return Ok(found);
            }
        }
    }

    /// Feed one parsed packet, queueing any NAL units it completes.
    fn push(&mut self, packet: RtpPacket) -> Result<()> {
        let payload = &packet.payload;
        let Some(&indicator) = payload.first() else {
            return Ok(());
        };

        match indicator & 0x1f {
            STAP_A => {
                let mut rest = &payload[1..];
                let mut units = Vec::new();
                while !rest.is_empty() {
                    if rest.len() < 2 {
                        return Err(RtspError::MalformedPacket("truncated STAP-A size"));
                    }
                    let size = u16::from_be_bytes([rest[0], rest[1]]) as usize;
                    if size == 0 || rest.len() < 2 + size {
                        return Err(RtspError::MalformedPacket("invalid STAP-A unit size"));
                    }
                    units.push(NalUnit::new(rest[2..2 + size].to_vec()));
                    rest = &rest[2 + size..];
                }
                self.last_timestamp = packet.timestamp;
                self.ready.extend(units);
            }
            FU_A => self.push_fragment(&packet)?,
            25..=27 | 29 => {
                return Err(RtspError::MalformedPacket("unsupported aggregation type"));
            }
            _ => {
                self.last_timestamp = packet.timestamp;
                self.ready.push_back(NalUnit::new(payload.clone()));
            }
        }
        Ok(())
    }

    fn push_fragment(&mut self, packet: &RtpPacket) -> Result<()> {
        let payload = &packet.payload;
        if payload.len() < 3 {
            return Err(RtspError::MalformedPacket("FU-A shorter than three bytes"));
        }

        let fu_header = payload[1];
        let start = fu_header & 0x80 != 0;
        let end = fu_header & 0x40 != 0;
        let data = &payload[2..];
        let pt = packet.payload_type;

        if start {
            if self.fragments.remove(&pt).is_some() {
                tracing::debug!(pt, seq = packet.sequence, "discarding stale partial NAL unit");
            }
            let mut buf = Vec::with_capacity(1 + data.len());
            buf.push((payload[0] & 0xe0) | (fu_header & 0x1f));
            buf.extend_from_slice(data);
            self.fragments.insert(
                pt,
                Fragments {
                    data: buf,
                    next_sequence: packet.sequence.wrapping_add(1),
                },
            );
        } else {
            let Some(partial) = self.fragments.get_mut(&pt) else {
                return Err(RtspError::MalformedPacket("FU-A continuation without start"));
            };
            if partial.next_sequence != packet.sequence {
                tracing::debug!(
                    pt,
                    expected = partial.next_sequence,
                    got = packet.sequence,
                    "sequence gap, discarding partial NAL unit"
                );
                self.fragments.remove(&pt);
                return Ok(());
            }
            if partial.data.len() + data.len() > MAX_NAL_SIZE {
                self.fragments.remove(&pt);
                return Err(RtspError::MalformedPacket("reassembled NAL unit too large"));
            }
            partial.data.extend_from_slice(data);
            partial.next_sequence = packet.sequence.wrapping_add(1);
        }

        if end && let Some(done) = self.fragments.remove(&pt) {
            self.last_timestamp = packet.timestamp;
            self.ready.push_back(NalUnit::new(done.data));
        }
        Ok(())
    }
}
