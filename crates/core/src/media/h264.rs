//! H.264 Annex B parsing and RTP packetization (RFC 6184).
//!
//! Publishers that receive raw H.264 access units instead of RTP use
//! [`H264Packetizer`] to produce the packets handed to
//! [`PublishSession::publish_frame`](crate::session::PublishSession::publish_frame).
//!
//! - **Single NAL Unit** (§5.6): NAL units up to the MTU travel as-is.
//! - **FU-A** (§5.8): larger NAL units are split. Each fragment carries a
//!   two-byte prefix before the NAL data:
//!
//!   ```text
//!   FU indicator:  [F|NRI|Type=28]
//!   FU header:     [S|E|R|NAL_Type]
//!   ```

use super::NalUnit;
use super::rtp::{RTP_HEADER_LEN, RtpHeader};

pub const DEFAULT_MTU: usize = 1400;

/// RTP clock rate of H.264 video (RFC 6184 §8.1).
pub const CLOCK_RATE: u32 = 90000;

/// NAL unit type of a STAP-A aggregation packet.
pub const STAP_A: u8 = 24;
/// NAL unit type of an FU-A fragment.
pub const FU_A: u8 = 28;

/// Split an Annex B byte stream at its `00 00 01` / `00 00 00 01` start
/// codes, returning the NAL units without start codes.
///
/// ```
/// use rtsp_publish::media::h264::extract_nal_units;
///
/// let nals = extract_nal_units(&[0, 0, 0, 1, 0x67, 0x42, 0, 0, 1, 0x68, 0xCE]);
/// assert_eq!(nals.len(), 2);
/// assert_eq!(nals[1].as_bytes(), &[0x68, 0xCE]);
/// ```
pub fn extract_nal_units(data: &[u8]) -> Vec<NalUnit> {
    // (first byte after the start code, start code length)
    let mut starts: Vec<(usize, usize)> = Vec::new();
    let mut i = 0usize;
    while i + 2 < data.len() {
        if data[i..].starts_with(&[0, 0, 0, 1]) {
            starts.push((i + 4, 4));
            i += 4;
        } else if data[i..].starts_with(&[0, 0, 1]) {
            starts.push((i + 3, 3));
            i += 3;
        } else {
            i += 1;
        }
    }

    starts
        .iter()
        .enumerate()
        .filter_map(|(idx, &(start, _))| {
            let end = starts
                .get(idx + 1)
                .map_or(data.len(), |&(next, sc_len)| next - sc_len);
            (start < end).then(|| NalUnit::new(data[start..end].to_vec()))
        })
        .collect()
}

/// Converts H.264 access units into RTP packets for one track.
#[derive(Debug)]
pub struct H264Packetizer {
    header: RtpHeader,
    mtu: usize,
}

impl H264Packetizer {
    pub fn new(pt: u8, ssrc: u32) -> Self {
        Self {
            header: RtpHeader::new(pt, ssrc),
            mtu: DEFAULT_MTU,
        }
    }

    pub fn with_random_ssrc(pt: u8) -> Self {
        Self {
            header: RtpHeader::with_random_ssrc(pt),
            mtu: DEFAULT_MTU,
        }
    }

    /// Maximum RTP payload size. Values below 3 are raised to 3 so every
    /// FU-A fragment carries at least one byte.
    pub fn set_mtu(&mut self, mtu: usize) {
        self.mtu = mtu.max(3);
    }

    pub fn ssrc(&self) -> u32 {
        self.header.ssrc
    }

    /// Packetize one Annex B access unit and advance the RTP timestamp by
    /// `timestamp_increment` (e.g. 3000 for 30 fps at 90 kHz).
    pub fn packetize(&mut self, access_unit: &[u8], timestamp_increment: u32) -> Vec<Vec<u8>> {
        let nal_units = extract_nal_units(access_unit);
        let mut packets = Vec::new();

        for (i, nal) in nal_units.iter().enumerate() {
            let last = i + 1 == nal_units.len();
            self.packetize_nal(nal.as_bytes(), last, &mut packets);
        }

        self.header.advance_timestamp(timestamp_increment);

        tracing::trace!(
            nal_count = nal_units.len(),
            rtp_packets = packets.len(),
            seq = self.header.sequence(),
            "access unit packetized"
        );

        packets
    }

    /// Append the packets for one NAL unit. `last` marks the end of the
    /// access unit and sets the RTP marker bit on the final packet.
    pub fn packetize_nal(&mut self, nal: &[u8], last: bool, packets: &mut Vec<Vec<u8>>) {
        let Some((&nal_header, body)) = nal.split_first() else {
            return;
        };

        if nal.len() <= self.mtu {
            let mut packet = Vec::with_capacity(RTP_HEADER_LEN + nal.len());
            packet.extend_from_slice(&self.header.write(last));
            packet.extend_from_slice(nal);
            packets.push(packet);
            return;
        }

        let fu_indicator = (nal_header & 0xe0) | FU_A;
        let nal_type = nal_header & 0x1f;
        let chunks: Vec<&[u8]> = body.chunks(self.mtu - 2).collect();

        for (i, chunk) in chunks.iter().enumerate() {
            let start = if i == 0 { 0x80 } else { 0x00 };
            let end = if i + 1 == chunks.len() { 0x40 } else { 0x00 };

            let mut packet = Vec::with_capacity(RTP_HEADER_LEN + 2 + chunk.len());
            packet.extend_from_slice(&self.header.write(last && end != 0));
            packet.push(fu_indicator);
            packet.push(start | end | nal_type);
            packet.extend_from_slice(chunk);
            packets.push(packet);
        }

        tracing::trace!(
            nal_type,
            nal_size = nal.len(),
            fragments = chunks.len(),
            "FU-A fragmented NAL unit"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::rtp::RtpPacket;

    #[test]
    fn extract_mixed_start_codes() {
        let mut data = vec![0, 0, 0, 1, 0x67, 0x42];
        data.extend_from_slice(&[0, 0, 1, 0x68, 0xCE]);
        let nals = extract_nal_units(&data);
        assert_eq!(nals.len(), 2);
        assert_eq!(nals[0].as_bytes(), &[0x67, 0x42]);
        assert_eq!(nals[1].as_bytes(), &[0x68, 0xCE]);
    }

    #[test]
    fn extract_without_start_code() {
        assert!(extract_nal_units(&[]).is_empty());
        assert!(extract_nal_units(&[0xFF, 0xFE]).is_empty());
    }

    #[test]
    fn small_nal_single_packet_with_marker() {
        let mut p = H264Packetizer::new(96, 0xAABBCCDD);
        let packets = p.packetize(&[0, 0, 0, 1, 0x65, 0xAA, 0xBB], 3000);
        assert_eq!(packets.len(), 1);

        let pkt = RtpPacket::parse(&packets[0]).unwrap();
        assert!(pkt.marker);
        assert_eq!(pkt.payload, vec![0x65, 0xAA, 0xBB]);
    }

    #[test]
    fn large_nal_fragmented() {
        let mut p = H264Packetizer::new(96, 0x11223344);
        let mut nal = vec![0x65];
        nal.extend(vec![0xAA; DEFAULT_MTU + 500]);
        let mut packets = Vec::new();
        p.packetize_nal(&nal, true, &mut packets);
        assert_eq!(packets.len(), 2);

        assert_eq!(packets[0][12] & 0x1f, FU_A);
        assert_eq!(packets[0][13] & 0x80, 0x80);
        assert_eq!(packets[0][1] & 0x80, 0, "marker only on the last fragment");

        let last = packets.last().unwrap();
        assert_eq!(last[13] & 0x40, 0x40);
        assert_eq!(last[1] & 0x80, 0x80);
    }

    #[test]
    fn marker_only_on_last_nal_of_access_unit() {
        let mut p = H264Packetizer::new(96, 1);
        let au = [0, 0, 0, 1, 0x67, 0x42, 0, 0, 0, 1, 0x68, 0xCE, 0, 0, 0, 1, 0x65, 0x88];
        let packets = p.packetize(&au, 3000);
        let markers: Vec<bool> = packets
            .iter()
            .map(|b| RtpPacket::parse(b).unwrap().marker)
            .collect();
        assert_eq!(markers, vec![false, false, true]);
    }

    #[test]
    fn timestamp_advances_per_access_unit() {
        let mut p = H264Packetizer::new(96, 1);
        let au = [0, 0, 0, 1, 0x41, 0x9A];
        p.packetize(&au, 3000);
        let second = p.packetize(&au, 3000);
        assert_eq!(RtpPacket::parse(&second[0]).unwrap().timestamp, 3000);
    }
}
