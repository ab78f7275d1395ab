//! Announced media tracks.

use std::ops::RangeInclusive;

use base64::prelude::{BASE64_STANDARD, Engine as _};

use crate::error::{Result, RtspError};
use crate::media::h264::CLOCK_RATE;
use crate::media::{NalType, NalUnit};

/// Dynamic RTP payload types (RFC 3551 §6).
pub const DYNAMIC_PAYLOAD_TYPES: RangeInclusive<u8> = 96..=127;

/// An H.264 track: payload type plus the parameter sets a receiver needs
/// before it can decode anything.
///
/// Immutable once built. The session assigns the track ID when the track
/// is announced; the same `Track` may be shared with the caller via `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    payload_type: u8,
    sps: NalUnit,
    pps: NalUnit,
}

impl Track {
    /// Build a track, checking that `payload_type` is dynamic (96–127), that
    /// `sps` is a non-empty type-7 unit and `pps` a non-empty type-8 unit.
    pub fn new(payload_type: u8, sps: NalUnit, pps: NalUnit) -> Result<Self> {
        if !DYNAMIC_PAYLOAD_TYPES.contains(&payload_type) {
            return Err(RtspError::InvalidTrack(format!(
                "payload type {payload_type} outside 96-127"
            )));
        }
        if sps.is_empty() || pps.is_empty() {
            return Err(RtspError::InvalidTrack("empty SPS or PPS".into()));
        }
        if sps.nal_type() != NalType::Sps {
            return Err(RtspError::InvalidTrack(format!(
                "SPS has NAL type {:?}",
                sps.nal_type()
            )));
        }
        if pps.nal_type() != NalType::Pps {
            return Err(RtspError::InvalidTrack(format!(
                "PPS has NAL type {:?}",
                pps.nal_type()
            )));
        }

        Ok(Self {
            payload_type,
            sps,
            pps,
        })
    }

    pub fn payload_type(&self) -> u8 {
        self.payload_type
    }

    pub fn sps(&self) -> &NalUnit {
        &self.sps
    }

    pub fn pps(&self) -> &NalUnit {
        &self.pps
    }

    /// `profile_idc`, `constraint_set` flags and `level_idc` from SPS bytes 1–3.
    fn profile_level_id(&self) -> Option<String> {
        let sps = self.sps.as_bytes();
        (sps.len() >= 4).then(|| format!("{:02x}{:02x}{:02x}", sps[1], sps[2], sps[3]))
    }

    /// SDP media description for this track (RFC 6184 §8.2.1).
    ///
    /// ```text
    /// m=video 0 RTP/AVP 96
    /// a=rtpmap:96 H264/90000
    /// a=fmtp:96 packetization-mode=1;profile-level-id=42001e;sprop-parameter-sets=Z0IAHg==,aM44gA==
    /// ```
    ///
    /// `a=rtpmap` precedes `a=fmtp`, which references it. The control
    /// attribute is added by the session, which owns track IDs.
    pub fn announce_fragment(&self) -> String {
        let pt = self.payload_type;

        let mut fmtp = format!("a=fmtp:{pt} packetization-mode=1");
        if let Some(pl) = self.profile_level_id() {
            fmtp.push_str(&format!(";profile-level-id={pl}"));
        }
        fmtp.push_str(&format!(
            ";sprop-parameter-sets={},{}",
            BASE64_STANDARD.encode(self.sps.as_bytes()),
            BASE64_STANDARD.encode(self.pps.as_bytes())
        ));

        [
            format!("m=video 0 RTP/AVP {pt}"),
            format!("a=rtpmap:{pt} H264/{CLOCK_RATE}"),
            fmtp,
        ]
        .join("\r\n")
            + "\r\n"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sps() -> NalUnit {
        NalUnit::new(vec![0x67, 0x42, 0x00, 0x1e])
    }

    fn pps() -> NalUnit {
        NalUnit::new(vec![0x68, 0xce, 0x38, 0x80])
    }

    #[test]
    fn payload_type_bounds() {
        assert!(matches!(Track::new(95, sps(), pps()), Err(RtspError::InvalidTrack(_))));
        assert!(matches!(Track::new(128, sps(), pps()), Err(RtspError::InvalidTrack(_))));
        assert!(Track::new(96, sps(), pps()).is_ok());
        assert!(Track::new(127, sps(), pps()).is_ok());
    }

    #[test]
    fn rejects_empty_parameter_sets() {
        let empty = NalUnit::new(Vec::new());
        assert!(Track::new(96, empty.clone(), pps()).is_err());
        assert!(Track::new(96, sps(), empty).is_err());
    }

    #[test]
    fn rejects_swapped_parameter_sets() {
        assert!(Track::new(96, pps(), sps()).is_err());
    }

    #[test]
    fn announce_fragment_lines() {
        let track = Track::new(96, sps(), pps()).unwrap();
        let sdp = track.announce_fragment();
        assert_eq!(
            sdp,
            "m=video 0 RTP/AVP 96\r\n\
             a=rtpmap:96 H264/90000\r\n\
             a=fmtp:96 packetization-mode=1;profile-level-id=42001e;\
             sprop-parameter-sets=Z0IAHg==,aM44gA==\r\n"
        );
    }

    #[test]
    fn short_sps_omits_profile_level_id() {
        let track = Track::new(97, NalUnit::new(vec![0x67, 0x42]), pps()).unwrap();
        let sdp = track.announce_fragment();
        assert!(!sdp.contains("profile-level-id"));
        assert!(sdp.contains("a=fmtp:97 packetization-mode=1;sprop-parameter-sets=Z0I=,"));
    }

    #[test]
    fn announce_fragment_is_deterministic() {
        let a = Track::new(96, sps(), pps()).unwrap();
        let b = Track::new(96, sps(), pps()).unwrap();
        assert_eq!(a.announce_fragment(), b.announce_fragment());
    }
}
