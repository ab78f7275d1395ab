//! SDP (RFC 8866) body of the ANNOUNCE request.
//!
//! ```text
//! v=0                                          ← protocol version
//! o=<user> 0 0 IN IP4 <addr>                   ← origin
//! s=<session-name>                             ← session name
//! c=IN IP4 <addr>                              ← connection address
//! t=0 0                                        ← timing (live stream)
//! a=tool:rtsp-publish                          ← client software
//! m=video 0 RTP/AVP 96                         ← one block per track
//! a=rtpmap:96 H264/90000
//! a=fmtp:96 packetization-mode=1;...
//! a=control:trackID=0                          ← SETUP target of the track
//! ```

use crate::protocol::url::track_control;
use crate::track::Track;

/// Build the ANNOUNCE body for `tracks`, whose IDs are their positions.
pub fn generate_sdp<T: AsRef<Track>>(
    tracks: &[T],
    host: &str,
    username: &str,
    session_name: &str,
) -> String {
    let ip_kind = if host.contains(':') { "IP6" } else { "IP4" };

    let mut sdp = [
        "v=0".to_string(),
        format!("o={username} 0 0 IN {ip_kind} {host}"),
        format!("s={session_name}"),
        format!("c=IN {ip_kind} {host}"),
        "t=0 0".to_string(),
        "a=tool:rtsp-publish".to_string(),
    ]
    .join("\r\n");
    sdp.push_str("\r\n");

    for (id, track) in tracks.iter().enumerate() {
        sdp.push_str(&track.as_ref().announce_fragment());
        sdp.push_str(&format!("a=control:{}\r\n", track_control(id)));
    }

    tracing::debug!(tracks = tracks.len(), "SDP: {}", sdp.replace("\r\n", " | "));

    sdp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::NalUnit;
    use std::sync::Arc;

    fn track(pt: u8) -> Arc<Track> {
        Arc::new(
            Track::new(
                pt,
                NalUnit::new(vec![0x67, 0x42, 0x00, 0x1e]),
                NalUnit::new(vec![0x68, 0xce, 0x38, 0x80]),
            )
            .unwrap(),
        )
    }

    #[test]
    fn session_lines_precede_media() {
        let sdp = generate_sdp(&[track(96)], "192.168.1.100", "-", "Stream");
        assert!(sdp.starts_with("v=0\r\no=- 0 0 IN IP4 192.168.1.100\r\ns=Stream\r\n"));
        assert!(sdp.contains("c=IN IP4 192.168.1.100\r\nt=0 0\r\n"));

        let tool = sdp.find("a=tool").unwrap();
        let media = sdp.find("m=video").unwrap();
        assert!(tool < media);
        assert!(sdp.ends_with("a=control:trackID=0\r\n"));
    }

    #[test]
    fn one_media_block_per_track() {
        let sdp = generate_sdp(&[track(96), track(97)], "10.0.0.1", "-", "Stream");
        assert_eq!(sdp.matches("m=video").count(), 2);
        assert!(sdp.contains("m=video 0 RTP/AVP 97\r\n"));

        let first = sdp.find("a=control:trackID=0").unwrap();
        let second_media = sdp.find("m=video 0 RTP/AVP 97").unwrap();
        assert!(first < second_media);
        assert!(sdp.contains("a=control:trackID=1\r\n"));
    }

    #[test]
    fn ipv6_address_kind() {
        let sdp = generate_sdp(&[track(96)], "::1", "-", "Stream");
        assert!(sdp.contains("c=IN IP6 ::1\r\n"));
    }
}
