//! RTSP protocol messages (RFC 2326) from the publishing side.
//!
//! A publisher drives the session with four requests:
//!
//! | Method | RFC section | Purpose |
//! |--------|-------------|---------|
//! | OPTIONS | §10.1 | Capability probe |
//! | ANNOUNCE | §10.3 | Send the SDP describing the tracks to be recorded |
//! | SETUP | §10.4 | Negotiate transport per track (UDP ports or TCP channels) |
//! | RECORD | §10.11 | Start accepting media |
//! | TEARDOWN | §10.7 | Destroy the server session |
//!
//! RTSP messages follow HTTP/1.1 syntax: a start line, `Name: value`
//! headers, a blank line, then `Content-Length` bytes of body.

pub mod request;
pub mod response;
pub mod sdp;
pub mod url;

use std::str::Lines;

use crate::error::{ParseErrorKind, Result, RtspError};

pub use request::RtspRequest;
pub use response::RtspResponse;
pub use url::RtspUrl;

/// Parse `Name: value` lines until the blank line ending the header block.
fn parse_headers(lines: Lines<'_>) -> Result<Vec<(String, String)>> {
    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or(RtspError::parse(ParseErrorKind::InvalidHeader))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }
    Ok(headers)
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}
