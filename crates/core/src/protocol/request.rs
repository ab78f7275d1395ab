use crate::error::{ParseErrorKind, Result, RtspError};

/// Client identification sent in every request (RFC 2326 §12.41).
pub const USER_AGENT: &str = "rtsp-publish/0.1";

/// An RTSP request (RFC 2326 §6).
///
/// ```text
/// ANNOUNCE rtsp://server/stream RTSP/1.0\r\n
/// CSeq: 2\r\n
/// Content-Type: application/sdp\r\n
/// Content-Length: 142\r\n
/// \r\n
/// v=0\r\n...
/// ```
///
/// Built with [`new`](Self::new) plus [`add_header`](Self::add_header) /
/// [`with_body`](Self::with_body) and written with
/// [`serialize`](Self::serialize). [`parse`](Self::parse) reads the start
/// line and headers back, which is what a server needs.
#[derive(Debug, Clone)]
#[must_use]
pub struct RtspRequest {
    /// RTSP method (OPTIONS, ANNOUNCE, SETUP, RECORD, TEARDOWN).
    pub method: String,
    /// Request-URI.
    pub uri: String,
    /// Protocol version (`RTSP/1.0`).
    pub version: String,
    /// Headers as ordered (name, value) pairs; lookups are case-insensitive.
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl RtspRequest {
    pub fn new(method: &str, uri: &str) -> Self {
        RtspRequest {
            method: method.to_string(),
            uri: uri.to_string(),
            version: "RTSP/1.0".to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }

    /// Serialize to the RTSP text wire format. `Content-Length` is appended
    /// when a body is present (RFC 2326 §12.14).
    pub fn serialize(&self) -> String {
        let mut request = format!("{} {} {}\r\n", self.method, self.uri, self.version);

        for (name, value) in &self.headers {
            request.push_str(&format!("{}: {}\r\n", name, value));
        }

        match &self.body {
            Some(body) => {
                request.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));
                request.push_str(body);
            }
            None => request.push_str("\r\n"),
        }
        request
    }

    /// Parse the start line and headers of a request, up to the blank line.
    /// The body, if any, is left to the caller (see `Content-Length`).
    pub fn parse(raw: &str) -> Result<Self> {
        let mut lines = raw.lines();

        let request_line = lines
            .next()
            .filter(|l| !l.trim().is_empty())
            .ok_or(RtspError::parse(ParseErrorKind::EmptyMessage))?;

        let parts: Vec<&str> = request_line.split_whitespace().collect();
        let [method, uri, version] = parts[..] else {
            return Err(RtspError::parse(ParseErrorKind::InvalidRequestLine));
        };

        Ok(RtspRequest {
            method: method.to_string(),
            uri: uri.to_string(),
            version: version.to_string(),
            headers: super::parse_headers(lines)?,
            body: None,
        })
    }

    /// Look up a header value by name (case-insensitive, RFC 2326 §4.2).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        super::find_header(&self.headers, name)
    }

    pub fn cseq(&self) -> Option<&str> {
        self.get_header("CSeq")
    }
}
