use crate::error::{ParseErrorKind, Result, RtspError};

/// An RTSP response (RFC 2326 §7).
///
/// ```text
/// RTSP/1.0 200 OK\r\n
/// CSeq: 3\r\n
/// Session: 12345678;timeout=60\r\n
/// Transport: RTP/AVP;unicast;client_port=8000-8001;server_port=9000-9001\r\n
/// \r\n
/// ```
///
/// The publisher [`parse`](Self::parse)s these off the control connection;
/// the builder half ([`new`](Self::new), [`add_header`](Self::add_header),
/// [`serialize`](Self::serialize)) writes them, e.g. from a test server.
#[derive(Debug, Clone)]
#[must_use]
pub struct RtspResponse {
    pub status_code: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl RtspResponse {
    pub fn new(status_code: u16, status_text: &str) -> Self {
        RtspResponse {
            status_code,
            status_text: status_text.to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// 200 OK.
    pub fn ok() -> Self {
        Self::new(200, "OK")
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }

    /// Serialize to the RTSP text wire format, adding `Content-Length` when a
    /// body is present.
    pub fn serialize(&self) -> String {
        let mut response = format!("RTSP/1.0 {} {}\r\n", self.status_code, self.status_text);

        for (name, value) in &self.headers {
            response.push_str(&format!("{}: {}\r\n", name, value));
        }

        if let Some(body) = &self.body {
            response.push_str(&format!("Content-Length: {}\r\n", body.len()));
            response.push_str("\r\n");
            response.push_str(body);
        } else {
            response.push_str("\r\n");
        }
        response
    }

    /// Parse a status line and headers, up to the blank line.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut lines = raw.lines();

        let status_line = lines
            .next()
            .filter(|l| !l.trim().is_empty())
            .ok_or(RtspError::parse(ParseErrorKind::EmptyMessage))?;

        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().unwrap_or_default();
        let code = parts.next().unwrap_or_default();
        let reason = parts.next().unwrap_or_default().trim();

        if !version.starts_with("RTSP/") || code.len() != 3 {
            return Err(RtspError::parse(ParseErrorKind::InvalidStatusLine));
        }
        let status_code = code
            .parse::<u16>()
            .map_err(|_| RtspError::parse(ParseErrorKind::InvalidStatusLine))?;

        Ok(RtspResponse {
            status_code,
            status_text: reason.to_string(),
            headers: super::parse_headers(lines)?,
            body: None,
        })
    }

    /// Look up a header value by name (case-insensitive).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        super::find_header(&self.headers, name)
    }

    /// `Content-Length` as declared by the headers (0 when absent).
    pub fn content_length(&self) -> Result<usize> {
        match self.get_header("Content-Length") {
            Some(v) => v
                .parse()
                .map_err(|_| RtspError::parse(ParseErrorKind::InvalidContentLength)),
            None => Ok(0),
        }
    }

    /// Whether the status code is in the 2xx success class.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Session identifier without the `;timeout=` suffix (RFC 2326 §12.37).
    pub fn session_id(&self) -> Option<&str> {
        self.get_header("Session")
            .map(|s| s.split(';').next().unwrap_or(s).trim())
            .filter(|s| !s.is_empty())
    }
}
