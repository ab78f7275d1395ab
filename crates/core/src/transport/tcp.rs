use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::ChannelKind;
use crate::error::{ParseErrorKind, Result, RtspError};
use crate::protocol::{RtspRequest, RtspResponse};

/// First byte of an interleaved frame (RFC 2326 §10.12).
pub const INTERLEAVED_MAGIC: u8 = b'$';

/// Upper bound on a response's status line plus headers.
pub const MAX_HEAD_LEN: usize = 8 * 1024;

/// Upper bound on a response body. Publish replies carry none in practice.
pub const MAX_BODY_LEN: usize = 64 * 1024;

/// The RTSP control connection to the server.
///
/// Reads go through a buffered clone of the stream; writes go through a
/// shared, locked handle so interleaved media and RTSP requests never mix
/// bytes on the wire.
pub struct ControlConnection {
    reader: BufReader<TcpStream>,
    writer: Arc<Mutex<TcpStream>>,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
}

impl ControlConnection {
    /// Resolve `addr` and connect to the first address that answers within
    /// `timeout`.
    pub fn connect(addr: &str, timeout: Duration) -> Result<Self> {
        let mut last_err = None;
        for candidate in addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&candidate, timeout) {
                Ok(stream) => return Self::from_stream(stream),
                Err(e) => {
                    tracing::debug!(%candidate, error = %e, "connect attempt failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.map_or_else(|| RtspError::InvalidUrl(addr.to_string()), RtspError::from))
    }

    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;
        let reader = BufReader::new(stream.try_clone()?);

        Ok(Self {
            reader,
            writer: Arc::new(Mutex::new(stream)),
            peer_addr,
            local_addr,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Read and write deadlines of the underlying socket. They apply to
    /// interleaved media writes as well, since those share the socket.
    pub fn set_timeouts(&self, read: Duration, write: Duration) -> Result<()> {
        let stream = self.writer.lock();
        stream.set_read_timeout(Some(read))?;
        stream.set_write_timeout(Some(write))?;
        Ok(())
    }

    pub fn send(&self, request: &RtspRequest) -> Result<()> {
        let wire = request.serialize();
        let mut stream = self.writer.lock();
        stream.write_all(wire.as_bytes())?;
        stream.flush()?;
        Ok(())
    }

    /// Read the next response. Interleaved frames the server sends in the
    /// meantime (e.g. RTCP receiver reports) are skipped.
    pub fn read_response(&mut self) -> Result<RtspResponse> {
        loop {
            let first = match self.reader.fill_buf()?.first() {
                Some(&b) => b,
                None => return Err(closed_by_server()),
            };

            if first == INTERLEAVED_MAGIC {
                self.skip_interleaved_frame()?;
                continue;
            }

            let head = self.read_head()?;
            let mut response = RtspResponse::parse(&head)?;
            let len = response.content_length()?;
            if len > MAX_BODY_LEN {
                tracing::debug!(len, "response body over limit");
                return Err(RtspError::parse(ParseErrorKind::InvalidContentLength));
            }
            if len > 0 {
                let mut body = vec![0u8; len];
                self.reader.read_exact(&mut body)?;
                response.body = Some(String::from_utf8_lossy(&body).into_owned());
            }
            return Ok(response);
        }
    }

    /// Status line and headers up to the blank line, at most
    /// [`MAX_HEAD_LEN`] bytes.
    fn read_head(&mut self) -> Result<String> {
        let mut head = String::new();
        loop {
            let budget = MAX_HEAD_LEN.saturating_sub(head.len());
            if budget == 0 {
                return Err(RtspError::parse(ParseErrorKind::MessageTooLarge));
            }

            let mut line = String::new();
            let n = (&mut self.reader).take(budget as u64).read_line(&mut line)?;
            if !line.ends_with('\n') {
                if n == budget {
                    return Err(RtspError::parse(ParseErrorKind::MessageTooLarge));
                }
                return Err(closed_by_server());
            }
            if line == "\r\n" || line == "\n" {
                if head.is_empty() {
                    continue;
                }
                return Ok(head);
            }
            head.push_str(&line);
        }
    }

    fn skip_interleaved_frame(&mut self) -> Result<()> {
        let mut header = [0u8; 4];
        self.reader.read_exact(&mut header)?;
        let len = u16::from_be_bytes([header[2], header[3]]) as u64;
        io::copy(&mut (&mut self.reader).take(len), &mut io::sink())?;
        tracing::trace!(channel = header[1], len, "skipped interleaved frame");
        Ok(())
    }

    /// Interleaved carriage for one track on this connection.
    pub fn interleaved(&self, rtp_channel: u8, rtcp_channel: u8) -> InterleavedChannel {
        InterleavedChannel {
            writer: self.writer.clone(),
            rtp_channel,
            rtcp_channel,
        }
    }

    /// Close both directions; later reads and writes fail.
    pub fn shutdown(&self) {
        if let Err(e) = self.writer.lock().shutdown(Shutdown::Both) {
            tracing::trace!(error = %e, "control connection shutdown");
        }
    }
}

fn closed_by_server() -> RtspError {
    io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by server").into()
}

/// RTP/RTCP for one track, framed onto the shared control connection:
///
/// ```text
/// +-----+---------+----------------+------------------+
/// | '$' | channel | length (u16 BE) | payload (length) |
/// +-----+---------+----------------+------------------+
/// ```
///
/// Header and payload are written as one buffer under the connection's
/// write lock.
#[derive(Debug)]
pub struct InterleavedChannel {
    writer: Arc<Mutex<TcpStream>>,
    rtp_channel: u8,
    rtcp_channel: u8,
}

impl InterleavedChannel {
    pub fn channels(&self) -> (u8, u8) {
        (self.rtp_channel, self.rtcp_channel)
    }

    pub fn send(&self, kind: ChannelKind, payload: &[u8]) -> Result<()> {
        let channel = match kind {
            ChannelKind::Media => self.rtp_channel,
            ChannelKind::Control => self.rtcp_channel,
        };
        let frame = encode_frame(channel, payload)?;
        self.writer.lock().write_all(&frame)?;
        Ok(())
    }
}

/// Build a complete interleaved frame.
pub fn encode_frame(channel: u8, payload: &[u8]) -> Result<Vec<u8>> {
    let len = u16::try_from(payload.len()).map_err(|_| RtspError::FrameTooLarge(payload.len()))?;
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.push(INTERLEAVED_MAGIC);
    frame.push(channel);
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn pair() -> (ControlConnection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let accept = thread::spawn(move || listener.accept().unwrap().0);
        let conn = ControlConnection::connect(&addr, Duration::from_secs(2)).unwrap();
        let server = accept.join().unwrap();
        conn.set_timeouts(Duration::from_secs(2), Duration::from_secs(2))
            .unwrap();
        (conn, server)
    }

    #[test]
    fn frame_layout() {
        let frame = encode_frame(3, &[0xAA, 0xBB, 0xCC]).unwrap();
        assert_eq!(frame, vec![b'$', 3, 0x00, 0x03, 0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn oversized_frame_rejected() {
        let big = vec![0u8; u16::MAX as usize + 1];
        assert!(matches!(encode_frame(0, &big), Err(RtspError::FrameTooLarge(_))));
    }

    #[test]
    fn reads_response_with_body_after_interleaved_frame() {
        let (mut conn, mut server) = pair();
        let mut wire = encode_frame(1, &[0x80, 0xC9, 0x00, 0x01]).unwrap();
        wire.extend_from_slice(
            RtspResponse::ok()
                .add_header("CSeq", "7")
                .with_body("hello".to_string())
                .serialize()
                .as_bytes(),
        );
        server.write_all(&wire).unwrap();

        let resp = conn.read_response().unwrap();
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.get_header("CSeq"), Some("7"));
        assert_eq!(resp.body.as_deref(), Some("hello"));
    }

    #[test]
    fn oversized_body_is_rejected_without_allocating() {
        let (mut conn, mut server) = pair();
        server
            .write_all(b"RTSP/1.0 200 OK\r\nCSeq: 1\r\nContent-Length: 18446744073709551615\r\n\r\n")
            .unwrap();
        assert!(matches!(
            conn.read_response(),
            Err(RtspError::Parse {
                kind: ParseErrorKind::InvalidContentLength
            })
        ));
    }

    #[test]
    fn body_at_limit_is_read() {
        let (mut conn, mut server) = pair();
        let body = "a".repeat(MAX_BODY_LEN);
        let wire = RtspResponse::ok().with_body(body.clone()).serialize();
        let writer = thread::spawn(move || server.write_all(wire.as_bytes()).unwrap());
        let resp = conn.read_response().unwrap();
        writer.join().unwrap();
        assert_eq!(resp.body.as_deref(), Some(body.as_str()));
    }

    #[test]
    fn oversized_head_is_rejected() {
        let (mut conn, mut server) = pair();
        let mut wire = b"RTSP/1.0 200 OK\r\nX-Padding: ".to_vec();
        wire.extend(std::iter::repeat_n(b'a', MAX_HEAD_LEN));
        wire.extend_from_slice(b"\r\n\r\n");
        let writer = thread::spawn(move || {
            let _ = server.write_all(&wire);
            server
        });
        assert!(matches!(
            conn.read_response(),
            Err(RtspError::Parse {
                kind: ParseErrorKind::MessageTooLarge
            })
        ));
        drop(writer.join().unwrap());
    }

    #[test]
    fn read_times_out() {
        let (mut conn, _server) = pair();
        conn.set_timeouts(Duration::from_millis(20), Duration::from_secs(1))
            .unwrap();
        assert!(matches!(conn.read_response(), Err(RtspError::Timeout)));
    }

    #[test]
    fn closed_connection_is_io_error() {
        let (mut conn, server) = pair();
        drop(server);
        assert!(matches!(conn.read_response(), Err(RtspError::Io(_))));
    }

    #[test]
    fn interleaved_channels_route_by_kind() {
        let (conn, mut server) = pair();
        let ch = conn.interleaved(4, 5);
        ch.send(ChannelKind::Media, &[1, 2]).unwrap();
        ch.send(ChannelKind::Control, &[3]).unwrap();

        let mut buf = [0u8; 11];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [b'$', 4, 0, 2, 1, 2, b'$', 5, 0, 1, 3]);
    }
}
