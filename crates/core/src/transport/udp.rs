use std::io;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::time::Duration;

use super::ChannelKind;
use crate::error::{Result, RtspError};

const CLIENT_PORT_MIN: u32 = 10000;
const CLIENT_PORT_MAX: u32 = 65534;
const BIND_ATTEMPTS: usize = 32;

/// Independent RTP and RTCP datagram sockets for one track.
///
/// Each [`send`](Self::send) is a single best-effort datagram; there is no
/// acknowledgement and no retry. The sockets stay unconnected so ICMP
/// errors from earlier datagrams never surface on later sends.
#[derive(Debug)]
pub struct UdpChannel {
    rtp: UdpSocket,
    rtcp: UdpSocket,
    /// Server (RTP, RTCP) addresses once [`set_peer`](Self::set_peer) ran.
    peer: Option<(SocketAddr, SocketAddr)>,
}

impl UdpChannel {
    /// Bind an even RTP port and the following RTCP port on `local_ip`
    /// (RFC 3550 §11), picking random candidates in 10000–65534.
    pub fn bind_pair(local_ip: IpAddr) -> Result<Self> {
        for _ in 0..BIND_ATTEMPTS {
            let span = (CLIENT_PORT_MAX - CLIENT_PORT_MIN) / 2;
            let rtp_port = (CLIENT_PORT_MIN + (rand::random::<u32>() % span) * 2) as u16;

            let rtp = match UdpSocket::bind(SocketAddr::new(local_ip, rtp_port)) {
                Ok(s) => s,
                Err(e) if e.kind() == io::ErrorKind::AddrInUse => continue,
                Err(e) => return Err(e.into()),
            };
            let rtcp = match UdpSocket::bind(SocketAddr::new(local_ip, rtp_port + 1)) {
                Ok(s) => s,
                Err(e) if e.kind() == io::ErrorKind::AddrInUse => continue,
                Err(e) => return Err(e.into()),
            };

            tracing::trace!(rtp_port, rtcp_port = rtp_port + 1, "bound client port pair");
            return Ok(Self {
                rtp,
                rtcp,
                peer: None,
            });
        }

        Err(RtspError::PortRangeExhausted)
    }

    /// Local (RTP, RTCP) ports, as advertised in `client_port=`.
    pub fn local_ports(&self) -> Result<(u16, u16)> {
        Ok((self.rtp.local_addr()?.port(), self.rtcp.local_addr()?.port()))
    }

    /// Address datagrams to the server's port pair and apply the write
    /// timeout.
    pub fn set_peer(&mut self, server_ip: IpAddr, ports: (u16, u16), write_timeout: Duration) -> Result<()> {
        self.rtp.set_write_timeout(Some(write_timeout))?;
        self.rtcp.set_write_timeout(Some(write_timeout))?;
        self.peer = Some((
            SocketAddr::new(server_ip, ports.0),
            SocketAddr::new(server_ip, ports.1),
        ));
        tracing::debug!(%server_ip, rtp = ports.0, rtcp = ports.1, "UDP peer set");
        Ok(())
    }

    pub fn send(&self, kind: ChannelKind, payload: &[u8]) -> Result<()> {
        let Some((rtp_addr, rtcp_addr)) = self.peer else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "UDP peer not set").into());
        };
        let (socket, addr) = match kind {
            ChannelKind::Media => (&self.rtp, rtp_addr),
            ChannelKind::Control => (&self.rtcp, rtcp_addr),
        };
        match socket.send_to(payload, addr) {
            Ok(_) => Ok(()),
            // Some platforms still report ICMP port-unreachable on
            // unconnected sockets; a datagram write has no delivery contract.
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                tracing::trace!(%addr, "datagram refused by peer");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn pair_is_even_then_odd() {
        let ch = UdpChannel::bind_pair(IpAddr::V4(Ipv4Addr::LOCALHOST)).unwrap();
        let (rtp, rtcp) = ch.local_ports().unwrap();
        assert_eq!(rtp % 2, 0);
        assert_eq!(rtcp, rtp + 1);
    }

    #[test]
    fn routes_media_and_control_to_separate_ports() {
        let server_rtp = UdpSocket::bind("127.0.0.1:0").unwrap();
        let server_rtcp = UdpSocket::bind("127.0.0.1:0").unwrap();
        server_rtp.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        server_rtcp.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

        let mut ch = UdpChannel::bind_pair(IpAddr::V4(Ipv4Addr::LOCALHOST)).unwrap();
        ch.set_peer(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            (
                server_rtp.local_addr().unwrap().port(),
                server_rtcp.local_addr().unwrap().port(),
            ),
            Duration::from_secs(1),
        )
        .unwrap();

        ch.send(ChannelKind::Media, &[0x80, 0x60, 1]).unwrap();
        ch.send(ChannelKind::Control, &[0x80, 0xC8, 2]).unwrap();

        let mut buf = [0u8; 16];
        let (n, from) = server_rtp.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[0x80, 0x60, 1]);
        assert_eq!(from.port(), ch.local_ports().unwrap().0);

        let (n, _) = server_rtcp.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[0x80, 0xC8, 2]);
    }

    /// Bind then drop to obtain a port with nothing listening.
    fn closed_port() -> u16 {
        UdpSocket::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[test]
    fn unreachable_peer_does_not_fail_sends() {
        let ports = (closed_port(), closed_port());

        let mut ch = UdpChannel::bind_pair(IpAddr::V4(Ipv4Addr::LOCALHOST)).unwrap();
        ch.set_peer(IpAddr::V4(Ipv4Addr::LOCALHOST), ports, Duration::from_secs(1))
            .unwrap();
        for _ in 0..5 {
            ch.send(ChannelKind::Media, &[0x80, 0x60]).unwrap();
            ch.send(ChannelKind::Control, &[0x80, 0xC8]).unwrap();
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn send_before_peer_is_an_error() {
        let ch = UdpChannel::bind_pair(IpAddr::V4(Ipv4Addr::LOCALHOST)).unwrap();
        assert!(matches!(ch.send(ChannelKind::Media, &[0x80]), Err(RtspError::Io(_))));
    }
}
