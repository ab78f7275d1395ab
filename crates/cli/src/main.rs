use std::net::UdpSocket;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rtsp_publish::media::MAX_PACKET_SIZE;
use rtsp_publish::{
    ChannelKind, ClientConfig, H264Depacketizer, PublishSession, Result, Track,
    TransportPreference,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "rtsp-publish",
    about = "Forward a local RTP/H.264 stream to an RTSP server"
)]
struct Args {
    /// UDP address the encoder sends RTP to (host:port)
    #[arg(long, short, default_value = "127.0.0.1:9000")]
    listen: String,

    /// Publish URL, e.g. rtsp://server:8554/mystream
    #[arg(long, short)]
    url: String,

    /// auto, udp or tcp
    #[arg(long, short, default_value = "auto")]
    transport: TransportPreference,

    #[arg(long, default_value_t = 10_000, value_parser = clap::value_parser!(u64).range(1..))]
    read_timeout_ms: u64,

    #[arg(long, default_value_t = 10_000, value_parser = clap::value_parser!(u64).range(1..))]
    write_timeout_ms: u64,

    /// RTP payload type of the incoming stream (96-127)
    #[arg(long, default_value_t = 96)]
    payload_type: u8,

    /// How long to wait for SPS and PPS before giving up
    #[arg(long, default_value_t = 10_000, value_parser = clap::value_parser!(u64).range(1..))]
    sps_timeout_ms: u64,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "publishing stopped");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let socket = UdpSocket::bind(&args.listen)?;
    tracing::info!(listen = %args.listen, "waiting for SPS/PPS");

    let mut depacketizer = H264Depacketizer::new(socket);
    depacketizer.set_timeout(Some(Duration::from_millis(args.sps_timeout_ms)));
    let (sps, pps) = depacketizer.read_sps_pps()?;
    let socket = depacketizer.into_inner();

    let track = Arc::new(Track::new(args.payload_type, sps, pps)?);
    let config = ClientConfig {
        read_timeout: Duration::from_millis(args.read_timeout_ms),
        write_timeout: Duration::from_millis(args.write_timeout_ms),
        transport: args.transport,
        ..ClientConfig::default()
    };

    let mut session = config.dial_publish(&args.url, &[track])?;
    tracing::info!(url = %args.url, protocol = ?session.protocol(), "publishing");

    let result = forward(&socket, &mut session);
    session.close();
    result
}

/// Relay every datagram from the encoder until a read or publish fails.
fn forward(socket: &UdpSocket, session: &mut PublishSession) -> Result<()> {
    let mut buf = vec![0u8; MAX_PACKET_SIZE];
    loop {
        let (n, _) = socket.recv_from(&mut buf)?;
        session.publish_frame(0, ChannelKind::Media, &buf[..n])?;
    }
}
