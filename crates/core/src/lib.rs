pub mod client;
pub mod error;
pub mod media;
pub mod protocol;
pub mod session;
pub mod track;
pub mod transport;

pub use client::ClientConfig;
pub use error::{Result, RtspError};
pub use media::depacketizer::H264Depacketizer;
pub use media::{NalType, NalUnit, PacketSource};
pub use session::{PublishSession, SessionState, StreamProtocol, TransportPreference};
pub use track::Track;
pub use transport::ChannelKind;
