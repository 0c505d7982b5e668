//! cachekv-protocol — parsing and response building for both wire
//! protocols this server speaks on the same TCP byte stream.

pub mod arena;
pub mod custom;
pub mod framing;
pub mod packet;
pub mod resp;

pub use framing::{next_frame, FrameKind};
pub use packet::{Payload, Protocol, ResponsePacket};
