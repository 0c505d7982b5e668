//! The response packet: a discriminated payload plus a protocol tag that
//! tells the reactor whether to append the custom-framing separator when it
//! writes the packet to the wire.

use crate::arena::{Accumulator, InlineBuf};

pub enum Payload {
    Static(&'static [u8]),
    Inline(InlineBuf),
    Owned(Vec<u8>),
}

/// Which wire protocol produced this response, and therefore how the
/// reactor frames it on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Custom,
    Resp,
}

pub struct ResponsePacket {
    payload: Payload,
    pub protocol: Protocol,
}

impl ResponsePacket {
    pub fn new(payload: Payload, protocol: Protocol) -> Self {
        ResponsePacket { payload, protocol }
    }

    pub fn static_bytes(data: &'static [u8], protocol: Protocol) -> Self {
        ResponsePacket::new(Payload::Static(data), protocol)
    }

    pub fn from_accumulator(acc: Accumulator, protocol: Protocol) -> Self {
        ResponsePacket::new(acc.into_payload(), protocol)
    }

    pub fn as_bytes(&self) -> &[u8] {
        match &self.payload {
            Payload::Static(data) => data,
            Payload::Inline(buf) => buf.as_slice(),
            Payload::Owned(buf) => buf.as_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}
