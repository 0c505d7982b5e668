//! Custom line framing: `CMD key\x1F` or `CMD key value\x1F`.
//!
//! Spaces inside values are not supported in this framing (spec.md §4.2);
//! fields are a single space-separated split, which is why this framing is
//! simpler but less expressive than RESP.

use cachekv_common::wire::{CUSTOM_NIL, CUSTOM_OK};

use crate::arena::Accumulator;
use crate::packet::{Protocol, ResponsePacket};

pub struct CustomCommandParts<'a> {
    pub command: &'a [u8],
    pub key: &'a [u8],
    pub value: Option<&'a [u8]>,
}

/// Parses one already-delimited frame (the bytes up to, but not including,
/// the trailing `0x1F`).
pub fn parse_frame(payload: &[u8]) -> Option<CustomCommandParts<'_>> {
    let mut fields = payload.splitn(3, |&b| b == b' ');
    let command = fields.next()?;
    if command.is_empty() {
        return None;
    }
    let key = match fields.next() {
        Some(k) if !k.is_empty() => k,
        _ => return None,
    };
    let value = fields.next();
    Some(CustomCommandParts { command, key, value })
}

pub fn make_ok() -> ResponsePacket {
    ResponsePacket::static_bytes(CUSTOM_OK, Protocol::Custom)
}

pub fn make_nil() -> ResponsePacket {
    ResponsePacket::static_bytes(CUSTOM_NIL, Protocol::Custom)
}

pub fn make_value(bytes: &[u8]) -> ResponsePacket {
    let mut acc = Accumulator::with_capacity(bytes.len());
    acc.extend_from_slice(bytes);
    ResponsePacket::from_accumulator(acc, Protocol::Custom)
}

pub fn make_error(message: &[u8]) -> ResponsePacket {
    let mut acc = Accumulator::with_capacity(message.len());
    acc.extend_from_slice(message);
    ResponsePacket::from_accumulator(acc, Protocol::Custom)
}
