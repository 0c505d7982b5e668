//! RESP bulk-array framing: parsing and response building.
//!
//! Grounded on `src/server/protocol.cpp`'s `parseRespMessageLength` and
//! `parseRespCommand`. Unlike the original, which null-terminates elements
//! in place, parsing here returns borrowed slices into the caller's buffer
//! — safe indexing replaces the sentinel-overwrite trick.

use cachekv_common::wire::{RESP_CRLF, RESP_ERROR_PREFIX, RESP_NULL_BULK};

use crate::arena::Accumulator;
use crate::packet::{Protocol, ResponsePacket};

#[derive(Debug, PartialEq, Eq)]
pub enum ParseResult {
    Incomplete,
    Complete(usize),
    Error,
}

enum Line {
    Value(i64, usize),
    Incomplete,
    Malformed,
}

fn read_line_int(buf: &[u8]) -> Line {
    let mut i = 0;
    while i + 1 < buf.len() {
        if buf[i] == b'\r' && buf[i + 1] == b'\n' {
            return match parse_i64_token(&buf[..i]) {
                Some(v) => Line::Value(v, i + 2),
                None => Line::Malformed,
            };
        }
        i += 1;
    }
    Line::Incomplete
}

fn parse_i64_token(token: &[u8]) -> Option<i64> {
    if token.is_empty() {
        return None;
    }
    let (negative, digits) = if token[0] == b'-' { (true, &token[1..]) } else { (false, token) };
    if digits.is_empty() {
        return None;
    }
    let mut value: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value.checked_mul(10)?.checked_add((b - b'0') as i64)?;
    }
    Some(if negative { -value } else { value })
}

/// Walks a `*N\r\n$len\r\n<bytes>\r\n...` header to compute the length of
/// one complete RESP frame, without copying anything.
pub fn parse_message_length(buf: &[u8]) -> ParseResult {
    if buf.is_empty() {
        return ParseResult::Incomplete;
    }
    if buf[0] != b'*' {
        return ParseResult::Error;
    }
    let mut pos = 1;

    let argc = match read_line_int(&buf[pos..]) {
        Line::Value(v, consumed) => {
            pos += consumed;
            v
        }
        Line::Incomplete => return ParseResult::Incomplete,
        Line::Malformed => return ParseResult::Error,
    };
    // `*0\r\n` (empty array) and negative counts are both rejected.
    if !(1..=3).contains(&argc) {
        return ParseResult::Error;
    }

    for _ in 0..argc {
        if pos >= buf.len() {
            return ParseResult::Incomplete;
        }
        if buf[pos] != b'$' {
            return ParseResult::Error;
        }
        pos += 1;

        let len = match read_line_int(&buf[pos..]) {
            Line::Value(v, consumed) => {
                pos += consumed;
                v
            }
            Line::Incomplete => return ParseResult::Incomplete,
            Line::Malformed => return ParseResult::Error,
        };
        if len < 0 {
            return ParseResult::Error;
        }
        let len = len as usize;

        if pos + len + 2 > buf.len() {
            return ParseResult::Incomplete;
        }
        if &buf[pos + len..pos + len + 2] != RESP_CRLF {
            return ParseResult::Error;
        }
        pos += len + 2;
    }

    ParseResult::Complete(pos)
}

/// A parsed RESP command; slices borrow into the frame buffer the caller
/// validated with [`parse_message_length`].
pub struct RespCommandParts<'a> {
    pub command: &'a [u8],
    pub key: Option<&'a [u8]>,
    pub value: Option<&'a [u8]>,
    pub argc: usize,
}

/// Re-walks an already-`Complete` frame, this time collecting the bulk
/// string slices instead of just their total length.
pub fn parse_command(frame: &[u8]) -> Option<RespCommandParts<'_>> {
    if frame.is_empty() || frame[0] != b'*' {
        return None;
    }
    let mut pos = 1;
    let argc = match read_line_int(&frame[pos..]) {
        Line::Value(v, consumed) if (1..=3).contains(&v) => {
            pos += consumed;
            v as usize
        }
        _ => return None,
    };

    let mut parts: [Option<&[u8]>; 3] = [None, None, None];
    for slot in parts.iter_mut().take(argc) {
        if pos >= frame.len() || frame[pos] != b'$' {
            return None;
        }
        pos += 1;
        let len = match read_line_int(&frame[pos..]) {
            Line::Value(v, consumed) if v >= 0 => {
                pos += consumed;
                v as usize
            }
            _ => return None,
        };
        if pos + len + 2 > frame.len() || &frame[pos + len..pos + len + 2] != RESP_CRLF {
            return None;
        }
        *slot = Some(&frame[pos..pos + len]);
        pos += len + 2;
    }

    Some(RespCommandParts {
        command: parts[0]?,
        key: parts[1],
        value: parts[2],
        argc,
    })
}

fn write_i64(acc: &mut Accumulator, mut value: i64) {
    if value == 0 {
        acc.push(b'0');
        return;
    }
    let negative = value < 0;
    if negative {
        acc.push(b'-');
        value = -value;
    }
    let mut digits = [0u8; 20];
    let mut len = 0;
    let mut v = value as u64;
    while v > 0 {
        digits[len] = b'0' + (v % 10) as u8;
        v /= 10;
        len += 1;
    }
    for idx in (0..len).rev() {
        acc.push(digits[idx]);
    }
}

pub fn make_simple(message: &[u8]) -> ResponsePacket {
    let mut acc = Accumulator::with_capacity(message.len() + 3);
    acc.push(b'+');
    acc.extend_from_slice(message);
    acc.extend_from_slice(RESP_CRLF);
    ResponsePacket::from_accumulator(acc, Protocol::Resp)
}

pub fn make_integer(value: i64) -> ResponsePacket {
    let mut acc = Accumulator::with_capacity(24);
    acc.push(b':');
    write_i64(&mut acc, value);
    acc.extend_from_slice(RESP_CRLF);
    ResponsePacket::from_accumulator(acc, Protocol::Resp)
}

pub fn make_bulk(value: Option<&[u8]>) -> ResponsePacket {
    match value {
        None => ResponsePacket::static_bytes(RESP_NULL_BULK, Protocol::Resp),
        Some(data) => {
            let mut acc = Accumulator::with_capacity(data.len() + 16);
            acc.push(b'$');
            write_i64(&mut acc, data.len() as i64);
            acc.extend_from_slice(RESP_CRLF);
            acc.extend_from_slice(data);
            acc.extend_from_slice(RESP_CRLF);
            ResponsePacket::from_accumulator(acc, Protocol::Resp)
        }
    }
}

pub fn make_error(message: &[u8]) -> ResponsePacket {
    let mut acc = Accumulator::with_capacity(message.len() + 8);
    acc.push(b'-');
    acc.extend_from_slice(message);
    acc.extend_from_slice(RESP_CRLF);
    ResponsePacket::from_accumulator(acc, Protocol::Resp)
}

/// Concatenates element buffers contiguously into one allocation, so the
/// writer can hand the whole array off as a single iovec.
pub fn make_array(elements: &[ResponsePacket]) -> ResponsePacket {
    let total: usize = elements.iter().map(|p| p.len()).sum();
    let header_cap = 16 + total;
    let mut acc = Accumulator::with_capacity(header_cap);
    acc.push(b'*');
    write_i64(&mut acc, elements.len() as i64);
    acc.extend_from_slice(RESP_CRLF);
    for element in elements {
        acc.extend_from_slice(element.as_bytes());
    }
    ResponsePacket::from_accumulator(acc, Protocol::Resp)
}

/// Builds a `-ERR <message>\r\n` reply using the shared error prefix table.
pub fn make_legacy_error(message: &[u8]) -> ResponsePacket {
    let mut acc = Accumulator::with_capacity(RESP_ERROR_PREFIX.len() + message.len() + 2);
    acc.extend_from_slice(RESP_ERROR_PREFIX);
    acc.extend_from_slice(message);
    acc.extend_from_slice(RESP_CRLF);
    ResponsePacket::from_accumulator(acc, Protocol::Resp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_array() {
        assert_eq!(parse_message_length(b"*0\r\n"), ParseResult::Error);
    }

    #[test]
    fn incomplete_frame_awaits_more_bytes() {
        assert_eq!(parse_message_length(b"*2\r\n$3\r\nGET"), ParseResult::Incomplete);
    }

    #[test]
    fn complete_frame_reports_exact_length() {
        let frame = b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n";
        assert_eq!(parse_message_length(frame), ParseResult::Complete(frame.len()));
    }

    #[test]
    fn parse_command_extracts_parts() {
        let frame = b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n";
        let parts = parse_command(frame).unwrap();
        assert_eq!(parts.command, b"SET");
        assert_eq!(parts.key, Some(&b"foo"[..]));
        assert_eq!(parts.value, Some(&b"bar"[..]));
        assert_eq!(parts.argc, 3);
    }

    #[test]
    fn build_then_parse_round_trips() {
        let packet = make_bulk(Some(b"bar"));
        assert_eq!(packet.as_bytes(), b"$3\r\nbar\r\n");
    }

    #[test]
    fn builds_array_as_one_contiguous_buffer() {
        let array = make_array(&[make_simple(b"OK"), make_simple(b"OK")]);
        assert_eq!(array.as_bytes(), b"*2\r\n+OK\r\n+OK\r\n");
    }

    #[test]
    fn negative_integer_has_leading_sign() {
        assert_eq!(make_integer(-2).as_bytes(), b":-2\r\n");
    }
}
