//! Per-connection reactor state: the unparsed read buffer, the RESP
//! transaction slot, and a write queue that survives partial sends.
//!
//! Grounded on `src/server/conn_manager.hpp`'s per-fd `ConnData` and on
//! `server.cpp`'s `sendResponses` (the iovec/partial-send bookkeeping,
//! translated to `write_vectored`/`IoSlice`).

use std::collections::VecDeque;
use std::io::{self, IoSlice, Write};
use std::time::Instant;

use bytes::{Buf, BytesMut};
use cachekv_common::wire::{MAX_REQUEST_SIZE, UNIT_SEPARATOR};
use cachekv_protocol::{Protocol, ResponsePacket};
use mio::net::TcpStream;
use mio::Token;

use crate::transaction::RespTransaction;

pub struct Connection {
    pub token: Token,
    pub stream: TcpStream,
    read_buf: BytesMut,
    pub last_activity: Instant,
    pub transaction: RespTransaction,
    pub writable_registered: bool,
    pending_writes: VecDeque<Vec<u8>>,
    write_offset: usize,
}

impl Connection {
    pub fn new(token: Token, stream: TcpStream) -> Self {
        Connection {
            token,
            stream,
            read_buf: BytesMut::with_capacity(4096),
            last_activity: Instant::now(),
            transaction: RespTransaction::default(),
            writable_registered: false,
            pending_writes: VecDeque::new(),
            write_offset: 0,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Appends freshly-read bytes. Rejects the connection once its unframed
    /// backlog would exceed `MAX_REQUEST_SIZE` (spec.md §5 "oversize
    /// request").
    pub fn append(&mut self, data: &[u8]) -> io::Result<()> {
        if self.read_buf.len() + data.len() > MAX_REQUEST_SIZE {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "request exceeds MAX_REQUEST_SIZE"));
        }
        self.read_buf.extend_from_slice(data);
        Ok(())
    }

    pub fn unparsed(&self) -> &[u8] {
        &self.read_buf[..]
    }

    /// Drops `n` consumed bytes off the front. `BytesMut::advance` is O(1)
    /// (it moves a start pointer, not the backing allocation), which is why
    /// this runs after every parsed frame instead of being batched the way
    /// the original's manual buffer erase was.
    pub fn advance(&mut self, n: usize) {
        self.read_buf.advance(n);
    }

    pub fn queue_response(&mut self, packet: &ResponsePacket) {
        let mut bytes = Vec::with_capacity(packet.len() + 1);
        bytes.extend_from_slice(packet.as_bytes());
        if packet.protocol == Protocol::Custom {
            bytes.push(UNIT_SEPARATOR);
        }
        self.pending_writes.push_back(bytes);
    }

    pub fn has_pending_writes(&self) -> bool {
        !self.pending_writes.is_empty()
    }

    /// Drains as much of the pending write queue as the socket accepts.
    /// Returns `Ok(true)` once the queue is empty, `Ok(false)` on
    /// `WouldBlock` with bytes still queued (the caller should register for
    /// write readiness and resume on the next event — the Open Question
    /// resolution in spec.md §9, chosen over the original's spin-retry).
    pub fn flush(&mut self) -> io::Result<bool> {
        while !self.pending_writes.is_empty() {
            let slices: Vec<IoSlice<'_>> = self
                .pending_writes
                .iter()
                .enumerate()
                .map(|(i, chunk)| {
                    let start = if i == 0 { self.write_offset } else { 0 };
                    IoSlice::new(&chunk[start..])
                })
                .collect();

            let written = match self.stream.write_vectored(&slices) {
                Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "peer closed during write")),
                Ok(n) => n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };

            self.advance_write_cursor(written);
        }
        Ok(true)
    }

    fn advance_write_cursor(&mut self, mut written: usize) {
        while written > 0 {
            let front_len = match self.pending_writes.front() {
                Some(chunk) => chunk.len() - self.write_offset,
                None => break,
            };
            if written >= front_len {
                written -= front_len;
                self.pending_writes.pop_front();
                self.write_offset = 0;
            } else {
                self.write_offset += written;
                written = 0;
            }
        }
    }
}
