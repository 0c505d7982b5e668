//! # Sync Cache Client
//!
//! A lightweight, synchronous RESP client with connection pooling to
//! minimize TCP handshake overhead. Speaks only the RESP-framed subset of
//! the server's commands (GET/SET/DEL/PING/INFO) — the custom line framing
//! and MULTI/EXEC/DISCARD transactions are not exposed here.

mod client;
mod pool;
mod resp;

pub use client::{CacheClient, ClientConfig, ClientError, ClientResult};
