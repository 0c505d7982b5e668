//! cachekv-server — the sharded, in-memory TCP cache: an mio-based reactor
//! speaking a custom line protocol and a RESP subset with transactions on
//! the same byte stream.

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod latch;
pub mod metrics;
pub mod reactor;
pub mod transaction;

pub use config::ServerSettings;
pub use reactor::Server;
