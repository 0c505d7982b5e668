//! Shared error vocabulary.
//!
//! Every error a shard, the protocol codec, or the reactor can produce is a
//! value, never a crash: `CacheError` is the common currency they convert
//! into before deciding whether to retry, surface a response, or close the
//! connection (see spec.md's ERROR HANDLING DESIGN).

use thiserror::Error;

/// Errors propagated out of the storage and protocol layers.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Frame bytes did not parse under either wire protocol.
    #[error("malformed request framing")]
    ProtocolParse,

    /// A frame parsed but had the wrong argument count for its command.
    #[error("invalid command format")]
    CommandFormat,

    /// The command name is not one this server understands.
    #[error("unknown command")]
    UnknownCommand,

    /// DEL (or similar) addressed a key that is not present.
    #[error("key does not exist")]
    KeyNotFound,

    /// Probing exhausted `MAX_READ_WRITE_ATTEMPTS` attempts on a shard whose
    /// table is already being resized, or a resize attempt itself failed to
    /// make room. Recoverable: the caller should not assume the key's
    /// presence or absence.
    #[error("internal error")]
    StorageFull,

    /// The entry pool or table allocation failed outright.
    #[error("allocation failure")]
    Allocation,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;
