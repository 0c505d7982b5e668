//! Constants shared by both wire protocols.
//!
//! Values are carried over verbatim from `src/server/protocol.hpp` and
//! `src/server/constants.hpp` in the original implementation.

/// Terminates every custom-framing request and response.
pub const UNIT_SEPARATOR: u8 = 0x1F;

pub const RESP_ARRAY_PREFIX: u8 = b'*';
pub const RESP_SIMPLE_PREFIX: u8 = b'+';
pub const RESP_BULK_PREFIX: u8 = b'$';
pub const RESP_INTEGER_PREFIX: u8 = b':';
pub const RESP_ERROR_PREFIX: &[u8] = b"-ERR ";
pub const RESP_CRLF: &[u8] = b"\r\n";
pub const RESP_NULL_BULK: &[u8] = b"$-1\r\n";

pub const CUSTOM_OK: &[u8] = b"OK";
pub const CUSTOM_NIL: &[u8] = b"(nil)";
pub const CUSTOM_ERR_UNKNOWN_COMMAND: &[u8] = b"ERROR: Unknown command";
pub const CUSTOM_ERR_INVALID_FORMAT: &[u8] = b"ERROR: Invalid command format";
pub const CUSTOM_ERR_INTERNAL: &[u8] = b"ERROR: Internal error";
pub const CUSTOM_ERR_KEY_NOT_EXISTS: &[u8] = b"ERROR: Key does not exist";
pub const CUSTOM_ERR_UNABLE_TO_PARSE: &[u8] = b"ERROR: Unable to parse request";

pub const RESP_MULTI_NESTED: &[u8] = b"MULTI nested";
pub const RESP_EXEC_NO_MULTI: &[u8] = b"EXEC without MULTI";
pub const RESP_DISCARD_NO_MULTI: &[u8] = b"DISCARD without MULTI";
pub const RESP_EXEC_ABORTED: &[u8] = b"EXEC aborted due to prior errors";
pub const RESP_UNABLE_TO_PARSE: &[u8] = b"ERROR: Unable to parse request";

pub const CMD_GET: &[u8] = b"GET";
pub const CMD_SET: &[u8] = b"SET";
pub const CMD_DEL: &[u8] = b"DEL";
pub const CMD_PING: &[u8] = b"PING";
pub const CMD_INFO: &[u8] = b"INFO";
pub const CMD_MULTI: &[u8] = b"MULTI";
pub const CMD_EXEC: &[u8] = b"EXEC";
pub const CMD_DISCARD: &[u8] = b"DISCARD";

/// Number of slots in a bucket; probing scans all of them before advancing.
pub const BUCKET_SIZE: usize = 4;
/// Cap on quadratic probing attempts per shard operation.
pub const MAX_READ_WRITE_ATTEMPTS: u32 = 5;
/// Resize is triggered once live entries reach this percentage of table size.
pub const RESIZE_THRESHOLD_PERCENTAGE: u64 = 70;
/// Values at or above this length are eligible for gzip compression.
pub const MIN_SIZE_TO_COMPRESS: usize = 30;

/// Default settings baseline, mirroring `KeyValueStoreSettings`.
pub const DEFAULT_INITIAL_TABLE_SIZE: u64 = 2053;
pub const DEFAULT_NUM_SHARDS: usize = 24;
pub const DEFAULT_SOCK_BUF_SIZE: usize = 1_048_576;
pub const DEFAULT_CONN_QUEUE_LIMIT: u32 = 1_048_576;
pub const METRICS_UPDATE_FREQUENCY_SEC: u64 = 4;

/// Hard cap on a single connection's accumulated, unframed read buffer.
pub const MAX_REQUEST_SIZE: usize = 512 * 1024 * 1024;
/// Chunk size used for each individual `recv` during a read-drain iteration.
pub const READ_BUFFER_SIZE: usize = 16_384;
