//! Shard routing and command dispatch for both wire protocols.
//!
//! Grounded on `src/server/server.cpp`'s `processRequestSync` and its
//! `handleGet`/`handleSet`/`handleDel` lambdas, and on the RESP transaction
//! handling around `ensureRespTransaction`/`queueRespCommand`. Both
//! protocols funnel GET/SET/DEL through the same `execute_*` methods; only
//! the response encoding differs.

use std::sync::Arc;

use cachekv_common::wire::{
    CMD_DEL, CMD_DISCARD, CMD_EXEC, CMD_GET, CMD_INFO, CMD_MULTI, CMD_PING, CMD_SET,
    CUSTOM_ERR_INTERNAL, CUSTOM_ERR_INVALID_FORMAT, CUSTOM_ERR_KEY_NOT_EXISTS,
    CUSTOM_ERR_UNKNOWN_COMMAND, RESP_DISCARD_NO_MULTI, RESP_EXEC_ABORTED, RESP_EXEC_NO_MULTI,
    RESP_MULTI_NESTED, RESP_UNABLE_TO_PARSE,
};
use cachekv_core::{hash_key, Shard, ShardSettings};
use cachekv_protocol::{custom, resp, Protocol, ResponsePacket};

use crate::metrics::Metrics;
use crate::transaction::{CommandKind, RespTransaction};

pub struct Dispatcher {
    shards: Vec<Shard>,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    pub fn new(num_shards: usize, shard_settings: ShardSettings, metrics: Arc<Metrics>) -> Self {
        let shards = (0..num_shards.max(1)).map(|_| Shard::new(shard_settings.clone())).collect();
        Dispatcher { shards, metrics }
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    fn shard_index(&self, hash: u64) -> usize {
        (hash % self.shards.len() as u64) as usize
    }

    fn execute_get(&mut self, key: &[u8], protocol: Protocol) -> ResponsePacket {
        let hash = hash_key(key);
        let idx = self.shard_index(hash);
        let value = self.shards[idx].get(key, hash);
        match protocol {
            Protocol::Resp => resp::make_bulk(value.as_deref()),
            Protocol::Custom => match value {
                Some(v) => custom::make_value(&v),
                None => custom::make_nil(),
            },
        }
    }

    fn execute_set(&mut self, key: &[u8], value: &[u8], protocol: Protocol) -> ResponsePacket {
        let hash = hash_key(key);
        let idx = self.shard_index(hash);
        match self.shards[idx].set(key, value, hash) {
            Ok(()) => match protocol {
                Protocol::Resp => resp::make_simple(b"OK"),
                Protocol::Custom => custom::make_ok(),
            },
            Err(_) => {
                self.metrics.record_error();
                match protocol {
                    Protocol::Resp => resp::make_legacy_error(b"internal error"),
                    Protocol::Custom => custom::make_error(CUSTOM_ERR_INTERNAL),
                }
            }
        }
    }

    fn execute_del(&mut self, key: &[u8], protocol: Protocol) -> ResponsePacket {
        let hash = hash_key(key);
        let idx = self.shard_index(hash);
        match self.shards[idx].del(key, hash) {
            Ok(()) => match protocol {
                Protocol::Resp => resp::make_integer(1),
                Protocol::Custom => custom::make_ok(),
            },
            Err(_) => match protocol {
                Protocol::Resp => resp::make_integer(0),
                Protocol::Custom => custom::make_error(CUSTOM_ERR_KEY_NOT_EXISTS),
            },
        }
    }

    /// Handles one already-delimited custom-framing payload (the frame's
    /// bytes, separator excluded).
    pub fn handle_custom(&mut self, payload: &[u8]) -> ResponsePacket {
        self.metrics.record_request();

        if payload == CMD_PING {
            return custom::make_value(b"PONG");
        }

        let parts = match custom::parse_frame(payload) {
            Some(p) => p,
            None => {
                self.metrics.record_error();
                return custom::make_error(CUSTOM_ERR_INVALID_FORMAT);
            }
        };

        match parts.command {
            CMD_GET => self.execute_get(parts.key, Protocol::Custom),
            CMD_SET => match parts.value {
                Some(v) => self.execute_set(parts.key, v, Protocol::Custom),
                None => {
                    self.metrics.record_error();
                    custom::make_error(CUSTOM_ERR_INVALID_FORMAT)
                }
            },
            CMD_DEL => self.execute_del(parts.key, Protocol::Custom),
            _ => {
                self.metrics.record_error();
                custom::make_error(CUSTOM_ERR_UNKNOWN_COMMAND)
            }
        }
    }

    /// Handles one already-delimited RESP frame against the connection's
    /// transaction state, implementing the Idle/Active/Active-Aborted state
    /// machine from spec.md §4.4.
    pub fn handle_resp(&mut self, frame: &[u8], tx: &mut RespTransaction) -> ResponsePacket {
        self.metrics.record_request();

        let parts = match resp::parse_command(frame) {
            Some(p) => p,
            None => {
                self.metrics.record_error();
                if tx.active {
                    tx.aborted = true;
                }
                return resp::make_legacy_error(RESP_UNABLE_TO_PARSE);
            }
        };

        if tx.active && tx.aborted {
            return match parts.command {
                CMD_DISCARD if parts.argc == 1 => {
                    tx.reset();
                    resp::make_simple(b"OK")
                }
                CMD_EXEC if parts.argc == 1 => {
                    tx.reset();
                    self.metrics.record_error();
                    resp::make_legacy_error(RESP_EXEC_ABORTED)
                }
                _ => {
                    self.metrics.record_error();
                    resp::make_legacy_error(RESP_UNABLE_TO_PARSE)
                }
            };
        }

        match parts.command {
            CMD_MULTI => self.handle_multi(tx, parts.argc),
            CMD_DISCARD => self.handle_discard(tx, parts.argc),
            CMD_EXEC => self.handle_exec(tx, parts.argc),
            CMD_GET => self.handle_get_cmd(tx, &parts),
            CMD_SET => self.handle_set_cmd(tx, &parts),
            CMD_DEL => self.handle_del_cmd(tx, &parts),
            CMD_PING => self.handle_ping(&parts),
            CMD_INFO => self.handle_info(&parts),
            _ => {
                self.metrics.record_error();
                if tx.active {
                    tx.aborted = true;
                }
                resp::make_legacy_error(b"unknown command")
            }
        }
    }

    fn handle_multi(&mut self, tx: &mut RespTransaction, argc: usize) -> ResponsePacket {
        if tx.active {
            tx.aborted = true;
            self.metrics.record_error();
            return resp::make_legacy_error(RESP_MULTI_NESTED);
        }
        if argc != 1 {
            self.metrics.record_error();
            return resp::make_legacy_error(RESP_UNABLE_TO_PARSE);
        }
        tx.begin();
        resp::make_simple(b"OK")
    }

    fn handle_discard(&mut self, tx: &mut RespTransaction, argc: usize) -> ResponsePacket {
        if !tx.active {
            self.metrics.record_error();
            return resp::make_legacy_error(RESP_DISCARD_NO_MULTI);
        }
        if argc != 1 {
            tx.aborted = true;
            self.metrics.record_error();
            return resp::make_legacy_error(RESP_UNABLE_TO_PARSE);
        }
        tx.reset();
        resp::make_simple(b"OK")
    }

    fn handle_exec(&mut self, tx: &mut RespTransaction, argc: usize) -> ResponsePacket {
        if !tx.active {
            self.metrics.record_error();
            return resp::make_legacy_error(RESP_EXEC_NO_MULTI);
        }
        if argc != 1 {
            tx.aborted = true;
            self.metrics.record_error();
            return resp::make_legacy_error(RESP_UNABLE_TO_PARSE);
        }

        let queued = tx.take_queue();
        tx.reset();
        let results: Vec<ResponsePacket> = queued
            .into_iter()
            .map(|cmd| match cmd.kind {
                CommandKind::Get => self.execute_get(&cmd.key, Protocol::Resp),
                CommandKind::Set => self.execute_set(&cmd.key, cmd.value.as_deref().unwrap_or(&[]), Protocol::Resp),
                CommandKind::Del => self.execute_del(&cmd.key, Protocol::Resp),
            })
            .collect();
        resp::make_array(&results)
    }

    fn handle_get_cmd(&mut self, tx: &mut RespTransaction, parts: &resp::RespCommandParts<'_>) -> ResponsePacket {
        let key = match parts.key {
            Some(k) if parts.argc == 2 => k,
            _ => return self.malformed_in_transaction(tx),
        };
        if tx.active {
            tx.enqueue(CommandKind::Get, key.to_vec(), None);
            return resp::make_simple(b"QUEUED");
        }
        self.execute_get(key, Protocol::Resp)
    }

    fn handle_set_cmd(&mut self, tx: &mut RespTransaction, parts: &resp::RespCommandParts<'_>) -> ResponsePacket {
        let (key, value) = match (parts.key, parts.value) {
            (Some(k), Some(v)) if parts.argc == 3 => (k, v),
            _ => return self.malformed_in_transaction(tx),
        };
        if tx.active {
            tx.enqueue(CommandKind::Set, key.to_vec(), Some(value.to_vec()));
            return resp::make_simple(b"QUEUED");
        }
        self.execute_set(key, value, Protocol::Resp)
    }

    fn handle_del_cmd(&mut self, tx: &mut RespTransaction, parts: &resp::RespCommandParts<'_>) -> ResponsePacket {
        let key = match parts.key {
            Some(k) if parts.argc == 2 => k,
            _ => return self.malformed_in_transaction(tx),
        };
        if tx.active {
            tx.enqueue(CommandKind::Del, key.to_vec(), None);
            return resp::make_simple(b"QUEUED");
        }
        self.execute_del(key, Protocol::Resp)
    }

    fn malformed_in_transaction(&mut self, tx: &mut RespTransaction) -> ResponsePacket {
        self.metrics.record_error();
        if tx.active {
            tx.aborted = true;
        }
        resp::make_legacy_error(RESP_UNABLE_TO_PARSE)
    }

    fn handle_ping(&mut self, parts: &resp::RespCommandParts<'_>) -> ResponsePacket {
        match parts.argc {
            1 => resp::make_simple(b"PONG"),
            2 => resp::make_bulk(parts.key),
            _ => {
                self.metrics.record_error();
                resp::make_legacy_error(RESP_UNABLE_TO_PARSE)
            }
        }
    }

    fn handle_info(&mut self, parts: &resp::RespCommandParts<'_>) -> ResponsePacket {
        if parts.argc != 1 {
            self.metrics.record_error();
            return resp::make_legacy_error(RESP_UNABLE_TO_PARSE);
        }
        resp::make_bulk(Some(b"role:master\r\nengine:cachekv\r\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(4, ShardSettings::default(), Metrics::new())
    }

    #[test]
    fn custom_set_then_get_round_trips() {
        let mut d = dispatcher();
        assert_eq!(d.handle_custom(b"SET foo bar").as_bytes(), b"OK");
        assert_eq!(d.handle_custom(b"GET foo").as_bytes(), b"bar");
    }

    #[test]
    fn custom_ping_replies_pong() {
        let mut d = dispatcher();
        assert_eq!(d.handle_custom(b"PING").as_bytes(), b"PONG");
    }

    #[test]
    fn custom_get_of_missing_key_is_nil() {
        let mut d = dispatcher();
        assert_eq!(d.handle_custom(b"GET nope").as_bytes(), b"(nil)");
    }

    #[test]
    fn custom_unknown_command_is_an_error() {
        let mut d = dispatcher();
        assert_eq!(d.handle_custom(b"FOO bar").as_bytes(), CUSTOM_ERR_UNKNOWN_COMMAND);
    }

    #[test]
    fn resp_set_then_get_round_trips() {
        let mut d = dispatcher();
        let mut tx = RespTransaction::default();
        let frame = b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n";
        assert_eq!(d.handle_resp(frame, &mut tx).as_bytes(), b"+OK\r\n");
        let get = b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n";
        assert_eq!(d.handle_resp(get, &mut tx).as_bytes(), b"$3\r\nbar\r\n");
    }

    #[test]
    fn resp_multi_queues_commands_until_exec() {
        let mut d = dispatcher();
        let mut tx = RespTransaction::default();
        let multi = b"*1\r\n$5\r\nMULTI\r\n";
        assert_eq!(d.handle_resp(multi, &mut tx).as_bytes(), b"+OK\r\n");

        let set = b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n";
        assert_eq!(d.handle_resp(set, &mut tx).as_bytes(), b"+QUEUED\r\n");

        let get = b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n";
        assert_eq!(d.handle_resp(get, &mut tx).as_bytes(), b"+QUEUED\r\n");
        assert_eq!(tx.queue.len(), 2);

        let exec = b"*1\r\n$4\r\nEXEC\r\n";
        let result = d.handle_resp(exec, &mut tx);
        assert_eq!(result.as_bytes(), b"*2\r\n+OK\r\n$3\r\nbar\r\n");
        assert!(!tx.active);
    }

    #[test]
    fn resp_nested_multi_aborts_the_transaction() {
        let mut d = dispatcher();
        let mut tx = RespTransaction::default();
        let multi = b"*1\r\n$5\r\nMULTI\r\n";
        d.handle_resp(multi, &mut tx);
        let nested = d.handle_resp(multi, &mut tx);
        assert_eq!(nested.as_bytes(), b"-ERR MULTI nested\r\n");
        assert!(tx.active && tx.aborted);

        let get = b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n";
        let reply = d.handle_resp(get, &mut tx);
        assert_eq!(reply.as_bytes(), b"-ERR ERROR: Unable to parse request\r\n");
        assert!(tx.active && tx.aborted);
    }

    #[test]
    fn resp_exec_of_aborted_transaction_drops_the_queue() {
        let mut d = dispatcher();
        let mut tx = RespTransaction::default();
        d.handle_resp(b"*1\r\n$5\r\nMULTI\r\n", &mut tx);
        d.handle_resp(b"*1\r\n$5\r\nMULTI\r\n", &mut tx); // abort
        let exec = d.handle_resp(b"*1\r\n$4\r\nEXEC\r\n", &mut tx);
        assert_eq!(exec.as_bytes(), b"-ERR EXEC aborted due to prior errors\r\n");
        assert!(!tx.active);
    }

    #[test]
    fn resp_exec_without_multi_is_an_error() {
        let mut d = dispatcher();
        let mut tx = RespTransaction::default();
        let exec = d.handle_resp(b"*1\r\n$4\r\nEXEC\r\n", &mut tx);
        assert_eq!(exec.as_bytes(), b"-ERR EXEC without MULTI\r\n");
    }

    #[test]
    fn resp_discard_clears_the_queue() {
        let mut d = dispatcher();
        let mut tx = RespTransaction::default();
        d.handle_resp(b"*1\r\n$5\r\nMULTI\r\n", &mut tx);
        d.handle_resp(b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n", &mut tx);
        let discard = d.handle_resp(b"*1\r\n$7\r\nDISCARD\r\n", &mut tx);
        assert_eq!(discard.as_bytes(), b"+OK\r\n");
        assert!(!tx.active);
        assert!(tx.queue.is_empty());
    }

    #[test]
    fn resp_ping_with_no_args_is_pong() {
        let mut d = dispatcher();
        let mut tx = RespTransaction::default();
        let ping = d.handle_resp(b"*1\r\n$4\r\nPING\r\n", &mut tx);
        assert_eq!(ping.as_bytes(), b"+PONG\r\n");
    }

    #[test]
    fn resp_unparseable_frame_is_an_error_and_does_not_panic() {
        let mut d = dispatcher();
        let mut tx = RespTransaction::default();
        let reply = d.handle_resp(b"not resp at all", &mut tx);
        assert_eq!(reply.as_bytes(), b"-ERR ERROR: Unable to parse request\r\n");
    }
}
