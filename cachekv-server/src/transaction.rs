//! RESP `MULTI`/`EXEC`/`DISCARD` transaction state, one instance per
//! connection.
//!
//! Grounded on `src/server/server.cpp`'s `RespTransactionState`
//! (`ensureRespTransaction`/`markRespTransactionError`/`queueRespCommand`).
//! Custom-framed connections never touch this — only the RESP dispatch path
//! reads and mutates it.

/// One command captured between `MULTI` and `EXEC`/`DISCARD`.
pub struct QueuedCommand {
    pub kind: CommandKind,
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Get,
    Set,
    Del,
}

/// `active=false` is Idle. `active=true, aborted=false` is Active.
/// `active=true, aborted=true` is Active-Aborted.
#[derive(Default)]
pub struct RespTransaction {
    pub active: bool,
    pub aborted: bool,
    pub queue: Vec<QueuedCommand>,
}

impl RespTransaction {
    pub fn begin(&mut self) {
        self.active = true;
        self.aborted = false;
        self.queue.clear();
    }

    /// Returns to Idle, dropping any queued commands.
    pub fn reset(&mut self) {
        self.active = false;
        self.aborted = false;
        self.queue.clear();
    }

    pub fn enqueue(&mut self, kind: CommandKind, key: Vec<u8>, value: Option<Vec<u8>>) {
        self.queue.push(QueuedCommand { kind, key, value });
    }

    pub fn take_queue(&mut self) -> Vec<QueuedCommand> {
        std::mem::take(&mut self.queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_clears_any_previously_queued_commands() {
        let mut tx = RespTransaction::default();
        tx.begin();
        tx.enqueue(CommandKind::Get, b"k".to_vec(), None);
        tx.begin();
        assert!(tx.queue.is_empty());
        assert!(tx.active);
        assert!(!tx.aborted);
    }

    #[test]
    fn reset_returns_to_idle() {
        let mut tx = RespTransaction::default();
        tx.begin();
        tx.aborted = true;
        tx.reset();
        assert!(!tx.active);
        assert!(!tx.aborted);
    }
}
