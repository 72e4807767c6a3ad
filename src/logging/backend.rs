//! Backend (producer-side) loggers
//!
//! One backend logger serves one worker connection. It opens the log list of
//! the transaction the connection is running and appends that transaction's
//! records to the pool. It can never take records out of the pool.

use std::sync::Arc;

use crate::error::{Result, WalError};
use super::pool::LogRecordPool;
use super::record::TupleRecord;
use super::types::{ItemPointer, TableId, TxnId};

/// Producer interface used by query execution to log tuple mutations.
pub trait BackendLogger: Send {
    /// Start logging for `txn_id`. Opens its log list in the pool.
    fn begin_transaction(&mut self, txn_id: TxnId) -> Result<()>;

    /// Hand `record` to the pool. Returns its position within the transaction.
    fn log(&mut self, record: TupleRecord) -> Result<usize>;

    /// Stop logging for the current transaction (after the decision is reported)
    fn end_transaction(&mut self);

    /// Transaction currently being logged, if any
    fn current_transaction(&self) -> Option<TxnId>;

    fn log_insert(&mut self, table_id: TableId, location: ItemPointer, image: Vec<u8>) -> Result<usize> {
        let txn_id = self.require_transaction()?;
        self.log(TupleRecord::insert(txn_id, table_id, location, image)?)
    }

    fn log_update(&mut self, table_id: TableId, location: ItemPointer, image: Vec<u8>) -> Result<usize> {
        let txn_id = self.require_transaction()?;
        self.log(TupleRecord::update(txn_id, table_id, location, image)?)
    }

    fn log_delete(
        &mut self,
        table_id: TableId,
        location: ItemPointer,
        image: Option<Vec<u8>>,
    ) -> Result<usize> {
        let txn_id = self.require_transaction()?;
        self.log(TupleRecord::delete(txn_id, table_id, location, image)?)
    }

    fn require_transaction(&self) -> Result<TxnId> {
        self.current_transaction()
            .ok_or_else(|| WalError::InvalidRecord("no transaction in progress".to_string()))
    }
}

/// Backend logger that buffers records in the shared [`LogRecordPool`]
pub struct WriteBehindBackendLogger {
    pool: Arc<LogRecordPool>,
    current_txn: Option<TxnId>,
    records_logged: u64,
}

impl WriteBehindBackendLogger {
    pub fn new(pool: Arc<LogRecordPool>) -> Self {
        Self {
            pool,
            current_txn: None,
            records_logged: 0,
        }
    }

    /// Records appended by this logger over its lifetime
    pub fn records_logged(&self) -> u64 {
        self.records_logged
    }
}

impl BackendLogger for WriteBehindBackendLogger {
    fn begin_transaction(&mut self, txn_id: TxnId) -> Result<()> {
        if let Some(current) = self.current_txn {
            return Err(WalError::ForeignTransaction {
                expected: Some(current),
                found: txn_id,
            });
        }
        self.pool.create_txn_log_list(txn_id)?;
        self.current_txn = Some(txn_id);
        Ok(())
    }

    fn log(&mut self, record: TupleRecord) -> Result<usize> {
        if self.current_txn != Some(record.transaction_id()) {
            return Err(WalError::ForeignTransaction {
                expected: self.current_txn,
                found: record.transaction_id(),
            });
        }
        let index = self.pool.add_log_record(record)?;
        self.records_logged += 1;
        Ok(index)
    }

    fn end_transaction(&mut self) {
        self.current_txn = None;
    }

    fn current_transaction(&self) -> Option<TxnId> {
        self.current_txn
    }
}
