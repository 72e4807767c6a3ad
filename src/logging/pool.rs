//! Per-transaction buffer of not-yet-flushed log records
//!
//! The pool maps a transaction ID to the records appended for it, in append
//! order. Backends create and fill lists; only the frontend logger (this crate's
//! `logging` module) can take lists out or clear the pool. One mutex guards the
//! whole map and is held only for the map operation itself, never across
//! serialization or I/O.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::{Result, WalError};
use super::record::TupleRecord;
use super::types::TxnId;

/// Transient table of log records keyed by transaction
#[derive(Debug, Default)]
pub struct LogRecordPool {
    txn_log_table: Mutex<HashMap<TxnId, Vec<TupleRecord>>>,
}

impl LogRecordPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> Result<MutexGuard<'_, HashMap<TxnId, Vec<TupleRecord>>>> {
        self.txn_log_table
            .lock()
            .map_err(|_| WalError::poisoned("txn_log_table"))
    }

    /// Open an empty log list for `txn_id`.
    ///
    /// A transaction begins its list exactly once; a second call is a fault.
    pub fn create_txn_log_list(&self, txn_id: TxnId) -> Result<()> {
        let mut table = self.table()?;
        if table.contains_key(&txn_id) {
            return Err(WalError::DuplicateTxnLogList(txn_id));
        }
        table.insert(txn_id, Vec::new());
        Ok(())
    }

    /// Append `record` to its transaction's list and return its position.
    ///
    /// Takes ownership of the record. Fails without touching the pool if the
    /// list does not exist or the append cannot allocate.
    pub fn add_log_record(&self, record: TupleRecord) -> Result<usize> {
        let txn_id = record.transaction_id();
        let mut table = self.table()?;
        let list = table
            .get_mut(&txn_id)
            .ok_or(WalError::MissingTxnLogList(txn_id))?;
        list.try_reserve(1)
            .map_err(|_| WalError::OutOfMemory(txn_id))?;
        list.push(record);
        Ok(list.len() - 1)
    }

    /// Whether a list exists for `txn_id`
    pub fn exists_txn_log_record_list(&self, txn_id: TxnId) -> Result<bool> {
        Ok(self.table()?.contains_key(&txn_id))
    }

    /// Number of records buffered for `txn_id`, if it has a list
    pub fn txn_record_count(&self, txn_id: TxnId) -> Result<Option<usize>> {
        Ok(self.table()?.get(&txn_id).map(Vec::len))
    }

    /// Whether no transaction has a list
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.table()?.is_empty())
    }

    /// Number of transactions with a list
    pub fn len(&self) -> Result<usize> {
        Ok(self.table()?.len())
    }

    /// Take the whole list for `txn_id` out of the pool.
    ///
    /// Ownership of every record passes to the caller, which either serializes
    /// them (commit) or drops them (abort).
    pub(crate) fn remove_txn_log_record_list(&self, txn_id: TxnId) -> Result<Vec<TupleRecord>> {
        self.table()?
            .remove(&txn_id)
            .ok_or(WalError::MissingTxnLogList(txn_id))
    }

    /// Drop every buffered list. Returns how many transactions were discarded.
    pub(crate) fn clear(&self) -> Result<usize> {
        let mut table = self.table()?;
        let discarded = table.len();
        table.clear();
        Ok(discarded)
    }
}
