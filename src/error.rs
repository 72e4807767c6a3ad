//! Error types for wblog
//!
//! One error enum covers the whole logging subsystem. Variants fall into three
//! groups: broken caller contracts (precondition faults), allocation failures
//! while buffering (resource faults), and stable-storage failures (durability
//! faults). Precondition faults never leave the pool half-modified.

use std::fmt;
use std::io;

use crate::logging::types::TxnId;

/// Unified error type for the logging subsystem
#[derive(Debug)]
pub enum WalError {
    /// I/O error while writing or reading the log
    Io(io::Error),
    /// A record could not be encoded or decoded
    Serialization(String),
    /// `create_txn_log_list` called twice for the same transaction
    DuplicateTxnLogList(TxnId),
    /// The transaction has no log list in the pool
    MissingTxnLogList(TxnId),
    /// A commit/abort decision was reported twice for a pending transaction
    DuplicateDecision(TxnId),
    /// A backend logger was handed a record for a transaction it does not own
    ForeignTransaction { expected: Option<TxnId>, found: TxnId },
    /// A record violates the format contract (e.g. INSERT without an image)
    InvalidRecord(String),
    /// Buffering a record failed to allocate; nothing was appended
    OutOfMemory(TxnId),
    /// The frontend logger hit a durability fault and stopped acknowledging commits
    LoggerHalted,
    /// A frame in the durable log could not be parsed
    Corrupted(String),
    /// Waiting for a commit latch timed out
    Timeout(String),
    /// Internal plumbing failure (poisoned lock, closed channel)
    Internal(String),
}

impl WalError {
    /// Errors raised because a caller broke the pool or logger contract
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            WalError::DuplicateTxnLogList(_)
                | WalError::MissingTxnLogList(_)
                | WalError::DuplicateDecision(_)
                | WalError::ForeignTransaction { .. }
                | WalError::InvalidRecord(_)
        )
    }

    /// Errors that break the commit-durability promise
    pub fn is_durability(&self) -> bool {
        matches!(
            self,
            WalError::Io(_) | WalError::Serialization(_) | WalError::LoggerHalted
        )
    }

    pub(crate) fn poisoned(what: &str) -> Self {
        WalError::Internal(format!("{} lock poisoned", what))
    }
}

impl fmt::Display for WalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalError::Io(e) => write!(f, "I/O error: {}", e),
            WalError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            WalError::DuplicateTxnLogList(txn_id) => {
                write!(f, "Log list for transaction {} already exists", txn_id)
            }
            WalError::MissingTxnLogList(txn_id) => {
                write!(f, "No log list for transaction {}", txn_id)
            }
            WalError::DuplicateDecision(txn_id) => {
                write!(f, "Transaction {} already has a pending decision", txn_id)
            }
            WalError::ForeignTransaction { expected, found } => match expected {
                Some(expected) => write!(
                    f,
                    "Record for transaction {} handed to logger of transaction {}",
                    found, expected
                ),
                None => write!(
                    f,
                    "Record for transaction {} handed to idle backend logger",
                    found
                ),
            },
            WalError::InvalidRecord(msg) => write!(f, "Invalid log record: {}", msg),
            WalError::OutOfMemory(txn_id) => {
                write!(f, "Out of memory buffering record for transaction {}", txn_id)
            }
            WalError::LoggerHalted => write!(f, "Frontend logger halted after durability fault"),
            WalError::Corrupted(msg) => write!(f, "Corrupted log: {}", msg),
            WalError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            WalError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for WalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WalError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for WalError {
    fn from(e: io::Error) -> Self {
        WalError::Io(e)
    }
}

impl From<bincode::Error> for WalError {
    fn from(e: bincode::Error) -> Self {
        WalError::Serialization(e.to_string())
    }
}

/// Result type alias for logging operations
pub type Result<T> = std::result::Result<T, WalError>;
