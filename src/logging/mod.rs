//! Write-behind logging
//!
//! Backends buffer every tuple mutation in a per-transaction list inside the
//! shared [`LogRecordPool`]. Nothing reaches the log file until the
//! transaction's fate is known: the frontend logger serializes a committed
//! transaction's records contiguously and in program order, and drops an
//! aborted transaction's records unwritten. The log therefore only ever holds
//! committed work, and recovery never has to undo anything.
//!
//! - **Backends** ([`BackendLogger`]) create lists and append to them
//! - **The frontend** ([`WriteBehindFrontendLogger`]) is the only remover
//! - **Clients** wait on a [`CommitTicket`] before acknowledging a commit

pub mod backend;
pub mod config;
pub mod frontend;
pub mod manager;
pub mod pool;
pub mod reader;
pub mod record;
pub mod sink;
pub mod types;
pub mod worker;

pub use backend::{BackendLogger, WriteBehindBackendLogger};
pub use config::LoggerConfig;
pub use frontend::{CommitLatch, Decision, DecisionQueue, FlushReport, WriteBehindFrontendLogger};
pub use manager::{CommitTicket, LogManager};
pub use pool::LogRecordPool;
pub use reader::{group_by_transaction, read_log_file, LogReader};
pub use record::TupleRecord;
pub use sink::{FileLogSink, LogSink, MemoryLogSink};
pub use types::{CommitSeq, ItemPointer, LogRecordType, LoggerStatus, TableId, TxnId, TxnOutcome};
