//! wblog - write-behind transaction logging
//!
//! Tuple changes are buffered per transaction and only written to the log
//! once the transaction commits. Aborted work never touches the disk.
//!
//! ```text
//!  backend workers            frontend logger thread
//!  ───────────────            ──────────────────────
//!  begin ─► create list
//!  insert/update/delete ─►  LogRecordPool
//!  commit/abort ─► DecisionQueue ─► flush pass ─► LogSink (append + sync)
//!                                        │
//!  wait_for_commit ◄──── CommitLatch ◄───┘
//! ```

pub mod error;
pub mod logging;

pub use error::{Result, WalError};
pub use logging::{
    BackendLogger, CommitTicket, FlushReport, LogManager, LogRecordPool, LoggerConfig,
    TupleRecord, WriteBehindBackendLogger, WriteBehindFrontendLogger,
};
