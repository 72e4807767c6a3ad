//! Log manager: the entry point that wires the pool, the decision queue, the
//! commit latch and the frontend logger thread together.
//!
//! ## Write-behind protocol
//!
//! 1. BEGIN: a backend logger opens the transaction's list in the pool
//! 2. INSERT/UPDATE/DELETE: records are appended to that list, in program order
//! 3. COMMIT: the decision is queued and the client gets a [`CommitTicket`];
//!    waiting on the ticket returns once a flush covering the transaction's
//!    records has been synced
//! 4. ABORT: the decision is queued; the list is dropped on the next pass and
//!    none of its records ever reach the log
//!
//! Group commit falls out of the cadence: every decision queued between two
//! passes shares one sink write and one sync.

use std::sync::Arc;

use crate::error::{Result, WalError};
use super::backend::WriteBehindBackendLogger;
use super::config::LoggerConfig;
use super::frontend::{CommitLatch, DecisionQueue, FlushReport, WriteBehindFrontendLogger};
use super::pool::LogRecordPool;
use super::sink::{FileLogSink, LogSink};
use super::types::{CommitSeq, LoggerStatus, TxnId, TxnOutcome};
use super::worker::FrontendWorkerHandle;

/// Proof that a commit was queued; wait on it before acknowledging the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitTicket {
    pub txn_id: TxnId,
    /// Position in commit-signal order; durable once the latch reaches it
    pub commit_seq: CommitSeq,
}

/// The write-behind logging subsystem
pub struct LogManager {
    pool: Arc<LogRecordPool>,
    decisions: Arc<DecisionQueue>,
    latch: Arc<CommitLatch>,
    worker: FrontendWorkerHandle,
    config: LoggerConfig,
}

impl LogManager {
    /// Start logging to the file at `config.log_path`
    pub fn open(config: LoggerConfig) -> Result<Self> {
        let sink = FileLogSink::open(&config.log_path)?;
        log::info!("Opened log file {:?} ({} bytes)", sink.path(), sink.bytes_written());
        Self::with_sink(Box::new(sink), config)
    }

    /// Start logging to an arbitrary sink
    pub fn with_sink(sink: Box<dyn LogSink>, config: LoggerConfig) -> Result<Self> {
        let pool = Arc::new(LogRecordPool::new());
        let decisions = Arc::new(DecisionQueue::new());
        let latch = Arc::new(CommitLatch::new());

        let logger = WriteBehindFrontendLogger::new(
            Arc::clone(&pool),
            Arc::clone(&decisions),
            Arc::clone(&latch),
            sink,
            config.clone(),
        );
        let worker = FrontendWorkerHandle::spawn(logger, Arc::clone(&latch))?;

        Ok(Self {
            pool,
            decisions,
            latch,
            worker,
            config,
        })
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    /// Producer-side view of the pool, for backends and diagnostics
    pub fn pool(&self) -> Arc<LogRecordPool> {
        Arc::clone(&self.pool)
    }

    /// A backend logger for one worker connection
    pub fn backend_logger(&self) -> WriteBehindBackendLogger {
        WriteBehindBackendLogger::new(Arc::clone(&self.pool))
    }

    /// Queue the commit of `txn_id`.
    ///
    /// Do not acknowledge the commit to a client until
    /// [`wait_for_commit`](Self::wait_for_commit) on the ticket succeeds.
    pub fn commit(&self, txn_id: TxnId) -> Result<CommitTicket> {
        if self.latch.is_halted() {
            return Err(WalError::LoggerHalted);
        }

        self.require_log_list(txn_id)?;

        let (decision, pending) = self.decisions.report(txn_id, TxnOutcome::Committed)?;
        self.maybe_wake(pending);

        Ok(CommitTicket {
            txn_id,
            commit_seq: decision.commit_seq.unwrap_or_default(),
        })
    }

    /// Block until the flush covering `ticket` has been synced
    pub fn wait_for_commit(&self, ticket: &CommitTicket) -> Result<()> {
        self.latch
            .wait_for_durable(ticket.commit_seq, self.config.commit_timeout())
    }

    /// Queue the commit of `txn_id` and wait until it is durable
    pub fn commit_durable(&self, txn_id: TxnId) -> Result<()> {
        let ticket = self.commit(txn_id)?;
        self.wait_for_commit(&ticket)
    }

    /// Queue the abort of `txn_id`; its buffered records will be discarded
    pub fn abort(&self, txn_id: TxnId) -> Result<()> {
        if self.latch.is_halted() {
            return Err(WalError::LoggerHalted);
        }
        self.require_log_list(txn_id)?;

        let (_, pending) = self.decisions.report(txn_id, TxnOutcome::Aborted)?;
        self.maybe_wake(pending);
        Ok(())
    }

    /// A transaction is decided once, and only after it began logging
    fn require_log_list(&self, txn_id: TxnId) -> Result<()> {
        if !self.pool.exists_txn_log_record_list(txn_id)? {
            log::error!("Decision for transaction {} without a log list", txn_id);
            return Err(WalError::MissingTxnLogList(txn_id));
        }
        Ok(())
    }

    fn maybe_wake(&self, pending: usize) {
        if pending >= self.config.backpressure_threshold {
            self.worker.wake();
        }
    }

    /// Drain every pending decision now
    pub fn force_flush(&self) -> Result<FlushReport> {
        self.worker.force_flush()
    }

    /// Highest commit sequence covered by a synced flush
    pub fn durable_commit_seq(&self) -> CommitSeq {
        self.latch.durable_seq()
    }

    /// Decisions queued but not yet handled by a flush pass
    pub fn pending_decisions(&self) -> Result<usize> {
        self.decisions.pending()
    }

    pub fn status(&self) -> LoggerStatus {
        self.latch.status()
    }

    /// Final drain, then discard every undecided transaction's buffered records
    pub fn shutdown(mut self) -> Result<FlushReport> {
        self.worker.shutdown()
    }
}
