//! Write-behind frontend logger
//!
//! Transactions buffer their records in the [`LogRecordPool`] while they run.
//! When the transaction manager decides a transaction, the decision is queued
//! here. On each flush pass the frontend logger:
//!
//! 1. Takes a snapshot of the queued decisions, in the order they were signaled
//! 2. For each commit: takes the transaction's list out of the pool and
//!    serializes it, in buffered order, into a private output buffer
//! 3. For each abort: takes the list out of the pool and drops it unwritten
//! 4. Writes the output buffer to the sink and syncs it (one group commit)
//! 5. Only then advances the commit latch, releasing every waiting client
//!    whose commit the group covered
//!
//! The pool lock is held only while a list is taken out; serialization and
//! I/O run on the logger's private buffer. A write or sync failure halts the
//! logger: the latch is poisoned and no later commit is acknowledged.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::{Result, WalError};
use super::config::LoggerConfig;
use super::pool::LogRecordPool;
use super::record::TupleRecord;
use super::sink::LogSink;
use super::types::{CommitSeq, LoggerStatus, TxnId, TxnOutcome};

/// A commit or abort decision waiting for the next flush pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub txn_id: TxnId,
    pub outcome: TxnOutcome,
    /// Set for commits; position in commit-signal order
    pub commit_seq: Option<CommitSeq>,
}

#[derive(Default)]
struct DecisionState {
    pending: VecDeque<Decision>,
    pending_ids: HashSet<TxnId>,
    last_commit_seq: CommitSeq,
}

/// Queue of decided transactions, filled by the transaction manager and
/// drained by the frontend logger.
#[derive(Default)]
pub struct DecisionQueue {
    state: Mutex<DecisionState>,
}

impl DecisionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, DecisionState>> {
        self.state.lock().map_err(|_| WalError::poisoned("decision queue"))
    }

    /// Record the outcome of `txn_id`. Commits get the next commit sequence.
    ///
    /// Returns the assigned decision and the number of decisions now pending.
    pub fn report(&self, txn_id: TxnId, outcome: TxnOutcome) -> Result<(Decision, usize)> {
        let mut state = self.state()?;
        if state.pending_ids.contains(&txn_id) {
            return Err(WalError::DuplicateDecision(txn_id));
        }
        let commit_seq = match outcome {
            TxnOutcome::Committed => {
                state.last_commit_seq += 1;
                Some(state.last_commit_seq)
            }
            TxnOutcome::Aborted => None,
        };
        let decision = Decision {
            txn_id,
            outcome,
            commit_seq,
        };
        state.pending_ids.insert(txn_id);
        state.pending.push_back(decision);
        Ok((decision, state.pending.len()))
    }

    /// Number of decisions not yet taken by a flush pass
    pub fn pending(&self) -> Result<usize> {
        Ok(self.state()?.pending.len())
    }

    /// Highest commit sequence handed out so far
    pub fn last_commit_seq(&self) -> Result<CommitSeq> {
        Ok(self.state()?.last_commit_seq)
    }

    /// Take up to `max` decisions off the front of the queue
    pub(crate) fn take_batch(&self, max: usize) -> Result<Vec<Decision>> {
        let mut state = self.state()?;
        let count = state.pending.len().min(max.max(1));
        let batch: Vec<Decision> = state.pending.drain(..count).collect();
        for decision in &batch {
            state.pending_ids.remove(&decision.txn_id);
        }
        Ok(batch)
    }
}

/// Commit latch shared by the frontend logger and clients waiting on commits.
///
/// Tracks the highest commit sequence made durable and the logger status.
pub struct CommitLatch {
    durable_seq: AtomicU64,
    status: AtomicU8,
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl Default for CommitLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl CommitLatch {
    pub fn new() -> Self {
        Self {
            durable_seq: AtomicU64::new(0),
            status: AtomicU8::new(LoggerStatus::Standby.as_u8()),
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
        }
    }

    /// Highest commit sequence covered by a successful flush
    pub fn durable_seq(&self) -> CommitSeq {
        self.durable_seq.load(Ordering::Acquire)
    }

    pub fn status(&self) -> LoggerStatus {
        LoggerStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn is_halted(&self) -> bool {
        self.status() == LoggerStatus::Halted
    }

    /// Block until `seq` is durable.
    ///
    /// Fails with `LoggerHalted` if the logger stops on a durability fault, and
    /// with `Timeout` if `timeout` elapses first.
    pub fn wait_for_durable(&self, seq: CommitSeq, timeout: Duration) -> Result<()> {
        if self.durable_seq() >= seq {
            return Ok(());
        }

        let deadline = Instant::now() + timeout;
        let mut guard = self.mutex.lock().map_err(|_| WalError::poisoned("commit latch"))?;

        loop {
            if self.durable_seq() >= seq {
                return Ok(());
            }

            match self.status() {
                LoggerStatus::Halted => return Err(WalError::LoggerHalted),
                LoggerStatus::Terminate => {
                    return Err(WalError::Internal(format!(
                        "logger shut down before commit {} became durable",
                        seq
                    )))
                }
                _ => {}
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(WalError::Timeout(format!(
                    "waiting for commit {} to become durable (durable: {})",
                    seq,
                    self.durable_seq()
                )));
            }

            guard = self
                .condvar
                .wait_timeout(guard, remaining)
                .map_err(|_| WalError::poisoned("commit latch"))?
                .0;
        }
    }

    /// Advance the durable watermark to `seq` and wake waiters
    pub(crate) fn signal_durable(&self, seq: CommitSeq) {
        self.durable_seq.fetch_max(seq, Ordering::AcqRel);
        self.notify();
    }

    pub(crate) fn set_logging(&self) {
        let _ = self.status.compare_exchange(
            LoggerStatus::Standby.as_u8(),
            LoggerStatus::Logging.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Halted is terminal
    pub(crate) fn signal_halted(&self) {
        self.status.store(LoggerStatus::Halted.as_u8(), Ordering::Release);
        self.notify();
    }

    pub(crate) fn signal_shutdown(&self) {
        let mut current = self.status.load(Ordering::Acquire);
        while current != LoggerStatus::Halted.as_u8() {
            match self.status.compare_exchange_weak(
                current,
                LoggerStatus::Terminate.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(c) => current = c,
            }
        }
        self.notify();
    }

    fn notify(&self) {
        // Taking the mutex orders the update before any waiter's re-check
        drop(self.mutex.lock());
        self.condvar.notify_all();
    }
}

/// Outcome of one flush pass
#[derive(Debug, Default)]
pub struct FlushReport {
    /// Committed transactions written in this pass, in output order
    pub committed: Vec<TxnId>,
    /// Aborted transactions discarded in this pass
    pub aborted: Vec<TxnId>,
    /// Records serialized to the log
    pub records_written: usize,
    /// Records dropped with aborted transactions
    pub records_discarded: usize,
    /// Bytes handed to the sink
    pub bytes_written: usize,
    /// Highest commit sequence this pass made durable
    pub durable_seq: Option<CommitSeq>,
    /// Removal faults (e.g. a decision for a transaction with no list)
    pub faults: Vec<WalError>,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.committed.is_empty() && self.aborted.is_empty() && self.faults.is_empty()
    }
}

/// The single consumer of the pool. Owned by the logger thread.
pub struct WriteBehindFrontendLogger {
    pool: Arc<LogRecordPool>,
    decisions: Arc<DecisionQueue>,
    latch: Arc<CommitLatch>,
    sink: Box<dyn LogSink>,
    output: Vec<u8>,
    config: LoggerConfig,
}

impl WriteBehindFrontendLogger {
    pub fn new(
        pool: Arc<LogRecordPool>,
        decisions: Arc<DecisionQueue>,
        latch: Arc<CommitLatch>,
        sink: Box<dyn LogSink>,
        config: LoggerConfig,
    ) -> Self {
        Self {
            pool,
            decisions,
            latch,
            sink,
            output: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    /// Run one flush pass over the decisions queued so far
    pub fn flush(&mut self) -> Result<FlushReport> {
        if self.latch.is_halted() {
            return Err(WalError::LoggerHalted);
        }

        let batch = self.decisions.take_batch(self.config.max_batch_size)?;
        let mut report = FlushReport::default();
        if batch.is_empty() {
            return Ok(report);
        }

        let mut covered_seq: Option<CommitSeq> = None;
        for decision in batch {
            match decision.outcome {
                TxnOutcome::Committed => {
                    match self.pool.remove_txn_log_record_list(decision.txn_id) {
                        Ok(records) => {
                            if let Err(e) = self.serialize_transaction(decision.txn_id, &records, &mut report) {
                                return Err(self.halt(e));
                            }
                            report.committed.push(decision.txn_id);
                        }
                        Err(e) => {
                            log::error!("Commit of transaction {} has no log list: {}", decision.txn_id, e);
                            report.faults.push(e);
                        }
                    }
                    covered_seq = covered_seq.max(decision.commit_seq);
                }
                TxnOutcome::Aborted => match self.pool.remove_txn_log_record_list(decision.txn_id) {
                    Ok(records) => {
                        report.records_discarded += records.len();
                        report.aborted.push(decision.txn_id);
                    }
                    Err(e) => {
                        log::error!("Abort of transaction {} has no log list: {}", decision.txn_id, e);
                        report.faults.push(e);
                    }
                },
            }
        }

        if !self.output.is_empty() {
            match self.write_group() {
                Ok(bytes) => report.bytes_written = bytes,
                Err(e) => return Err(self.halt(e)),
            }
        }

        if let Some(seq) = covered_seq {
            self.latch.signal_durable(seq);
            report.durable_seq = Some(seq);
        }

        log::debug!(
            "Flush pass: {} committed, {} aborted, {} records, {} bytes",
            report.committed.len(),
            report.aborted.len(),
            report.records_written,
            report.bytes_written
        );

        Ok(report)
    }

    /// Flush until no decisions are pending. Returns the combined report.
    pub fn flush_all(&mut self) -> Result<FlushReport> {
        let mut total = FlushReport::default();
        while self.decisions.pending()? > 0 {
            let report = self.flush()?;
            total.committed.extend(report.committed);
            total.aborted.extend(report.aborted);
            total.records_written += report.records_written;
            total.records_discarded += report.records_discarded;
            total.bytes_written += report.bytes_written;
            total.durable_seq = total.durable_seq.max(report.durable_seq);
            total.faults.extend(report.faults);
        }
        Ok(total)
    }

    /// Drop every list still in the pool. Nothing discarded here was ever
    /// acknowledged as committed.
    pub fn reset(&mut self) -> Result<usize> {
        let discarded = self.pool.clear()?;
        if discarded > 0 {
            log::warn!("Discarded unflushed log lists of {} undecided transactions", discarded);
        }
        self.output.clear();
        Ok(discarded)
    }

    fn serialize_transaction(
        &mut self,
        txn_id: TxnId,
        records: &[TupleRecord],
        report: &mut FlushReport,
    ) -> Result<()> {
        let mark = self.output.len();
        let mut written = 0;
        for record in records {
            if let Err(e) = record.encode_into(&mut self.output) {
                self.output.truncate(mark);
                return Err(e);
            }
            written += 1;
        }
        if self.config.write_commit_markers {
            if let Err(e) = TupleRecord::commit(txn_id).encode_into(&mut self.output) {
                self.output.truncate(mark);
                return Err(e);
            }
            written += 1;
        }
        report.records_written += written;
        Ok(())
    }

    fn write_group(&mut self) -> Result<usize> {
        self.sink.append(&self.output)?;
        if self.config.sync_on_flush {
            self.sink.sync()?;
        }
        let bytes = self.output.len();
        self.output.clear();
        Ok(bytes)
    }

    fn halt(&mut self, e: WalError) -> WalError {
        log::error!("Frontend logger halted: {}", e);
        self.output.clear();
        self.latch.signal_halted();
        e
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::reader::LogReader;
    use crate::logging::sink::MemoryLogSink;
    use crate::logging::types::{ItemPointer, LogRecordType};
    use std::io;
    use std::thread;

    struct FailingSink;

    impl LogSink for FailingSink {
        fn append(&mut self, _bytes: &[u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }

        fn sync(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct Fixture {
        pool: Arc<LogRecordPool>,
        decisions: Arc<DecisionQueue>,
        latch: Arc<CommitLatch>,
        sink: MemoryLogSink,
        logger: WriteBehindFrontendLogger,
    }

    fn fixture(config: LoggerConfig) -> Fixture {
        let pool = Arc::new(LogRecordPool::new());
        let decisions = Arc::new(DecisionQueue::new());
        let latch = Arc::new(CommitLatch::new());
        let sink = MemoryLogSink::new();
        let logger = WriteBehindFrontendLogger::new(
            Arc::clone(&pool),
            Arc::clone(&decisions),
            Arc::clone(&latch),
            Box::new(sink.clone()),
            config,
        );
        Fixture {
            pool,
            decisions,
            latch,
            sink,
            logger,
        }
    }

    fn insert(txn_id: TxnId, slot: u32) -> TupleRecord {
        TupleRecord::insert(txn_id, 1, ItemPointer::new(0, slot), vec![slot as u8]).unwrap()
    }

    fn decode(bytes: &[u8]) -> Vec<TupleRecord> {
        LogReader::new(bytes).collect::<Result<Vec<_>>>().unwrap()
    }

    #[test]
    fn test_commit_writes_records_in_order() {
        let mut f = fixture(LoggerConfig::default());
        f.pool.create_txn_log_list(7).unwrap();
        f.pool.add_log_record(insert(7, 1)).unwrap();
        f.pool
            .add_log_record(TupleRecord::update(7, 1, ItemPointer::new(0, 1), vec![2]).unwrap())
            .unwrap();
        f.decisions.report(7, TxnOutcome::Committed).unwrap();

        let report = f.logger.flush().unwrap();
        assert_eq!(report.committed, vec![7]);
        assert_eq!(report.records_written, 2);
        assert_eq!(report.durable_seq, Some(1));
        assert_eq!(f.latch.durable_seq(), 1);
        assert_eq!(f.sink.sync_count(), 1);
        assert!(!f.pool.exists_txn_log_record_list(7).unwrap());

        let mut expected = Vec::new();
        insert(7, 1).encode_into(&mut expected).unwrap();
        TupleRecord::update(7, 1, ItemPointer::new(0, 1), vec![2])
            .unwrap()
            .encode_into(&mut expected)
            .unwrap();
        assert_eq!(f.sink.contents(), expected);
    }

    #[test]
    fn test_abort_writes_nothing() {
        let mut f = fixture(LoggerConfig::default());
        f.pool.create_txn_log_list(9).unwrap();
        f.pool
            .add_log_record(TupleRecord::delete(9, 2, ItemPointer::new(1, 1), None).unwrap())
            .unwrap();
        f.decisions.report(9, TxnOutcome::Aborted).unwrap();

        let report = f.logger.flush().unwrap();
        assert_eq!(report.aborted, vec![9]);
        assert_eq!(report.records_discarded, 1);
        assert_eq!(report.bytes_written, 0);
        assert!(f.sink.contents().is_empty());
        assert_eq!(f.sink.sync_count(), 0);
        assert!(!f.pool.exists_txn_log_record_list(9).unwrap());
    }

    #[test]
    fn test_abort_of_empty_list_is_not_a_fault() {
        let mut f = fixture(LoggerConfig::default());
        f.pool.create_txn_log_list(4).unwrap();
        f.decisions.report(4, TxnOutcome::Aborted).unwrap();

        let report = f.logger.flush().unwrap();
        assert_eq!(report.aborted, vec![4]);
        assert!(report.faults.is_empty());
    }

    #[test]
    fn test_output_follows_decision_order() {
        let mut f = fixture(LoggerConfig::default());
        for txn in [1, 2, 3] {
            f.pool.create_txn_log_list(txn).unwrap();
        }
        // Interleaved appends across transactions
        for slot in 0..3 {
            for txn in [1, 2, 3] {
                f.pool.add_log_record(insert(txn, slot)).unwrap();
            }
        }
        f.decisions.report(3, TxnOutcome::Committed).unwrap();
        f.decisions.report(2, TxnOutcome::Aborted).unwrap();
        f.decisions.report(1, TxnOutcome::Committed).unwrap();

        let report = f.logger.flush().unwrap();
        assert_eq!(report.committed, vec![3, 1]);

        let records = decode(&f.sink.contents());
        let order: Vec<(TxnId, u32)> = records
            .iter()
            .map(|r| (r.transaction_id(), r.tuple_location().offset))
            .collect();
        assert_eq!(order, vec![(3, 0), (3, 1), (3, 2), (1, 0), (1, 1), (1, 2)]);
    }

    #[test]
    fn test_commit_markers() {
        let mut f = fixture(LoggerConfig::default().commit_markers(true));
        f.pool.create_txn_log_list(5).unwrap();
        f.pool.add_log_record(insert(5, 0)).unwrap();
        f.decisions.report(5, TxnOutcome::Committed).unwrap();

        let report = f.logger.flush().unwrap();
        assert_eq!(report.records_written, 2);

        let records = decode(&f.sink.contents());
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].record_type(), LogRecordType::Commit);
        assert_eq!(records[1].transaction_id(), 5);
    }

    #[test]
    fn test_missing_list_is_reported_not_retried() {
        let mut f = fixture(LoggerConfig::default());
        f.pool.create_txn_log_list(1).unwrap();
        f.pool.add_log_record(insert(1, 0)).unwrap();
        f.decisions.report(1, TxnOutcome::Committed).unwrap();
        f.decisions.report(42, TxnOutcome::Aborted).unwrap();

        let report = f.logger.flush().unwrap();
        assert_eq!(report.committed, vec![1]);
        assert_eq!(report.faults.len(), 1);
        assert!(matches!(report.faults[0], WalError::MissingTxnLogList(42)));

        // Nothing left to retry
        let again = f.logger.flush().unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn test_second_pass_never_rewrites() {
        let mut f = fixture(LoggerConfig::default());
        f.pool.create_txn_log_list(1).unwrap();
        f.pool.add_log_record(insert(1, 0)).unwrap();
        f.decisions.report(1, TxnOutcome::Committed).unwrap();
        f.logger.flush().unwrap();
        let after_first = f.sink.contents();

        // A stray second decision for the same transaction is a fault, not a rewrite
        f.decisions.report(1, TxnOutcome::Committed).unwrap();
        let report = f.logger.flush().unwrap();
        assert_eq!(report.faults.len(), 1);
        assert_eq!(f.sink.contents(), after_first);
    }

    #[test]
    fn test_duplicate_pending_decision_rejected() {
        let queue = DecisionQueue::new();
        queue.report(1, TxnOutcome::Committed).unwrap();
        let err = queue.report(1, TxnOutcome::Aborted).unwrap_err();
        assert!(matches!(err, WalError::DuplicateDecision(1)));
        assert_eq!(queue.pending().unwrap(), 1);
    }

    #[test]
    fn test_commit_seq_assigned_in_signal_order() {
        let queue = DecisionQueue::new();
        let (a, _) = queue.report(10, TxnOutcome::Committed).unwrap();
        let (b, _) = queue.report(11, TxnOutcome::Aborted).unwrap();
        let (c, pending) = queue.report(12, TxnOutcome::Committed).unwrap();
        assert_eq!(a.commit_seq, Some(1));
        assert_eq!(b.commit_seq, None);
        assert_eq!(c.commit_seq, Some(2));
        assert_eq!(pending, 3);
        assert_eq!(queue.last_commit_seq().unwrap(), 2);
    }

    #[test]
    fn test_batch_limit() {
        let mut f = fixture(LoggerConfig {
            max_batch_size: 2,
            ..Default::default()
        });
        for txn in 1..=5 {
            f.pool.create_txn_log_list(txn).unwrap();
            f.decisions.report(txn, TxnOutcome::Aborted).unwrap();
        }

        let report = f.logger.flush().unwrap();
        assert_eq!(report.aborted, vec![1, 2]);
        assert_eq!(f.decisions.pending().unwrap(), 3);

        let rest = f.logger.flush_all().unwrap();
        assert_eq!(rest.aborted, vec![3, 4, 5]);
        assert!(f.pool.is_empty().unwrap());
    }

    #[test]
    fn test_write_failure_halts_logger() {
        let pool = Arc::new(LogRecordPool::new());
        let decisions = Arc::new(DecisionQueue::new());
        let latch = Arc::new(CommitLatch::new());
        let mut logger = WriteBehindFrontendLogger::new(
            Arc::clone(&pool),
            Arc::clone(&decisions),
            Arc::clone(&latch),
            Box::new(FailingSink),
            LoggerConfig::default(),
        );

        pool.create_txn_log_list(1).unwrap();
        pool.add_log_record(insert(1, 0)).unwrap();
        let (decision, _) = decisions.report(1, TxnOutcome::Committed).unwrap();

        let err = logger.flush().unwrap_err();
        assert!(err.is_durability());
        assert!(latch.is_halted());
        assert_eq!(latch.durable_seq(), 0);

        // Waiters are released with the fault, never with success
        let seq = decision.commit_seq.unwrap();
        let wait = latch.wait_for_durable(seq, Duration::from_millis(50));
        assert!(matches!(wait, Err(WalError::LoggerHalted)));

        // No further passes run
        assert!(matches!(logger.flush(), Err(WalError::LoggerHalted)));
    }

    #[test]
    fn test_reset_clears_pool() {
        let mut f = fixture(LoggerConfig::default());
        f.pool.create_txn_log_list(1).unwrap();
        f.pool.create_txn_log_list(2).unwrap();
        assert_eq!(f.logger.reset().unwrap(), 2);
        assert!(f.pool.is_empty().unwrap());
    }

    #[test]
    fn test_latch_wait_signaled() {
        let latch = Arc::new(CommitLatch::new());
        let latch_clone = Arc::clone(&latch);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            latch_clone.signal_durable(3);
        });

        latch.wait_for_durable(3, Duration::from_secs(2)).unwrap();
        handle.join().unwrap();
        assert_eq!(latch.durable_seq(), 3);
    }

    #[test]
    fn test_latch_wait_timeout() {
        let latch = CommitLatch::new();
        let err = latch.wait_for_durable(1, Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, WalError::Timeout(_)));
    }

    #[test]
    fn test_latch_only_moves_forward() {
        let latch = CommitLatch::new();
        latch.signal_durable(5);
        latch.signal_durable(2);
        assert_eq!(latch.durable_seq(), 5);
    }

    #[test]
    fn test_latch_status_transitions() {
        let latch = CommitLatch::new();
        assert_eq!(latch.status(), LoggerStatus::Standby);
        latch.set_logging();
        assert_eq!(latch.status(), LoggerStatus::Logging);
        latch.signal_halted();
        latch.signal_shutdown();
        assert_eq!(latch.status(), LoggerStatus::Halted);
    }
}
