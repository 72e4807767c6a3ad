//! Background thread that runs the frontend logger's flush passes
//!
//! The thread wakes on a timer (`flush_interval_ms`), when backends push the
//! number of pending decisions past `backpressure_threshold`, or on an explicit
//! force-flush request. Each wake drains the decision queue in groups of at
//! most `max_batch_size`, one sink write + sync per group.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::{Result, WalError};
use super::frontend::{CommitLatch, FlushReport, WriteBehindFrontendLogger};

/// Capacity of the control channel; wake-ups beyond it are dropped
const CONTROL_CHANNEL_CAPACITY: usize = 64;

/// Control messages for the logger thread
pub enum LoggerMessage {
    /// Pending decisions crossed the backpressure threshold
    Wake,
    /// Drain every pending decision now and report
    ForceFlush(mpsc::SyncSender<Result<FlushReport>>),
    /// Final drain, clear the pool, stop the thread
    Shutdown(mpsc::SyncSender<Result<FlushReport>>),
}

/// Handle to the logger thread
pub struct FrontendWorkerHandle {
    sender: mpsc::SyncSender<LoggerMessage>,
    thread: Option<JoinHandle<()>>,
}

impl FrontendWorkerHandle {
    /// Move `logger` onto a dedicated thread and start flushing
    pub fn spawn(logger: WriteBehindFrontendLogger, latch: Arc<CommitLatch>) -> Result<Self> {
        let (tx, rx) = mpsc::sync_channel::<LoggerMessage>(CONTROL_CHANNEL_CAPACITY);
        let thread = thread::Builder::new()
            .name("wblog-frontend".to_string())
            .spawn(move || frontend_worker_thread(logger, rx, latch))?;

        Ok(Self {
            sender: tx,
            thread: Some(thread),
        })
    }

    /// Ask for an early pass. Never blocks; a full channel means one is coming.
    pub fn wake(&self) {
        let _ = self.sender.try_send(LoggerMessage::Wake);
    }

    /// Drain all pending decisions and wait for the resulting flushes
    pub fn force_flush(&self) -> Result<FlushReport> {
        let (tx, rx) = mpsc::sync_channel(1);
        self.sender
            .send(LoggerMessage::ForceFlush(tx))
            .map_err(|e| WalError::Internal(format!("logger channel closed: {}", e)))?;
        rx.recv()
            .map_err(|e| WalError::Internal(format!("logger flush response lost: {}", e)))?
    }

    /// Stop the thread after a final drain. Idempotent.
    pub fn shutdown(&mut self) -> Result<FlushReport> {
        let thread = match self.thread.take() {
            Some(thread) => thread,
            None => return Ok(FlushReport::default()),
        };

        let (tx, rx) = mpsc::sync_channel(1);
        let result = match self.sender.send(LoggerMessage::Shutdown(tx)) {
            Ok(()) => rx
                .recv()
                .map_err(|e| WalError::Internal(format!("logger shutdown response lost: {}", e)))
                .and_then(|r| r),
            Err(e) => Err(WalError::Internal(format!("logger channel closed: {}", e))),
        };

        if thread.join().is_err() {
            return Err(WalError::Internal("logger thread panicked".to_string()));
        }
        result
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }
}

impl Drop for FrontendWorkerHandle {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("Frontend logger shutdown failed: {}", e);
        }
    }
}

fn frontend_worker_thread(
    mut logger: WriteBehindFrontendLogger,
    rx: mpsc::Receiver<LoggerMessage>,
    latch: Arc<CommitLatch>,
) {
    let interval = logger.config().flush_interval();
    latch.set_logging();
    log::info!("Frontend logger started (flush interval: {:?})", interval);

    loop {
        match rx.recv_timeout(interval) {
            Ok(LoggerMessage::Wake) | Err(mpsc::RecvTimeoutError::Timeout) => {
                run_pass(&mut logger, &latch);
            }
            Ok(LoggerMessage::ForceFlush(responder)) => {
                let _ = responder.send(logger.flush_all());
            }
            Ok(LoggerMessage::Shutdown(responder)) => {
                let result = shutdown_logger(&mut logger, &latch);
                let _ = responder.send(result);
                log::info!("Frontend logger shutting down (shutdown message)");
                break;
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                if let Err(e) = shutdown_logger(&mut logger, &latch) {
                    log::error!("Final flush failed: {}", e);
                }
                log::info!("Frontend logger shutting down (channel closed)");
                break;
            }
        }
    }
}

/// Periodic pass. A halted logger idles until shutdown.
fn run_pass(logger: &mut WriteBehindFrontendLogger, latch: &CommitLatch) {
    if latch.is_halted() {
        return;
    }
    match logger.flush_all() {
        Ok(_) => {}
        // halt() already logged the cause
        Err(e) if e.is_durability() => log::debug!("Flush pass stopped: {}", e),
        Err(e) => log::error!("Flush pass failed: {}", e),
    }
}

fn shutdown_logger(logger: &mut WriteBehindFrontendLogger, latch: &CommitLatch) -> Result<FlushReport> {
    let report = if latch.is_halted() {
        Err(WalError::LoggerHalted)
    } else {
        logger.flush_all()
    };
    let cleared = logger.reset();
    latch.signal_shutdown();
    let report = report?;
    cleared?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::config::LoggerConfig;
    use crate::logging::frontend::DecisionQueue;
    use crate::logging::pool::LogRecordPool;
    use crate::logging::record::TupleRecord;
    use crate::logging::sink::MemoryLogSink;
    use crate::logging::types::{ItemPointer, LoggerStatus, TxnOutcome};
    use std::time::Duration;

    struct Parts {
        pool: Arc<LogRecordPool>,
        decisions: Arc<DecisionQueue>,
        latch: Arc<CommitLatch>,
        sink: MemoryLogSink,
        handle: FrontendWorkerHandle,
    }

    fn spawn(config: LoggerConfig) -> Parts {
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
        let handle = FrontendWorkerHandle::spawn(logger, Arc::clone(&latch)).unwrap();
        Parts {
            pool,
            decisions,
            latch,
            sink,
            handle,
        }
    }

    fn buffer_commit(parts: &Parts, txn_id: u64) -> u64 {
        parts.pool.create_txn_log_list(txn_id).unwrap();
        parts
            .pool
            .add_log_record(TupleRecord::insert(txn_id, 1, ItemPointer::new(0, 0), vec![1]).unwrap())
            .unwrap();
        let (decision, _) = parts.decisions.report(txn_id, TxnOutcome::Committed).unwrap();
        decision.commit_seq.unwrap()
    }

    #[test]
    fn test_worker_timer_flushes() {
        let parts = spawn(LoggerConfig {
            flush_interval_ms: 10,
            ..Default::default()
        });
        let seq = buffer_commit(&parts, 1);

        parts.latch.wait_for_durable(seq, Duration::from_secs(5)).unwrap();
        assert!(!parts.sink.contents().is_empty());
        assert!(!parts.pool.exists_txn_log_record_list(1).unwrap());
    }

    #[test]
    fn test_worker_force_flush() {
        let parts = spawn(LoggerConfig {
            flush_interval_ms: 60_000,
            ..Default::default()
        });
        buffer_commit(&parts, 1);
        buffer_commit(&parts, 2);

        let report = parts.handle.force_flush().unwrap();
        assert_eq!(report.committed, vec![1, 2]);
        assert_eq!(parts.latch.durable_seq(), 2);
    }

    #[test]
    fn test_worker_wake() {
        let parts = spawn(LoggerConfig {
            flush_interval_ms: 60_000,
            ..Default::default()
        });
        let seq = buffer_commit(&parts, 1);
        parts.handle.wake();
        parts.latch.wait_for_durable(seq, Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_worker_shutdown_drains_and_clears() {
        let mut parts = spawn(LoggerConfig {
            flush_interval_ms: 60_000,
            ..Default::default()
        });
        assert!(parts.handle.is_running());
        buffer_commit(&parts, 1);
        // Undecided transaction left in the pool
        parts.pool.create_txn_log_list(2).unwrap();

        let report = parts.handle.shutdown().unwrap();
        assert_eq!(report.committed, vec![1]);
        assert!(parts.pool.is_empty().unwrap());
        assert_eq!(parts.latch.status(), LoggerStatus::Terminate);
        assert!(!parts.handle.is_running());

        // Second shutdown is a no-op
        assert!(parts.handle.shutdown().unwrap().is_empty());
    }

    #[test]
    fn test_worker_sets_logging_status() {
        let parts = spawn(LoggerConfig::default());
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while parts.latch.status() != LoggerStatus::Logging {
            assert!(std::time::Instant::now() < deadline, "worker never started");
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}
