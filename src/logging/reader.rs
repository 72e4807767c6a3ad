//! Reading the durable log back, in file order
//!
//! Recovery itself lives outside this crate; this module is the boundary it
//! consumes. Records come back exactly as the frontend logger wrote them.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use crate::error::{Result, WalError};
use super::record::{TupleRecord, FRAME_HEADER_SIZE, MAX_FRAME_SIZE};
use super::types::TxnId;

/// Iterator over the frames of a log stream.
///
/// A clean end of stream or a torn final frame (a crash mid-append) ends the
/// iteration. A frame that is complete but undecodable yields `Corrupted`,
/// after which the reader resumes at the next frame.
pub struct LogReader<R: Read> {
    inner: R,
    offset: u64,
    done: bool,
}

impl<R: Read> LogReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            offset: 0,
            done: false,
        }
    }

    /// Byte offset of the next frame
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Fill `buf` completely. Returns false on a clean or torn end of stream.
    fn read_full(&mut self, buf: &mut [u8]) -> Result<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => {
                    if filled > 0 {
                        log::warn!(
                            "Torn log frame at offset {} ({} of {} bytes present)",
                            self.offset,
                            filled,
                            buf.len()
                        );
                    }
                    return Ok(false);
                }
                Ok(n) => filled += n,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(true)
    }

    fn next_record(&mut self) -> Result<Option<TupleRecord>> {
        let mut len_buf = [0u8; FRAME_HEADER_SIZE];
        if !self.read_full(&mut len_buf)? {
            return Ok(None);
        }
        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_FRAME_SIZE {
            // Cannot find the next frame boundary past a bogus length
            self.done = true;
            return Err(WalError::Corrupted(format!(
                "frame at offset {} claims {} bytes",
                self.offset, len
            )));
        }

        let mut body = vec![0u8; len];
        if !self.read_full(&mut body)? {
            return Ok(None);
        }

        let frame_offset = self.offset;
        self.offset += (FRAME_HEADER_SIZE + len) as u64;
        TupleRecord::decode_body(&body)
            .map(Some)
            .map_err(|e| WalError::Corrupted(format!("frame at offset {}: {}", frame_offset, e)))
    }
}

impl<R: Read> Iterator for LogReader<R> {
    type Item = Result<TupleRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e @ WalError::Corrupted(_)) => Some(Err(e)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Read every record of a log file. Undecodable frames are skipped with a warning.
pub fn read_log_file<P: AsRef<Path>>(path: P) -> Result<Vec<TupleRecord>> {
    let file = File::open(path.as_ref())?;
    let mut records = Vec::new();
    for item in LogReader::new(BufReader::new(file)) {
        match item {
            Ok(record) => records.push(record),
            Err(WalError::Corrupted(msg)) => {
                log::warn!("Skipping malformed log record: {}", msg);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(records)
}

/// Group records by transaction, keeping each transaction's records in file
/// order and the transactions in order of first appearance.
pub fn group_by_transaction(records: Vec<TupleRecord>) -> Vec<(TxnId, Vec<TupleRecord>)> {
    let mut index: HashMap<TxnId, usize> = HashMap::new();
    let mut groups: Vec<(TxnId, Vec<TupleRecord>)> = Vec::new();
    for record in records {
        let txn_id = record.transaction_id();
        match index.get(&txn_id) {
            Some(&i) => groups[i].1.push(record),
            None => {
                index.insert(txn_id, groups.len());
                groups.push((txn_id, vec![record]));
            }
        }
    }
    groups
}
