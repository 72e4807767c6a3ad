//! Tuple log records and their on-disk frame format
//!
//! Every record is written as a frame:
//!
//! ```text
//! [frame_len: u32 LE]
//! [record_type: u32 LE][transaction_id: u64 LE][table_id: u32 LE]
//! [tuple_location: block u32 LE, offset u32 LE]
//! [tuple_image_length: u64 LE][tuple_image_bytes ...]
//! ```
//!
//! The body is the bincode (fixed-int, little-endian) encoding of
//! [`TupleRecord`], whose field order matches the layout above. The layout must
//! stay stable across releases because recovery parses it back in file order.

use serde::{Deserialize, Serialize};

use crate::error::{Result, WalError};
use super::types::{ItemPointer, LogRecordType, TableId, TxnId};

/// Size of the length prefix in front of every record body
pub const FRAME_HEADER_SIZE: usize = 4;

/// Size of a record body with an empty tuple image
pub const RECORD_FIXED_SIZE: usize = 4 + 8 + 4 + 8 + 8;

/// Largest record body accepted on write and on read (1 GiB)
pub const MAX_FRAME_SIZE: usize = 1 << 30;

/// One WAL entry: a tuple-level mutation or a transaction marker.
///
/// Records are immutable once built. They move from the backend into the pool
/// and from the pool into the frontend logger; nothing holds a second copy.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupleRecord {
    record_type: LogRecordType,
    transaction_id: TxnId,
    table_id: TableId,
    tuple_location: ItemPointer,
    tuple_image: Vec<u8>,
}

impl TupleRecord {
    /// Build a record, checking that INSERT and UPDATE carry an image
    pub fn new(
        record_type: LogRecordType,
        transaction_id: TxnId,
        table_id: TableId,
        tuple_location: ItemPointer,
        tuple_image: Vec<u8>,
    ) -> Result<Self> {
        if record_type.requires_image() && tuple_image.is_empty() {
            return Err(WalError::InvalidRecord(format!(
                "{} record for transaction {} has no tuple image",
                record_type, transaction_id
            )));
        }
        if !record_type.is_tuple_mutation() && !tuple_image.is_empty() {
            return Err(WalError::InvalidRecord(format!(
                "{} marker for transaction {} carries a tuple image",
                record_type, transaction_id
            )));
        }
        Ok(Self {
            record_type,
            transaction_id,
            table_id,
            tuple_location,
            tuple_image,
        })
    }

    /// INSERT with the full image of the new tuple
    pub fn insert(
        txn_id: TxnId,
        table_id: TableId,
        location: ItemPointer,
        image: Vec<u8>,
    ) -> Result<Self> {
        Self::new(LogRecordType::Insert, txn_id, table_id, location, image)
    }

    /// UPDATE with the after-image of the tuple
    pub fn update(
        txn_id: TxnId,
        table_id: TableId,
        location: ItemPointer,
        image: Vec<u8>,
    ) -> Result<Self> {
        Self::new(LogRecordType::Update, txn_id, table_id, location, image)
    }

    /// DELETE; the before-image is optional and left to the recovery strategy
    pub fn delete(
        txn_id: TxnId,
        table_id: TableId,
        location: ItemPointer,
        image: Option<Vec<u8>>,
    ) -> Result<Self> {
        Self::new(
            LogRecordType::Delete,
            txn_id,
            table_id,
            location,
            image.unwrap_or_default(),
        )
    }

    /// COMMIT marker
    pub fn commit(txn_id: TxnId) -> Self {
        Self::marker(LogRecordType::Commit, txn_id)
    }

    /// ABORT marker
    pub fn abort(txn_id: TxnId) -> Self {
        Self::marker(LogRecordType::Abort, txn_id)
    }

    fn marker(record_type: LogRecordType, transaction_id: TxnId) -> Self {
        Self {
            record_type,
            transaction_id,
            table_id: 0,
            tuple_location: ItemPointer::default(),
            tuple_image: Vec::new(),
        }
    }

    pub fn record_type(&self) -> LogRecordType {
        self.record_type
    }

    pub fn transaction_id(&self) -> TxnId {
        self.transaction_id
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn tuple_location(&self) -> ItemPointer {
        self.tuple_location
    }

    pub fn tuple_image(&self) -> &[u8] {
        &self.tuple_image
    }

    /// Size of the encoded body, excluding the frame length prefix
    pub fn body_size(&self) -> usize {
        RECORD_FIXED_SIZE + self.tuple_image.len()
    }

    /// Append this record as one frame to `out`. Returns the number of bytes written.
    ///
    /// On error `out` is left exactly as it was.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<usize> {
        let body = bincode::serialize(self)?;
        if body.len() > MAX_FRAME_SIZE {
            return Err(WalError::Serialization(format!(
                "record for transaction {} is {} bytes, exceeds frame limit",
                self.transaction_id,
                body.len()
            )));
        }
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&body);
        Ok(FRAME_HEADER_SIZE + body.len())
    }

    /// Encode this record as a standalone frame
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(FRAME_HEADER_SIZE + self.body_size());
        self.encode_into(&mut out)?;
        Ok(out)
    }

    /// Decode one frame from the front of `buf`.
    ///
    /// Returns `Ok(None)` when `buf` does not yet hold a complete frame, and
    /// otherwise the record plus the number of bytes consumed.
    pub fn decode_frame(buf: &[u8]) -> Result<Option<(Self, usize)>> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }
        let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(WalError::Corrupted(format!("frame length {} exceeds limit", len)));
        }
        if buf.len() < FRAME_HEADER_SIZE + len {
            return Ok(None);
        }
        let body = &buf[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + len];
        let record = Self::decode_body(body)?;
        Ok(Some((record, FRAME_HEADER_SIZE + len)))
    }

    /// Decode a record body (no length prefix)
    pub fn decode_body(body: &[u8]) -> Result<Self> {
        if body.len() < RECORD_FIXED_SIZE {
            return Err(WalError::Corrupted(format!(
                "record body of {} bytes is shorter than the fixed header",
                body.len()
            )));
        }
        let record: TupleRecord = bincode::deserialize(body)
            .map_err(|e| WalError::Corrupted(format!("undecodable record: {}", e)))?;
        if record.body_size() != body.len() {
            return Err(WalError::Corrupted(format!(
                "frame length {} does not match record size {}",
                body.len(),
                record.body_size()
            )));
        }
        Ok(record)
    }
}

impl std::fmt::Display for TupleRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} txn={} table={} loc={} image={}B",
            self.record_type,
            self.transaction_id,
            self.table_id,
            self.tuple_location,
            self.tuple_image.len()
        )
    }
}
