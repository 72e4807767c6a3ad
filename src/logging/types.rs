//! Core identifiers and state enums shared by the logging subsystem

use serde::{Deserialize, Serialize};

/// Transaction ID, assigned by the transaction manager
pub type TxnId = u64;

/// Identifier of the target table
pub type TableId = u32;

/// Position of a commit decision in signal order. Starts at 1; 0 means "none yet".
pub type CommitSeq = u64;

/// Physical locator of a tuple (block + slot within the block)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ItemPointer {
    pub block: u32,
    pub offset: u32,
}

impl ItemPointer {
    pub fn new(block: u32, offset: u32) -> Self {
        Self { block, offset }
    }
}

impl std::fmt::Display for ItemPointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.block, self.offset)
    }
}

/// Kind of mutation a log record describes.
///
/// The variant order is part of the on-disk format: the variant index is the
/// `record_type` tag written at the start of every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogRecordType {
    Insert,
    Delete,
    Update,
    Commit,
    Abort,
}

impl LogRecordType {
    /// Tuple-level mutations, as opposed to transaction markers
    pub fn is_tuple_mutation(&self) -> bool {
        matches!(
            self,
            LogRecordType::Insert | LogRecordType::Delete | LogRecordType::Update
        )
    }

    /// Whether a record of this type must carry a tuple image
    pub fn requires_image(&self) -> bool {
        matches!(self, LogRecordType::Insert | LogRecordType::Update)
    }
}

impl std::fmt::Display for LogRecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogRecordType::Insert => write!(f, "INSERT"),
            LogRecordType::Delete => write!(f, "DELETE"),
            LogRecordType::Update => write!(f, "UPDATE"),
            LogRecordType::Commit => write!(f, "COMMIT"),
            LogRecordType::Abort => write!(f, "ABORT"),
        }
    }
}

/// Outcome of a transaction as decided by the transaction manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnOutcome {
    Committed,
    Aborted,
}

/// Frontend logger status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggerStatus {
    /// Created, worker not running yet
    Standby,
    /// Worker is running flush passes
    Logging,
    /// Shutdown requested or completed
    Terminate,
    /// A durability fault stopped the logger; no further commits are acknowledged
    Halted,
}

impl LoggerStatus {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            LoggerStatus::Standby => 0,
            LoggerStatus::Logging => 1,
            LoggerStatus::Terminate => 2,
            LoggerStatus::Halted => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => LoggerStatus::Logging,
            2 => LoggerStatus::Terminate,
            3 => LoggerStatus::Halted,
            _ => LoggerStatus::Standby,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_type_image_requirements() {
        assert!(LogRecordType::Insert.requires_image());
        assert!(LogRecordType::Update.requires_image());
        assert!(!LogRecordType::Delete.requires_image());
        assert!(!LogRecordType::Commit.requires_image());
    }

    #[test]
    fn test_record_type_tags_are_stable() {
        // Tag values are the variant index and appear on disk
        let tags: Vec<u32> = [
            LogRecordType::Insert,
            LogRecordType::Delete,
            LogRecordType::Update,
            LogRecordType::Commit,
            LogRecordType::Abort,
        ]
        .iter()
        .map(|t| {
            let bytes = bincode::serialize(t).unwrap();
            u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
        })
        .collect();
        assert_eq!(tags, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_logger_status_round_trip() {
        for status in [
            LoggerStatus::Standby,
            LoggerStatus::Logging,
            LoggerStatus::Terminate,
            LoggerStatus::Halted,
        ] {
            assert_eq!(LoggerStatus::from_u8(status.as_u8()), status);
        }
    }

    #[test]
    fn test_item_pointer_display() {
        assert_eq!(ItemPointer::new(3, 7).to_string(), "(3, 7)");
    }
}
