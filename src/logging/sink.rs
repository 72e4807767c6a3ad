//! Stable-storage targets for flushed log bytes

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Destination of the serialized log stream.
///
/// `append` hands bytes to the target; `sync` makes every appended byte
/// durable. A commit is acknowledged only after both succeed.
pub trait LogSink: Send {
    fn append(&mut self, bytes: &[u8]) -> io::Result<()>;

    fn sync(&mut self) -> io::Result<()>;
}

/// Append-only log file
pub struct FileLogSink {
    file: File,
    path: PathBuf,
    bytes_written: u64,
}

impl FileLogSink {
    /// Open (or create) `path` in append mode
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let bytes_written = file.metadata()?.len();
        Ok(Self {
            file,
            path,
            bytes_written,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size of the log file as seen by this sink
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl LogSink for FileLogSink {
    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)?;
        self.file.flush()?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.sync_data()
    }
}

/// In-memory sink. Clones share the same buffer, so a test or an embedding
/// process can keep a handle and read what the logger wrote.
#[derive(Clone, Default)]
pub struct MemoryLogSink {
    buffer: Arc<Mutex<Vec<u8>>>,
    syncs: Arc<Mutex<usize>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything appended so far
    pub fn contents(&self) -> Vec<u8> {
        match self.buffer.lock() {
            Ok(buffer) => buffer.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of completed `sync` calls
    pub fn sync_count(&self) -> usize {
        match self.syncs.lock() {
            Ok(count) => *count,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl LogSink for MemoryLogSink {
    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory sink poisoned"))?;
        buffer.extend_from_slice(bytes);
        Ok(())
    }

    fn sync(&mut self) -> io::Result<()> {
        let mut count = self
            .syncs
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory sink poisoned"))?;
        *count += 1;
        Ok(())
    }
}
