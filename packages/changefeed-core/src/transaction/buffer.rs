use std::fs::File;
use std::io::{BufReader, Lines};
use std::path::PathBuf;

use crate::error::ChangefeedError;
use crate::io_utils::classify_io_error;

use super::change::ChangeRecord;
use super::spill::SpillFile;

/// Holds the change records of one in-progress transaction.
///
/// Records stay in memory until `spill_threshold` of them accumulate; the
/// whole in-memory batch is then appended to the spill file and cleared.
/// Replay reads the spill file first and the in-memory tail after it, so
/// arrival order is preserved whether or not anything was spilled.
#[derive(Debug)]
pub struct TransactionBuffer {
    /// Transaction id
    id: i64,
    /// Records not yet spilled
    records: Vec<ChangeRecord>,
    /// Backing file for spilled records
    spill: SpillFile,
    /// In-memory record count that triggers a spill
    spill_threshold: usize,
    /// In-memory record count at which the next spill is attempted
    spill_at: usize,
}

impl TransactionBuffer {
    /// Creates an empty buffer.
    ///
    /// # Arguments
    /// * `id` - Transaction id
    /// * `path` - Spill file path, derived from the connection and `id`
    /// * `spill_threshold` - In-memory record count that triggers a spill
    pub fn new(id: i64, path: PathBuf, spill_threshold: usize) -> Self {
        Self {
            id,
            records: Vec::new(),
            spill: SpillFile::new(path),
            spill_threshold: spill_threshold.max(1),
            spill_at: spill_threshold.max(1),
        }
    }

    /// Transaction id.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Appends one record, spilling the in-memory batch once it is full.
    ///
    /// A failed spill is logged and the batch stays in memory; the next
    /// attempt happens after another `spill_threshold` records.
    pub fn push(&mut self, record: ChangeRecord) {
        self.records.push(record);

        if self.records.len() < self.spill_at {
            return;
        }

        match self.spill.append(&self.records) {
            Ok(()) => {
                tracing::debug!(
                    xid = self.id,
                    records = self.records.len(),
                    path = %self.spill.path().display(),
                    "Spilled transaction buffer"
                );
                self.records.clear();
                self.spill_at = self.spill_threshold;
            }
            Err(e) => {
                tracing::error!(
                    xid = self.id,
                    records = self.records.len(),
                    path = %self.spill.path().display(),
                    "Failed to spill transaction buffer, keeping it in memory: {}",
                    e
                );
                self.spill_at = self.records.len() + self.spill_threshold;
            }
        }
    }

    /// Total number of records pushed.
    pub fn len(&self) -> usize {
        self.spill.records() + self.records.len()
    }

    /// Returns `true` if no record has been pushed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of records currently held in memory.
    pub fn memory_len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` once records have been written to the spill file.
    pub fn is_spilled(&self) -> bool {
        self.spill.is_spilled()
    }

    /// Spill file path.
    pub fn spill_path(&self) -> &std::path::Path {
        self.spill.path()
    }

    /// Consumes the buffer into a one-shot iterator over its records.
    ///
    /// The spill file is removed when the iterator is dropped.
    pub fn drain(self) -> Result<Drain, ChangefeedError> {
        let TransactionBuffer { records, spill, .. } = self;
        let spilled = spill.lines()?;
        Ok(Drain {
            spilled,
            memory: records.into_iter(),
            failed: false,
            _spill: spill,
        })
    }

    /// Consumes the buffer into fixed-size batches of records.
    ///
    /// # Arguments
    /// * `batch_size` - Records per batch; the last batch may be shorter
    pub fn drain_batches(self, batch_size: usize) -> Result<Batches, ChangefeedError> {
        Ok(Batches {
            drain: self.drain()?,
            batch_size: batch_size.max(1),
        })
    }
}

/// Records of a drained buffer: spilled lines first, then the in-memory tail.
///
/// Stops after the first error.
#[derive(Debug)]
pub struct Drain {
    spilled: Option<Lines<BufReader<File>>>,
    memory: std::vec::IntoIter<ChangeRecord>,
    failed: bool,
    _spill: SpillFile,
}

impl Iterator for Drain {
    type Item = Result<ChangeRecord, ChangefeedError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        while let Some(lines) = self.spilled.as_mut() {
            match lines.next() {
                Some(Ok(line)) if line.trim().is_empty() => continue,
                Some(Ok(line)) => {
                    let record = serde_json::from_str::<ChangeRecord>(&line)
                        .map_err(|e| ChangefeedError::SerializationError(e.to_string()));
                    self.failed = record.is_err();
                    return Some(record);
                }
                Some(Err(e)) => {
                    self.failed = true;
                    return Some(Err(classify_io_error(e, "Failed to read spill file")));
                }
                None => self.spilled = None,
            }
        }

        self.memory.next().map(Ok)
    }
}

/// Fixed-size chunks of a [`Drain`].
///
/// A batch interrupted by an error is discarded and the error yielded instead.
#[derive(Debug)]
pub struct Batches {
    drain: Drain,
    batch_size: usize,
}

impl Iterator for Batches {
    type Item = Result<Vec<ChangeRecord>, ChangefeedError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut batch = Vec::new();

        for item in self.drain.by_ref() {
            match item {
                Ok(record) => {
                    batch.push(record);
                    if batch.len() == self.batch_size {
                        return Some(Ok(batch));
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }

        if batch.is_empty() {
            None
        } else {
            Some(Ok(batch))
        }
    }
}
