use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Lines, Write};
use std::path::{Path, PathBuf};

use crate::error::ChangefeedError;
use crate::io_utils::classify_io_error;

use super::change::ChangeRecord;

/// Append-only file of spilled records, one JSON object per line.
///
/// The file is removed when the value is dropped.
#[derive(Debug)]
pub struct SpillFile {
    /// Backing file path
    path: PathBuf,
    /// Bytes durably appended so far
    len: u64,
    /// Records appended so far
    records: usize,
    /// Whether this value created (or appended to) the file
    created: bool,
}

impl SpillFile {
    /// Creates a handle; nothing touches the disk until the first append.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            len: 0,
            records: 0,
            created: false,
        }
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records written to disk.
    pub fn records(&self) -> usize {
        self.records
    }

    /// Returns `true` once at least one record is on disk.
    pub fn is_spilled(&self) -> bool {
        self.records > 0
    }

    /// Appends a batch of records to the file.
    ///
    /// # Arguments
    /// * `records` - Records to append, in arrival order
    ///
    /// # Returns
    /// `Result<(), ChangefeedError>`; on failure the file is cut back to its
    /// previous length so no partial line survives.
    pub fn append(&mut self, records: &[ChangeRecord]) -> Result<(), ChangefeedError> {
        let mut payload = Vec::new();
        for record in records {
            serde_json::to_writer(&mut payload, record)
                .map_err(|e| ChangefeedError::SerializationError(e.to_string()))?;
            payload.push(b'\n');
        }

        // O_CREAT | O_APPEND in one open(2): existence check and creation are a single step.
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| classify_io_error(e, "Failed to open spill file"))?;
        self.created = true;

        if let Err(e) = file.write_all(&payload).and_then(|_| file.flush()) {
            let _ = file.set_len(self.len);
            return Err(classify_io_error(e, "Failed to append spill file"));
        }

        self.len += payload.len() as u64;
        self.records += records.len();
        Ok(())
    }

    /// Opens the spilled lines for reading, or `None` if nothing was spilled.
    pub(crate) fn lines(&self) -> Result<Option<Lines<BufReader<File>>>, ChangefeedError> {
        if !self.is_spilled() {
            return Ok(None);
        }
        let file = File::open(&self.path)
            .map_err(|e| classify_io_error(e, "Failed to open spill file for replay"))?;
        Ok(Some(BufReader::new(file).lines()))
    }
}

impl Drop for SpillFile {
    fn drop(&mut self) {
        if self.created {
            // Best effort.
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Creates the spill directory and removes files left behind by an earlier
/// run of the same connection.
///
/// # Arguments
/// * `dir` - Spill directory
/// * `prefix` - Connection prefix of the spill file names (`<prefix>.<xid>`)
///
/// # Returns
/// `Result<usize, ChangefeedError>` with the number of orphaned files removed.
pub fn prepare_spill_dir(dir: &Path, prefix: &str) -> Result<usize, ChangefeedError> {
    fs::create_dir_all(dir).map_err(|e| classify_io_error(e, "Failed to create spill directory"))?;

    let mut removed = 0;
    let entries =
        fs::read_dir(dir).map_err(|e| classify_io_error(e, "Failed to list spill directory"))?;
    for entry in entries {
        let entry = entry.map_err(|e| classify_io_error(e, "Failed to list spill directory"))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let is_orphan = name
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('.'))
            .is_some_and(|xid| xid.parse::<i64>().is_ok());
        if !is_orphan {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => {
                removed += 1;
                tracing::warn!(path = %entry.path().display(), "Removed orphaned spill file");
            }
            Err(e) => {
                tracing::warn!(
                    path = %entry.path().display(),
                    "Failed to remove orphaned spill file: {}",
                    e
                );
            }
        }
    }
    Ok(removed)
}
