//! Splits the capture process's raw output into newline-terminated records.

/// Accumulates raw bytes and yields complete records.
///
/// Empty lines are dropped. A trailing partial record is retained until the
/// bytes completing it arrive.
#[derive(Debug, Default)]
pub struct Reassembler {
    /// Bytes not yet emitted as a record
    pending: Vec<u8>,
    /// Prefix of `pending` already known to contain no newline
    scanned: usize,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every record it completes, in arrival order.
    ///
    /// # Arguments
    /// * `bytes` - Raw chunk of any length, including zero
    ///
    /// # Returns
    /// Complete records without their trailing newline.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.pending.extend_from_slice(bytes);

        let mut records = Vec::new();
        let mut start = 0;
        let mut search_from = self.scanned;

        while let Some(pos) = self.pending[search_from..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|pos| pos + search_from)
        {
            if pos > start {
                records.push(self.pending[start..pos].to_vec());
            }
            start = pos + 1;
            search_from = start;
        }

        self.pending.drain(..start);
        self.scanned = self.pending.len();
        records
    }

    /// Bytes of the current partial record.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }
}
