//! Dedicated thread moving raw capture output into the bounded queue.

use std::io::{ErrorKind, Read};
use std::thread::{self, JoinHandle};

use changefeed_core::ChangefeedError;
use tokio::sync::mpsc;

/// Spawns the reader thread.
///
/// Each successful read becomes one queue entry. When the queue is full the
/// thread blocks, the capture process's pipe fills, and the capture process
/// blocks on write. The sender is dropped, closing the queue, at end of stream.
///
/// # Arguments
/// * `output` - Raw output of the capture process
/// * `tx` - Bounded queue sender
/// * `chunk_size` - Bytes requested per read
pub fn spawn_reader(
    mut output: Box<dyn Read + Send>,
    tx: mpsc::Sender<Vec<u8>>,
    chunk_size: usize,
) -> Result<JoinHandle<()>, ChangefeedError> {
    thread::Builder::new()
        .name("capture-reader".to_string())
        .spawn(move || {
            let mut buf = vec![0u8; chunk_size.max(1)];
            loop {
                match output.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.blocking_send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        tracing::error!("Failed to read capture output: {}", e);
                        break;
                    }
                }
            }
            tracing::debug!("Capture output closed");
        })
        .map_err(|e| ChangefeedError::SpawnError(format!("reader thread: {}", e)))
}
