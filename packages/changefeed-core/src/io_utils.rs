//! I/O utilities for spill files.

use std::io::ErrorKind;

use crate::error::ChangefeedError;

/// Classifies I/O errors into specific ChangefeedError variants.
pub fn classify_io_error(error: std::io::Error, context: &str) -> ChangefeedError {
    match error.kind() {
        ErrorKind::StorageFull | ErrorKind::OutOfMemory => {
            ChangefeedError::DiskFull(format!("{}: {}", context, error))
        }
        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted => {
            ChangefeedError::TransientIoError(format!("{}: {}", context, error))
        }
        _ => ChangefeedError::IoError(format!("{}: {}", context, error)),
    }
}
