//! Core of the change-event pipeline.
//!
//! Reassembles the capture process's output into wire records, buffers each
//! transaction (spilling large ones to disk), and on commit materializes the
//! buffered rows into grouped before/after entity events.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod io_utils;
pub mod materializer;
pub mod reassembler;
pub mod transaction;
pub mod wire;

pub use config::{ConnectionConfig, PipelineConfig};
pub use dispatch::{DiagnosticSink, EntityResolver, EventDispatcher, NullSink, StdoutSink};
pub use error::ChangefeedError;
pub use materializer::{EntitySnapshot, EventModelsGroup, Materializer, MaterializerStats};
pub use reassembler::Reassembler;
pub use transaction::{Attributes, ChangeRecord, Operation, TransactionBuffer};

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, ChangefeedError>;
