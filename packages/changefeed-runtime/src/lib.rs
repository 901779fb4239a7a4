//! Capture process supervision and the record pipeline loop.
//!
//! The capture process is spawned with its connection parameters in the
//! environment. A reader thread moves its output into a bounded queue; the
//! pipeline loop reassembles records from the queue and feeds the
//! materializer, polling the capture process for liveness and forwarding
//! shutdown signals to it.

pub mod pipeline;
pub mod reader;
pub mod signals;
pub mod supervisor;

pub use changefeed_core::{ChangefeedError, Result};
pub use pipeline::{Pipeline, PipelineExit};
pub use signals::{reap_exited, spawn_child_reaper, HandlerStack, ShutdownSignals};
pub use supervisor::{capture_binary, machine_arch, CaptureProcess, CaptureSource};
