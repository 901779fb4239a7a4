//! Cooperative loop: raw chunks in, materialized event groups out.

use std::future::Future;
use std::time::Duration;

use changefeed_core::{
    ChangefeedError, EntityResolver, EventDispatcher, Materializer, PipelineConfig, Reassembler,
};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::reader::spawn_reader;
use crate::supervisor::CaptureSource;

/// How a pipeline run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineExit {
    /// A shutdown signal was received and forwarded to the capture process
    Signalled(i32),
}

/// Drives one capture source through the reassembler into a materializer.
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Capacity of the bounded raw-output queue
    queue_capacity: usize,
    /// Bytes requested per read
    read_chunk_size: usize,
    /// Capture process liveness poll interval
    liveness_interval: Duration,
}

impl Pipeline {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            queue_capacity: config.queue_capacity.max(1),
            read_chunk_size: config.read_chunk_size,
            liveness_interval: Duration::from_millis(config.liveness_interval_ms.max(1)),
        }
    }

    /// Runs until a shutdown signal arrives or the source fails.
    ///
    /// # Arguments
    /// * `source` - Capture source; its output is moved to a reader thread
    /// * `materializer` - Consumer of the reassembled records
    /// * `shutdown` - Resolves to a signal number when the pipeline must stop
    ///
    /// # Returns
    /// `Ok(PipelineExit::Signalled)` after the signal was forwarded to the
    /// source; `Err` with a fatal error otherwise (`ChildExited` when the
    /// source dies or closes its output). Fatal errors are left to the
    /// caller to log.
    pub async fn run<S, R, D, F>(
        &self,
        mut source: S,
        materializer: &mut Materializer<R, D>,
        shutdown: F,
    ) -> Result<PipelineExit, ChangefeedError>
    where
        S: CaptureSource,
        R: EntityResolver,
        D: EventDispatcher,
        F: Future<Output = i32>,
    {
        let pid = source.pid();
        let output = source.take_output().ok_or_else(|| {
            ChangefeedError::SpawnError("capture output already taken".to_string())
        })?;

        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(self.queue_capacity);
        spawn_reader(output, tx, self.read_chunk_size)?;

        let mut reassembler = Reassembler::new();
        let mut liveness = tokio::time::interval(self.liveness_interval);
        liveness.set_missed_tick_behavior(MissedTickBehavior::Delay);
        liveness.tick().await;

        tokio::pin!(shutdown);

        tracing::info!(pid, "PostgreSQL event pipeline started");

        loop {
            tokio::select! {
                biased;

                signo = &mut shutdown => {
                    tracing::info!(pid, signal = signo, "PostgreSQL event pipeline stopped");
                    source.forward_signal(signo)?;
                    return Ok(PipelineExit::Signalled(signo));
                }

                chunk = rx.recv() => match chunk {
                    Some(chunk) => {
                        for record in reassembler.feed(&chunk) {
                            materializer.consume(&record)?;
                        }
                    }
                    None => {
                        let alive = source.is_alive();
                        tracing::debug!(
                            pid,
                            alive,
                            pending = reassembler.pending().len(),
                            "The capture process closed its output"
                        );
                        return Err(ChangefeedError::ChildExited { pid });
                    }
                },

                _ = liveness.tick() => {
                    if !source.is_alive() {
                        tracing::debug!(pid, "Capture process failed the liveness check");
                        return Err(ChangefeedError::ChildExited { pid });
                    }
                }
            }
        }
    }
}
