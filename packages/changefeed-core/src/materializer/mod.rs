//! Turns begin/change/commit records into grouped before/after entity events.

mod group;
mod snapshot;

use std::collections::HashMap;

use crate::config::PipelineConfig;
use crate::dispatch::{DiagnosticSink, EntityResolver, EventDispatcher, NullSink, StdoutSink};
use crate::error::ChangefeedError;
use crate::transaction::{prepare_spill_dir, ChangeRecord, TransactionBuffer};
use crate::wire::{parse_record, WireRecord};

pub use group::EventModelsGroup;
pub use snapshot::EntitySnapshot;

use group::GroupSet;

/// Counters kept by the materializer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MaterializerStats {
    pub transactions_committed: u64,
    pub groups_dispatched: u64,
    pub entities_dispatched: u64,
    /// Records whose entity kind has no registered entity type
    pub records_unresolved: u64,
    /// Records dropped by a recoverable error
    pub records_dropped: u64,
}

/// Consumes wire records one at a time.
///
/// Holds at most one live [`TransactionBuffer`] per transaction id. On commit
/// the buffer is replayed in batches of `batch_size`; the groups built from
/// each batch are dispatched before the next batch is read, and the buffer is
/// destroyed once the replay ends.
pub struct Materializer<R, D> {
    /// Live buffers by transaction id
    buffers: HashMap<i64, TransactionBuffer>,
    resolver: R,
    dispatcher: D,
    /// Secondary destination for malformed records
    diagnostics: Box<dyn DiagnosticSink>,
    /// Spill directory, thresholds and spill file naming
    config: PipelineConfig,
    stats: MaterializerStats,
}

impl<R, D> Materializer<R, D>
where
    R: EntityResolver,
    D: EventDispatcher,
{
    /// Creates a materializer for one connection.
    ///
    /// The diagnostic sink is standard output when `diagnostic_stdout` is set.
    pub fn new(config: &PipelineConfig, resolver: R, dispatcher: D) -> Self {
        let diagnostics: Box<dyn DiagnosticSink> = if config.diagnostic_stdout {
            Box::new(StdoutSink)
        } else {
            Box::new(NullSink)
        };

        Self {
            buffers: HashMap::new(),
            resolver,
            dispatcher,
            diagnostics,
            config: config.clone(),
            stats: MaterializerStats::default(),
        }
    }

    /// Replaces the diagnostic sink.
    pub fn with_diagnostics(mut self, sink: Box<dyn DiagnosticSink>) -> Self {
        self.diagnostics = sink;
        self
    }

    /// Creates the spill directory and removes buffers orphaned by an earlier run.
    pub fn prepare(&self) -> Result<usize, ChangefeedError> {
        prepare_spill_dir(&self.config.buffer_dir, &self.config.spill_prefix())
    }

    /// Consumes one raw record.
    ///
    /// Recoverable errors are logged and the record dropped; fatal errors are
    /// returned without logging.
    pub fn consume(&mut self, raw: &[u8]) -> Result<(), ChangefeedError> {
        match self.apply(raw) {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                self.stats.records_dropped += 1;
                self.report(raw, &e);
                Ok(())
            }
        }
    }

    /// Consumes one raw record, returning every error.
    pub fn apply(&mut self, raw: &[u8]) -> Result<(), ChangefeedError> {
        match parse_record(raw)? {
            WireRecord::Begin { xid } => self.begin(xid),
            WireRecord::Change { xid, record } => self.change(xid, record),
            WireRecord::Commit { xid } => self.commit(xid),
        }
    }

    fn begin(&mut self, xid: i64) -> Result<(), ChangefeedError> {
        if self.buffers.contains_key(&xid) {
            return Err(ChangefeedError::DuplicateTransaction(xid));
        }

        let path = self.config.buffer_dir.join(self.config.buffer_identifier(xid));
        self.buffers.insert(
            xid,
            TransactionBuffer::new(xid, path, self.config.spill_threshold),
        );
        tracing::debug!(xid, "Transaction begin");
        Ok(())
    }

    fn change(&mut self, xid: i64, record: ChangeRecord) -> Result<(), ChangefeedError> {
        self.buffers
            .get_mut(&xid)
            .ok_or(ChangefeedError::UnknownTransaction(xid))?
            .push(record);
        Ok(())
    }

    fn commit(&mut self, xid: i64) -> Result<(), ChangefeedError> {
        let buffer = self
            .buffers
            .remove(&xid)
            .ok_or(ChangefeedError::UnknownTransaction(xid))?;
        let records = buffer.len();

        for batch in buffer.drain_batches(self.config.batch_size)? {
            let batch = batch.map_err(|e| {
                tracing::error!(xid, "Transaction replay abandoned: {}", e);
                e
            })?;

            for group in self.materialize(batch) {
                self.stats.groups_dispatched += 1;
                self.stats.entities_dispatched += group.len() as u64;
                self.dispatcher.dispatch(group);
            }
        }

        self.stats.transactions_committed += 1;
        tracing::debug!(xid, records, "Transaction committed");
        Ok(())
    }

    /// Builds the event groups of one replay batch.
    fn materialize(&mut self, batch: Vec<ChangeRecord>) -> Vec<EventModelsGroup> {
        let mut groups = GroupSet::default();

        for record in batch {
            let entity_type = match self.entity_type(&record.entity_kind) {
                Ok(entity_type) => entity_type,
                Err(e) => {
                    self.stats.records_unresolved += 1;
                    tracing::debug!("Skipped record: {}", e);
                    continue;
                }
            };

            let (before, after) = record.before_after();
            let mut entity = EntitySnapshot::with_originals(entity_type.as_str(), before);
            for (name, value) in self.resolver.deserialize(&entity_type, after) {
                entity.set_attribute(name, value);
            }

            groups.add(record.operation, &record.entity_kind, entity);
        }

        groups.into_groups()
    }

    fn entity_type(&self, entity_kind: &str) -> Result<String, ChangefeedError> {
        self.resolver
            .resolve(entity_kind)
            .ok_or_else(|| ChangefeedError::UnresolvedEntityKind(entity_kind.to_string()))
    }

    fn report(&mut self, raw: &[u8], error: &ChangefeedError) {
        match error {
            ChangefeedError::ParseError(reason) => {
                tracing::error!(reason = %reason, "{}", String::from_utf8_lossy(raw));
                self.diagnostics.malformed(raw);
            }
            ChangefeedError::UnknownTransaction(xid) => {
                tracing::warn!(xid, "Dropped record for unknown transaction");
            }
            ChangefeedError::UnsupportedAction(action) => {
                tracing::warn!(action = %action, "Dropped record with unsupported action");
            }
            other => {
                tracing::error!("Dropped record: {}", other);
            }
        }
    }

    /// Returns `true` if a buffer is live for `xid`.
    pub fn is_live(&self, xid: i64) -> bool {
        self.buffers.contains_key(&xid)
    }

    /// Number of transactions begun and not yet committed.
    pub fn live_transactions(&self) -> usize {
        self.buffers.len()
    }

    pub fn stats(&self) -> MaterializerStats {
        self.stats
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut D {
        &mut self.dispatcher
    }
}
