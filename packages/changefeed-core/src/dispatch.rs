//! Seams to the application: entity resolution, event delivery and the
//! diagnostic sink for malformed records.

use std::collections::HashMap;
use std::io::Write;

use crate::materializer::EventModelsGroup;
use crate::transaction::Attributes;

/// Maps entity kinds (table names) onto application entity types.
pub trait EntityResolver {
    /// Returns the entity type registered for `entity_kind`, if any.
    fn resolve(&self, entity_kind: &str) -> Option<String>;

    /// Converts raw after-state values into the entity type's representation.
    fn deserialize(&self, _entity_type: &str, attributes: Attributes) -> Attributes {
        attributes
    }
}

impl EntityResolver for HashMap<String, String> {
    fn resolve(&self, entity_kind: &str) -> Option<String> {
        self.get(entity_kind).cloned()
    }
}

/// Receives finished event groups, one at a time.
pub trait EventDispatcher {
    fn dispatch(&mut self, group: EventModelsGroup);
}

/// Collects groups in dispatch order.
impl EventDispatcher for Vec<EventModelsGroup> {
    fn dispatch(&mut self, group: EventModelsGroup) {
        self.push(group);
    }
}

/// Secondary destination for raw malformed records.
pub trait DiagnosticSink {
    fn malformed(&mut self, raw: &[u8]);
}

/// Writes malformed records to standard output, one per line.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl DiagnosticSink for StdoutSink {
    fn malformed(&mut self, raw: &[u8]) {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        let _ = out.write_all(raw).and_then(|_| out.write_all(b"\n"));
    }
}

/// Discards malformed records.
#[derive(Debug, Default)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn malformed(&mut self, _raw: &[u8]) {}
}
