use std::collections::HashMap;

use serde::Serialize;

use crate::transaction::Operation;

use super::snapshot::EntitySnapshot;

/// Snapshots sharing one operation and entity kind, dispatched together.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventModelsGroup {
    pub operation: Operation,
    /// Table the rows belong to
    pub entity_kind: String,
    /// Application entity type resolved for `entity_kind`
    pub entity_type: String,
    pub entities: Vec<EntitySnapshot>,
}

impl EventModelsGroup {
    pub fn new(
        operation: Operation,
        entity_kind: impl Into<String>,
        entity_type: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            entity_kind: entity_kind.into(),
            entity_type: entity_type.into(),
            entities: Vec::new(),
        }
    }

    pub fn add(&mut self, entity: EntitySnapshot) {
        self.entities.push(entity);
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Groups of one replay batch, kept in order of first appearance.
#[derive(Debug, Default)]
pub(crate) struct GroupSet {
    groups: Vec<EventModelsGroup>,
    index: HashMap<(Operation, String), usize>,
}

impl GroupSet {
    /// Adds a snapshot to the group for `(operation, entity_kind)`, creating it if new.
    pub(crate) fn add(
        &mut self,
        operation: Operation,
        entity_kind: &str,
        entity: EntitySnapshot,
    ) {
        let key = (operation, entity_kind.to_string());
        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => {
                self.groups.push(EventModelsGroup::new(
                    operation,
                    entity_kind,
                    entity.entity_type(),
                ));
                self.index.insert(key, self.groups.len() - 1);
                self.groups.len() - 1
            }
        };
        self.groups[slot].add(entity);
    }

    pub(crate) fn into_groups(self) -> Vec<EventModelsGroup> {
        self.groups
    }
}
