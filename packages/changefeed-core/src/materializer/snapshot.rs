use serde::Serialize;
use serde_json::Value;

use crate::transaction::Attributes;

/// One changed row: its before-state and the after-state applied on top of it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySnapshot {
    /// Application entity type
    entity_type: String,
    /// Attributes before the change
    original: Attributes,
    /// Attributes after the change
    attributes: Attributes,
}

impl EntitySnapshot {
    /// Creates a snapshot whose current and original attributes are `before`.
    pub fn with_originals(entity_type: impl Into<String>, before: Attributes) -> Self {
        Self {
            entity_type: entity_type.into(),
            attributes: before.clone(),
            original: before,
        }
    }

    /// Sets one current attribute, leaving the original untouched.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: Value) {
        self.attributes.insert(name.into(), value);
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Attributes before the change.
    pub fn original(&self) -> &Attributes {
        &self.original
    }

    /// Attributes after the change.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Current attributes whose value differs from (or is absent in) the original.
    pub fn changes(&self) -> Attributes {
        self.attributes
            .iter()
            .filter(|(name, value)| self.original.get(*name) != Some(*value))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        !self.changes().is_empty()
    }
}
