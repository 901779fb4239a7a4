use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Column name to value mapping, in the order the columns were reported.
pub type Attributes = IndexMap<String, Value>;

/// Kind of row-level mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    #[serde(rename = "I")]
    Insert,
    #[serde(rename = "U")]
    Update,
    #[serde(rename = "D")]
    Delete,
}

impl Operation {
    /// Maps a wire action code onto an operation.
    pub fn from_action(action: &str) -> Option<Self> {
        match action {
            "I" => Some(Operation::Insert),
            "U" => Some(Operation::Update),
            "D" => Some(Operation::Delete),
            _ => None,
        }
    }

    /// Wire action code.
    pub fn action(&self) -> &'static str {
        match self {
            Operation::Insert => "I",
            Operation::Update => "U",
            Operation::Delete => "D",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// One row-level mutation inside a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub operation: Operation,
    /// Table the row belongs to
    pub entity_kind: String,
    /// Old key columns (update and delete)
    #[serde(default)]
    pub identity: Attributes,
    /// New column values (insert and update)
    #[serde(default)]
    pub columns: Attributes,
}

impl ChangeRecord {
    pub fn new(
        operation: Operation,
        entity_kind: impl Into<String>,
        identity: Attributes,
        columns: Attributes,
    ) -> Self {
        Self {
            operation,
            entity_kind: entity_kind.into(),
            identity,
            columns,
        }
    }

    /// Resolves the before and after attribute mappings for this change.
    ///
    /// Insert: both are the columns. Delete: both are the identity.
    /// Update: before is the identity plus any column it lacks; after is the
    /// identity overwritten by the columns.
    pub fn before_after(&self) -> (Attributes, Attributes) {
        match self.operation {
            Operation::Insert => (self.columns.clone(), self.columns.clone()),
            Operation::Delete => (self.identity.clone(), self.identity.clone()),
            Operation::Update => {
                let mut before = self.identity.clone();
                let mut after = self.identity.clone();
                for (name, value) in &self.columns {
                    if !before.contains_key(name) {
                        before.insert(name.clone(), value.clone());
                    }
                    after.insert(name.clone(), value.clone());
                }
                (before, after)
            }
        }
    }
}
