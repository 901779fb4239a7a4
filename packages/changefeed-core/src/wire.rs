//! Newline-delimited JSON records emitted by the capture process.
//!
//! ```text
//! {"action":"B","xid":1}
//! {"action":"U","xid":1,"table":"users","identity":[{"name":"id","value":1}],"columns":[...]}
//! {"action":"C","xid":1}
//! ```

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ChangefeedError;
use crate::transaction::{Attributes, ChangeRecord, Operation};

/// One decoded wire record.
#[derive(Debug, Clone, PartialEq)]
pub enum WireRecord {
    Begin { xid: i64 },
    Change { xid: i64, record: ChangeRecord },
    Commit { xid: i64 },
}

impl WireRecord {
    pub fn xid(&self) -> i64 {
        match self {
            WireRecord::Begin { xid }
            | WireRecord::Change { xid, .. }
            | WireRecord::Commit { xid } => *xid,
        }
    }
}

#[derive(Deserialize)]
struct ColumnValue {
    name: String,
    #[serde(default)]
    value: Value,
}

/// Parses one raw record.
///
/// Anything that is not a JSON object with a string `action` and an integer
/// `xid` is a `ParseError`. Actions other than B/I/U/D/C are reported as
/// `UnsupportedAction`.
pub fn parse_record(raw: &[u8]) -> Result<WireRecord, ChangefeedError> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|e| ChangefeedError::ParseError(e.to_string()))?;

    let Value::Object(mut object) = value else {
        return Err(ChangefeedError::ParseError(
            "record is not an object".to_string(),
        ));
    };

    let action = match object.get("action") {
        Some(Value::String(action)) => action.clone(),
        _ => {
            return Err(ChangefeedError::ParseError(
                "missing string field 'action'".to_string(),
            ))
        }
    };

    let xid = object
        .get("xid")
        .and_then(Value::as_i64)
        .ok_or_else(|| ChangefeedError::ParseError("missing integer field 'xid'".to_string()))?;

    match action.as_str() {
        "B" => Ok(WireRecord::Begin { xid }),
        "C" => Ok(WireRecord::Commit { xid }),
        other => {
            let operation = Operation::from_action(other)
                .ok_or_else(|| ChangefeedError::UnsupportedAction(other.to_string()))?;

            let entity_kind = match object.remove("table") {
                Some(Value::String(table)) => table,
                _ => {
                    return Err(ChangefeedError::ParseError(
                        "change record missing string field 'table'".to_string(),
                    ))
                }
            };

            let identity = column_map(&mut object, "identity")?;
            let columns = column_map(&mut object, "columns")?;

            Ok(WireRecord::Change {
                xid,
                record: ChangeRecord::new(operation, entity_kind, identity, columns),
            })
        }
    }
}

/// Normalizes an optional `[{name, value}, ...]` array into a mapping.
fn column_map(object: &mut Map<String, Value>, field: &str) -> Result<Attributes, ChangefeedError> {
    let Some(rows) = object.remove(field) else {
        return Ok(Attributes::new());
    };
    if rows.is_null() {
        return Ok(Attributes::new());
    }

    let rows: Vec<ColumnValue> = serde_json::from_value(rows)
        .map_err(|e| ChangefeedError::ParseError(format!("field '{}': {}", field, e)))?;

    Ok(rows.into_iter().map(|row| (row.name, row.value)).collect())
}
