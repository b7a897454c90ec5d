//! Decoding of the JSON snapshot the game server answers each poll with.
//!
//! ```json
//! {"tick": 123, "targets": [{"label": "boilers", "entities": [{"unit_number": 7, ...}]}]}
//! ```

use serde_json::Map;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Upper bound on how much of an offending payload ends up in a diagnostic.
pub const PREVIEW_CHARS: usize = 200;

const UNKNOWN_UNIT: &str = "unknown";
const UNIT_FIELDS: [&str; 2] = ["unit_number", "unit"];
/// Group keys naming the category, in lookup order.
const CATEGORY_FIELDS: [&str; 2] = ["label", "category"];
/// Characters that would split a leaf name into several path or topic levels.
const UNIT_RESERVED: [char; 3] = ['/', '+', '#'];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("invalid snapshot JSON ({message}): {preview}")]
    InvalidJson { message: String, preview: String },
    #[error("snapshot has no `targets` array: {preview}")]
    MissingTargets { preview: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityError {
    #[error("entity is not a JSON object")]
    NotAnObject,
    #[error("entity has no `unit_number` or `unit` field")]
    MissingUnit,
    #[error("entity unit {0:?} is not a single path segment")]
    InvalidUnit(String),
}

/// One polled batch of entity state.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub tick: Option<u64>,
    pub groups: Vec<CategoryGroup>,
}

/// Entities reported under one coarse category. Entities stay raw so that a
/// malformed one is only discovered (and skipped) when it is relayed.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryGroup {
    pub category: Option<String>,
    pub entities: Vec<Value>,
}

impl Snapshot {
    pub fn entity_count(&self) -> usize {
        self.groups.iter().map(|group| group.entities.len()).sum()
    }
}

pub fn decode_snapshot(raw: &str) -> Result<Snapshot, SnapshotError> {
    let value: Value = serde_json::from_str(raw).map_err(|err| SnapshotError::InvalidJson {
        message: err.to_string(),
        preview: preview(raw),
    })?;
    let Some(targets) = value.get("targets").and_then(Value::as_array) else {
        return Err(SnapshotError::MissingTargets {
            preview: preview(raw),
        });
    };

    let mut groups = Vec::with_capacity(targets.len());
    for target in targets {
        let category = CATEGORY_FIELDS
            .iter()
            .find_map(|field| target.get(*field).and_then(Value::as_str))
            .map(str::to_string);
        match target.get("entities").and_then(Value::as_array) {
            Some(entities) => groups.push(CategoryGroup {
                category,
                entities: entities.clone(),
            }),
            None => {
                warn!(?category, "skipping category group without an entities array");
            }
        }
    }

    Ok(Snapshot {
        tick: value.get("tick").and_then(Value::as_u64),
        groups,
    })
}

/// Identifier of one entity, rendered as a path segment.
///
/// A present but null or empty identifier becomes `unknown`. An entity with
/// neither identifier field, or with one containing a path or topic
/// separator, is malformed.
pub fn entity_unit(entity: &Map<String, Value>) -> Result<String, EntityError> {
    let Some(value) = UNIT_FIELDS.iter().find_map(|field| entity.get(*field)) else {
        return Err(EntityError::MissingUnit);
    };
    let unit = match value {
        Value::Number(number) => number.to_string(),
        Value::String(text) if !text.trim().is_empty() => text.trim().to_string(),
        _ => UNKNOWN_UNIT.to_string(),
    };
    if unit.contains(UNIT_RESERVED) {
        return Err(EntityError::InvalidUnit(unit));
    }
    Ok(unit)
}

/// First [`PREVIEW_CHARS`] characters of `raw`, marked when truncated.
pub fn preview(raw: &str) -> String {
    let mut chars = raw.char_indices();
    match chars.nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &raw[..cut]),
        None => raw.to_string(),
    }
}
