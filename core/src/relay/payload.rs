use serde_json::Map;
use serde_json::Value;

use crate::label::DerivedLabel;

/// Builds the outbound data point for one entity.
///
/// The entity's own fields are merged first; `tick`, `label` and
/// `entity_name` are always the relay's values. `recipe` is the discriminator
/// when there is one, otherwise whatever the entity carried (or null).
pub fn build_payload(
    tick: Option<u64>,
    derived: &DerivedLabel,
    entity: &Map<String, Value>,
) -> Value {
    let mut payload = entity.clone();
    let entity_name = entity.get("name").cloned().unwrap_or(Value::Null);
    payload.insert("tick".to_string(), tick.map_or(Value::Null, Value::from));
    payload.insert("label".to_string(), Value::String(derived.label.clone()));
    match &derived.discriminator {
        Some(discriminator) => {
            payload.insert("recipe".to_string(), Value::String(discriminator.clone()));
        }
        None => {
            payload.entry("recipe").or_insert(Value::Null);
        }
    }
    payload.insert("entity_name".to_string(), entity_name);
    Value::Object(payload)
}
