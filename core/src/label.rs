use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::config::LabelConfig;

pub const UNKNOWN_LABEL: &str = "unknown";

/// Label of one entity plus the raw recipe folded into it, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivedLabel {
    pub label: String,
    pub discriminator: Option<String>,
}

impl DerivedLabel {
    fn base(label: &str) -> Self {
        Self {
            label: label.to_string(),
            discriminator: None,
        }
    }
}

/// Maps a category and an entity record to the label its resources live
/// under. Pure: no I/O and no shared state.
#[derive(Debug, Clone)]
pub struct LabelDeriver {
    discriminated: Vec<String>,
    fields: Vec<String>,
}

impl LabelDeriver {
    pub fn new(config: &LabelConfig) -> Self {
        Self {
            discriminated: config.discriminated_categories.clone(),
            fields: config.discriminator_fields.clone(),
        }
    }

    pub fn derive(&self, category: Option<&str>, entity: &Map<String, Value>) -> DerivedLabel {
        let Some(category) = category.filter(|c| !c.is_empty()) else {
            return DerivedLabel::base(UNKNOWN_LABEL);
        };
        if !self.discriminated.iter().any(|c| c == category) {
            return DerivedLabel::base(category);
        }

        let Some(raw) = self.discriminator_value(entity) else {
            return DerivedLabel::base(category);
        };
        match normalize_discriminator(raw) {
            Some(normalized) => DerivedLabel {
                label: format!("{normalized}_{category}"),
                discriminator: Some(raw.to_string()),
            },
            None => DerivedLabel::base(category),
        }
    }

    fn discriminator_value<'a>(&self, entity: &'a Map<String, Value>) -> Option<&'a str> {
        let value = self
            .fields
            .iter()
            .filter_map(|field| entity.get(field))
            .find(|value| is_present(value))?;
        value.as_str()
    }
}

impl Default for LabelDeriver {
    fn default() -> Self {
        Self::new(&LabelConfig::default())
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Lowercases, collapses whitespace runs into `_`, and drops everything
/// that is not an ASCII alphanumeric or `_`. `None` when nothing is left.
pub fn normalize_discriminator(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut in_whitespace = false;
    for ch in raw.chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                out.push('_');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;
        if ch.is_ascii_alphanumeric() || ch == '_' {
            out.push(ch.to_ascii_lowercase());
        }
    }
    (!out.is_empty()).then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn entity(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn folds_recipe_into_assembler_label() {
        let fields = entity(json!({"recipe": "Iron Plate"}));
        let derived = LabelDeriver::default().derive(Some("assemblers"), &fields);
        assert_eq!(
            derived,
            DerivedLabel {
                label: "iron_plate_assemblers".to_string(),
                discriminator: Some("Iron Plate".to_string()),
            }
        );
    }

    #[test]
    fn assembler_without_recipe_keeps_base_label() {
        let derived = LabelDeriver::default().derive(Some("assemblers"), &entity(json!({})));
        assert_eq!(derived, DerivedLabel::base("assemblers"));
    }

    #[test]
    fn later_candidate_fields_are_consulted() {
        let derived = LabelDeriver::default().derive(
            Some("electric_furnaces"),
            &entity(json!({"recipe": null, "recipe_name": "", "current_recipe": "steel plate"})),
        );
        assert_eq!(derived.label, "steel_plate_electric_furnaces");
        assert_eq!(derived.discriminator.as_deref(), Some("steel plate"));
    }

    #[test]
    fn unnormalizable_recipe_falls_back_to_base() {
        let derived =
            LabelDeriver::default().derive(Some("assemblers"), &entity(json!({"recipe": "--!!"})));
        assert_eq!(derived, DerivedLabel::base("assemblers"));

        let numeric = entity(json!({"recipe": 7}));
        let derived = LabelDeriver::default().derive(Some("assemblers"), &numeric);
        assert_eq!(derived, DerivedLabel::base("assemblers"));
    }

    #[test]
    fn other_categories_ignore_recipe() {
        let derived =
            LabelDeriver::default().derive(Some("boilers"), &entity(json!({"recipe": "steam"})));
        assert_eq!(derived, DerivedLabel::base("boilers"));
    }

    #[test]
    fn missing_category_is_unknown() {
        let deriver = LabelDeriver::default();
        assert_eq!(
            deriver.derive(None, &entity(json!({}))),
            DerivedLabel::base(UNKNOWN_LABEL)
        );
        assert_eq!(
            deriver.derive(Some(""), &entity(json!({}))),
            DerivedLabel::base(UNKNOWN_LABEL)
        );
    }

    #[test]
    fn normalization_collapses_whitespace_and_strips_symbols() {
        assert_eq!(
            normalize_discriminator("  Advanced\t Circuit (x2) ").as_deref(),
            Some("_advanced_circuit_x2_")
        );
        assert_eq!(normalize_discriminator("iron-gear-wheel").as_deref(), Some("irongearwheel"));
        assert_eq!(normalize_discriminator(" "), Some("_".to_string()));
        assert_eq!(normalize_discriminator(""), None);
    }
}
