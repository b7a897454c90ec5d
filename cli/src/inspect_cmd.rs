//! Offline helpers: nothing here talks to the network.

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use clap::Parser;
use factory_bridge_core::BridgeConfig;
use factory_bridge_core::allow_list::AllowList;
use factory_bridge_core::label::LabelDeriver;
use factory_bridge_core::layout::leaf_name;
use factory_bridge_core::snapshot::entity_unit;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

/// Validates an inbound topic against the configured tree.
#[derive(Debug, Parser)]
pub struct TopicArgs {
    pub topic: String,
}

/// Shows the label an entity would be published under.
#[derive(Debug, Parser)]
pub struct LabelArgs {
    /// Category the entity is reported under, e.g. `assemblers`.
    pub category: String,

    /// Entity record as a JSON object.
    #[arg(long = "entity", value_name = "JSON")]
    pub entity: Option<String>,
}

pub fn render_config(config: &BridgeConfig) -> Result<String> {
    toml::to_string_pretty(config).context("failed to render configuration")
}

/// `Ok(Err(reason))` when the topic is rejected.
pub fn check_topic(
    config: &BridgeConfig,
    args: &TopicArgs,
) -> Result<std::result::Result<Value, String>> {
    let layout = config.layout()?;
    Ok(match layout.parse_topic(&args.topic) {
        Ok(parsed) => Ok(json!({
            "label": parsed.label,
            "leaf": parsed.leaf,
            "path": parsed.path,
        })),
        Err(err) => Err(err.to_string()),
    })
}

pub fn describe_label(config: &BridgeConfig, args: &LabelArgs) -> Result<Value> {
    let entity: Map<String, Value> = match &args.entity {
        Some(raw) => match serde_json::from_str(raw).context("--entity is not valid JSON")? {
            Value::Object(entity) => entity,
            _ => bail!("--entity must be a JSON object"),
        },
        None => Map::new(),
    };

    let derived = LabelDeriver::new(&config.labels).derive(Some(&args.category), &entity);
    let allowed = AllowList::new(&config.labels).is_allowed(&derived.label);
    let topic = match entity_unit(&entity) {
        Ok(unit) if allowed => {
            let layout = config.layout()?;
            Some(layout.topic(&derived.label, &leaf_name(&derived.label, &unit)))
        }
        _ => None,
    };
    Ok(json!({
        "label": derived.label,
        "discriminator": derived.discriminator,
        "allowed": allowed,
        "topic": topic,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config() -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.tree.app_root = "/root".to_string();
        config
    }

    #[test]
    fn topic_check_reports_label_and_leaf() {
        let args = TopicArgs {
            topic: "/root/factory_car/boilers/boilers_12".to_string(),
        };
        let parsed = check_topic(&config(), &args).expect("layout").expect("accepted");
        assert_eq!(
            parsed,
            json!({
                "label": "boilers",
                "leaf": "boilers_12",
                "path": "/root/factory_car/boilers/boilers_12",
            })
        );
    }

    #[test]
    fn topic_check_rejects_missing_unit() {
        let args = TopicArgs {
            topic: "/root/factory_car/boilers".to_string(),
        };
        assert!(check_topic(&config(), &args).expect("layout").is_err());
    }

    #[test]
    fn label_description_includes_topic_for_allowed_units() {
        let args = LabelArgs {
            category: "assemblers".to_string(),
            entity: Some(r#"{"unit_number": 3, "recipe": "Iron Plate"}"#.to_string()),
        };
        assert_eq!(
            describe_label(&config(), &args).expect("described"),
            json!({
                "label": "iron_plate_assemblers",
                "discriminator": "Iron Plate",
                "allowed": true,
                "topic": "/root/factory_car/iron_plate_assemblers/iron_plate_assemblers_3",
            })
        );
    }

    #[test]
    fn label_description_rejects_non_object_entities() {
        let args = LabelArgs {
            category: "boilers".to_string(),
            entity: Some("[1, 2]".to_string()),
        };
        assert!(describe_label(&config(), &args).is_err());
    }
}
