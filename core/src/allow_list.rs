use std::collections::HashSet;

use crate::config::LabelConfig;

/// Operator-approved device classes. Anything else an upstream snapshot
/// emits never reaches the resource tree.
#[derive(Debug, Clone)]
pub struct AllowList {
    base: HashSet<String>,
    suffixes: Vec<String>,
}

impl AllowList {
    pub fn new(config: &LabelConfig) -> Self {
        Self {
            base: config.base_categories.iter().cloned().collect(),
            suffixes: config
                .discriminated_categories
                .iter()
                .map(|category| format!("_{category}"))
                .collect(),
        }
    }

    pub fn is_allowed(&self, label: &str) -> bool {
        if label.is_empty() {
            return false;
        }
        self.base.contains(label) || self.suffixes.iter().any(|suffix| label.ends_with(suffix))
    }
}

impl Default for AllowList {
    fn default() -> Self {
        Self::new(&LabelConfig::default())
    }
}
