//! Addressing of the bridge's slice of the resource tree.
//!
//! Every resource the bridge owns lives under
//! `<app_root>/<container>/<label>/<label>_<unit>`, and the pub/sub topics
//! mirror those paths one-to-one.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("app root {0:?} has an empty segment")]
    EmptyRootSegment(String),
    #[error("container name {0:?} must be a single non-empty segment")]
    InvalidContainer(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    #[error("topic {0:?} is outside the bridge root")]
    OutsideRoot(String),
    #[error("topic {topic:?} has {segments} segments below the bridge root, expected 2")]
    SegmentCount { topic: String, segments: usize },
    #[error("unit segment {leaf:?} is not of the form {label}_<unit>")]
    UnitMismatch { label: String, leaf: String },
}

/// Slash-delimited address of a resource in the remote tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ResourcePath(String);

impl ResourcePath {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let trimmed = path.trim_end_matches('/');
        if trimmed.len() == path.len() {
            Self(path)
        } else {
            Self(trimmed.to_string())
        }
    }

    pub fn child(&self, name: &str) -> Self {
        Self(format!("{}/{name}", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourcePath {
    fn from(value: &str) -> Self {
        ResourcePath::new(value)
    }
}

/// A validated inbound topic of the form `<root>/<label>/<label>_<unit>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundTopic {
    pub label: String,
    pub leaf: String,
    pub path: ResourcePath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeLayout {
    app_root: ResourcePath,
    container: String,
    bridge_root: ResourcePath,
    base_segments: usize,
}

impl TreeLayout {
    pub fn new(app_root: &str, container: &str) -> Result<Self, LayoutError> {
        let trimmed = app_root.trim_end_matches('/');
        let normalized = if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        };
        let root_segments: Vec<&str> = normalized[1..].split('/').collect();
        if root_segments.iter().any(|segment| segment.is_empty()) {
            return Err(LayoutError::EmptyRootSegment(app_root.to_string()));
        }
        if container.is_empty() || container.contains('/') {
            return Err(LayoutError::InvalidContainer(container.to_string()));
        }

        let base_segments = root_segments.len() + 1;
        let app_root = ResourcePath::new(normalized);
        let bridge_root = app_root.child(container);
        Ok(Self {
            base_segments,
            app_root,
            container: container.to_string(),
            bridge_root,
        })
    }

    pub fn app_root(&self) -> &ResourcePath {
        &self.app_root
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    /// `<app_root>/<container>`
    pub fn bridge_root(&self) -> &ResourcePath {
        &self.bridge_root
    }

    pub fn label_path(&self, label: &str) -> ResourcePath {
        self.bridge_root.child(label)
    }

    pub fn leaf_path(&self, label: &str, leaf: &str) -> ResourcePath {
        self.label_path(label).child(leaf)
    }

    /// Outbound topic for one unit; identical to its resource path.
    pub fn topic(&self, label: &str, leaf: &str) -> String {
        self.leaf_path(label, leaf).0
    }

    pub fn inbound_filter(&self) -> String {
        format!("{}/#", self.bridge_root)
    }

    pub fn parse_topic(&self, topic: &str) -> Result<InboundTopic, TopicError> {
        let prefix = format!("{}/", self.bridge_root);
        if !topic.starts_with(&prefix) {
            return Err(TopicError::OutsideRoot(topic.to_string()));
        }
        let parts: Vec<&str> = topic.split('/').filter(|part| !part.is_empty()).collect();
        let relative = parts.get(self.base_segments..).unwrap_or_default();
        let [label, leaf] = relative else {
            return Err(TopicError::SegmentCount {
                topic: topic.to_string(),
                segments: relative.len(),
            });
        };
        let has_unit = leaf
            .strip_prefix(label)
            .and_then(|rest| rest.strip_prefix('_'))
            .is_some_and(|unit| !unit.is_empty());
        if !has_unit {
            return Err(TopicError::UnitMismatch {
                label: (*label).to_string(),
                leaf: (*leaf).to_string(),
            });
        }
        Ok(InboundTopic {
            label: (*label).to_string(),
            leaf: (*leaf).to_string(),
            path: self.leaf_path(label, leaf),
        })
    }
}

/// Name of the leaf container for one unit.
pub fn leaf_name(label: &str, unit: &str) -> String {
    format!("{label}_{unit}")
}

/// Returns the label prefix of a unit-qualified name such as `boilers_12`.
///
/// The unit suffix must be all digits; the prefix is everything before the
/// last underscore.
pub fn label_of_unit_name(name: &str) -> Option<&str> {
    let (label, unit) = name.rsplit_once('_')?;
    if label.is_empty() || unit.is_empty() || !unit.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    fn layout() -> TreeLayout {
        TreeLayout::new("/root", "factory_car").expect("layout")
    }

    #[test]
    fn builds_paths_under_bridge_root() {
        let layout = TreeLayout::new("/Mobius/ae1/", "factory_car").expect("layout");
        assert_eq!(layout.bridge_root().as_str(), "/Mobius/ae1/factory_car");
        assert_eq!(
            layout.leaf_path("boilers", "boilers_7").as_str(),
            "/Mobius/ae1/factory_car/boilers/boilers_7"
        );
        assert_eq!(layout.inbound_filter(), "/Mobius/ae1/factory_car/#");
    }

    #[test]
    fn accepts_label_and_unit_topic() {
        let parsed = layout()
            .parse_topic("/root/factory_car/boilers/boilers_12")
            .expect("valid topic");
        assert_eq!(parsed.label, "boilers");
        assert_eq!(parsed.leaf, "boilers_12");
        assert_eq!(parsed.path.as_str(), "/root/factory_car/boilers/boilers_12");
    }

    #[test]
    fn rejects_topic_without_unit_segment() {
        assert_matches!(
            layout().parse_topic("/root/factory_car/boilers"),
            Err(TopicError::OutsideRoot(_)) | Err(TopicError::SegmentCount { segments: 1, .. })
        );
        assert_matches!(
            layout().parse_topic("/root/factory_car/boilers/"),
            Err(TopicError::SegmentCount { segments: 1, .. })
        );
    }

    #[test]
    fn rejects_mismatched_or_deep_topics() {
        assert_matches!(
            layout().parse_topic("/root/factory_car/boilers/pumps_3"),
            Err(TopicError::UnitMismatch { .. })
        );
        assert_matches!(
            layout().parse_topic("/root/factory_car/boilers/boilers_"),
            Err(TopicError::UnitMismatch { .. })
        );
        assert_matches!(
            layout().parse_topic("/root/factory_car/boilers/boilers_3/sub1"),
            Err(TopicError::SegmentCount { segments: 3, .. })
        );
        assert_matches!(
            layout().parse_topic("/other/factory_car/boilers/boilers_3"),
            Err(TopicError::OutsideRoot(_))
        );
    }

    #[test]
    fn unit_name_prefix_requires_numeric_suffix() {
        assert_eq!(label_of_unit_name("boilers_12"), Some("boilers"));
        assert_eq!(
            label_of_unit_name("iron_plate_assemblers_4"),
            Some("iron_plate_assemblers")
        );
        assert_eq!(label_of_unit_name("boilers_unknown"), None);
        assert_eq!(label_of_unit_name("_12"), None);
        assert_eq!(label_of_unit_name("boilers"), None);
    }

    #[test]
    fn rejects_bad_layouts() {
        assert_matches!(
            TreeLayout::new("/Mobius//ae1", "c"),
            Err(LayoutError::EmptyRootSegment(_))
        );
        assert_matches!(
            TreeLayout::new("/Mobius", "a/b"),
            Err(LayoutError::InvalidContainer(_))
        );
        assert_matches!(
            TreeLayout::new("/Mobius", ""),
            Err(LayoutError::InvalidContainer(_))
        );
    }
}
