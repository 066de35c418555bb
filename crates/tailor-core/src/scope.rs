//! Edit strategy chosen for a request

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    NodeEdit,
    FullFile,
    ComponentAddition,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [
        Strategy::NodeEdit,
        Strategy::FullFile,
        Strategy::ComponentAddition,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::NodeEdit => "NODE_EDIT",
            Strategy::FullFile => "FULL_FILE",
            Strategy::ComponentAddition => "COMPONENT_ADDITION",
        }
    }

    /// Lenient parse of a strategy name from a service reply.
    ///
    /// Accepts case and separator variations (`node-edit`, `Full File`) but
    /// nothing outside the three known strategies.
    pub fn parse_loose(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '`')
            .chars()
            .map(|c| match c {
                '-' | ' ' => '_',
                other => other.to_ascii_uppercase(),
            })
            .collect();
        match normalized.as_str() {
            "NODE_EDIT" | "TARGETED_NODES" | "TARGETED" => Some(Strategy::NodeEdit),
            "FULL_FILE" | "FULL_FILE_REWRITE" => Some(Strategy::FullFile),
            "COMPONENT_ADDITION" | "COMPONENT_CREATION" | "NEW_COMPONENT" => {
                Some(Strategy::ComponentAddition)
            }
            _ => None,
        }
    }

    /// Node-level strategies need parsed nodes to target.
    pub fn targets_nodes(&self) -> bool {
        matches!(self, Strategy::NodeEdit)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    Page,
    Component,
}

impl ComponentType {
    /// Directory a new component of this type is created in.
    pub fn directory(&self) -> &'static str {
        match self {
            ComponentType::Page => "pages",
            ComponentType::Component => "components",
        }
    }

    pub fn parse_loose(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "page" | "route" | "screen" | "view" => Some(ComponentType::Page),
            "component" | "widget" => Some(ComponentType::Component),
            _ => None,
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentType::Page => f.write_str("page"),
            ComponentType::Component => f.write_str("component"),
        }
    }
}

/// Classification outcome for one request; never changed after creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModificationScope {
    pub strategy: Strategy,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_type: Option<ComponentType>,
}

impl ModificationScope {
    pub fn new(strategy: Strategy, reasoning: impl Into<String>) -> Self {
        Self {
            strategy,
            reasoning: reasoning.into(),
            component_name: None,
            component_type: None,
        }
    }

    pub fn with_component(mut self, name: impl Into<String>, component_type: ComponentType) -> Self {
        self.component_name = Some(name.into());
        self.component_type = Some(component_type);
        self
    }
}
