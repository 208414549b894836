use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use thiserror::Error;

pub const DOCUMENT_SCHEMA_VERSION: u32 = 1;
/// Expansion caps; generated documents are untrusted input.
pub const MAX_NODES: usize = 256;
pub const MAX_DEPTH: usize = 8;

/// Conventional name of the entry definition.
pub const ENTRY_NAME: &str = "Component";
/// Names the runtime claims for itself; never eligible as an entry
/// fallback.
pub const RESERVED_NAMES: &[&str] = &["Fragment", "Root"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Stack,
    Heading,
    Text,
    Button,
    Input,
    Image,
    Card,
    Badge,
    Divider,
    Ref,
    Unknown(String),
}

impl NodeKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Stack => "stack",
            Self::Heading => "heading",
            Self::Text => "text",
            Self::Button => "button",
            Self::Input => "input",
            Self::Image => "image",
            Self::Card => "card",
            Self::Badge => "badge",
            Self::Divider => "divider",
            Self::Ref => "ref",
            Self::Unknown(kind) => kind.as_str(),
        }
    }
}

impl<'de> Deserialize<'de> for NodeKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "stack" => Self::Stack,
            "heading" => Self::Heading,
            "text" => Self::Text,
            "button" => Self::Button,
            "input" => Self::Input,
            "image" => Self::Image,
            "card" => Self::Card,
            "badge" => Self::Badge,
            "divider" => Self::Divider,
            "ref" => Self::Ref,
            _ => Self::Unknown(raw),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Vertical,
    Horizontal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonVariant {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeTone {
    Neutral,
    Success,
    Warning,
    Danger,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawDocument {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub definitions: Vec<RawDefinition>,
}

fn default_schema_version() -> u32 {
    DOCUMENT_SCHEMA_VERSION
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawDefinition {
    pub name: String,
    pub node: RawNode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawNode {
    pub kind: NodeKind,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub src: Option<String>,
    #[serde(default)]
    pub alt: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub level: Option<u8>,
    #[serde(default)]
    pub height: Option<f32>,
    #[serde(default)]
    pub gap: Option<f32>,
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(default)]
    pub variant: Option<ButtonVariant>,
    #[serde(default)]
    pub tone: Option<BadgeTone>,
    #[serde(default)]
    pub children: Vec<RawNode>,
}

/// Fully expanded, validated render tree. All `ref` indirections are
/// resolved away; what remains maps one-to-one onto registry widgets.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanNode {
    Stack {
        direction: Direction,
        gap: f32,
        children: Vec<PlanNode>,
    },
    Heading {
        level: u8,
        text: String,
    },
    Text {
        text: String,
    },
    Button {
        label: String,
        variant: ButtonVariant,
    },
    Input {
        id: String,
        label: String,
        placeholder: String,
    },
    Image {
        src: String,
        alt: String,
        height: f32,
    },
    Card {
        title: Option<String>,
        children: Vec<PlanNode>,
    },
    Badge {
        label: String,
        tone: BadgeTone,
    },
    Divider,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderPlan {
    pub entry: String,
    pub root: PlanNode,
    pub node_count: usize,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderFault {
    #[error("document parse error: {0}")]
    DocumentParse(String),
    #[error("definition `{name}` is declared more than once")]
    DuplicateDefinition { name: String },
    #[error("unknown node kind `{kind}` in definition `{definition}`")]
    UnknownNode { definition: String, kind: String },
    #[error("`{kind}` node is missing required field `{field}`")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
    #[error("reference to unknown definition `{name}`")]
    UnknownReference { name: String },
    #[error("node count exceeds limit {max}")]
    TooManyNodes { max: usize },
    #[error("nesting depth {actual} exceeds limit {max}")]
    TooDeep { max: usize, actual: usize },
    #[error("unsupported document schema version {0}")]
    UnsupportedSchema(u32),
    #[error("no entry component found; define one named `{ENTRY_NAME}`")]
    NoEntryComponent,
    #[error("preview worker went away before reporting a result")]
    WorkerLost,
    #[error("evaluation did not finish within {0} ms")]
    Timeout(u64),
}

/// Evaluate untrusted document source: parse, validate, resolve the entry
/// definition, and expand it into a bounded render plan.
pub fn evaluate(source: &str) -> Result<RenderPlan, RenderFault> {
    let document: RawDocument = serde_json::from_str(source)
        .map_err(|err| RenderFault::DocumentParse(err.to_string()))?;
    if document.schema_version > DOCUMENT_SCHEMA_VERSION {
        return Err(RenderFault::UnsupportedSchema(document.schema_version));
    }

    let mut by_name: BTreeMap<&str, &RawDefinition> = BTreeMap::new();
    for definition in &document.definitions {
        if by_name.insert(definition.name.as_str(), definition).is_some() {
            return Err(RenderFault::DuplicateDefinition {
                name: definition.name.clone(),
            });
        }
    }

    let entry = resolve_entry(&document.definitions)?;
    let mut budget = Budget::default();
    let root = expand(&entry.node, &by_name, &entry.name, 1, &mut budget)?;
    Ok(RenderPlan {
        entry: entry.name.clone(),
        root,
        node_count: budget.nodes,
    })
}

/// Entry resolution policy: the definition conventionally named
/// `Component` wins; otherwise the most recently defined, named,
/// non-reserved definition is taken as a last-resort heuristic.
fn resolve_entry(definitions: &[RawDefinition]) -> Result<&RawDefinition, RenderFault> {
    if let Some(entry) = definitions.iter().find(|d| d.name == ENTRY_NAME) {
        return Ok(entry);
    }
    definitions
        .iter()
        .rev()
        .find(|d| {
            let name = d.name.trim();
            !name.is_empty() && !RESERVED_NAMES.contains(&name)
        })
        .ok_or(RenderFault::NoEntryComponent)
}

#[derive(Default)]
struct Budget {
    nodes: usize,
}

impl Budget {
    fn charge(&mut self) -> Result<(), RenderFault> {
        self.nodes += 1;
        if self.nodes > MAX_NODES {
            Err(RenderFault::TooManyNodes { max: MAX_NODES })
        } else {
            Ok(())
        }
    }
}

fn expand(
    node: &RawNode,
    by_name: &BTreeMap<&str, &RawDefinition>,
    definition: &str,
    depth: usize,
    budget: &mut Budget,
) -> Result<PlanNode, RenderFault> {
    if depth > MAX_DEPTH {
        return Err(RenderFault::TooDeep {
            max: MAX_DEPTH,
            actual: depth,
        });
    }
    budget.charge()?;

    let require = |field: Option<&String>, kind: &'static str, name: &'static str| {
        field.cloned().ok_or(RenderFault::MissingField { kind, field: name })
    };

    match &node.kind {
        NodeKind::Stack => Ok(PlanNode::Stack {
            direction: node.direction.unwrap_or(Direction::Vertical),
            gap: node.gap.unwrap_or(8.0).clamp(0.0, 64.0),
            children: expand_children(node, by_name, definition, depth, budget)?,
        }),
        NodeKind::Heading => Ok(PlanNode::Heading {
            level: node.level.unwrap_or(2).clamp(1, 3),
            text: require(node.text.as_ref(), "heading", "text")?,
        }),
        NodeKind::Text => Ok(PlanNode::Text {
            text: require(node.text.as_ref(), "text", "text")?,
        }),
        NodeKind::Button => Ok(PlanNode::Button {
            label: require(node.label.as_ref(), "button", "label")?,
            variant: node.variant.unwrap_or(ButtonVariant::Secondary),
        }),
        NodeKind::Input => Ok(PlanNode::Input {
            id: require(node.id.as_ref(), "input", "id")?,
            label: node.label.clone().unwrap_or_default(),
            placeholder: node.placeholder.clone().unwrap_or_default(),
        }),
        NodeKind::Image => Ok(PlanNode::Image {
            src: require(node.src.as_ref(), "image", "src")?,
            alt: node.alt.clone().unwrap_or_default(),
            height: node.height.unwrap_or(160.0).clamp(24.0, 600.0),
        }),
        NodeKind::Card => Ok(PlanNode::Card {
            title: node.title.clone(),
            children: expand_children(node, by_name, definition, depth, budget)?,
        }),
        NodeKind::Badge => Ok(PlanNode::Badge {
            label: require(node.label.as_ref(), "badge", "label")?,
            tone: node.tone.unwrap_or(BadgeTone::Neutral),
        }),
        NodeKind::Divider => Ok(PlanNode::Divider),
        NodeKind::Ref => {
            let target = require(node.name.as_ref(), "ref", "name")?;
            let referenced =
                by_name
                    .get(target.as_str())
                    .ok_or_else(|| RenderFault::UnknownReference {
                        name: target.clone(),
                    })?;
            // Indirection counts toward depth, so cycles hit the cap.
            expand(&referenced.node, by_name, &referenced.name, depth + 1, budget)
        }
        NodeKind::Unknown(kind) => Err(RenderFault::UnknownNode {
            definition: definition.to_string(),
            kind: kind.clone(),
        }),
    }
}

fn expand_children(
    node: &RawNode,
    by_name: &BTreeMap<&str, &RawDefinition>,
    definition: &str,
    depth: usize,
    budget: &mut Budget,
) -> Result<Vec<PlanNode>, RenderFault> {
    node.children
        .iter()
        .map(|child| expand(child, by_name, definition, depth + 1, budget))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(definitions: serde_json::Value) -> String {
        json!({ "schema_version": 1, "definitions": definitions }).to_string()
    }

    #[test]
    fn valid_document_expands() {
        let source = doc(json!([
            { "name": "Component", "node": {
                "kind": "stack",
                "children": [
                    { "kind": "heading", "level": 1, "text": "Hello" },
                    { "kind": "button", "label": "Go", "variant": "primary" }
                ]
            }}
        ]));
        let plan = evaluate(&source).expect("document should evaluate");
        assert_eq!(plan.entry, ENTRY_NAME);
        assert_eq!(plan.node_count, 3);
    }

    #[test]
    fn parse_failure_is_a_contained_fault() {
        assert!(matches!(
            evaluate("{ not json"),
            Err(RenderFault::DocumentParse(_))
        ));
    }

    #[test]
    fn entry_prefers_the_conventional_name() {
        let source = doc(json!([
            { "name": "Component", "node": { "kind": "text", "text": "entry" } },
            { "name": "Later", "node": { "kind": "text", "text": "later" } }
        ]));
        let plan = evaluate(&source).expect("document should evaluate");
        assert_eq!(plan.entry, "Component");
        assert_eq!(
            plan.root,
            PlanNode::Text {
                text: "entry".to_string()
            }
        );
    }

    #[test]
    fn entry_falls_back_to_most_recent_named_definition() {
        let source = doc(json!([
            { "name": "First", "node": { "kind": "text", "text": "a" } },
            { "name": "Second", "node": { "kind": "text", "text": "b" } },
            { "name": "Fragment", "node": { "kind": "text", "text": "reserved" } }
        ]));
        let plan = evaluate(&source).expect("fallback should apply");
        assert_eq!(plan.entry, "Second");
    }

    #[test]
    fn missing_entry_is_reported() {
        let source = doc(json!([
            { "name": "  ", "node": { "kind": "divider" } },
            { "name": "Fragment", "node": { "kind": "divider" } }
        ]));
        assert_eq!(evaluate(&source), Err(RenderFault::NoEntryComponent));
        assert_eq!(evaluate(&doc(json!([]))), Err(RenderFault::NoEntryComponent));
    }

    #[test]
    fn future_schema_versions_are_rejected() {
        let source = json!({
            "schema_version": 99,
            "definitions": [
                { "name": "Component", "node": { "kind": "divider" } }
            ]
        })
        .to_string();
        assert_eq!(evaluate(&source), Err(RenderFault::UnsupportedSchema(99)));
    }

    #[test]
    fn duplicate_definitions_are_rejected() {
        let source = doc(json!([
            { "name": "Component", "node": { "kind": "divider" } },
            { "name": "Component", "node": { "kind": "divider" } }
        ]));
        assert!(matches!(
            evaluate(&source),
            Err(RenderFault::DuplicateDefinition { .. })
        ));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let source = doc(json!([
            { "name": "Component", "node": { "kind": "carousel" } }
        ]));
        assert_eq!(
            evaluate(&source),
            Err(RenderFault::UnknownNode {
                definition: "Component".to_string(),
                kind: "carousel".to_string()
            })
        );
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let source = doc(json!([
            { "name": "Component", "node": { "kind": "heading" } }
        ]));
        assert_eq!(
            evaluate(&source),
            Err(RenderFault::MissingField {
                kind: "heading",
                field: "text"
            })
        );
    }

    #[test]
    fn dangling_reference_is_rejected() {
        let source = doc(json!([
            { "name": "Component", "node": { "kind": "ref", "name": "Ghost" } }
        ]));
        assert_eq!(
            evaluate(&source),
            Err(RenderFault::UnknownReference {
                name: "Ghost".to_string()
            })
        );
    }

    #[test]
    fn reference_cycles_hit_the_depth_cap() {
        let source = doc(json!([
            { "name": "A", "node": { "kind": "ref", "name": "B" } },
            { "name": "B", "node": { "kind": "ref", "name": "A" } },
            { "name": "Component", "node": { "kind": "ref", "name": "A" } }
        ]));
        assert!(matches!(evaluate(&source), Err(RenderFault::TooDeep { .. })));
    }

    #[test]
    fn node_budget_is_enforced() {
        let children: Vec<_> = (0..MAX_NODES + 1)
            .map(|i| json!({ "kind": "text", "text": format!("line {i}") }))
            .collect();
        let source = doc(json!([
            { "name": "Component", "node": { "kind": "stack", "children": children } }
        ]));
        assert_eq!(
            evaluate(&source),
            Err(RenderFault::TooManyNodes { max: MAX_NODES })
        );
    }

    #[test]
    fn references_expand_into_the_plan() {
        let source = doc(json!([
            { "name": "Chip", "node": { "kind": "badge", "label": "New", "tone": "success" } },
            { "name": "Component", "node": {
                "kind": "card", "title": "Release",
                "children": [
                    { "kind": "ref", "name": "Chip" },
                    { "kind": "ref", "name": "Chip" }
                ]
            }}
        ]));
        let plan = evaluate(&source).expect("document should evaluate");
        let PlanNode::Card { children, .. } = plan.root else {
            panic!("expected a card root");
        };
        assert_eq!(children.len(), 2);
        assert!(matches!(children[0], PlanNode::Badge { .. }));
    }

    #[test]
    fn defaults_are_applied_and_clamped() {
        let source = doc(json!([
            { "name": "Component", "node": {
                "kind": "stack",
                "gap": 500.0,
                "children": [
                    { "kind": "heading", "level": 9, "text": "t" },
                    { "kind": "image", "src": "https://picsum.photos/400", "height": 2000.0 }
                ]
            }}
        ]));
        let plan = evaluate(&source).expect("document should evaluate");
        let PlanNode::Stack { gap, children, .. } = plan.root else {
            panic!("expected a stack root");
        };
        assert_eq!(gap, 64.0);
        assert_eq!(children[0], PlanNode::Heading { level: 3, text: "t".to_string() });
        assert!(matches!(
            children[1],
            PlanNode::Image { height, .. } if height == 600.0
        ));
    }
}
