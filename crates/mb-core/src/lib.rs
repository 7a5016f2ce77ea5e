#![forbid(unsafe_code)]

//! Graph model shared by the parser, layout engine and emitters.
//!
//! A [`Diagram`] is a flat list of [`Node`]s and [`Edge`]s. Grouping is a
//! back-reference from a child to its group (`Node::parent`); child positions
//! are relative to the group's top-left corner.

pub mod metadata;
mod sequence;
mod theme;

pub use sequence::{SequenceMessage, SequenceParticipant, SequenceScript};
pub use theme::{DialectTheme, Theme, ThemeError};

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    #[default]
    Flowchart,
    EntityRelationship,
    Sequence,
}

impl Dialect {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Flowchart => "flowchart",
            Self::EntityRelationship => "er",
            Self::Sequence => "sequence",
        }
    }

    /// Keyword that opens a diagram of this dialect.
    #[must_use]
    pub const fn header(self) -> &'static str {
        match self {
            Self::Flowchart => "flowchart",
            Self::EntityRelationship => "erDiagram",
            Self::Sequence => "sequenceDiagram",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    TD,
    TB,
    LR,
    RL,
    BT,
}

impl Direction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TD => "TD",
            Self::TB => "TB",
            Self::LR => "LR",
            Self::RL => "RL",
            Self::BT => "BT",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "TD" => Some(Self::TD),
            "TB" => Some(Self::TB),
            "LR" => Some(Self::LR),
            "RL" => Some(Self::RL),
            "BT" => Some(Self::BT),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrokeStyle {
    #[default]
    Solid,
    Dashed,
    Dotted,
}

impl StrokeStyle {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Solid => "solid",
            Self::Dashed => "dashed",
            Self::Dotted => "dotted",
        }
    }

    /// Value written to a `stroke-dasharray` style key. `None` for solid.
    #[must_use]
    pub const fn dasharray(self) -> Option<&'static str> {
        match self {
            Self::Solid => None,
            Self::Dashed => Some("5 5"),
            Self::Dotted => Some("2 2"),
        }
    }

    /// Classify a `stroke-dasharray` value: no dash is solid, a first dash
    /// of at least 4 units is dashed, anything shorter is dotted.
    #[must_use]
    pub fn from_dasharray(value: &str) -> Self {
        let first = value
            .split(|c: char| c == ',' || c.is_whitespace())
            .find(|part| !part.is_empty())
            .and_then(|part| part.trim_end_matches("px").parse::<f64>().ok());
        match first {
            None => Self::Solid,
            Some(dash) if dash <= 0.0 => Self::Solid,
            Some(dash) if dash >= 4.0 => Self::Dashed,
            Some(_) => Self::Dotted,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeStyle {
    pub fill: String,
    pub stroke: String,
    pub stroke_style: StrokeStyle,
    pub stroke_width: f64,
    pub text_color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeImage {
    pub url: String,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum GroupShape {
    #[default]
    Rectangle,
    Rounded,
}

impl GroupShape {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rectangle => "rectangle",
            Self::Rounded => "rounded",
        }
    }
}

/// One row of an entity block: `type name [constraint] ["comment"]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct EntityAttribute {
    pub data_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeShape {
    #[default]
    Rectangle,
    Rounded,
    Circle,
    Diamond,
    Cylinder,
    Entity {
        #[serde(default)]
        attributes: Vec<EntityAttribute>,
    },
    Group {
        #[serde(default)]
        variant: GroupShape,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label_background: Option<String>,
    },
    /// Invisible point used by the sequence layout to pin message ends.
    Anchor,
}

impl NodeShape {
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        match self {
            Self::Rectangle => NodeKind::Rectangle,
            Self::Rounded => NodeKind::Rounded,
            Self::Circle => NodeKind::Circle,
            Self::Diamond => NodeKind::Diamond,
            Self::Cylinder => NodeKind::Cylinder,
            Self::Entity { .. } => NodeKind::Entity,
            Self::Group { .. } => NodeKind::Group,
            Self::Anchor => NodeKind::Anchor,
        }
    }

    #[must_use]
    pub const fn group() -> Self {
        Self::Group {
            variant: GroupShape::Rectangle,
            label_background: None,
        }
    }

    #[must_use]
    pub const fn entity() -> Self {
        Self::Entity {
            attributes: Vec::new(),
        }
    }

    #[must_use]
    pub const fn is_group(&self) -> bool {
        matches!(self, Self::Group { .. })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Rectangle,
    Rounded,
    Circle,
    Diamond,
    Cylinder,
    Entity,
    Group,
    Anchor,
}

impl NodeKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rectangle => "rectangle",
            Self::Rounded => "rounded",
            Self::Circle => "circle",
            Self::Diamond => "diamond",
            Self::Cylinder => "cylinder",
            Self::Entity => "entity",
            Self::Group => "group",
            Self::Anchor => "anchor",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: String,
    pub shape: NodeShape,
    pub label: String,
    #[serde(default)]
    pub position: Point,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub style: NodeStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<NodeImage>,
    /// Explicit footprint. Layout fills this in for groups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
}

impl Node {
    /// A node whose label is its own id.
    #[must_use]
    pub fn new(id: impl Into<String>, shape: NodeShape, style: NodeStyle) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            shape,
            position: Point::default(),
            parent: None,
            style,
            image: None,
            size: None,
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        self.shape.kind()
    }
}

/// Cardinality of one side of an entity relationship.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    ZeroOrOne,
    ExactlyOne,
    ZeroOrMore,
    OneOrMore,
}

impl Cardinality {
    #[must_use]
    pub const fn is_many(self) -> bool {
        matches!(self, Self::ZeroOrMore | Self::OneOrMore)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl RelationshipKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneToOne => "one-to-one",
            Self::OneToMany => "one-to-many",
            Self::ManyToOne => "many-to-one",
            Self::ManyToMany => "many-to-many",
        }
    }
}

/// An entity-relationship connector kept verbatim, e.g. `||--o{`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct ErRelationship {
    token: String,
}

impl TryFrom<String> for ErRelationship {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid relationship token `{value}`"))
    }
}

impl From<ErRelationship> for String {
    fn from(value: ErRelationship) -> Self {
        value.token
    }
}

impl ErRelationship {
    /// Accepts `<left><line><right>` where left is one of `|o || }o }|`,
    /// line is `--` (identifying) or `..`, and right is one of `o| || o{ |{`.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        if token.len() != 6 || !token.is_ascii() {
            return None;
        }
        left_cardinality(&token[..2])?;
        if !matches!(&token[2..4], "--" | "..") {
            return None;
        }
        right_cardinality(&token[4..])?;
        Some(Self {
            token: token.to_string(),
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.token
    }

    #[must_use]
    pub fn left(&self) -> Cardinality {
        self.token
            .get(..2)
            .and_then(left_cardinality)
            .unwrap_or(Cardinality::ExactlyOne)
    }

    #[must_use]
    pub fn right(&self) -> Cardinality {
        self.token
            .get(4..)
            .and_then(right_cardinality)
            .unwrap_or(Cardinality::ExactlyOne)
    }

    #[must_use]
    pub fn is_identifying(&self) -> bool {
        self.token.get(2..4) == Some("--")
    }

    #[must_use]
    pub fn kind(&self) -> RelationshipKind {
        match (self.left().is_many(), self.right().is_many()) {
            (false, false) => RelationshipKind::OneToOne,
            (false, true) => RelationshipKind::OneToMany,
            (true, false) => RelationshipKind::ManyToOne,
            (true, true) => RelationshipKind::ManyToMany,
        }
    }
}

fn left_cardinality(raw: &str) -> Option<Cardinality> {
    match raw {
        "|o" => Some(Cardinality::ZeroOrOne),
        "||" => Some(Cardinality::ExactlyOne),
        "}o" => Some(Cardinality::ZeroOrMore),
        "}|" => Some(Cardinality::OneOrMore),
        _ => None,
    }
}

fn right_cardinality(raw: &str) -> Option<Cardinality> {
    match raw {
        "o|" => Some(Cardinality::ZeroOrOne),
        "||" => Some(Cardinality::ExactlyOne),
        "o{" => Some(Cardinality::ZeroOrMore),
        "|{" => Some(Cardinality::OneOrMore),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArrowKind {
    #[default]
    Solid,
    Dotted,
    Thick,
    Open,
    Relationship(ErRelationship),
}

impl ArrowKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Solid => "solid",
            Self::Dotted => "dotted",
            Self::Thick => "thick",
            Self::Open => "open",
            Self::Relationship(_) => "relationship",
        }
    }

    /// Connector text in a flowchart or entity-relationship statement.
    #[must_use]
    pub fn flowchart_token(&self) -> &str {
        match self {
            Self::Solid => "-->",
            Self::Dotted => "-.->",
            Self::Thick => "==>",
            Self::Open => "---",
            Self::Relationship(relationship) => relationship.as_str(),
        }
    }

    /// Connector text in a sequence message. Thick has no sequence form and
    /// is written as solid.
    #[must_use]
    pub const fn sequence_token(&self) -> &'static str {
        match self {
            Self::Dotted => "-->>",
            Self::Open => "->",
            Self::Solid | Self::Thick | Self::Relationship(_) => "->>",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EdgeStyle {
    pub stroke: String,
    pub stroke_width: f64,
    pub stroke_style: StrokeStyle,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LabelStyle {
    pub color: String,
    pub font_weight: String,
}

/// Which half of a sequence message an edge renders.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessagePart {
    Line,
    Label,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SequenceLink {
    pub order: usize,
    pub from_participant: String,
    pub to_participant: String,
    pub part: MessagePart,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub arrow: ArrowKind,
    pub style: EdgeStyle,
    pub label_style: LabelStyle,
    pub label_background: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<SequenceLink>,
}

impl Edge {
    /// An unlabeled edge styled with the given dialect defaults.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        arrow: ArrowKind,
        theme: &DialectTheme,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
            label: None,
            arrow,
            style: theme.edge.clone(),
            label_style: theme.edge_label.clone(),
            label_background: theme.edge_label_background.clone(),
            sequence: None,
        }
    }
}

/// Stable id for the `occurrence`-th edge between the same two endpoints.
#[must_use]
pub fn edge_id(source: &str, target: &str, occurrence: usize) -> String {
    if occurrence == 0 {
        format!("{source}->{target}")
    } else {
        format!("{source}->{target}#{occurrence}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("duplicate node id `{id}`")]
    DuplicateNode { id: String },
    #[error("edge `{edge}` references missing node `{node}`")]
    DanglingEdge { edge: String, node: String },
    #[error("node `{node}` names missing parent `{parent}`")]
    UnknownParent { node: String, parent: String },
    #[error("node `{node}` names parent `{parent}` which is not a group")]
    ParentNotGroup { node: String, parent: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Diagram {
    pub dialect: Dialect,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Diagram {
    #[must_use]
    pub fn empty(dialect: Dialect) -> Self {
        Self {
            dialect,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn find_node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn find_node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|node| node.id == id)
    }

    #[must_use]
    pub fn find_node_index(&self, id: &str) -> Option<usize> {
        self.nodes.iter().position(|node| node.id == id)
    }

    pub fn children_of<'a>(&'a self, group_id: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes
            .iter()
            .filter(move |node| node.parent.as_deref() == Some(group_id))
    }

    /// Canvas position: a child's stored position plus its group's.
    #[must_use]
    pub fn absolute_position(&self, id: &str) -> Option<Point> {
        let node = self.find_node(id)?;
        let offset = node
            .parent
            .as_deref()
            .and_then(|parent| self.find_node(parent))
            .map(|group| group.position)
            .unwrap_or_default();
        Some(Point::new(
            node.position.x + offset.x,
            node.position.y + offset.y,
        ))
    }

    /// Check the structural invariants the emitters rely on.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut by_id: FxHashMap<&str, &Node> = FxHashMap::default();
        for node in &self.nodes {
            if by_id.insert(node.id.as_str(), node).is_some() {
                return Err(GraphError::DuplicateNode {
                    id: node.id.clone(),
                });
            }
        }

        for node in &self.nodes {
            let Some(parent) = node.parent.as_deref() else {
                continue;
            };
            match by_id.get(parent) {
                None => {
                    return Err(GraphError::UnknownParent {
                        node: node.id.clone(),
                        parent: parent.to_string(),
                    });
                }
                Some(group) if !group.shape.is_group() => {
                    return Err(GraphError::ParentNotGroup {
                        node: node.id.clone(),
                        parent: parent.to_string(),
                    });
                }
                Some(_) => {}
            }
        }

        for edge in &self.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !by_id.contains_key(endpoint.as_str()) {
                    return Err(GraphError::DanglingEdge {
                        edge: edge.id.clone(),
                        node: endpoint.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Ids of every group that has at least one child.
    #[must_use]
    pub fn populated_groups(&self) -> FxHashSet<&str> {
        self.nodes
            .iter()
            .filter_map(|node| node.parent.as_deref())
            .collect()
    }
}
