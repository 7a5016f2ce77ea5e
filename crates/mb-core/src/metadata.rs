//! Side-channel codec for attributes the diagram grammar cannot carry.
//!
//! Three comment lines may trail a diagram:
//!
//! ```text
//! %% layout: {"version":1,"entries":{"A":{"x":10.0,"y":20.0}}}
//! %% styles: {"version":1,"entries":{"A":{"fill":"#ff0000"}}}
//! %% edges: {"version":1,"entries":[{"source":"A","target":"B","sourceHandle":"right"}]}
//! ```
//!
//! A payload without the `version`/`entries` envelope is read as version 0
//! with the same entry schema. Decoding never fails: a malformed payload drops
//! its tag, a malformed entry drops that entry.

use std::collections::{BTreeMap, VecDeque};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    Diagram, Dialect, DialectTheme, Edge, EdgeStyle, GroupShape, Node, NodeImage, NodeKind,
    NodeShape, Size, StrokeStyle, Theme,
};

/// Envelope version written by [`encode`].
pub const METADATA_VERSION: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataTag {
    Layout,
    Styles,
    Edges,
}

impl MetadataTag {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Layout => "layout",
            Self::Styles => "styles",
            Self::Edges => "edges",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "layout" => Some(Self::Layout),
            "styles" => Some(Self::Styles),
            "edges" => Some(Self::Edges),
            _ => None,
        }
    }
}

/// Split a `%% <tag>: <payload>` line. Ordinary comments return `None`.
#[must_use]
pub fn parse_line(line: &str) -> Option<(MetadataTag, &str)> {
    let rest = line.trim().strip_prefix("%%")?;
    let (tag, payload) = rest.split_once(':')?;
    let tag = MetadataTag::parse(tag)?;
    Some((tag, payload.trim()))
}

#[must_use]
pub fn is_metadata_line(line: &str) -> bool {
    parse_line(line).is_some()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SavedPosition {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

impl SavedPosition {
    #[must_use]
    pub fn of(node: &Node) -> Self {
        Self {
            x: node.position.x,
            y: node.position.y,
            width: node.size.map(|size| size.width),
            height: node.size.map(|size| size.height),
        }
    }

    /// Both dimensions, when both were saved.
    #[must_use]
    pub fn size(&self) -> Option<Size> {
        Some(Size::new(self.width?, self.height?))
    }
}

/// Node attributes that differ from the dialect palette.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct StyleOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke_style: Option<StrokeStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<NodeImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_background: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_shape: Option<GroupShape>,
}

impl StyleOverride {
    #[must_use]
    pub fn for_node(node: &Node, palette: &DialectTheme) -> Self {
        let defaults = palette.node_style(node.kind());
        let style = &node.style;
        let mut overrides = Self {
            fill: differs(&style.fill, &defaults.fill),
            stroke: differs(&style.stroke, &defaults.stroke),
            stroke_style: differs(&style.stroke_style, &defaults.stroke_style),
            stroke_width: differs(&style.stroke_width, &defaults.stroke_width),
            text_color: differs(&style.text_color, &defaults.text_color),
            image: node.image.clone(),
            ..Self::default()
        };
        if let NodeShape::Group {
            variant,
            label_background,
        } = &node.shape
        {
            overrides.group_shape = differs(variant, &GroupShape::Rectangle);
            overrides.label_background = label_background
                .as_ref()
                .and_then(|background| differs(background, &palette.group_label_background));
        }
        overrides
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, node: &mut Node) {
        let style = &mut node.style;
        if let Some(fill) = &self.fill {
            style.fill.clone_from(fill);
        }
        if let Some(stroke) = &self.stroke {
            style.stroke.clone_from(stroke);
        }
        if let Some(stroke_style) = self.stroke_style {
            style.stroke_style = stroke_style;
        }
        if let Some(stroke_width) = self.stroke_width {
            style.stroke_width = stroke_width;
        }
        if let Some(text_color) = &self.text_color {
            style.text_color.clone_from(text_color);
        }
        if self.image.is_some() {
            node.image.clone_from(&self.image);
        }
        if let NodeShape::Group {
            variant,
            label_background,
        } = &mut node.shape
        {
            if let Some(shape) = self.group_shape {
                *variant = shape;
            }
            if self.label_background.is_some() {
                label_background.clone_from(&self.label_background);
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct EdgeStyleOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke_style: Option<StrokeStyle>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LabelStyleOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_weight: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct LabelBackgroundOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
}

/// Per-edge extras, matched back to parsed edges by `(source, target)` in
/// statement order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EdgeExtra {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<EdgeStyleOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_style: Option<LabelStyleOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_bg_style: Option<LabelBackgroundOverride>,
}

impl EdgeExtra {
    #[must_use]
    pub fn for_edge(edge: &Edge, palette: &DialectTheme) -> Self {
        Self::against(edge, &palette.edge, palette)
    }

    /// Like [`EdgeExtra::for_edge`], with `defaults` as the stroke baseline.
    #[must_use]
    pub fn against(edge: &Edge, defaults: &EdgeStyle, palette: &DialectTheme) -> Self {
        let style = EdgeStyleOverride {
            stroke: differs(&edge.style.stroke, &defaults.stroke),
            stroke_width: differs(&edge.style.stroke_width, &defaults.stroke_width),
            stroke_style: differs(&edge.style.stroke_style, &defaults.stroke_style),
        };
        let label_style = LabelStyleOverride {
            color: differs(&edge.label_style.color, &palette.edge_label.color),
            font_weight: differs(
                &edge.label_style.font_weight,
                &palette.edge_label.font_weight,
            ),
        };
        let label_bg_style = LabelBackgroundOverride {
            fill: differs(&edge.label_background, &palette.edge_label_background),
        };
        Self {
            source: edge.source.clone(),
            target: edge.target.clone(),
            source_handle: edge.source_handle.clone(),
            target_handle: edge.target_handle.clone(),
            style: (style != EdgeStyleOverride::default()).then_some(style),
            label_style: (label_style != LabelStyleOverride::default()).then_some(label_style),
            label_bg_style: (label_bg_style != LabelBackgroundOverride::default())
                .then_some(label_bg_style),
        }
    }

    /// True when the entry carries anything beyond its endpoints.
    #[must_use]
    pub fn is_customized(&self) -> bool {
        self.source_handle.is_some()
            || self.target_handle.is_some()
            || self.style.is_some()
            || self.label_style.is_some()
            || self.label_bg_style.is_some()
    }

    pub fn apply(&self, edge: &mut Edge) {
        if self.source_handle.is_some() {
            edge.source_handle.clone_from(&self.source_handle);
        }
        if self.target_handle.is_some() {
            edge.target_handle.clone_from(&self.target_handle);
        }
        if let Some(style) = &self.style {
            if let Some(stroke) = &style.stroke {
                edge.style.stroke.clone_from(stroke);
            }
            if let Some(width) = style.stroke_width {
                edge.style.stroke_width = width;
            }
            if let Some(stroke_style) = style.stroke_style {
                edge.style.stroke_style = stroke_style;
            }
        }
        if let Some(label_style) = &self.label_style {
            if let Some(color) = &label_style.color {
                edge.label_style.color.clone_from(color);
            }
            if let Some(weight) = &label_style.font_weight {
                edge.label_style.font_weight.clone_from(weight);
            }
        }
        if let Some(fill) = self.label_bg_style.as_ref().and_then(|bg| bg.fill.as_ref()) {
            edge.label_background.clone_from(fill);
        }
    }
}

/// Everything recovered from the metadata lines of one diagram.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SideChannel {
    pub positions: BTreeMap<String, SavedPosition>,
    pub styles: BTreeMap<String, StyleOverride>,
    pub edges: Vec<EdgeExtra>,
}

impl SideChannel {
    /// Decode every metadata line in `lines`, ignoring all other lines.
    #[must_use]
    pub fn decode<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        let mut channel = Self::default();
        for line in lines {
            let Some((tag, payload)) = parse_line(line) else {
                continue;
            };
            let Some(entries) = unwrap_envelope(tag, payload) else {
                continue;
            };
            match tag {
                MetadataTag::Layout => channel.positions.extend(decode_map(tag, entries)),
                MetadataTag::Styles => channel.styles.extend(decode_map(tag, entries)),
                MetadataTag::Edges => channel.edges.extend(decode_list(tag, entries)),
            }
        }
        channel
    }

    #[must_use]
    pub fn from_text(input: &str) -> Self {
        Self::decode(input.lines())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() && self.styles.is_empty() && self.edges.is_empty()
    }

    #[must_use]
    pub fn edge_queue(&self) -> EdgeExtraQueue {
        let mut by_endpoints: BTreeMap<(String, String), VecDeque<EdgeExtra>> = BTreeMap::new();
        for extra in &self.edges {
            by_endpoints
                .entry((extra.source.clone(), extra.target.clone()))
                .or_default()
                .push_back(extra.clone());
        }
        EdgeExtraQueue { by_endpoints }
    }
}

/// First-in first-out matching of edge extras to parsed edges.
#[derive(Debug, Clone, Default)]
pub struct EdgeExtraQueue {
    by_endpoints: BTreeMap<(String, String), VecDeque<EdgeExtra>>,
}

impl EdgeExtraQueue {
    pub fn take(&mut self, source: &str, target: &str) -> Option<EdgeExtra> {
        self.by_endpoints
            .get_mut(&(source.to_string(), target.to_string()))?
            .pop_front()
    }
}

/// Render the metadata lines for `diagram`. Flowchart and entity diagrams
/// always carry `layout`; `styles` and `edges` appear only when something
/// deviates from the theme. Sequence lifelines are compared with
/// [`DialectTheme::lifeline_edge`].
#[must_use]
pub fn encode(diagram: &Diagram, theme: &Theme) -> Vec<String> {
    let palette = theme.dialect(diagram.dialect);
    let mut lines = Vec::new();
    let visible = || {
        diagram
            .nodes
            .iter()
            .filter(|node| node.kind() != NodeKind::Anchor)
    };

    if diagram.dialect != Dialect::Sequence {
        let positions: BTreeMap<&str, SavedPosition> = visible()
            .map(|node| (node.id.as_str(), SavedPosition::of(node)))
            .collect();
        if !positions.is_empty() {
            push_line(&mut lines, MetadataTag::Layout, &positions);
        }
    }

    let styles: BTreeMap<&str, StyleOverride> = visible()
        .map(|node| (node.id.as_str(), StyleOverride::for_node(node, palette)))
        .filter(|(_, overrides)| !overrides.is_empty())
        .collect();
    if !styles.is_empty() {
        push_line(&mut lines, MetadataTag::Styles, &styles);
    }

    // Sequence edges without a message link are lifelines.
    let lifeline = palette.lifeline_edge();
    let extras: Vec<EdgeExtra> = diagram
        .edges
        .iter()
        .map(|edge| {
            if diagram.dialect == Dialect::Sequence && edge.sequence.is_none() {
                EdgeExtra::against(edge, &lifeline, palette)
            } else {
                EdgeExtra::for_edge(edge, palette)
            }
        })
        .collect();
    if extras.iter().any(EdgeExtra::is_customized) {
        push_line(&mut lines, MetadataTag::Edges, &extras);
    }

    lines
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    version: u64,
    entries: &'a T,
}

fn push_line<T: Serialize>(lines: &mut Vec<String>, tag: MetadataTag, entries: &T) {
    let envelope = Envelope {
        version: METADATA_VERSION,
        entries,
    };
    match serde_json::to_string(&envelope) {
        Ok(json) => lines.push(format!("%% {}: {json}", tag.as_str())),
        Err(err) => debug!(tag = tag.as_str(), %err, "skipping unencodable metadata"),
    }
}

fn unwrap_envelope(tag: MetadataTag, payload: &str) -> Option<Value> {
    let value: Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(err) => {
            debug!(tag = tag.as_str(), %err, "dropping malformed metadata payload");
            return None;
        }
    };

    let Value::Object(mut object) = value else {
        return Some(value);
    };
    if !(object.len() == 2 && object.contains_key("version") && object.contains_key("entries")) {
        return Some(Value::Object(object));
    }

    let version = object.get("version").and_then(Value::as_u64).unwrap_or(0);
    if version > METADATA_VERSION {
        warn!(
            tag = tag.as_str(),
            version, "metadata written by a newer version; reading best effort"
        );
    }
    object.remove("entries")
}

fn decode_map<T: DeserializeOwned>(tag: MetadataTag, entries: Value) -> BTreeMap<String, T> {
    let Value::Object(object) = entries else {
        debug!(tag = tag.as_str(), "metadata entries are not an object");
        return BTreeMap::new();
    };
    object
        .into_iter()
        .filter_map(|(key, value)| match serde_json::from_value(value) {
            Ok(entry) => Some((key, entry)),
            Err(err) => {
                debug!(tag = tag.as_str(), key = %key, %err, "dropping malformed metadata entry");
                None
            }
        })
        .collect()
}

fn decode_list<T: DeserializeOwned>(tag: MetadataTag, entries: Value) -> Vec<T> {
    let Value::Array(items) = entries else {
        debug!(tag = tag.as_str(), "metadata entries are not an array");
        return Vec::new();
    };
    items
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(entry) => Some(entry),
            Err(err) => {
                debug!(tag = tag.as_str(), %err, "dropping malformed metadata entry");
                None
            }
        })
        .collect()
}

fn differs<T: PartialEq + Clone>(value: &T, default: &T) -> Option<T> {
    (value != default).then(|| value.clone())
}
