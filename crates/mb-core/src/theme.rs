//! Default visual attributes per dialect.
//!
//! Every node and edge is created with a copy of these values, and the
//! metadata codec and emitters compare against the same struct to decide
//! whether an attribute was customized.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Dialect, EdgeStyle, LabelStyle, NodeKind, NodeStyle, StrokeStyle};

#[derive(Debug, Error)]
pub enum ThemeError {
    #[error("unknown theme preset: {0}")]
    UnknownPreset(String),
    #[error("invalid theme JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DialectTheme {
    pub node: NodeStyle,
    pub group: NodeStyle,
    pub group_label_background: String,
    pub edge: EdgeStyle,
    pub edge_label: LabelStyle,
    pub edge_label_background: String,
}

impl Default for DialectTheme {
    fn default() -> Self {
        Self::light("#ffffff", "#1e293b")
    }
}

impl DialectTheme {
    fn light(fill: &str, stroke: &str) -> Self {
        Self {
            node: NodeStyle {
                fill: fill.into(),
                stroke: stroke.into(),
                stroke_style: StrokeStyle::Solid,
                stroke_width: 2.0,
                text_color: "#0f172a".into(),
            },
            group: NodeStyle {
                fill: "#f8fafc".into(),
                stroke: "#94a3b8".into(),
                stroke_style: StrokeStyle::Dashed,
                stroke_width: 1.0,
                text_color: "#334155".into(),
            },
            group_label_background: "#e2e8f0".into(),
            edge: EdgeStyle {
                stroke: "#475569".into(),
                stroke_width: 2.0,
                stroke_style: StrokeStyle::Solid,
            },
            edge_label: LabelStyle {
                color: "#0f172a".into(),
                font_weight: "normal".into(),
            },
            edge_label_background: "#ffffff".into(),
        }
    }

    fn dark(fill: &str, stroke: &str) -> Self {
        Self {
            node: NodeStyle {
                fill: fill.into(),
                stroke: stroke.into(),
                stroke_style: StrokeStyle::Solid,
                stroke_width: 2.0,
                text_color: "#f1f5f9".into(),
            },
            group: NodeStyle {
                fill: "#0f172a".into(),
                stroke: "#475569".into(),
                stroke_style: StrokeStyle::Dashed,
                stroke_width: 1.0,
                text_color: "#cbd5e1".into(),
            },
            group_label_background: "#1e293b".into(),
            edge: EdgeStyle {
                stroke: "#94a3b8".into(),
                stroke_width: 2.0,
                stroke_style: StrokeStyle::Solid,
            },
            edge_label: LabelStyle {
                color: "#e2e8f0".into(),
                font_weight: "normal".into(),
            },
            edge_label_background: "#1e293b".into(),
        }
    }

    /// Default style for a node of `kind`. Groups have their own palette;
    /// everything else shares the node palette.
    #[must_use]
    pub const fn node_style(&self, kind: NodeKind) -> &NodeStyle {
        match kind {
            NodeKind::Group => &self.group,
            _ => &self.node,
        }
    }

    /// Lifeline segments use the edge stroke, dashed at width 1.
    #[must_use]
    pub fn lifeline_edge(&self) -> EdgeStyle {
        EdgeStyle {
            stroke_width: 1.0,
            stroke_style: StrokeStyle::Dashed,
            ..self.edge.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Theme {
    pub flowchart: DialectTheme,
    pub er: DialectTheme,
    pub sequence: DialectTheme,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            flowchart: DialectTheme::light("#ffffff", "#1e293b"),
            er: DialectTheme::light("#f1f5f9", "#334155"),
            sequence: DialectTheme::light("#eef2ff", "#4f46e5"),
        }
    }
}

impl Theme {
    #[must_use]
    pub fn dark() -> Self {
        Self {
            flowchart: DialectTheme::dark("#1e293b", "#64748b"),
            er: DialectTheme::dark("#1f2937", "#6b7280"),
            sequence: DialectTheme::dark("#312e81", "#818cf8"),
        }
    }

    /// Built-in preset by name (`default`, `light`, `dark`).
    pub fn preset(name: &str) -> Result<Self, ThemeError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "default" | "light" => Ok(Self::default()),
            "dark" => Ok(Self::dark()),
            _ => Err(ThemeError::UnknownPreset(name.to_string())),
        }
    }

    /// Decode a theme document. Missing fields fall back to the default
    /// palette.
    pub fn from_json(input: &str) -> Result<Self, ThemeError> {
        Ok(serde_json::from_str(input)?)
    }

    #[must_use]
    pub const fn dialect(&self, dialect: Dialect) -> &DialectTheme {
        match dialect {
            Dialect::Flowchart => &self.flowchart,
            Dialect::EntityRelationship => &self.er,
            Dialect::Sequence => &self.sequence,
        }
    }
}
