#![forbid(unsafe_code)]

mod builder;
mod er;
mod flowchart;
mod sequence;
mod text;

use mb_core::metadata::SideChannel;
use mb_core::{Diagram, Dialect, Point, SequenceScript, Theme};
use mb_layout::{LayoutConfig, SequenceLayoutConfig, layout_diagram, layout_sequence};
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::text::{first_word, levenshtein, significant_lines};

/// Output of [`parse`]: always a graph, plus whatever went wrong on the way.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseResult {
    pub diagram: Diagram,
    /// Line diagnostics, `Line N: ...` where a line is known.
    pub warnings: Vec<String>,
    pub detection: Detection,
    /// Whether saved positions were trusted or a layout pass ran.
    pub layout: LayoutOutcome,
}

/// How the dialect was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// An `erDiagram` or `sequenceDiagram` line.
    Marker,
    /// A `flowchart`/`graph` header line.
    Header,
    /// No header at all; read as a flowchart.
    Fallback,
    /// Nothing but blank lines and comments.
    EmptyInput,
}

impl DetectionMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Marker => "dialect marker",
            Self::Header => "flowchart header",
            Self::Fallback => "fallback to flowchart",
            Self::EmptyInput => "empty input",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Detection {
    pub dialect: Dialect,
    pub method: DetectionMethod,
    /// 1-based line of the marker or header.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub warnings: Vec<String>,
}

/// Which placement strategy produced the node positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LayoutOutcome {
    /// No nodes to place.
    Empty,
    /// Saved positions covered at least half of the nodes; the rest were parked.
    Restored { saved: usize, parked: usize },
    /// The layered layout ran over the whole graph.
    Layered {
        ranks: usize,
        crossings: usize,
        reversed_edges: usize,
    },
    /// Sequence diagrams are always laid out from their message script.
    Lifelines { participants: usize, messages: usize },
}

/// Keywords checked for near-miss spellings when no header matched.
const DIALECT_KEYWORDS: &[(&str, Dialect)] = &[
    ("erdiagram", Dialect::EntityRelationship),
    ("sequencediagram", Dialect::Sequence),
    ("flowchart", Dialect::Flowchart),
    ("graph", Dialect::Flowchart),
];

/// Pick the dialect for `input`.
///
/// Any `erDiagram` line wins; otherwise any `sequenceDiagram` line;
/// otherwise the text is a flowchart. Marker words compare case-insensitively.
#[must_use]
pub fn detect(input: &str) -> Detection {
    let mut er_line = None;
    let mut sequence_line = None;
    let mut first = None;
    for (line_number, line) in significant_lines(input) {
        let word = first_word(line);
        first.get_or_insert((line_number, line));
        if er_line.is_none() && word.eq_ignore_ascii_case("erdiagram") {
            er_line = Some(line_number);
        } else if sequence_line.is_none() && word.eq_ignore_ascii_case("sequencediagram") {
            sequence_line = Some(line_number);
        }
    }

    if let Some(line) = er_line {
        return marker(Dialect::EntityRelationship, line);
    }
    if let Some(line) = sequence_line {
        return marker(Dialect::Sequence, line);
    }

    let Some((line_number, line)) = first else {
        return Detection {
            dialect: Dialect::Flowchart,
            method: DetectionMethod::EmptyInput,
            line: None,
            warnings: Vec::new(),
        };
    };
    if flowchart::is_header(line) {
        return Detection {
            dialect: Dialect::Flowchart,
            method: DetectionMethod::Header,
            line: Some(line_number),
            warnings: Vec::new(),
        };
    }

    // Only header-shaped lines (a keyword and maybe a direction) get a hint.
    let word = first_word(line);
    let lower = word.to_lowercase();
    let header_shaped = line.split_whitespace().count() <= 2;
    let hint = DIALECT_KEYWORDS
        .iter()
        .filter(|_| header_shaped)
        .map(|(keyword, dialect)| (levenshtein(&lower, keyword), *keyword, *dialect))
        .filter(|(distance, _, _)| (1..=2).contains(distance))
        .min_by_key(|(distance, _, _)| *distance);
    let warnings = hint
        .map(|(_, keyword, dialect)| {
            format!(
                "Line {line_number}: `{word}` looks like a misspelled `{keyword}` header ({}); reading as flowchart",
                dialect.as_str()
            )
        })
        .into_iter()
        .collect();

    Detection {
        dialect: Dialect::Flowchart,
        method: DetectionMethod::Fallback,
        line: None,
        warnings,
    }
}

fn marker(dialect: Dialect, line: usize) -> Detection {
    Detection {
        dialect,
        method: DetectionMethod::Marker,
        line: Some(line),
        warnings: Vec::new(),
    }
}

/// Parse with the built-in theme.
#[must_use]
pub fn parse(input: &str) -> ParseResult {
    parse_with_theme(input, &Theme::default())
}

/// Parse `input` into a graph. Never fails: unreadable statements become
/// warnings and the graph holds whatever could be recovered.
#[must_use]
pub fn parse_with_theme(input: &str, theme: &Theme) -> ParseResult {
    let detection = detect(input);
    let channel = SideChannel::from_text(input);
    let palette = theme.dialect(detection.dialect);
    let layout_config = LayoutConfig::default();

    let (diagram, dialect_warnings, layout) = match detection.dialect {
        Dialect::Flowchart => {
            let (mut diagram, warnings) = flowchart::parse(input, palette, &channel);
            let layout = builder::place_nodes(&mut diagram, &channel, &layout_config);
            (diagram, warnings, layout)
        }
        Dialect::EntityRelationship => {
            let (mut diagram, warnings) = er::parse(input, palette, &channel);
            let layout = builder::place_nodes(&mut diagram, &channel, &layout_config);
            (diagram, warnings, layout)
        }
        Dialect::Sequence => sequence::parse(input, palette, &channel),
    };

    let mut warnings = detection.warnings.clone();
    warnings.extend(dialect_warnings);
    debug!(
        dialect = detection.dialect.as_str(),
        method = detection.method.as_str(),
        nodes = diagram.nodes.len(),
        edges = diagram.edges.len(),
        warnings = warnings.len(),
        "parsed diagram"
    );

    ParseResult {
        diagram,
        warnings,
        detection,
        layout,
    }
}

/// Throw away every position and lay the graph out again.
pub fn relayout(diagram: &mut Diagram, theme: &Theme) -> LayoutOutcome {
    if diagram.dialect == Dialect::Sequence {
        let script = SequenceScript::from_diagram(diagram);
        let layout = layout_sequence(
            &script,
            &SequenceLayoutConfig::default(),
            theme.dialect(Dialect::Sequence),
        );
        let outcome = LayoutOutcome::Lifelines {
            participants: layout.stats.participants,
            messages: layout.stats.messages,
        };
        diagram.nodes = layout.nodes;
        diagram.edges = layout.edges;
        return outcome;
    }

    if diagram.nodes.is_empty() {
        return LayoutOutcome::Empty;
    }
    for node in &mut diagram.nodes {
        node.position = Point::default();
    }
    let stats = layout_diagram(diagram, &LayoutConfig::default());
    LayoutOutcome::Layered {
        ranks: stats.rank_count,
        crossings: stats.crossing_count,
        reversed_edges: stats.reversed_edges,
    }
}

/// Compact machine-readable summary of a parse.
#[must_use]
pub fn summary_json(parsed: &ParseResult) -> String {
    json!({
        "dialect": parsed.diagram.dialect.as_str(),
        "detection": parsed.detection.method.as_str(),
        "node_count": parsed.diagram.nodes.len(),
        "edge_count": parsed.diagram.edges.len(),
        "group_count": parsed.diagram.nodes.iter().filter(|node| node.shape.is_group()).count(),
        "warning_count": parsed.warnings.len(),
        "warnings": parsed.warnings.clone(),
        "layout": parsed.layout,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::{DetectionMethod, LayoutOutcome, detect, parse, relayout, summary_json};
    use mb_core::{Dialect, NodeKind, Theme};
    use proptest::prelude::*;

    #[test]
    fn markers_pick_the_dialect() {
        let er = detect("%% note\nerDiagram\nA ||--o{ B : has");
        assert_eq!(er.dialect, Dialect::EntityRelationship);
        assert_eq!(er.method, DetectionMethod::Marker);
        assert_eq!(er.line, Some(2));

        let sequence = detect("SEQUENCEDIAGRAM\nA->>B: hi");
        assert_eq!(sequence.dialect, Dialect::Sequence);

        // erDiagram wins wherever it appears.
        let both = detect("sequenceDiagram\nerDiagram");
        assert_eq!(both.dialect, Dialect::EntityRelationship);
    }

    #[test]
    fn flowchart_headers_and_fallback() {
        let header = detect("graph LR\nA --> B");
        assert_eq!(header.dialect, Dialect::Flowchart);
        assert_eq!(header.method, DetectionMethod::Header);

        let fallback = detect("A --> B");
        assert_eq!(fallback.method, DetectionMethod::Fallback);
        assert!(fallback.warnings.is_empty());

        let empty = detect("  \n%% only a comment\n");
        assert_eq!(empty.dialect, Dialect::Flowchart);
        assert_eq!(empty.method, DetectionMethod::EmptyInput);
    }

    #[test]
    fn misspelled_header_warns_but_stays_flowchart() {
        let detection = detect("erDiagarm\nA --> B");
        assert_eq!(detection.dialect, Dialect::Flowchart);
        assert_eq!(detection.method, DetectionMethod::Fallback);
        assert_eq!(detection.warnings.len(), 1);
        assert!(detection.warnings[0].starts_with("Line 1: `erDiagarm`"));
    }

    #[test]
    fn empty_input_is_an_empty_flowchart() {
        let parsed = parse("");
        assert_eq!(parsed.diagram.dialect, Dialect::Flowchart);
        assert!(parsed.diagram.nodes.is_empty());
        assert!(parsed.warnings.is_empty());
        assert_eq!(parsed.layout, LayoutOutcome::Empty);
    }

    #[test]
    fn two_node_flowchart_is_laid_out_top_down() {
        let parsed = parse("flowchart TD\nA[Start] --> B[End]");
        assert!(parsed.warnings.is_empty(), "{:?}", parsed.warnings);
        assert!(matches!(parsed.layout, LayoutOutcome::Layered { ranks: 2, .. }));
        let a = parsed.diagram.find_node("A").expect("A");
        let b = parsed.diagram.find_node("B").expect("B");
        assert_eq!(a.label, "Start");
        assert!(b.position.y > a.position.y);
    }

    #[test]
    fn saved_positions_are_trusted_by_the_half_rule() {
        let input = "flowchart TD\nA --> B\nB --> C\n%% layout: {\"version\":1,\"entries\":{\"A\":{\"x\":10.0,\"y\":20.0},\"B\":{\"x\":300.0,\"y\":20.0}}}";
        let parsed = parse(input);
        assert_eq!(parsed.layout, LayoutOutcome::Restored { saved: 2, parked: 1 });
        let a = parsed.diagram.find_node("A").expect("A");
        assert_eq!((a.position.x, a.position.y), (10.0, 20.0));
        let c = parsed.diagram.find_node("C").expect("C");
        assert!(c.position.y > 20.0, "parked below the saved row");
        assert_eq!(c.position.x, 10.0);
    }

    #[test]
    fn a_minority_of_saved_positions_is_ignored() {
        let input = "flowchart TD\nA --> B\nB --> C\n%% layout: {\"A\":{\"x\":999.0,\"y\":999.0}}";
        let parsed = parse(input);
        assert!(matches!(parsed.layout, LayoutOutcome::Layered { .. }));
        let a = parsed.diagram.find_node("A").expect("A");
        assert_ne!(a.position.x, 999.0);
    }

    #[test]
    fn style_directives_win_over_saved_styles() {
        let input = "flowchart TD\nA\nstyle A fill:#00ff00\n%% styles: {\"A\":{\"fill\":\"#ff0000\",\"stroke\":\"#0000ff\"}}";
        let parsed = parse(input);
        let a = parsed.diagram.find_node("A").expect("A");
        assert_eq!(a.style.fill, "#00ff00");
        assert_eq!(a.style.stroke, "#0000ff");
    }

    #[test]
    fn relayout_is_idempotent() {
        let mut parsed = parse("flowchart TD\nA --> B\nA --> C\nB --> D\nC --> D");
        let theme = Theme::default();
        relayout(&mut parsed.diagram, &theme);
        let first = parsed.diagram.clone();
        relayout(&mut parsed.diagram, &theme);
        assert_eq!(parsed.diagram, first);
    }

    #[test]
    fn relayout_rebuilds_sequence_anchors() {
        let mut parsed = parse("sequenceDiagram\nA->>B: one\nB->>A: two");
        let before = parsed.diagram.clone();
        let outcome = relayout(&mut parsed.diagram, &Theme::default());
        assert_eq!(
            outcome,
            LayoutOutcome::Lifelines {
                participants: 2,
                messages: 2
            }
        );
        assert_eq!(parsed.diagram, before);
        assert!(
            parsed
                .diagram
                .nodes
                .iter()
                .any(|node| node.kind() == NodeKind::Anchor)
        );
    }

    #[test]
    fn summary_reports_counts() {
        let parsed = parse("graph TD\nA --> B\nwhat is this");
        let summary: serde_json::Value =
            serde_json::from_str(&summary_json(&parsed)).expect("json");
        assert_eq!(summary["dialect"], "flowchart");
        assert_eq!(summary["node_count"], 2);
        assert_eq!(summary["warning_count"], 1);
        assert_eq!(summary["layout"]["mode"], "layered");
    }

    proptest! {
        #[test]
        fn prop_parse_is_total(input in "\\PC{0,200}") {
            let parsed = parse(&input);
            prop_assert!(parsed.diagram.validate().is_ok());
        }

        #[test]
        fn prop_parse_is_total_on_diagram_like_text(
            lines in prop::collection::vec(
                prop_oneof![
                    Just("graph TD".to_string()),
                    Just("subgraph G".to_string()),
                    Just("end".to_string()),
                    Just("erDiagram".to_string()),
                    Just("sequenceDiagram".to_string()),
                    "[A-D]{1,2} (-->|---|==>|-.->|->>|-->>|\\|\\|--o\\{) [A-D]{1,2}( : [a-z]{0,6})?",
                    "[A-D]\\[[a-z ]{0,5}\\]",
                    "style [A-D] fill:#[0-9a-f]{6}",
                    "%% (layout|styles|edges): [{}\\[\\]\"a-z:0-9,]{0,30}",
                ],
                0..16,
            )
        ) {
            let parsed = parse(&lines.join("\n"));
            prop_assert!(parsed.diagram.validate().is_ok());
        }
    }
}
