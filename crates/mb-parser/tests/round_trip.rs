//! Text to graph to text to graph.
//!
//! Emitted text carries every position in its metadata, so the second parse
//! must restore the first graph without running the layout again.

use mb_core::{ArrowKind, Diagram, MessagePart, NodeKind, NodeShape};
use mb_emit::emit;
use mb_parser::{LayoutOutcome, parse};
use proptest::prelude::*;

fn reparse(diagram: &Diagram) -> mb_parser::ParseResult {
    let text = emit(diagram).expect("parsed graphs are valid");
    let reparsed = parse(&text);
    assert!(
        reparsed.warnings.is_empty(),
        "warnings {:?} for emitted text:\n{text}",
        reparsed.warnings
    );
    reparsed
}

/// Same nodes and edges by id, regardless of declaration order.
fn assert_isomorphic(left: &Diagram, right: &Diagram) {
    assert_eq!(left.dialect, right.dialect);
    assert_eq!(left.nodes.len(), right.nodes.len());
    assert_eq!(left.edges.len(), right.edges.len());
    for node in &left.nodes {
        let other = right
            .find_node(&node.id)
            .unwrap_or_else(|| panic!("node {} lost", node.id));
        assert_eq!(node, other);
    }
    for edge in &left.edges {
        let other = right
            .edges
            .iter()
            .find(|candidate| candidate.id == edge.id)
            .unwrap_or_else(|| panic!("edge {} lost", edge.id));
        assert_eq!(edge, other);
    }
}

#[test]
fn three_node_flowchart_survives_a_round_trip() {
    let parsed = parse("graph TD\n A[Start] --> B{Check}\n B -->|Yes| C[Done]");
    assert!(parsed.warnings.is_empty(), "{:?}", parsed.warnings);

    let diagram = &parsed.diagram;
    let shapes: Vec<(&str, &NodeShape, &str)> = diagram
        .nodes
        .iter()
        .map(|node| (node.id.as_str(), &node.shape, node.label.as_str()))
        .collect();
    assert_eq!(
        shapes,
        vec![
            ("A", &NodeShape::Rectangle, "Start"),
            ("B", &NodeShape::Diamond, "Check"),
            ("C", &NodeShape::Rectangle, "Done"),
        ]
    );
    assert_eq!(diagram.edges.len(), 2);
    assert_eq!(
        (diagram.edges[0].source.as_str(), diagram.edges[0].target.as_str()),
        ("A", "B")
    );
    assert_eq!(diagram.edges[0].label, None);
    assert_eq!(diagram.edges[1].label.as_deref(), Some("Yes"));

    let reparsed = reparse(diagram);
    assert_eq!(
        reparsed.layout,
        LayoutOutcome::Restored {
            saved: 3,
            parked: 0
        }
    );
    assert_eq!(&reparsed.diagram, diagram);
}

#[test]
fn grouped_child_is_laid_out_inside_its_group() {
    let parsed = parse("graph TD\nsubgraph G [Group]\n A[X]\nend\nA --> B[Y]");
    assert!(parsed.warnings.is_empty(), "{:?}", parsed.warnings);
    let diagram = &parsed.diagram;

    let group = diagram.find_node("G").expect("G");
    let a = diagram.find_node("A").expect("A");
    let b = diagram.find_node("B").expect("B");
    assert!(group.shape.is_group());
    assert_eq!(group.label, "Group");
    assert_eq!(a.parent.as_deref(), Some("G"));
    assert_eq!(b.parent, None);

    // A is stored relative to G; G's size is its laid-out box.
    let size = group.size.expect("populated groups are sized");
    assert!(a.position.x > 0.0 && a.position.y > 0.0);
    assert!(a.position.x + 150.0 < size.width);
    assert!(a.position.y + 50.0 < size.height);
    let absolute = diagram.absolute_position("A").expect("A");
    assert!(absolute.x > group.position.x && absolute.y > group.position.y);

    let reparsed = reparse(diagram);
    assert_eq!(&reparsed.diagram, diagram);
}

#[test]
fn sequence_exchange_orders_messages_and_lifelines() {
    let parsed =
        parse("sequenceDiagram\n participant A\n participant B\n A->>B: Hello\n B->>A: Hi");
    assert!(parsed.warnings.is_empty(), "{:?}", parsed.warnings);
    let diagram = &parsed.diagram;

    let participants: Vec<&str> = diagram
        .nodes
        .iter()
        .filter(|node| node.kind() != NodeKind::Anchor)
        .map(|node| node.id.as_str())
        .collect();
    assert_eq!(participants, vec!["A", "B"]);

    for order in [0, 1] {
        let parts: Vec<MessagePart> = diagram
            .edges
            .iter()
            .filter_map(|edge| edge.sequence.as_ref())
            .filter(|link| link.order == order)
            .map(|link| link.part)
            .collect();
        assert_eq!(parts, vec![MessagePart::Line, MessagePart::Label], "order {order}");
    }

    let segment_bottom = |id: &str| {
        let edge = diagram
            .edges
            .iter()
            .find(|edge| edge.id == id)
            .unwrap_or_else(|| panic!("missing {id}"));
        diagram.find_node(&edge.target).expect("target").position.y
    };
    assert!(segment_bottom("lifeline:A:1") > segment_bottom("lifeline:A:0"));

    let reparsed = reparse(diagram);
    assert_eq!(&reparsed.diagram, diagram);
}

#[test]
fn entity_diagram_keeps_attributes_and_relationships() {
    let parsed = parse(
        "erDiagram\n ORDER ||--|{ LINE-ITEM : contains\n CUSTOMER ||--o{ ORDER : places\n CUSTOMER {\n  string name\n  string id PK \"primary\"\n }",
    );
    assert!(parsed.warnings.is_empty(), "{:?}", parsed.warnings);
    let reparsed = reparse(&parsed.diagram);
    assert_isomorphic(&parsed.diagram, &reparsed.diagram);

    let places = reparsed
        .diagram
        .edges
        .iter()
        .find(|edge| edge.source == "CUSTOMER")
        .expect("places");
    assert!(matches!(&places.arrow, ArrowKind::Relationship(token) if token.as_str() == "||--o{"));
}

#[test]
fn customized_attributes_ride_the_metadata() {
    let input = "flowchart LR\nA --> B\nstyle A fill:#ff0000,stroke-width:3px\n%% edges: {\"version\":1,\"entries\":[{\"source\":\"A\",\"target\":\"B\",\"sourceHandle\":\"right\",\"style\":{\"stroke\":\"#00ff00\"}}]}";
    let parsed = parse(input);
    assert!(parsed.warnings.is_empty(), "{:?}", parsed.warnings);
    let edge = &parsed.diagram.edges[0];
    assert_eq!(edge.source_handle.as_deref(), Some("right"));
    assert_eq!(edge.style.stroke, "#00ff00");

    let reparsed = reparse(&parsed.diagram);
    assert_eq!(reparsed.diagram, parsed.diagram);
}

#[test]
fn punctuation_in_labels_survives_a_round_trip() {
    let theme = mb_core::Theme::default();
    let mut parsed = parse("flowchart TD\n A[\"x; y %% z\"] -->|\"a|b\"| B");
    assert!(parsed.warnings.is_empty(), "{:?}", parsed.warnings);
    parsed.diagram.edges[0].label = Some("a;b\n50 %% off: \"q\" (p) [s] {c}".to_string());

    let text = mb_emit::emit_with_theme(&parsed.diagram, &theme).expect("valid");
    let reparsed = parse(&text);
    assert!(reparsed.warnings.is_empty(), "{:?}\n{text}", reparsed.warnings);
    assert_eq!(reparsed.diagram, parsed.diagram);
    assert_eq!(
        reparsed.diagram.find_node("A").map(|node| node.label.as_str()),
        Some("x; y %% z")
    );
}

#[test]
fn sequence_labels_with_punctuation_survive_a_round_trip() {
    let parsed = parse(
        "sequenceDiagram\n participant A as \"Ops; 50 %% [EU]\"\n A->>B: 50 %% off; a|b: #quot;q#quot; (p)<br/>{c}\n B-->>A %% reply",
    );
    assert!(parsed.warnings.is_empty(), "{:?}", parsed.warnings);
    let diagram = &parsed.diagram;
    assert_eq!(
        diagram.find_node("A").map(|node| node.label.as_str()),
        Some("Ops; 50 %% [EU]")
    );
    let label = diagram
        .edges
        .iter()
        .find(|edge| edge.id == "message:0:label")
        .and_then(|edge| edge.label.as_deref());
    assert_eq!(label, Some("50 %% off; a|b: \"q\" (p)\n{c}"));

    let reparsed = reparse(diagram);
    assert_eq!(&reparsed.diagram, diagram);
}

#[test]
fn sequence_edge_customizations_ride_the_metadata() {
    let mut parsed = parse("sequenceDiagram\n A->>B: ping\n B-->>A: pong");
    assert!(parsed.warnings.is_empty(), "{:?}", parsed.warnings);
    let line = parsed
        .diagram
        .edges
        .iter_mut()
        .find(|edge| edge.id == "message:0:line")
        .expect("message line");
    line.style.stroke = "#ff0000".to_string();
    line.source_handle = Some("right".to_string());

    let text = emit(&parsed.diagram).expect("valid");
    assert!(text.lines().any(|line| line.starts_with("%% edges: ")), "{text}");
    let reparsed = reparse(&parsed.diagram);
    assert_eq!(reparsed.diagram, parsed.diagram);
}

#[derive(Debug, Clone)]
enum Statement {
    Define(usize, usize, String),
    Link(usize, usize, usize, Option<String>),
}

/// Labels with statement separators, brackets, pipes, quotes and line
/// breaks. Outer whitespace is excluded since labels are stored trimmed.
const LABEL: &str = r#"[a-z;%|:"()\[\]{}]([a-z ;%|:"()\[\]{}\n]{0,10}[a-z;%|:"()\[\]{}])?"#;

fn statement() -> impl Strategy<Value = Statement> {
    prop_oneof![
        (0..5usize, 0..6usize, LABEL)
            .prop_map(|(id, shape, label)| Statement::Define(id, shape, label)),
        (0..5usize, 0..5usize, 0..4usize, prop::option::of(LABEL))
            .prop_map(|(source, target, arrow, label)| Statement::Link(source, target, arrow, label)),
    ]
}

/// Source form of a label inside quotes.
fn quoted(label: &str) -> String {
    format!("\"{}\"", label.replace('"', "#quot;").replace('\n', "<br/>"))
}

fn render(statements: &[Statement]) -> String {
    const IDS: [&str; 5] = ["A", "B", "C", "D", "E"];
    const SHAPES: [(&str, &str); 6] = [
        ("", ""),
        ("[", "]"),
        ("(", ")"),
        ("((", "))"),
        ("{", "}"),
        ("[(", ")]"),
    ];
    const ARROWS: [&str; 4] = ["-->", "-.->", "==>", "---"];

    let mut text = String::from("flowchart TD\n");
    for statement in statements {
        let line = match statement {
            Statement::Define(id, shape, label) => {
                let (open, close) = SHAPES[*shape];
                if open.is_empty() {
                    IDS[*id].to_string()
                } else {
                    format!("{}{open}{}{close}", IDS[*id], quoted(label))
                }
            }
            Statement::Link(source, target, arrow, label) => match label {
                Some(label) => format!(
                    "{} {}|{}| {}",
                    IDS[*source],
                    ARROWS[*arrow],
                    quoted(label),
                    IDS[*target]
                ),
                None => format!("{} {} {}", IDS[*source], ARROWS[*arrow], IDS[*target]),
            },
        };
        text.push_str(&line);
        text.push('\n');
    }
    text
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_generated_flowcharts_round_trip(statements in prop::collection::vec(statement(), 1..12)) {
        let text = render(&statements);
        let parsed = parse(&text);
        prop_assert!(parsed.warnings.is_empty(), "{:?}", parsed.warnings);

        let emitted = emit(&parsed.diagram).expect("valid");
        let reparsed = parse(&emitted);
        prop_assert!(reparsed.warnings.is_empty(), "{:?}", reparsed.warnings);
        prop_assert_eq!(&reparsed.diagram, &parsed.diagram);
        prop_assert_eq!(emit(&reparsed.diagram).expect("valid"), emitted);
    }
}
