use std::fmt::Write as _;

use mb_core::{Diagram, DialectTheme, Edge, Node, NodeKind, NodeShape, NodeStyle};

use crate::{INDENT, escape_label};

pub(crate) fn emit(diagram: &Diagram, palette: &DialectTheme) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "flowchart {}", diagram.direction.as_str());

    let visible = || {
        diagram
            .nodes
            .iter()
            .filter(|node| node.kind() != NodeKind::Anchor)
    };

    for group in visible().filter(|node| node.shape.is_group()) {
        let _ = writeln!(output, "{INDENT}subgraph {}", group_header(group));
        let children = visible().filter(|node| {
            node.parent.as_deref() == Some(group.id.as_str()) && !node.shape.is_group()
        });
        for child in children {
            let _ = writeln!(output, "{INDENT}{INDENT}{}", node_statement(child));
        }
        let _ = writeln!(output, "{INDENT}end");
    }

    for node in visible().filter(|node| node.parent.is_none() && !node.shape.is_group()) {
        let _ = writeln!(output, "{INDENT}{}", node_statement(node));
    }

    for edge in &diagram.edges {
        let _ = writeln!(output, "{INDENT}{}", edge_statement(edge));
    }

    for node in visible() {
        if let Some(declarations) = style_declarations(&node.style, palette.node_style(node.kind()))
        {
            let _ = writeln!(output, "{INDENT}style {} {declarations}", node.id);
        }
    }

    output
}

fn group_header(group: &Node) -> String {
    if group.label == group.id {
        group.id.clone()
    } else {
        format!("{}[\"{}\"]", group.id, escape_label(&group.label))
    }
}

/// A bare id for a default rectangle, otherwise the bracketed definition.
fn node_statement(node: &Node) -> String {
    let (open, close) = match node.shape {
        NodeShape::Rounded => ("(", ")"),
        NodeShape::Circle => ("((", "))"),
        NodeShape::Diamond => ("{", "}"),
        NodeShape::Cylinder => ("[(", ")]"),
        _ if node.label == node.id => return node.id.clone(),
        _ => ("[", "]"),
    };
    format!("{}{open}\"{}\"{close}", node.id, escape_label(&node.label))
}

/// Labels are always quoted so `;`, `|` and `%%` inside them stay part of
/// the statement.
fn edge_statement(edge: &Edge) -> String {
    let arrow = edge.arrow.flowchart_token();
    match edge.label.as_deref() {
        None => format!("{} {arrow} {}", edge.source, edge.target),
        Some(label) => format!(
            "{} {arrow}|\"{}\"| {}",
            edge.source,
            escape_label(label),
            edge.target
        ),
    }
}

/// `k:v` pairs for every attribute that differs from `defaults`.
fn style_declarations(style: &NodeStyle, defaults: &NodeStyle) -> Option<String> {
    let mut declarations = Vec::new();
    if style.fill != defaults.fill {
        declarations.push(format!("fill:{}", style.fill));
    }
    if style.stroke != defaults.stroke {
        declarations.push(format!("stroke:{}", style.stroke));
    }
    if style.text_color != defaults.text_color {
        declarations.push(format!("color:{}", style.text_color));
    }
    if style.stroke_width != defaults.stroke_width {
        declarations.push(format!("stroke-width:{}px", style.stroke_width));
    }
    if style.stroke_style != defaults.stroke_style {
        let dasharray = style.stroke_style.dasharray().unwrap_or("0");
        declarations.push(format!("stroke-dasharray:{dasharray}"));
    }
    (!declarations.is_empty()).then(|| declarations.join(","))
}

#[cfg(test)]
mod tests {
    use mb_core::{
        ArrowKind, Diagram, Dialect, Direction, Edge, Node, NodeShape, Point, StrokeStyle, Theme,
        edge_id,
    };

    use super::{edge_statement, node_statement};
    use crate::emit;

    fn node(id: &str, shape: NodeShape, label: &str) -> Node {
        let theme = Theme::default();
        let style = theme.flowchart.node_style(shape.kind()).clone();
        Node::new(id, shape, style).with_label(label)
    }

    fn edge(source: &str, target: &str, arrow: ArrowKind, label: Option<&str>) -> Edge {
        let theme = Theme::default();
        let mut edge = Edge::new(edge_id(source, target, 0), source, target, arrow, &theme.flowchart);
        edge.label = label.map(str::to_string);
        edge
    }

    #[test]
    fn node_statements_per_shape() {
        assert_eq!(node_statement(&node("A", NodeShape::Rectangle, "A")), "A");
        assert_eq!(node_statement(&node("A", NodeShape::Rectangle, "Start")), "A[\"Start\"]");
        assert_eq!(node_statement(&node("A", NodeShape::Rounded, "A")), "A(\"A\")");
        assert_eq!(node_statement(&node("A", NodeShape::Circle, "x")), "A((\"x\"))");
        assert_eq!(node_statement(&node("A", NodeShape::Diamond, "x")), "A{\"x\"}");
        assert_eq!(node_statement(&node("A", NodeShape::Cylinder, "x")), "A[(\"x\")]");
        assert_eq!(
            node_statement(&node("A", NodeShape::Rectangle, "two\nlines")),
            "A[\"two<br/>lines\"]"
        );
    }

    #[test]
    fn edge_statements_per_arrow() {
        assert_eq!(edge_statement(&edge("A", "B", ArrowKind::Solid, None)), "A --> B");
        assert_eq!(
            edge_statement(&edge("A", "B", ArrowKind::Dotted, Some("maybe"))),
            "A -.->|\"maybe\"| B"
        );
        assert_eq!(edge_statement(&edge("A", "B", ArrowKind::Thick, None)), "A ==> B");
        assert_eq!(
            edge_statement(&edge("A", "B", ArrowKind::Open, Some("a|b; 50 %% off"))),
            "A ---|\"a|b; 50 %% off\"| B"
        );
    }

    #[test]
    fn groups_come_first_then_nodes_edges_and_styles() {
        let theme = Theme::default();
        let mut diagram = Diagram::empty(Dialect::Flowchart);
        diagram.direction = Direction::LR;
        let mut group = node("G", NodeShape::group(), "Backend");
        group.position = Point::new(0.0, 0.0);
        let mut api = node("api", NodeShape::Rectangle, "api");
        api.parent = Some("G".to_string());
        let mut client = node("client", NodeShape::Rounded, "Client");
        client.style.fill = "#ff0000".to_string();
        client.style.stroke_style = StrokeStyle::Dashed;
        diagram.nodes = vec![client, group, api];
        diagram.edges = vec![edge("client", "api", ArrowKind::Solid, Some("calls"))];

        let text = crate::emit_with_theme(&diagram, &theme).expect("emit");
        let body: Vec<&str> = text.lines().take_while(|line| !line.starts_with("%%")).collect();
        assert_eq!(
            body,
            vec![
                "flowchart LR",
                "    subgraph G[\"Backend\"]",
                "        api",
                "    end",
                "    client(\"Client\")",
                "    client -->|\"calls\"| api",
                "    style client fill:#ff0000,stroke-dasharray:5 5",
            ]
        );
        assert!(text.lines().any(|line| line.starts_with("%% layout: ")));
    }

    #[test]
    fn default_nodes_are_bare_ids() {
        let mut diagram = Diagram::empty(Dialect::Flowchart);
        diagram.nodes = vec![
            node("A", NodeShape::Rectangle, "A"),
            node("B", NodeShape::Rectangle, "B"),
        ];
        diagram.edges = vec![edge("A", "B", ArrowKind::Solid, None)];
        let text = emit(&diagram).expect("emit");
        assert!(text.starts_with("flowchart TD\n    A\n    B\n    A --> B\n"), "{text}");
        assert!(!text.contains("style "));
    }
}
