use std::fmt::Write as _;

use mb_core::{Diagram, EntityAttribute, Node, NodeShape};

use crate::{INDENT, escape_label};

pub(crate) fn emit(diagram: &Diagram) -> String {
    let mut output = String::from("erDiagram\n");

    for node in &diagram.nodes {
        let attributes = match &node.shape {
            NodeShape::Entity { attributes } => attributes.as_slice(),
            _ => &[],
        };
        let referenced = diagram
            .edges
            .iter()
            .any(|edge| edge.source == node.id || edge.target == node.id);
        // Relationship lines already declare plain entities.
        if attributes.is_empty() && node.label == node.id && referenced {
            continue;
        }

        let _ = writeln!(output, "{INDENT}{} {{", entity_head(node));
        for attribute in attributes {
            let _ = writeln!(output, "{INDENT}{INDENT}{}", attribute_row(attribute));
        }
        let _ = writeln!(output, "{INDENT}}}");
    }

    for edge in &diagram.edges {
        let label = edge.label.as_deref().map(escape_label).unwrap_or_default();
        let _ = writeln!(
            output,
            "{INDENT}{} {} {} : \"{label}\"",
            edge.source,
            edge.arrow.flowchart_token(),
            edge.target
        );
    }

    output
}

fn entity_head(node: &Node) -> String {
    if node.label == node.id {
        node.id.clone()
    } else {
        format!("{}[\"{}\"]", node.id, escape_label(&node.label))
    }
}

fn attribute_row(attribute: &EntityAttribute) -> String {
    let mut row = format!("{} {}", attribute.data_type, attribute.name);
    if let Some(constraint) = &attribute.constraint {
        let _ = write!(row, " {constraint}");
    }
    if let Some(comment) = &attribute.comment {
        let _ = write!(row, " \"{}\"", comment.replace('"', "'"));
    }
    row
}

#[cfg(test)]
mod tests {
    use mb_core::{
        ArrowKind, Diagram, Dialect, Edge, EntityAttribute, ErRelationship, Node, NodeShape, Theme,
    };

    use super::attribute_row;
    use crate::emit;

    fn entity(id: &str, rows: &[(&str, &str)]) -> Node {
        let theme = Theme::default();
        let attributes = rows
            .iter()
            .map(|(data_type, name)| EntityAttribute {
                data_type: (*data_type).to_string(),
                name: (*name).to_string(),
                constraint: None,
                comment: None,
            })
            .collect();
        Node::new(id, NodeShape::Entity { attributes }, theme.er.node.clone())
    }

    #[test]
    fn rows_carry_keys_and_comments() {
        let row = EntityAttribute {
            data_type: "string".to_string(),
            name: "id".to_string(),
            constraint: Some("PK, FK".to_string()),
            comment: Some("the \"key\"".to_string()),
        };
        assert_eq!(attribute_row(&row), "string id PK, FK \"the 'key'\"");
    }

    #[test]
    fn customer_order_text() {
        let theme = Theme::default();
        let mut diagram = Diagram::empty(Dialect::EntityRelationship);
        diagram.nodes = vec![entity("CUSTOMER", &[("string", "name")]), entity("ORDER", &[])];
        let relationship = ErRelationship::parse("||--o{").expect("token");
        let mut places = Edge::new(
            "CUSTOMER->ORDER",
            "CUSTOMER",
            "ORDER",
            ArrowKind::Relationship(relationship),
            &theme.er,
        );
        places.label = Some("places".to_string());
        diagram.edges = vec![places];

        let text = emit(&diagram).expect("emit");
        let body: Vec<&str> = text.lines().take_while(|line| !line.starts_with("%%")).collect();
        assert_eq!(
            body,
            vec![
                "erDiagram",
                "    CUSTOMER {",
                "        string name",
                "    }",
                "    CUSTOMER ||--o{ ORDER : \"places\"",
            ]
        );
    }

    #[test]
    fn isolated_entities_get_an_empty_block() {
        let mut diagram = Diagram::empty(Dialect::EntityRelationship);
        let mut lonely = entity("LONELY", &[]);
        lonely.label = "Lonely One".to_string();
        diagram.nodes = vec![lonely, entity("EMPTY", &[])];
        let text = emit(&diagram).expect("emit");
        assert!(text.contains("    LONELY[\"Lonely One\"] {\n    }\n"), "{text}");
        assert!(text.contains("    EMPTY {\n    }\n"), "{text}");
    }
}
