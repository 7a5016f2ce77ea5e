//! Participants-and-messages view of a sequence diagram.
//!
//! The parser builds a [`SequenceScript`] from text and hands it to the
//! sequence layout; the emitter and relayout recover one from a laid-out
//! [`Diagram`] with [`SequenceScript::from_diagram`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ArrowKind, Diagram, MessagePart, Node, NodeKind, NodeShape, NodeStyle};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SequenceParticipant {
    pub id: String,
    pub label: String,
    /// Declared with `actor` rather than `participant`.
    pub actor: bool,
    pub style: NodeStyle,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SequenceMessage {
    pub from: String,
    pub to: String,
    pub label: Option<String>,
    pub arrow: ArrowKind,
}

impl SequenceMessage {
    #[must_use]
    pub fn is_self_message(&self) -> bool {
        self.from == self.to
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SequenceScript {
    pub participants: Vec<SequenceParticipant>,
    pub messages: Vec<SequenceMessage>,
}

impl SequenceScript {
    #[must_use]
    pub fn participant_index(&self, id: &str) -> Option<usize> {
        self.participants
            .iter()
            .position(|participant| participant.id == id)
    }

    /// Participants ordered left to right, messages ordered by `order` with
    /// each line/label edge pair folded back into one message.
    #[must_use]
    pub fn from_diagram(diagram: &Diagram) -> Self {
        let mut boxes: Vec<(usize, &Node)> = diagram
            .nodes
            .iter()
            .filter(|node| node.kind() != NodeKind::Anchor)
            .enumerate()
            .collect();
        boxes.sort_by(|(left_index, left), (right_index, right)| {
            left.position
                .x
                .total_cmp(&right.position.x)
                .then_with(|| left_index.cmp(right_index))
        });
        let participants = boxes
            .into_iter()
            .map(|(_, node)| SequenceParticipant {
                id: node.id.clone(),
                label: node.label.clone(),
                actor: matches!(node.shape, NodeShape::Circle),
                style: node.style.clone(),
            })
            .collect();

        let mut by_order: BTreeMap<usize, SequenceMessage> = BTreeMap::new();
        for edge in &diagram.edges {
            let Some(link) = &edge.sequence else {
                continue;
            };
            let message = by_order
                .entry(link.order)
                .or_insert_with(|| SequenceMessage {
                    from: link.from_participant.clone(),
                    to: link.to_participant.clone(),
                    label: None,
                    arrow: edge.arrow.clone(),
                });
            match link.part {
                MessagePart::Line => message.arrow = edge.arrow.clone(),
                MessagePart::Label => {
                    if edge.label.is_some() {
                        message.label.clone_from(&edge.label);
                    }
                }
            }
        }

        Self {
            participants,
            messages: by_order.into_values().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SequenceScript;
    use crate::{
        ArrowKind, Diagram, Dialect, Edge, MessagePart, Node, NodeShape, Point, SequenceLink,
        Theme,
    };

    fn message_edge(
        order: usize,
        part: MessagePart,
        from: &str,
        to: &str,
        arrow: ArrowKind,
        label: Option<&str>,
    ) -> Edge {
        let theme = Theme::default();
        let mut edge = Edge::new(
            format!("msg{order}-{part:?}"),
            format!("{from}@{order}"),
            format!("{to}@{order}"),
            arrow,
            theme.dialect(Dialect::Sequence),
        );
        edge.label = label.map(str::to_string);
        edge.sequence = Some(SequenceLink {
            order,
            from_participant: from.to_string(),
            to_participant: to.to_string(),
            part,
        });
        edge
    }

    #[test]
    fn participants_follow_horizontal_position() {
        let theme = Theme::default();
        let palette = theme.dialect(Dialect::Sequence);
        let mut diagram = Diagram::empty(Dialect::Sequence);
        let mut right = Node::new("Bob", NodeShape::Rectangle, palette.node.clone());
        right.position = Point::new(400.0, 0.0);
        let mut left = Node::new("Alice", NodeShape::Circle, palette.node.clone());
        left.position = Point::new(0.0, 0.0);
        diagram.nodes.push(right);
        diagram.nodes.push(Node::new("anchor", NodeShape::Anchor, palette.node.clone()));
        diagram.nodes.push(left);

        let script = SequenceScript::from_diagram(&diagram);
        let ids: Vec<&str> = script.participants.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["Alice", "Bob"]);
        assert!(script.participants[0].actor);
        assert_eq!(script.participant_index("Bob"), Some(1));
    }

    #[test]
    fn message_pairs_fold_into_one_message() {
        let mut diagram = Diagram::empty(Dialect::Sequence);
        diagram.edges.push(message_edge(
            1,
            MessagePart::Label,
            "B",
            "A",
            ArrowKind::Open,
            Some("Hi"),
        ));
        diagram.edges.push(message_edge(
            0,
            MessagePart::Line,
            "A",
            "B",
            ArrowKind::Dotted,
            None,
        ));
        diagram.edges.push(message_edge(
            0,
            MessagePart::Label,
            "A",
            "B",
            ArrowKind::Open,
            Some("Hello"),
        ));
        diagram.edges.push(message_edge(
            1,
            MessagePart::Line,
            "B",
            "A",
            ArrowKind::Solid,
            None,
        ));

        let script = SequenceScript::from_diagram(&diagram);
        assert_eq!(script.messages.len(), 2);
        assert_eq!(script.messages[0].from, "A");
        assert_eq!(script.messages[0].arrow, ArrowKind::Dotted);
        assert_eq!(script.messages[0].label.as_deref(), Some("Hello"));
        assert_eq!(script.messages[1].arrow, ArrowKind::Solid);
        assert_eq!(script.messages[1].label.as_deref(), Some("Hi"));
        assert!(!script.messages[1].is_self_message());
    }
}
