//! Lifeline layout for sequence diagrams.
//!
//! Participants sit on one row. Every message gets a sending and a receiving
//! anchor on the participants' lifelines; per-participant cursors only move
//! down, so message order reads top to bottom.

use mb_core::{
    ArrowKind, Diagram, Dialect, DialectTheme, Direction, Edge, MessagePart, Node, NodeShape, Point,
    SequenceLink, SequenceScript, Size,
};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceLayoutConfig {
    /// Horizontal distance between neighboring participant boxes.
    pub participant_spacing: f64,
    pub participant_size: Size,
    /// Vertical advance of a lifeline cursor per message.
    pub step: f64,
    /// Gap between the participant row and the first message.
    pub top_gap: f64,
}

impl Default for SequenceLayoutConfig {
    fn default() -> Self {
        Self {
            participant_spacing: 200.0,
            participant_size: Size::new(120.0, 40.0),
            step: 50.0,
            top_gap: 30.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SequenceStats {
    pub participants: usize,
    pub messages: usize,
    pub skipped_messages: usize,
    pub anchors: usize,
    pub lifelines: usize,
    pub closing_row: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SequenceLayout {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub stats: SequenceStats,
}

impl SequenceLayout {
    #[must_use]
    pub fn into_diagram(self) -> Diagram {
        Diagram {
            dialect: Dialect::Sequence,
            direction: Direction::TD,
            nodes: self.nodes,
            edges: self.edges,
        }
    }
}

#[must_use]
pub fn anchor_id(order: usize, participant: &str, part: AnchorEnd) -> String {
    format!("anchor:{order}:{participant}:{}", part.as_str())
}

#[must_use]
pub fn closing_anchor_id(participant: &str) -> String {
    format!("anchor:end:{participant}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorEnd {
    From,
    To,
}

impl AnchorEnd {
    const fn as_str(self) -> &'static str {
        match self {
            Self::From => "from",
            Self::To => "to",
        }
    }
}

/// Per-participant lifeline state.
struct Lifeline {
    center_x: f64,
    cursor: f64,
    /// Last node on this lifeline: the participant box, then anchors.
    tail: String,
    segments: usize,
}

struct Builder<'a> {
    theme: &'a DialectTheme,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    stats: SequenceStats,
}

impl Builder<'_> {
    fn anchor(&mut self, id: String, position: Point) -> String {
        let mut node = Node::new(id.clone(), NodeShape::Anchor, self.theme.node.clone());
        node.label = String::new();
        node.position = position;
        self.nodes.push(node);
        self.stats.anchors += 1;
        id
    }

    fn extend_lifeline(&mut self, participant: &str, lifeline: &mut Lifeline, anchor: &str) {
        let mut edge = Edge::new(
            format!("lifeline:{participant}:{}", lifeline.segments),
            lifeline.tail.clone(),
            anchor,
            ArrowKind::Open,
            self.theme,
        );
        edge.style = self.theme.lifeline_edge();
        self.edges.push(edge);
        lifeline.tail = anchor.to_string();
        lifeline.segments += 1;
        self.stats.lifelines += 1;
    }
}

/// Build participant boxes, message anchors, message edge pairs and
/// lifelines for `script`.
#[must_use]
pub fn layout_sequence(
    script: &SequenceScript,
    config: &SequenceLayoutConfig,
    theme: &DialectTheme,
) -> SequenceLayout {
    let mut builder = Builder {
        theme,
        nodes: Vec::with_capacity(script.participants.len() * 2 + script.messages.len() * 2),
        edges: Vec::with_capacity(script.messages.len() * 4),
        stats: SequenceStats {
            participants: script.participants.len(),
            ..SequenceStats::default()
        },
    };

    let first_row = config.participant_size.height + config.top_gap;
    let mut lifelines: Vec<Lifeline> = Vec::with_capacity(script.participants.len());
    for (index, participant) in script.participants.iter().enumerate() {
        let shape = if participant.actor {
            NodeShape::Circle
        } else {
            NodeShape::Rectangle
        };
        let left = index as f64 * config.participant_spacing;
        let mut node = Node::new(participant.id.clone(), shape, participant.style.clone())
            .with_label(participant.label.clone());
        node.position = Point::new(left, 0.0);
        builder.nodes.push(node);
        lifelines.push(Lifeline {
            center_x: left + config.participant_size.width / 2.0,
            cursor: first_row,
            tail: participant.id.clone(),
            segments: 0,
        });
    }

    for (order, message) in script.messages.iter().enumerate() {
        let (Some(from), Some(to)) = (
            script.participant_index(&message.from),
            script.participant_index(&message.to),
        ) else {
            debug!(order, from = %message.from, to = %message.to, "skipping message with unknown participant");
            builder.stats.skipped_messages += 1;
            continue;
        };

        let row = lifelines[from].cursor.max(lifelines[to].cursor);
        let receive_row = if from == to {
            row + config.step / 2.0
        } else {
            row
        };

        let source = builder.anchor(
            anchor_id(order, &message.from, AnchorEnd::From),
            Point::new(lifelines[from].center_x, row),
        );
        let target = builder.anchor(
            anchor_id(order, &message.to, AnchorEnd::To),
            Point::new(lifelines[to].center_x, receive_row),
        );

        builder.extend_lifeline(&message.from, &mut lifelines[from], &source);
        if from == to {
            lifelines[from].tail.clone_from(&target);
        } else {
            builder.extend_lifeline(&message.to, &mut lifelines[to], &target);
        }
        lifelines[from].cursor = row + config.step;
        lifelines[to].cursor = row + config.step;

        let link = |part| SequenceLink {
            order,
            from_participant: message.from.clone(),
            to_participant: message.to.clone(),
            part,
        };
        let mut line = Edge::new(
            format!("message:{order}:line"),
            source.clone(),
            target.clone(),
            message.arrow.clone(),
            theme,
        );
        line.sequence = Some(link(MessagePart::Line));
        let mut label = Edge::new(
            format!("message:{order}:label"),
            source,
            target,
            ArrowKind::Open,
            theme,
        );
        label.label.clone_from(&message.label);
        label.sequence = Some(link(MessagePart::Label));
        builder.edges.push(line);
        builder.edges.push(label);
        builder.stats.messages += 1;
    }

    let closing_row = lifelines
        .iter()
        .map(|lifeline| lifeline.cursor)
        .fold(first_row, f64::max);
    for (participant, lifeline) in script.participants.iter().zip(lifelines.iter_mut()) {
        let end = builder.anchor(
            closing_anchor_id(&participant.id),
            Point::new(lifeline.center_x, closing_row),
        );
        builder.extend_lifeline(&participant.id, lifeline, &end);
    }
    builder.stats.closing_row = closing_row;

    info!(
        participants = builder.stats.participants,
        messages = builder.stats.messages,
        closing_row,
        "sequence layout complete"
    );

    SequenceLayout {
        nodes: builder.nodes,
        edges: builder.edges,
        stats: builder.stats,
    }
}
