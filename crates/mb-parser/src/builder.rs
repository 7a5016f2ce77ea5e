use std::collections::BTreeMap;

use mb_core::metadata::{EdgeExtraQueue, SideChannel};
use mb_core::{
    ArrowKind, Diagram, Dialect, DialectTheme, Direction, Edge, Node, NodeShape, Point, Size,
    edge_id,
};
use mb_layout::{LayoutConfig, layout_diagram};
use tracing::{debug, info};

use crate::LayoutOutcome;

/// Accumulates nodes and edges for one diagram, applying side-channel
/// styles and edge extras as elements are created.
pub(crate) struct DiagramBuilder<'a> {
    diagram: Diagram,
    palette: &'a DialectTheme,
    channel: &'a SideChannel,
    edge_queue: EdgeExtraQueue,
    default_shape: NodeShape,
    node_index_by_id: BTreeMap<String, usize>,
    edge_occurrences: BTreeMap<(String, String), usize>,
    warnings: Vec<String>,
}

impl<'a> DiagramBuilder<'a> {
    pub(crate) fn new(
        dialect: Dialect,
        palette: &'a DialectTheme,
        channel: &'a SideChannel,
        default_shape: NodeShape,
    ) -> Self {
        Self {
            diagram: Diagram::empty(dialect),
            palette,
            channel,
            edge_queue: channel.edge_queue(),
            default_shape,
            node_index_by_id: BTreeMap::new(),
            edge_occurrences: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    pub(crate) fn set_direction(&mut self, direction: Direction) {
        self.diagram.direction = direction;
    }

    pub(crate) fn warn(&mut self, line_number: usize, message: impl AsRef<str>) {
        self.warnings
            .push(format!("Line {line_number}: {}", message.as_ref()));
    }

    pub(crate) fn warn_unnumbered(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub(crate) fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        let index = *self.node_index_by_id.get(id)?;
        self.diagram.nodes.get_mut(index)
    }

    /// Return the node `id`, creating it if needed. A `shape` marks an
    /// explicit definition, which replaces the shape and label of an
    /// existing node; `None` references the node without redefining it.
    pub(crate) fn intern_node(
        &mut self,
        id: &str,
        shape: Option<NodeShape>,
        label: Option<String>,
    ) -> Option<&mut Node> {
        let id = id.trim();
        if id.is_empty() {
            self.warnings
                .push("Encountered empty node identifier; skipped node".to_string());
            return None;
        }

        if let Some(&index) = self.node_index_by_id.get(id) {
            let palette = self.palette;
            let channel = self.channel;
            let node = &mut self.diagram.nodes[index];
            // A declared group stays a group; bracket forms only relabel it.
            if node.shape.is_group() && shape.as_ref().is_some_and(|shape| !shape.is_group()) {
                if let Some(label) = label {
                    node.label = label;
                }
                return Some(node);
            }
            if let Some(shape) = shape {
                if shape.kind() != node.kind() {
                    node.style = palette.node_style(shape.kind()).clone();
                }
                node.shape = shape;
                if let Some(overrides) = channel.styles.get(id) {
                    overrides.apply(node);
                }
                if let Some(label) = label {
                    node.label = label;
                }
            }
            return Some(node);
        }

        let shape = shape.unwrap_or_else(|| self.default_shape.clone());
        let style = self.palette.node_style(shape.kind()).clone();
        let mut node = Node::new(id, shape, style);
        if let Some(label) = label {
            node.label = label;
        }
        if let Some(overrides) = self.channel.styles.get(id) {
            overrides.apply(&mut node);
        }

        let index = self.diagram.nodes.len();
        self.node_index_by_id.insert(id.to_string(), index);
        self.diagram.nodes.push(node);
        self.diagram.nodes.last_mut()
    }

    /// Groups never nest, so group nodes keep no parent.
    pub(crate) fn set_parent(&mut self, id: &str, group: &str) {
        if id == group {
            return;
        }
        if let Some(node) = self.node_mut(id)
            && !node.shape.is_group()
        {
            node.parent = Some(group.to_string());
        }
    }

    /// Append an edge, numbering parallel edges and attaching the next
    /// matching edge extra from the side channel.
    pub(crate) fn push_edge(
        &mut self,
        source: &str,
        target: &str,
        arrow: ArrowKind,
        label: Option<String>,
    ) {
        let occurrence = self
            .edge_occurrences
            .entry((source.to_string(), target.to_string()))
            .or_insert(0);
        let id = edge_id(source, target, *occurrence);
        *occurrence += 1;

        let mut edge = Edge::new(id, source, target, arrow, self.palette);
        edge.label = label;
        if let Some(extra) = self.edge_queue.take(source, target) {
            extra.apply(&mut edge);
        }
        self.diagram.edges.push(edge);
    }

    pub(crate) fn finish(self) -> (Diagram, Vec<String>) {
        (self.diagram, self.warnings)
    }
}

/// Apply saved positions when they cover at least half of the nodes,
/// otherwise run the layered layout over the whole diagram.
pub(crate) fn place_nodes(
    diagram: &mut Diagram,
    channel: &SideChannel,
    config: &LayoutConfig,
) -> LayoutOutcome {
    let total = diagram.nodes.len();
    if total == 0 {
        return LayoutOutcome::Empty;
    }
    let saved = diagram
        .nodes
        .iter()
        .filter(|node| channel.positions.contains_key(&node.id))
        .count();

    if saved > 0 && saved * 2 >= total {
        let parked = restore_positions(diagram, channel, config);
        info!(saved, parked, total, "restored saved positions");
        return LayoutOutcome::Restored { saved, parked };
    }

    let stats = layout_diagram(diagram, config);
    info!(saved, total, ranks = stats.rank_count, "computed layered layout");
    LayoutOutcome::Layered {
        ranks: stats.rank_count,
        crossings: stats.crossing_count,
        reversed_edges: stats.reversed_edges,
    }
}

/// Returns how many nodes had no saved position and were parked.
fn restore_positions(diagram: &mut Diagram, channel: &SideChannel, config: &LayoutConfig) -> usize {
    let spacing = config.spacing;
    let footprints = config.footprints;
    let mut unsaved: Vec<usize> = Vec::new();
    for (index, node) in diagram.nodes.iter_mut().enumerate() {
        match channel.positions.get(&node.id) {
            Some(saved) => {
                node.position = Point::new(saved.x, saved.y);
                if let Some(size) = saved.size() {
                    node.size = Some(size);
                }
            }
            None => unsaved.push(index),
        }
    }

    let parent_index: Vec<Option<usize>> = diagram
        .nodes
        .iter()
        .map(|node| {
            let parent = node.parent.as_deref()?;
            diagram
                .find_node_index(parent)
                .filter(|index| diagram.nodes[*index].shape.is_group())
        })
        .collect();

    // Children first: below their saved siblings, inside the group padding.
    let mut group_cursor: BTreeMap<usize, Point> = BTreeMap::new();
    for &index in &unsaved {
        let Some(group) = parent_index[index] else {
            continue;
        };
        let cursor = *group_cursor.entry(group).or_insert_with(|| {
            let floor = diagram
                .nodes
                .iter()
                .enumerate()
                .filter(|(child, node)| {
                    parent_index[*child] == Some(group) && channel.positions.contains_key(&node.id)
                })
                .map(|(_, node)| node.position.y + footprints.of(node).height + spacing.node_spacing)
                .fold(spacing.group_header + spacing.group_padding, f64::max);
            Point::new(spacing.group_padding, floor)
        });
        let size = footprints.of(&diagram.nodes[index]);
        diagram.nodes[index].position = cursor;
        group_cursor.insert(
            group,
            Point::new(cursor.x + size.width + spacing.node_spacing, cursor.y),
        );
    }

    // Fit groups that have no saved size around their children.
    for group in 0..diagram.nodes.len() {
        if !diagram.nodes[group].shape.is_group()
            || channel
                .positions
                .get(&diagram.nodes[group].id)
                .is_some_and(|saved| saved.size().is_some())
        {
            continue;
        }
        let mut extent: Option<Size> = None;
        for (child, node) in diagram.nodes.iter().enumerate() {
            if parent_index[child] != Some(group) {
                continue;
            }
            let size = footprints.of(node);
            let current = extent.get_or_insert(Size::default());
            current.width = current.width.max(node.position.x + size.width);
            current.height = current.height.max(node.position.y + size.height);
        }
        if let Some(extent) = extent {
            diagram.nodes[group].size = Some(Size::new(
                extent.width + spacing.group_padding,
                extent.height + spacing.group_padding,
            ));
        }
    }

    // Top-level nodes on a row below everything that was saved.
    let saved_top: Vec<&Node> = diagram
        .nodes
        .iter()
        .enumerate()
        .filter(|(index, node)| {
            parent_index[*index].is_none() && channel.positions.contains_key(&node.id)
        })
        .map(|(_, node)| node)
        .collect();
    let row = saved_top
        .iter()
        .map(|node| node.position.y + footprints.of(node).height + spacing.rank_spacing)
        .fold(0.0_f64, f64::max);
    let mut x = saved_top
        .iter()
        .map(|node| node.position.x)
        .fold(f64::MAX, f64::min);
    if x == f64::MAX {
        x = 0.0;
    }
    for &index in &unsaved {
        if parent_index[index].is_some() {
            continue;
        }
        let size = footprints.of(&diagram.nodes[index]);
        debug!(node = %diagram.nodes[index].id, x, row, "parking node without saved position");
        diagram.nodes[index].position = Point::new(x, row);
        x += size.width + spacing.node_spacing;
    }

    unsaved.len()
}
