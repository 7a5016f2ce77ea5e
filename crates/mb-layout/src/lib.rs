#![forbid(unsafe_code)]

//! Layered (Sugiyama-style) layout for flowchart and entity diagrams.
//!
//! Groups are laid out as compound nodes: each group's children are laid out
//! first, the group takes the size of their bounding box plus padding, and the
//! enclosing scope then treats the group as a single node. Output positions
//! are top-left based; a child's position is relative to its group's top-left
//! corner. The sequence lifeline layout lives in [`sequence`].

pub mod sequence;

pub use sequence::{SequenceLayout, SequenceLayoutConfig, SequenceStats, layout_sequence};

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};

use mb_core::{Diagram, Node, NodeShape, Point, Size};
use rustc_hash::FxHashMap;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutSpacing {
    pub node_spacing: f64,
    pub rank_spacing: f64,
    pub group_padding: f64,
    /// Extra room above a group's children for its label.
    pub group_header: f64,
}

impl Default for LayoutSpacing {
    fn default() -> Self {
        Self {
            node_spacing: 48.0,
            rank_spacing: 72.0,
            group_padding: 24.0,
            group_header: 28.0,
        }
    }
}

/// Fixed node footprints per kind. An explicit `Node::size` wins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Footprints {
    pub rectangle: Size,
    pub diamond: Size,
    pub cylinder: Size,
    pub circle: Size,
    pub entity: Size,
    pub entity_row: f64,
    pub empty_group: Size,
}

impl Default for Footprints {
    fn default() -> Self {
        Self {
            rectangle: Size::new(150.0, 50.0),
            diamond: Size::new(120.0, 80.0),
            cylinder: Size::new(120.0, 60.0),
            circle: Size::new(60.0, 60.0),
            entity: Size::new(180.0, 40.0),
            entity_row: 24.0,
            empty_group: Size::new(200.0, 120.0),
        }
    }
}

impl Footprints {
    #[must_use]
    pub fn of(&self, node: &Node) -> Size {
        if let Some(size) = node.size {
            return size;
        }
        match &node.shape {
            NodeShape::Rectangle | NodeShape::Rounded => self.rectangle,
            NodeShape::Diamond => self.diamond,
            NodeShape::Cylinder => self.cylinder,
            NodeShape::Circle => self.circle,
            NodeShape::Entity { attributes } => Size::new(
                self.entity.width,
                self.entity.height + self.entity_row * attributes.len() as f64,
            ),
            NodeShape::Group { .. } => self.empty_group,
            NodeShape::Anchor => Size::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LayoutConfig {
    pub spacing: LayoutSpacing,
    pub footprints: Footprints,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LayoutRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl LayoutRect {
    #[must_use]
    pub fn center(self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    #[must_use]
    pub fn right(self) -> f64 {
        self.x + self.width
    }

    #[must_use]
    pub fn bottom(self) -> f64 {
        self.y + self.height
    }

    /// True when `other` lies inside this rectangle without touching its
    /// border.
    #[must_use]
    pub fn strictly_contains(self, other: Self) -> bool {
        other.x > self.x
            && other.y > self.y
            && other.right() < self.right()
            && other.bottom() < self.bottom()
    }

    #[must_use]
    pub fn overlaps(self, other: Self) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutNodeBox {
    pub node_index: usize,
    pub node_id: String,
    pub rank: usize,
    pub order: usize,
    /// Absolute canvas rectangle.
    pub bounds: LayoutRect,
    /// Position as stored on the node: relative to the parent group when
    /// the node has one.
    pub position: Point,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutGroupBox {
    pub node_index: usize,
    pub node_id: String,
    pub bounds: LayoutRect,
    pub member_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayoutStats {
    pub node_count: usize,
    pub edge_count: usize,
    /// Ranks in the top-level scope.
    pub rank_count: usize,
    pub crossing_count: usize,
    /// Crossing count after barycenter sweeps, before transposition.
    pub crossing_count_before_refinement: usize,
    pub reversed_edges: usize,
    pub dummy_nodes: usize,
    pub scopes: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DiagramLayout {
    pub nodes: Vec<LayoutNodeBox>,
    pub groups: Vec<LayoutGroupBox>,
    pub bounds: LayoutRect,
    pub stats: LayoutStats,
}

impl DiagramLayout {
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&LayoutNodeBox> {
        self.nodes.iter().find(|node| node.node_id == id)
    }
}

/// Lay out `diagram` and write positions (and group sizes) back onto it.
pub fn layout_diagram(diagram: &mut Diagram, config: &LayoutConfig) -> LayoutStats {
    let layout = compute_layout(diagram, config);
    apply_layout(diagram, &layout);
    layout.stats
}

/// Store the computed positions on the diagram's nodes. Populated groups also
/// receive their computed size.
pub fn apply_layout(diagram: &mut Diagram, layout: &DiagramLayout) {
    for node_box in &layout.nodes {
        if let Some(node) = diagram.nodes.get_mut(node_box.node_index) {
            node.position = node_box.position;
        }
    }
    for group in &layout.groups {
        if let Some(node) = diagram.nodes.get_mut(group.node_index) {
            node.size = Some(Size::new(group.bounds.width, group.bounds.height));
        }
    }
}

/// Compute a deterministic layered layout without touching the diagram.
#[must_use]
pub fn compute_layout(diagram: &Diagram, config: &LayoutConfig) -> DiagramLayout {
    let node_count = diagram.nodes.len();
    let hierarchy = Hierarchy::build(diagram);
    let edges = resolved_edges(diagram);
    let mut stats = LayoutStats {
        node_count,
        edge_count: diagram.edges.len(),
        ..LayoutStats::default()
    };

    let mut placed = vec![Placed::default(); node_count];
    let roots = hierarchy.roots.clone();
    let top = layout_scope(
        diagram,
        config,
        &hierarchy,
        &edges,
        None,
        &roots,
        &mut placed,
        &mut stats,
    );
    debug!(
        width = top.width,
        height = top.height,
        "top-level scope laid out"
    );

    // Resolve absolute rectangles parents-first.
    let mut absolute = vec![Point::default(); node_count];
    let mut pending: Vec<usize> = roots.iter().rev().copied().collect();
    while let Some(node_index) = pending.pop() {
        let origin = match hierarchy.parent[node_index] {
            Some(parent) => {
                let parent_origin = absolute[parent];
                Point::new(
                    parent_origin.x + placed[node_index].position.x,
                    parent_origin.y + placed[node_index].position.y,
                )
            }
            None => placed[node_index].position,
        };
        absolute[node_index] = origin;
        pending.extend(hierarchy.children[node_index].iter().rev().copied());
    }

    let nodes: Vec<LayoutNodeBox> = diagram
        .nodes
        .iter()
        .enumerate()
        .map(|(node_index, node)| LayoutNodeBox {
            node_index,
            node_id: node.id.clone(),
            rank: placed[node_index].rank,
            order: placed[node_index].order,
            bounds: LayoutRect {
                x: absolute[node_index].x,
                y: absolute[node_index].y,
                width: placed[node_index].size.width,
                height: placed[node_index].size.height,
            },
            position: placed[node_index].position,
        })
        .collect();

    let groups: Vec<LayoutGroupBox> = hierarchy
        .children
        .iter()
        .enumerate()
        .filter(|(_, children)| !children.is_empty())
        .map(|(node_index, children)| LayoutGroupBox {
            node_index,
            node_id: diagram.nodes[node_index].id.clone(),
            bounds: nodes[node_index].bounds,
            member_count: children.len(),
        })
        .collect();

    let bounds = compute_bounds(&nodes);
    info!(
        nodes = stats.node_count,
        edges = stats.edge_count,
        ranks = stats.rank_count,
        crossings = stats.crossing_count,
        "layered layout complete"
    );

    DiagramLayout {
        nodes,
        groups,
        bounds,
        stats,
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Placed {
    /// Top-left relative to the enclosing group, or absolute at top level.
    position: Point,
    size: Size,
    rank: usize,
    order: usize,
}

/// Parent/child structure with dangling, non-group and cyclic parent
/// references removed.
struct Hierarchy {
    parent: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    roots: Vec<usize>,
}

impl Hierarchy {
    fn build(diagram: &Diagram) -> Self {
        let node_count = diagram.nodes.len();
        let index_by_id: FxHashMap<&str, usize> = diagram
            .nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (node.id.as_str(), index))
            .collect();

        let mut parent: Vec<Option<usize>> = diagram
            .nodes
            .iter()
            .enumerate()
            .map(|(index, node)| {
                let parent_index = *index_by_id.get(node.parent.as_deref()?)?;
                (parent_index != index && diagram.nodes[parent_index].shape.is_group())
                    .then_some(parent_index)
            })
            .collect();

        for start in 0..node_count {
            let mut seen = BTreeSet::from([start]);
            let mut cursor = parent[start];
            while let Some(ancestor) = cursor {
                if !seen.insert(ancestor) {
                    debug!(node = %diagram.nodes[start].id, "ignoring cyclic group membership");
                    parent[start] = None;
                    break;
                }
                cursor = parent[ancestor];
            }
        }

        let mut children = vec![Vec::new(); node_count];
        let mut roots = Vec::new();
        for (index, parent_index) in parent.iter().enumerate() {
            match parent_index {
                Some(group) => children[*group].push(index),
                None => roots.push(index),
            }
        }

        Self {
            parent,
            children,
            roots,
        }
    }

    /// The ancestor of `node` (or `node` itself) that is a direct member of
    /// `scope`.
    fn member_of_scope(&self, node: usize, scope: Option<usize>) -> Option<usize> {
        let mut cursor = node;
        for _ in 0..=self.parent.len() {
            if self.parent[cursor] == scope {
                return Some(cursor);
            }
            cursor = self.parent[cursor]?;
        }
        None
    }
}

fn resolved_edges(diagram: &Diagram) -> Vec<(usize, usize)> {
    let index_by_id: FxHashMap<&str, usize> = diagram
        .nodes
        .iter()
        .enumerate()
        .map(|(index, node)| (node.id.as_str(), index))
        .collect();
    diagram
        .edges
        .iter()
        .filter_map(|edge| {
            Some((
                *index_by_id.get(edge.source.as_str())?,
                *index_by_id.get(edge.target.as_str())?,
            ))
        })
        .collect()
}

/// Lay out the direct `members` of `scope`, recursing into populated groups
/// first. Returns the size of the members' bounding box; member positions
/// are written relative to that box's top-left.
#[allow(clippy::too_many_arguments)]
fn layout_scope(
    diagram: &Diagram,
    config: &LayoutConfig,
    hierarchy: &Hierarchy,
    edges: &[(usize, usize)],
    scope: Option<usize>,
    members: &[usize],
    placed: &mut [Placed],
    stats: &mut LayoutStats,
) -> Size {
    let spacing = config.spacing;
    stats.scopes += 1;

    let mut sizes = Vec::with_capacity(members.len());
    for &member in members {
        let children = &hierarchy.children[member];
        let size = if children.is_empty() {
            config.footprints.of(&diagram.nodes[member])
        } else {
            let content = layout_scope(
                diagram,
                config,
                hierarchy,
                edges,
                Some(member),
                children,
                placed,
                stats,
            );
            for &child in children {
                placed[child].position.x += spacing.group_padding;
                placed[child].position.y += spacing.group_padding + spacing.group_header;
            }
            Size::new(
                content.width + 2.0 * spacing.group_padding,
                content.height + 2.0 * spacing.group_padding + spacing.group_header,
            )
        };
        sizes.push(size);
    }

    let local: FxHashMap<usize, usize> = members
        .iter()
        .enumerate()
        .map(|(local_index, member)| (*member, local_index))
        .collect();
    let scoped_edges: Vec<(usize, usize)> = edges
        .iter()
        .filter_map(|&(source, target)| {
            let source = hierarchy.member_of_scope(source, scope)?;
            let target = hierarchy.member_of_scope(target, scope)?;
            Some((*local.get(&source)?, *local.get(&target)?))
        })
        .filter(|(source, target)| source != target)
        .collect();

    let output = layered_layout(&sizes, &scoped_edges, &spacing);
    if scope.is_none() {
        stats.rank_count = output.stats.rank_count;
    }
    stats.crossing_count += output.stats.crossings_after;
    stats.crossing_count_before_refinement += output.stats.crossings_before;
    stats.reversed_edges += output.stats.reversed_edges;
    stats.dummy_nodes += output.stats.dummy_nodes;

    let mut extent = Size::default();
    for (local_index, &member) in members.iter().enumerate() {
        let size = sizes[local_index];
        let center = output.centers[local_index];
        placed[member].size = size;
        placed[member].rank = output.ranks[local_index];
        placed[member].order = output.orders[local_index];
        placed[member].position = Point::new(
            center.x - size.width / 2.0,
            center.y - size.height / 2.0,
        );
        extent.width = extent.width.max(center.x + size.width / 2.0);
        extent.height = extent.height.max(center.y + size.height / 2.0);
    }
    extent
}

fn compute_bounds(nodes: &[LayoutNodeBox]) -> LayoutRect {
    let mut min_x = f64::MAX;
    let mut min_y = f64::MAX;
    let mut max_x = f64::MIN;
    let mut max_y = f64::MIN;
    for node in nodes {
        min_x = min_x.min(node.bounds.x);
        min_y = min_y.min(node.bounds.y);
        max_x = max_x.max(node.bounds.right());
        max_y = max_y.max(node.bounds.bottom());
    }
    if nodes.is_empty() {
        return LayoutRect::default();
    }
    LayoutRect {
        x: min_x,
        y: min_y,
        width: max_x - min_x,
        height: max_y - min_y,
    }
}

// ---------------------------------------------------------------------------
// Layered pass over one scope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct PassStats {
    rank_count: usize,
    crossings_before: usize,
    crossings_after: usize,
    reversed_edges: usize,
    dummy_nodes: usize,
}

struct LayeredOutput {
    /// Centers with the scope's top-left content corner at the origin.
    centers: Vec<Point>,
    ranks: Vec<usize>,
    orders: Vec<usize>,
    stats: PassStats,
}

fn layered_layout(
    sizes: &[Size],
    edges: &[(usize, usize)],
    spacing: &LayoutSpacing,
) -> LayeredOutput {
    let node_count = sizes.len();
    let edges: Vec<(usize, usize)> = edges
        .iter()
        .copied()
        .filter(|&(source, target)| source != target && source < node_count && target < node_count)
        .collect();

    let reversed = cycle_removal_dfs_back(node_count, &edges);
    let oriented: Vec<(usize, usize)> = edges
        .iter()
        .enumerate()
        .map(|(slot, &(source, target))| {
            if reversed.contains(&slot) {
                (target, source)
            } else {
                (source, target)
            }
        })
        .collect();

    let ranks = rank_assignment(node_count, &oriented);
    let mut graph = ProperGraph::build(sizes, &ranks, &oriented);
    let crossings_before = graph.crossing_minimization();
    let crossings_after = graph.crossing_refinement(crossings_before);
    let centers = graph.coordinate_assignment(spacing);
    let positions = graph.positions();

    LayeredOutput {
        centers: centers[..node_count].to_vec(),
        ranks,
        orders: positions[..node_count].to_vec(),
        stats: PassStats {
            rank_count: graph.layers.len(),
            crossings_before,
            crossings_after,
            reversed_edges: reversed.len(),
            dummy_nodes: graph.widths.len() - node_count,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Unvisited,
    Active,
    Done,
}

/// Reverse every edge that closes a cycle during a depth-first walk in input
/// order. Returns the indexes of reversed edges.
fn cycle_removal_dfs_back(node_count: usize, edges: &[(usize, usize)]) -> BTreeSet<usize> {
    let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); node_count];
    for (slot, &(source, _)) in edges.iter().enumerate() {
        outgoing[source].push(slot);
    }

    let mut state = vec![VisitState::Unvisited; node_count];
    let mut reversed = BTreeSet::new();
    for root in 0..node_count {
        if state[root] != VisitState::Unvisited {
            continue;
        }
        state[root] = VisitState::Active;
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        while let Some(frame) = stack.last_mut() {
            let (node, cursor) = *frame;
            let Some(&slot) = outgoing[node].get(cursor) else {
                state[node] = VisitState::Done;
                stack.pop();
                continue;
            };
            frame.1 += 1;
            let target = edges[slot].1;
            match state[target] {
                VisitState::Unvisited => {
                    state[target] = VisitState::Active;
                    stack.push((target, 0));
                }
                VisitState::Active => {
                    reversed.insert(slot);
                }
                VisitState::Done => {}
            }
        }
    }
    reversed
}

/// Longest-path ranking over an acyclic edge set; ties are released in input
/// order.
fn rank_assignment(node_count: usize, edges: &[(usize, usize)]) -> Vec<usize> {
    let mut ranks = vec![0_usize; node_count];
    let mut in_degree = vec![0_usize; node_count];
    let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); node_count];
    for &(source, target) in edges {
        in_degree[target] += 1;
        outgoing[source].push(target);
    }

    let mut heap: BinaryHeap<Reverse<usize>> = (0..node_count)
        .filter(|node| in_degree[*node] == 0)
        .map(Reverse)
        .collect();
    while let Some(Reverse(node)) = heap.pop() {
        let next_rank = ranks[node] + 1;
        for &target in &outgoing[node] {
            ranks[target] = ranks[target].max(next_rank);
            in_degree[target] -= 1;
            if in_degree[target] == 0 {
                heap.push(Reverse(target));
            }
        }
    }
    ranks
}

/// Layered graph where every edge spans exactly one rank; long edges are
/// split by zero-size dummy nodes appended after the real ones.
struct ProperGraph {
    widths: Vec<f64>,
    heights: Vec<f64>,
    real_count: usize,
    layers: Vec<Vec<usize>>,
    upper: Vec<Vec<usize>>,
    lower: Vec<Vec<usize>>,
}

impl ProperGraph {
    fn build(sizes: &[Size], ranks: &[usize], edges: &[(usize, usize)]) -> Self {
        let real_count = sizes.len();
        let mut graph = Self {
            widths: sizes.iter().map(|size| size.width).collect(),
            heights: sizes.iter().map(|size| size.height).collect(),
            real_count,
            layers: Vec::new(),
            upper: vec![Vec::new(); real_count],
            lower: vec![Vec::new(); real_count],
        };
        let mut all_ranks = ranks.to_vec();

        for &(source, target) in edges {
            let mut previous = source;
            for rank in ranks[source] + 1..ranks[target] {
                let dummy = graph.widths.len();
                graph.widths.push(0.0);
                graph.heights.push(0.0);
                graph.upper.push(Vec::new());
                graph.lower.push(Vec::new());
                all_ranks.push(rank);
                graph.link(previous, dummy);
                previous = dummy;
            }
            graph.link(previous, target);
        }

        let rank_count = all_ranks.iter().copied().max().map_or(0, |rank| rank + 1);
        graph.layers = vec![Vec::new(); rank_count];
        for (node, rank) in all_ranks.into_iter().enumerate() {
            graph.layers[rank].push(node);
        }
        graph
    }

    fn link(&mut self, upper: usize, lower: usize) {
        self.lower[upper].push(lower);
        self.upper[lower].push(upper);
    }

    fn is_dummy(&self, node: usize) -> bool {
        node >= self.real_count
    }

    fn positions(&self) -> Vec<usize> {
        let mut positions = vec![0; self.widths.len()];
        for layer in &self.layers {
            for (position, &node) in layer.iter().enumerate() {
                positions[node] = position;
            }
        }
        positions
    }

    fn pair_crossings(&self, rank: usize, positions: &[usize]) -> usize {
        let mut segments: Vec<(usize, usize)> = self.layers[rank]
            .iter()
            .flat_map(|&upper| {
                self.lower[upper]
                    .iter()
                    .map(move |&lower| (positions[upper], positions[lower]))
            })
            .collect();
        segments.sort_unstable();
        let mut targets: Vec<usize> = segments.into_iter().map(|(_, target)| target).collect();
        count_inversions(&mut targets)
    }

    fn total_crossings(&self) -> usize {
        let positions = self.positions();
        (0..self.layers.len().saturating_sub(1))
            .map(|rank| self.pair_crossings(rank, &positions))
            .sum()
    }

    fn local_crossings(&self, rank: usize) -> usize {
        let positions = self.positions();
        let mut crossings = 0;
        if rank > 0 {
            crossings += self.pair_crossings(rank - 1, &positions);
        }
        if rank + 1 < self.layers.len() {
            crossings += self.pair_crossings(rank, &positions);
        }
        crossings
    }

    /// Barycenter sweeps, keeping the best ordering seen.
    fn crossing_minimization(&mut self) -> usize {
        let mut best_count = self.total_crossings();
        if self.layers.len() <= 1 || best_count == 0 {
            return best_count;
        }
        let mut best_layers = self.layers.clone();

        for _ in 0..4 {
            for rank in 1..self.layers.len() {
                self.reorder_by_barycenter(rank, true);
            }
            for rank in (0..self.layers.len() - 1).rev() {
                self.reorder_by_barycenter(rank, false);
            }
            let count = self.total_crossings();
            if count < best_count {
                best_count = count;
                best_layers = self.layers.clone();
            }
            if best_count == 0 {
                break;
            }
        }

        self.layers = best_layers;
        best_count
    }

    fn reorder_by_barycenter(&mut self, rank: usize, use_upper: bool) {
        let positions = self.positions();
        let neighbors = if use_upper { &self.upper } else { &self.lower };
        let mut scored: Vec<(usize, f64, usize)> = self.layers[rank]
            .iter()
            .enumerate()
            .map(|(stable_index, &node)| {
                let adjacent = &neighbors[node];
                let barycenter = if adjacent.is_empty() {
                    stable_index as f64
                } else {
                    adjacent
                        .iter()
                        .map(|&neighbor| positions[neighbor] as f64)
                        .sum::<f64>()
                        / adjacent.len() as f64
                };
                (node, barycenter, stable_index)
            })
            .collect();
        scored.sort_by(|left, right| left.1.total_cmp(&right.1).then(left.2.cmp(&right.2)));
        self.layers[rank] = scored.into_iter().map(|(node, _, _)| node).collect();
    }

    /// Swap adjacent nodes while that lowers the crossings around their rank.
    fn crossing_refinement(&mut self, mut best: usize) -> usize {
        for _pass in 0..10 {
            if best == 0 {
                break;
            }
            let mut improved = false;
            for rank in 0..self.layers.len() {
                for index in 0..self.layers[rank].len().saturating_sub(1) {
                    let before = self.local_crossings(rank);
                    self.layers[rank].swap(index, index + 1);
                    let after = self.local_crossings(rank);
                    if after < before {
                        best = best.saturating_sub(before - after);
                        improved = true;
                    } else {
                        self.layers[rank].swap(index, index + 1);
                    }
                }
            }
            if !improved {
                break;
            }
        }
        best
    }

    fn separation(&self, left: usize, right: usize, spacing: &LayoutSpacing) -> f64 {
        let gap = if self.is_dummy(left) || self.is_dummy(right) {
            spacing.node_spacing / 2.0
        } else {
            spacing.node_spacing
        };
        (self.widths[left] + self.widths[right]) / 2.0 + gap
    }

    /// Center coordinates for every node, dummies included.
    fn coordinate_assignment(&self, spacing: &LayoutSpacing) -> Vec<Point> {
        let node_total = self.widths.len();
        let mut x = vec![0.0_f64; node_total];
        let mut y = vec![0.0_f64; node_total];

        let mut top = 0.0_f64;
        for layer in &self.layers {
            let height = layer
                .iter()
                .map(|&node| self.heights[node])
                .fold(0.0_f64, f64::max);
            for &node in layer {
                y[node] = top + height / 2.0;
            }
            top += height + spacing.rank_spacing;
        }

        for layer in &self.layers {
            let mut previous: Option<usize> = None;
            for &node in layer {
                x[node] = match previous {
                    Some(left) => x[left] + self.separation(left, node, spacing),
                    None => self.widths[node] / 2.0,
                };
                previous = Some(node);
            }
        }

        for _ in 0..8 {
            for rank in 1..self.layers.len() {
                self.align_layer(rank, &self.upper, &mut x, spacing);
            }
            for rank in (0..self.layers.len().saturating_sub(1)).rev() {
                self.align_layer(rank, &self.lower, &mut x, spacing);
            }
        }

        let shift = if self.real_count == 0 {
            0.0
        } else {
            (0..self.real_count)
                .map(|node| x[node] - self.widths[node] / 2.0)
                .fold(f64::MAX, f64::min)
        };
        (0..node_total)
            .map(|node| Point::new(x[node] - shift, y[node]))
            .collect()
    }

    /// Pull each node of `rank` toward the mean of its neighbors while
    /// keeping order and separation. The result is the midpoint of a
    /// left-packed and a right-packed placement, both feasible.
    fn align_layer(
        &self,
        rank: usize,
        neighbors: &[Vec<usize>],
        x: &mut [f64],
        spacing: &LayoutSpacing,
    ) {
        let layer = &self.layers[rank];
        if layer.is_empty() {
            return;
        }
        let desired: Vec<f64> = layer
            .iter()
            .map(|&node| {
                let adjacent = &neighbors[node];
                if adjacent.is_empty() {
                    x[node]
                } else {
                    adjacent.iter().map(|&neighbor| x[neighbor]).sum::<f64>() / adjacent.len() as f64
                }
            })
            .collect();

        let mut pushed_right = desired.clone();
        for index in 1..layer.len() {
            let gap = self.separation(layer[index - 1], layer[index], spacing);
            pushed_right[index] = pushed_right[index].max(pushed_right[index - 1] + gap);
        }
        let mut pushed_left = desired;
        for index in (0..layer.len() - 1).rev() {
            let gap = self.separation(layer[index], layer[index + 1], spacing);
            pushed_left[index] = pushed_left[index].min(pushed_left[index + 1] - gap);
        }
        for (index, &node) in layer.iter().enumerate() {
            x[node] = (pushed_right[index] + pushed_left[index]) / 2.0;
        }
    }
}

fn count_inversions(values: &mut [usize]) -> usize {
    if values.len() <= 1 {
        return 0;
    }

    let mid = values.len() / 2;
    let mut inversions = count_inversions(&mut values[..mid]);
    inversions += count_inversions(&mut values[mid..]);

    let mut merged = Vec::with_capacity(values.len());
    let (left, right) = values.split_at(mid);
    let mut left_index = 0;
    let mut right_index = 0;
    while left_index < left.len() && right_index < right.len() {
        if left[left_index] <= right[right_index] {
            merged.push(left[left_index]);
            left_index += 1;
        } else {
            merged.push(right[right_index]);
            inversions += left.len() - left_index;
            right_index += 1;
        }
    }
    merged.extend_from_slice(&left[left_index..]);
    merged.extend_from_slice(&right[right_index..]);
    values.copy_from_slice(&merged);
    inversions
}
