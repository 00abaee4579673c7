//! Layered placement of a parsed flowchart.
//!
//! Every subgraph is laid out as one block: its members are ranked by longest path (back
//! edges ignored) and ordered by barycenter sweeps, then the block takes a single slot in
//! its parent's ranking. Boxes therefore never cover nodes that are not inside them.

use super::config::{DiagramConfig, SecurityLevel};
use super::parse::{Direction, Endpoint, Flowchart, NodeShape};
use regex::Regex;
use std::collections::VecDeque;
use std::sync::OnceLock;

const NODE_PAD_X: f32 = 16.0;
const NODE_PAD_Y: f32 = 10.0;
const MIN_NODE_WIDTH: f32 = 60.0;
const NODE_GAP: f32 = 30.0;
const RANK_GAP: f32 = 70.0;
const CLUSTER_PAD: f32 = 16.0;
const CLUSTER_TITLE: f32 = 26.0;
const SELF_LOOP: f32 = 24.0;
const MARGIN: f32 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn right(&self) -> f32 { self.x + self.width }

    pub fn bottom(&self) -> f32 { self.y + self.height }

    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x && other.y >= self.y && other.right() <= self.right() && other.bottom() <= self.bottom()
    }

    fn translate(&mut self, dx: f32, dy: f32) {
        self.x += dx;
        self.y += dy;
    }

    /// Point where the segment from the center toward `target` leaves the rectangle.
    fn clip(&self, target: (f32, f32)) -> (f32, f32) {
        let (cx, cy) = self.center();
        let (dx, dy) = (target.0 - cx, target.1 - cy);
        if dx.abs() < f32::EPSILON && dy.abs() < f32::EPSILON {
            return (cx, cy);
        }
        let (hw, hh) = (self.width / 2.0, self.height / 2.0);
        let t = if dx.abs() * hh > dy.abs() * hw { hw / dx.abs() } else { hh / dy.abs() };
        (cx + dx * t, cy + dy * t)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeBox {
    pub rect: Rect,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterBox {
    pub subgraph: usize,
    pub rect: Rect,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgePath {
    pub edge: usize,
    pub points: Vec<(f32, f32)>,
    pub label_at: Option<(f32, f32)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub width: f32,
    pub height: f32,
    pub nodes: Vec<NodeBox>,
    /// Outermost first, so nested boxes paint on top.
    pub clusters: Vec<ClusterBox>,
    pub edges: Vec<EdgePath>,
}

impl Layout {
    pub fn cluster(&self, subgraph: usize) -> Option<&ClusterBox> {
        self.clusters.iter().find(|c| c.subgraph == subgraph)
    }
}

fn line_break() -> &'static Regex {
    static BR: OnceLock<Regex> = OnceLock::new();
    BR.get_or_init(|| Regex::new(r"(?i)<br\s*/?>").expect("line break pattern is valid"))
}

pub fn label_lines(label: &str, security: SecurityLevel) -> Vec<String> {
    match security {
        SecurityLevel::Strict => vec![label.to_string()],
        SecurityLevel::Loose => line_break().split(label).map(|l| l.trim().to_string()).collect(),
    }
}

pub fn text_width(text: &str, font_size: f32) -> f32 {
    text.chars().count() as f32 * font_size * 0.6
}

pub fn line_height(config: &DiagramConfig) -> f32 {
    config.font_size * 1.4
}

fn node_size(shape: NodeShape, lines: &[String], config: &DiagramConfig) -> (f32, f32) {
    let text_w = lines.iter().map(|l| text_width(l, config.font_size)).fold(0.0, f32::max);
    let text_h = lines.len().max(1) as f32 * line_height(config);
    let w = (text_w + 2.0 * NODE_PAD_X).max(MIN_NODE_WIDTH);
    let h = text_h + 2.0 * NODE_PAD_Y;
    match shape {
        NodeShape::Circle => {
            let d = w.max(h);
            (d, d)
        }
        NodeShape::DoubleCircle => {
            let d = w.max(h) + 10.0;
            (d, d)
        }
        NodeShape::Diamond => (w * 1.4 + 10.0, h * 1.6),
        NodeShape::Hexagon | NodeShape::Stadium | NodeShape::Asymmetric => (w + h / 2.0, h),
        NodeShape::Parallelogram
        | NodeShape::ParallelogramAlt
        | NodeShape::Trapezoid
        | NodeShape::TrapezoidAlt => (w + h * 0.6, h),
        NodeShape::Cylinder => (w, h + 14.0),
        NodeShape::Rect | NodeShape::Rounded | NodeShape::Subroutine => (w, h),
    }
}

/// A direct member of a container: a node, or a nested subgraph laid out as one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Item {
    Node(usize),
    Cluster(usize),
}

/// Longest-path layering over `links` between `n` items. Back edges found by a
/// depth-first walk are ignored so cycles still terminate.
fn assign_ranks(n: usize, links: &[(usize, usize)]) -> Vec<usize> {
    let mut successors = vec![Vec::new(); n];
    for &(a, b) in links {
        if a != b {
            successors[a].push(b);
        }
    }

    const NEW: u8 = 0;
    const ACTIVE: u8 = 1;
    const DONE: u8 = 2;
    let mut state = vec![NEW; n];
    let mut forward = vec![Vec::new(); n];
    for start in 0..n {
        if state[start] != NEW {
            continue;
        }
        state[start] = ACTIVE;
        let mut stack = vec![(start, 0usize)];
        while let Some(top) = stack.last_mut() {
            let (v, next) = *top;
            if next < successors[v].len() {
                top.1 += 1;
                let w = successors[v][next];
                match state[w] {
                    NEW => {
                        forward[v].push(w);
                        state[w] = ACTIVE;
                        stack.push((w, 0));
                    }
                    ACTIVE => {}
                    _ => forward[v].push(w),
                }
            } else {
                state[v] = DONE;
                stack.pop();
            }
        }
    }

    let mut indegree = vec![0usize; n];
    for targets in &forward {
        for &w in targets {
            indegree[w] += 1;
        }
    }
    let mut queue: VecDeque<usize> = (0..n).filter(|&v| indegree[v] == 0).collect();
    let mut rank = vec![0usize; n];
    while let Some(v) = queue.pop_front() {
        for &w in &forward[v] {
            rank[w] = rank[w].max(rank[v] + 1);
            indegree[w] -= 1;
            if indegree[w] == 0 {
                queue.push_back(w);
            }
        }
    }
    rank
}

const MAX_SWEEPS: usize = 8;

/// Reorder each rank by the mean position of its neighbours in the adjacent rank,
/// alternating downward and upward sweeps, and keep the order with the fewest crossings.
fn minimize_crossings(layers: &mut [Vec<usize>], adjacent: &[Vec<usize>]) {
    if layers.len() <= 1 {
        return;
    }
    let mut best = total_crossings(layers, adjacent);
    let mut best_order = layers.to_vec();
    for _ in 0..MAX_SWEEPS {
        if best == 0 {
            break;
        }
        for r in 1..layers.len() {
            barycenter_sweep(layers, r, r - 1, adjacent);
        }
        for r in (0..layers.len() - 1).rev() {
            barycenter_sweep(layers, r, r + 1, adjacent);
        }
        let crossings = total_crossings(layers, adjacent);
        if crossings >= best {
            break;
        }
        best = crossings;
        best_order = layers.to_vec();
    }
    layers.clone_from_slice(&best_order);
}

fn barycenter_sweep(layers: &mut [Vec<usize>], r: usize, reference: usize, adjacent: &[Vec<usize>]) {
    let fixed = layers[reference].clone();
    let mut scored: Vec<(usize, f32)> = layers[r]
        .iter()
        .enumerate()
        .map(|(pos, &v)| {
            let hits: Vec<usize> = adjacent[v].iter().filter_map(|nb| fixed.iter().position(|x| x == nb)).collect();
            // Items without neighbours there keep their slot.
            let score = if hits.is_empty() {
                pos as f32
            } else {
                hits.iter().sum::<usize>() as f32 / hits.len() as f32
            };
            (v, score)
        })
        .collect();
    scored.sort_by(|a, b| a.1.total_cmp(&b.1));
    layers[r] = scored.into_iter().map(|(v, _)| v).collect();
}

fn count_crossings(upper: &[usize], lower: &[usize], adjacent: &[Vec<usize>]) -> usize {
    let mut segments = Vec::new();
    for (i, &u) in upper.iter().enumerate() {
        for nb in &adjacent[u] {
            if let Some(j) = lower.iter().position(|x| x == nb) {
                segments.push((i, j));
            }
        }
    }
    let mut crossings = 0;
    for (k, &(a1, b1)) in segments.iter().enumerate() {
        for &(a2, b2) in &segments[k + 1..] {
            if (a1 < a2 && b1 > b2) || (a1 > a2 && b1 < b2) {
                crossings += 1;
            }
        }
    }
    crossings
}

fn total_crossings(layers: &[Vec<usize>], adjacent: &[Vec<usize>]) -> usize {
    layers.windows(2).map(|pair| count_crossings(&pair[0], &pair[1], adjacent)).sum()
}

/// Sizes and offsets of every node and subgraph, each relative to the content area of
/// the subgraph (or chart) directly holding it.
struct Arranger<'a> {
    chart: &'a Flowchart,
    config: &'a DiagramConfig,
    node_size: Vec<(f32, f32)>,
    node_at: Vec<(f32, f32)>,
    cluster_size: Vec<(f32, f32)>,
    cluster_at: Vec<(f32, f32)>,
    /// Where the member area starts inside the subgraph box.
    content_at: Vec<(f32, f32)>,
}

impl<'a> Arranger<'a> {
    fn new(chart: &'a Flowchart, config: &'a DiagramConfig, node_size: Vec<(f32, f32)>) -> Self {
        let clusters = chart.subgraphs.len();
        Self {
            chart,
            config,
            node_at: vec![(0.0, 0.0); node_size.len()],
            node_size,
            cluster_size: vec![(0.0, 0.0); clusters],
            cluster_at: vec![(0.0, 0.0); clusters],
            content_at: vec![(0.0, 0.0); clusters],
        }
    }

    fn members(&self, container: Option<usize>) -> Vec<Item> {
        let nodes = self.chart.nodes.iter().enumerate().filter(|(_, n)| n.subgraph == container);
        let clusters = self.chart.subgraphs.iter().enumerate().filter(|(_, s)| s.parent == container);
        nodes
            .map(|(i, _)| Item::Node(i))
            .chain(clusters.map(|(i, _)| Item::Cluster(i)))
            .collect()
    }

    /// The member of `container` that holds `endpoint`, if it lies inside `container`.
    fn lift(&self, endpoint: Endpoint, container: Option<usize>) -> Option<Item> {
        let (mut item, mut parent) = match endpoint {
            Endpoint::Node(n) => (Item::Node(n), self.chart.nodes[n].subgraph),
            Endpoint::Subgraph(s) => (Item::Cluster(s), self.chart.subgraphs[s].parent),
        };
        loop {
            if parent == container {
                return Some(item);
            }
            let p = parent?;
            item = Item::Cluster(p);
            parent = self.chart.subgraphs[p].parent;
        }
    }

    fn size(&self, item: Item) -> (f32, f32) {
        match item {
            Item::Node(n) => self.node_size[n],
            Item::Cluster(c) => self.cluster_size[c],
        }
    }

    fn set_at(&mut self, item: Item, at: (f32, f32)) {
        match item {
            Item::Node(n) => self.node_at[n] = at,
            Item::Cluster(c) => self.cluster_at[c] = at,
        }
    }

    /// Lay out the members of `container`, nested subgraphs first, and return the size of
    /// the area they occupy.
    fn arrange(&mut self, container: Option<usize>, direction: Direction) -> (f32, f32) {
        let chart = self.chart;
        let items = self.members(container);
        if items.is_empty() {
            return (0.0, 0.0);
        }

        for &item in &items {
            let Item::Cluster(c) = item else { continue };
            let sg = &chart.subgraphs[c];
            let (inner_w, inner_h) = self.arrange(Some(c), sg.direction.unwrap_or(direction));
            // Empty subgraphs still get a box so links to them have something to hit.
            let (inner_w, inner_h) = (inner_w.max(MIN_NODE_WIDTH), inner_h.max(line_height(self.config)));
            let title_w = text_width(&sg.title, self.config.font_size) + 2.0 * CLUSTER_PAD;
            let width = (inner_w + 2.0 * CLUSTER_PAD).max(title_w);
            self.cluster_size[c] = (width, inner_h + 2.0 * CLUSTER_PAD + CLUSTER_TITLE);
            self.content_at[c] = ((width - inner_w) / 2.0, CLUSTER_TITLE + CLUSTER_PAD);
        }

        let mut links = Vec::new();
        for edge in &chart.edges {
            let (Some(a), Some(b)) = (self.lift(edge.from, container), self.lift(edge.to, container)) else {
                continue;
            };
            if a == b {
                continue;
            }
            let index = |item: Item| items.iter().position(|&i| i == item);
            if let (Some(a), Some(b)) = (index(a), index(b)) {
                links.push((a, b));
            }
        }
        let mut adjacent = vec![Vec::new(); items.len()];
        for &(a, b) in &links {
            adjacent[a].push(b);
            adjacent[b].push(a);
        }

        let ranks = assign_ranks(items.len(), &links);
        let mut layers: Vec<Vec<usize>> = vec![Vec::new(); ranks.iter().max().map_or(0, |r| r + 1)];
        for (i, &rank) in ranks.iter().enumerate() {
            layers[rank].push(i);
        }
        minimize_crossings(&mut layers, &adjacent);

        let horizontal = direction.is_horizontal();
        let sizes: Vec<(f32, f32)> = items.iter().map(|&i| self.size(i)).collect();
        let main_size = |(w, h): (f32, f32)| if horizontal { w } else { h };
        let cross_size = |(w, h): (f32, f32)| if horizontal { h } else { w };

        let mut centers = vec![(0.0f32, 0.0f32); items.len()];
        let mut main = 0.0f32;
        let mut previous_extent = 0.0f32;
        for (r, layer) in layers.iter().enumerate() {
            let extent = layer.iter().map(|&i| main_size(sizes[i])).fold(0.0, f32::max);
            if r > 0 {
                main += previous_extent / 2.0 + RANK_GAP + extent / 2.0;
            }
            previous_extent = extent;

            let total = layer.iter().map(|&i| cross_size(sizes[i])).sum::<f32>()
                + NODE_GAP * layer.len().saturating_sub(1) as f32;
            let mut cursor = -total / 2.0;
            for &i in layer {
                let cross = cross_size(sizes[i]);
                let c = cursor + cross / 2.0;
                cursor += cross + NODE_GAP;
                centers[i] = match direction {
                    Direction::TB => (c, main),
                    Direction::BT => (c, -main),
                    Direction::LR => (main, c),
                    Direction::RL => (-main, c),
                };
            }
        }

        let mut min = (f32::MAX, f32::MAX);
        let mut max = (f32::MIN, f32::MIN);
        for (&(cx, cy), &(w, h)) in centers.iter().zip(&sizes) {
            min = (min.0.min(cx - w / 2.0), min.1.min(cy - h / 2.0));
            max = (max.0.max(cx + w / 2.0), max.1.max(cy + h / 2.0));
        }
        for (i, &item) in items.iter().enumerate() {
            let ((cx, cy), (w, h)) = (centers[i], sizes[i]);
            self.set_at(item, (cx - w / 2.0 - min.0, cy - h / 2.0 - min.1));
        }
        (max.0 - min.0, max.1 - min.1)
    }

    /// Turn relative offsets into absolute boxes, starting from the content area of
    /// `container` at `origin`.
    fn place(&self, container: Option<usize>, origin: (f32, f32), nodes: &mut [NodeBox], bounds: &mut [Rect]) {
        for item in self.members(container) {
            match item {
                Item::Node(n) => {
                    let ((x, y), (width, height)) = (self.node_at[n], self.node_size[n]);
                    nodes[n].rect = Rect { x: origin.0 + x, y: origin.1 + y, width, height };
                }
                Item::Cluster(c) => {
                    let ((x, y), (width, height)) = (self.cluster_at[c], self.cluster_size[c]);
                    let rect = Rect { x: origin.0 + x, y: origin.1 + y, width, height };
                    bounds[c] = rect;
                    let (dx, dy) = self.content_at[c];
                    self.place(Some(c), (rect.x + dx, rect.y + dy), nodes, bounds);
                }
            }
        }
    }
}

pub fn layout(chart: &Flowchart, config: &DiagramConfig) -> Layout {
    let mut nodes: Vec<NodeBox> = chart
        .nodes
        .iter()
        .map(|node| {
            let lines = label_lines(&node.label, config.security_level);
            let (w, h) = node_size(node.shape, &lines, config);
            NodeBox { rect: Rect { x: 0.0, y: 0.0, width: w, height: h }, lines }
        })
        .collect();

    let sizes = nodes.iter().map(|n| (n.rect.width, n.rect.height)).collect();
    let mut arranger = Arranger::new(chart, config, sizes);
    arranger.arrange(None, chart.direction);
    let mut bounds = vec![Rect { x: 0.0, y: 0.0, width: 0.0, height: 0.0 }; chart.subgraphs.len()];
    arranger.place(None, (0.0, 0.0), &mut nodes, &mut bounds);

    let mut order: Vec<usize> = (0..chart.subgraphs.len()).collect();
    order.sort_by_key(|&s| chart.depth(s));
    let mut clusters: Vec<ClusterBox> = order.into_iter().map(|s| ClusterBox { subgraph: s, rect: bounds[s] }).collect();

    let endpoint_rect = |endpoint: Endpoint| match endpoint {
        Endpoint::Node(i) => nodes[i].rect,
        Endpoint::Subgraph(s) => bounds[s],
    };
    let mut edges: Vec<EdgePath> = chart
        .edges
        .iter()
        .enumerate()
        .map(|(k, edge)| {
            let from = endpoint_rect(edge.from);
            let to = endpoint_rect(edge.to);
            if edge.from == edge.to {
                let (_, cy) = from.center();
                let (x, q) = (from.right(), from.height / 4.0);
                EdgePath {
                    edge: k,
                    points: vec![(x, cy - q), (x + SELF_LOOP, cy - q), (x + SELF_LOOP, cy + q), (x, cy + q)],
                    label_at: edge.label.as_ref().map(|_| (x + SELF_LOOP, cy)),
                }
            } else {
                let start = from.clip(to.center());
                let end = to.clip(from.center());
                EdgePath {
                    edge: k,
                    points: vec![start, end],
                    label_at: edge.label.as_ref().map(|_| ((start.0 + end.0) / 2.0, (start.1 + end.1) / 2.0)),
                }
            }
        })
        .collect();

    // Shift everything into positive space.
    let mut min = (f32::MAX, f32::MAX);
    let mut max = (f32::MIN, f32::MIN);
    let mut extend = |r: &Rect| {
        min = (min.0.min(r.x), min.1.min(r.y));
        max = (max.0.max(r.right()), max.1.max(r.bottom()));
    };
    nodes.iter().for_each(|n| extend(&n.rect));
    clusters.iter().for_each(|c| extend(&c.rect));
    for edge in &edges {
        for &(x, y) in &edge.points {
            extend(&Rect { x, y, width: 0.0, height: 0.0 });
        }
    }
    if min.0 > max.0 {
        return Layout { width: 2.0 * MARGIN, height: 2.0 * MARGIN, nodes, clusters, edges };
    }
    let (dx, dy) = (MARGIN - min.0, MARGIN - min.1);
    nodes.iter_mut().for_each(|n| n.rect.translate(dx, dy));
    clusters.iter_mut().for_each(|c| c.rect.translate(dx, dy));
    for edge in &mut edges {
        edge.points.iter_mut().for_each(|p| *p = (p.0 + dx, p.1 + dy));
        edge.label_at = edge.label_at.map(|(x, y)| (x + dx, y + dy));
    }

    Layout {
        width: max.0 - min.0 + 2.0 * MARGIN,
        height: max.1 - min.1 + 2.0 * MARGIN,
        nodes,
        clusters,
        edges,
    }
}
