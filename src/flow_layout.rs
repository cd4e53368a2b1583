//! Layered left-to-right layout for material-flow (Sankey) diagrams.
//!
//! The whole layout is recomputed from the graph and the viewport on every
//! call. Output coordinates use a y-down convention: `Rect::min().y` is the top
//! of a node.

use geo::{Coord, LineString, Rect};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;
use tracing::debug;

use crate::data::FlowGraph;

/// Drawing extent the layout is fitted into.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Viewport {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Extent of a `width` x `height` surface, inset 1 unit left/right and 5 top/bottom.
    pub fn inset(width: f64, height: f64) -> Self {
        Self::new(1.0, 5.0, width - 1.0, height - 5.0)
    }

    pub fn width(&self) -> f64 {
        (self.x1 - self.x0).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.y1 - self.y0).max(0.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LayoutConfig {
    /// Horizontal thickness of every node.
    pub node_width: f64,
    /// Vertical gap between stacked nodes of one layer.
    pub node_padding: f64,
    /// Smallest horizontal gap kept between adjacent layers.
    pub min_layer_gap: f64,
    /// Barycenter relaxation passes.
    pub iterations: usize,
    /// Floor for node heights and link thicknesses.
    pub min_thickness: f64,
    /// Polyline segments per link curve.
    pub curve_segments: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_width: 20.0,
            node_padding: 25.0,
            min_layer_gap: 8.0,
            iterations: 6,
            min_thickness: 1.0,
            curve_segments: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayoutError {
    #[error("link {link} references undeclared node {node:?}")]
    DanglingLink { link: usize, node: String },
    #[error("node {0:?} is declared more than once")]
    DuplicateNode(String),
    #[error("link {link} has invalid value {value}")]
    InvalidValue { link: usize, value: f64 },
    #[error("flow graph is not acyclic; cycle through {}", .nodes.join(", "))]
    Cycle { nodes: Vec<String> },
}

impl LayoutError {
    /// True for malformed references/values, false for cycles.
    pub fn is_integrity(&self) -> bool {
        !matches!(self, LayoutError::Cycle { .. })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LayoutNode {
    pub name: String,
    pub layer: usize,
    /// Throughput: max(incoming, outgoing).
    pub value: f64,
    pub incoming: f64,
    pub outgoing: f64,
    pub rect: Rect<f64>,
}

impl LayoutNode {
    pub fn center_y(&self) -> f64 {
        (self.rect.min().y + self.rect.max().y) / 2.0
    }
}

/// Cubic Bézier between two points with both control points on the
/// horizontal midline, so the curve leaves and enters horizontally.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CubicCurve {
    pub start: Coord<f64>,
    pub control1: Coord<f64>,
    pub control2: Coord<f64>,
    pub end: Coord<f64>,
}

impl CubicCurve {
    pub fn horizontal(start: Coord<f64>, end: Coord<f64>) -> Self {
        let mid = (start.x + end.x) / 2.0;
        Self {
            start,
            control1: Coord { x: mid, y: start.y },
            control2: Coord { x: mid, y: end.y },
            end,
        }
    }

    pub fn point_at(&self, t: f64) -> Coord<f64> {
        let u = 1.0 - t;
        let (a, b, c, d) = (u * u * u, 3.0 * u * u * t, 3.0 * u * t * t, t * t * t);
        Coord {
            x: a * self.start.x + b * self.control1.x + c * self.control2.x + d * self.end.x,
            y: a * self.start.y + b * self.control1.y + c * self.control2.y + d * self.end.y,
        }
    }

    pub fn to_line_string(&self, segments: usize) -> LineString<f64> {
        let segments = segments.max(1);
        let mut coords: Vec<Coord<f64>> = (0..segments)
            .map(|i| self.point_at(i as f64 / segments as f64))
            .collect();
        coords.push(self.end);
        LineString::new(coords)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LayoutLink {
    /// Index into `FlowLayout::nodes`.
    pub source: usize,
    pub target: usize,
    pub value: f64,
    pub thickness: f64,
    /// Band midline where the link leaves the source node.
    pub source_y: f64,
    /// Band midline where the link enters the target node.
    pub target_y: f64,
    pub curve: CubicCurve,
    pub path: LineString<f64>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlowLayout {
    /// Nodes in declaration order.
    pub nodes: Vec<LayoutNode>,
    /// Links in declaration order.
    pub links: Vec<LayoutLink>,
    /// Units of height per unit of flow.
    pub scale: f64,
    pub layers: usize,
}

impl FlowLayout {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, name: &str) -> Option<&LayoutNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Nodes of one layer, top to bottom.
    pub fn layer(&self, layer: usize) -> Vec<&LayoutNode> {
        let mut nodes: Vec<&LayoutNode> = self.nodes.iter().filter(|n| n.layer == layer).collect();
        nodes.sort_by(|a, b| a.rect.min().y.total_cmp(&b.rect.min().y));
        nodes
    }
}

/// A link with both endpoints resolved to node indices.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Edge {
    pub source: usize,
    pub target: usize,
    pub value: f64,
}

/// Resolves link endpoints and rejects malformed values.
pub fn validate(graph: &FlowGraph) -> Result<Vec<Edge>, LayoutError> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(graph.nodes.len());
    for (i, node) in graph.nodes.iter().enumerate() {
        if index.insert(node.name.as_str(), i).is_some() {
            return Err(LayoutError::DuplicateNode(node.name.clone()));
        }
    }

    let lookup = |link: usize, name: &str| {
        index.get(name).copied().ok_or_else(|| LayoutError::DanglingLink {
            link,
            node: name.to_string(),
        })
    };

    graph
        .links
        .iter()
        .enumerate()
        .map(|(i, link)| {
            let source = lookup(i, link.source.as_str())?;
            let target = lookup(i, link.target.as_str())?;
            if !link.value.is_finite() || link.value < 0.0 {
                return Err(LayoutError::InvalidValue { link: i, value: link.value });
            }
            Ok(Edge { source, target, value: link.value })
        })
        .collect()
}

/// Longest-path layering. Sources sit at layer 0; every edge goes from a
/// strictly lower to a strictly higher layer. On a cycle, returns the indices
/// of the nodes that lie on one.
pub fn assign_layers(node_count: usize, edges: &[Edge]) -> Result<Vec<usize>, Vec<usize>> {
    let mut indegree = vec![0usize; node_count];
    let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); node_count];
    for e in edges {
        indegree[e.target] += 1;
        outgoing[e.source].push(e.target);
    }

    let mut layer = vec![0usize; node_count];
    let mut queue: VecDeque<usize> = (0..node_count).filter(|&n| indegree[n] == 0).collect();
    let mut placed = 0;
    while let Some(n) = queue.pop_front() {
        placed += 1;
        for &t in &outgoing[n] {
            layer[t] = layer[t].max(layer[n] + 1);
            indegree[t] -= 1;
            if indegree[t] == 0 {
                queue.push_back(t);
            }
        }
    }

    if placed < node_count {
        let stuck: Vec<bool> = indegree.iter().map(|&d| d > 0).collect();
        return Err((0..node_count).filter(|&n| stuck[n] && on_cycle(n, &outgoing, &stuck)).collect());
    }
    Ok(layer)
}

/// True when `start` can reach itself through unordered nodes. Nodes that are
/// merely downstream of a cycle are left out.
fn on_cycle(start: usize, outgoing: &[Vec<usize>], stuck: &[bool]) -> bool {
    let mut seen = vec![false; outgoing.len()];
    let mut stack = vec![start];
    while let Some(n) = stack.pop() {
        for &t in &outgoing[n] {
            if t == start {
                return true;
            }
            if stuck[t] && !seen[t] {
                seen[t] = true;
                stack.push(t);
            }
        }
    }
    false
}

pub fn layout(graph: &FlowGraph, viewport: &Viewport, config: &LayoutConfig) -> Result<FlowLayout, LayoutError> {
    let edges = validate(graph)?;
    let n = graph.nodes.len();
    let layers = assign_layers(n, &edges).map_err(|stuck| LayoutError::Cycle {
        nodes: stuck.into_iter().map(|i| graph.nodes[i].name.clone()).collect(),
    })?;
    if n == 0 || edges.is_empty() {
        return Ok(FlowLayout::default());
    }

    let mut incoming = vec![0.0; n];
    let mut outgoing = vec![0.0; n];
    for e in &edges {
        outgoing[e.source] += e.value;
        incoming[e.target] += e.value;
    }
    let value: Vec<f64> = (0..n).map(|i| incoming[i].max(outgoing[i])).collect();

    let layer_count = layers.iter().copied().max().unwrap_or(0) + 1;
    let mut columns: Vec<Vec<usize>> = vec![Vec::new(); layer_count];
    for (i, &l) in layers.iter().enumerate() {
        columns[l].push(i);
    }

    // horizontal placement
    let step = if layer_count > 1 {
        ((viewport.width() - config.node_width) / (layer_count - 1) as f64)
            .max(config.node_width + config.min_layer_gap)
    } else {
        0.0
    };
    let x0: Vec<f64> = layers.iter().map(|&l| viewport.x0 + l as f64 * step).collect();

    // global value scale, fitted to the most crowded layer
    let widest = columns.iter().map(Vec::len).max().unwrap_or(1);
    let padding = if widest > 1 {
        config.node_padding.min(viewport.height() / (widest - 1) as f64)
    } else {
        config.node_padding
    };
    let scale = columns
        .iter()
        .filter_map(|c| {
            let total: f64 = c.iter().map(|&i| value[i]).sum();
            (total > 0.0).then(|| (viewport.height() - (c.len() - 1) as f64 * padding) / total)
        })
        .fold(f64::INFINITY, f64::min);
    let scale = if scale.is_finite() { scale.max(0.0) } else { 0.0 };

    // floored bands may outgrow the scaled value, so a node is as tall as its heavier band stack
    let thickness: Vec<f64> = edges.iter().map(|e| (e.value * scale).max(config.min_thickness)).collect();
    let mut band_in = vec![0.0; n];
    let mut band_out = vec![0.0; n];
    for (e, t) in edges.iter().zip(&thickness) {
        band_out[e.source] += t;
        band_in[e.target] += t;
    }
    let height: Vec<f64> = (0..n)
        .map(|i| (value[i] * scale).max(config.min_thickness).max(band_in[i]).max(band_out[i]))
        .collect();
    let mut y0 = vec![0.0; n];

    for column in &columns {
        let mut y = viewport.y0;
        for &i in column {
            y0[i] = y;
            y += height[i] + padding;
        }
        let spare = ((viewport.y1 - y + padding) / (column.len() + 1) as f64).max(0.0);
        for (k, &i) in column.iter().enumerate() {
            y0[i] += spare * (k + 1) as f64;
        }
    }

    let mut packer = Packer { viewport, padding, height: &height, y0: &mut y0 };
    for pass in 0..config.iterations {
        let alpha = 0.99f64.powi(pass as i32);
        for l in (0..layer_count.saturating_sub(1)).rev() {
            packer.relax(&mut columns[l], &edges, alpha, Side::Targets);
        }
        for l in 1..layer_count {
            packer.relax(&mut columns[l], &edges, alpha, Side::Sources);
        }
    }

    let nodes: Vec<LayoutNode> = (0..n)
        .map(|i| LayoutNode {
            name: graph.nodes[i].name.clone(),
            layer: layers[i],
            value: value[i],
            incoming: incoming[i],
            outgoing: outgoing[i],
            rect: Rect::new(
                Coord { x: x0[i], y: y0[i] },
                Coord { x: x0[i] + config.node_width, y: y0[i] + height[i] },
            ),
        })
        .collect();

    let links = link_geometry(&nodes, &edges, &thickness, config);

    debug!(
        nodes = nodes.len(),
        links = links.len(),
        layers = layer_count,
        scale,
        "computed flow layout"
    );

    Ok(FlowLayout { nodes, links, scale, layers: layer_count })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Side {
    Sources,
    Targets,
}

struct Packer<'a> {
    viewport: &'a Viewport,
    padding: f64,
    height: &'a [f64],
    y0: &'a mut [f64],
}

impl Packer<'_> {
    fn center(&self, i: usize) -> f64 {
        self.y0[i] + self.height[i] / 2.0
    }

    /// Pulls each node of `column` toward the value-weighted mean center of its
    /// neighbours on one side, then restacks the column.
    fn relax(&mut self, column: &mut [usize], edges: &[Edge], alpha: f64, side: Side) {
        for &i in column.iter() {
            let (mut weighted, mut weight) = (0.0, 0.0);
            for e in edges {
                let other = match side {
                    Side::Sources if e.target == i => e.source,
                    Side::Targets if e.source == i => e.target,
                    _ => continue,
                };
                weighted += self.center(other) * e.value;
                weight += e.value;
            }
            if weight > 0.0 {
                let dy = (weighted / weight - self.center(i)) * alpha;
                self.y0[i] += dy;
            }
        }
        column.sort_by(|&a, &b| self.y0[a].total_cmp(&self.y0[b]).then(a.cmp(&b)));
        self.resolve_collisions(column);
    }

    fn resolve_collisions(&mut self, column: &[usize]) {
        let mut y = self.viewport.y0;
        for &i in column {
            if y > self.y0[i] {
                self.y0[i] = y;
            }
            y = self.y0[i] + self.height[i] + self.padding;
        }

        let mut y = self.viewport.y1;
        for &i in column.iter().rev() {
            let overflow = self.y0[i] + self.height[i] - y;
            if overflow > 0.0 {
                self.y0[i] -= overflow;
            }
            y = self.y0[i] - self.padding;
        }
    }
}

fn link_geometry(nodes: &[LayoutNode], edges: &[Edge], thickness: &[f64], config: &LayoutConfig) -> Vec<LayoutLink> {
    let top = |i: usize| nodes[i].rect.min().y;

    // bands are stacked in the vertical order of the node at the far end
    let mut source_y = vec![0.0; edges.len()];
    let mut target_y = vec![0.0; edges.len()];
    for node in 0..nodes.len() {
        let mut out: Vec<usize> = (0..edges.len()).filter(|&k| edges[k].source == node).collect();
        out.sort_by(|&a, &b| top(edges[a].target).total_cmp(&top(edges[b].target)).then(a.cmp(&b)));
        let mut cursor = top(node);
        for k in out {
            source_y[k] = cursor + thickness[k] / 2.0;
            cursor += thickness[k];
        }

        let mut inc: Vec<usize> = (0..edges.len()).filter(|&k| edges[k].target == node).collect();
        inc.sort_by(|&a, &b| top(edges[a].source).total_cmp(&top(edges[b].source)).then(a.cmp(&b)));
        let mut cursor = top(node);
        for k in inc {
            target_y[k] = cursor + thickness[k] / 2.0;
            cursor += thickness[k];
        }
    }

    edges
        .iter()
        .enumerate()
        .map(|(k, e)| {
            let curve = CubicCurve::horizontal(
                Coord { x: nodes[e.source].rect.max().x, y: source_y[k] },
                Coord { x: nodes[e.target].rect.min().x, y: target_y[k] },
            );
            LayoutLink {
                source: e.source,
                target: e.target,
                value: e.value,
                thickness: thickness[k],
                source_y: source_y[k],
                target_y: target_y[k],
                path: curve.to_line_string(config.curve_segments),
                curve,
            }
        })
        .collect()
}
