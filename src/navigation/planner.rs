//! Multi-modal route planner.
//!
//! For every strategic request a transient meta-graph is assembled from the
//! region and transit graphs, costed through the requester's
//! [`NavPreference`], and searched with A*. The meta-path is then flattened
//! into [`NavPathSegment`]s.
//!
//! Meta-edges come in three flavours:
//! - region → region: the region edge's cost, copied
//! - stop → stop: the transport leg, costed by the preference profile
//! - region ↔ stop: access walk between a stop and the region holding it,
//!   costed by Euclidean distance, plus the stop's boarding cost when
//!   walking onto the stop

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};

use bevy::prelude::*;
use fixedbitset::FixedBitSet;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::fixed_math::{FixedNum, FixedVec3};
use super::graph::GraphHierarchy;
use super::path::{NavDomain, NavPath, NavPathSegment, SegmentEstimate, SegmentKind};
use super::preference::NavPreference;
use super::types::{FailureReason, RegionId, RequestId, Requester, TransitId, TransportRef};

/// Identity of a meta-graph node in the underlying graphs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetaNodeKind {
    Region(RegionId),
    Transit(TransitId),
}

#[derive(Clone, Copy, Debug)]
pub struct MetaNode {
    pub kind: MetaNodeKind,
    pub position: FixedVec3,
}

#[derive(Clone, Copy, Debug)]
pub struct MetaEdge {
    pub to: usize,
    /// Preference-weighted cost used by the search.
    pub cost: FixedNum,
    pub kind: SegmentKind,
    pub transport: Option<TransportRef>,
    pub estimate: SegmentEstimate,
}

/// Meta-graph for one requester's preference profile.
#[derive(Clone, Debug, Default)]
pub struct MetaGraph {
    nodes: Vec<MetaNode>,
    adjacency: Vec<SmallVec<[MetaEdge; 6]>>,
    /// Minimum cost per unit of straight-line length over all edges.
    heuristic_scale: FixedNum,
}

impl MetaGraph {
    pub fn build(hierarchy: &GraphHierarchy, preference: &NavPreference) -> Self {
        let mut graph = MetaGraph::default();
        let mut region_slot = BTreeMap::new();
        let mut transit_slot = FxHashMap::default();

        for region in hierarchy.regions().nodes() {
            region_slot.insert(region.id, graph.push_node(MetaNodeKind::Region(region.id), region.center));
        }
        for stop in hierarchy.transit().nodes() {
            transit_slot.insert(stop.id, graph.push_node(MetaNodeKind::Transit(stop.id), stop.position));
        }

        for edge in hierarchy.regions().edges() {
            let (Some(&from), Some(&to)) = (region_slot.get(&edge.from), region_slot.get(&edge.to)) else {
                continue;
            };
            graph.push_edge(from, to, edge.cost, SegmentKind::RegionMove, None, SegmentEstimate::default(), edge.bidirectional);
        }

        let mut skipped_paid = 0usize;
        for edge in hierarchy.transit().edges() {
            if !preference.permits(edge.payment_required) {
                skipped_paid += 1;
                continue;
            }
            let (Some(&from), Some(&to)) = (transit_slot.get(&edge.from), transit_slot.get(&edge.to)) else {
                continue;
            };
            let cost = preference.estimate_cost(&edge.estimate);
            graph.push_edge(
                from,
                to,
                cost,
                SegmentKind::UseTransport,
                Some(edge.transport),
                edge.estimate,
                edge.bidirectional,
            );
        }

        for stop in hierarchy.transit().nodes() {
            let Some(region) = stop.region else {
                continue;
            };
            let (Some(&stop_idx), Some(&region_idx)) = (transit_slot.get(&stop.id), region_slot.get(&region)) else {
                continue;
            };
            let walk = graph.nodes[stop_idx].position.distance(graph.nodes[region_idx].position);
            // Boarding is paid on the way in only
            graph.push_edge(
                region_idx,
                stop_idx,
                walk + stop.base_cost,
                SegmentKind::LocalMove,
                None,
                SegmentEstimate::default(),
                false,
            );
            graph.push_edge(stop_idx, region_idx, walk, SegmentKind::LocalMove, None, SegmentEstimate::default(), false);
        }

        graph.heuristic_scale = graph.min_cost_per_length();
        if skipped_paid > 0 {
            debug!("[PLANNER] Meta-graph skipped {} paid transit legs", skipped_paid);
        }
        graph
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(|edges| edges.len()).sum()
    }

    pub fn node(&self, idx: usize) -> Option<&MetaNode> {
        self.nodes.get(idx)
    }

    pub fn edges_from(&self, idx: usize) -> &[MetaEdge] {
        self.adjacency.get(idx).map(|edges| edges.as_slice()).unwrap_or(&[])
    }

    pub fn heuristic_scale(&self) -> FixedNum {
        self.heuristic_scale
    }

    /// Meta-node closest to a position. Ties go to the lower index.
    pub fn nearest(&self, position: FixedVec3) -> Option<usize> {
        let mut best: Option<(FixedNum, usize)> = None;
        for (i, node) in self.nodes.iter().enumerate() {
            let dist_sq = node.position.distance_squared(position);
            if best.map_or(true, |(d, _)| dist_sq < d) {
                best = Some((dist_sq, i));
            }
        }
        best.map(|(_, i)| i)
    }

    fn push_node(&mut self, kind: MetaNodeKind, position: FixedVec3) -> usize {
        self.nodes.push(MetaNode { kind, position });
        self.adjacency.push(SmallVec::new());
        self.nodes.len() - 1
    }

    #[allow(clippy::too_many_arguments)]
    fn push_edge(
        &mut self,
        from: usize,
        to: usize,
        cost: FixedNum,
        kind: SegmentKind,
        transport: Option<TransportRef>,
        estimate: SegmentEstimate,
        bidirectional: bool,
    ) {
        self.adjacency[from].push(MetaEdge { to, cost, kind, transport, estimate });
        if bidirectional {
            self.adjacency[to].push(MetaEdge { to: from, cost, kind, transport, estimate });
        }
    }

    /// Scale that keeps `distance * scale` a lower bound on any path cost.
    fn min_cost_per_length(&self) -> FixedNum {
        let mut scale: Option<FixedNum> = None;
        for (from, edges) in self.adjacency.iter().enumerate() {
            for edge in edges {
                let length = self.nodes[from].position.distance(self.nodes[edge.to].position);
                if length == FixedNum::ZERO {
                    continue;
                }
                let ratio = (edge.cost / length).max(FixedNum::ZERO);
                scale = Some(scale.map_or(ratio, |s| s.min(ratio)));
            }
        }
        scale.unwrap_or(FixedNum::ZERO)
    }

    /// A* between two meta-nodes. Returns the node sequence and the edge
    /// taken into each node after the first.
    pub fn search(&self, start: usize, goal: usize, max_iterations: usize) -> Result<MetaRoute, FailureReason> {
        let n = self.nodes.len();
        if start >= n || goal >= n {
            return Err(FailureReason::NoSnapNode);
        }
        if start == goal {
            return Ok(MetaRoute { nodes: vec![start], edges: Vec::new(), cost: FixedNum::ZERO });
        }

        let goal_pos = self.nodes[goal].position;
        let heuristic = |idx: usize| self.nodes[idx].position.distance(goal_pos) * self.heuristic_scale;

        let mut g_score = vec![FixedNum::MAX; n];
        let mut came_from: Vec<Option<(usize, MetaEdge)>> = vec![None; n];
        let mut closed = FixedBitSet::with_capacity(n);
        let mut open = BinaryHeap::new();

        g_score[start] = FixedNum::ZERO;
        open.push(MetaEntry { f_score: heuristic(start), node: start });

        let mut iterations = 0usize;
        while let Some(MetaEntry { node: current, .. }) = open.pop() {
            iterations += 1;
            if iterations > max_iterations {
                error!(
                    "[PLANNER] Meta A* exceeded max iterations ({}) - {} meta-nodes",
                    max_iterations, n
                );
                return Err(FailureReason::SearchExhausted);
            }
            if current == goal {
                return Ok(self.reconstruct(&came_from, goal, g_score[goal]));
            }
            if closed.contains(current) {
                continue;
            }
            closed.insert(current);

            for edge in &self.adjacency[current] {
                if closed.contains(edge.to) {
                    continue;
                }
                let tentative = g_score[current] + edge.cost;
                if tentative < g_score[edge.to] {
                    g_score[edge.to] = tentative;
                    came_from[edge.to] = Some((current, *edge));
                    open.push(MetaEntry { f_score: tentative + heuristic(edge.to), node: edge.to });
                }
            }
        }

        Err(FailureReason::NoRoute)
    }

    fn reconstruct(&self, came_from: &[Option<(usize, MetaEdge)>], goal: usize, cost: FixedNum) -> MetaRoute {
        let mut nodes = vec![goal];
        let mut edges = Vec::new();
        let mut current = goal;
        while let Some((parent, edge)) = came_from[current] {
            nodes.push(parent);
            edges.push(edge);
            current = parent;
        }
        nodes.reverse();
        edges.reverse();
        MetaRoute { nodes, edges, cost }
    }
}

/// Result of a meta-graph search. `edges[i]` leads from `nodes[i]` to `nodes[i + 1]`.
#[derive(Clone, Debug)]
pub struct MetaRoute {
    pub nodes: Vec<usize>,
    pub edges: Vec<MetaEdge>,
    pub cost: FixedNum,
}

#[derive(Clone, Copy, PartialEq, Eq)]
struct MetaEntry {
    f_score: FixedNum,
    node: usize,
}

impl Ord for MetaEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.f_score.cmp(&self.f_score).then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for MetaEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ============================================================================
// Planning entry point
// ============================================================================

/// Plan a long-range route for one request.
///
/// The returned path starts with a walk from `start` to the first meta-node
/// and ends with a walk from the last meta-node to `goal` (omitted when
/// zero-length). `total_cost` is the sum of every segment re-costed through
/// `preference`.
pub fn plan_route(
    hierarchy: &GraphHierarchy,
    owner: Requester,
    request: RequestId,
    start: FixedVec3,
    goal: FixedVec3,
    preference: &NavPreference,
    max_iterations: usize,
) -> Result<NavPath, FailureReason> {
    let meta = MetaGraph::build(hierarchy, preference);
    let (Some(from), Some(to)) = (meta.nearest(start), meta.nearest(goal)) else {
        debug!("[PLANNER] {:?}: empty meta-graph", owner);
        return Err(FailureReason::NoSnapNode);
    };

    let route = meta.search(from, to, max_iterations)?;

    let mut segments = Vec::with_capacity(route.edges.len() + 2);
    push_walk(&mut segments, start, meta.nodes[from].position);
    for (i, edge) in route.edges.iter().enumerate() {
        let a = meta.nodes[route.nodes[i]].position;
        let b = meta.nodes[route.nodes[i + 1]].position;
        if edge.kind == SegmentKind::LocalMove && a == b && edge.cost == FixedNum::ZERO {
            // Stop sits on its region's center and costs nothing to board
            continue;
        }
        segments.push(NavPathSegment {
            kind: edge.kind,
            domain: match edge.kind {
                SegmentKind::RegionMove => NavDomain::Region,
                SegmentKind::UseTransport => NavDomain::Transit,
                SegmentKind::LocalMove => NavDomain::Local,
            },
            transport: edge.transport,
            estimate: edge.estimate,
            start: a,
            end: b,
            base_cost: edge.cost,
            detail: Vec::new(),
            refined: false,
        });
    }
    push_walk(&mut segments, meta.nodes[to].position, goal);

    if segments.is_empty() {
        // Start, goal and the snapped meta-node all coincide
        push_walk_always(&mut segments, start, goal);
    }

    let total_cost = segments
        .iter()
        .fold(FixedNum::ZERO, |acc, segment| acc + preference.segment_cost(segment));

    debug!(
        "[PLANNER] {:?}: {} segments, cost {:.2}, route through {} of {} meta-nodes",
        owner,
        segments.len(),
        total_cost.to_num::<f32>(),
        route.nodes.len(),
        meta.node_count()
    );

    Ok(NavPath {
        owner,
        request,
        segments,
        current_segment: 0,
        total_cost,
        valid: true,
        graph_version: hierarchy.version(),
    })
}

fn push_walk(segments: &mut Vec<NavPathSegment>, from: FixedVec3, to: FixedVec3) {
    if from != to {
        push_walk_always(segments, from, to);
    }
}

fn push_walk_always(segments: &mut Vec<NavPathSegment>, from: FixedVec3, to: FixedVec3) {
    segments.push(NavPathSegment {
        kind: SegmentKind::LocalMove,
        domain: NavDomain::Local,
        transport: None,
        estimate: SegmentEstimate::default(),
        start: from,
        end: to,
        base_cost: from.distance(to),
        detail: Vec::new(),
        refined: false,
    });
}
