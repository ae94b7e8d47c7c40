//! Point-to-point A* over the local navigation graph.
//!
//! Scores and parent links live in `Vec`s indexed by [`NodeId`] and the open
//! set is a `BinaryHeap` with reversed ordering, ties broken by node id, so a
//! search is a pure function of graph state and inputs.
//!
//! The heuristic is Euclidean distance to the goal node. It is admissible
//! as long as edge costs are at least the geometric length of the edge;
//! graphs with cheaper-than-distance edges still get a valid (if not always
//! cheapest) path.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use bevy::prelude::*;
use fixedbitset::FixedBitSet;

use super::fixed_math::{FixedNum, FixedVec3};
use super::graph::LocalGraph;
use super::types::{FailureReason, LocomotionMode, NodeId, PathResult, Waypoint};

/// Entry in the open set (min-heap via reversed ordering).
#[derive(Clone, Copy, PartialEq, Eq)]
struct OpenEntry {
    f_score: FixedNum,
    node: NodeId,
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: smallest f_score is "greatest"
        other
            .f_score
            .cmp(&self.f_score)
            .then_with(|| other.node.0.cmp(&self.node.0))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Snap both endpoints to their nearest nodes and search between them.
///
/// Never panics: an empty graph reports `Failed(NoSnapNode)`, an
/// unreachable goal `Failed(SearchExhausted)`.
pub fn find_path(
    graph: &LocalGraph,
    start: FixedVec3,
    goal: FixedVec3,
    mode: LocomotionMode,
    max_iterations: usize,
) -> PathResult {
    let (Some(start_node), Some(goal_node)) = (graph.nearest_node(start), graph.nearest_node(goal)) else {
        return PathResult::failed(FailureReason::NoSnapNode);
    };
    find_path_between(graph, start_node, goal_node, mode, max_iterations)
}

/// A* between two known nodes.
pub fn find_path_between(
    graph: &LocalGraph,
    start: NodeId,
    goal: NodeId,
    mode: LocomotionMode,
    max_iterations: usize,
) -> PathResult {
    let n = graph.node_count();
    let (Some(start_data), Some(goal_data)) = (graph.node(start), graph.node(goal)) else {
        return PathResult::failed(FailureReason::NoSnapNode);
    };

    if start == goal {
        return PathResult::success(vec![Waypoint {
            node: start,
            position: start_data.position,
            cost: FixedNum::ZERO,
        }]);
    }

    let goal_pos = goal_data.position;
    let mut g_score = vec![FixedNum::MAX; n];
    let mut came_from: Vec<Option<NodeId>> = vec![None; n];
    let mut closed = FixedBitSet::with_capacity(n);

    g_score[start.0 as usize] = FixedNum::ZERO;
    let mut open = BinaryHeap::new();
    open.push(OpenEntry {
        f_score: start_data.position.distance(goal_pos),
        node: start,
    });

    let mut iterations = 0usize;
    while let Some(OpenEntry { node: current, .. }) = open.pop() {
        iterations += 1;
        if iterations > max_iterations {
            error!(
                "[PATHFINDING] A* exceeded max iterations ({}) - start {:?}, goal {:?}, {} nodes",
                max_iterations, start, goal, n
            );
            return PathResult::failed(FailureReason::SearchExhausted);
        }

        if current == goal {
            return PathResult::success(reconstruct_path(graph, &came_from, &g_score, goal));
        }

        let ci = current.0 as usize;
        if closed.contains(ci) {
            continue;
        }
        closed.insert(ci);
        let current_g = g_score[ci];

        for (edge_idx, neighbor) in graph.neighbors(current) {
            let edge = graph.edge(edge_idx);
            if !edge.allowed_modes.intersects(mode) {
                continue;
            }
            let ni = neighbor.0 as usize;
            let Some(neighbor_data) = graph.node(neighbor) else {
                continue;
            };
            if neighbor_data.obstacle || closed.contains(ni) {
                continue;
            }

            let tentative_g = current_g + edge.cost + neighbor_data.base_cost;
            if tentative_g < g_score[ni] {
                g_score[ni] = tentative_g;
                came_from[ni] = Some(current);
                open.push(OpenEntry {
                    f_score: tentative_g + neighbor_data.position.distance(goal_pos),
                    node: neighbor,
                });
            }
        }
    }

    PathResult::failed(FailureReason::SearchExhausted)
}

fn reconstruct_path(
    graph: &LocalGraph,
    came_from: &[Option<NodeId>],
    g_score: &[FixedNum],
    goal: NodeId,
) -> Vec<Waypoint> {
    let mut waypoints = Vec::new();
    let mut current = Some(goal);
    while let Some(node) = current {
        let position = graph.node(node).map_or(FixedVec3::ZERO, |n| n.position);
        waypoints.push(Waypoint {
            node,
            position,
            cost: g_score[node.0 as usize],
        });
        current = came_from[node.0 as usize];
    }
    waypoints.reverse();
    waypoints
}

#[cfg(test)]
mod tests;
