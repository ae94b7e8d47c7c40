use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::navigation::error::{NavError, NavResult};
use crate::navigation::fixed_math::{FixedNum, FixedVec3};
use crate::navigation::types::{LocomotionMode, NodeId};

/// A point an agent can stand on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavNode {
    pub position: FixedVec3,
    /// Added to the cost of every edge entering this node.
    pub base_cost: FixedNum,
    pub obstacle: bool,
}

/// Connection between two local nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub cost: FixedNum,
    pub allowed_modes: LocomotionMode,
    pub bidirectional: bool,
}

impl NavEdge {
    /// The endpoint reached when leaving `node` along this edge.
    #[inline]
    pub fn other(&self, node: NodeId) -> NodeId {
        if self.from == node {
            self.to
        } else {
            self.from
        }
    }
}

/// Fine-grained navigation graph.
///
/// Built and maintained by the world; the navigation core only reads it.
/// Node and edge indices are dense and assigned in insertion order, so
/// iteration is deterministic. Edits go through
/// [`GraphHierarchy::edit_local`](super::GraphHierarchy::edit_local) so the
/// hierarchy version moves with them.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LocalGraph {
    nodes: Vec<NavNode>,
    edges: Vec<NavEdge>,
    /// Per node: indices of edges that can be left from it. A bidirectional
    /// edge is listed under both endpoints.
    adjacency: Vec<SmallVec<[u32; 6]>>,
}

impl LocalGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, position: FixedVec3, base_cost: FixedNum) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NavNode { position, base_cost, obstacle: false });
        self.adjacency.push(SmallVec::new());
        id
    }

    pub fn add_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        cost: FixedNum,
        allowed_modes: LocomotionMode,
        bidirectional: bool,
    ) -> NavResult<usize> {
        for id in [from, to] {
            if id.0 as usize >= self.nodes.len() {
                return Err(NavError::MissingNode(id));
            }
        }

        let idx = self.edges.len();
        self.edges.push(NavEdge { from, to, cost, allowed_modes, bidirectional });
        self.adjacency[from.0 as usize].push(idx as u32);
        if bidirectional && from != to {
            self.adjacency[to.0 as usize].push(idx as u32);
        }
        Ok(idx)
    }

    pub fn set_obstacle(&mut self, id: NodeId, obstacle: bool) -> NavResult<()> {
        let node = self.nodes.get_mut(id.0 as usize).ok_or(NavError::MissingNode(id))?;
        node.obstacle = obstacle;
        Ok(())
    }

    pub fn node(&self, id: NodeId) -> Option<&NavNode> {
        self.nodes.get(id.0 as usize)
    }

    pub fn nodes(&self) -> &[NavNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[NavEdge] {
        &self.edges
    }

    pub fn edge(&self, idx: usize) -> &NavEdge {
        &self.edges[idx]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// `(edge index, neighbour)` pairs reachable from `id` in one step.
    pub fn neighbors(&self, id: NodeId) -> impl Iterator<Item = (usize, NodeId)> + '_ {
        self.adjacency
            .get(id.0 as usize)
            .into_iter()
            .flat_map(|edges| edges.iter())
            .map(move |&e| (e as usize, self.edges[e as usize].other(id)))
    }

    /// Closest non-obstacle node by squared Euclidean distance.
    ///
    /// Linear scan over every node: fine for bounded local graphs, and the
    /// place to drop in a spatial index if graphs grow large. Ties go to the
    /// lower node id.
    pub fn nearest_node(&self, position: FixedVec3) -> Option<NodeId> {
        let mut best: Option<(FixedNum, NodeId)> = None;
        for (i, node) in self.nodes.iter().enumerate() {
            if node.obstacle {
                continue;
            }
            let dist_sq = node.position.distance_squared(position);
            if best.map_or(true, |(d, _)| dist_sq < d) {
                best = Some((dist_sq, NodeId(i as u32)));
            }
        }
        best.map(|(_, id)| id)
    }
}
