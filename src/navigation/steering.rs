//! Flow-field following and local steering.
//!
//! Per agent, each tick:
//! - **Follow**: look up the flow cell under the agent on its layer and cache
//!   the direction if it is nonzero, so crossing into an unbuilt or blocked
//!   cell does not snap the agent to a standstill
//! - **Separation**: inverse-square push away from nearby agents
//! - **Avoidance**: inverse-square push away from nearby threats
//! - **Cohesion**: pull toward the centroid of nearby agents of the same kind
//!
//! The weighted sum is renormalized and scaled by `base_speed * speed_scalar`.
//!
//! Neighbour lists are gathered serially first; the per-agent pass then only
//! reads shared state and writes its own agent, so it runs on the rayon pool.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::config::SteeringSettings;
use super::fixed_math::{FixedNum, FixedVec2};
use super::flow_field::FlowFieldGrid;
use super::spatial_hash::SpatialQuery;
use super::types::{AgentId, GroupId, LayerId};

/// Agents only cohere with agents of the same kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentKind(pub u16);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavAgent {
    pub id: AgentId,
    /// Ground-plane position, written by the caller's movement layer.
    pub position: FixedVec2,
    pub kind: AgentKind,
    pub layer: LayerId,
    pub speed_scalar: FixedNum,
    /// Set for group members; the formation phase steers them instead.
    pub group: Option<GroupId>,
    pub cached_direction: FixedVec2,
    pub desired_velocity: FixedVec2,
}

impl NavAgent {
    pub fn new(id: AgentId, position: FixedVec2, layer: LayerId) -> Self {
        Self {
            id,
            position,
            kind: AgentKind::default(),
            layer,
            speed_scalar: FixedNum::ONE,
            group: None,
            cached_direction: FixedVec2::ZERO,
            desired_velocity: FixedVec2::ZERO,
        }
    }
}

/// Per-agent neighbour indices, gathered once per tick.
#[derive(Clone, Debug, Default)]
pub struct NeighborCache {
    pub agents: Vec<SmallVec<[usize; 8]>>,
    pub threats: Vec<SmallVec<[usize; 4]>>,
}

/// Closest agents (up to `max_neighbors`) and every threat in range, for
/// each agent. Agent lists are ordered by distance, ties by index.
pub fn gather_neighbors(
    agents: &[NavAgent],
    agent_index: &impl SpatialQuery,
    threats: &[FixedVec2],
    threat_index: &impl SpatialQuery,
    settings: &SteeringSettings,
) -> NeighborCache {
    let mut cache = NeighborCache {
        agents: Vec::with_capacity(agents.len()),
        threats: Vec::with_capacity(agents.len()),
    };
    let mut scratch = Vec::new();

    for (i, agent) in agents.iter().enumerate() {
        agent_index.query_radius(agent.position, settings.neighbor_radius, Some(i), &mut scratch);
        let mut with_dist: SmallVec<[(FixedNum, usize); 16]> = scratch
            .iter()
            .filter_map(|&j| agents.get(j).map(|other| (other.position.distance_squared(agent.position), j)))
            .collect();
        with_dist.sort_unstable();
        cache
            .agents
            .push(with_dist.into_iter().take(settings.max_neighbors).map(|(_, j)| j).collect());

        if threats.is_empty() {
            cache.threats.push(SmallVec::new());
        } else {
            threat_index.query_radius(agent.position, settings.avoidance_radius, None, &mut scratch);
            cache.threats.push(scratch.iter().copied().collect());
        }
    }
    cache
}

/// Refresh the agent's cached flow direction from the grid and return it.
pub fn follow_flow(agent: &mut NavAgent, grid: &FlowFieldGrid) -> FixedVec2 {
    if let Some(cell) = grid.sample(agent.layer, agent.position) {
        if cell.layer == agent.layer && !cell.direction.is_zero() {
            agent.cached_direction = cell.direction;
        }
    }
    agent.cached_direction
}

/// Inverse-square repulsion from every point within `radius`.
///
/// Distances are floored so coincident points push with a bounded force
/// instead of overflowing.
pub fn inverse_square_repulsion(
    position: FixedVec2,
    others: impl IntoIterator<Item = FixedVec2>,
    radius: FixedNum,
) -> FixedVec2 {
    let radius_sq = radius * radius;
    let min_dist_sq = FixedNum::from_num(0.25);
    let mut accum = FixedVec2::ZERO;
    for other in others {
        let diff = position - other;
        let dist_sq = diff.length_squared();
        if dist_sq > radius_sq || dist_sq == FixedNum::ZERO {
            continue;
        }
        accum = accum + diff.normalize() / dist_sq.max(min_dist_sq);
    }
    accum
}

/// Unit vector toward the centroid of `others`, or zero.
pub fn cohesion(position: FixedVec2, others: impl IntoIterator<Item = FixedVec2>) -> FixedVec2 {
    let mut sum = FixedVec2::ZERO;
    let mut count = 0i64;
    for other in others {
        sum = sum + other;
        count += 1;
    }
    if count == 0 {
        return FixedVec2::ZERO;
    }
    let centroid = sum / FixedNum::from_num(count);
    (centroid - position).normalize()
}

/// Position and kind of every agent at the start of the steering pass.
#[derive(Clone, Copy, Debug)]
struct AgentSnapshot {
    position: FixedVec2,
    kind: AgentKind,
}

fn blend(
    agent: &NavAgent,
    flow: FixedVec2,
    snapshot: &[AgentSnapshot],
    neighbors: &[usize],
    threats: &[FixedVec2],
    threat_neighbors: &[usize],
    settings: &SteeringSettings,
) -> FixedVec2 {
    let separation = inverse_square_repulsion(
        agent.position,
        neighbors.iter().map(|&j| snapshot[j].position),
        settings.separation_radius,
    );
    let avoidance = inverse_square_repulsion(
        agent.position,
        threat_neighbors.iter().filter_map(|&t| threats.get(t).copied()),
        settings.avoidance_radius,
    );
    let together = cohesion(
        agent.position,
        neighbors
            .iter()
            .filter(|&&j| snapshot[j].kind == agent.kind)
            .map(|&j| snapshot[j].position),
    );

    let steer = flow * settings.flow_weight
        + separation * settings.separation_weight
        + avoidance * settings.avoidance_weight
        + together * settings.cohesion_weight;

    steer.normalize() * settings.base_speed * agent.speed_scalar
}

/// Follow + steer every agent that is not in a group.
///
/// Returns the number of agents steered.
pub fn steer_agents(
    agents: &mut [NavAgent],
    grid: &FlowFieldGrid,
    neighbors: &NeighborCache,
    threats: &[FixedVec2],
    settings: &SteeringSettings,
) -> usize {
    let snapshot: Vec<AgentSnapshot> = agents
        .iter()
        .map(|a| AgentSnapshot { position: a.position, kind: a.kind })
        .collect();

    agents
        .par_iter_mut()
        .enumerate()
        .filter(|(_, agent)| agent.group.is_none())
        .map(|(i, agent)| {
            let flow = follow_flow(agent, grid);
            let agent_neighbors = neighbors.agents.get(i).map(|n| n.as_slice()).unwrap_or(&[]);
            let threat_neighbors = neighbors.threats.get(i).map(|n| n.as_slice()).unwrap_or(&[]);
            agent.desired_velocity = blend(agent, flow, &snapshot, agent_neighbors, threats, threat_neighbors, settings);
            1usize
        })
        .sum()
}

#[cfg(test)]
mod tests;
