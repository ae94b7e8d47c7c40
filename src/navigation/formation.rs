use bevy::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::config::FormationSettings;
use super::fixed_math::{FixedNum, FixedVec2, FixedVec3};
use super::intake::{PathRequestQueue, RequestSlot};
use super::steering::{inverse_square_repulsion, NavAgent};
use super::types::{AgentId, GroupId, PathStatus, RequestId};

/// A group's current shared target, taken from the group's own route.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupNavComponent {
    pub target_waypoint: Option<FixedVec2>,
    pub active: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavGroup {
    pub id: GroupId,
    /// Sorted by id; slot assignment follows this order.
    members: Vec<AgentId>,
    /// The group's own path request, if it has one.
    pub request: Option<RequestId>,
    pub nav: GroupNavComponent,
    /// Last nonzero direction from the member centroid to the target.
    pub heading: FixedVec2,
}

impl NavGroup {
    pub fn new(id: GroupId) -> Self {
        Self {
            id,
            members: Vec::new(),
            request: None,
            nav: GroupNavComponent::default(),
            heading: FixedVec2::new(FixedNum::ONE, FixedNum::ZERO),
        }
    }

    pub fn members(&self) -> &[AgentId] {
        &self.members
    }

    /// Returns `false` if the agent was already a member.
    pub fn add_member(&mut self, agent: AgentId) -> bool {
        match self.members.binary_search(&agent) {
            Ok(_) => false,
            Err(pos) => {
                self.members.insert(pos, agent);
                true
            }
        }
    }

    /// Turn to face `direction`; a zero direction keeps the old heading.
    fn face(&mut self, direction: FixedVec2) {
        let direction = direction.normalize();
        if !direction.is_zero() {
            self.heading = direction;
        }
    }

    pub fn remove_member(&mut self, agent: AgentId) -> bool {
        match self.members.binary_search(&agent) {
            Ok(pos) => {
                self.members.remove(pos);
                true
            }
            Err(_) => false,
        }
    }
}

/// Formation slots for `count` members in a wedge behind `target`.
///
/// Row `r` sits `r * spacing` behind the target along `heading` and holds
/// `r + 1` slots spread `spacing` apart, centered on the heading line. Slot 0
/// is the target itself.
pub fn wedge_slots(target: FixedVec2, heading: FixedVec2, count: usize, spacing: FixedNum) -> Vec<FixedVec2> {
    let forward = heading.normalize();
    let lateral = forward.perp();
    let half = FixedNum::from_num(0.5);

    let mut slots = Vec::with_capacity(count);
    let mut row = 0usize;
    while slots.len() < count {
        let back = forward * (spacing * FixedNum::from_num(row));
        for j in 0..=row {
            if slots.len() == count {
                break;
            }
            // Offset of slot j from the row center, in units of spacing
            let across = FixedNum::from_num(j) - FixedNum::from_num(row) * half;
            slots.push(target - back + lateral * (across * spacing));
        }
        row += 1;
    }
    slots
}

/// Counts for one formation pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FormationReport {
    pub steered_members: usize,
    pub advanced_targets: usize,
    pub completed_groups: usize,
}

/// Current target of a request's route: the end of the current strategic
/// segment, or the current local waypoint. `None` if there is no usable route.
fn route_target(slot: &mut RequestSlot) -> Option<FixedVec3> {
    if let Some(path) = slot.path.as_mut() {
        return path.current().map(|segment| segment.end);
    }
    if slot.result.status == PathStatus::Success {
        return slot.result.current().map(|waypoint| waypoint.position);
    }
    None
}

/// Step the route past its current target. Returns `false` once exhausted.
fn advance_route(slot: &mut RequestSlot) -> bool {
    match slot.path.as_mut() {
        Some(path) => path.advance(),
        None => slot.result.advance(),
    }
}

pub(crate) fn centroid(positions: &[FixedVec2]) -> Option<FixedVec2> {
    if positions.is_empty() {
        return None;
    }
    let sum = positions.iter().fold(FixedVec2::ZERO, |acc, &p| acc + p);
    Some(sum / FixedNum::from_num(positions.len()))
}

fn clamp_length(v: FixedVec2, max: FixedNum) -> FixedVec2 {
    if v.length() > max {
        v.normalize() * max
    } else {
        v
    }
}

/// Pull the target from the group's route, advance it once the members have
/// settled into formation around it, then steer every member.
///
/// Members farther than `near_radius` (plus their slot's offset) from the
/// target head straight for it at full speed. Nearer members move to their wedge slot, slowing as they reach
/// it, and push away from other members within `spacing`. An exhausted route
/// is invalidated and the group goes inactive until it is given a new one.
pub fn update_groups(
    groups: &mut [NavGroup],
    agents: &mut [NavAgent],
    agent_slots: &FxHashMap<AgentId, usize>,
    queue: &mut PathRequestQueue,
    settings: &FormationSettings,
    base_speed: FixedNum,
) -> FormationReport {
    let mut report = FormationReport::default();

    for group in groups.iter_mut() {
        let member_slots: Vec<usize> = group
            .members
            .iter()
            .filter_map(|id| agent_slots.get(id).copied())
            .collect();
        let positions: Vec<FixedVec2> = member_slots.iter().map(|&i| agents[i].position).collect();

        let Some(slot) = group.request.and_then(|id| queue.get_mut(id)) else {
            group.nav = GroupNavComponent::default();
            continue;
        };

        let center = centroid(&positions);
        let mut target = route_target(slot).map(|p| p.ground());
        if let (Some(current), Some(center)) = (target, center) {
            group.face(current - center);
            // Arrived once the members stand in formation around the target
            let formation = wedge_slots(current, group.heading, positions.len(), settings.spacing);
            let settled = centroid(&formation).unwrap_or(current);
            if center.distance(settled) <= settings.arrival_radius {
                report.advanced_targets += 1;
                if advance_route(slot) {
                    target = route_target(slot).map(|p| p.ground());
                    if let Some(next) = target {
                        group.face(next - center);
                    }
                } else {
                    if let Some(path) = slot.path.as_mut() {
                        path.invalidate();
                    }
                    target = None;
                    report.completed_groups += 1;
                    debug!("[FORMATION] Group {:?} reached the end of its route", group.id);
                }
            }
        }

        group.nav = GroupNavComponent {
            target_waypoint: target,
            active: target.is_some(),
        };

        let Some(target) = target else {
            for &i in &member_slots {
                agents[i].desired_velocity = FixedVec2::ZERO;
            }
            continue;
        };

        let formation = wedge_slots(target, group.heading, member_slots.len(), settings.spacing);
        for (k, &i) in member_slots.iter().enumerate() {
            let agent = &mut agents[i];
            let speed = base_speed * agent.speed_scalar;

            // Back rows stand farther out; widen the radius by the slot's offset
            let reach = settings.near_radius + formation[k].distance(target);
            agent.desired_velocity = if agent.position.distance(target) > reach {
                (target - agent.position).normalize() * speed
            } else {
                let others = positions
                    .iter()
                    .enumerate()
                    .filter(|&(m, _)| m != k)
                    .map(|(_, &p)| p);
                let push = inverse_square_repulsion(agent.position, others, settings.spacing);
                clamp_length(formation[k] - agent.position + push, speed)
            };
            report.steered_members += 1;
        }
    }

    report
}
