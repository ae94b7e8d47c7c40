//! The navigation context and its tick.
//!
//! [`NavWorld`] owns every arena the navigation core works on and advances
//! them in a fixed phase order:
//!
//! 1. reset budget counters
//! 2. apply queued hierarchy changes (region and transit builders)
//! 3. shed request backlog
//! 4. dispatch requests to the local / strategic planners
//! 5. refine upcoming route segments
//! 6. rebuild dirty flow-field layers
//! 7. gather neighbours
//! 8. follow + steer agents (data-parallel)
//! 9. refresh flow-field occupancy
//! 10. steer groups
//! 11. replanning monitor
//! 12. apply end-of-tick commands
//!
//! Budgets are reset before any gated phase, and structural changes requested
//! during the tick only land in phase 12.

use bevy::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use wayfarer_macros::profile;

use super::budget::BudgetCounters;
use super::commands::{CommandQueue, NavCommand};
use super::config::NavConfig;
use super::error::{NavError, NavResult};
use super::fixed_math::{FixedNum, FixedVec2};
use super::flow_field::FlowFieldGrid;
use super::formation::{centroid, update_groups, FormationReport, NavGroup};
use super::graph::{GraphHierarchy, GraphStats, LocalGraph, RegionSource, TransportSource};
use super::intake::{DispatchReport, PathRequestQueue};
use super::path::NavPath;
use super::preference::PreferenceProfiles;
use super::replan::{check_routes, ReplanReport};
use super::segment_builder::{refine_path, RefineLimits};
use super::spatial_hash::SpatialHash;
use super::steering::{gather_neighbors, steer_agents, NavAgent, NeighborCache};
use super::types::{AgentId, GroupId, PathRequest, PathResult, RegionId, RequestId, Requester, SimClock, SimTick, TransportRef};
use crate::profile_log;

/// Something in the world changed that the navigation core must react to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorldChange {
    /// Terrain under the flow fields changed; every layer is rebuilt.
    TerrainChanged,
    RegionChanged(RegionId),
    RegionEdgeChanged(RegionId, RegionId),
    /// A transport entity was added, moved, re-timetabled or removed.
    TransportChanged(TransportRef),
    /// The local graph was edited; refined segment detail is stale.
    LocalGraphChanged,
}

/// Snapshot of one tick for observability.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavStats {
    pub tick: u64,
    pub graph_version: u64,
    pub graph: GraphStats,
    pub queue_size: usize,
    pub local_planned: usize,
    pub strategic_planned: usize,
    pub deferred: usize,
    pub failed: usize,
    pub segments_refined: usize,
    pub flow_rebuilds: usize,
    pub agents_steered: usize,
    pub group_members_steered: usize,
    pub replans: usize,
    pub commands_applied: usize,
    /// Since startup.
    pub dropped_requests: u64,
    /// Since startup.
    pub deferred_work: u64,
}

#[derive(Resource)]
pub struct NavWorld {
    clock: SimClock,
    config: NavConfig,
    counters: BudgetCounters,
    hierarchy: GraphHierarchy,
    queue: PathRequestQueue,
    profiles: PreferenceProfiles,
    flow: FlowFieldGrid,

    agents: Vec<NavAgent>,
    agent_slots: FxHashMap<AgentId, usize>,
    groups: Vec<NavGroup>,
    threats: Vec<FixedVec2>,

    agent_index: SpatialHash,
    threat_index: SpatialHash,
    neighbors: NeighborCache,

    commands: CommandQueue,
    stats: NavStats,
}

impl NavWorld {
    pub fn new(config: NavConfig, local: LocalGraph) -> Self {
        let grid = config.flow_field;
        let span_x = grid.cell_size * FixedNum::from_num(grid.width);
        let span_y = grid.cell_size * FixedNum::from_num(grid.height);
        let bucket = config.steering.neighbor_radius.max(config.steering.avoidance_radius);

        Self {
            clock: SimClock::default(),
            counters: BudgetCounters::default(),
            hierarchy: GraphHierarchy::new(local),
            queue: PathRequestQueue::default(),
            profiles: config.profiles.clone(),
            flow: FlowFieldGrid::new(grid),
            agents: Vec::new(),
            agent_slots: FxHashMap::default(),
            groups: Vec::new(),
            threats: Vec::new(),
            agent_index: SpatialHash::new(grid.origin, span_x, span_y, bucket),
            threat_index: SpatialHash::new(grid.origin, span_x, span_y, bucket),
            neighbors: NeighborCache::default(),
            commands: CommandQueue::default(),
            stats: NavStats::default(),
            config,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    pub fn counters(&self) -> &BudgetCounters {
        &self.counters
    }

    pub fn hierarchy(&self) -> &GraphHierarchy {
        &self.hierarchy
    }

    pub fn queue(&self) -> &PathRequestQueue {
        &self.queue
    }

    pub fn flow_field(&self) -> &FlowFieldGrid {
        &self.flow
    }

    pub fn profiles(&self) -> &PreferenceProfiles {
        &self.profiles
    }

    /// Stats from the last completed tick.
    pub fn stats(&self) -> NavStats {
        self.stats
    }

    pub fn agents(&self) -> &[NavAgent] {
        &self.agents
    }

    pub fn agent(&self, id: AgentId) -> Option<&NavAgent> {
        self.agent_slots.get(&id).map(|&i| &self.agents[i])
    }

    pub fn groups(&self) -> &[NavGroup] {
        &self.groups
    }

    pub fn group(&self, id: GroupId) -> Option<&NavGroup> {
        self.groups.iter().find(|g| g.id == id)
    }

    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }

    // ------------------------------------------------------------------
    // Caller-facing inputs
    // ------------------------------------------------------------------

    pub fn set_paused(&mut self, paused: bool) {
        self.clock.paused = paused;
    }

    pub fn set_delta(&mut self, delta: FixedNum) {
        self.clock.delta = delta;
    }

    /// Write an agent's position; the movement layer owns integration.
    pub fn set_agent_position(&mut self, id: AgentId, position: FixedVec2) -> NavResult<()> {
        let &slot = self.agent_slots.get(&id).ok_or(NavError::UnknownAgent(id))?;
        self.agents[slot].position = position;
        Ok(())
    }

    pub fn set_threats(&mut self, threats: Vec<FixedVec2>) {
        self.threats = threats;
    }

    /// Queue a structural change for the end of the current (or next) tick.
    pub fn push_command(&mut self, command: NavCommand) {
        self.commands.push(command);
    }

    /// Submit a path request, stamped with the current tick.
    ///
    /// A group's request becomes the route its formation follows.
    pub fn submit_request(&mut self, request: PathRequest) -> NavResult<RequestId> {
        let requester = request.requester;
        if let Requester::Group(group) = requester {
            if self.group(group).is_none() {
                return Err(NavError::UnknownGroup(group));
            }
        }
        let id = self.queue.submit(request, self.clock.tick)?;
        if let Requester::Group(group) = requester {
            if let Some(g) = self.groups.iter_mut().find(|g| g.id == group) {
                g.request = Some(id);
            }
        }
        Ok(id)
    }

    pub fn result(&self, id: RequestId) -> Option<&PathResult> {
        self.queue.get(id).map(|slot| &slot.result)
    }

    pub fn path(&self, id: RequestId) -> Option<&NavPath> {
        self.queue.get(id).and_then(|slot| slot.path.as_ref())
    }

    /// Mutable route access for the traveller advancing along it.
    pub fn path_mut(&mut self, id: RequestId) -> Option<&mut NavPath> {
        self.queue.get_mut(id).and_then(|slot| slot.path.as_mut())
    }

    pub fn notify(&mut self, change: WorldChange) {
        match change {
            WorldChange::TerrainChanged => self.flow.invalidate_all(),
            WorldChange::RegionChanged(id) => self.hierarchy.mark_region_dirty(id),
            WorldChange::RegionEdgeChanged(a, b) => self.hierarchy.mark_region_edge_dirty(a, b),
            WorldChange::TransportChanged(transport) => self.hierarchy.mark_transport_dirty(transport),
            WorldChange::LocalGraphChanged => {
                for (_, slot) in self.queue.slots_mut() {
                    if let Some(path) = slot.path.as_mut() {
                        for segment in &mut path.segments {
                            segment.refined = false;
                        }
                    }
                }
            }
        }
    }

    /// Edit the local graph; counts as one structural change.
    pub fn edit_local_graph<R>(&mut self, edit: impl FnOnce(&mut LocalGraph) -> R) -> R {
        let result = self.hierarchy.edit_local(edit);
        self.notify(WorldChange::LocalGraphChanged);
        result
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Advance one tick. A paused clock does nothing and returns `None`.
    pub fn tick(&mut self, regions: &dyn RegionSource, transports: &dyn TransportSource) -> Option<NavStats> {
        if self.clock.paused {
            return None;
        }
        let now = self.clock.tick;
        let mut stats = NavStats { tick: now.0, ..Default::default() };

        self.counters.reset_for_tick(now);
        self.hierarchy.update(regions, transports);

        let dispatch = self.phase_intake(now);
        stats.local_planned = dispatch.local_planned;
        stats.strategic_planned = dispatch.strategic_planned;
        stats.deferred = dispatch.deferred;
        stats.failed = dispatch.failed;

        stats.segments_refined = self.phase_refine(now);
        stats.flow_rebuilds = self.flow.rebuild_dirty(now, &mut self.counters, &self.config.budget);
        stats.agents_steered = self.phase_steering(now);
        self.flow.refresh_occupancy(self.agents.iter().map(|a| a.position));

        let formation = self.phase_formation(now);
        stats.group_members_steered = formation.steered_members;

        let replan = self.phase_replan(transports, now);
        stats.replans = replan.reissued();

        stats.commands_applied = self.apply_commands();

        stats.graph_version = self.hierarchy.version();
        stats.graph = self.hierarchy.stats();
        stats.queue_size = self.counters.queue_size;
        stats.dropped_requests = self.counters.dropped_requests;
        stats.deferred_work = self.counters.deferred_work;
        self.stats = stats;

        self.clock.tick = now.next();
        Some(stats)
    }

    #[profile(2)]
    fn phase_intake(&mut self, now: SimTick) -> DispatchReport {
        self.queue
            .enforce_backlog(&mut self.counters, self.config.budget.queue_warning_threshold);
        let report = self
            .queue
            .dispatch(&self.hierarchy, &self.profiles, &self.config, &mut self.counters, now);
        profile_log!(
            now,
            "[INTAKE] queue {} | local {} | strategic {} | deferred {} | failed {}",
            self.counters.queue_size,
            report.local_planned,
            report.strategic_planned,
            report.deferred,
            report.failed
        );
        report
    }

    #[profile(2)]
    fn phase_refine(&mut self, now: SimTick) -> usize {
        let limits = RefineLimits {
            range: self.config.planner.local_refine_range,
            max_iterations: self.config.planner.max_astar_iterations,
        };
        let mut refined = 0;
        for (_, slot) in self.queue.slots_mut() {
            let mode = slot.request.mode;
            if let Some(path) = slot.path.as_mut() {
                refined += refine_path(
                    path,
                    self.hierarchy.local(),
                    mode,
                    limits,
                    &mut self.counters,
                    &self.config.budget,
                );
            }
        }
        profile_log!(now, "[PLANNER] {} segments refined", refined);
        refined
    }

    #[profile(2)]
    fn phase_steering(&mut self, now: SimTick) -> usize {
        self.agent_index.rebuild(self.agents.iter().map(|a| a.position));
        self.threat_index.rebuild(self.threats.iter().copied());
        self.neighbors = gather_neighbors(
            &self.agents,
            &self.agent_index,
            &self.threats,
            &self.threat_index,
            &self.config.steering,
        );
        let steered = steer_agents(
            &mut self.agents,
            &self.flow,
            &self.neighbors,
            &self.threats,
            &self.config.steering,
        );
        profile_log!(
            now,
            "[STEERING] {} agents steered | {} indexed | {} threats",
            steered,
            self.agent_index.total_entries(),
            self.threats.len()
        );
        steered
    }

    #[profile(2)]
    fn phase_formation(&mut self, now: SimTick) -> FormationReport {
        let report = update_groups(
            &mut self.groups,
            &mut self.agents,
            &self.agent_slots,
            &mut self.queue,
            &self.config.formation,
            self.config.steering.base_speed,
        );
        profile_log!(
            now,
            "[FORMATION] {} members steered | {} targets advanced | {} routes completed",
            report.steered_members,
            report.advanced_targets,
            report.completed_groups
        );
        report
    }

    /// Re-issued requests restart from where their requester stands now,
    /// not from where it first set out.
    #[profile(2)]
    fn phase_replan(&mut self, transports: &dyn TransportSource, now: SimTick) -> ReplanReport {
        let report = check_routes(&mut self.queue, transports, self.hierarchy.version(), &self.config, now);
        for &id in &report.reissued_requests {
            let Some(requester) = self.queue.get(id).map(|slot| slot.request.requester) else {
                continue;
            };
            let Some(here) = self.requester_position(requester) else {
                continue;
            };
            if let Some(slot) = self.queue.get_mut(id) {
                let start = &mut slot.request.start;
                debug!(
                    "[REPLAN] {:?} restarts from ({:.1}, {:.1})",
                    requester,
                    here.x.to_num::<f32>(),
                    here.y.to_num::<f32>()
                );
                start.x = here.x;
                start.y = here.y;
            }
        }
        report
    }

    /// Ground position of an agent, or the centroid of a group's members.
    fn requester_position(&self, requester: Requester) -> Option<FixedVec2> {
        match requester {
            Requester::Agent(id) => self.agent(id).map(|a| a.position),
            Requester::Group(id) => {
                let group = self.group(id)?;
                let positions: Vec<FixedVec2> = group
                    .members()
                    .iter()
                    .filter_map(|&m| self.agent(m).map(|a| a.position))
                    .collect();
                centroid(&positions)
            }
        }
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Apply queued commands in order. A command that cannot apply is logged
    /// and skipped. Returns how many applied.
    pub fn apply_commands(&mut self) -> usize {
        let mut applied = 0;
        for command in self.commands.drain() {
            match self.apply_command(command) {
                Ok(()) => applied += 1,
                Err(e) => warn!("[COMMANDS] Skipped command: {}", e),
            }
        }
        applied
    }

    fn apply_command(&mut self, command: NavCommand) -> NavResult<()> {
        match command {
            NavCommand::SpawnAgent(agent) => {
                self.spawn_agent(agent);
                Ok(())
            }
            NavCommand::DespawnAgent(id) => self.despawn_agent(id),
            NavCommand::CreateGroup(id) => {
                if self.group(id).is_none() {
                    self.groups.push(NavGroup::new(id));
                }
                Ok(())
            }
            NavCommand::DisbandGroup(id) => self.disband_group(id),
            NavCommand::JoinGroup { agent, group } => self.join_group(agent, group),
            NavCommand::LeaveGroup(agent) => {
                let &slot = self.agent_slots.get(&agent).ok_or(NavError::UnknownAgent(agent))?;
                if let Some(group) = self.agents[slot].group.take() {
                    if let Some(g) = self.groups.iter_mut().find(|g| g.id == group) {
                        g.remove_member(agent);
                    }
                }
                Ok(())
            }
            NavCommand::AddLayer { layer, refresh_interval } => {
                self.flow
                    .add_layer(layer, refresh_interval.or(self.config.flow_refresh_interval));
                Ok(())
            }
            NavCommand::RemoveLayer(layer) => self.flow.remove_layer(layer),
            NavCommand::AddFlowGoal { layer, position } => self.flow.add_goal(layer, position).map(|_| ()),
            NavCommand::RemoveFlowGoal { layer, position } => self.flow.remove_goal(layer, position).map(|_| ()),
            NavCommand::SetObstacle { position, blocked } => self.flow.set_obstacle_at(position, blocked),
            NavCommand::AssignRole { requester, role } => {
                self.profiles.assign(requester, role);
                Ok(())
            }
            NavCommand::CancelRequest(id) => self.queue.cancel(id),
            NavCommand::RetireRequest(id) => {
                let slot = self.queue.retire(id)?;
                if let Requester::Group(group) = slot.request.requester {
                    if let Some(g) = self.groups.iter_mut().find(|g| g.id == group) {
                        g.request = None;
                    }
                }
                Ok(())
            }
        }
    }

    fn spawn_agent(&mut self, mut agent: NavAgent) {
        let id = agent.id;
        if let Some(group) = agent.group {
            match self.groups.iter_mut().find(|g| g.id == group) {
                Some(g) => {
                    g.add_member(id);
                }
                None => {
                    warn!("[COMMANDS] {:?} spawned into unknown group {:?}", id, group);
                    agent.group = None;
                }
            }
        }
        match self.agent_slots.get(&id) {
            Some(&slot) => self.agents[slot] = agent,
            None => {
                self.agent_slots.insert(id, self.agents.len());
                self.agents.push(agent);
            }
        }
    }

    fn despawn_agent(&mut self, id: AgentId) -> NavResult<()> {
        let slot = self.agent_slots.remove(&id).ok_or(NavError::UnknownAgent(id))?;
        let agent = self.agents.swap_remove(slot);
        if let Some(moved) = self.agents.get(slot) {
            self.agent_slots.insert(moved.id, slot);
        }
        if let Some(group) = agent.group {
            if let Some(g) = self.groups.iter_mut().find(|g| g.id == group) {
                g.remove_member(id);
            }
        }
        if let Some(request) = self.queue.request_of(Requester::Agent(id)) {
            self.queue.retire(request)?;
        }
        self.profiles.forget(Requester::Agent(id));
        Ok(())
    }

    fn join_group(&mut self, agent: AgentId, group: GroupId) -> NavResult<()> {
        let &slot = self.agent_slots.get(&agent).ok_or(NavError::UnknownAgent(agent))?;
        let target = self
            .groups
            .iter()
            .position(|g| g.id == group)
            .ok_or(NavError::UnknownGroup(group))?;

        if let Some(previous) = self.agents[slot].group.replace(group) {
            if let Some(g) = self.groups.iter_mut().find(|g| g.id == previous) {
                g.remove_member(agent);
            }
        }
        self.groups[target].add_member(agent);
        Ok(())
    }

    fn disband_group(&mut self, id: GroupId) -> NavResult<()> {
        let index = self
            .groups
            .iter()
            .position(|g| g.id == id)
            .ok_or(NavError::UnknownGroup(id))?;
        let group = self.groups.remove(index);
        for member in group.members() {
            if let Some(&slot) = self.agent_slots.get(member) {
                self.agents[slot].group = None;
            }
        }
        if let Some(request) = group.request {
            // Already retired requests are fine
            let _ = self.queue.retire(request);
        }
        self.profiles.forget(Requester::Group(id));
        info!("[COMMANDS] Disbanded {:?} ({} members released)", id, group.members().len());
        Ok(())
    }
}
