//! Path request intake and dispatch.
//!
//! Requests live in an arena keyed by [`RequestId`]; each slot owns its
//! request, its [`PathResult`] buffer and, for strategic routes, its
//! [`NavPath`]. A requester has at most one slot: re-submitting replaces the
//! request in place and keeps the id.

use std::collections::BTreeMap;

use bevy::prelude::*;
use rustc_hash::FxHashMap;

use super::astar;
use super::budget::{is_due, BudgetCategory, BudgetCounters};
use super::config::NavConfig;
use super::error::{NavError, NavResult};
use super::graph::GraphHierarchy;
use super::path::NavPath;
use super::planner;
use super::preference::PreferenceProfiles;
use super::types::{FailureReason, HeatTier, PathRequest, PathResult, PathStatus, RequestId, Requester, SimTick};

#[derive(Clone, Debug)]
pub struct RequestSlot {
    pub request: PathRequest,
    pub result: PathResult,
    pub path: Option<NavPath>,
}

impl RequestSlot {
    /// Active and still waiting for a planner.
    pub fn is_pending(&self) -> bool {
        self.request.active && self.result.status.is_unresolved()
    }
}

/// Which planner tier a request goes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlannerTier {
    Local,
    Strategic,
}

/// Outcome counts for one dispatch pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub local_planned: usize,
    pub strategic_planned: usize,
    pub deferred: usize,
    /// Warm requests whose stagger phase is not this tick.
    pub waiting_for_phase: usize,
    pub failed: usize,
}

#[derive(Clone, Debug, Default)]
pub struct PathRequestQueue {
    slots: BTreeMap<RequestId, RequestSlot>,
    by_requester: FxHashMap<Requester, RequestId>,
    next_id: u32,
}

impl PathRequestQueue {
    /// Validate and register a request. Re-submitting for the same requester
    /// replaces the previous request and clears its result and path.
    pub fn submit(&mut self, mut request: PathRequest, now: SimTick) -> NavResult<RequestId> {
        if request.mode.is_empty() {
            return Err(NavError::InvalidRequest(format!(
                "{:?} requested a path with no locomotion mode",
                request.requester
            )));
        }
        request.request_tick = now;
        request.active = true;

        let slot = RequestSlot {
            request,
            result: PathResult::default(),
            path: None,
        };

        if let Some(&id) = self.by_requester.get(&slot.request.requester) {
            debug!("[INTAKE] {:?} re-submitted request {:?}", slot.request.requester, id);
            self.slots.insert(id, slot);
            return Ok(id);
        }

        let id = RequestId(self.next_id);
        self.next_id += 1;
        self.by_requester.insert(slot.request.requester, id);
        self.slots.insert(id, slot);
        Ok(id)
    }

    /// Clear the active flag. Consumers skip inactive requests; nothing is
    /// interrupted mid-flight.
    pub fn cancel(&mut self, id: RequestId) -> NavResult<()> {
        let slot = self.slots.get_mut(&id).ok_or(NavError::UnknownRequest(id))?;
        slot.request.active = false;
        Ok(())
    }

    /// Remove a request and its buffers.
    pub fn retire(&mut self, id: RequestId) -> NavResult<RequestSlot> {
        let slot = self.slots.remove(&id).ok_or(NavError::UnknownRequest(id))?;
        self.by_requester.remove(&slot.request.requester);
        Ok(slot)
    }

    /// Put a request back through the pipeline after its route broke.
    pub fn reactivate(&mut self, id: RequestId, now: SimTick) -> NavResult<()> {
        let slot = self.slots.get_mut(&id).ok_or(NavError::UnknownRequest(id))?;
        slot.request.active = true;
        slot.request.request_tick = now;
        slot.result.status = PathStatus::Invalidated;
        slot.result.waypoints.clear();
        slot.result.current_waypoint = 0;
        if let Some(path) = slot.path.as_mut() {
            path.invalidate();
        }
        Ok(())
    }

    pub fn get(&self, id: RequestId) -> Option<&RequestSlot> {
        self.slots.get(&id)
    }

    pub fn get_mut(&mut self, id: RequestId) -> Option<&mut RequestSlot> {
        self.slots.get_mut(&id)
    }

    pub fn request_of(&self, requester: Requester) -> Option<RequestId> {
        self.by_requester.get(&requester).copied()
    }

    pub fn slots(&self) -> impl Iterator<Item = (RequestId, &RequestSlot)> {
        self.slots.iter().map(|(&id, slot)| (id, slot))
    }

    pub fn slots_mut(&mut self) -> impl Iterator<Item = (RequestId, &mut RequestSlot)> {
        self.slots.iter_mut().map(|(&id, slot)| (id, slot))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Pending requests, oldest first (ties by id).
    pub fn pending(&self) -> Vec<RequestId> {
        let mut ids: Vec<(SimTick, RequestId)> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.is_pending())
            .map(|(&id, slot)| (slot.request.request_tick, id))
            .collect();
        ids.sort_unstable();
        ids.into_iter().map(|(_, id)| id).collect()
    }

    /// Record the queue size and shed the oldest excess requests once the
    /// backlog outgrows the warning threshold. Returns how many were dropped.
    pub fn enforce_backlog(&mut self, counters: &mut BudgetCounters, threshold: usize) -> usize {
        let pending = self.pending();
        counters.queue_size = pending.len();
        if pending.len() <= threshold {
            return 0;
        }

        let excess = pending.len() - threshold;
        for id in pending.iter().take(excess) {
            if let Some(slot) = self.slots.get_mut(id) {
                slot.request.active = false;
                slot.result = PathResult::failed(FailureReason::Dropped);
            }
        }
        counters.dropped_requests += excess as u64;
        counters.queue_size = threshold;
        warn!(
            "[INTAKE] Backlog of {} requests exceeds threshold {}, dropped {} oldest ({} dropped total)",
            pending.len(),
            threshold,
            excess,
            counters.dropped_requests
        );
        excess
    }

    /// Route every pending request to its planner tier, within budget.
    ///
    /// - `Cold` requests longer than the strategic threshold go to the
    ///   multi-modal planner
    /// - everything else goes to the local A*; `Warm` requests only on their
    ///   stagger phase
    ///
    /// A budget refusal leaves the request active with status `Deferred`.
    pub fn dispatch(
        &mut self,
        hierarchy: &GraphHierarchy,
        profiles: &PreferenceProfiles,
        config: &NavConfig,
        counters: &mut BudgetCounters,
        now: SimTick,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        for id in self.pending() {
            let Some(slot) = self.slots.get_mut(&id) else {
                continue;
            };
            let requester = slot.request.requester;

            if slot.request.heat == HeatTier::Warm
                && !is_due(now, requester.stagger_key(), config.stagger.warm_period)
            {
                report.waiting_for_phase += 1;
                continue;
            }

            match classify(&slot.request, config) {
                PlannerTier::Local => {
                    if !counters.try_consume(&config.budget, BudgetCategory::LocalPathQuery) {
                        slot.result.status = PathStatus::Deferred;
                        report.deferred += 1;
                        continue;
                    }
                    slot.result = astar::find_path(
                        hierarchy.local(),
                        slot.request.start,
                        slot.request.goal,
                        slot.request.mode,
                        config.planner.max_astar_iterations,
                    );
                    slot.path = None;
                    slot.request.active = false;
                    if slot.result.status == PathStatus::Success {
                        report.local_planned += 1;
                    } else {
                        report.failed += 1;
                        debug!("[INTAKE] {:?} local path failed: {:?}", requester, slot.result.status);
                    }
                }
                PlannerTier::Strategic => {
                    if !counters.try_consume(&config.budget, BudgetCategory::StrategicRoutePlan) {
                        slot.result.status = PathStatus::Deferred;
                        report.deferred += 1;
                        continue;
                    }
                    let preference = profiles.for_requester(requester);
                    let planned = planner::plan_route(
                        hierarchy,
                        requester,
                        id,
                        slot.request.start,
                        slot.request.goal,
                        &preference,
                        config.planner.max_astar_iterations,
                    );
                    slot.request.active = false;
                    match planned {
                        Ok(path) => {
                            slot.result = PathResult::default();
                            slot.result.status = PathStatus::Success;
                            slot.path = Some(path);
                            report.strategic_planned += 1;
                        }
                        Err(reason) => {
                            slot.result = PathResult::failed(reason);
                            slot.path = Some(NavPath::invalid(requester, id, hierarchy.version()));
                            report.failed += 1;
                            info!("[PLANNER] {:?} has no route: {:?}", requester, reason);
                        }
                    }
                }
            }
        }

        if report.deferred > 0 {
            debug!("[BUDGET] {} requests deferred at tick {}", report.deferred, now.0);
        }
        report
    }
}

/// Tier for a request under the given configuration.
pub fn classify(request: &PathRequest, config: &NavConfig) -> PlannerTier {
    if request.heat == HeatTier::Cold
        && request.straight_line_distance() > config.planner.strategic_distance_threshold
    {
        PlannerTier::Strategic
    } else {
        PlannerTier::Local
    }
}

#[cfg(test)]
mod tests;
