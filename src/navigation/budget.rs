//! Per-tick performance budgets and staggered update cadences.
//!
//! Every gated phase calls [`BudgetCounters::try_consume`] before doing a unit
//! of expensive work. A refusal means "defer to a later tick", never "drop":
//! the caller leaves its work item in place. The only deliberate drop is
//! backlog shedding in the intake once the queue outgrows its warning
//! threshold, and that is counted in [`BudgetCounters::dropped_requests`].

use std::hash::{Hash, Hasher};

use bevy::prelude::*;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

use super::types::SimTick;

/// Per-tick maxima for each gated category.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavBudget {
    pub max_local_path_queries: u32,
    pub max_strategic_route_plans: u32,
    pub max_flow_field_rebuilds: u32,
    /// Pending-request count above which the intake starts shedding.
    pub queue_warning_threshold: usize,
}

impl Default for NavBudget {
    fn default() -> Self {
        Self {
            max_local_path_queries: 64,
            max_strategic_route_plans: 4,
            max_flow_field_rebuilds: 2,
            queue_warning_threshold: 512,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BudgetCategory {
    LocalPathQuery,
    StrategicRoutePlan,
    FlowFieldRebuild,
}

/// Current consumption for this tick, plus running totals for observability.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetCounters {
    pub local_path_queries: u32,
    pub strategic_route_plans: u32,
    pub flow_field_rebuilds: u32,
    /// Active unresolved requests seen by the intake this tick.
    pub queue_size: usize,
    /// Requests shed by backlog control since startup.
    pub dropped_requests: u64,
    /// Units of work deferred because a budget ran out, since startup.
    pub deferred_work: u64,
    last_reset: Option<SimTick>,
}

impl BudgetCounters {
    /// Zero the per-tick counters. Must run once per tick before any gated
    /// phase; a second call within the same tick is ignored and logged.
    pub fn reset_for_tick(&mut self, tick: SimTick) -> bool {
        if self.last_reset == Some(tick) {
            warn!("[BUDGET] Counters already reset for tick {}, ignoring duplicate reset", tick.0);
            return false;
        }
        self.local_path_queries = 0;
        self.strategic_route_plans = 0;
        self.flow_field_rebuilds = 0;
        self.queue_size = 0;
        self.last_reset = Some(tick);
        true
    }

    pub fn last_reset(&self) -> Option<SimTick> {
        self.last_reset
    }

    pub fn used(&self, category: BudgetCategory) -> u32 {
        match category {
            BudgetCategory::LocalPathQuery => self.local_path_queries,
            BudgetCategory::StrategicRoutePlan => self.strategic_route_plans,
            BudgetCategory::FlowFieldRebuild => self.flow_field_rebuilds,
        }
    }

    /// Check-then-increment. Returns `false` (and records a deferral) if the
    /// category is already at its maximum for this tick.
    pub fn try_consume(&mut self, budget: &NavBudget, category: BudgetCategory) -> bool {
        let (counter, max) = match category {
            BudgetCategory::LocalPathQuery => (&mut self.local_path_queries, budget.max_local_path_queries),
            BudgetCategory::StrategicRoutePlan => (&mut self.strategic_route_plans, budget.max_strategic_route_plans),
            BudgetCategory::FlowFieldRebuild => (&mut self.flow_field_rebuilds, budget.max_flow_field_rebuilds),
        };
        if *counter >= max {
            self.deferred_work += 1;
            return false;
        }
        *counter += 1;
        true
    }
}

// ============================================================================
// Stagger
// ============================================================================

/// Fixed phase offset in `[0, period)` for an identity.
///
/// Computed from a deterministic hash so the same agent always lands on the
/// same phase and a population spreads evenly across the period instead of
/// all recomputing on tick 0.
pub fn stagger_phase(key: u64, period: u64) -> u64 {
    if period <= 1 {
        return 0;
    }
    let mut hasher = FxHasher::default();
    key.hash(&mut hasher);
    hasher.finish() % period
}

/// Whether `key` is due on `tick` for a cadence of `period` ticks.
pub fn is_due(tick: SimTick, key: u64, period: u64) -> bool {
    if period <= 1 {
        return true;
    }
    tick.0 % period == stagger_phase(key, period)
}
