use bevy::prelude::*;

use super::astar;
use super::budget::{BudgetCategory, BudgetCounters, NavBudget};
use super::fixed_math::{FixedNum, FixedVec3};
use super::graph::LocalGraph;
use super::path::{NavPath, SegmentKind};
use super::types::{LocomotionMode, PathStatus};

/// Limits for one refinement pass.
#[derive(Clone, Copy, Debug)]
pub struct RefineLimits {
    /// Only segments starting within this distance of the current segment's
    /// start are refined; the rest wait until the traveller gets closer.
    pub range: FixedNum,
    pub max_iterations: usize,
}

/// Fill in local detail for the upcoming segments of a route.
///
/// Walking segments (region and local moves) are resolved against the local
/// graph with A*, one local-path-query budget unit each. Transport segments
/// need no search: the vehicle follows its own line. If the budget runs out
/// the remaining segments stay unrefined for a later tick. Returns the number
/// of segments refined.
pub fn refine_path(
    path: &mut NavPath,
    local: &LocalGraph,
    mode: LocomotionMode,
    limits: RefineLimits,
    counters: &mut BudgetCounters,
    budget: &NavBudget,
) -> usize {
    if !path.valid {
        return 0;
    }
    let Some(anchor) = path.peek_current().map(|s| s.start) else {
        return 0;
    };

    let mut refined = 0;
    let first = path.current_segment;
    for segment in path.segments.iter_mut().skip(first) {
        if segment.refined {
            continue;
        }
        if segment.start.distance(anchor) > limits.range {
            break;
        }

        if segment.kind == SegmentKind::UseTransport {
            segment.detail = vec![segment.start, segment.end];
            segment.refined = true;
            refined += 1;
            continue;
        }

        if !counters.try_consume(budget, BudgetCategory::LocalPathQuery) {
            break;
        }

        let result = astar::find_path(local, segment.start, segment.end, mode, limits.max_iterations);
        segment.detail = if result.status == PathStatus::Success {
            let mut detail: Vec<FixedVec3> = result.waypoints.iter().map(|w| w.position).collect();
            if detail.last() != Some(&segment.end) {
                detail.push(segment.end);
            }
            detail
        } else {
            debug!(
                "[PLANNER] {:?}: no local detail for {:?} segment ({:?}), using straight line",
                path.owner, segment.kind, result.status
            );
            vec![segment.start, segment.end]
        };
        segment.refined = true;
        refined += 1;
    }
    refined
}
