use super::*;
use crate::navigation::budget::NavBudget;
use crate::navigation::fixed_math::{fx, FixedNum, FixedVec3};
use crate::navigation::graph::{Aabb, BiomeTag, LocalGraph, RegionLayout, TransportNetwork};
use crate::navigation::types::{AgentId, GroupId, LocomotionMode, RegionId};

fn agent(id: u32) -> Requester {
    Requester::Agent(AgentId(id))
}

fn short_request(requester: Requester, heat: HeatTier) -> PathRequest {
    PathRequest::new(
        requester,
        FixedVec3::from_f32(0.0, 0.0, 0.0),
        FixedVec3::from_f32(10.0, 0.0, 0.0),
        LocomotionMode::GROUND,
        heat,
    )
}

fn long_request(requester: Requester) -> PathRequest {
    PathRequest::new(
        requester,
        FixedVec3::from_f32(50.0, 50.0, 0.0),
        FixedVec3::from_f32(450.0, 50.0, 0.0),
        LocomotionMode::GROUND,
        HeatTier::Cold,
    )
}

/// Local chain 0 - 5 - 10 plus five 100-wide regions in a row.
fn world() -> GraphHierarchy {
    let mut local = LocalGraph::new();
    let a = local.add_node(FixedVec3::from_f32(0.0, 0.0, 0.0), FixedNum::ZERO);
    let b = local.add_node(FixedVec3::from_f32(5.0, 0.0, 0.0), FixedNum::ZERO);
    let c = local.add_node(FixedVec3::from_f32(10.0, 0.0, 0.0), FixedNum::ZERO);
    local.add_edge(a, b, fx(1.0), LocomotionMode::GROUND, true).unwrap();
    local.add_edge(b, c, fx(1.0), LocomotionMode::GROUND, true).unwrap();

    let mut layout = RegionLayout::default();
    for i in 0..5u32 {
        let x0 = i as f32 * 100.0;
        layout.upsert_region(
            RegionId(i),
            Aabb::new(FixedVec3::from_f32(x0, 0.0, 0.0), FixedVec3::from_f32(x0 + 100.0, 100.0, 0.0)),
            BiomeTag(0),
            fx(1.0),
        );
        if i > 0 {
            layout.connect_by_distance(RegionId(i - 1), RegionId(i));
        }
    }

    let mut hierarchy = GraphHierarchy::new(local);
    hierarchy.update(&layout, &TransportNetwork::default());
    hierarchy
}

fn config_with_budget(budget: NavBudget) -> NavConfig {
    NavConfig { budget, ..Default::default() }
}

fn tick(
    queue: &mut PathRequestQueue,
    hierarchy: &GraphHierarchy,
    config: &NavConfig,
    counters: &mut BudgetCounters,
    now: u64,
) -> DispatchReport {
    counters.reset_for_tick(SimTick(now));
    queue.dispatch(hierarchy, &PreferenceProfiles::default(), config, counters, SimTick(now))
}

#[test]
fn test_request_without_mode_is_rejected() {
    let mut queue = PathRequestQueue::default();
    let mut request = short_request(agent(1), HeatTier::Hot);
    request.mode = LocomotionMode::NONE;

    assert!(matches!(queue.submit(request, SimTick(0)), Err(NavError::InvalidRequest(_))));
    assert!(queue.is_empty());
}

#[test]
fn test_resubmission_reuses_slot() {
    let mut queue = PathRequestQueue::default();
    let first = queue.submit(short_request(agent(1), HeatTier::Hot), SimTick(0)).unwrap();
    let other = queue.submit(short_request(agent(2), HeatTier::Hot), SimTick(0)).unwrap();
    let again = queue.submit(short_request(agent(1), HeatTier::Warm), SimTick(4)).unwrap();

    assert_eq!(first, again);
    assert_ne!(first, other);
    assert_eq!(queue.len(), 2);
    let slot = queue.get(first).unwrap();
    assert_eq!(slot.request.heat, HeatTier::Warm);
    assert_eq!(slot.request.request_tick, SimTick(4));
}

#[test]
fn test_hot_request_is_solved_locally() {
    let hierarchy = world();
    let config = NavConfig::default();
    let mut counters = BudgetCounters::default();
    let mut queue = PathRequestQueue::default();
    let id = queue.submit(short_request(agent(1), HeatTier::Hot), SimTick(0)).unwrap();

    let report = tick(&mut queue, &hierarchy, &config, &mut counters, 0);
    assert_eq!(report.local_planned, 1);

    let slot = queue.get(id).unwrap();
    assert_eq!(slot.result.status, PathStatus::Success);
    assert_eq!(slot.result.total_cost(), fx(2.0));
    assert!(!slot.request.active, "consumed requests are retired from the queue");
    assert!(slot.path.is_none());
}

#[test]
fn test_strategic_budget_of_one_defers_second_request() {
    let hierarchy = world();
    let config = config_with_budget(NavBudget { max_strategic_route_plans: 1, ..Default::default() });
    let mut counters = BudgetCounters::default();
    let mut queue = PathRequestQueue::default();
    let first = queue.submit(long_request(agent(1)), SimTick(0)).unwrap();
    let second = queue.submit(long_request(agent(2)), SimTick(0)).unwrap();

    let report = tick(&mut queue, &hierarchy, &config, &mut counters, 0);
    assert_eq!(report.strategic_planned, 1);
    assert_eq!(report.deferred, 1);
    assert_eq!(counters.strategic_route_plans, 1);

    assert_eq!(queue.get(first).unwrap().result.status, PathStatus::Success);
    assert!(queue.get(first).unwrap().path.as_ref().unwrap().valid);
    let deferred = queue.get(second).unwrap();
    assert_eq!(deferred.result.status, PathStatus::Deferred);
    assert!(deferred.request.active, "deferred, not failed");

    let report = tick(&mut queue, &hierarchy, &config, &mut counters, 1);
    assert_eq!(report.strategic_planned, 1);
    assert_eq!(queue.get(second).unwrap().result.status, PathStatus::Success);
}

#[test]
fn test_cold_short_request_stays_local() {
    let config = NavConfig::default();
    assert_eq!(classify(&short_request(agent(1), HeatTier::Cold), &config), PlannerTier::Local);
    assert_eq!(classify(&long_request(agent(1)), &config), PlannerTier::Strategic);

    let mut hot_long = long_request(agent(1));
    hot_long.heat = HeatTier::Hot;
    assert_eq!(classify(&hot_long, &config), PlannerTier::Local);
}

#[test]
fn test_warm_request_waits_for_its_phase() {
    let hierarchy = world();
    let config = NavConfig::default();
    let period = config.stagger.warm_period;
    let mut counters = BudgetCounters::default();
    let mut queue = PathRequestQueue::default();
    let requester = Requester::Group(GroupId(3));
    let id = queue.submit(short_request(requester, HeatTier::Warm), SimTick(0)).unwrap();

    let mut solved_at = None;
    for t in 0..period {
        tick(&mut queue, &hierarchy, &config, &mut counters, t);
        if queue.get(id).unwrap().result.status == PathStatus::Success {
            solved_at = Some(t);
            break;
        }
    }
    assert_eq!(solved_at, Some(crate::navigation::budget::stagger_phase(requester.stagger_key(), period)));
}

#[test]
fn test_backlog_drops_oldest_excess() {
    let mut queue = PathRequestQueue::default();
    let old = queue.submit(short_request(agent(1), HeatTier::Hot), SimTick(1)).unwrap();
    let mid = queue.submit(short_request(agent(2), HeatTier::Hot), SimTick(2)).unwrap();
    let new = queue.submit(short_request(agent(3), HeatTier::Hot), SimTick(3)).unwrap();
    let mut counters = BudgetCounters::default();

    assert_eq!(queue.enforce_backlog(&mut counters, 1), 2);
    assert_eq!(counters.dropped_requests, 2);
    assert_eq!(counters.queue_size, 1);
    assert_eq!(queue.get(old).unwrap().result.status, PathStatus::Failed(FailureReason::Dropped));
    assert_eq!(queue.get(mid).unwrap().result.status, PathStatus::Failed(FailureReason::Dropped));
    assert!(queue.get(new).unwrap().is_pending());
}

#[test]
fn test_cancelled_request_is_skipped() {
    let hierarchy = world();
    let config = NavConfig::default();
    let mut counters = BudgetCounters::default();
    let mut queue = PathRequestQueue::default();
    let id = queue.submit(short_request(agent(1), HeatTier::Hot), SimTick(0)).unwrap();
    queue.cancel(id).unwrap();

    let report = tick(&mut queue, &hierarchy, &config, &mut counters, 0);
    assert_eq!(report, DispatchReport::default());
    assert_eq!(queue.get(id).unwrap().result.status, PathStatus::Pending);
}

#[test]
fn test_reactivation_reenters_pipeline() {
    let hierarchy = world();
    let config = NavConfig::default();
    let mut counters = BudgetCounters::default();
    let mut queue = PathRequestQueue::default();
    let id = queue.submit(long_request(agent(1)), SimTick(0)).unwrap();
    tick(&mut queue, &hierarchy, &config, &mut counters, 0);

    queue.reactivate(id, SimTick(5)).unwrap();
    let slot = queue.get(id).unwrap();
    assert_eq!(slot.result.status, PathStatus::Invalidated);
    assert_eq!(slot.request.request_tick, SimTick(5));
    assert!(!slot.path.as_ref().unwrap().valid);
    assert_eq!(queue.pending(), vec![id]);

    tick(&mut queue, &hierarchy, &config, &mut counters, 5);
    assert!(queue.get(id).unwrap().path.as_ref().unwrap().valid);
}

#[test]
fn test_retire_frees_requester() {
    let mut queue = PathRequestQueue::default();
    let id = queue.submit(short_request(agent(1), HeatTier::Hot), SimTick(0)).unwrap();
    queue.retire(id).unwrap();

    assert!(queue.request_of(agent(1)).is_none());
    assert!(matches!(queue.retire(id), Err(NavError::UnknownRequest(_))));
}
