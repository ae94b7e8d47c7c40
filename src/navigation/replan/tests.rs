use smallvec::smallvec;

use super::*;
use crate::navigation::budget::stagger_phase;
use crate::navigation::fixed_math::{fx, FixedNum, FixedVec3};
use crate::navigation::graph::{TransitKind, TransportEntity, TransportNetwork};
use crate::navigation::path::{NavDomain, NavPath, NavPathSegment, SegmentEstimate, SegmentKind};
use crate::navigation::types::{AgentId, HeatTier, LocomotionMode, PathRequest, PathStatus, Requester, TransportRef};

const FERRY: TransportRef = TransportRef(3);

fn config(replan_period: u64) -> NavConfig {
    let mut config = NavConfig::default();
    config.stagger.replan_period = replan_period;
    config
}

fn segment(kind: SegmentKind, x0: f32, x1: f32) -> NavPathSegment {
    NavPathSegment {
        kind,
        domain: if kind == SegmentKind::UseTransport { NavDomain::Transit } else { NavDomain::Local },
        transport: (kind == SegmentKind::UseTransport).then_some(FERRY),
        estimate: SegmentEstimate::default(),
        start: FixedVec3::from_f32(x0, 0.0, 0.0),
        end: FixedVec3::from_f32(x1, 0.0, 0.0),
        base_cost: fx(x1 - x0),
        detail: Vec::new(),
        refined: false,
    }
}

/// A planned, consumed strategic request: walk, ferry, walk.
fn planned(queue: &mut PathRequestQueue, agent: u32, version: u64) -> RequestId {
    let owner = Requester::Agent(AgentId(agent));
    let request = PathRequest::new(
        owner,
        FixedVec3::from_f32(0.0, 0.0, 0.0),
        FixedVec3::from_f32(300.0, 0.0, 0.0),
        LocomotionMode::GROUND,
        HeatTier::Cold,
    );
    let id = queue.submit(request, SimTick(0)).unwrap();

    let mut path = NavPath::invalid(owner, id, version);
    path.valid = true;
    path.segments = vec![
        segment(SegmentKind::LocalMove, 0.0, 50.0),
        segment(SegmentKind::UseTransport, 50.0, 250.0),
        segment(SegmentKind::LocalMove, 250.0, 300.0),
    ];

    let slot = queue.get_mut(id).unwrap();
    slot.request.active = false;
    slot.result.status = PathStatus::Success;
    slot.path = Some(path);
    id
}

fn network_with_ferry() -> TransportNetwork {
    let mut network = TransportNetwork::default();
    network.insert(TransportEntity {
        id: FERRY,
        kind: TransitKind::Ferry,
        stops: smallvec![FixedVec3::from_f32(50.0, 0.0, 0.0), FixedVec3::from_f32(250.0, 0.0, 0.0)],
        speed: fx(10.0),
        fuel_per_unit: FixedNum::ZERO,
        risk_per_unit: FixedNum::ZERO,
        base_cost: FixedNum::ZERO,
        payment_required: false,
        bidirectional: true,
    });
    network
}

fn board(queue: &mut PathRequestQueue, id: RequestId) {
    queue.get_mut(id).unwrap().path.as_mut().unwrap().advance();
}

#[test]
fn test_removed_transport_reissues_request() {
    let mut queue = PathRequestQueue::default();
    let id = planned(&mut queue, 1, 0);
    board(&mut queue, id);

    let report = check_routes(&mut queue, &TransportNetwork::default(), 0, &config(1), SimTick(7));

    assert_eq!(report.transport_removed, 1);
    let slot = queue.get(id).unwrap();
    assert!(!slot.path.as_ref().unwrap().valid);
    assert_eq!(slot.result.status, PathStatus::Invalidated);
    assert!(slot.request.active);
    assert_eq!(slot.request.request_tick, SimTick(7));
    assert_eq!(queue.pending(), vec![id]);
}

#[test]
fn test_live_transport_keeps_route() {
    let mut queue = PathRequestQueue::default();
    let id = planned(&mut queue, 1, 0);
    board(&mut queue, id);

    let report = check_routes(&mut queue, &network_with_ferry(), 0, &config(1), SimTick(7));

    assert_eq!(report.checked, 1);
    assert_eq!(report.reissued(), 0);
    assert!(queue.get(id).unwrap().path.as_ref().unwrap().valid);
}

#[test]
fn test_only_current_segment_is_checked() {
    let mut queue = PathRequestQueue::default();
    let id = planned(&mut queue, 1, 0);

    // Still walking to the pier; the missing ferry is not looked at yet
    let report = check_routes(&mut queue, &TransportNetwork::default(), 0, &config(1), SimTick(1));
    assert_eq!(report.reissued(), 0);
    assert!(queue.get(id).unwrap().path.as_ref().unwrap().valid);
}

#[test]
fn test_routes_are_checked_on_their_phase() {
    let period = 10;
    let mut queue = PathRequestQueue::default();
    let id = planned(&mut queue, 4, 0);
    board(&mut queue, id);
    let phase = stagger_phase(Requester::Agent(AgentId(4)).stagger_key(), period);

    for t in 0..period {
        let report = check_routes(&mut queue, &TransportNetwork::default(), 0, &config(period), SimTick(t));
        assert_eq!(report.reissued() == 1, t == phase, "tick {}", t);
    }
}

#[test]
fn test_version_change_only_replans_when_enabled() {
    let mut queue = PathRequestQueue::default();
    let id = planned(&mut queue, 1, 2);

    let report = check_routes(&mut queue, &network_with_ferry(), 5, &config(1), SimTick(1));
    assert_eq!(report.stale_version, 0);

    let mut eager = config(1);
    eager.planner.replan_on_version_change = true;
    let report = check_routes(&mut queue, &network_with_ferry(), 5, &eager, SimTick(2));
    assert_eq!(report.stale_version, 1);
    assert_eq!(queue.get(id).unwrap().result.status, PathStatus::Invalidated);
}

#[test]
fn test_invalid_routes_are_skipped() {
    let mut queue = PathRequestQueue::default();
    let id = planned(&mut queue, 1, 0);
    board(&mut queue, id);
    queue.get_mut(id).unwrap().path.as_mut().unwrap().invalidate();

    let report = check_routes(&mut queue, &TransportNetwork::default(), 0, &config(1), SimTick(1));
    assert_eq!(report, ReplanReport::default());
}
