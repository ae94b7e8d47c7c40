use serde::{Deserialize, Serialize};

use super::fixed_math::{FixedNum, FixedVec3};

// ============================================================================
// Time
// ============================================================================

/// Monotonic simulation tick counter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SimTick(pub u64);

impl SimTick {
    pub fn next(self) -> Self {
        SimTick(self.0 + 1)
    }

    /// Ticks elapsed since `earlier` (zero if `earlier` is in the future).
    pub fn since(self, earlier: SimTick) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

/// Tick/time source consumed by every navigation phase.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimClock {
    pub tick: SimTick,
    pub delta: FixedNum,
    pub paused: bool,
}

// ============================================================================
// Identifiers
// ============================================================================

/// Local graph node index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Region identifier, assigned by the region source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegionId(pub u32);

/// Transit node slot in the transit graph arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransitId(pub u32);

/// Handle to a transport entity (relay, long-haul link, ferry) owned by the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransportRef(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupId(pub u32);

/// Slot in the path request arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u32);

/// Flow-field navigation layer identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LayerId(pub u16);

/// Who asked for a path. Individual agents and whole groups plan independently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Requester {
    Agent(AgentId),
    Group(GroupId),
}

impl Requester {
    /// Stable integer identity used for stagger hashing.
    pub fn stagger_key(self) -> u64 {
        match self {
            Requester::Agent(id) => id.0 as u64,
            Requester::Group(id) => (1u64 << 32) | id.0 as u64,
        }
    }
}

// ============================================================================
// Locomotion & scheduling
// ============================================================================

/// Bitmask describing how something can move (ground/air/water...).
///
/// Edges carry the set of modes allowed across them; a request carries the
/// modes its requester is capable of. Traversal needs a non-empty intersection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocomotionMode(pub u8);

impl LocomotionMode {
    pub const NONE: Self = Self(0);
    pub const GROUND: Self = Self(1 << 0);
    pub const AIR: Self = Self(1 << 1);
    pub const WATER: Self = Self(1 << 2);
    pub const ALL: Self = Self(u8::MAX);

    #[inline]
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for LocomotionMode {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Scheduling priority bucket for a path request.
///
/// - `Hot`: serviced every tick by the local pathfinder
/// - `Warm`: serviced on the requester's stagger phase every few ticks
/// - `Cold`: rare, event-driven; long-range cold requests go to the multi-modal planner
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeatTier {
    Hot,
    Warm,
    Cold,
}

// ============================================================================
// Requests & results
// ============================================================================

/// Intake contract: what a requester hands to the navigation core.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRequest {
    pub requester: Requester,
    pub start: FixedVec3,
    pub goal: FixedVec3,
    pub mode: LocomotionMode,
    pub heat: HeatTier,
    pub active: bool,
    pub request_tick: SimTick,
}

impl PathRequest {
    pub fn new(requester: Requester, start: FixedVec3, goal: FixedVec3, mode: LocomotionMode, heat: HeatTier) -> Self {
        Self {
            requester,
            start,
            goal,
            mode,
            heat,
            active: true,
            request_tick: SimTick::default(),
        }
    }

    pub fn straight_line_distance(&self) -> FixedNum {
        self.start.distance(self.goal)
    }
}

/// Why a request ended in `Failed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    /// The local graph had no node to snap start or goal onto.
    NoSnapNode,
    /// The open set emptied (or the iteration cap hit) before reaching the goal.
    SearchExhausted,
    /// The meta-graph had no route between the snapped meta-nodes.
    NoRoute,
    /// Shed by backlog control after the queue exceeded its warning threshold.
    Dropped,
}

/// Resolution state of a request. Terminal failures stay put until re-issued.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathStatus {
    #[default]
    Pending,
    /// Budget exhausted this tick; retried on a later tick.
    Deferred,
    Success,
    Failed(FailureReason),
    /// A previously successful path lost a referenced resource; replan queued.
    Invalidated,
}

impl PathStatus {
    /// Whether the request still needs a planner to look at it.
    pub fn is_unresolved(self) -> bool {
        matches!(self, PathStatus::Pending | PathStatus::Deferred | PathStatus::Invalidated)
    }
}

/// One step of a resolved local path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Waypoint {
    pub node: NodeId,
    pub position: FixedVec3,
    /// Cumulative cost to reach this waypoint from the start.
    pub cost: FixedNum,
}

/// Per-request result buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathResult {
    pub status: PathStatus,
    pub waypoints: Vec<Waypoint>,
    pub current_waypoint: usize,
}

impl PathResult {
    pub fn failed(reason: FailureReason) -> Self {
        Self {
            status: PathStatus::Failed(reason),
            waypoints: Vec::new(),
            current_waypoint: 0,
        }
    }

    pub fn success(waypoints: Vec<Waypoint>) -> Self {
        Self {
            status: PathStatus::Success,
            waypoints,
            current_waypoint: 0,
        }
    }

    pub fn total_cost(&self) -> FixedNum {
        self.waypoints.last().map_or(FixedNum::ZERO, |w| w.cost)
    }

    pub fn current(&self) -> Option<&Waypoint> {
        self.waypoints.get(self.current_waypoint)
    }

    /// Step to the next waypoint. Returns `false` once the path is exhausted.
    pub fn advance(&mut self) -> bool {
        if self.current_waypoint + 1 < self.waypoints.len() {
            self.current_waypoint += 1;
            true
        } else {
            self.current_waypoint = self.waypoints.len();
            false
        }
    }
}
