use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::fixed_math::FixedNum;
use super::path::{NavPathSegment, SegmentEstimate, SegmentKind};
use super::types::Requester;

/// Role a requester plays in the simulation; selects its preference profile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RequesterRole {
    /// Balanced weighting.
    Civilian,
    /// Time is what matters.
    Courier,
    /// Fuel-conscious bulk movement.
    Hauler,
    /// Risk-tolerant.
    Patrol,
    /// Avoids risk and never pays for transport.
    Smuggler,
}

impl RequesterRole {
    pub const ALL: [RequesterRole; 5] = [
        RequesterRole::Civilian,
        RequesterRole::Courier,
        RequesterRole::Hauler,
        RequesterRole::Patrol,
        RequesterRole::Smuggler,
    ];
}

/// Per-dimension cost weights for one requester.
///
/// Two requesters looking at the same transit edge can see different costs:
/// the edge only stores raw time/fuel/risk estimates and the profile turns
/// them into a single comparable number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavPreference {
    pub time: FixedNum,
    pub fuel: FixedNum,
    pub risk: FixedNum,
    /// Whether payment-required transport may be used at all.
    pub allow_paid: bool,
}

impl Default for NavPreference {
    fn default() -> Self {
        Self::default_for(RequesterRole::Civilian)
    }
}

impl NavPreference {
    pub fn new(time: f32, fuel: f32, risk: f32) -> Self {
        Self {
            time: FixedNum::from_num(time),
            fuel: FixedNum::from_num(fuel),
            risk: FixedNum::from_num(risk),
            allow_paid: true,
        }
    }

    pub fn default_for(role: RequesterRole) -> Self {
        match role {
            RequesterRole::Civilian => Self::new(1.0, 1.0, 1.0),
            RequesterRole::Courier => Self::new(3.0, 0.5, 1.0),
            RequesterRole::Hauler => Self::new(1.0, 3.0, 1.0),
            RequesterRole::Patrol => Self::new(1.0, 1.0, 0.25),
            RequesterRole::Smuggler => Self {
                allow_paid: false,
                ..Self::new(1.0, 1.0, 3.0)
            },
        }
    }

    /// Weighted cost of a raw time/fuel/risk estimate.
    pub fn estimate_cost(&self, estimate: &SegmentEstimate) -> FixedNum {
        estimate.time * self.time + estimate.fuel * self.fuel + estimate.risk * self.risk
    }

    /// Cost of a planned segment as seen by this requester.
    ///
    /// Transport segments are re-weighted from their estimates; region and
    /// local moves already carry a scalar cost and are taken as-is, which is
    /// how the meta-graph costed them during search.
    pub fn segment_cost(&self, segment: &NavPathSegment) -> FixedNum {
        match segment.kind {
            SegmentKind::UseTransport => self.estimate_cost(&segment.estimate),
            SegmentKind::RegionMove | SegmentKind::LocalMove => segment.base_cost,
        }
    }

    pub fn permits(&self, payment_required: bool) -> bool {
        self.allow_paid || !payment_required
    }
}

/// Role → profile table plus the per-requester role assignment.
#[derive(Clone, Debug)]
pub struct PreferenceProfiles {
    by_role: BTreeMap<RequesterRole, NavPreference>,
    assigned: FxHashMap<Requester, RequesterRole>,
}

impl Default for PreferenceProfiles {
    fn default() -> Self {
        Self {
            by_role: RequesterRole::ALL
                .iter()
                .map(|&role| (role, NavPreference::default_for(role)))
                .collect(),
            assigned: FxHashMap::default(),
        }
    }
}

impl PreferenceProfiles {
    pub fn set_profile(&mut self, role: RequesterRole, preference: NavPreference) {
        self.by_role.insert(role, preference);
    }

    pub fn profile(&self, role: RequesterRole) -> NavPreference {
        self.by_role
            .get(&role)
            .copied()
            .unwrap_or_else(|| NavPreference::default_for(role))
    }

    /// Record which role a requester plays. Re-assigning overwrites.
    pub fn assign(&mut self, requester: Requester, role: RequesterRole) {
        self.assigned.insert(requester, role);
    }

    pub fn role_of(&self, requester: Requester) -> RequesterRole {
        self.assigned.get(&requester).copied().unwrap_or(RequesterRole::Civilian)
    }

    /// Profile for a requester; unassigned requesters get the civilian profile.
    pub fn for_requester(&self, requester: Requester) -> NavPreference {
        self.profile(self.role_of(requester))
    }

    pub fn forget(&mut self, requester: Requester) {
        self.assigned.remove(&requester);
    }
}
