use serde::{Deserialize, Serialize};

use super::fixed_math::{FixedNum, FixedVec3};
use super::types::{Requester, RequestId, TransportRef};

/// Raw per-dimension estimates for traversing a segment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentEstimate {
    pub time: FixedNum,
    pub fuel: FixedNum,
    pub risk: FixedNum,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegmentKind {
    /// Walk on the local graph (including access to/from a transit stop).
    LocalMove,
    /// Cross from one region to an adjacent one.
    RegionMove,
    /// Ride a transport entity between two transit nodes.
    UseTransport,
}

/// Graph tier a segment was planned on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NavDomain {
    Local,
    Region,
    Transit,
}

/// One high-level leg of a long-range route.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavPathSegment {
    pub kind: SegmentKind,
    pub domain: NavDomain,
    pub transport: Option<TransportRef>,
    pub estimate: SegmentEstimate,
    pub start: FixedVec3,
    pub end: FixedVec3,
    /// Scalar meta-graph cost for region/local moves.
    pub base_cost: FixedNum,
    /// Local waypoints filled in by the segment builder; empty until refined.
    pub detail: Vec<FixedVec3>,
    pub refined: bool,
}

impl NavPathSegment {
    pub fn length(&self) -> FixedNum {
        self.start.distance(self.end)
    }
}

/// A long-range route produced by the multi-modal planner.
///
/// `current_segment` must always reference a valid segment; once it runs off
/// the end the path is exhausted and [`NavPath::current`] marks it invalid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavPath {
    pub owner: Requester,
    pub request: RequestId,
    pub segments: Vec<NavPathSegment>,
    pub current_segment: usize,
    pub total_cost: FixedNum,
    pub valid: bool,
    /// Hierarchy version the route was planned against.
    pub graph_version: u64,
}

impl NavPath {
    pub fn invalid(owner: Requester, request: RequestId, graph_version: u64) -> Self {
        Self {
            owner,
            request,
            segments: Vec::new(),
            current_segment: 0,
            total_cost: FixedNum::ZERO,
            valid: false,
            graph_version,
        }
    }

    /// The segment being traversed. An out-of-range index invalidates the path.
    pub fn current(&mut self) -> Option<&NavPathSegment> {
        if !self.valid {
            return None;
        }
        if self.current_segment >= self.segments.len() {
            self.valid = false;
            return None;
        }
        self.segments.get(self.current_segment)
    }

    /// Read-only view of the current segment without the exhaustion check.
    pub fn peek_current(&self) -> Option<&NavPathSegment> {
        if self.valid {
            self.segments.get(self.current_segment)
        } else {
            None
        }
    }

    /// Move to the next segment. Returns `false` (and invalidates) when the
    /// path is exhausted.
    pub fn advance(&mut self) -> bool {
        self.current_segment += 1;
        if self.current_segment >= self.segments.len() {
            self.valid = false;
            return false;
        }
        true
    }

    pub fn is_exhausted(&self) -> bool {
        self.current_segment >= self.segments.len()
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::types::AgentId;

    fn segment(x0: f32, x1: f32) -> NavPathSegment {
        NavPathSegment {
            kind: SegmentKind::RegionMove,
            domain: NavDomain::Region,
            transport: None,
            estimate: SegmentEstimate::default(),
            start: FixedVec3::from_f32(x0, 0.0, 0.0),
            end: FixedVec3::from_f32(x1, 0.0, 0.0),
            base_cost: FixedNum::from_num(x1 - x0),
            detail: Vec::new(),
            refined: false,
        }
    }

    #[test]
    fn test_exhausted_path_becomes_invalid() {
        let mut path = NavPath::invalid(Requester::Agent(AgentId(1)), RequestId(0), 0);
        path.segments = vec![segment(0.0, 10.0), segment(10.0, 20.0)];
        path.valid = true;

        assert!(path.current().is_some());
        assert!(path.advance());
        assert!(path.current().is_some());
        assert!(!path.advance(), "advancing past the last segment exhausts the path");
        assert!(!path.valid);
        assert!(path.current().is_none());
    }

    #[test]
    fn test_out_of_range_index_invalidates_on_read() {
        let mut path = NavPath::invalid(Requester::Agent(AgentId(1)), RequestId(0), 0);
        path.segments = vec![segment(0.0, 10.0)];
        path.valid = true;
        path.current_segment = 3;

        assert!(path.current().is_none());
        assert!(!path.valid, "stale index must invalidate before consumption");
    }
}
