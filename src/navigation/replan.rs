use bevy::prelude::*;

use super::budget::is_due;
use super::config::NavConfig;
use super::graph::TransportSource;
use super::intake::PathRequestQueue;
use super::types::{RequestId, SimTick};

/// Why a route was sent back to the intake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplanCause {
    /// The transport the current segment rides no longer exists.
    TransportRemoved,
    /// The hierarchy moved on since the route was planned.
    StaleVersion,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplanReport {
    /// Valid routes whose stagger phase came up this tick.
    pub checked: usize,
    pub transport_removed: usize,
    pub stale_version: usize,
    /// Requests sent back to the intake, in id order.
    pub reissued_requests: Vec<RequestId>,
}

impl ReplanReport {
    pub fn reissued(&self) -> usize {
        self.transport_removed + self.stale_version
    }
}

/// Check every valid strategic route on its stagger phase and re-issue the
/// broken ones.
///
/// A route is broken when its current segment uses a transport the world no
/// longer has. With `replan_on_version_change` a route planned against an
/// older hierarchy version is also re-issued. There is no partial repair:
/// the route is invalidated and its request re-enters the intake with
/// `request_tick = now`.
pub fn check_routes(
    queue: &mut PathRequestQueue,
    transports: &dyn TransportSource,
    graph_version: u64,
    config: &NavConfig,
    now: SimTick,
) -> ReplanReport {
    let mut report = ReplanReport::default();
    let mut broken: Vec<(RequestId, ReplanCause)> = Vec::new();

    for (id, slot) in queue.slots() {
        let Some(path) = slot.path.as_ref().filter(|p| p.valid) else {
            continue;
        };
        if !is_due(now, path.owner.stagger_key(), config.stagger.replan_period) {
            continue;
        }
        report.checked += 1;

        let lost_transport = path
            .peek_current()
            .and_then(|segment| segment.transport)
            .filter(|&transport| !transports.transport_exists(transport));

        if let Some(transport) = lost_transport {
            info!(
                "[REPLAN] {:?} lost transport {:?} on segment {}, re-issuing request {:?}",
                path.owner, transport, path.current_segment, id
            );
            broken.push((id, ReplanCause::TransportRemoved));
        } else if config.planner.replan_on_version_change && path.graph_version != graph_version {
            debug!(
                "[REPLAN] {:?} route planned at version {} is behind {}, re-issuing",
                path.owner, path.graph_version, graph_version
            );
            broken.push((id, ReplanCause::StaleVersion));
        }
    }

    for (id, cause) in broken {
        if let Err(e) = queue.reactivate(id, now) {
            warn!("[REPLAN] Could not re-issue {:?}: {}", id, e);
            continue;
        }
        match cause {
            ReplanCause::TransportRemoved => report.transport_removed += 1,
            ReplanCause::StaleVersion => report.stale_version += 1,
        }
        report.reissued_requests.push(id);
    }

    report
}

#[cfg(test)]
mod tests;
