//! Three-tier graph hierarchy: local graph, region graph, transit graph.
//!
//! [`GraphHierarchy`] owns all three plus their incremental builders and a
//! version counter. Consumers that cache anything derived from the graphs
//! store the version they computed it at and treat a mismatch as stale.

mod local;
mod region;
mod transit;


pub use local::{LocalGraph, NavEdge, NavNode};
pub use region::{Aabb, BiomeTag, RegionEdge, RegionGraph, RegionGraphBuilder, RegionLayout, RegionNode, RegionSource};
pub use transit::{
    TransitEdge, TransitGraph, TransitGraphBuilder, TransitKind, TransitNode, TransportEntity, TransportNetwork,
    TransportSource,
};

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::types::{RegionId, TransportRef};

/// Cached node/edge counts, refreshed whenever the version moves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub local_nodes: usize,
    pub local_edges: usize,
    pub region_nodes: usize,
    pub region_edges: usize,
    pub transit_nodes: usize,
    pub transit_edges: usize,
}

#[derive(Clone, Debug, Default)]
pub struct GraphHierarchy {
    local: LocalGraph,
    regions: RegionGraph,
    transit: TransitGraph,
    region_builder: RegionGraphBuilder,
    transit_builder: TransitGraphBuilder,
    version: u64,
    stats: GraphStats,
}

impl GraphHierarchy {
    pub fn new(local: LocalGraph) -> Self {
        let mut hierarchy = Self {
            local,
            ..Default::default()
        };
        hierarchy.refresh_stats();
        hierarchy
    }

    pub fn local(&self) -> &LocalGraph {
        &self.local
    }

    pub fn regions(&self) -> &RegionGraph {
        &self.regions
    }

    pub fn transit(&self) -> &TransitGraph {
        &self.transit
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn stats(&self) -> GraphStats {
        self.stats
    }

    /// Whether any builder still has work queued (or has never run).
    pub fn has_pending_changes(&self) -> bool {
        self.region_builder.has_pending() || self.transit_builder.has_pending()
    }

    // ------------------------------------------------------------------
    // Change notifications
    // ------------------------------------------------------------------

    pub fn mark_region_dirty(&mut self, id: RegionId) {
        self.region_builder.mark_region_dirty(id);
    }

    pub fn mark_region_edge_dirty(&mut self, a: RegionId, b: RegionId) {
        self.region_builder.mark_edge_dirty(a, b);
    }

    pub fn mark_transport_dirty(&mut self, transport: TransportRef) {
        self.transit_builder.mark_transport_dirty(transport);
    }

    /// Swap in a new local graph. One structural change.
    pub fn replace_local(&mut self, local: LocalGraph) {
        self.local = local;
        self.bump();
    }

    /// Edit the local graph in place. One structural change regardless of
    /// how many nodes/edges the closure touches.
    pub fn edit_local<R>(&mut self, edit: impl FnOnce(&mut LocalGraph) -> R) -> R {
        let result = edit(&mut self.local);
        self.bump();
        result
    }

    // ------------------------------------------------------------------
    // Builders
    // ------------------------------------------------------------------

    /// Run both builders against the world sources.
    ///
    /// Each builder pass that changes its graph counts as one structural
    /// change and bumps the version once. Returns the number of bumps.
    pub fn update(&mut self, regions: &dyn RegionSource, transports: &dyn TransportSource) -> u32 {
        let mut bumps = 0;

        let regions_changed = self.region_builder.rebuild(&mut self.regions, regions);
        if regions_changed {
            bumps += 1;
            self.bump();
        }

        let transit_changed = self
            .transit_builder
            .rebuild(&mut self.transit, transports, &self.regions);
        if regions_changed {
            // Stops of untouched transports may now sit in different regions
            self.transit.resolve_regions(&self.regions);
        }
        if transit_changed {
            bumps += 1;
            self.bump();
        }

        bumps
    }

    /// Drop both graphs and rebuild them from scratch on the next update.
    pub fn invalidate_all(&mut self) {
        warn!("[GRAPH] Full hierarchy rebuild requested");
        self.region_builder.reset();
        self.transit_builder.reset();
    }

    fn bump(&mut self) {
        self.version += 1;
        self.refresh_stats();
        debug!("[GRAPH] Hierarchy version -> {}", self.version);
    }

    fn refresh_stats(&mut self) {
        self.stats = GraphStats {
            local_nodes: self.local.node_count(),
            local_edges: self.local.edge_count(),
            region_nodes: self.regions.node_count(),
            region_edges: self.regions.edge_count(),
            transit_nodes: self.transit.node_count(),
            transit_edges: self.transit.edge_count(),
        };
    }
}
