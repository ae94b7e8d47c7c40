use std::collections::{BTreeMap, BTreeSet};

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::navigation::fixed_math::{FixedNum, FixedVec3};
use crate::navigation::types::RegionId;

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: FixedVec3,
    pub max: FixedVec3,
}

impl Aabb {
    pub fn new(min: FixedVec3, max: FixedVec3) -> Self {
        Self { min, max }
    }

    /// Containment on the ground plane; elevation is ignored.
    pub fn contains_ground(&self, p: FixedVec3) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn center(&self) -> FixedVec3 {
        (self.min + self.max) / FixedNum::from_num(2)
    }
}

/// Opaque biome classification supplied by content.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BiomeTag(pub u16);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionNode {
    pub id: RegionId,
    pub center: FixedVec3,
    pub bounds: Aabb,
    pub biome: BiomeTag,
    pub base_cost: FixedNum,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionEdge {
    pub from: RegionId,
    pub to: RegionId,
    pub cost: FixedNum,
    pub bidirectional: bool,
}

impl RegionEdge {
    pub fn touches(&self, id: RegionId) -> bool {
        self.from == id || self.to == id
    }

    pub fn connects(&self, a: RegionId, b: RegionId) -> bool {
        (self.from == a && self.to == b) || (self.from == b && self.to == a)
    }
}

/// World-side description of regions, read by the region builder.
pub trait RegionSource {
    fn region_ids(&self) -> Vec<RegionId>;
    fn region(&self, id: RegionId) -> Option<RegionNode>;
    /// Every edge with `id` as either endpoint.
    fn links(&self, id: RegionId) -> Vec<RegionEdge>;
}

/// Coarse graph over large world regions.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RegionGraph {
    nodes: BTreeMap<RegionId, RegionNode>,
    /// Keyed by `(from, to)` as stored.
    edges: BTreeMap<(RegionId, RegionId), RegionEdge>,
}

impl RegionGraph {
    pub fn node(&self, id: RegionId) -> Option<&RegionNode> {
        self.nodes.get(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &RegionNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &RegionEdge> {
        self.edges.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// First region (in id order) whose bounds contain `p` on the ground plane.
    pub fn region_at(&self, p: FixedVec3) -> Option<RegionId> {
        self.nodes.values().find(|r| r.bounds.contains_ground(p)).map(|r| r.id)
    }

    fn insert_edge(&mut self, edge: RegionEdge) {
        if self.nodes.contains_key(&edge.from) && self.nodes.contains_key(&edge.to) {
            self.edges.insert((edge.from, edge.to), edge);
        }
    }

    fn remove_edges_touching(&mut self, id: RegionId) {
        self.edges.retain(|_, e| !e.touches(id));
    }

    fn remove_edges_between(&mut self, a: RegionId, b: RegionId) {
        self.edges.remove(&(a, b));
        self.edges.remove(&(b, a));
    }
}

/// Incremental maintainer of the [`RegionGraph`].
///
/// The first call to [`rebuild`](Self::rebuild) constructs the whole graph.
/// After that only regions and edges named in the dirty lists are re-read
/// from the source; everything else is left untouched.
#[derive(Clone, Debug, Default)]
pub struct RegionGraphBuilder {
    built: bool,
    dirty_regions: BTreeSet<RegionId>,
    dirty_edges: BTreeSet<(RegionId, RegionId)>,
}

impl RegionGraphBuilder {
    pub fn mark_region_dirty(&mut self, id: RegionId) {
        self.dirty_regions.insert(id);
    }

    pub fn mark_edge_dirty(&mut self, a: RegionId, b: RegionId) {
        self.dirty_edges.insert((a.min(b), a.max(b)));
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    pub fn has_pending(&self) -> bool {
        !self.built || !self.dirty_regions.is_empty() || !self.dirty_edges.is_empty()
    }

    /// Force a full construction on the next rebuild.
    pub fn reset(&mut self) {
        self.built = false;
        self.dirty_regions.clear();
        self.dirty_edges.clear();
    }

    /// Consume pending dirty marks. Returns `true` if the graph changed
    /// structurally (the caller bumps the hierarchy version once).
    pub fn rebuild(&mut self, graph: &mut RegionGraph, source: &dyn RegionSource) -> bool {
        if !self.built {
            self.build_full(graph, source);
            return true;
        }
        if self.dirty_regions.is_empty() && self.dirty_edges.is_empty() {
            return false;
        }

        let regions = std::mem::take(&mut self.dirty_regions);
        let edges = std::mem::take(&mut self.dirty_edges);

        for &id in &regions {
            graph.remove_edges_touching(id);
            match source.region(id) {
                Some(node) => {
                    graph.nodes.insert(id, node);
                }
                None => {
                    graph.nodes.remove(&id);
                }
            }
        }
        // Re-link after all node updates so edges between two dirty regions survive
        for &id in &regions {
            if graph.nodes.contains_key(&id) {
                for edge in source.links(id) {
                    graph.insert_edge(edge);
                }
            }
        }

        for &(a, b) in &edges {
            graph.remove_edges_between(a, b);
            for edge in source.links(a).into_iter().filter(|e| e.connects(a, b)) {
                graph.insert_edge(edge);
            }
        }

        debug!(
            "[GRAPH] Region graph: {} dirty regions, {} dirty edges processed ({} nodes, {} edges)",
            regions.len(),
            edges.len(),
            graph.node_count(),
            graph.edge_count()
        );
        true
    }

    fn build_full(&mut self, graph: &mut RegionGraph, source: &dyn RegionSource) {
        graph.nodes.clear();
        graph.edges.clear();

        let ids = source.region_ids();
        for &id in &ids {
            if let Some(node) = source.region(id) {
                graph.nodes.insert(id, node);
            }
        }
        for &id in &ids {
            for edge in source.links(id) {
                graph.insert_edge(edge);
            }
        }

        self.built = true;
        self.dirty_regions.clear();
        self.dirty_edges.clear();
        info!(
            "[GRAPH] Region graph built: {} regions, {} edges",
            graph.node_count(),
            graph.edge_count()
        );
    }
}

// ============================================================================
// In-memory region source
// ============================================================================

/// Simple owned region layout for tools, tests and the headless demo.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RegionLayout {
    regions: BTreeMap<RegionId, RegionNode>,
    links: BTreeMap<(RegionId, RegionId), RegionEdge>,
}

impl RegionLayout {
    pub fn upsert_region(&mut self, id: RegionId, bounds: Aabb, biome: BiomeTag, base_cost: FixedNum) {
        self.regions.insert(
            id,
            RegionNode {
                id,
                center: bounds.center(),
                bounds,
                biome,
                base_cost,
            },
        );
    }

    pub fn remove_region(&mut self, id: RegionId) {
        self.regions.remove(&id);
        self.links.retain(|_, e| !e.touches(id));
    }

    pub fn connect(&mut self, from: RegionId, to: RegionId, cost: FixedNum, bidirectional: bool) {
        self.links.insert((from, to), RegionEdge { from, to, cost, bidirectional });
    }

    /// Bidirectional link costed by center distance times the mean base cost.
    pub fn connect_by_distance(&mut self, a: RegionId, b: RegionId) {
        let (Some(ra), Some(rb)) = (self.regions.get(&a), self.regions.get(&b)) else {
            warn!("[GRAPH] Cannot link unknown regions {:?} <-> {:?}", a, b);
            return;
        };
        let mean_cost = (ra.base_cost + rb.base_cost) / FixedNum::from_num(2);
        let cost = ra.center.distance(rb.center) * mean_cost;
        self.connect(a, b, cost, true);
    }

    pub fn disconnect(&mut self, a: RegionId, b: RegionId) {
        self.links.remove(&(a, b));
        self.links.remove(&(b, a));
    }
}

impl RegionSource for RegionLayout {
    fn region_ids(&self) -> Vec<RegionId> {
        self.regions.keys().copied().collect()
    }

    fn region(&self, id: RegionId) -> Option<RegionNode> {
        self.regions.get(&id).copied()
    }

    fn links(&self, id: RegionId) -> Vec<RegionEdge> {
        self.links.values().filter(|e| e.touches(id)).copied().collect()
    }
}
