use std::collections::{BTreeMap, BTreeSet};

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::navigation::fixed_math::{FixedNum, FixedVec3};
use crate::navigation::path::SegmentEstimate;
use crate::navigation::types::{RegionId, TransitId, TransportRef};

use super::region::RegionGraph;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitKind {
    /// Short hop between nearby relay points.
    Relay,
    /// Long-distance scheduled link.
    LongHaul,
    /// Ferry-like service crossing otherwise impassable terrain.
    Ferry,
}

/// A transport entity as the world describes it: an ordered list of stops
/// served by one vehicle or link.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportEntity {
    pub id: TransportRef,
    pub kind: TransitKind,
    pub stops: SmallVec<[FixedVec3; 4]>,
    /// World units per time unit.
    pub speed: FixedNum,
    pub fuel_per_unit: FixedNum,
    pub risk_per_unit: FixedNum,
    /// Boarding cost at each stop, paid by a route walking onto the stop.
    pub base_cost: FixedNum,
    pub payment_required: bool,
    pub bidirectional: bool,
}

impl TransportEntity {
    /// Estimates for riding between two consecutive stops.
    pub fn leg_estimate(&self, from: FixedVec3, to: FixedVec3) -> SegmentEstimate {
        let length = from.distance(to);
        let time = if self.speed > FixedNum::ZERO {
            length / self.speed
        } else {
            length
        };
        SegmentEstimate {
            time,
            fuel: length * self.fuel_per_unit,
            risk: length * self.risk_per_unit,
        }
    }
}

/// World-side transport network, read by the transit builder and the
/// replanning monitor.
pub trait TransportSource {
    fn transport_ids(&self) -> Vec<TransportRef>;
    fn transport(&self, id: TransportRef) -> Option<TransportEntity>;

    /// Existence check used to detect vanished transport under a planned route.
    fn transport_exists(&self, id: TransportRef) -> bool {
        self.transport(id).is_some()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitNode {
    pub id: TransitId,
    pub position: FixedVec3,
    pub kind: TransitKind,
    pub transport: TransportRef,
    pub base_cost: FixedNum,
    pub payment_required: bool,
    /// Region containing the stop, used to link the stop into the meta-graph.
    pub region: Option<RegionId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitEdge {
    pub from: TransitId,
    pub to: TransitId,
    /// Scalar cost (travel time); preference-weighted costs come from `estimate`.
    pub cost: FixedNum,
    pub estimate: SegmentEstimate,
    pub transport: TransportRef,
    pub bidirectional: bool,
    pub payment_required: bool,
}

/// Graph of transit stops and the transport legs between them.
///
/// Nodes live in an arena of optional slots: removing a transport frees its
/// slots for reuse without shifting other ids.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TransitGraph {
    nodes: Vec<Option<TransitNode>>,
    free: Vec<u32>,
    edges: BTreeMap<(TransitId, TransitId), TransitEdge>,
    by_transport: BTreeMap<TransportRef, SmallVec<[TransitId; 4]>>,
}

impl TransitGraph {
    pub fn node(&self, id: TransitId) -> Option<&TransitNode> {
        self.nodes.get(id.0 as usize).and_then(|slot| slot.as_ref())
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TransitNode> {
        self.nodes.iter().filter_map(|slot| slot.as_ref())
    }

    pub fn edges(&self) -> impl Iterator<Item = &TransitEdge> {
        self.edges.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes_of(&self, transport: TransportRef) -> &[TransitId] {
        self.by_transport.get(&transport).map(|ids| ids.as_slice()).unwrap_or(&[])
    }

    pub fn contains_transport(&self, transport: TransportRef) -> bool {
        self.by_transport.contains_key(&transport)
    }

    fn alloc(&mut self, mut node: TransitNode) -> TransitId {
        let id = match self.free.pop() {
            Some(slot) => TransitId(slot),
            None => {
                self.nodes.push(None);
                TransitId((self.nodes.len() - 1) as u32)
            }
        };
        node.id = id;
        self.nodes[id.0 as usize] = Some(node);
        id
    }

    fn remove_transport(&mut self, transport: TransportRef) {
        let Some(ids) = self.by_transport.remove(&transport) else {
            return;
        };
        for id in &ids {
            self.nodes[id.0 as usize] = None;
            self.free.push(id.0);
        }
        self.edges.retain(|_, e| e.transport != transport);
    }

    fn insert_transport(&mut self, entity: &TransportEntity, regions: &RegionGraph) {
        let mut ids: SmallVec<[TransitId; 4]> = SmallVec::new();
        for &stop in &entity.stops {
            let id = self.alloc(TransitNode {
                id: TransitId(0),
                position: stop,
                kind: entity.kind,
                transport: entity.id,
                base_cost: entity.base_cost,
                payment_required: entity.payment_required,
                region: regions.region_at(stop),
            });
            ids.push(id);
        }

        for (i, pair) in ids.windows(2).enumerate() {
            let (from, to) = (pair[0], pair[1]);
            let estimate = entity.leg_estimate(entity.stops[i], entity.stops[i + 1]);
            self.edges.insert(
                (from, to),
                TransitEdge {
                    from,
                    to,
                    cost: estimate.time,
                    estimate,
                    transport: entity.id,
                    bidirectional: entity.bidirectional,
                    payment_required: entity.payment_required,
                },
            );
        }

        self.by_transport.insert(entity.id, ids);
    }

    /// Re-resolve which region each stop sits in (after region changes).
    pub fn resolve_regions(&mut self, regions: &RegionGraph) {
        for node in self.nodes.iter_mut().flatten() {
            node.region = regions.region_at(node.position);
        }
    }
}

/// Incremental maintainer of the [`TransitGraph`].
///
/// Transport entities are discovered from the [`TransportSource`] on first
/// use; afterwards only transports marked dirty are torn down and rebuilt.
#[derive(Clone, Debug, Default)]
pub struct TransitGraphBuilder {
    built: bool,
    dirty_transports: BTreeSet<TransportRef>,
}

impl TransitGraphBuilder {
    pub fn mark_transport_dirty(&mut self, transport: TransportRef) {
        self.dirty_transports.insert(transport);
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    pub fn has_pending(&self) -> bool {
        !self.built || !self.dirty_transports.is_empty()
    }

    pub fn reset(&mut self) {
        self.built = false;
        self.dirty_transports.clear();
    }

    /// Consume dirty marks. Returns `true` if the graph changed structurally.
    pub fn rebuild(&mut self, graph: &mut TransitGraph, source: &dyn TransportSource, regions: &RegionGraph) -> bool {
        if !self.built {
            *graph = TransitGraph::default();
            let mut discovered = 0;
            for id in source.transport_ids() {
                if let Some(entity) = source.transport(id) {
                    graph.insert_transport(&entity, regions);
                    discovered += 1;
                }
            }
            self.built = true;
            self.dirty_transports.clear();
            info!(
                "[GRAPH] Transit graph built: {} transports, {} stops, {} legs",
                discovered,
                graph.node_count(),
                graph.edge_count()
            );
            return true;
        }

        if self.dirty_transports.is_empty() {
            return false;
        }

        let dirty = std::mem::take(&mut self.dirty_transports);
        for &transport in &dirty {
            graph.remove_transport(transport);
            if let Some(entity) = source.transport(transport) {
                graph.insert_transport(&entity, regions);
            }
        }
        debug!(
            "[GRAPH] Transit graph: {} dirty transports processed ({} stops, {} legs)",
            dirty.len(),
            graph.node_count(),
            graph.edge_count()
        );
        true
    }
}

// ============================================================================
// In-memory transport source
// ============================================================================

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TransportNetwork {
    transports: BTreeMap<TransportRef, TransportEntity>,
}

impl TransportNetwork {
    pub fn insert(&mut self, entity: TransportEntity) {
        self.transports.insert(entity.id, entity);
    }

    pub fn remove(&mut self, id: TransportRef) -> Option<TransportEntity> {
        self.transports.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.transports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
    }
}

impl TransportSource for TransportNetwork {
    fn transport_ids(&self) -> Vec<TransportRef> {
        self.transports.keys().copied().collect()
    }

    fn transport(&self, id: TransportRef) -> Option<TransportEntity> {
        self.transports.get(&id).cloned()
    }

    fn transport_exists(&self, id: TransportRef) -> bool {
        self.transports.contains_key(&id)
    }
}
