use std::collections::VecDeque;

use bevy::prelude::*;
use fixedbitset::FixedBitSet;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::budget::{BudgetCategory, BudgetCounters, NavBudget};
use super::error::{NavError, NavResult};
use super::fixed_math::{FixedNum, FixedVec2};
use super::types::{LayerId, SimTick};

/// Cost stored in obstacle cells. Never relaxed during a build.
pub const OBSTACLE_COST: FixedNum = FixedNum::NEG_ONE;

/// Cost stored in cells no goal can reach.
pub const UNREACHED_COST: FixedNum = FixedNum::MAX;

/// Grid geometry shared by every layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowFieldConfig {
    /// Bottom-left corner of the grid in world space.
    pub origin: FixedVec2,
    pub cell_size: FixedNum,
    pub width: usize,
    pub height: usize,
}

impl FlowFieldConfig {
    pub fn cell_count(&self) -> usize {
        self.width * self.height
    }

    pub fn world_to_grid(&self, world_pos: FixedVec2) -> Option<(usize, usize)> {
        let local_pos = world_pos - self.origin;
        if local_pos.x < FixedNum::ZERO || local_pos.y < FixedNum::ZERO || self.cell_size <= FixedNum::ZERO {
            return None;
        }

        let x = (local_pos.x / self.cell_size).to_num::<usize>();
        let y = (local_pos.y / self.cell_size).to_num::<usize>();

        if x < self.width && y < self.height {
            Some((x, y))
        } else {
            None
        }
    }

    /// Center of a cell in world space.
    pub fn grid_to_world(&self, x: usize, y: usize) -> FixedVec2 {
        let offset = self.cell_size / FixedNum::from_num(2);
        self.origin
            + FixedVec2::new(
                FixedNum::from_num(x) * self.cell_size + offset,
                FixedNum::from_num(y) * self.cell_size + offset,
            )
    }

    #[inline]
    pub fn cell_index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    pub fn cell_at(&self, world_pos: FixedVec2) -> Option<usize> {
        self.world_to_grid(world_pos).map(|(x, y)| self.cell_index(x, y))
    }
}

/// Per-layer bookkeeping. Cell data lives in [`FlowFieldGrid`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowFieldLayer {
    pub id: LayerId,
    pub last_build_tick: Option<SimTick>,
    pub dirty: bool,
    /// Goal cell indices. Every goal seeds the build with cost 0.
    pub goals: SmallVec<[usize; 4]>,
    /// Rebuild at least this often, in ticks. `None` means only when dirty.
    pub refresh_interval: Option<u64>,
}

impl FlowFieldLayer {
    /// Whether the layer's age has reached its refresh interval.
    pub fn is_build_due(&self, now: SimTick) -> bool {
        match (self.refresh_interval, self.last_build_tick) {
            (Some(interval), Some(built)) => now.since(built) >= interval,
            (_, None) => true,
            (None, Some(_)) => false,
        }
    }

    pub fn needs_build(&self, now: SimTick) -> bool {
        self.dirty || self.is_build_due(now)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowCell {
    /// Unit step toward the nearest goal, zero for goals, obstacles and
    /// unreached cells.
    pub direction: FixedVec2,
    pub cost: FixedNum,
    pub occupied: bool,
    pub layer: LayerId,
}

impl FlowCell {
    fn blank(layer: LayerId) -> Self {
        Self {
            direction: FixedVec2::ZERO,
            cost: UNREACHED_COST,
            occupied: false,
            layer,
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.cost >= FixedNum::ZERO && self.cost != UNREACHED_COST
    }
}

/// Flow-field grids for every navigation layer.
///
/// One direction/cost grid per layer, all sharing the same geometry and the
/// same obstacle set. A layer is rebuilt by multi-source Dijkstra from its
/// goal cells; afterwards any number of agents can read their step direction
/// in O(1) instead of searching individually.
///
/// Cell data for layer `i` lives at `cells[i * cell_count .. (i + 1) * cell_count]`,
/// so `cells.len() == cell_count * layer_count` at all times.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlowFieldGrid {
    config: FlowFieldConfig,
    layers: Vec<FlowFieldLayer>,
    cells: Vec<FlowCell>,
    obstacles: FixedBitSet,
}

impl FlowFieldGrid {
    pub fn new(config: FlowFieldConfig) -> Self {
        Self {
            config,
            layers: Vec::new(),
            cells: Vec::new(),
            obstacles: FixedBitSet::with_capacity(config.cell_count()),
        }
    }

    pub fn config(&self) -> &FlowFieldConfig {
        &self.config
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn layers(&self) -> &[FlowFieldLayer] {
        &self.layers
    }

    pub fn layer(&self, id: LayerId) -> Option<&FlowFieldLayer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn layer_index(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    pub fn cell_storage_len(&self) -> usize {
        self.cells.len()
    }

    // ------------------------------------------------------------------
    // Layers & goals
    // ------------------------------------------------------------------

    /// Create a layer (dirty, no goals). Adding an existing id returns its index.
    pub fn add_layer(&mut self, id: LayerId, refresh_interval: Option<u64>) -> usize {
        if let Some(idx) = self.layer_index(id) {
            return idx;
        }
        self.layers.push(FlowFieldLayer {
            id,
            last_build_tick: None,
            dirty: true,
            goals: SmallVec::new(),
            refresh_interval,
        });
        let cell_count = self.config.cell_count();
        self.cells.extend(std::iter::repeat(FlowCell::blank(id)).take(cell_count));
        debug!("[FLOW_FIELD] Layer {:?} added ({} layers)", id, self.layers.len());
        self.layers.len() - 1
    }

    pub fn remove_layer(&mut self, id: LayerId) -> NavResult<()> {
        let idx = self.layer_index(id).ok_or(NavError::UnknownLayer(id))?;
        let cell_count = self.config.cell_count();
        self.cells.drain(idx * cell_count..(idx + 1) * cell_count);
        self.layers.remove(idx);
        debug!("[FLOW_FIELD] Layer {:?} removed ({} layers)", id, self.layers.len());
        Ok(())
    }

    /// Register a goal at a world position. Marks the layer dirty.
    pub fn add_goal(&mut self, layer: LayerId, world_pos: FixedVec2) -> NavResult<usize> {
        let cell = self.config.cell_at(world_pos).ok_or_else(|| out_of_grid(world_pos))?;
        let idx = self.layer_index(layer).ok_or(NavError::UnknownLayer(layer))?;
        let entry = &mut self.layers[idx];
        if !entry.goals.contains(&cell) {
            entry.goals.push(cell);
            entry.dirty = true;
        }
        Ok(cell)
    }

    /// Remove a goal. Returns whether the layer had a goal in that cell.
    pub fn remove_goal(&mut self, layer: LayerId, world_pos: FixedVec2) -> NavResult<bool> {
        let cell = self.config.cell_at(world_pos).ok_or_else(|| out_of_grid(world_pos))?;
        let idx = self.layer_index(layer).ok_or(NavError::UnknownLayer(layer))?;
        let entry = &mut self.layers[idx];
        let before = entry.goals.len();
        entry.goals.retain(|g| *g != cell);
        let removed = entry.goals.len() != before;
        if removed {
            entry.dirty = true;
        }
        Ok(removed)
    }

    pub fn clear_goals(&mut self, layer: LayerId) -> NavResult<()> {
        let idx = self.layer_index(layer).ok_or(NavError::UnknownLayer(layer))?;
        let entry = &mut self.layers[idx];
        if !entry.goals.is_empty() {
            entry.goals.clear();
            entry.dirty = true;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Terrain
    // ------------------------------------------------------------------

    pub fn is_obstacle(&self, cell: usize) -> bool {
        self.obstacles.contains(cell)
    }

    /// Change one cell's obstacle flag. A real change is a terrain change and
    /// dirties every layer.
    pub fn set_obstacle(&mut self, x: usize, y: usize, obstacle: bool) {
        if x >= self.config.width || y >= self.config.height {
            return;
        }
        let cell = self.config.cell_index(x, y);
        if self.obstacles.contains(cell) == obstacle {
            return;
        }
        self.obstacles.set(cell, obstacle);
        self.invalidate_all();
    }

    pub fn set_obstacle_at(&mut self, world_pos: FixedVec2, obstacle: bool) -> NavResult<()> {
        let (x, y) = self.config.world_to_grid(world_pos).ok_or_else(|| out_of_grid(world_pos))?;
        self.set_obstacle(x, y, obstacle);
        Ok(())
    }

    /// World terrain changed: every layer needs a rebuild.
    pub fn invalidate_all(&mut self) {
        for layer in &mut self.layers {
            layer.dirty = true;
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn cells_of(&self, layer: LayerId) -> Option<&[FlowCell]> {
        let idx = self.layer_index(layer)?;
        let cell_count = self.config.cell_count();
        self.cells.get(idx * cell_count..(idx + 1) * cell_count)
    }

    pub fn cell(&self, layer: LayerId, cell: usize) -> Option<&FlowCell> {
        self.cells_of(layer).and_then(|cells| cells.get(cell))
    }

    /// Cell under a world position on the given layer.
    pub fn sample(&self, layer: LayerId, world_pos: FixedVec2) -> Option<&FlowCell> {
        let cell = self.config.cell_at(world_pos)?;
        self.cell(layer, cell)
    }

    /// Flag cells that currently hold at least one agent, on every layer.
    pub fn refresh_occupancy(&mut self, positions: impl IntoIterator<Item = FixedVec2>) {
        for cell in &mut self.cells {
            cell.occupied = false;
        }
        let cell_count = self.config.cell_count();
        for pos in positions {
            let Some(cell) = self.config.cell_at(pos) else {
                continue;
            };
            for layer in 0..self.layers.len() {
                self.cells[layer * cell_count + cell].occupied = true;
            }
        }
    }

    // ------------------------------------------------------------------
    // Building
    // ------------------------------------------------------------------

    /// Rebuild one layer if it is dirty or due. Not budget-gated.
    ///
    /// Returns whether a build happened; a clean layer is left untouched.
    pub fn rebuild_if_needed(&mut self, layer: LayerId, now: SimTick) -> NavResult<bool> {
        let idx = self.layer_index(layer).ok_or(NavError::UnknownLayer(layer))?;
        if !self.layers[idx].needs_build(now) {
            return Ok(false);
        }
        self.build_layer(idx, now);
        Ok(true)
    }

    /// Rebuild every layer that needs it, in layer order, one unit of the
    /// flow-field budget per build. Layers refused by the budget stay dirty
    /// for a later tick. Returns the number of layers rebuilt.
    pub fn rebuild_dirty(&mut self, now: SimTick, counters: &mut BudgetCounters, budget: &NavBudget) -> usize {
        let mut rebuilt = 0;
        let mut deferred = 0;
        for idx in 0..self.layers.len() {
            if !self.layers[idx].needs_build(now) {
                continue;
            }
            if !counters.try_consume(budget, BudgetCategory::FlowFieldRebuild) {
                self.layers[idx].dirty = true;
                deferred += 1;
                continue;
            }
            self.build_layer(idx, now);
            rebuilt += 1;
        }
        if deferred > 0 {
            debug!(
                "[FLOW_FIELD] {} layers deferred at tick {} (budget {})",
                deferred, now.0, budget.max_flow_field_rebuilds
            );
        }
        rebuilt
    }

    /// Multi-source Dijkstra over the 4-connected grid.
    ///
    /// Step cost is uniform, so a FIFO queue pops cells in nondecreasing cost
    /// order and each cell is settled by the first neighbour that reaches it.
    fn build_layer(&mut self, idx: usize, now: SimTick) {
        let FlowFieldConfig { width, height, .. } = self.config;
        let cell_count = self.config.cell_count();
        let layer_id = self.layers[idx].id;
        let base = idx * cell_count;
        let cells = &mut self.cells[base..base + cell_count];

        for (i, cell) in cells.iter_mut().enumerate() {
            let occupied = cell.occupied;
            *cell = FlowCell::blank(layer_id);
            cell.occupied = occupied;
            if self.obstacles.contains(i) {
                cell.cost = OBSTACLE_COST;
            }
        }

        let mut queue = VecDeque::new();
        for &goal in &self.layers[idx].goals {
            if goal >= cell_count || self.obstacles.contains(goal) {
                continue;
            }
            if cells[goal].cost != FixedNum::ZERO {
                cells[goal].cost = FixedNum::ZERO;
                queue.push_back(goal);
            }
        }

        let step = FixedNum::ONE;
        while let Some(current) = queue.pop_front() {
            let (cx, cy) = (current % width, current / width);
            let next_cost = cells[current].cost + step;

            // Left, right, down, up
            let neighbors = [
                (cx.wrapping_sub(1), cy),
                (cx + 1, cy),
                (cx, cy.wrapping_sub(1)),
                (cx, cy + 1),
            ];

            for (nx, ny) in neighbors {
                if nx >= width || ny >= height {
                    continue;
                }
                let n = ny * width + nx;
                if cells[n].cost == OBSTACLE_COST || next_cost >= cells[n].cost {
                    continue;
                }
                cells[n].cost = next_cost;
                cells[n].direction = FixedVec2::new(
                    FixedNum::from_num(cx as i64 - nx as i64),
                    FixedNum::from_num(cy as i64 - ny as i64),
                )
                .normalize();
                queue.push_back(n);
            }
        }

        let layer = &mut self.layers[idx];
        layer.dirty = false;
        layer.last_build_tick = Some(now);
        trace!("[FLOW_FIELD] Layer {:?} rebuilt at tick {} ({} goals)", layer_id, now.0, layer.goals.len());
    }
}

fn out_of_grid(pos: FixedVec2) -> NavError {
    NavError::OutOfGrid {
        x: pos.x.to_num(),
        y: pos.y.to_num(),
    }
}

#[cfg(test)]
mod tests;
