use super::fixed_math::{FixedNum, FixedVec2};

/// Deterministic proximity queries over a set of indexed points.
///
/// Implementations must return every index within `radius` of `center`
/// (inclusive), never the excluded index, in ascending index order so that
/// downstream blending is independent of internal bucket layout.
pub trait SpatialQuery {
    fn query_radius(&self, center: FixedVec2, radius: FixedNum, exclude: Option<usize>, out: &mut Vec<usize>);
}

/// Uniform bucket grid over a bounded rectangle.
///
/// Entries are plain indices into whatever arena the caller owns (agents,
/// threats). Points outside the rectangle are clamped into the border cells
/// so nothing is silently lost.
///
/// - **Insert:** O(1)
/// - **Query:** O(k) over the entries in the cells the radius overlaps
/// - **Clear:** O(cells), keeps allocations
#[derive(Clone, Debug)]
pub struct SpatialHash {
    origin: FixedVec2,
    cell_size: FixedNum,
    cols: usize,
    rows: usize,
    cells: Vec<Vec<(usize, FixedVec2)>>,
}

impl SpatialHash {
    pub fn new(origin: FixedVec2, width: FixedNum, height: FixedNum, cell_size: FixedNum) -> Self {
        let cell_size = cell_size.max(FixedNum::ONE);
        let cols = (width / cell_size).ceil().to_num::<usize>().max(1);
        let rows = (height / cell_size).ceil().to_num::<usize>().max(1);
        Self {
            origin,
            cell_size,
            cols,
            rows,
            cells: vec![Vec::new(); cols * rows],
        }
    }

    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
    }

    pub fn total_entries(&self) -> usize {
        self.cells.iter().map(|cell| cell.len()).sum()
    }

    pub fn cell_size(&self) -> FixedNum {
        self.cell_size
    }

    fn col_row(&self, pos: FixedVec2) -> (usize, usize) {
        let local = pos - self.origin;
        let col = (local.x / self.cell_size).floor().to_num::<i64>();
        let row = (local.y / self.cell_size).floor().to_num::<i64>();
        (
            col.clamp(0, self.cols as i64 - 1) as usize,
            row.clamp(0, self.rows as i64 - 1) as usize,
        )
    }

    pub fn insert(&mut self, index: usize, pos: FixedVec2) {
        let (col, row) = self.col_row(pos);
        self.cells[row * self.cols + col].push((index, pos));
    }

    /// Clear and re-insert from a position list; entry `i` gets index `i`.
    pub fn rebuild(&mut self, positions: impl IntoIterator<Item = FixedVec2>) {
        self.clear();
        for (i, pos) in positions.into_iter().enumerate() {
            self.insert(i, pos);
        }
    }
}

impl SpatialQuery for SpatialHash {
    fn query_radius(&self, center: FixedVec2, radius: FixedNum, exclude: Option<usize>, out: &mut Vec<usize>) {
        out.clear();
        let offset = FixedVec2::new(radius, radius);
        let (min_col, min_row) = self.col_row(center - offset);
        let (max_col, max_row) = self.col_row(center + offset);
        let radius_sq = radius * radius;

        for row in min_row..=max_row {
            for col in min_col..=max_col {
                for &(index, pos) in &self.cells[row * self.cols + col] {
                    if Some(index) == exclude {
                        continue;
                    }
                    if pos.distance_squared(center) <= radius_sq {
                        out.push(index);
                    }
                }
            }
        }
        out.sort_unstable();
    }
}
