use tracing::{debug, info};

use super::{Spot, SpotList};

#[derive(Debug, thiserror::Error)]
pub enum IndexingError {
    #[error("exceeded maximum cycle number ({max_cycles}) while finding spot indexes, {remaining} spots left")]
    MaxCyclesExceeded { max_cycles: u32, remaining: usize },

    #[error("cannot index an empty spot list")]
    Empty,
}

/// Assigns row and column indices by peeling off the top row repeatedly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpotIndexer {
    pub row_start: u32,
    pub col_start: u32,
    pub max_cycles: u32,
}

impl Default for SpotIndexer {
    fn default() -> Self {
        Self {
            row_start: 1,
            col_start: 1,
            max_cycles: 1000,
        }
    }
}

/// Perpendicular distance of `spot` from the line through `left` and
/// `right`, or from the horizontal through `left` when both coincide.
pub fn distance_from_row(spot: &Spot, left: &Spot, right: &Spot) -> f64 {
    let (dx, dy) = (right.x - left.x, right.y - left.y);
    let length = dx.hypot(dy);
    if length == 0.0 {
        return (spot.y - left.y).abs();
    }
    let (px, py) = (spot.x - left.x, spot.y - left.y);
    (px * dy - py * dx).abs() / length
}

impl SpotIndexer {
    pub fn new(row_start: u32, col_start: u32) -> Self {
        Self {
            row_start,
            col_start,
            ..Self::default()
        }
    }

    pub fn with_max_cycles(mut self, max_cycles: u32) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    /// Indexes every spot in place and returns the number of rows found.
    ///
    /// Each cycle takes the current top-left (min `x + y`) and top-right
    /// (max `x - y`) spots of the unassigned set; every unassigned spot whose
    /// distance to the line through them is within its own radius joins the
    /// row. Rows are numbered top to bottom, columns left to right.
    pub fn assign_indexes(&self, spots: &mut SpotList) -> Result<u32, IndexingError> {
        if spots.is_empty() {
            return Err(IndexingError::Empty);
        }
        let slice = spots.as_mut_slice();
        let mut remaining: Vec<usize> = (0..slice.len()).collect();
        let mut row = self.row_start;
        let mut cycles = 0u32;

        while !remaining.is_empty() {
            if cycles >= self.max_cycles {
                return Err(IndexingError::MaxCyclesExceeded {
                    max_cycles: self.max_cycles,
                    remaining: remaining.len(),
                });
            }
            let sum = |i: &usize| slice[*i].x + slice[*i].y;
            let diff = |i: &usize| slice[*i].x - slice[*i].y;
            let (Some(&top_left), Some(&top_right)) = (
                remaining.iter().min_by(|a, b| sum(a).total_cmp(&sum(b))),
                remaining.iter().max_by(|a, b| diff(a).total_cmp(&diff(b))),
            ) else {
                break;
            };

            let (left, right) = (&slice[top_left], &slice[top_right]);
            let mut members: Vec<usize> = remaining
                .iter()
                .copied()
                .filter(|&i| distance_from_row(&slice[i], left, right) <= slice[i].radius as f64)
                .collect();
            members.sort_by(|&a, &b| slice[a].x.total_cmp(&slice[b].x));

            for (offset, &i) in members.iter().enumerate() {
                slice[i].set_index(row, self.col_start + offset as u32);
            }
            debug!(row, spots = members.len(), "indexed row");
            remaining.retain(|i| !members.contains(i));
            row += 1;
            cycles += 1;
        }

        info!(rows = cycles, "assigned spot indexes");
        Ok(cycles)
    }
}
