//! The regular row/column lattice that spots should sit on.

pub mod detector;
pub mod line;

pub use detector::{GridDetector, GridDetectorSettings};
pub use line::{GridLine, GridPoint};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub horizontal_lines: Vec<GridLine>,
    pub vertical_lines: Vec<GridLine>,
    /// Every horizontal × vertical crossing, horizontal lines outermost.
    pub intersections: Vec<GridPoint>,
}

impl Grid {
    pub fn new(horizontal_lines: Vec<GridLine>, vertical_lines: Vec<GridLine>) -> Self {
        let intersections = horizontal_lines
            .iter()
            .flat_map(|h| vertical_lines.iter().filter_map(move |v| h.intersection(v)))
            .collect();
        Self {
            horizontal_lines,
            vertical_lines,
            intersections,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.intersections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn intersections_are_the_cross_product() {
        let grid = Grid::new(
            vec![GridLine::new(10.0, FRAC_PI_2), GridLine::new(20.0, FRAC_PI_2)],
            vec![
                GridLine::new(5.0, 0.0),
                GridLine::new(15.0, 0.0),
                GridLine::new(25.0, 0.0),
            ],
        );
        assert_eq!(grid.intersections.len(), 6);
        let first = grid.intersections[0];
        assert!((first.x - 5.0).abs() < 1e-9 && (first.y - 10.0).abs() < 1e-9);
        let last = grid.intersections[5];
        assert!((last.x - 25.0).abs() < 1e-9 && (last.y - 20.0).abs() < 1e-9);
    }
}
