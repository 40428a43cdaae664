use std::f64::consts::FRAC_PI_2;

use serde::{Deserialize, Serialize};

use crate::spots::SpotList;

/// A straight line in normal form `x cos(angle) + y sin(angle) = distance`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridLine {
    pub distance: f64,
    /// Angle of the line normal in radians.
    pub angle: f64,
}

impl GridLine {
    pub fn new(distance: f64, angle: f64) -> Self {
        Self { distance, angle }
    }

    /// `dy/dx` along the line. Infinite for vertical lines.
    pub fn slope(&self) -> f64 {
        (self.angle + FRAC_PI_2).tan()
    }

    /// Height of the line at `x = 0`.
    pub fn y_intercept(&self) -> f64 {
        let (x0, y0) = (
            self.distance * self.angle.cos(),
            self.distance * self.angle.sin(),
        );
        y0 - self.slope() * x0
    }

    /// Crossing point of two lines, `None` when they are parallel.
    ///
    /// Solved directly on the normal forms so that exactly vertical lines,
    /// whose slope is unbounded, still intersect cleanly.
    pub fn intersection(&self, other: &GridLine) -> Option<GridPoint> {
        let (a1, b1) = (self.angle.cos(), self.angle.sin());
        let (a2, b2) = (other.angle.cos(), other.angle.sin());
        let det = a1 * b2 - a2 * b1;
        if det.abs() < 1e-12 {
            return None;
        }
        let x = (self.distance * b2 - other.distance * b1) / det;
        let y = (a1 * other.distance - a2 * self.distance) / det;
        Some(GridPoint::new(x, y))
    }

    /// Signed distance of a point from the line.
    pub fn offset_of(&self, x: f64, y: f64) -> f64 {
        x * self.angle.cos() + y * self.angle.sin() - self.distance
    }
}

/// A grid intersection, where a spot is expected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    pub x: f64,
    pub y: f64,
    /// Distance to the nearest spot, infinite until checked.
    pub distance_to_spot_px: f64,
}

impl GridPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            distance_to_spot_px: f64::INFINITY,
        }
    }

    /// Records the distance to the nearest spot and returns `true` when it is
    /// at least `threshold_px`, meaning the point is missing a spot.
    pub fn check_for_spot(&mut self, spots: &SpotList, threshold_px: f64) -> bool {
        self.distance_to_spot_px = spots
            .iter()
            .map(|spot| spot.distance_to(self))
            .fold(f64::INFINITY, f64::min);
        self.distance_to_spot_px >= threshold_px
    }
}
