use image::GrayImage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{Grid, GridLine};
use crate::imaging::hough::{LineSearch, hough_lines};
use crate::settings::{Settings, SettingsError, ensure_fraction, ensure_non_negative};
use crate::spots::SpotList;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LineDetectionSettings {
    /// Tolerated deviation from an axis-aligned grid, in degrees.
    pub maximum_tilt: f64,
    pub minimum_distance_px: u32,
    /// Separation of two line peaks in the angle direction, in degrees.
    pub minimum_angle_deg: u32,
    /// Fraction of the strongest line's votes.
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpotMaskSettings {
    pub spot_radius: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridDetectorSettings {
    pub line_detection: LineDetectionSettings,
    pub spot_mask: SpotMaskSettings,
}

impl Default for GridDetectorSettings {
    fn default() -> Self {
        Self {
            line_detection: LineDetectionSettings {
                maximum_tilt: 5.0,
                minimum_distance_px: 80,
                minimum_angle_deg: 10,
                threshold: 0.2,
            },
            spot_mask: SpotMaskSettings { spot_radius: 5 },
        }
    }
}

impl Settings for GridDetectorSettings {
    fn validate(&self) -> Result<(), SettingsError> {
        let line = &self.line_detection;
        ensure_non_negative("line_detection.maximum_tilt", line.maximum_tilt)?;
        if line.maximum_tilt >= 45.0 {
            return Err(SettingsError::invalid(
                "line_detection.maximum_tilt",
                format!("must stay below 45 degrees, got {}", line.maximum_tilt),
            ));
        }
        ensure_fraction("line_detection.threshold", line.threshold)?;
        if line.minimum_angle_deg == 0 {
            return Err(SettingsError::invalid("line_detection.minimum_angle_deg", "must be at least 1"));
        }
        if self.spot_mask.spot_radius == 0 {
            return Err(SettingsError::invalid("spot_mask.spot_radius", "must be at least 1"));
        }
        Ok(())
    }
}

/// Infers grid lines from spot positions.
#[derive(Debug, Clone, Default)]
pub struct GridDetector {
    settings: GridDetectorSettings,
}

impl GridDetector {
    pub fn new(settings: GridDetectorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &GridDetectorSettings {
        &self.settings
    }

    pub fn change_settings(&mut self, patch: &Value) -> Result<(), SettingsError> {
        self.settings = self.settings.merged(patch)?;
        Ok(())
    }

    /// Binary mask with a small disk at every spot centre.
    pub fn create_spot_mask(&self, width: u32, height: u32, spots: &SpotList) -> GrayImage {
        let mut mask = GrayImage::new(width, height);
        let radius = self.settings.spot_mask.spot_radius;
        for spot in spots.iter() {
            if !spot.draw(&mut mask, 255, radius) {
                warn!(x = spot.x, y = spot.y, "spot could not be drawn: out of bounds");
            }
        }
        mask
    }

    pub fn detect_gridlines(&self, mask: &GrayImage) -> Vec<GridLine> {
        let line = &self.settings.line_detection;
        let search = LineSearch {
            maximum_tilt_deg: line.maximum_tilt,
            min_distance_px: line.minimum_distance_px as usize,
            min_angle_deg: line.minimum_angle_deg as usize,
            relative_threshold: line.threshold,
        };
        hough_lines(mask, &search)
            .into_iter()
            .map(|c| GridLine::new(c.distance, c.angle))
            .collect()
    }

    /// Splits lines into `(horizontal, vertical)` by the angle of their
    /// normal, each sorted by distance from the origin.
    pub fn sort_lines_by_alignment(&self, lines: &[GridLine]) -> (Vec<GridLine>, Vec<GridLine>) {
        let tilt = self.settings.line_detection.maximum_tilt;
        let mut horizontal: Vec<GridLine> = lines
            .iter()
            .filter(|l| (l.angle.to_degrees() - 90.0).abs() <= tilt)
            .copied()
            .collect();
        let mut vertical: Vec<GridLine> = lines
            .iter()
            .filter(|l| l.angle.to_degrees().abs() <= tilt)
            .copied()
            .collect();
        horizontal.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        vertical.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        (horizontal, vertical)
    }

    pub fn construct_grid(&self, lines: &[GridLine]) -> Grid {
        let (horizontal, vertical) = self.sort_lines_by_alignment(lines);
        Grid::new(horizontal, vertical)
    }

    /// Mask, line detection and intersection in one pass.
    pub fn detect_grid(&self, width: u32, height: u32, spots: &SpotList) -> Grid {
        let mask = self.create_spot_mask(width, height, spots);
        let lines = self.detect_gridlines(&mask);
        debug!(lines = lines.len(), "grid line candidates");
        let grid = self.construct_grid(&lines);
        info!(
            horizontal = grid.horizontal_lines.len(),
            vertical = grid.vertical_lines.len(),
            intersections = grid.intersections.len(),
            "grid detected"
        );
        grid
    }
}
