use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{Spot, SpotList};
use crate::grid::Grid;
use crate::settings::{Settings, SettingsError, ensure_non_negative};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorrectionGeneralSettings {
    /// Radius of backfilled spots, 0 uses the median radius of the list.
    pub spot_radius_backfill: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FromGridSettings {
    /// Spots further than this from every intersection are removed.
    pub removal_threshold_px: f64,
    /// Intersections at least this far from every spot are backfilled.
    pub backfill_threshold_px: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpotCorrectorSettings {
    pub general: CorrectionGeneralSettings,
    pub from_grid: FromGridSettings,
}

impl Default for SpotCorrectorSettings {
    fn default() -> Self {
        Self {
            general: CorrectionGeneralSettings {
                spot_radius_backfill: 0,
            },
            from_grid: FromGridSettings {
                removal_threshold_px: 10.0,
                backfill_threshold_px: 10.0,
            },
        }
    }
}

impl Settings for SpotCorrectorSettings {
    fn validate(&self) -> Result<(), SettingsError> {
        ensure_non_negative("from_grid.removal_threshold_px", self.from_grid.removal_threshold_px)?;
        ensure_non_negative("from_grid.backfill_threshold_px", self.from_grid.backfill_threshold_px)
    }
}

/// Reconciles detected spots with a detected grid.
#[derive(Debug, Clone, Default)]
pub struct SpotCorrector {
    settings: SpotCorrectorSettings,
}

impl SpotCorrector {
    pub fn new(settings: SpotCorrectorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SpotCorrectorSettings {
        &self.settings
    }

    pub fn change_settings(&mut self, patch: &Value) -> Result<(), SettingsError> {
        self.settings = self.settings.merged(patch)?;
        Ok(())
    }

    /// Drops spots whose closest intersection is further than
    /// `distance_threshold_px`. An empty grid removes nothing.
    pub fn remove_false_positives(spots: &mut SpotList, grid: &Grid, distance_threshold_px: f64) -> usize {
        let before = spots.len();
        spots.retain(|spot| {
            spot.deviation_from_grid(grid)
                .is_none_or(|deviation| deviation <= distance_threshold_px)
        });
        let removed = before - spots.len();
        debug!(removed, "removed spots off the grid");
        removed
    }

    /// Adds a spot at every intersection that has no spot within
    /// `distance_threshold_px`. A `radius` of zero uses the median radius of
    /// the list before backfilling. Intersection distances are recorded on
    /// the grid.
    pub fn backfill(
        spots: &mut SpotList,
        grid: &mut Grid,
        distance_threshold_px: f64,
        radius: u32,
    ) -> usize {
        let radius = if radius == 0 {
            spots.median_radius().map_or(0, |r| r.round() as u32)
        } else {
            radius
        };
        // distances are measured against the list as it was before backfilling
        let missing: Vec<(f64, f64)> = grid
            .intersections
            .iter_mut()
            .filter_map(|point| {
                point
                    .check_for_spot(spots, distance_threshold_px)
                    .then_some((point.x, point.y))
            })
            .collect();
        for &(x, y) in &missing {
            spots.push(Spot::backfilled(x, y, radius));
        }
        debug!(added = missing.len(), radius, "backfilled spots from grid");
        missing.len()
    }

    pub fn remove_false_positives_from_grid(
        &self,
        spots: &mut SpotList,
        grid: &Grid,
        inplace: bool,
    ) -> Option<SpotList> {
        let threshold = self.settings.from_grid.removal_threshold_px;
        if inplace {
            Self::remove_false_positives(spots, grid, threshold);
            None
        } else {
            let mut copy = spots.clone();
            Self::remove_false_positives(&mut copy, grid, threshold);
            Some(copy)
        }
    }

    pub fn backfill_from_grid(&self, spots: &mut SpotList, grid: &mut Grid, inplace: bool) -> Option<SpotList> {
        let threshold = self.settings.from_grid.backfill_threshold_px;
        let radius = self.settings.general.spot_radius_backfill;
        if inplace {
            Self::backfill(spots, grid, threshold, radius);
            None
        } else {
            let mut copy = spots.clone();
            Self::backfill(&mut copy, grid, threshold, radius);
            Some(copy)
        }
    }

    /// Removal followed by backfill on a copy of `spots`.
    pub fn gridbased_spotcorrection(&self, spots: &SpotList, grid: &mut Grid) -> SpotList {
        let mut corrected = spots.clone();
        let removed = Self::remove_false_positives(
            &mut corrected,
            grid,
            self.settings.from_grid.removal_threshold_px,
        );
        let added = Self::backfill(
            &mut corrected,
            grid,
            self.settings.from_grid.backfill_threshold_px,
            self.settings.general.spot_radius_backfill,
        );
        info!(removed, added, spots = corrected.len(), "grid based spot correction");
        corrected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridLine;
    use crate::spots::SpotProvenance;
    use std::f64::consts::FRAC_PI_2;

    fn grid() -> Grid {
        Grid::new(
            vec![GridLine::new(20.0, FRAC_PI_2), GridLine::new(60.0, FRAC_PI_2)],
            vec![GridLine::new(20.0, 0.0), GridLine::new(60.0, 0.0)],
        )
    }

    #[test]
    fn off_grid_spots_are_removed_first() {
        let spots = SpotList::from(vec![
            Spot::detected(21.0, 19.0, 8),
            Spot::detected(40.0, 40.0, 8),
            Spot::detected(61.0, 61.0, 10),
        ]);
        let mut grid = grid();
        let corrected = SpotCorrector::default().gridbased_spotcorrection(&spots, &mut grid);
        assert_eq!(corrected.len(), 4);
        assert!(corrected.iter().all(|s| (s.x, s.y) != (40.0, 40.0)));
        let backfilled: Vec<&Spot> = corrected
            .iter()
            .filter(|s| s.provenance == SpotProvenance::Backfilled)
            .collect();
        assert_eq!(backfilled.len(), 2);
        // median of the two kept radii
        assert!(backfilled.iter().all(|s| s.radius == 9));
    }

    #[test]
    fn backfill_is_idempotent() {
        let mut spots = SpotList::from(vec![Spot::detected(20.0, 20.0, 8)]);
        let mut grid = grid();
        assert_eq!(SpotCorrector::backfill(&mut spots, &mut grid, 10.0, 0), 3);
        assert_eq!(SpotCorrector::backfill(&mut spots, &mut grid, 10.0, 0), 0);
        assert_eq!(spots.len(), 4);
        assert!(grid.intersections.iter().all(|p| p.distance_to_spot_px < 1e-9));
    }

    #[test]
    fn thresholds_are_independent() {
        let corrector = SpotCorrector::new(SpotCorrectorSettings {
            general: CorrectionGeneralSettings { spot_radius_backfill: 5 },
            from_grid: FromGridSettings {
                removal_threshold_px: 30.0,
                backfill_threshold_px: 1.0,
            },
        });
        let mut spots = SpotList::from(vec![Spot::detected(25.0, 25.0, 8)]);
        let mut grid = grid();
        let copy = corrector
            .remove_false_positives_from_grid(&mut spots, &grid, false)
            .unwrap();
        assert_eq!(copy.len(), 1);
        let filled = corrector.backfill_from_grid(&mut spots, &mut grid, false).unwrap();
        assert_eq!(filled.len(), 5);
        assert_eq!(spots.len(), 1);
        assert!(corrector.backfill_from_grid(&mut spots, &mut grid, true).is_none());
        assert_eq!(spots.len(), 5);
    }
}
