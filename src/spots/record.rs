use serde::{Deserialize, Serialize};

use super::spot::{Spot, SpotIndex, SpotProvenance, SpotRole, row_name};
use super::spot_list::SpotListError;

/// One row of the spot interchange table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotRecord {
    pub row: Option<u32>,
    pub row_name: String,
    pub column: Option<u32>,
    #[serde(rename = "type")]
    pub kind: String,
    pub x_coord: f64,
    pub y_coord: f64,
    pub radius: u32,
    pub halo_radius: u32,
    pub spot_intensity: Option<f64>,
    pub raw_int: Option<f64>,
    pub note: String,
}

impl From<&Spot> for SpotRecord {
    fn from(spot: &Spot) -> Self {
        Self {
            row: spot.row(),
            row_name: spot.row_name().unwrap_or_default(),
            column: spot.col(),
            kind: spot.role.as_str().to_string(),
            x_coord: spot.x,
            y_coord: spot.y,
            radius: spot.radius,
            halo_radius: spot.halo_radius,
            spot_intensity: spot.intensity,
            raw_int: spot.raw_intensity,
            note: spot.provenance.as_str().to_string(),
        }
    }
}

pub(crate) fn parse_provenance(note: &str) -> SpotProvenance {
    if note.trim() == SpotProvenance::Backfilled.as_str() {
        SpotProvenance::Backfilled
    } else {
        SpotProvenance::Detected
    }
}

pub(crate) fn parse_index(
    row: Option<u32>,
    column: Option<u32>,
    line: usize,
) -> Result<Option<SpotIndex>, SpotListError> {
    match (row, column) {
        (Some(row), Some(col)) if row > 0 && col > 0 => Ok(Some(SpotIndex { row, col })),
        (None, None) => Ok(None),
        (row, column) => Err(SpotListError::InvalidRecord {
            line,
            reason: format!("row {row:?} and column {column:?} must both be set and positive, or both empty"),
        }),
    }
}

impl SpotRecord {
    /// Converts back into a spot. `line` is only used for error messages.
    pub fn into_spot(self, line: usize) -> Result<Spot, SpotListError> {
        let index = parse_index(self.row, self.column, line)?;
        if let Some(index) = index {
            if !self.row_name.is_empty() && !self.row_name.eq_ignore_ascii_case(&row_name(index.row)) {
                return Err(SpotListError::InvalidRecord {
                    line,
                    reason: format!("row name `{}` does not match row {}", self.row_name, index.row),
                });
            }
        }
        Ok(Spot {
            x: self.x_coord,
            y: self.y_coord,
            radius: self.radius,
            halo_radius: self.halo_radius,
            intensity: self.spot_intensity,
            raw_intensity: self.raw_int,
            index,
            provenance: parse_provenance(&self.note),
            role: self.kind.parse::<SpotRole>().unwrap_or_default(),
        })
    }
}
