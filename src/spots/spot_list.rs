use std::io::{Read, Write};
use std::path::Path;

use tracing::{debug, warn};

use super::record::SpotRecord;
use super::spot::{Spot, SpotRole};
use crate::imaging::GrayImageF;

#[derive(Debug, thiserror::Error)]
pub enum SpotListError {
    #[error("cannot {operation}: not every spot has a row and column index")]
    MissingIndex { operation: &'static str },

    #[error("cannot {operation}: no spot carries the required value")]
    EmptyList { operation: &'static str },

    #[error("cannot normalise by control: the list has no control spots with an intensity")]
    NoControls,

    #[error("cannot normalise by a reference intensity of {0}")]
    ZeroReference(f64),

    #[error("invalid spot record on line {line}: {reason}")]
    InvalidRecord { line: usize, reason: String },
}

/// Outcome of sampling intensities for a whole list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SamplingReport {
    pub sampled: usize,
    /// Positions of spots whose disk left the image.
    pub out_of_bounds: Vec<usize>,
}

impl SamplingReport {
    pub fn is_complete(&self) -> bool {
        self.out_of_bounds.is_empty()
    }
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

/// Ordered collection of spots. Insertion order is detection order until
/// [`SpotList::sort`] is called.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpotList {
    spots: Vec<Spot>,
}

impl From<Vec<Spot>> for SpotList {
    fn from(spots: Vec<Spot>) -> Self {
        Self { spots }
    }
}

impl FromIterator<Spot> for SpotList {
    fn from_iter<T: IntoIterator<Item = Spot>>(iter: T) -> Self {
        Self {
            spots: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for SpotList {
    type Item = Spot;
    type IntoIter = std::vec::IntoIter<Spot>;

    fn into_iter(self) -> Self::IntoIter {
        self.spots.into_iter()
    }
}

impl<'a> IntoIterator for &'a SpotList {
    type Item = &'a Spot;
    type IntoIter = std::slice::Iter<'a, Spot>;

    fn into_iter(self) -> Self::IntoIter {
        self.spots.iter()
    }
}

impl SpotList {
    pub fn len(&self) -> usize {
        self.spots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spots.is_empty()
    }

    pub fn push(&mut self, spot: Spot) {
        self.spots.push(spot);
    }

    pub fn get(&self, position: usize) -> Option<&Spot> {
        self.spots.get(position)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Spot> {
        self.spots.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Spot> {
        self.spots.iter_mut()
    }

    pub fn as_slice(&self) -> &[Spot] {
        &self.spots
    }

    pub fn as_mut_slice(&mut self) -> &mut [Spot] {
        &mut self.spots
    }

    pub fn retain(&mut self, keep: impl FnMut(&Spot) -> bool) {
        self.spots.retain(keep);
    }

    pub fn into_vec(self) -> Vec<Spot> {
        self.spots
    }

    /// Appends every spot of `lists`, in order.
    pub fn extend_from(&mut self, lists: impl IntoIterator<Item = SpotList>) {
        for list in lists {
            self.spots.extend(list.spots);
        }
    }

    pub fn mean_radius(&self) -> Option<f64> {
        if self.spots.is_empty() {
            return None;
        }
        let total: f64 = self.spots.iter().map(|s| s.radius as f64).sum();
        Some(total / self.spots.len() as f64)
    }

    pub fn median_radius(&self) -> Option<f64> {
        let mut radii: Vec<f64> = self.spots.iter().map(|s| s.radius as f64).collect();
        median(&mut radii)
    }

    /// Median over spots that carry an intensity.
    pub fn median_intensity(&self) -> Option<f64> {
        let mut values: Vec<f64> = self.spots.iter().filter_map(|s| s.intensity).collect();
        median(&mut values)
    }

    pub fn mean_intensity_controls(&self) -> Option<f64> {
        let controls: Vec<f64> = self
            .spots
            .iter()
            .filter(|s| s.role == SpotRole::Control)
            .filter_map(|s| s.intensity)
            .collect();
        if controls.is_empty() {
            return None;
        }
        Some(controls.iter().sum::<f64>() / controls.len() as f64)
    }

    /// Spot minimising `x + y`, the first one on ties.
    pub fn find_top_left(&self) -> Option<&Spot> {
        self.spots
            .iter()
            .min_by(|a, b| (a.x + a.y).total_cmp(&(b.x + b.y)))
    }

    /// Spot maximising `x - y`, the last one on ties.
    pub fn find_top_right(&self) -> Option<&Spot> {
        self.spots
            .iter()
            .max_by(|a, b| (a.x - a.y).total_cmp(&(b.x - b.y)))
    }

    /// Row labels and column numbers present in the list, both ascending.
    /// Unindexed spots are skipped.
    pub fn indices(&self) -> (Vec<String>, Vec<u32>) {
        let mut rows: Vec<u32> = self.spots.iter().filter_map(Spot::row).collect();
        let mut cols: Vec<u32> = self.spots.iter().filter_map(Spot::col).collect();
        rows.sort_unstable();
        rows.dedup();
        cols.sort_unstable();
        cols.dedup();
        (rows.into_iter().map(super::spot::row_name).collect(), cols)
    }

    fn require_indices(&self, operation: &'static str) -> Result<(), SpotListError> {
        if self.spots.iter().all(|s| s.index.is_some()) {
            Ok(())
        } else {
            Err(SpotListError::MissingIndex { operation })
        }
    }

    /// Drops spots whose row label is in `row_names` (case-insensitive).
    /// Returns the number of removed spots.
    pub fn remove_rows<S: AsRef<str>>(&mut self, row_names: &[S]) -> Result<usize, SpotListError> {
        self.require_indices("remove rows")?;
        let before = self.spots.len();
        self.spots.retain(|spot| {
            let name = spot.row_name().unwrap_or_default();
            !row_names
                .iter()
                .any(|r| r.as_ref().eq_ignore_ascii_case(&name))
        });
        Ok(before - self.spots.len())
    }

    pub fn remove_columns(&mut self, columns: &[u32]) -> Result<usize, SpotListError> {
        self.require_indices("remove columns")?;
        let before = self.spots.len();
        self.spots
            .retain(|spot| spot.col().is_none_or(|c| !columns.contains(&c)));
        Ok(before - self.spots.len())
    }

    /// Orders spots along the spotting path.
    ///
    /// The key is `row * 1000 + col`. In serpentine mode even rows use
    /// `row * 1000 - col`, so odd rows run left to right and even rows right
    /// to left. The sort is stable.
    pub fn sort(&mut self, serpentine: bool, reverse: bool) -> Result<(), SpotListError> {
        self.require_indices("sort")?;
        let key = |spot: &Spot| -> i64 {
            let Some(index) = spot.index else {
                return i64::MIN;
            };
            let (row, col) = (index.row as i64, index.col as i64);
            if serpentine && row % 2 == 0 {
                row * 1000 - col
            } else {
                row * 1000 + col
            }
        };
        if reverse {
            self.spots.sort_by(|a, b| key(b).cmp(&key(a)));
        } else {
            self.spots.sort_by_key(key);
        }
        Ok(())
    }

    /// Samples the mean disk intensity of every spot, with `radius` or the
    /// spot's own radius when zero. Sets both the intensity and the raw
    /// intensity. Spots whose disk leaves the image keep their old values and
    /// are listed in the report.
    pub fn get_spot_intensities(&mut self, image: &GrayImageF, radius: u32) -> SamplingReport {
        let mut report = SamplingReport::default();
        for (position, spot) in self.spots.iter_mut().enumerate() {
            match spot.sample_intensity(image, radius) {
                Some(value) => {
                    spot.intensity = Some(value);
                    spot.raw_intensity = Some(value);
                    report.sampled += 1;
                }
                None => {
                    warn!(
                        x = spot.x,
                        y = spot.y,
                        "spot could not be evaluated: (partly) out of bounds"
                    );
                    report.out_of_bounds.push(position);
                }
            }
        }
        debug!(
            sampled = report.sampled,
            out_of_bounds = report.out_of_bounds.len(),
            "sampled spot intensities"
        );
        report
    }

    fn scale_intensities(&mut self, reference: f64) -> Result<(), SpotListError> {
        if reference == 0.0 || !reference.is_finite() {
            return Err(SpotListError::ZeroReference(reference));
        }
        for spot in self.spots.iter_mut() {
            if let Some(value) = spot.intensity.as_mut() {
                *value *= 1.0 / reference;
            }
        }
        Ok(())
    }

    /// Divides every intensity by the mean control intensity and returns
    /// that reference.
    pub fn normalize_by_control(&mut self) -> Result<f64, SpotListError> {
        let reference = self
            .mean_intensity_controls()
            .ok_or(SpotListError::NoControls)?;
        self.scale_intensities(reference)?;
        Ok(reference)
    }

    /// Divides every intensity by the median intensity and returns that
    /// reference.
    pub fn normalize_by_median(&mut self) -> Result<f64, SpotListError> {
        let reference = self.median_intensity().ok_or(SpotListError::EmptyList {
            operation: "normalise by median",
        })?;
        self.scale_intensities(reference)?;
        Ok(reference)
    }

    pub fn reset_intensities(&mut self) {
        for spot in self.spots.iter_mut() {
            spot.intensity = spot.raw_intensity;
        }
    }

    /// Uses `halo_radius * factor` as the intensity of spots with a halo.
    pub fn scale_halos_to_intensity(&mut self, factor: f64) {
        for spot in self.spots.iter_mut().filter(|s| s.halo_radius > 0) {
            spot.intensity = Some(spot.halo_radius as f64 * factor);
        }
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> crate::Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        for spot in &self.spots {
            writer.serialize(SpotRecord::from(spot))?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn read_csv<R: Read>(reader: R) -> crate::Result<Self> {
        let mut reader = csv::Reader::from_reader(reader);
        let mut spots = Vec::new();
        for (line, record) in reader.deserialize::<SpotRecord>().enumerate() {
            spots.push(record?.into_spot(line + 2)?);
        }
        Ok(Self { spots })
    }

    pub fn write_csv_path(&self, path: &Path) -> crate::Result<()> {
        self.write_csv(std::fs::File::create(path)?)
    }

    pub fn read_csv_path(path: &Path) -> crate::Result<Self> {
        Self::read_csv(std::fs::File::open(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn indexed_grid(rows: u32, cols: u32) -> SpotList {
        let mut spots = SpotList::default();
        for row in 1..=rows {
            for col in 1..=cols {
                let mut spot = Spot::detected(col as f64 * 10.0, row as f64 * 10.0, 3);
                spot.set_index(row, col);
                spot.intensity = Some((row * 10 + col) as f64);
                spots.push(spot);
            }
        }
        spots
    }

    #[test]
    fn serpentine_sort_alternates_direction() {
        let mut spots = indexed_grid(4, 5);
        spots.as_mut_slice().reverse();
        spots.sort(true, false).unwrap();
        for row in 1..=4u32 {
            let cols: Vec<u32> = spots
                .iter()
                .filter(|s| s.row() == Some(row))
                .filter_map(Spot::col)
                .collect();
            let ascending = cols.windows(2).all(|w| w[0] < w[1]);
            let descending = cols.windows(2).all(|w| w[0] > w[1]);
            assert_eq!(ascending, row % 2 == 1, "row {row}");
            assert_eq!(descending, row % 2 == 0, "row {row}");
        }
        let rows: Vec<u32> = spots.iter().filter_map(Spot::row).collect();
        assert!(rows.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn reverse_sort_runs_backwards() {
        let mut spots = indexed_grid(2, 3);
        spots.sort(false, true).unwrap();
        let first = spots.get(0).and_then(|s| s.index).unwrap();
        assert_eq!((first.row, first.col), (2, 3));
    }

    #[test]
    fn sort_requires_indices() {
        let mut spots = indexed_grid(2, 2);
        spots.push(Spot::detected(0.0, 0.0, 3));
        assert!(matches!(
            spots.sort(true, false),
            Err(SpotListError::MissingIndex { .. })
        ));
        assert!(spots.remove_rows(&["a"]).is_err());
        assert!(spots.remove_columns(&[1]).is_err());
    }

    #[test]
    fn rows_and_columns_are_removed() {
        let mut spots = indexed_grid(3, 4);
        assert_eq!(spots.remove_rows(&["B"]).unwrap(), 4);
        assert_eq!(spots.remove_columns(&[1, 4]).unwrap(), 4);
        let (rows, cols) = spots.indices();
        assert_eq!(rows, vec!["a", "c"]);
        assert_eq!(cols, vec![2, 3]);
    }

    #[test]
    fn median_normalisation_round_trips() {
        let mut spots = indexed_grid(3, 3);
        let original: Vec<f64> = spots.iter().filter_map(|s| s.intensity).collect();
        let median = spots.normalize_by_median().unwrap();
        assert!((median - 22.0).abs() < 1e-12);
        assert!((spots.median_intensity().unwrap() - 1.0).abs() < 1e-12);
        for (spot, value) in spots.iter().zip(original) {
            assert!((spot.intensity.unwrap() * median - value).abs() < 1e-9);
        }
    }

    #[test]
    fn control_normalisation_needs_controls() {
        let mut spots = indexed_grid(1, 3);
        assert!(matches!(spots.normalize_by_control(), Err(SpotListError::NoControls)));
        spots.as_mut_slice()[0].role = SpotRole::Control;
        let reference = spots.normalize_by_control().unwrap();
        assert!((reference - 11.0).abs() < 1e-12);
        assert!((spots.get(0).unwrap().intensity.unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_median_is_rejected() {
        let mut spots = indexed_grid(1, 1);
        spots.as_mut_slice()[0].intensity = Some(0.0);
        assert!(matches!(spots.normalize_by_median(), Err(SpotListError::ZeroReference(_))));
    }

    #[test]
    fn sampling_reports_out_of_bounds_spots() {
        let image = GrayImageF::from_pixel(40, 40, Luma([0.5]));
        let mut spots = SpotList::from(vec![
            Spot::detected(20.0, 20.0, 4),
            Spot::detected(2.0, 20.0, 4),
        ]);
        let report = spots.get_spot_intensities(&image, 0);
        assert_eq!(report.sampled, 1);
        assert_eq!(report.out_of_bounds, vec![1]);
        assert!((spots.get(0).unwrap().raw_intensity.unwrap() - 0.5).abs() < 1e-6);
        assert!(spots.get(1).unwrap().intensity.is_none());
    }

    #[test]
    fn halo_scaling_and_reset() {
        let mut spots = indexed_grid(1, 2);
        for spot in spots.iter_mut() {
            spot.raw_intensity = spot.intensity;
        }
        spots.as_mut_slice()[1].halo_radius = 50;
        spots.scale_halos_to_intensity(0.04);
        assert!((spots.get(1).unwrap().intensity.unwrap() - 2.0).abs() < 1e-12);
        assert_eq!(spots.get(0).unwrap().intensity, Some(11.0));
        spots.reset_intensities();
        assert_eq!(spots.get(1).unwrap().intensity, Some(12.0));
    }

    #[test]
    fn corners_follow_coordinate_sums() {
        let spots = indexed_grid(3, 3);
        let top_left = spots.find_top_left().unwrap();
        let top_right = spots.find_top_right().unwrap();
        assert_eq!((top_left.x, top_left.y), (10.0, 10.0));
        assert_eq!((top_right.x, top_right.y), (30.0, 10.0));
        assert_eq!(spots.mean_radius(), Some(3.0));
        assert_eq!(spots.median_radius(), Some(3.0));
    }
}
