use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::ActivityError;
use super::correlation::linspace;
use crate::imaging::edges::reflect;
use crate::spots::{SpotList, SpotRecord};

const GAUSSIAN_TRUNCATE: f64 = 4.0;
const MAX_BASELINE_ROUNDS: usize = 1000;

/// Normalised Gaussian taps spanning `±round(4σ)`.
fn gaussian_taps(sigma: f64) -> Vec<f64> {
    if sigma <= 0.0 {
        return vec![1.0];
    }
    let radius = (GAUSSIAN_TRUNCATE * sigma + 0.5) as i64;
    let mut taps: Vec<f64> = (-radius..=radius)
        .map(|x| (-0.5 * (x as f64 / sigma).powi(2)).exp())
        .collect();
    let total: f64 = taps.iter().sum();
    for tap in taps.iter_mut() {
        *tap /= total;
    }
    taps
}

/// Solves `m x = b` by Gaussian elimination with partial pivoting.
fn solve(mut m: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| m[i][col].abs().total_cmp(&m[j][col].abs()))?;
        if m[pivot][col].abs() < 1e-12 {
            return None;
        }
        m.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = m[row][col] / m[col][col];
            for k in col..n {
                m[row][k] -= factor * m[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| m[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / m[row][row];
    }
    Some(x)
}

/// Least-squares weights that evaluate a degree `polyorder` fit over
/// `window` samples at offset `at` from the window centre.
fn savgol_weights(window: usize, polyorder: usize, at: f64) -> Option<Vec<f64>> {
    let half = (window / 2) as f64;
    let scale = half.max(1.0);
    let xs: Vec<f64> = (0..window).map(|j| (j as f64 - half) / scale).collect();
    let terms = polyorder + 1;
    let mut normal = vec![vec![0.0; terms]; terms];
    for x in &xs {
        for (r, row) in normal.iter_mut().enumerate() {
            for (c, cell) in row.iter_mut().enumerate() {
                *cell += x.powi((r + c) as i32);
            }
        }
    }
    let target: Vec<f64> = (0..terms).map(|k| (at / scale).powi(k as i32)).collect();
    let z = solve(normal, target)?;
    Some(
        xs.iter()
            .map(|x| z.iter().enumerate().map(|(k, zk)| zk * x.powi(k as i32)).sum())
            .collect(),
    )
}

/// Savitzky-Golay filter. The first and last `window / 2` samples take
/// the polynomial fitted to the first and last full window.
fn savgol_filter(values: &[f64], window: usize, polyorder: usize) -> Option<Vec<f64>> {
    let n = values.len();
    let half = window / 2;
    let centre = savgol_weights(window, polyorder, 0.0)?;
    let mut out = vec![0.0; n];
    for i in half..n - half {
        out[i] = centre.iter().zip(&values[i - half..=i + half]).map(|(w, v)| w * v).sum();
    }
    for i in 0..half {
        let head = savgol_weights(window, polyorder, i as f64 - half as f64)?;
        out[i] = head.iter().zip(&values[..window]).map(|(w, v)| w * v).sum();
        let tail = savgol_weights(window, polyorder, half as f64 - i as f64)?;
        out[n - 1 - i] = tail.iter().zip(&values[n - window..]).map(|(w, v)| w * v).sum();
    }
    Some(out)
}

/// One spot of the activity chromatogram, in the interchange column layout
/// plus the assigned retention time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
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
    #[serde(rename = "RT", default)]
    pub retention_time: Option<f64>,
}

impl From<SpotRecord> for ActivityRecord {
    fn from(record: SpotRecord) -> Self {
        Self {
            row: record.row,
            row_name: record.row_name,
            column: record.column,
            kind: record.kind,
            x_coord: record.x_coord,
            y_coord: record.y_coord,
            radius: record.radius,
            halo_radius: record.halo_radius,
            spot_intensity: record.spot_intensity,
            raw_int: record.raw_int,
            note: record.note,
            retention_time: None,
        }
    }
}

/// Row × column view of the spot intensities.
#[derive(Debug, Clone, PartialEq)]
pub struct WideTable {
    pub row_names: Vec<String>,
    pub columns: Vec<u32>,
    /// Row-major, `NaN` where no spot sits.
    pub values: Vec<f64>,
}

impl WideTable {
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn height(&self) -> usize {
        self.row_names.len()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.height() && col < self.width() {
            Some(self.values[row * self.width() + col])
        } else {
            None
        }
    }
}

/// Long-format activity chromatogram, one record per spot in acquisition
/// order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityTable {
    records: Vec<ActivityRecord>,
}

impl From<Vec<ActivityRecord>> for ActivityTable {
    fn from(records: Vec<ActivityRecord>) -> Self {
        Self { records }
    }
}

impl ActivityTable {
    /// Every spot must carry a row and column index.
    pub fn from_spot_list(spots: &SpotList) -> Result<Self, ActivityError> {
        let records = spots
            .iter()
            .enumerate()
            .map(|(position, spot)| match spot.index {
                Some(_) => Ok(ActivityRecord::from(SpotRecord::from(spot))),
                None => Err(ActivityError::MissingIndex { position }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { records })
    }

    pub fn records(&self) -> &[ActivityRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Spreads retention times linearly from `start` to `end` over the
    /// current record order.
    pub fn assign_retention_times(&mut self, start: f64, end: f64) -> Result<(), ActivityError> {
        if !(start.is_finite() && end.is_finite()) || end < start {
            return Err(ActivityError::InvalidTimeRange { start, end });
        }
        let times = linspace(start, end, self.records.len());
        for (record, rt) in self.records.iter_mut().zip(times) {
            record.retention_time = Some(rt);
        }
        debug!(records = self.records.len(), start, end, "assigned retention times");
        Ok(())
    }

    /// 1-D Gaussian filter over the intensity sequence, reflecting at both
    /// ends. Unsampled spots stay unsampled and do not contribute, the
    /// remaining taps are renormalised.
    pub fn gaussian_smooth(&mut self, sigma: f64) {
        let values = self.intensities();
        let taps = gaussian_taps(sigma);
        let radius = (taps.len() / 2) as i64;
        let n = values.len();
        for (i, record) in self.records.iter_mut().enumerate() {
            if !values[i].is_finite() {
                continue;
            }
            let (sum, weight) = taps
                .iter()
                .enumerate()
                .map(|(k, tap)| (tap, values[reflect(i as i64 + k as i64 - radius, n)]))
                .filter(|(_, v)| v.is_finite())
                .fold((0.0, 0.0), |(sum, weight), (tap, v)| (sum + tap * v, weight + tap));
            record.spot_intensity = Some(sum / weight);
        }
    }

    /// Removes a slowly varying baseline from the intensities and returns
    /// it.
    ///
    /// The baseline starts as the signal and is replaced by the pointwise
    /// minimum of itself and its Savitzky-Golay smooth until the RMS change
    /// of one round falls to `convergence`. `window` is clipped to the
    /// number of sampled spots and made odd. Unsampled spots are skipped
    /// and read NaN in the returned baseline.
    pub fn baseline_correct(
        &mut self,
        window: usize,
        polyorder: usize,
        convergence: f64,
    ) -> Result<Vec<f64>, ActivityError> {
        let values = self.intensities();
        let sampled: Vec<usize> = (0..values.len()).filter(|&i| values[i].is_finite()).collect();
        let mut window = window.min(sampled.len());
        if window % 2 == 0 {
            window = window.saturating_sub(1);
        }
        if window <= polyorder {
            return Err(ActivityError::BaselineWindow { window, polyorder });
        }

        let mut level: Vec<f64> = sampled.iter().map(|&i| values[i]).collect();
        let mut rounds = 0;
        while rounds < MAX_BASELINE_ROUNDS {
            rounds += 1;
            let smooth = savgol_filter(&level, window, polyorder)
                .ok_or(ActivityError::BaselineWindow { window, polyorder })?;
            let mut squared = 0.0;
            for (current, fitted) in level.iter_mut().zip(smooth) {
                let next = current.min(fitted);
                squared += (next - *current).powi(2);
                *current = next;
            }
            if (squared / level.len() as f64).sqrt() <= convergence {
                break;
            }
        }
        debug!(window, polyorder, rounds, "baseline level");

        let mut baseline = vec![f64::NAN; values.len()];
        for (&i, &b) in sampled.iter().zip(&level) {
            baseline[i] = b;
            self.records[i].spot_intensity = Some(values[i] - b);
        }
        Ok(baseline)
    }

    /// Intensities in record order. Unsampled spots read NaN.
    pub fn intensities(&self) -> Vec<f64> {
        let values: Vec<f64> = self
            .records
            .iter()
            .map(|r| r.spot_intensity.unwrap_or(f64::NAN))
            .collect();
        let missing = values.iter().filter(|v| !v.is_finite()).count();
        if missing > 0 {
            warn!(missing, "spots without intensity are carried as NaN");
        }
        values
    }

    pub fn retention_times(&self) -> Result<Vec<f64>, ActivityError> {
        self.records
            .iter()
            .enumerate()
            .map(|(position, r)| r.retention_time.ok_or(ActivityError::MissingRetentionTime { position }))
            .collect()
    }

    /// Position of the record standing for cell `row_name`, `column`.
    ///
    /// When spots share a cell, the most intense sampled one is taken,
    /// earlier records winning ties. [`pivot`](Self::pivot) reports the mean
    /// of the same records.
    pub fn position_of(&self, row_name: &str, column: u32) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (position, record) in self.records.iter().enumerate() {
            if record.column != Some(column) || !record.row_name.eq_ignore_ascii_case(row_name) {
                continue;
            }
            let value = record
                .spot_intensity
                .filter(|v| v.is_finite())
                .unwrap_or(f64::NEG_INFINITY);
            match best {
                Some((_, top)) if top >= value => {}
                _ => best = Some((position, value)),
            }
        }
        best.map(|(position, _)| position)
    }

    /// Pivots intensities to rows × columns. Duplicate cells are averaged,
    /// records without a finite intensity are skipped.
    pub fn pivot(&self) -> Result<WideTable, ActivityError> {
        if self.records.is_empty() {
            return Err(ActivityError::EmptyTable);
        }
        let mut row_names: Vec<String> = Vec::new();
        let mut columns: Vec<u32> = Vec::new();
        for (position, record) in self.records.iter().enumerate() {
            let Some(column) = record.column.filter(|_| !record.row_name.is_empty()) else {
                return Err(ActivityError::MissingIndex { position });
            };
            let name = record.row_name.to_ascii_lowercase();
            if !row_names.contains(&name) {
                row_names.push(name);
            }
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
        // "aa" after "z"
        row_names.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        columns.sort_unstable();

        let width = columns.len();
        let mut sums = vec![0.0; row_names.len() * width];
        let mut counts = vec![0u32; sums.len()];
        for record in &self.records {
            let (Some(value), Some(column)) = (record.spot_intensity.filter(|v| v.is_finite()), record.column) else {
                continue;
            };
            let name = record.row_name.to_ascii_lowercase();
            let (Some(r), Some(c)) = (
                row_names.iter().position(|n| *n == name),
                columns.iter().position(|&k| k == column),
            ) else {
                continue;
            };
            sums[r * width + c] += value;
            counts[r * width + c] += 1;
        }
        let values = sums
            .iter()
            .zip(&counts)
            .map(|(&sum, &count)| if count == 0 { f64::NAN } else { sum / count as f64 })
            .collect();
        Ok(WideTable {
            row_names,
            columns,
            values,
        })
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> crate::Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        for record in &self.records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn read_csv<R: Read>(reader: R) -> crate::Result<Self> {
        let mut reader = csv::Reader::from_reader(reader);
        let records = reader.deserialize().collect::<Result<Vec<ActivityRecord>, _>>()?;
        Ok(Self { records })
    }

    pub fn write_csv_path(&self, path: &Path) -> crate::Result<()> {
        self.write_csv(std::fs::File::create(path)?)
    }

    pub fn read_csv_path(path: &Path) -> crate::Result<Self> {
        Self::read_csv(std::fs::File::open(path)?)
    }
}
