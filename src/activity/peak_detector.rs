use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::table::ActivityTable;
use super::{ActivityError, Peak};
use crate::imaging::peaks::{PeakSearch, find_peaks_2d};
use crate::settings::{Settings, SettingsError, ensure_non_negative, ensure_positive};

const MAX_BASELINE_ITERATIONS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeakDetectionSettings {
    pub automatic_threshold: bool,
    pub noise_convergence: f64,
    pub manual_threshold: f64,
    #[serde(rename = "minimum_SNR")]
    pub minimum_snr: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeakDetectorSettings {
    pub peak_detection: PeakDetectionSettings,
}

impl Default for PeakDetectorSettings {
    fn default() -> Self {
        Self {
            peak_detection: PeakDetectionSettings {
                automatic_threshold: true,
                noise_convergence: 0.02,
                manual_threshold: 0.0,
                minimum_snr: 3.0,
            },
        }
    }
}

impl Settings for PeakDetectorSettings {
    fn validate(&self) -> Result<(), SettingsError> {
        let p = &self.peak_detection;
        ensure_positive("peak_detection.noise_convergence", p.noise_convergence)?;
        ensure_non_negative("peak_detection.minimum_SNR", p.minimum_snr)?;
        if !p.manual_threshold.is_finite() {
            return Err(SettingsError::invalid(
                "peak_detection.manual_threshold",
                "expected a finite number",
            ));
        }
        Ok(())
    }
}

/// Result of one detection run.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakDetection {
    pub threshold: f64,
    pub peaks: Vec<Peak>,
}

fn mean_and_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

/// Mean and sample standard deviation of the baseline.
///
/// Values at or above `mean + 3 std` are excluded from the full signal
/// and the statistics recomputed until the standard deviation changes by
/// no more than `convergence`. NaN samples are ignored.
pub fn baseline_noise(values: &[f64], convergence: f64) -> Option<(f64, f64)> {
    let values: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if values.len() < 2 {
        return None;
    }
    let (mut mean, mut std) = mean_and_std(&values);
    for _ in 0..MAX_BASELINE_ITERATIONS {
        let cutoff = mean + 3.0 * std;
        let kept: Vec<f64> = values.iter().copied().filter(|&v| v < cutoff).collect();
        if kept.len() < 2 {
            break;
        }
        let (new_mean, new_std) = mean_and_std(&kept);
        let change = (new_std - std).abs();
        mean = new_mean;
        std = new_std;
        if change <= convergence {
            break;
        }
    }
    Some((mean, std))
}

/// Positions of strict local minima, plateaus reported at their middle.
/// The first and last sample never qualify.
pub fn local_minima(values: &[f64]) -> Vec<usize> {
    let mut minima = Vec::new();
    if values.len() < 3 {
        return minima;
    }
    let last = values.len() - 1;
    let mut i = 1;
    while i < last {
        if values[i - 1] > values[i] {
            let mut ahead = i + 1;
            while ahead < last && values[ahead] == values[i] {
                ahead += 1;
            }
            if values[ahead] > values[i] {
                minima.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    minima
}

/// Nearest minimum below and above `apex`, falling back to the table ends.
pub fn peak_bounds(apex: usize, minima: &[usize], len: usize) -> (usize, usize) {
    let start = minima.iter().rev().copied().find(|&m| m < apex).unwrap_or(0);
    let end = minima
        .iter()
        .copied()
        .find(|&m| m > apex)
        .unwrap_or(len.saturating_sub(1));
    (start, end)
}

/// Trapezoidal area with unit spacing over `values[start..=end]`.
/// Intervals touching a NaN sample add nothing.
pub fn trapezoid_area(values: &[f64], start: usize, end: usize) -> f64 {
    values[start..=end]
        .windows(2)
        .filter(|w| w[0].is_finite() && w[1].is_finite())
        .map(|w| (w[0] + w[1]) / 2.0)
        .sum()
}

/// Finds activity peaks on the row × column layout of an activity table.
#[derive(Debug, Clone, Default)]
pub struct ActivityPeakDetector {
    settings: PeakDetectorSettings,
}

impl ActivityPeakDetector {
    pub fn new(settings: PeakDetectorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PeakDetectorSettings {
        &self.settings
    }

    pub fn change_settings(&mut self, patch: &Value) -> Result<(), SettingsError> {
        self.settings = self.settings.merged(patch)?;
        Ok(())
    }

    /// Absolute intensity a peak apex has to exceed.
    pub fn threshold(&self, intensities: &[f64]) -> Result<f64, ActivityError> {
        let p = &self.settings.peak_detection;
        if !p.automatic_threshold {
            return Ok(p.manual_threshold);
        }
        let (mean, std) = baseline_noise(intensities, p.noise_convergence).ok_or(ActivityError::EmptyTable)?;
        debug!(mean, std, "baseline noise");
        Ok(mean + p.minimum_snr * std)
    }

    /// Detects peaks and numbers them by descending apex intensity.
    pub fn run(&self, table: &ActivityTable) -> Result<PeakDetection, ActivityError> {
        if table.is_empty() {
            return Err(ActivityError::EmptyTable);
        }
        let intensities = table.intensities();
        let times = table.retention_times()?;
        let threshold = self.threshold(&intensities)?;

        let wide = table.pivot()?;
        let apexes = find_peaks_2d(
            &wide.values,
            wide.width(),
            wide.height(),
            PeakSearch::square(1, threshold),
        );

        let minima = local_minima(&intensities);
        let mut peaks = Vec::with_capacity(apexes.len());
        for (number, (col, row)) in apexes.into_iter().enumerate() {
            let (row_name, column) = (&wide.row_names[row], wide.columns[col]);
            let index = table
                .position_of(row_name, column)
                .ok_or_else(|| ActivityError::UnknownCell {
                    row_name: row_name.clone(),
                    column,
                })?;
            let (start_idx, end_idx) = peak_bounds(index, &minima, intensities.len());
            peaks.push(Peak {
                number,
                index,
                start_idx,
                end_idx,
                retention_time: times[index],
                start_rt: times[start_idx],
                end_rt: times[end_idx],
                intensity: intensities[index],
                auc: trapezoid_area(&intensities, start_idx, end_idx),
                correlated_feature_ids: Vec::new(),
                correlation_coeff_features: Vec::new(),
            });
        }
        info!(peaks = peaks.len(), threshold, "activity peak detection");
        Ok(PeakDetection { threshold, peaks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spots::{Spot, SpotList};
    use serde_json::json;

    /// 3 rows x 10 columns of noisy baseline with peaks at b3 and c6.
    fn chromatogram() -> ActivityTable {
        let mut spots = SpotList::default();
        for row in 1..=3u32 {
            for col in 1..=10u32 {
                let i = ((row - 1) * 10 + col - 1) as usize;
                let value = match i {
                    12 => 8.0,
                    11 | 13 => 3.0,
                    25 => 6.0,
                    _ => 1.0 + 0.05 * (((i * 7) % 5) as f64 - 2.0),
                };
                let mut spot = Spot::detected(col as f64 * 10.0, row as f64 * 10.0, 4);
                spot.set_index(row, col);
                spot.intensity = Some(value);
                spots.push(spot);
            }
        }
        let mut table = ActivityTable::from_spot_list(&spots).unwrap();
        table.assign_retention_times(0.0, 290.0).unwrap();
        table
    }

    #[test]
    fn minima_skip_edges_and_centre_plateaus() {
        let values = [3.0, 1.0, 2.0, 2.0, 0.0, 0.0, 0.0, 4.0, 5.0, 5.0];
        let minima = local_minima(&values);
        assert_eq!(minima, vec![1, 5]);
        assert_eq!(peak_bounds(7, &minima, values.len()), (5, 9));
        assert_eq!(peak_bounds(0, &minima, values.len()), (0, 1));
        assert_eq!(peak_bounds(3, &minima, values.len()), (1, 5));
    }

    #[test]
    fn trapezoid_uses_unit_spacing() {
        assert_eq!(trapezoid_area(&[0.0, 2.0, 4.0, 2.0, 0.0], 0, 4), 8.0);
        assert_eq!(trapezoid_area(&[5.0, 1.0], 1, 1), 0.0);
        assert_eq!(trapezoid_area(&[0.0, 2.0, f64::NAN, 2.0, 0.0], 0, 4), 2.0);
    }

    #[test]
    fn baseline_ignores_peaks() {
        let table = chromatogram();
        let (mean, std) = baseline_noise(&table.intensities(), 0.02).unwrap();
        assert!((mean - 1.0).abs() < 0.05, "mean {mean}");
        assert!(std < 0.1, "std {std}");
        assert!(baseline_noise(&[1.0], 0.02).is_none());
    }

    #[test]
    fn peaks_are_found_in_two_dimensions() {
        let detection = ActivityPeakDetector::default().run(&chromatogram()).unwrap();
        assert!(detection.threshold > 1.1 && detection.threshold < 2.0);
        let apexes: Vec<usize> = detection.peaks.iter().map(|p| p.index).collect();
        assert_eq!(apexes, vec![12, 25]);

        let first = &detection.peaks[0];
        assert_eq!(first.number, 0);
        assert_eq!(first.intensity, 8.0);
        assert_eq!(first.retention_time, 120.0);
        assert!(first.start_idx <= 10 && first.end_idx >= 14);
        assert!(first.auc > 11.0);
        for peak in &detection.peaks {
            assert!(peak.start_idx <= peak.index && peak.index <= peak.end_idx);
            assert!(peak.start_rt <= peak.retention_time && peak.retention_time <= peak.end_rt);
        }
    }

    #[test]
    fn unsampled_spot_does_not_stop_detection() {
        let records = chromatogram()
            .records()
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, mut r)| {
                if i == 29 {
                    r.spot_intensity = None;
                }
                r
            })
            .collect::<Vec<_>>();
        let mut table = ActivityTable::from(records);
        table.gaussian_smooth(0.5);
        assert_eq!(table.records()[29].spot_intensity, None);

        let detection = ActivityPeakDetector::default().run(&table).unwrap();
        assert!(detection.threshold.is_finite());
        let apexes: Vec<usize> = detection.peaks.iter().map(|p| p.index).collect();
        assert_eq!(apexes, vec![12, 25]);
        assert!(detection.peaks.iter().all(|p| p.intensity.is_finite() && p.auc.is_finite()));
    }

    #[test]
    fn manual_threshold_replaces_baseline() {
        let mut detector = ActivityPeakDetector::default();
        detector
            .change_settings(&json!({"peak_detection": {"automatic_threshold": false, "manual_threshold": 7.0}}))
            .unwrap();
        let detection = detector.run(&chromatogram()).unwrap();
        assert_eq!(detection.threshold, 7.0);
        assert_eq!(detection.peaks.len(), 1);
        assert_eq!(detection.peaks[0].index, 12);
    }

    #[test]
    fn snr_key_keeps_its_name() {
        let mut detector = ActivityPeakDetector::default();
        detector.change_settings(&json!({"peak_detection": {"minimum_SNR": 5}})).unwrap();
        assert_eq!(detector.settings().peak_detection.minimum_snr, 5.0);
        assert!(detector.change_settings(&json!({"peak_detection": {"noise_convergence": 0}})).is_err());
    }

    #[test]
    fn times_are_required() {
        let table = ActivityTable::from(
            chromatogram()
                .records()
                .iter()
                .cloned()
                .map(|mut r| {
                    r.retention_time = None;
                    r
                })
                .collect::<Vec<_>>(),
        );
        assert!(matches!(
            ActivityPeakDetector::default().run(&table),
            Err(ActivityError::MissingRetentionTime { position: 0 })
        ));
    }
}
