use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::correlation::{pearson, resample_normalized, sampling_frequency};
use super::features::{Feature, FeatureChromatograms, FeatureTable};
use super::table::ActivityTable;
use super::{ActivityError, Peak};
use crate::settings::{Settings, SettingsError, ensure_non_negative};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RtCorrelationSettings {
    pub window_s: f64,
    pub bias_s: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnnotatorSettings {
    pub rt_correlation: RtCorrelationSettings,
}

impl Default for AnnotatorSettings {
    fn default() -> Self {
        Self {
            rt_correlation: RtCorrelationSettings {
                window_s: 2.0,
                bias_s: 0.0,
            },
        }
    }
}

impl Settings for AnnotatorSettings {
    fn validate(&self) -> Result<(), SettingsError> {
        ensure_non_negative("rt_correlation.window_s", self.rt_correlation.window_s)?;
        if !self.rt_correlation.bias_s.is_finite() {
            return Err(SettingsError::invalid("rt_correlation.bias_s", "expected a finite number"));
        }
        Ok(())
    }
}

/// Sampled part of the activity trace, sorted by retention time.
struct ActivityTrace {
    rt: Vec<f64>,
    intensity: Vec<f64>,
}

impl ActivityTrace {
    fn from_table(table: &ActivityTable) -> Result<Self, ActivityError> {
        let mut samples: Vec<(f64, f64)> = table
            .retention_times()?
            .into_iter()
            .zip(table.intensities())
            .filter(|(_, intensity)| intensity.is_finite())
            .collect();
        samples.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (rt, intensity) = samples.into_iter().unzip();
        Ok(Self { rt, intensity })
    }
}

/// Links activity peaks to MS features by retention time, then scores each
/// link by elution shape.
#[derive(Debug, Clone, Default)]
pub struct ActivityAnnotator {
    settings: AnnotatorSettings,
}

impl ActivityAnnotator {
    pub fn new(settings: AnnotatorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &AnnotatorSettings {
        &self.settings
    }

    pub fn change_settings(&mut self, patch: &Value) -> Result<(), SettingsError> {
        self.settings = self.settings.merged(patch)?;
        Ok(())
    }

    /// Replaces each peak's linked features with those whose apex lies
    /// within the window around the bias-corrected peak time.
    pub fn correlate_by_retention_time(&self, peaks: &mut [Peak], features: &FeatureTable) {
        let RtCorrelationSettings { window_s, bias_s } = self.settings.rt_correlation;
        for peak in peaks.iter_mut() {
            peak.clear_correlations();
            let target = peak.retention_time + bias_s;
            peak.correlated_feature_ids = features
                .iter()
                .filter(|f| (f.rt - target).abs() <= window_s)
                .map(|f| f.id.clone())
                .collect();
            debug!(peak = peak.number, linked = peak.correlated_feature_ids.len(), "retention time links");
        }
    }

    /// Scores every linked feature of every peak by Pearson correlation of
    /// the overlapping, resampled elution profiles. A feature without a
    /// chromatogram scores NaN.
    ///
    /// Fails without touching any peak when a linked id is not in
    /// `features`.
    pub fn correlate_by_shape(
        &self,
        peaks: &mut [Peak],
        features: &FeatureTable,
        chromatograms: &FeatureChromatograms,
        table: &ActivityTable,
    ) -> Result<(), ActivityError> {
        let linked = peaks
            .iter()
            .map(|peak| {
                peak.correlated_feature_ids
                    .iter()
                    .map(|id| features.get(id).ok_or_else(|| ActivityError::UnknownFeature(id.clone())))
                    .collect::<Result<Vec<&Feature>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;
        let trace = ActivityTrace::from_table(table)?;
        peaks.par_iter_mut().zip(linked).try_for_each(|(peak, linked)| {
            let mut coefficients = Vec::with_capacity(linked.len());
            for feature in linked {
                let coefficient = match shape_correlation(peak, feature, chromatograms, &trace) {
                    Err(ActivityError::MissingChromatogram(id)) => {
                        warn!(feature = %id, peak = peak.number, "no chromatogram, correlation left empty");
                        f64::NAN
                    }
                    other => other?,
                };
                coefficients.push(coefficient);
            }
            peak.correlation_coeff_features = coefficients;
            Ok(())
        })
    }

    pub fn run(
        &self,
        peaks: &mut [Peak],
        features: &FeatureTable,
        chromatograms: &FeatureChromatograms,
        table: &ActivityTable,
    ) -> Result<(), ActivityError> {
        self.correlate_by_retention_time(peaks, features);
        self.correlate_by_shape(peaks, features, chromatograms, table)?;
        let links: usize = peaks.iter().map(|p| p.correlated_feature_ids.len()).sum();
        info!(peaks = peaks.len(), links, "annotated activity peaks");
        Ok(())
    }
}

/// Equal-length windows around the activity apex and the feature apex,
/// limited by the shorter rising and the shorter falling flank.
pub fn overlapping_bounds(peak: &Peak, feature: &Feature) -> ((f64, f64), (f64, f64)) {
    let before = (peak.retention_time - peak.start_rt).min(feature.rt - feature.rt_start);
    let after = (peak.end_rt - peak.retention_time).min(feature.rt_end - feature.rt);
    (
        (peak.retention_time - before, peak.retention_time + after),
        (feature.rt - before, feature.rt + after),
    )
}

fn shape_correlation(
    peak: &Peak,
    feature: &Feature,
    chromatograms: &FeatureChromatograms,
    trace: &ActivityTrace,
) -> Result<f64, ActivityError> {
    let chromatogram = chromatograms
        .get(&feature.id)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ActivityError::MissingChromatogram(feature.id.clone()))?;
    let (activity_bounds, feature_bounds) = overlapping_bounds(peak, feature);

    let frequency = sampling_frequency(&trace.rt).max(sampling_frequency(&chromatogram.rt));
    let span = (activity_bounds.1 - activity_bounds.0).abs();
    let count = if (span * frequency).is_finite() {
        (span * frequency) as usize
    } else {
        0
    };

    let activity = resample_normalized(activity_bounds, count, &trace.rt, &trace.intensity);
    let ion = resample_normalized(feature_bounds, count, &chromatogram.rt, &chromatogram.intensity);
    pearson(&activity, &ion)
}
