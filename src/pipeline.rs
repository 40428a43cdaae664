//! End-to-end runs: assay image to indexed spot list, and activity table to
//! annotated peaks.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::activity::{
    ActivityAnnotator, ActivityPeakDetector, ActivityTable, AnnotatorSettings, FeatureChromatograms,
    FeatureTable, PeakDetection, PeakDetectorSettings,
};
use crate::grid::{Grid, GridDetector, GridDetectorSettings};
use crate::halo::{HaloDetector, HaloDetectorSettings};
use crate::imaging::{GrayImageF, ImageLoaderSettings};
use crate::settings::{Settings, SettingsError, ensure_non_negative};
use crate::spots::{SamplingReport, SpotCorrector, SpotCorrectorSettings, SpotDetector, SpotDetectorSettings, SpotIndexer, SpotList};
use crate::well_range::WellRange;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisSettings {
    /// Sampling disk radius, 0 uses each spot's own radius.
    pub intensity_radius_px: u32,
    pub normalize_by_median: bool,
    pub halo_detection: bool,
    /// Replace the intensity of spots with a halo by `halo_radius * factor`.
    pub halo_scaling: bool,
    pub halo_scaling_factor: f64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            intensity_radius_px: 0,
            normalize_by_median: true,
            halo_detection: false,
            halo_scaling: false,
            halo_scaling_factor: 0.04,
        }
    }
}

/// Settings of every stage, as read from a JSON config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub image_loader: ImageLoaderSettings,
    pub spot_detector: SpotDetectorSettings,
    pub grid_detector: GridDetectorSettings,
    pub spot_corrector: SpotCorrectorSettings,
    pub halo_detector: HaloDetectorSettings,
    pub peak_detector: PeakDetectorSettings,
    pub annotator: AnnotatorSettings,
    pub analysis: AnalysisSettings,
}

impl Settings for PipelineConfig {
    fn validate(&self) -> Result<(), SettingsError> {
        self.image_loader.validate()?;
        self.spot_detector.validate()?;
        self.grid_detector.validate()?;
        self.spot_corrector.validate()?;
        self.halo_detector.validate()?;
        self.peak_detector.validate()?;
        self.annotator.validate()?;
        ensure_non_negative("analysis.halo_scaling_factor", self.analysis.halo_scaling_factor)
    }
}

impl PipelineConfig {
    /// Reads a config file. Keys left out keep their defaults.
    pub fn read_json(path: &Path) -> crate::Result<Self> {
        let patch: Value = serde_json::from_reader(std::fs::File::open(path)?)?;
        Ok(Self::default().merged(&patch)?)
    }

    pub fn write_json(&self, path: &Path) -> crate::Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

/// Output of [`analyze_image`].
#[derive(Debug, Clone)]
pub struct ImageAnalysis {
    pub spots: SpotList,
    pub grid: Grid,
    pub sampling: SamplingReport,
    /// Median intensity the list was divided by, if normalised.
    pub normalization_reference: Option<f64>,
}

/// Detection, grid correction, indexing and intensity readout for the
/// wells in `range`. Spots are left in plain row-major order.
pub fn analyze_image(image: &GrayImageF, range: &WellRange, config: &PipelineConfig) -> crate::Result<ImageAnalysis> {
    let (width, height) = image.dimensions();
    let detected = SpotDetector::new(config.spot_detector.clone()).initial_detection(image, range.spot_count());

    let mut grid = GridDetector::new(config.grid_detector.clone()).detect_grid(width, height, &detected);
    let mut spots = SpotCorrector::new(config.spot_corrector.clone()).gridbased_spotcorrection(&detected, &mut grid);
    if spots.len() != range.spot_count() {
        warn!(
            expected = range.spot_count(),
            found = spots.len(),
            "spot count after correction differs from the well range"
        );
    }

    SpotIndexer::new(range.first_row_index(), range.first_column_index()).assign_indexes(&mut spots)?;
    spots.sort(false, false)?;

    let analysis = &config.analysis;
    let sampling = spots.get_spot_intensities(image, analysis.intensity_radius_px);
    let normalization_reference = if analysis.normalize_by_median {
        Some(spots.normalize_by_median()?)
    } else {
        None
    };

    if analysis.halo_detection {
        let detector = HaloDetector::new(config.halo_detector.clone());
        let halos = detector.perform_halo_detection(image)?;
        detector.assign_halos_to_spots(&halos, &mut spots);
        if analysis.halo_scaling {
            spots.scale_halos_to_intensity(analysis.halo_scaling_factor);
        }
    }

    info!(spots = spots.len(), range = %range, "image analysis finished");
    Ok(ImageAnalysis {
        spots,
        grid,
        sampling,
        normalization_reference,
    })
}

/// Peak detection followed by feature annotation.
pub fn annotate_activity(
    table: &ActivityTable,
    features: &FeatureTable,
    chromatograms: &FeatureChromatograms,
    config: &PipelineConfig,
) -> crate::Result<PeakDetection> {
    let mut detection = ActivityPeakDetector::new(config.peak_detector.clone()).run(table)?;
    ActivityAnnotator::new(config.annotator.clone()).run(&mut detection.peaks, features, chromatograms, table)?;
    Ok(detection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn config_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = PipelineConfig::default();
        config.analysis.halo_detection = true;
        config.write_json(&path).unwrap();
        assert_eq!(PipelineConfig::read_json(&path).unwrap(), config);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config = PipelineConfig::default()
            .merged(&json!({"spot_detector": {"circle_detection": {"smallest_radius_px": 8}}}))
            .unwrap();
        assert_eq!(config.spot_detector.circle_detection.smallest_radius_px, 8);
        assert_eq!(config.spot_detector.circle_detection.largest_radius_px, 30);
        assert_eq!(config.grid_detector, GridDetectorSettings::default());
    }

    #[test]
    fn nested_validation_applies() {
        let err = PipelineConfig::default()
            .merged(&json!({"spot_corrector": {"from_grid": {"removal_threshold_px": -1.0}}}))
            .unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { key: "from_grid.removal_threshold_px", .. }));
    }
}
