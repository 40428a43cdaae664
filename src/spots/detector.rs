use image::GrayImage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{Spot, SpotList};
use crate::imaging::edges::canny;
use crate::imaging::greyscale::{GrayImageF, to_gray_u8};
use crate::imaging::histogram::equalize_local;
use crate::imaging::hough::{CircleSearch, hough_circles};
use crate::settings::{Settings, SettingsError, ensure_fraction, ensure_non_negative, ensure_positive};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EdgeDetectionSettings {
    pub sigma: f64,
    pub low_threshold: f64,
    pub high_threshold: f64,
    /// Disk radius of the local equalisation footprint, 0 disables it.
    pub equalization_radius_px: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CircleDetectionSettings {
    pub min_distance_px_x: u32,
    pub min_distance_px_y: u32,
    pub smallest_radius_px: u32,
    pub largest_radius_px: u32,
    pub detection_threshold: f64,
}

impl CircleDetectionSettings {
    pub(crate) fn validate(&self, prefix: &'static str) -> Result<(), SettingsError> {
        if self.smallest_radius_px == 0 {
            return Err(SettingsError::invalid(prefix, "smallest_radius_px must be at least 1"));
        }
        if self.largest_radius_px < self.smallest_radius_px {
            return Err(SettingsError::invalid(
                prefix,
                format!(
                    "largest_radius_px ({}) is below smallest_radius_px ({})",
                    self.largest_radius_px, self.smallest_radius_px
                ),
            ));
        }
        ensure_fraction(prefix, self.detection_threshold)
    }

    pub(crate) fn search(&self, max_peaks: Option<usize>) -> CircleSearch {
        CircleSearch {
            smallest_radius_px: self.smallest_radius_px,
            largest_radius_px: self.largest_radius_px,
            min_distance_px_x: self.min_distance_px_x as usize,
            min_distance_px_y: self.min_distance_px_y as usize,
            relative_threshold: self.detection_threshold,
            max_peaks,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpotDetectorSettings {
    pub edge_detection: EdgeDetectionSettings,
    pub circle_detection: CircleDetectionSettings,
}

impl Default for SpotDetectorSettings {
    fn default() -> Self {
        Self {
            edge_detection: EdgeDetectionSettings {
                sigma: 10.0,
                low_threshold: 0.001,
                high_threshold: 0.001,
                equalization_radius_px: 50,
            },
            circle_detection: CircleDetectionSettings {
                min_distance_px_x: 70,
                min_distance_px_y: 70,
                smallest_radius_px: 20,
                largest_radius_px: 30,
                detection_threshold: 0.3,
            },
        }
    }
}

impl Settings for SpotDetectorSettings {
    fn validate(&self) -> Result<(), SettingsError> {
        let edges = &self.edge_detection;
        ensure_positive("edge_detection.sigma", edges.sigma)?;
        ensure_non_negative("edge_detection.low_threshold", edges.low_threshold)?;
        ensure_non_negative("edge_detection.high_threshold", edges.high_threshold)?;
        if edges.high_threshold < edges.low_threshold {
            return Err(SettingsError::invalid(
                "edge_detection.high_threshold",
                "must not be below low_threshold",
            ));
        }
        self.circle_detection.validate("circle_detection")
    }
}

/// Finds the initial spot candidates in an assay image.
#[derive(Debug, Clone, Default)]
pub struct SpotDetector {
    settings: SpotDetectorSettings,
}

impl SpotDetector {
    pub fn new(settings: SpotDetectorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SpotDetectorSettings {
        &self.settings
    }

    pub fn change_settings(&mut self, patch: &Value) -> Result<(), SettingsError> {
        self.settings = self.settings.merged(patch)?;
        Ok(())
    }

    /// Local equalisation followed by Canny.
    pub fn get_image_edges(&self, image: &GrayImageF) -> GrayImage {
        let edges = &self.settings.edge_detection;
        let equalized = equalize_local(&to_gray_u8(image), edges.equalization_radius_px);
        let normalized = GrayImageF::from_fn(equalized.width(), equalized.height(), |x, y| {
            image::Luma([equalized.get_pixel(x, y)[0] as f32 / 255.0])
        });
        canny(&normalized, edges.sigma, edges.low_threshold, edges.high_threshold)
    }

    /// Up to `spot_count` spots tagged as initial detections. Fewer are
    /// returned when the accumulator runs out of peaks above threshold.
    pub fn detect_spots(&self, edges: &GrayImage, spot_count: usize) -> SpotList {
        let search = self.settings.circle_detection.search(Some(spot_count));
        hough_circles(edges, &search)
            .into_iter()
            .map(|c| Spot::detected(c.x as f64, c.y as f64, c.radius))
            .collect()
    }

    pub fn initial_detection(&self, image: &GrayImageF, spot_count: usize) -> SpotList {
        let edges = self.get_image_edges(image);
        debug!(
            edge_pixels = edges.iter().filter(|&&v| v != 0).count(),
            "edge detection done"
        );
        let spots = self.detect_spots(&edges, spot_count);
        info!(requested = spot_count, detected = spots.len(), "initial spot detection");
        spots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_validate() {
        assert!(SpotDetectorSettings::default().validate().is_ok());
    }

    #[test]
    fn inverted_radius_range_is_rejected() {
        let mut detector = SpotDetector::default();
        let err = detector
            .change_settings(&json!({"circle_detection": {"largest_radius_px": 5}}))
            .unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { .. }));
        // failed updates leave the settings untouched
        assert_eq!(detector.settings().circle_detection.largest_radius_px, 30);
    }

    #[test]
    fn single_disk_is_detected() {
        let image = GrayImageF::from_fn(80, 80, |x, y| {
            let (dx, dy) = (x as f32 - 40.0, y as f32 - 38.0);
            image::Luma([if dx * dx + dy * dy < 144.0 { 0.9 } else { 0.1 }])
        });
        let settings = SpotDetectorSettings::default()
            .merged(&json!({
                "edge_detection": {"sigma": 1.5, "low_threshold": 0.05, "high_threshold": 0.1,
                                   "equalization_radius_px": 0},
                "circle_detection": {"smallest_radius_px": 9, "largest_radius_px": 15,
                                     "min_distance_px_x": 20, "min_distance_px_y": 20}
            }))
            .unwrap();
        let spots = SpotDetector::new(settings).initial_detection(&image, 1);
        assert_eq!(spots.len(), 1);
        let spot = spots.get(0).unwrap();
        assert!((spot.x - 40.0).abs() <= 1.0 && (spot.y - 38.0).abs() <= 1.0);
        assert!((11..=13).contains(&spot.radius));
    }
}
