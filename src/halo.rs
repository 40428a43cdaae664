//! Detection of ring-shaped halos around spots.

use image::GrayImage;
use kornia::{
    image::{Image, ImageError, ImageSize, allocator::CpuAllocator},
    imgproc,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::imaging::GrayImageF;
use crate::imaging::greyscale::rescale_to_u8;
use crate::imaging::histogram::otsu_threshold;
use crate::imaging::hough::hough_circles;
use crate::imaging::morphology::{dilate_disk, open_disk, regional_maxima, remove_small_objects, skeletonize};
use crate::settings::{Settings, SettingsError, ensure_non_negative};
use crate::spots::SpotList;
use crate::spots::detector::CircleDetectionSettings;

type CpuImage<T, const C: usize> = Image<T, C, CpuAllocator>;

#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("kornia image error: {0}")]
    Kornia(#[from] ImageError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Halo {
    pub x: f64,
    pub y: f64,
    pub radius: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HaloPreprocessingSettings {
    pub disk_radius_opening: u8,
    pub minimum_object_size_px: usize,
    pub disk_radius_dilation: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HaloAssignmentSettings {
    pub distance_threshold_px: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HaloDetectorSettings {
    pub preprocessing: HaloPreprocessingSettings,
    pub circle_detection: CircleDetectionSettings,
    pub halo_assignment: HaloAssignmentSettings,
}

impl Default for HaloDetectorSettings {
    fn default() -> Self {
        Self {
            preprocessing: HaloPreprocessingSettings {
                disk_radius_opening: 5,
                minimum_object_size_px: 800,
                disk_radius_dilation: 10,
            },
            circle_detection: CircleDetectionSettings {
                min_distance_px_x: 70,
                min_distance_px_y: 70,
                smallest_radius_px: 40,
                largest_radius_px: 100,
                detection_threshold: 0.2,
            },
            halo_assignment: HaloAssignmentSettings {
                distance_threshold_px: 15.0,
            },
        }
    }
}

impl Settings for HaloDetectorSettings {
    fn validate(&self) -> Result<(), SettingsError> {
        self.circle_detection.validate("circle_detection")?;
        ensure_non_negative(
            "halo_assignment.distance_threshold_px",
            self.halo_assignment.distance_threshold_px,
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct HaloDetector {
    settings: HaloDetectorSettings,
}

impl HaloDetector {
    pub fn new(settings: HaloDetectorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &HaloDetectorSettings {
        &self.settings
    }

    pub fn change_settings(&mut self, patch: &Value) -> Result<(), SettingsError> {
        self.settings = self.settings.merged(patch)?;
        Ok(())
    }

    /// Thin ring mask of the halos, thickened by the dilation radius.
    pub fn create_halo_skeleton(&self, image: &GrayImageF) -> Result<GrayImage, DetectionError> {
        let (width, height) = image.dimensions();
        let filtered = regional_maxima(image);

        let gray = CpuImage::<u8, 1>::new(
            ImageSize {
                width: width as usize,
                height: height as usize,
            },
            rescale_to_u8(&filtered),
            CpuAllocator,
        )?;
        let threshold = otsu_threshold(gray.as_slice());
        let mut binary = CpuImage::<u8, 1>::from_size_val(gray.size(), 0u8, CpuAllocator)?;
        imgproc::threshold::threshold_binary(&gray, &mut binary, threshold, 255)?;
        let mask = GrayImage::from_raw(width, height, binary.as_slice().to_vec())
            .unwrap_or_else(|| GrayImage::new(width, height));

        let pre = &self.settings.preprocessing;
        let cleaned = remove_small_objects(&mask, pre.minimum_object_size_px);
        let opened = open_disk(&cleaned, pre.disk_radius_opening);
        let skeleton = skeletonize(&opened);
        debug!(threshold, "halo skeleton built");
        Ok(dilate_disk(&skeleton, pre.disk_radius_dilation))
    }

    pub fn detect_halos(&self, skeleton: &GrayImage) -> Vec<Halo> {
        let search = self.settings.circle_detection.search(None);
        hough_circles(skeleton, &search)
            .into_iter()
            .map(|c| Halo {
                x: c.x as f64,
                y: c.y as f64,
                radius: c.radius,
            })
            .collect()
    }

    pub fn perform_halo_detection(&self, image: &GrayImageF) -> Result<Vec<Halo>, DetectionError> {
        let skeleton = self.create_halo_skeleton(image)?;
        let halos = self.detect_halos(&skeleton);
        info!(halos = halos.len(), "halo detection");
        Ok(halos)
    }

    /// Copies the radius of the nearest halo closer than the assignment
    /// threshold onto each spot. Returns the number of spots with a halo.
    pub fn assign_halos_to_spots(&self, halos: &[Halo], spots: &mut SpotList) -> usize {
        let threshold = self.settings.halo_assignment.distance_threshold_px;
        let mut assigned = 0;
        for spot in spots.iter_mut() {
            let nearest = halos
                .iter()
                .map(|h| (spot.distance_to_xy(h.x, h.y), h))
                .filter(|(distance, _)| *distance < threshold)
                .min_by(|a, b| a.0.total_cmp(&b.0));
            if let Some((_, halo)) = nearest {
                spot.halo_radius = halo.radius;
                assigned += 1;
            }
        }
        debug!(assigned, "assigned halos to spots");
        assigned
    }
}
