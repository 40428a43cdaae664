use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::settings::{Settings, SettingsError};

/// Single-channel image with values in `[0, 1]`.
pub type GrayImageF = ImageBuffer<Luma<f32>, Vec<f32>>;

#[derive(Debug, thiserror::Error)]
pub enum ImageLoadError {
    #[error("failed to read image {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("image has zero width or height")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageLoaderSettings {
    pub invert_image: bool,
}

impl Default for ImageLoaderSettings {
    fn default() -> Self {
        Self {
            invert_image: false,
        }
    }
}

impl Settings for ImageLoaderSettings {
    fn validate(&self) -> Result<(), SettingsError> {
        Ok(())
    }
}

/// Turns an assay photo into the grayscale plane every detector works on.
#[derive(Debug, Clone, Default)]
pub struct ImageLoader {
    settings: ImageLoaderSettings,
}

impl ImageLoader {
    pub fn new(settings: ImageLoaderSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ImageLoaderSettings {
        &self.settings
    }

    pub fn change_settings(&mut self, patch: &Value) -> Result<(), SettingsError> {
        self.settings = self.settings.merged(patch)?;
        Ok(())
    }

    /// Loads `path` and prepares it with [`ImageLoader::prepare_image`].
    pub fn prepare(&self, path: &Path) -> Result<GrayImageF, ImageLoadError> {
        let source = image::open(path).map_err(|source| ImageLoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.prepare_image(&source)
    }

    /// Converts to luma (alpha is dropped, RGB uses Rec. 709 weights) and
    /// applies the optional inversion.
    pub fn prepare_image(&self, source: &DynamicImage) -> Result<GrayImageF, ImageLoadError> {
        if source.width() == 0 || source.height() == 0 {
            return Err(ImageLoadError::Empty);
        }
        let mut gray = source.to_luma32f();
        for px in gray.iter_mut() {
            *px = px.clamp(0.0, 1.0);
        }
        if self.settings.invert_image {
            invert(&mut gray);
        }
        debug!(
            width = gray.width(),
            height = gray.height(),
            inverted = self.settings.invert_image,
            "prepared grayscale image"
        );
        Ok(gray)
    }
}

/// Flips polarity in place: `v -> 1 - v`.
pub fn invert(image: &mut GrayImageF) {
    for px in image.iter_mut() {
        *px = 1.0 - *px;
    }
}

/// Quantises a `[0, 1]` plane to 8 bits.
pub fn to_gray_u8(image: &GrayImageF) -> GrayImage {
    let (width, height) = image.dimensions();
    let data = image
        .as_raw()
        .iter()
        .map(|&v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect();
    GrayImage::from_raw(width, height, data).unwrap_or_else(|| GrayImage::new(width, height))
}

/// Stretches arbitrary floats onto the full 8-bit range.
///
/// A constant plane maps to all zeros.
pub fn rescale_to_u8(values: &[f32]) -> Vec<u8> {
    let (min, max) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = max - min;
    if !span.is_finite() || span <= 0.0 {
        return vec![0; values.len()];
    }
    values
        .iter()
        .map(|&v| {
            if v.is_finite() {
                (((v - min) / span) * 255.0).round() as u8
            } else {
                0
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    #[test]
    fn rgb_is_converted_with_perceptual_weights() {
        let mut rgb = RgbImage::new(2, 1);
        rgb.put_pixel(0, 0, Rgb([0, 255, 0]));
        rgb.put_pixel(1, 0, Rgb([0, 0, 255]));
        let gray = ImageLoader::default()
            .prepare_image(&DynamicImage::ImageRgb8(rgb))
            .unwrap();
        // green carries most of the luminance
        assert!(gray.get_pixel(0, 0)[0] > 0.6);
        assert!(gray.get_pixel(1, 0)[0] < 0.1);
    }

    #[test]
    fn alpha_channel_is_ignored() {
        let mut rgba = RgbaImage::new(1, 1);
        rgba.put_pixel(0, 0, Rgba([255, 255, 255, 0]));
        let gray = ImageLoader::default()
            .prepare_image(&DynamicImage::ImageRgba8(rgba))
            .unwrap();
        assert!((gray.get_pixel(0, 0)[0] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn inversion_flips_polarity() {
        let gray = GrayImage::from_raw(2, 1, vec![0, 255]).unwrap();
        let loader = ImageLoader::new(ImageLoaderSettings { invert_image: true });
        let prepared = loader.prepare_image(&DynamicImage::ImageLuma8(gray)).unwrap();
        assert!((prepared.get_pixel(0, 0)[0] - 1.0).abs() < 1e-6);
        assert!(prepared.get_pixel(1, 0)[0].abs() < 1e-6);
    }

    #[test]
    fn empty_image_is_rejected() {
        let gray = GrayImage::new(0, 0);
        let err = ImageLoader::default()
            .prepare_image(&DynamicImage::ImageLuma8(gray))
            .unwrap_err();
        assert!(matches!(err, ImageLoadError::Empty));
    }

    #[test]
    fn rescale_spans_full_range() {
        assert_eq!(rescale_to_u8(&[-1.0, 0.0, 1.0]), vec![0, 128, 255]);
        assert_eq!(rescale_to_u8(&[0.3, 0.3]), vec![0, 0]);
    }
}
