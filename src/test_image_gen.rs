use std::path::Path;

use image::{GrayImage, Luma};

/// Layout of a synthetic assay plate: bright disks on a dark background,
/// one per well, row-major from `origin`.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticPlate {
    pub width: u32,
    pub height: u32,
    pub rows: u32,
    pub columns: u32,
    /// Centre of well (1, 1).
    pub origin: (f64, f64),
    pub pitch: (f64, f64),
    pub spot_radius: f64,
    pub background: u8,
    pub foreground: u8,
    /// Wells (row, column), 1-based, left empty.
    pub missing: Vec<(u32, u32)>,
    /// Ring (inner, outer radius) drawn around every spot.
    pub halo: Option<(f64, f64)>,
}

impl Default for SyntheticPlate {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            rows: 4,
            columns: 6,
            origin: (95.0, 90.0),
            pitch: (90.0, 100.0),
            spot_radius: 25.0,
            background: 30,
            foreground: 220,
            missing: Vec::new(),
            halo: None,
        }
    }
}

impl SyntheticPlate {
    /// Spot centres of the present wells, row-major.
    pub fn centres(&self) -> Vec<(u32, u32, f64, f64)> {
        let mut centres = Vec::new();
        for row in 1..=self.rows {
            for col in 1..=self.columns {
                if self.missing.contains(&(row, col)) {
                    continue;
                }
                let x = self.origin.0 + (col - 1) as f64 * self.pitch.0;
                let y = self.origin.1 + (row - 1) as f64 * self.pitch.1;
                centres.push((row, col, x, y));
            }
        }
        centres
    }

    pub fn render(&self) -> GrayImage {
        let mut image = GrayImage::from_pixel(self.width, self.height, Luma([self.background]));
        let halo_value = self.background / 2 + self.foreground / 4;
        for (_, _, cx, cy) in self.centres() {
            let reach = self.halo.map_or(self.spot_radius, |(_, outer)| outer.max(self.spot_radius));
            let x_range = (cx - reach).floor().max(0.0) as u32..((cx + reach).ceil() as u32 + 1).min(self.width);
            for x in x_range {
                let y_range = (cy - reach).floor().max(0.0) as u32..((cy + reach).ceil() as u32 + 1).min(self.height);
                for y in y_range {
                    let r = (x as f64 - cx).hypot(y as f64 - cy);
                    if r <= self.spot_radius {
                        image.put_pixel(x, y, Luma([self.foreground]));
                    } else if let Some((inner, outer)) = self.halo
                        && r >= inner
                        && r <= outer
                    {
                        image.put_pixel(x, y, Luma([halo_value]));
                    }
                }
            }
        }
        image
    }

    pub fn save(&self, path: &Path) -> Result<(), image::ImageError> {
        self.render().save(path)
    }
}

/// Writes the default plate to `path`.
pub fn generate_test_image(path: &Path) -> Result<(), image::ImageError> {
    SyntheticPlate::default().save(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_wells_stay_dark() {
        let plate = SyntheticPlate {
            missing: vec![(2, 3)],
            ..SyntheticPlate::default()
        };
        assert_eq!(plate.centres().len(), 23);
        let image = plate.render();
        assert_eq!(image.get_pixel(95, 90)[0], plate.foreground);
        assert_eq!(image.get_pixel(275, 190)[0], plate.background);
        assert_eq!(image.get_pixel(365, 190)[0], plate.foreground);
        assert_eq!(image.get_pixel(140, 90)[0], plate.background);
    }

    #[test]
    fn halo_ring_surrounds_spot() {
        let plate = SyntheticPlate {
            rows: 1,
            columns: 1,
            origin: (100.0, 100.0),
            width: 200,
            height: 200,
            halo: Some((35.0, 45.0)),
            ..SyntheticPlate::default()
        };
        let image = plate.render();
        assert_eq!(image.get_pixel(100, 100)[0], plate.foreground);
        assert_eq!(image.get_pixel(130, 100)[0], plate.background);
        assert!(image.get_pixel(140, 100)[0] > plate.background);
        assert_eq!(image.get_pixel(150, 100)[0], plate.background);
    }
}
