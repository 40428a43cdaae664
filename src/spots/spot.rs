use std::fmt;
use std::str::FromStr;

use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

use crate::grid::{Grid, GridPoint};
use crate::imaging::GrayImageF;

/// Letter label of a 1-based row: 1 -> "a", 26 -> "z", 27 -> "aa".
pub fn row_name(row: u32) -> String {
    let mut n = row;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        letters.push((b'a' + rem) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Inverse of [`row_name`], case-insensitive.
pub fn row_number(name: &str) -> Option<u32> {
    if name.is_empty() {
        return None;
    }
    name.chars().try_fold(0u32, |acc, c| {
        let c = c.to_ascii_lowercase();
        if !c.is_ascii_lowercase() {
            return None;
        }
        acc.checked_mul(26)?.checked_add(c as u32 - 'a' as u32 + 1)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpotIndex {
    pub row: u32,
    pub col: u32,
}

impl SpotIndex {
    pub fn row_name(&self) -> String {
        row_name(self.row)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpotProvenance {
    #[default]
    #[serde(rename = "Initial Detection")]
    Detected,
    #[serde(rename = "Backfilled")]
    Backfilled,
}

impl SpotProvenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpotProvenance::Detected => "Initial Detection",
            SpotProvenance::Backfilled => "Backfilled",
        }
    }
}

impl fmt::Display for SpotProvenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpotRole {
    #[default]
    #[serde(rename = "")]
    Normal,
    #[serde(rename = "control")]
    Control,
}

impl SpotRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpotRole::Normal => "",
            SpotRole::Control => "control",
        }
    }
}

impl FromStr for SpotRole {
    type Err = std::convert::Infallible;

    /// Anything other than `control` is a normal sample spot.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if s.trim().eq_ignore_ascii_case("control") {
            SpotRole::Control
        } else {
            SpotRole::Normal
        })
    }
}

/// One circular well in the assay image.
#[derive(Debug, Clone, PartialEq)]
pub struct Spot {
    pub x: f64,
    pub y: f64,
    pub radius: u32,
    /// Zero when no halo was assigned.
    pub halo_radius: u32,
    pub intensity: Option<f64>,
    pub raw_intensity: Option<f64>,
    /// Row and column are set together or not at all.
    pub index: Option<SpotIndex>,
    pub provenance: SpotProvenance,
    pub role: SpotRole,
}

impl Spot {
    pub fn detected(x: f64, y: f64, radius: u32) -> Self {
        Self {
            x,
            y,
            radius,
            halo_radius: 0,
            intensity: None,
            raw_intensity: None,
            index: None,
            provenance: SpotProvenance::Detected,
            role: SpotRole::Normal,
        }
    }

    pub fn backfilled(x: f64, y: f64, radius: u32) -> Self {
        Self {
            provenance: SpotProvenance::Backfilled,
            ..Self::detected(x, y, radius)
        }
    }

    pub fn row(&self) -> Option<u32> {
        self.index.map(|i| i.row)
    }

    pub fn col(&self) -> Option<u32> {
        self.index.map(|i| i.col)
    }

    pub fn row_name(&self) -> Option<String> {
        self.index.map(|i| i.row_name())
    }

    pub fn set_index(&mut self, row: u32, col: u32) {
        self.index = Some(SpotIndex { row, col });
    }

    pub fn distance_to_xy(&self, x: f64, y: f64) -> f64 {
        (self.x - x).hypot(self.y - y)
    }

    pub fn distance_to(&self, point: &GridPoint) -> f64 {
        self.distance_to_xy(point.x, point.y)
    }

    /// Distance to the closest grid intersection, `None` for an empty grid.
    pub fn deviation_from_grid(&self, grid: &Grid) -> Option<f64> {
        grid.intersections
            .iter()
            .map(|p| self.distance_to(p))
            .min_by(f64::total_cmp)
    }

    fn effective_radius(&self, radius: u32) -> u32 {
        if radius == 0 { self.radius } else { radius }
    }

    /// Pixels strictly inside the circle of `radius` (the spot's own radius
    /// when zero) around the centre.
    ///
    /// Returns `None` if the disk is empty or any of its pixels falls outside
    /// a `width × height` image.
    pub fn disk_pixels(&self, radius: u32, width: u32, height: u32) -> Option<Vec<(u32, u32)>> {
        let r = self.effective_radius(radius) as f64;
        let (x0, x1) = ((self.x - r).ceil() as i64, (self.x + r).floor() as i64);
        let (y0, y1) = ((self.y - r).ceil() as i64, (self.y + r).floor() as i64);
        let mut pixels = Vec::new();
        for py in y0..=y1 {
            for px in x0..=x1 {
                let (dx, dy) = (px as f64 - self.x, py as f64 - self.y);
                if dx * dx + dy * dy >= r * r {
                    continue;
                }
                if px < 0 || py < 0 || px >= width as i64 || py >= height as i64 {
                    return None;
                }
                pixels.push((px as u32, py as u32));
            }
        }
        (!pixels.is_empty()).then_some(pixels)
    }

    /// Paints the disk into `mask`. Returns `false` and leaves the mask
    /// untouched when the disk does not fit.
    pub fn draw(&self, mask: &mut GrayImage, value: u8, radius: u32) -> bool {
        match self.disk_pixels(radius, mask.width(), mask.height()) {
            Some(pixels) => {
                for (x, y) in pixels {
                    mask.put_pixel(x, y, Luma([value]));
                }
                true
            }
            None => false,
        }
    }

    /// Mean pixel value inside the disk, `None` when it does not fit.
    pub fn sample_intensity(&self, image: &GrayImageF, radius: u32) -> Option<f64> {
        let pixels = self.disk_pixels(radius, image.width(), image.height())?;
        let sum: f64 = pixels
            .iter()
            .map(|&(x, y)| image.get_pixel(x, y)[0] as f64)
            .sum();
        Some(sum / pixels.len() as f64)
    }
}
