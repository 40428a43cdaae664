//! Circular and straight-line Hough transforms over binary images.
//!
//! Any non-zero pixel of the input votes. Circle votes are normalised by the
//! number of perimeter pixels so that scores of different radii compare.

use image::GrayImage;
use rayon::prelude::*;
use tracing::debug;

use super::peaks::{PeakSearch, find_peaks_2d};

/// Search parameters shared by spot and halo detection.
#[derive(Debug, Clone, PartialEq)]
pub struct CircleSearch {
    pub smallest_radius_px: u32,
    pub largest_radius_px: u32,
    pub min_distance_px_x: usize,
    pub min_distance_px_y: usize,
    /// Fraction of the strongest accumulator cell over all radii.
    pub relative_threshold: f64,
    pub max_peaks: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircleCandidate {
    pub x: u32,
    pub y: u32,
    pub radius: u32,
    pub score: f64,
}

/// Offsets of a Bresenham circle of `radius`, without duplicates.
pub fn circle_perimeter(radius: u32) -> Vec<(i64, i64)> {
    let r = radius as i64;
    let mut points = Vec::new();
    let (mut x, mut y) = (0i64, r);
    let mut d = 3 - 2 * r;
    while y >= x {
        points.extend_from_slice(&[
            (x, y),
            (x, -y),
            (-x, y),
            (-x, -y),
            (y, x),
            (y, -x),
            (-y, x),
            (-y, -x),
        ]);
        if d < 0 {
            d += 4 * x + 6;
        } else {
            d += 4 * (x - y) + 10;
            y -= 1;
        }
        x += 1;
    }
    points.sort_unstable();
    points.dedup();
    points
}

fn voters(image: &GrayImage) -> Vec<(i64, i64)> {
    image
        .enumerate_pixels()
        .filter(|(_, _, px)| px[0] != 0)
        .map(|(x, y, _)| (x as i64, y as i64))
        .collect()
}

/// Accumulator for one radius, row-major over candidate centres.
fn circle_accumulator(points: &[(i64, i64)], width: usize, height: usize, radius: u32) -> Vec<f64> {
    let perimeter = circle_perimeter(radius);
    let mut acc = vec![0.0f64; width * height];
    if perimeter.is_empty() {
        return acc;
    }
    for &(px, py) in points {
        for &(dx, dy) in &perimeter {
            let (cx, cy) = (px + dx, py + dy);
            if cx >= 0 && cy >= 0 && (cx as usize) < width && (cy as usize) < height {
                acc[cy as usize * width + cx as usize] += 1.0;
            }
        }
    }
    let norm = perimeter.len() as f64;
    for value in acc.iter_mut() {
        *value /= norm;
    }
    acc
}

/// Detects circles across the radius range.
///
/// Every radius contributes its local maxima above the global threshold;
/// the union is ranked by score and thinned so that no two kept centres lie
/// within the minimum x/y separation of each other.
pub fn hough_circles(edges: &GrayImage, search: &CircleSearch) -> Vec<CircleCandidate> {
    let (width, height) = (edges.width() as usize, edges.height() as usize);
    if width == 0 || height == 0 || search.largest_radius_px < search.smallest_radius_px {
        return Vec::new();
    }
    let points = voters(edges);
    let radii: Vec<u32> = (search.smallest_radius_px..=search.largest_radius_px).collect();

    // local maxima are kept unthresholded until the global maximum is known
    let per_radius: Vec<(f64, Vec<CircleCandidate>)> = radii
        .par_iter()
        .map(|&radius| {
            let acc = circle_accumulator(&points, width, height, radius);
            let max = acc.iter().copied().fold(0.0f64, f64::max);
            let local = PeakSearch {
                min_distance_x: search.min_distance_px_x,
                min_distance_y: search.min_distance_px_y,
                threshold: 0.0,
                max_peaks: None,
            };
            let peaks = find_peaks_2d(&acc, width, height, local)
                .into_iter()
                .map(|(x, y)| CircleCandidate {
                    x: x as u32,
                    y: y as u32,
                    radius,
                    score: acc[y * width + x],
                })
                .collect();
            (max, peaks)
        })
        .collect();

    let global_max = per_radius.iter().map(|(max, _)| *max).fold(0.0f64, f64::max);
    let threshold = search.relative_threshold * global_max;
    let mut candidates: Vec<CircleCandidate> = per_radius
        .into_iter()
        .flat_map(|(_, peaks)| peaks)
        .filter(|c| c.score > threshold)
        .collect();
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<CircleCandidate> = Vec::new();
    for candidate in candidates {
        if search.max_peaks.is_some_and(|max| kept.len() >= max) {
            break;
        }
        let close = kept.iter().any(|k| {
            (k.x.abs_diff(candidate.x) as usize) <= search.min_distance_px_x
                && (k.y.abs_diff(candidate.y) as usize) <= search.min_distance_px_y
        });
        if !close {
            kept.push(candidate);
        }
    }
    debug!(
        voters = points.len(),
        radii = radii.len(),
        threshold,
        circles = kept.len(),
        "circle hough"
    );
    kept
}

/// Search parameters for axis-aligned grid lines.
#[derive(Debug, Clone, PartialEq)]
pub struct LineSearch {
    /// Allowed deviation from 0° and 90° normals, in degrees.
    pub maximum_tilt_deg: f64,
    pub min_distance_px: usize,
    pub min_angle_deg: usize,
    pub relative_threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineCandidate {
    /// Signed distance of the line from the origin.
    pub distance: f64,
    /// Angle of the line normal in radians, within `[-π/4, 3π/4)`.
    pub angle: f64,
    pub votes: f64,
}

const FIRST_ANGLE_DEG: i64 = -45;
const ANGLE_BINS: usize = 180;

fn angle_is_allowed(angle_deg: f64, tilt: f64) -> bool {
    angle_deg.abs() <= tilt || (angle_deg - 90.0).abs() <= tilt
}

/// Straight-line Hough transform in normal form `x cos θ + y sin θ = d`.
///
/// Angles are sampled in one degree steps over `[-45°, 135°)` so that the
/// near-vertical and near-horizontal bands never wrap around the table.
/// Cells outside the tilt bands are zeroed before peak extraction.
pub fn hough_lines(mask: &GrayImage, search: &LineSearch) -> Vec<LineCandidate> {
    let (width, height) = mask.dimensions();
    if width == 0 || height == 0 {
        return Vec::new();
    }
    let offset = (width as f64).hypot(height as f64).ceil() as i64;
    let distance_bins = (2 * offset + 1) as usize;

    let angles: Vec<f64> = (0..ANGLE_BINS)
        .map(|i| ((FIRST_ANGLE_DEG + i as i64) as f64).to_radians())
        .collect();
    let allowed: Vec<bool> = (0..ANGLE_BINS)
        .map(|i| angle_is_allowed((FIRST_ANGLE_DEG + i as i64) as f64, search.maximum_tilt_deg))
        .collect();
    let trig: Vec<(f64, f64)> = angles.iter().map(|a| (a.cos(), a.sin())).collect();

    // rows are distances, columns are angles
    let mut acc = vec![0.0f64; distance_bins * ANGLE_BINS];
    for (x, y) in voters(mask) {
        for (col, &(cos, sin)) in trig.iter().enumerate() {
            if !allowed[col] {
                continue;
            }
            let d = (x as f64 * cos + y as f64 * sin).round() as i64 + offset;
            if d >= 0 && (d as usize) < distance_bins {
                acc[d as usize * ANGLE_BINS + col] += 1.0;
            }
        }
    }

    let max = acc.iter().copied().fold(0.0f64, f64::max);
    if max <= 0.0 {
        return Vec::new();
    }
    let threshold = search.relative_threshold * max;
    let peaks = find_peaks_2d(
        &acc,
        ANGLE_BINS,
        distance_bins,
        PeakSearch {
            min_distance_x: search.min_angle_deg,
            min_distance_y: search.min_distance_px,
            threshold,
            max_peaks: None,
        },
    );
    let lines: Vec<LineCandidate> = peaks
        .into_iter()
        .map(|(col, row)| {
            let (mean_col, mean_row) = plateau_centroid(&acc, ANGLE_BINS, distance_bins, col, row);
            LineCandidate {
                distance: mean_row - offset as f64,
                angle: (FIRST_ANGLE_DEG as f64 + mean_col).to_radians(),
                votes: acc[row * ANGLE_BINS + col],
            }
        })
        .collect();
    debug!(threshold, lines = lines.len(), "line hough");
    lines
}

/// Mean `(column, row)` of the 8-connected run of cells sharing the peak
/// value. Spots drawn as disks leave flat ridges in the accumulator, and
/// the ridge centre is the line through the disk centres.
fn plateau_centroid(acc: &[f64], width: usize, height: usize, col: usize, row: usize) -> (f64, f64) {
    let value = acc[row * width + col];
    let mut seen = vec![false; acc.len()];
    let mut stack = vec![(col, row)];
    seen[row * width + col] = true;
    let (mut sum_col, mut sum_row, mut count) = (0.0, 0.0, 0usize);
    while let Some((c, r)) = stack.pop() {
        sum_col += c as f64;
        sum_row += r as f64;
        count += 1;
        for nr in r.saturating_sub(1)..=(r + 1).min(height - 1) {
            for nc in c.saturating_sub(1)..=(c + 1).min(width - 1) {
                let idx = nr * width + nc;
                if !seen[idx] && acc[idx] == value {
                    seen[idx] = true;
                    stack.push((nc, nr));
                }
            }
        }
    }
    (sum_col / count as f64, sum_row / count as f64)
}
