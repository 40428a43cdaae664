use std::collections::VecDeque;

/// Parameters of a 2-D local maximum search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakSearch {
    /// Half width of the suppression box along x.
    pub min_distance_x: usize,
    /// Half height of the suppression box along y.
    pub min_distance_y: usize,
    /// Values must be strictly above this to qualify.
    pub threshold: f64,
    pub max_peaks: Option<usize>,
}

impl PeakSearch {
    pub fn square(min_distance: usize, threshold: f64) -> Self {
        Self {
            min_distance_x: min_distance,
            min_distance_y: min_distance,
            threshold,
            max_peaks: None,
        }
    }
}

/// Sliding maximum along one axis with a half window of `radius`.
fn sliding_max(
    values: &[f64],
    out: &mut [f64],
    len: usize,
    stride: usize,
    offset: usize,
    radius: usize,
) {
    let mut window: VecDeque<usize> = VecDeque::new();
    let mut next = 0usize;
    for i in 0..len {
        let hi = (i + radius).min(len - 1);
        while next <= hi {
            let v = values[offset + next * stride];
            while let Some(&back) = window.back() {
                if values[offset + back * stride] <= v {
                    window.pop_back();
                } else {
                    break;
                }
            }
            window.push_back(next);
            next += 1;
        }
        let lo = i.saturating_sub(radius);
        while let Some(&front) = window.front() {
            if front < lo {
                window.pop_front();
            } else {
                break;
            }
        }
        if let Some(&front) = window.front() {
            out[offset + i * stride] = values[offset + front * stride];
        }
    }
}

/// Maximum over a `(2 * rx + 1) × (2 * ry + 1)` box around every cell.
pub fn box_max(values: &[f64], width: usize, height: usize, rx: usize, ry: usize) -> Vec<f64> {
    let mut rows = vec![f64::NEG_INFINITY; values.len()];
    for y in 0..height {
        sliding_max(values, &mut rows, width, 1, y * width, rx);
    }
    let mut out = vec![f64::NEG_INFINITY; values.len()];
    for x in 0..width {
        sliding_max(&rows, &mut out, height, width, x, ry);
    }
    out
}

/// Finds local maxima in a row-major `width × height` grid.
///
/// A cell is a candidate when it is above the threshold and equal to the
/// maximum of its box. Candidates are visited strongest first and any
/// candidate inside the box of an already kept peak is dropped. Returns
/// `(x, y)` pairs ordered by decreasing value. NaN cells never qualify.
pub fn find_peaks_2d(
    values: &[f64],
    width: usize,
    height: usize,
    search: PeakSearch,
) -> Vec<(usize, usize)> {
    if width == 0 || height == 0 || values.len() != width * height {
        return Vec::new();
    }
    let sanitized: Vec<f64> = values
        .iter()
        .map(|&v| if v.is_nan() { f64::NEG_INFINITY } else { v })
        .collect();
    let maxima = box_max(
        &sanitized,
        width,
        height,
        search.min_distance_x,
        search.min_distance_y,
    );

    let mut candidates: Vec<usize> = (0..sanitized.len())
        .filter(|&i| sanitized[i] > search.threshold && sanitized[i] == maxima[i])
        .collect();
    candidates.sort_by(|&a, &b| sanitized[b].total_cmp(&sanitized[a]));

    let mut kept: Vec<(usize, usize)> = Vec::new();
    for idx in candidates {
        if search.max_peaks.is_some_and(|max| kept.len() >= max) {
            break;
        }
        let (x, y) = (idx % width, idx / width);
        let suppressed = kept.iter().any(|&(kx, ky)| {
            kx.abs_diff(x) <= search.min_distance_x && ky.abs_diff(y) <= search.min_distance_y
        });
        if !suppressed {
            kept.push((x, y));
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_max_spreads_peak() {
        let values = vec![0.0, 0.0, 5.0, 0.0, 0.0, 1.0];
        assert_eq!(box_max(&values, 6, 1, 1, 0), vec![0.0, 5.0, 5.0, 5.0, 1.0, 1.0]);
    }

    #[test]
    fn close_peaks_collapse_to_strongest() {
        let mut values = vec![0.0; 10 * 10];
        values[2 * 10 + 2] = 3.0;
        values[2 * 10 + 4] = 5.0;
        values[8 * 10 + 8] = 4.0;
        let peaks = find_peaks_2d(&values, 10, 10, PeakSearch::square(2, 0.0));
        assert_eq!(peaks, vec![(4, 2), (8, 8)]);
    }

    #[test]
    fn plateau_yields_single_peak() {
        let values = vec![0.0, 2.0, 2.0, 0.0];
        let peaks = find_peaks_2d(&values, 4, 1, PeakSearch::square(1, 0.0));
        assert_eq!(peaks, vec![(1, 0)]);
    }

    #[test]
    fn threshold_and_limit_apply() {
        let values = vec![1.0, 0.0, 3.0, 0.0, 2.0];
        let mut search = PeakSearch::square(1, 1.0);
        assert_eq!(find_peaks_2d(&values, 5, 1, search), vec![(2, 0), (4, 0)]);
        search.max_peaks = Some(1);
        assert_eq!(find_peaks_2d(&values, 5, 1, search), vec![(2, 0)]);
    }

    #[test]
    fn nan_cells_are_ignored() {
        let values = vec![f64::NAN, 1.0, f64::NAN];
        assert_eq!(find_peaks_2d(&values, 3, 1, PeakSearch::square(1, 0.0)), vec![(1, 0)]);
    }
}
