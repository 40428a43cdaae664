//! Canny edge detection on floating point planes.

use image::GrayImage;
use imageproc::filter::gaussian_blur_f32;

use super::greyscale::GrayImageF;

/// Unnormalised Sobel derivatives `(d/dy, d/dx)` with mirrored borders.
fn sobel(values: &[f64], width: usize, height: usize) -> (Vec<f64>, Vec<f64>) {
    let at = |x: i64, y: i64| -> f64 {
        let xr = reflect(x, width);
        let yr = reflect(y, height);
        values[yr * width + xr]
    };
    let mut dy = vec![0.0; values.len()];
    let mut dx = vec![0.0; values.len()];
    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let idx = y as usize * width + x as usize;
            dy[idx] = (at(x - 1, y + 1) + 2.0 * at(x, y + 1) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2.0 * at(x, y - 1) + at(x + 1, y - 1));
            dx[idx] = (at(x + 1, y - 1) + 2.0 * at(x + 1, y) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2.0 * at(x - 1, y) + at(x - 1, y + 1));
        }
    }
    (dy, dx)
}

/// Half-sample symmetric index: `-1 -> 0`, `n -> n - 1`.
pub(crate) fn reflect(i: i64, n: usize) -> usize {
    let n = n as i64;
    if n == 1 {
        return 0;
    }
    let period = 2 * n;
    let mut i = i.rem_euclid(period);
    if i >= n {
        i = period - 1 - i;
    }
    i as usize
}

/// Keeps gradient magnitudes that are maximal along the gradient
/// direction, interpolating between the two neighbours of each sector.
fn non_maximum_suppression(
    magnitude: &[f64],
    dy: &[f64],
    dx: &[f64],
    width: usize,
    height: usize,
    low: f64,
) -> Vec<f64> {
    let mut out = vec![0.0; magnitude.len()];
    if width < 3 || height < 3 {
        return out;
    }
    let mag = |x: usize, y: usize| magnitude[y * width + x];
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let idx = y * width + x;
            let m = magnitude[idx];
            if m < low || m == 0.0 {
                continue;
            }
            let (gi, gj) = (dy[idx], dx[idx]);
            let (ai, aj) = (gi.abs(), gj.abs());
            let same_sign = (gi >= 0.0 && gj >= 0.0) || (gi <= 0.0 && gj <= 0.0);
            let (forward, backward) = if same_sign {
                if ai >= aj {
                    let w = aj / ai;
                    (
                        mag(x + 1, y + 1) * w + mag(x, y + 1) * (1.0 - w),
                        mag(x - 1, y - 1) * w + mag(x, y - 1) * (1.0 - w),
                    )
                } else {
                    let w = ai / aj;
                    (
                        mag(x + 1, y + 1) * w + mag(x + 1, y) * (1.0 - w),
                        mag(x - 1, y - 1) * w + mag(x - 1, y) * (1.0 - w),
                    )
                }
            } else if ai >= aj {
                let w = aj / ai;
                (
                    mag(x + 1, y - 1) * w + mag(x, y - 1) * (1.0 - w),
                    mag(x - 1, y + 1) * w + mag(x, y + 1) * (1.0 - w),
                )
            } else {
                let w = ai / aj;
                (
                    mag(x + 1, y - 1) * w + mag(x + 1, y) * (1.0 - w),
                    mag(x - 1, y + 1) * w + mag(x - 1, y) * (1.0 - w),
                )
            };
            if m >= forward && m >= backward {
                out[idx] = m;
            }
        }
    }
    out
}

/// Keeps weak pixels only when 8-connected to a strong one.
fn hysteresis(nms: &[f64], width: usize, height: usize, low: f64, high: f64) -> Vec<bool> {
    let weak: Vec<bool> = nms.iter().map(|&v| v > 0.0 && v >= low).collect();
    let mut keep = vec![false; nms.len()];
    let mut stack: Vec<usize> = Vec::new();
    for (idx, &v) in nms.iter().enumerate() {
        if weak[idx] && v >= high && !keep[idx] {
            keep[idx] = true;
            stack.push(idx);
            while let Some(current) = stack.pop() {
                let (cx, cy) = ((current % width) as i64, (current / width) as i64);
                for ny in cy - 1..=cy + 1 {
                    for nx in cx - 1..=cx + 1 {
                        if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                            continue;
                        }
                        let next = ny as usize * width + nx as usize;
                        if weak[next] && !keep[next] {
                            keep[next] = true;
                            stack.push(next);
                        }
                    }
                }
            }
        }
    }
    keep
}

/// Canny edge map of a `[0, 1]` plane. Edge pixels are 255.
///
/// Thresholds apply to the unnormalised Sobel magnitude of the smoothed
/// image. The one pixel frame is never marked.
pub fn canny(image: &GrayImageF, sigma: f64, low: f64, high: f64) -> GrayImage {
    let (width, height) = image.dimensions();
    let (w, h) = (width as usize, height as usize);
    // gaussian_blur_f32 rejects a non-positive sigma
    let smoothed = if sigma > 0.0 {
        gaussian_blur_f32(image, sigma as f32)
    } else {
        image.clone()
    };
    let values: Vec<f64> = smoothed.as_raw().iter().map(|&v| v as f64).collect();
    let (dy, dx) = sobel(&values, w, h);
    let magnitude: Vec<f64> = dy.iter().zip(dx.iter()).map(|(a, b)| a.hypot(*b)).collect();
    let nms = non_maximum_suppression(&magnitude, &dy, &dx, w, h, low);
    let keep = hysteresis(&nms, w, h, low, high);
    let data = keep.into_iter().map(|k| if k { 255 } else { 0 }).collect();
    GrayImage::from_raw(width, height, data).unwrap_or_else(|| GrayImage::new(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_plane_has_no_edges() {
        let image = GrayImageF::from_pixel(16, 12, image::Luma([0.6]));
        for sigma in [0.0, 1.0, 3.0] {
            let edges = canny(&image, sigma, 0.01, 0.02);
            assert!(edges.pixels().all(|p| p[0] == 0), "sigma {sigma}");
        }
    }

    #[test]
    fn reflect_mirrors_edges() {
        assert_eq!(reflect(-1, 5), 0);
        assert_eq!(reflect(-2, 5), 1);
        assert_eq!(reflect(5, 5), 4);
        assert_eq!(reflect(6, 5), 3);
    }

    #[test]
    fn vertical_step_gives_vertical_edge() {
        let image = GrayImageF::from_fn(20, 20, |x, _| image::Luma([if x < 10 { 0.0 } else { 1.0 }]));
        let edges = canny(&image, 1.0, 0.1, 0.2);
        let columns: Vec<u32> = (0..20).filter(|&x| edges.get_pixel(x, 10)[0] == 255).collect();
        assert!(!columns.is_empty());
        assert!(columns.iter().all(|&x| (9..=10).contains(&x)));
        // nothing in flat regions
        assert_eq!(edges.get_pixel(3, 10)[0], 0);
        assert_eq!(edges.get_pixel(16, 10)[0], 0);
    }
}
