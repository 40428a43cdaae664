use image::GrayImage;
use rayon::prelude::*;

/// Otsu's threshold over an 8-bit histogram.
///
/// Returns the last value that still belongs to the background class, so a
/// binary mask is `value > threshold`.
pub fn otsu_threshold(pixels: &[u8]) -> u8 {
    let mut histogram = [0u32; 256];
    for &value in pixels {
        histogram[value as usize] += 1;
    }

    let total_pixels = pixels.len() as f64;
    let sum_total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(value, &count)| value as f64 * count as f64)
        .sum();

    let mut sum_background = 0f64;
    let mut weight_background = 0f64;
    let mut max_variance = f64::MIN;
    let mut threshold = 0u8;

    for (value, &count) in histogram.iter().enumerate() {
        weight_background += count as f64;
        if weight_background == 0.0 {
            continue;
        }
        let weight_foreground = total_pixels - weight_background;
        if weight_foreground == 0.0 {
            break;
        }
        sum_background += value as f64 * count as f64;

        let mean_background = sum_background / weight_background;
        let mean_foreground = (sum_total - sum_background) / weight_foreground;
        let variance =
            weight_background * weight_foreground * (mean_background - mean_foreground).powi(2);
        if variance > max_variance {
            max_variance = variance;
            threshold = value as u8;
        }
    }

    threshold
}

/// Half widths of a disk footprint, indexed by `dy + radius`.
fn disk_half_widths(radius: u32) -> Vec<i64> {
    let r = radius as i64;
    (-r..=r)
        .map(|dy| {
            let mut hw = 0i64;
            while (hw + 1) * (hw + 1) + dy * dy <= r * r {
                hw += 1;
            }
            hw
        })
        .collect()
}

/// Rank-based local histogram equalisation over a disk of `radius` pixels.
///
/// Each output pixel is the fraction of in-bounds footprint pixels with a
/// value at or below the centre value, scaled to `0..=255`. A radius of zero
/// returns the input unchanged.
pub fn equalize_local(image: &GrayImage, radius: u32) -> GrayImage {
    if radius == 0 {
        return image.clone();
    }
    let (width, height) = image.dimensions();
    let (w, h) = (width as i64, height as i64);
    let src = image.as_raw();
    let half_widths = disk_half_widths(radius);
    let r = radius as i64;

    let mut out = vec![0u8; src.len()];
    out.par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(y, row_out)| {
            let y = y as i64;
            let mut histogram = [0u32; 256];
            let mut population = 0u32;

            // footprint centred on x = 0
            for (i, &hw) in half_widths.iter().enumerate() {
                let yy = y + i as i64 - r;
                if yy < 0 || yy >= h {
                    continue;
                }
                let base = (yy * w) as usize;
                for xx in 0..=hw.min(w - 1) {
                    histogram[src[base + xx as usize] as usize] += 1;
                    population += 1;
                }
            }

            for x in 0..w {
                if x > 0 {
                    for (i, &hw) in half_widths.iter().enumerate() {
                        let yy = y + i as i64 - r;
                        if yy < 0 || yy >= h {
                            continue;
                        }
                        let base = (yy * w) as usize;
                        let leaving = x - 1 - hw;
                        if leaving >= 0 {
                            histogram[src[base + leaving as usize] as usize] -= 1;
                            population -= 1;
                        }
                        let entering = x + hw;
                        if entering < w {
                            histogram[src[base + entering as usize] as usize] += 1;
                            population += 1;
                        }
                    }
                }
                let centre = src[(y * w + x) as usize] as usize;
                let at_or_below: u32 = histogram[..=centre].iter().sum();
                row_out[x as usize] = if population == 0 {
                    0
                } else {
                    ((255 * at_or_below as u64) / population as u64) as u8
                };
            }
        });

    GrayImage::from_raw(width, height, out).unwrap_or_else(|| GrayImage::new(width, height))
}
