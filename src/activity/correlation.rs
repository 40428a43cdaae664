use super::ActivityError;

/// `count` evenly spaced samples from `start` to `end`, both included.
pub fn linspace(start: f64, end: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (count - 1) as f64;
            (0..count)
                .map(|i| if i == count - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

/// Piecewise linear interpolation of `(xp, fp)` at `x`, clamped to the
/// first and last sample outside the covered range. `xp` must ascend.
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let n = xp.len().min(fp.len());
    if n == 0 {
        return f64::NAN;
    }
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[n - 1] {
        return fp[n - 1];
    }
    // first sample strictly above x
    let hi = xp[..n].partition_point(|&v| v <= x);
    let lo = hi - 1;
    let span = xp[hi] - xp[lo];
    if span == 0.0 {
        return fp[hi];
    }
    fp[lo] + (fp[hi] - fp[lo]) * (x - xp[lo]) / span
}

/// Samples per unit of retention time: `len / (max - min)`.
pub fn sampling_frequency(times: &[f64]) -> f64 {
    let (min, max) = times
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &t| (lo.min(t), hi.max(t)));
    times.len() as f64 / (max - min)
}

/// Resamples `(times, values)` at `count` points over `bounds` and scales
/// the result so its maximum is one.
pub fn resample_normalized(bounds: (f64, f64), count: usize, times: &[f64], values: &[f64]) -> Vec<f64> {
    let mut samples: Vec<f64> = linspace(bounds.0, bounds.1, count)
        .into_iter()
        .map(|t| interp(t, times, values))
        .collect();
    let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    for v in samples.iter_mut() {
        *v *= 1.0 / max;
    }
    samples
}

/// Pearson correlation coefficient. NaN when either input is constant or
/// shorter than two samples.
pub fn pearson(a: &[f64], b: &[f64]) -> Result<f64, ActivityError> {
    if a.len() != b.len() {
        return Err(ActivityError::LengthMismatch {
            expected: a.len(),
            other: b.len(),
            context: "pearson",
        });
    }
    if a.len() < 2 {
        return Ok(f64::NAN);
    }
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;
    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (&x, &y) in a.iter().zip(b) {
        let (dx, dy) = (x - mean_a, y - mean_b);
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    if var_a == 0.0 || var_b == 0.0 {
        return Ok(f64::NAN);
    }
    Ok((cov / (var_a.sqrt() * var_b.sqrt())).clamp(-1.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linspace_includes_both_ends() {
        assert_eq!(linspace(0.0, 1.0, 5), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(linspace(3.0, 9.0, 1), vec![3.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
    }

    #[test]
    fn interp_is_linear_and_clamped() {
        let xp = [0.0, 1.0, 3.0];
        let fp = [0.0, 10.0, 30.0];
        assert_eq!(interp(0.5, &xp, &fp), 5.0);
        assert_eq!(interp(2.0, &xp, &fp), 20.0);
        assert_eq!(interp(-1.0, &xp, &fp), 0.0);
        assert_eq!(interp(7.0, &xp, &fp), 30.0);
        assert_eq!(interp(1.0, &xp, &fp), 10.0);
    }

    #[test]
    fn pearson_of_scaled_copy_is_one() {
        let a = [1.0, 2.0, 4.0, 3.0];
        let b = [2.0, 4.0, 8.0, 6.0];
        assert!((pearson(&a, &b).unwrap() - 1.0).abs() < 1e-12);
        let inverted: Vec<f64> = a.iter().map(|v| -v).collect();
        assert!((pearson(&a, &inverted).unwrap() + 1.0).abs() < 1e-12);
        assert!(pearson(&a, &[1.0; 4]).unwrap().is_nan());
        assert!(pearson(&a, &[1.0]).is_err());
    }

    #[test]
    fn resampled_curve_peaks_at_one() {
        let times = [0.0, 1.0, 2.0, 3.0, 4.0];
        let values = [0.0, 2.0, 4.0, 2.0, 0.0];
        let curve = resample_normalized((1.0, 3.0), 5, &times, &values);
        assert_eq!(curve, vec![0.5, 0.75, 1.0, 0.75, 0.5]);
    }

    #[test]
    fn frequency_counts_samples_per_second() {
        assert!((sampling_frequency(&[10.0, 12.0, 14.0, 16.0]) - 4.0 / 6.0).abs() < 1e-12);
    }
}
