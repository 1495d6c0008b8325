//! Summary statistics used by the spike and z-score detectors.

/// Mean and sample standard deviation (n - 1 denominator) of `values`.
///
/// The standard deviation is `0.0` when fewer than two values are given,
/// which callers read as "no dispersion information". Returns `None` for an
/// empty sample since the mean is undefined.
pub fn mean_and_sample_stddev(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;

    if values.len() < 2 {
        return Some((mean, 0.0));
    }

    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some((mean, variance.sqrt()))
}

/// Standard score of `value` against a baseline.
///
/// `None` when `stddev` is zero: the score is undefined and the detector
/// must not fire.
pub fn z_score(value: f64, mean: f64, stddev: f64) -> Option<f64> {
    if stddev > 0.0 {
        Some((value - mean) / stddev)
    } else {
        None
    }
}
