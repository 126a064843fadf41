//! Order-statistic percentiles over a sorted sample set.
//!
//! This is the linear interpolation between closest ranks estimator. It is
//! exact for the samples seen: there is no sketching and no error bound, so
//! callers hold every sample until the snapshot is taken.

/// Return the `p` percentile, `p` in `[0, 1]`, of `sorted`.
///
/// `sorted` must be in ascending order. An empty slice has a percentile of 0.
///
/// # Examples
///
/// ```
/// use logster::percentile::percentile;
///
/// assert_eq!(percentile(&[1, 2, 3, 4, 5], 0.5), 3.0);
/// assert_eq!(percentile(&[1, 2], 0.5), 1.5);
/// assert_eq!(percentile(&[], 0.99), 0.0);
/// ```
pub fn percentile(sorted: &[u64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let k = (sorted.len() - 1) as f64 * p;
    let f = k.floor();
    let c = k.ceil();
    if f == c {
        return sorted[k as usize] as f64;
    }
    let d0 = sorted[f as usize] as f64 * (c - k);
    let d1 = sorted[c as usize] as f64 * (k - f);
    d0 + d1
}
