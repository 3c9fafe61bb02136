//! Percentile helpers over ranked samples.
//!
//! Uses linear interpolation between ranks: `index = p/100 × (n−1)`;
//! when the index falls between two samples the value is
//! `lower + (upper − lower) × frac(index)`.

/// Computes the `p`th percentile of an ascending-sorted sample set.
///
/// Returns `None` for an empty set. `p` is clamped to `[0, 100]`.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let p = p.clamp(0.0, 100.0);
    let index = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = index.floor() as usize;
    let upper = index.ceil() as usize;
    if lower == upper {
        return Some(sorted[lower]);
    }
    let fraction = index - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

pub fn p50(sorted: &[f64]) -> Option<f64> {
    percentile(sorted, 50.0)
}

pub fn p85(sorted: &[f64]) -> Option<f64> {
    percentile(sorted, 85.0)
}

pub fn p95(sorted: &[f64]) -> Option<f64> {
    percentile(sorted, 95.0)
}
