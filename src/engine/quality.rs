//! Score arithmetic shared by the generators and the orchestrator.
//!
//! Every function here returns a value in `[0, 1]` and never `NaN`, even for
//! empty inputs.

use crate::models::unit;

/// Weighted blend over the terms that are present, renormalizing the
/// weights so they sum to 1. No present terms yields 0.
pub fn blend(terms: &[(f64, Option<f64>)]) -> f64 {
    let (weighted, total) = terms
        .iter()
        .filter_map(|&(w, v)| v.map(|v| (w, unit(v))))
        .filter(|&(w, _)| w > 0.0)
        .fold((0.0, 0.0), |(acc, total), (w, v)| (acc + w * v, total + w));
    if total <= 0.0 {
        0.0
    } else {
        unit(weighted / total)
    }
}

/// Arithmetic mean, `None` when empty.
pub fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// `part / whole`, 0 when `whole` is 0.
pub fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        unit(part as f64 / whole as f64)
    }
}
