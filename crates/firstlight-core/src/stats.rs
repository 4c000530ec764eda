//! Nearest-rank percentiles over sorted samples.

/// Value at percentile `pct` (0–100) of an ascending `sorted` slice.
///
/// Nearest-rank: the smallest sample with at least `pct`% of samples at or
/// below it. Returns `None` for an empty slice; `pct` above 100 is clamped.
#[must_use]
pub fn nearest_rank<T: Copy>(sorted: &[T], pct: u32) -> Option<T> {
    if sorted.is_empty() {
        return None;
    }
    let pct_usize = usize::try_from(pct).unwrap_or(100).min(100);
    let rank = pct_usize.saturating_mul(sorted.len()).saturating_add(99) / 100;
    let index = rank.saturating_sub(1).min(sorted.len() - 1);
    sorted.get(index).copied()
}
