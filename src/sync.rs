//! 多数据流同步
//!
//! Attitude log, GPS log and video run at unrelated rates. Each stream gets
//! an integer stride, and step `k` consumes sample `k * stride` of every
//! stream, so all streams advance monotonically and the schedule stops as
//! soon as one of them runs out.

/// `round(count / min_count)` per stream, at least 1.
///
/// Empty streams are ignored when picking the minimum.
pub fn strides_from_counts(counts: &[usize]) -> Vec<usize> {
    let min = counts.iter().copied().filter(|&c| c > 0).min();
    counts
        .iter()
        .map(|&count| match min {
            Some(min) => ((count as f64 / min as f64).round() as usize).max(1),
            None => 1,
        })
        .collect()
}

/// `round(native_rate / target_rate)` per stream, at least 1.
///
/// A stream with an unknown or non-positive rate is consumed at stride 1.
pub fn strides_from_rates(native_rates: &[f64], target_rate: f64) -> Vec<usize> {
    native_rates
        .iter()
        .map(|&rate| {
            if !(rate.is_finite() && rate > 0.0 && target_rate.is_finite() && target_rate > 0.0) {
                return 1;
            }
            ((rate / target_rate).round() as usize).max(1)
        })
        .collect()
}

/// Lowest native rate, used as target when none is configured.
pub fn slowest_rate(native_rates: &[f64]) -> Option<f64> {
    native_rates
        .iter()
        .copied()
        .filter(|r| r.is_finite() && *r > 0.0)
        .fold(None, |acc, r| Some(acc.map_or(r, |a: f64| a.min(r))))
}

/// Per-step sample indices of each stream.
#[derive(Debug, Clone)]
pub struct SyncSchedule {
    strides: Vec<usize>,
    /// `None` for streams of unknown length; those end on their own.
    counts: Vec<Option<usize>>,
    step: usize,
}

impl SyncSchedule {
    pub fn new(strides: Vec<usize>, counts: Vec<Option<usize>>) -> Self {
        debug_assert_eq!(strides.len(), counts.len());
        let strides = strides.into_iter().map(|s| s.max(1)).collect();
        Self {
            strides,
            counts,
            step: 0,
        }
    }

    /// Strides from the sample counts of streams that all know their length.
    pub fn from_counts(counts: &[usize]) -> Self {
        Self::new(strides_from_counts(counts), counts.iter().map(|&c| Some(c)).collect())
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Steps the schedule will yield, if every stream length is known.
    pub fn len_hint(&self) -> Option<usize> {
        self.strides
            .iter()
            .zip(&self.counts)
            .map(|(&stride, count)| count.map(|c| c.div_ceil(stride)))
            .try_fold(usize::MAX, |acc, n| n.map(|n| acc.min(n)))
    }
}

impl Iterator for SyncSchedule {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let indices: Vec<usize> = self.strides.iter().map(|s| self.step * s).collect();
        let exhausted = indices
            .iter()
            .zip(&self.counts)
            .any(|(&i, count)| matches!(count, Some(c) if i >= *c));
        if exhausted {
            return None;
        }
        self.step += 1;
        Some(indices)
    }
}
