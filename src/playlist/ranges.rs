//! Loaded-range bookkeeping.

/// Normalized set of closed `(start, end)` intervals of loaded positions.
///
/// Intervals are kept sorted by start, and no two intervals overlap or
/// touch (`end + 1 == next.start` is merged). Ranges are only ever added;
/// [`RangeTracker::clear`] wipes the whole set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeTracker {
    ranges: Vec<(usize, usize)>,
}

impl RangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `[start, end]` as loaded.
    pub fn mark_loaded(&mut self, start: usize, end: usize) {
        if end < start {
            return;
        }

        // Extend an overlapping or adjacent interval in place if there is one
        let neighbour = self
            .ranges
            .iter_mut()
            .find(|(s, e)| *s <= end.saturating_add(1) && start <= e.saturating_add(1));
        match neighbour {
            Some(range) => {
                range.0 = range.0.min(start);
                range.1 = range.1.max(end);
            }
            None => self.ranges.push((start, end)),
        }

        self.normalize();
    }

    /// Sort and merge; interval counts are small (tens), so a full pass is fine.
    fn normalize(&mut self) {
        self.ranges.sort_unstable_by_key(|&(start, _)| start);

        let mut merged: Vec<(usize, usize)> = Vec::with_capacity(self.ranges.len());
        for &(start, end) in &self.ranges {
            match merged.last_mut() {
                Some(last) if start <= last.1.saturating_add(1) => {
                    last.1 = last.1.max(end);
                }
                _ => merged.push((start, end)),
            }
        }
        self.ranges = merged;
    }

    pub fn contains(&self, index: usize) -> bool {
        self.ranges
            .iter()
            .any(|&(start, end)| start <= index && index <= end)
    }

    /// Whether every position in `[start, end]` is loaded.
    pub fn contains_span(&self, start: usize, end: usize) -> bool {
        end >= start
            && self
                .ranges
                .iter()
                .any(|&(s, e)| s <= start && end <= e)
    }

    /// Number of loaded positions.
    pub fn count(&self) -> usize {
        self.ranges.iter().map(|&(start, end)| end - start + 1).sum()
    }

    /// First position in `[0, total)` not covered by any interval.
    pub fn first_gap(&self, total: usize) -> Option<usize> {
        let mut next = 0;
        for &(start, end) in &self.ranges {
            if start > next {
                break;
            }
            next = next.max(end + 1);
        }
        (next < total).then_some(next)
    }

    pub fn ranges(&self) -> &[(usize, usize)] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }
}
