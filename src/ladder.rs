//! Descending ladder of support levels
//!
//! The ladder is built once per session. Non-positive and non-finite values
//! are dropped, the rest are sorted highest first and deduplicated, so the
//! crossing check can walk it top-down and the highest broken support wins.

use serde::{Deserialize, Serialize};

/// Ordered set of support prices, highest first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<f64>", into = "Vec<f64>")]
pub struct LevelLadder {
    levels: Vec<f64>,
}

impl LevelLadder {
    /// Build a ladder from raw configured values
    pub fn new(values: impl IntoIterator<Item = f64>) -> Self {
        let mut ladder = Self::default();
        ladder.configure(values);
        ladder
    }

    /// Replace the ladder contents.
    ///
    /// Values `<= 0.0`, NaN and infinities are excluded here rather than at
    /// evaluation time.
    pub fn configure(&mut self, values: impl IntoIterator<Item = f64>) {
        let mut levels: Vec<f64> = values
            .into_iter()
            .filter(|v| v.is_finite() && *v > 0.0)
            .collect();
        levels.sort_by(|a, b| b.total_cmp(a));
        levels.dedup();
        self.levels = levels;
    }

    /// Exact-match position of `level`.
    ///
    /// Levels are caller-configured constants, never computed, so float
    /// equality is fine here.
    #[inline]
    pub fn index_of(&self, level: f64) -> Option<usize> {
        self.levels.iter().position(|&l| l == level)
    }

    /// The level directly beneath `level`, if any
    pub fn next_lower(&self, level: f64) -> Option<f64> {
        let index = self.index_of(level)?;
        self.levels.get(index + 1).copied()
    }

    /// Iterate all levels, highest first
    #[inline]
    pub fn highest_first(&self) -> impl Iterator<Item = f64> + '_ {
        self.levels.iter().copied()
    }

    /// Iterate from `level` (inclusive) downwards. Empty if `level` is not on
    /// the ladder.
    pub fn from_level(&self, level: f64) -> impl Iterator<Item = f64> + '_ {
        let start = self.index_of(level).unwrap_or(self.levels.len());
        self.levels[start..].iter().copied()
    }

    #[inline]
    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

impl From<Vec<f64>> for LevelLadder {
    fn from(values: Vec<f64>) -> Self {
        Self::new(values)
    }
}

impl From<LevelLadder> for Vec<f64> {
    fn from(ladder: LevelLadder) -> Self {
        ladder.levels
    }
}

impl FromIterator<f64> for LevelLadder {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        Self::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_descending() {
        let ladder = LevelLadder::new([6855.0, 6866.0, 6859.0]);
        assert_eq!(ladder.levels(), &[6866.0, 6859.0, 6855.0]);
    }

    #[test]
    fn test_filters_non_positive() {
        let ladder = LevelLadder::new([0.0, 6859.0, -1.0, f64::NAN, f64::INFINITY]);
        assert_eq!(ladder.levels(), &[6859.0]);
    }

    #[test]
    fn test_dedup() {
        let ladder = LevelLadder::new([6859.0, 6866.0, 6859.0]);
        assert_eq!(ladder.len(), 2);
    }

    #[test]
    fn test_index_of() {
        let ladder = LevelLadder::new([6855.0, 6866.0, 6859.0]);
        assert_eq!(ladder.index_of(6866.0), Some(0));
        assert_eq!(ladder.index_of(6855.0), Some(2));
        assert_eq!(ladder.index_of(6860.0), None);
    }

    #[test]
    fn test_next_lower() {
        let ladder = LevelLadder::new([6855.0, 6866.0, 6859.0]);
        assert_eq!(ladder.next_lower(6866.0), Some(6859.0));
        assert_eq!(ladder.next_lower(6859.0), Some(6855.0));
        assert_eq!(ladder.next_lower(6855.0), None);
        assert_eq!(ladder.next_lower(7000.0), None);
    }

    #[test]
    fn test_from_level() {
        let ladder = LevelLadder::new([6855.0, 6866.0, 6859.0]);
        let tail: Vec<f64> = ladder.from_level(6859.0).collect();
        assert_eq!(tail, vec![6859.0, 6855.0]);
        assert_eq!(ladder.from_level(1.0).count(), 0);
    }

    #[test]
    fn test_reconfigure_replaces() {
        let mut ladder = LevelLadder::new([6866.0]);
        ladder.configure([100.0, 200.0]);
        assert_eq!(ladder.levels(), &[200.0, 100.0]);
    }

    #[test]
    fn test_empty() {
        let ladder: LevelLadder = std::iter::empty().collect();
        assert!(ladder.is_empty());
        assert_eq!(ladder.highest_first().count(), 0);
    }
}
