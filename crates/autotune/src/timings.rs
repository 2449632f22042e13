//! Measured times ordered fastest first.

use serde::{Deserialize, Serialize};

/// Ascending mapping from elapsed seconds to the profile that produced it.
/// Equal times keep their insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingResults<P> {
    entries: Vec<(f64, P)>,
}

impl<P> Default for TimingResults<P> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<P> TimingResults<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a measurement; non-finite times are ignored.
    pub fn insert(&mut self, seconds: f64, profile: P) {
        if !seconds.is_finite() {
            return;
        }
        let at = self.entries.partition_point(|(time, _)| *time <= seconds);
        self.entries.insert(at, (seconds, profile));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn best(&self) -> Option<(f64, &P)> {
        self.entries.first().map(|(time, profile)| (*time, profile))
    }

    /// Keeps only the `n` fastest entries.
    pub fn truncate(&mut self, n: usize) {
        self.entries.truncate(n);
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &P)> {
        self.entries.iter().map(|(time, profile)| (*time, profile))
    }

    pub fn profiles(&self) -> impl Iterator<Item = &P> {
        self.entries.iter().map(|(_, profile)| profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascending_with_insertion_order_on_ties() {
        let mut results = TimingResults::new();
        results.insert(0.3, "c");
        results.insert(0.1, "a");
        results.insert(0.3, "d");
        results.insert(0.2, "b");
        results.insert(0.1, "a2");
        let order: Vec<&str> = results.profiles().copied().collect();
        assert_eq!(order, vec!["a", "a2", "b", "c", "d"]);
        assert_eq!(results.best(), Some((0.1, &"a")));
    }

    #[test]
    fn truncate_and_clear() {
        let mut results = TimingResults::new();
        for (i, time) in [0.5, 0.4, 0.3, 0.2].into_iter().enumerate() {
            results.insert(time, i);
        }
        results.insert(f64::NAN, 99);
        results.truncate(2);
        assert_eq!(results.profiles().copied().collect::<Vec<_>>(), vec![3, 2]);
        results.clear();
        assert!(results.is_empty());
        assert_eq!(results.best(), None);
    }
}
