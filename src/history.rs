//! Bounded detection histories and the plurality vote that stabilizes them.

use std::collections::VecDeque;

/// Fixed-capacity history of recent detections; pushing past capacity evicts
/// the oldest entry.
#[derive(Debug, Clone)]
pub struct History<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> History<T> {
    /// A history holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        History {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest when full.
    pub fn push(&mut self, entry: T) {
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Iterate entries oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    /// Current number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the history holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries retained.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Shrink or grow the retention bound, evicting oldest entries if needed.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Drop all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// The label holding a strict plurality of `labels`, with its count.
///
/// Strict means a unique maximum: when two labels tie for the highest count
/// there is no plurality and `None` is returned, so an evenly alternating
/// stream can never stabilize.
pub fn strict_plurality<'a, L>(labels: impl Iterator<Item = &'a L>) -> Option<(&'a L, usize)>
where
    L: Eq + 'a,
{
    let counts = label_counts(labels);
    let (best, count) = *counts.iter().max_by_key(|(_, n)| *n)?;
    let tied = counts.iter().filter(|(_, n)| *n == count).count();
    if tied > 1 {
        return None;
    }
    Some((best, count))
}

/// The most frequent label, its count, and its lead over the runner-up.
///
/// The lead equals the count when only one distinct label is present, and 0
/// on a tie. A label that merely alternates with another never builds a lead
/// above 1 at any prefix, which is what lets callers demand a margin.
pub fn plurality_lead<'a, L>(labels: impl Iterator<Item = &'a L>) -> Option<(&'a L, usize, usize)>
where
    L: Eq + 'a,
{
    let mut counts = label_counts(labels);
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    let (best, count) = *counts.first()?;
    let runner_up = counts.get(1).map_or(0, |(_, n)| *n);
    Some((best, count, count - runner_up))
}

fn label_counts<'a, L>(labels: impl Iterator<Item = &'a L>) -> Vec<(&'a L, usize)>
where
    L: Eq + 'a,
{
    let mut counts: Vec<(&'a L, usize)> = Vec::new();
    for label in labels {
        match counts.iter_mut().find(|(l, _)| *l == label) {
            Some((_, n)) => *n += 1,
            None => counts.push((label, 1)),
        }
    }
    counts
}
