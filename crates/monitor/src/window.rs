//! Fixed-capacity FIFO buffer of numeric samples.

use std::collections::VecDeque;

use triage_core::{Result, TriageError};

/// Keeps the `capacity` most recent values in insertion order.
///
/// Pushing into a full window evicts the oldest value first.
#[derive(Debug, Clone)]
pub struct RollingWindow<T = f64> {
    capacity: usize,
    samples: VecDeque<T>,
}

impl<T> RollingWindow<T>
where
    T: Copy + PartialOrd + Into<f64>,
{
    /// Create an empty window. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, value: T) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Oldest-first copy of the window.
    pub fn snapshot(&self) -> Vec<T> {
        self.samples.iter().copied().collect()
    }

    /// The `n` most recent values, oldest first. Shorter when not yet filled.
    pub fn last_n(&self, n: usize) -> Vec<T> {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip).copied().collect()
    }

    /// Most recent value.
    pub fn latest(&self) -> Option<T> {
        self.samples.back().copied()
    }

    pub fn average(&self) -> Result<f64> {
        self.average_last(self.samples.len())
    }

    /// Average of the `n` most recent values, or of all when fewer are held.
    pub fn average_last(&self, n: usize) -> Result<f64> {
        let taken = n.min(self.samples.len());
        if taken == 0 {
            return Err(TriageError::EmptyWindow);
        }
        let sum: f64 = self.samples.iter().rev().take(taken).map(|v| (*v).into()).sum();
        Ok(sum / taken as f64)
    }

    pub fn min(&self) -> Result<T> {
        self.extremum(|candidate, best| candidate < best)
    }

    pub fn max(&self) -> Result<T> {
        self.extremum(|candidate, best| candidate > best)
    }

    fn extremum(&self, better: impl Fn(&T, &T) -> bool) -> Result<T> {
        let mut iter = self.samples.iter();
        let first = *iter.next().ok_or(TriageError::EmptyWindow)?;
        Ok(iter.fold(first, |best, v| if better(v, &best) { *v } else { best }))
    }
}
