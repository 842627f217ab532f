//! Replaying a subset of positions.
//!
//! Rerunning a job for a handful of failed records should not push the
//! whole file through again. [`IncludeFilterDataPartitioner`] drops every
//! result whose position is not in its [`PositionSet`].

use super::{DataPartitioner, DataPartitionerResult};
use crate::encoding::Charset;
use crate::error::PartitionResult;
use serde::{Deserialize, Serialize};

/// Set of positions backed by a bit vector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<u64>", into = "Vec<u64>")]
pub struct PositionSet {
    words: Vec<u64>,
}

impl PositionSet {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `position`.
    pub fn insert(&mut self, position: u64) {
        let (word, bit) = Self::locate(position);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << bit;
    }

    /// Whether `position` is in the set.
    #[must_use]
    pub fn contains(&self, position: u64) -> bool {
        let (word, bit) = Self::locate(position);
        self.words.get(word).is_some_and(|w| w & (1 << bit) != 0)
    }

    /// Number of positions in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Positions in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            (0..64u64)
                .filter(move |bit| word & (1 << bit) != 0)
                .map(move |bit| i as u64 * 64 + bit)
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn locate(position: u64) -> (usize, u64) {
        ((position / 64) as usize, position % 64)
    }
}

impl FromIterator<u64> for PositionSet {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        let mut set = PositionSet::new();
        for position in iter {
            set.insert(position);
        }
        set
    }
}

impl From<Vec<u64>> for PositionSet {
    fn from(positions: Vec<u64>) -> Self {
        positions.into_iter().collect()
    }
}

impl From<PositionSet> for Vec<u64> {
    fn from(set: PositionSet) -> Self {
        set.iter().collect()
    }
}

/// Partitioner passing on only results at included positions.
#[derive(Debug)]
pub struct IncludeFilterDataPartitioner<P: DataPartitioner> {
    base: P,
    include: PositionSet,
    skipped: usize,
}

impl<P: DataPartitioner> IncludeFilterDataPartitioner<P> {
    /// Filter `base` down to the positions in `include`.
    pub fn new(base: P, include: PositionSet) -> Self {
        IncludeFilterDataPartitioner {
            base,
            include,
            skipped: 0,
        }
    }

    /// Unwrap the filtered partitioner.
    pub fn into_inner(self) -> P {
        self.base
    }
}

impl<P: DataPartitioner> DataPartitioner for IncludeFilterDataPartitioner<P> {
    fn encoding(&self) -> Charset {
        self.base.encoding()
    }

    fn bytes_read(&self) -> u64 {
        self.base.bytes_read()
    }

    fn next_result(&mut self) -> PartitionResult<Option<DataPartitionerResult>> {
        while let Some(result) = self.base.next_result()? {
            if result.is_empty() || self.include.contains(result.position) {
                return Ok(Some(result));
            }
            self.skipped += 1;
        }
        Ok(None)
    }

    fn take_skipped_count(&mut self) -> usize {
        std::mem::take(&mut self.skipped) + self.base.take_skipped_count()
    }
}
