//! Store for records held back by a reorderer.
//!
//! Entries are scoped by job id and retrieved in `(sort_key, seq)` order,
//! where `seq` is the insertion order assigned by the store. A persistent
//! store only has to implement [`Scratchpad`]; [`InMemoryScratchpad`] keeps
//! everything in an ordered map for a single process.

use crate::chunk_item::ChunkItem;
use crate::error::{PartitionResult, PartitionerError};
use crate::partitioner::DataPartitionerResult;
use crate::record_info::RecordInfo;
use std::collections::BTreeMap;

/// One buffered record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchpadEntry {
    /// Job the record belongs to
    pub job_id: i32,
    /// Retrieval rank
    pub sort_key: i32,
    /// Insertion order, assigned by the store
    pub seq: u64,
    /// Chunk item of the buffered result
    pub chunk_item: Option<ChunkItem>,
    /// Classification of the buffered record
    pub record_info: RecordInfo,
    /// Position of the record in the input
    pub position: u64,
}

impl ScratchpadEntry {
    /// Turn the entry back into a partitioning result.
    #[must_use]
    pub fn into_result(self) -> DataPartitionerResult {
        DataPartitionerResult {
            chunk_item: self.chunk_item,
            record_info: Some(self.record_info),
            position: self.position,
        }
    }
}

/// Per-job buffer of records awaiting release.
pub trait Scratchpad: std::fmt::Debug {
    /// Buffer `result` under `sort_key`, returning the assigned sequence
    /// number.
    ///
    /// # Errors
    ///
    /// Returns [`PartitionerError::Scratchpad`] if the result carries no
    /// record info or the store fails.
    fn add(&mut self, job_id: i32, sort_key: i32, result: DataPartitionerResult) -> PartitionResult<u64>;

    /// The entry to release next: lowest sort key, then lowest sequence.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    fn first(&self, job_id: i32) -> PartitionResult<Option<ScratchpadEntry>>;

    /// The first entry whose record id is exactly `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    fn find_by_id(&self, job_id: i32, id: &str) -> PartitionResult<Option<ScratchpadEntry>>;

    /// Delete `entry`.
    ///
    /// # Errors
    ///
    /// Returns [`PartitionerError::Scratchpad`] if the entry is not stored.
    fn remove(&mut self, entry: &ScratchpadEntry) -> PartitionResult<()>;

    /// Number of entries held for `job_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    fn count(&self, job_id: i32) -> PartitionResult<usize>;
}

impl<T: Scratchpad + ?Sized> Scratchpad for &mut T {
    fn add(&mut self, job_id: i32, sort_key: i32, result: DataPartitionerResult) -> PartitionResult<u64> {
        (**self).add(job_id, sort_key, result)
    }

    fn first(&self, job_id: i32) -> PartitionResult<Option<ScratchpadEntry>> {
        (**self).first(job_id)
    }

    fn find_by_id(&self, job_id: i32, id: &str) -> PartitionResult<Option<ScratchpadEntry>> {
        (**self).find_by_id(job_id, id)
    }

    fn remove(&mut self, entry: &ScratchpadEntry) -> PartitionResult<()> {
        (**self).remove(entry)
    }

    fn count(&self, job_id: i32) -> PartitionResult<usize> {
        (**self).count(job_id)
    }
}

impl<T: Scratchpad + ?Sized> Scratchpad for Box<T> {
    fn add(&mut self, job_id: i32, sort_key: i32, result: DataPartitionerResult) -> PartitionResult<u64> {
        (**self).add(job_id, sort_key, result)
    }

    fn first(&self, job_id: i32) -> PartitionResult<Option<ScratchpadEntry>> {
        (**self).first(job_id)
    }

    fn find_by_id(&self, job_id: i32, id: &str) -> PartitionResult<Option<ScratchpadEntry>> {
        (**self).find_by_id(job_id, id)
    }

    fn remove(&mut self, entry: &ScratchpadEntry) -> PartitionResult<()> {
        (**self).remove(entry)
    }

    fn count(&self, job_id: i32) -> PartitionResult<usize> {
        (**self).count(job_id)
    }
}

type EntryKey = (i32, i32, u64);

/// In-process scratchpad ordered by `(job_id, sort_key, seq)`.
#[derive(Debug, Default)]
pub struct InMemoryScratchpad {
    entries: BTreeMap<EntryKey, ScratchpadEntry>,
    next_seq: u64,
}

impl InMemoryScratchpad {
    /// An empty scratchpad.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of entries over all jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no job has buffered entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn job_entries(&self, job_id: i32) -> impl Iterator<Item = &ScratchpadEntry> {
        self.entries
            .range((job_id, i32::MIN, 0)..=(job_id, i32::MAX, u64::MAX))
            .map(|(_, entry)| entry)
    }
}

impl Scratchpad for InMemoryScratchpad {
    fn add(&mut self, job_id: i32, sort_key: i32, result: DataPartitionerResult) -> PartitionResult<u64> {
        let record_info = result.record_info.ok_or_else(|| {
            PartitionerError::Scratchpad(format!(
                "Result at position {} has no record info to buffer",
                result.position
            ))
        })?;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            (job_id, sort_key, seq),
            ScratchpadEntry {
                job_id,
                sort_key,
                seq,
                chunk_item: result.chunk_item,
                record_info,
                position: result.position,
            },
        );
        Ok(seq)
    }

    fn first(&self, job_id: i32) -> PartitionResult<Option<ScratchpadEntry>> {
        Ok(self.job_entries(job_id).next().cloned())
    }

    fn find_by_id(&self, job_id: i32, id: &str) -> PartitionResult<Option<ScratchpadEntry>> {
        Ok(self
            .job_entries(job_id)
            .find(|entry| entry.record_info.id == id)
            .cloned())
    }

    fn remove(&mut self, entry: &ScratchpadEntry) -> PartitionResult<()> {
        self.entries
            .remove(&(entry.job_id, entry.sort_key, entry.seq))
            .map(|_| ())
            .ok_or_else(|| {
                PartitionerError::Scratchpad(format!(
                    "No entry {} for job {} with sort key {}",
                    entry.seq, entry.job_id, entry.sort_key
                ))
            })
    }

    fn count(&self, job_id: i32) -> PartitionResult<usize> {
        Ok(self.job_entries(job_id).count())
    }
}
