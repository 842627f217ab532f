//! Reordering of hierarchical records.
//!
//! Head, section and volume records must reach downstream processing in an
//! order where parents are known before their volumes, but catalogs deliver
//! them in any order. A reorderer holds such records back in a
//! [`Scratchpad`] while the input is read and releases them once the input
//! is exhausted, ordered by a sort key chosen by its [`ReorderStrategy`].
//!
//! [`JobItemReorderer::next`] is a small state machine:
//!
//! - an EMPTY input means the source is exhausted: the next buffered record
//!   is released, or `None` once nothing is left;
//! - a successful head/section/volume record is buffered and EMPTY is
//!   returned in its place;
//! - anything else passes through unchanged.

pub mod scratchpad;
pub mod volume_after_parents;
pub mod volume_include_parents;

pub use self::scratchpad::{InMemoryScratchpad, Scratchpad, ScratchpadEntry};
pub use self::volume_after_parents::VolumeAfterParents;
pub use self::volume_include_parents::VolumeIncludeParents;

use crate::error::{PartitionResult, PartitionerError};
use crate::job::JobSpecification;
use crate::partitioner::DataPartitionerResult;
use crate::record_info::{RecordInfo, RecordType};
use log::debug;

/// Retrieval rank of buffered records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(i32)]
pub enum SortOrder {
    /// Head records
    Head = 1,
    /// Section records
    Section = 2,
    /// Volume records
    Volume = 3,
    /// Deleted volume records
    VolumeDelete = 4,
    /// Deleted section records
    SectionDelete = 5,
    /// Deleted head records
    HeadDelete = 6,
}

impl SortOrder {
    /// Rank for a record, taking deletion into account.
    ///
    /// Parents go before their volumes, deletions in reverse: volumes are
    /// deleted before the sections and heads they belong to.
    #[must_use]
    pub fn for_record(info: &RecordInfo) -> Self {
        match (info.record_type, info.is_delete) {
            (RecordType::Head, false) => SortOrder::Head,
            (RecordType::Section, false) => SortOrder::Section,
            (RecordType::Volume | RecordType::Standalone, false) => SortOrder::Volume,
            (RecordType::Volume | RecordType::Standalone, true) => SortOrder::VolumeDelete,
            (RecordType::Section, true) => SortOrder::SectionDelete,
            (RecordType::Head, true) => SortOrder::HeadDelete,
        }
    }

    /// Integer key stored in the scratchpad.
    #[must_use]
    pub fn key(self) -> i32 {
        self as i32
    }
}

/// Reordering of the results of one job.
pub trait ItemReorderer: std::fmt::Debug {
    /// Job whose records are reordered.
    fn job_id(&self) -> i32;

    /// Whether buffered records remain.
    fn has_next(&self) -> bool {
        self.buffered_count() > 0
    }

    /// Feed one result; see the module documentation for the transitions.
    ///
    /// # Errors
    ///
    /// Returns [`PartitionerError::Reorder`] or
    /// [`PartitionerError::Scratchpad`] if buffered records cannot be stored
    /// or released.
    fn next(&mut self, result: DataPartitionerResult) -> PartitionResult<Option<DataPartitionerResult>>;

    /// Number of records currently buffered.
    fn buffered_count(&self) -> usize;

    /// Whether released records are MarcXchange collections, so the format
    /// partitioner should produce collections too.
    fn wants_collection_wrapper(&self) -> bool;
}

impl<T: ItemReorderer + ?Sized> ItemReorderer for Box<T> {
    fn job_id(&self) -> i32 {
        (**self).job_id()
    }

    fn has_next(&self) -> bool {
        (**self).has_next()
    }

    fn next(&mut self, result: DataPartitionerResult) -> PartitionResult<Option<DataPartitionerResult>> {
        (**self).next(result)
    }

    fn buffered_count(&self) -> usize {
        (**self).buffered_count()
    }

    fn wants_collection_wrapper(&self) -> bool {
        (**self).wants_collection_wrapper()
    }
}

/// Ordering policy of a [`JobItemReorderer`].
pub trait ReorderStrategy: std::fmt::Debug {
    /// Scratchpad rank of a record.
    fn sort_key(&self, info: &RecordInfo) -> SortOrder;

    /// Build the result released for `entry`.
    ///
    /// The entry itself is removed from the scratchpad by the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if related records cannot be looked up or merged.
    fn release(
        &self,
        scratchpad: &dyn Scratchpad,
        entry: ScratchpadEntry,
    ) -> PartitionResult<DataPartitionerResult>;

    /// Whether released records are MarcXchange collections.
    fn wants_collection_wrapper(&self) -> bool {
        false
    }
}

/// Scratchpad backed reorderer for one job.
#[derive(Debug)]
pub struct JobItemReorderer<S: ReorderStrategy, P: Scratchpad> {
    job_id: i32,
    strategy: S,
    scratchpad: P,
    buffered: usize,
}

impl<S: ReorderStrategy, P: Scratchpad> JobItemReorderer<S, P> {
    /// Create a reorderer, picking up records a previous run of the job left
    /// in the scratchpad.
    ///
    /// # Errors
    ///
    /// Returns an error if the scratchpad cannot be counted.
    pub fn new(job_id: i32, strategy: S, scratchpad: P) -> PartitionResult<Self> {
        let buffered = scratchpad.count(job_id)?;
        if buffered > 0 {
            debug!("Job {job_id} resumes with {buffered} buffered records");
        }
        Ok(JobItemReorderer {
            job_id,
            strategy,
            scratchpad,
            buffered,
        })
    }

    /// Borrow the scratchpad.
    pub fn scratchpad(&self) -> &P {
        &self.scratchpad
    }

    fn release_next(&mut self) -> PartitionResult<Option<DataPartitionerResult>> {
        if self.buffered == 0 {
            return Ok(None);
        }
        let entry = self.scratchpad.first(self.job_id)?.ok_or_else(|| {
            PartitionerError::Reorder(format!(
                "Job {} should have {} buffered records but the scratchpad has none",
                self.job_id, self.buffered
            ))
        })?;
        // Built before removal so a failed release leaves the entry buffered.
        let released = self.strategy.release(&self.scratchpad, entry.clone())?;
        self.scratchpad.remove(&entry)?;
        self.buffered -= 1;
        debug!(
            "Job {} releases record {} from position {}",
            self.job_id, entry.record_info.id, entry.position
        );
        Ok(Some(released))
    }
}

impl<S: ReorderStrategy, P: Scratchpad> ItemReorderer for JobItemReorderer<S, P> {
    fn job_id(&self) -> i32 {
        self.job_id
    }

    fn next(&mut self, result: DataPartitionerResult) -> PartitionResult<Option<DataPartitionerResult>> {
        if result.is_empty() {
            return self.release_next();
        }

        let sort_key = match &result.record_info {
            Some(info) if info.must_be_reordered() && result.is_success() => {
                self.strategy.sort_key(info)
            },
            _ => return Ok(Some(result)),
        };
        debug!(
            "Job {} buffers position {} with sort key {:?}",
            self.job_id, result.position, sort_key
        );
        self.scratchpad.add(self.job_id, sort_key.key(), result)?;
        self.buffered += 1;
        Ok(Some(DataPartitionerResult::EMPTY))
    }

    fn buffered_count(&self) -> usize {
        self.buffered
    }

    fn wants_collection_wrapper(&self) -> bool {
        self.strategy.wants_collection_wrapper()
    }
}

/// Reordering requested by a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeOfReordering {
    /// Volumes after their parents
    VolumeAfterParents,
    /// Volumes merged with their parents
    VolumeIncludeParents,
}

impl TypeOfReordering {
    /// Reordering for `spec`, if any.
    ///
    /// Jobs asking for parents to be included get
    /// [`TypeOfReordering::VolumeIncludeParents`]; transfile driven jobs that
    /// are not previews get [`TypeOfReordering::VolumeAfterParents`].
    #[must_use]
    pub fn for_job(spec: &JobSpecification) -> Option<Self> {
        if spec.include_parents {
            return Some(TypeOfReordering::VolumeIncludeParents);
        }
        let has_transfile = spec
            .ancestry
            .as_ref()
            .is_some_and(|ancestry| ancestry.transfile.is_some());
        if has_transfile && !spec.preview_only {
            return Some(TypeOfReordering::VolumeAfterParents);
        }
        None
    }

    /// Build the reorderer for `job_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scratchpad cannot be counted.
    pub fn reorderer<'a, P: Scratchpad + 'a>(
        self,
        job_id: i32,
        scratchpad: P,
    ) -> PartitionResult<Box<dyn ItemReorderer + 'a>> {
        Ok(match self {
            TypeOfReordering::VolumeAfterParents => {
                Box::new(JobItemReorderer::new(job_id, VolumeAfterParents, scratchpad)?)
            },
            TypeOfReordering::VolumeIncludeParents => {
                Box::new(JobItemReorderer::new(job_id, VolumeIncludeParents, scratchpad)?)
            },
        })
    }
}
