//! Composition of a format partitioner with an [`ItemReorderer`].

use super::{DataPartitioner, DataPartitionerResult};
use crate::encoding::Charset;
use crate::error::PartitionResult;
use crate::reorder::ItemReorderer;
use log::debug;

/// Partitioner delivering the results of `base` in reordered sequence.
///
/// While `base` has data its results are fed to the reorderer; held-back
/// records are skipped over. Once `base` is exhausted the reorderer is fed
/// EMPTY until it has released everything it buffered.
#[derive(Debug)]
pub struct ReorderingDataPartitioner<P: DataPartitioner, O: ItemReorderer> {
    base: P,
    reorderer: O,
    base_exhausted: bool,
}

impl<P: DataPartitioner, O: ItemReorderer> ReorderingDataPartitioner<P, O> {
    /// Reorder the results of `base` with `reorderer`.
    pub fn new(base: P, reorderer: O) -> Self {
        ReorderingDataPartitioner {
            base,
            reorderer,
            base_exhausted: false,
        }
    }

    /// Whether more results may follow.
    #[must_use]
    pub fn has_next(&self) -> bool {
        !self.base_exhausted || self.reorderer.has_next()
    }

    /// Borrow the reorderer.
    pub fn reorderer(&self) -> &O {
        &self.reorderer
    }

    fn next_input(&mut self) -> PartitionResult<DataPartitionerResult> {
        while !self.base_exhausted {
            match self.base.next_result()? {
                Some(result) if result.is_empty() => continue,
                Some(result) => return Ok(result),
                None => {
                    debug!(
                        "Job {} input exhausted with {} records buffered",
                        self.reorderer.job_id(),
                        self.reorderer.buffered_count()
                    );
                    self.base_exhausted = true;
                },
            }
        }
        Ok(DataPartitionerResult::EMPTY)
    }
}

impl<P: DataPartitioner, O: ItemReorderer> DataPartitioner for ReorderingDataPartitioner<P, O> {
    fn encoding(&self) -> Charset {
        self.base.encoding()
    }

    fn bytes_read(&self) -> u64 {
        self.base.bytes_read()
    }

    fn next_result(&mut self) -> PartitionResult<Option<DataPartitionerResult>> {
        loop {
            let input = self.next_input()?;
            match self.reorderer.next(input)? {
                Some(result) if result.is_empty() => continue,
                next => return Ok(next),
            }
        }
    }

    /// Skips `n` results plus the records a previous run left buffered,
    /// which were consumed from the input without being delivered.
    fn drain_items(&mut self, n: usize) -> PartitionResult<()> {
        self.base.drain_items(n + self.reorderer.buffered_count())
    }

    fn take_skipped_count(&mut self) -> usize {
        self.base.take_skipped_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partitioner::test_support::{classified, plain, VecPartitioner};
    use crate::record_info::RecordType;
    use crate::reorder::{InMemoryScratchpad, JobItemReorderer, Scratchpad, SortOrder, VolumeAfterParents};

    fn data(result: &DataPartitionerResult) -> String {
        result.chunk_item.as_ref().unwrap().data_as_string()
    }

    #[test]
    fn test_volume_is_delivered_after_head() {
        let base = VecPartitioner::new(vec![
            classified("v", RecordType::Volume, false, 0),
            plain("plain", 1),
            classified("h", RecordType::Head, false, 2),
        ]);
        let reorderer = JobItemReorderer::new(1, VolumeAfterParents, InMemoryScratchpad::new()).unwrap();
        let mut partitioner = ReorderingDataPartitioner::new(base, reorderer);
        assert!(partitioner.has_next());

        let delivered: Vec<_> = partitioner
            .results()
            .map(|r| {
                let r = r.unwrap();
                (data(&r), r.position)
            })
            .collect();
        assert_eq!(
            delivered,
            vec![
                ("plain".to_string(), 1),
                ("h".to_string(), 2),
                ("v".to_string(), 0)
            ]
        );
        assert!(!partitioner.has_next());
    }

    #[test]
    fn test_empty_base_results_do_not_drain_early() {
        let base = VecPartitioner::new(vec![
            classified("v", RecordType::Volume, false, 0),
            DataPartitionerResult::EMPTY,
            classified("h", RecordType::Head, false, 1),
        ]);
        let reorderer = JobItemReorderer::new(1, VolumeAfterParents, InMemoryScratchpad::new()).unwrap();
        let mut partitioner = ReorderingDataPartitioner::new(base, reorderer);
        let ids: Vec<_> = partitioner.results().map(|r| data(&r.unwrap())).collect();
        assert_eq!(ids, vec!["h", "v"]);
    }

    #[test]
    fn test_drain_skips_buffered_records_of_previous_run() {
        let mut scratchpad = InMemoryScratchpad::new();
        scratchpad
            .add(1, SortOrder::Volume.key(), classified("v", RecordType::Volume, false, 0))
            .unwrap();

        let base = VecPartitioner::new(vec![
            classified("v", RecordType::Volume, false, 0),
            plain("a", 1),
            plain("b", 2),
            plain("c", 3),
        ]);
        let reorderer = JobItemReorderer::new(1, VolumeAfterParents, &mut scratchpad).unwrap();
        let mut partitioner = ReorderingDataPartitioner::new(base, reorderer);
        partitioner.drain_items(2).unwrap();

        let rest: Vec<_> = partitioner.results().map(|r| data(&r.unwrap())).collect();
        assert_eq!(rest, vec!["c", "v"]);
    }
}
