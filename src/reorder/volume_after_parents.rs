//! Release order: heads, sections, volumes, then deletions bottom-up.

use super::{ReorderStrategy, Scratchpad, ScratchpadEntry, SortOrder};
use crate::error::PartitionResult;
use crate::partitioner::DataPartitionerResult;
use crate::record_info::RecordInfo;

/// Releases every volume after the heads and sections it may belong to.
#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeAfterParents;

impl ReorderStrategy for VolumeAfterParents {
    fn sort_key(&self, info: &RecordInfo) -> SortOrder {
        SortOrder::for_record(info)
    }

    fn release(
        &self,
        _scratchpad: &dyn Scratchpad,
        entry: ScratchpadEntry,
    ) -> PartitionResult<DataPartitionerResult> {
        Ok(entry.into_result())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partitioner::test_support::classified;
    use crate::record_info::RecordType;
    use crate::reorder::{InMemoryScratchpad, ItemReorderer, JobItemReorderer};

    fn release_order(input: Vec<DataPartitionerResult>) -> Vec<String> {
        let mut reorderer =
            JobItemReorderer::new(1, VolumeAfterParents, InMemoryScratchpad::new()).unwrap();
        let mut out = Vec::new();
        for result in input {
            let passed = reorderer.next(result).unwrap().unwrap();
            if !passed.is_empty() {
                out.push(passed.record_info.unwrap().id);
            }
        }
        while let Some(result) = reorderer.next(DataPartitionerResult::EMPTY).unwrap() {
            out.push(result.record_info.unwrap().id);
        }
        out
    }

    #[test]
    fn test_volumes_follow_parents() {
        let order = release_order(vec![
            classified("v1", RecordType::Volume, false, 0),
            classified("s1", RecordType::Section, false, 1),
            classified("alone", RecordType::Standalone, false, 2),
            classified("h1", RecordType::Head, false, 3),
            classified("v2", RecordType::Volume, false, 4),
        ]);
        assert_eq!(order, vec!["alone", "h1", "s1", "v1", "v2"]);
    }

    #[test]
    fn test_deletions_go_bottom_up_after_additions() {
        let order = release_order(vec![
            classified("h-del", RecordType::Head, true, 0),
            classified("s-del", RecordType::Section, true, 1),
            classified("v-del", RecordType::Volume, true, 2),
            classified("v", RecordType::Volume, false, 3),
            classified("h", RecordType::Head, false, 4),
        ]);
        assert_eq!(order, vec!["h", "v", "v-del", "s-del", "h-del"]);
    }
}
