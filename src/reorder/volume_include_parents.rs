//! Release volumes merged with their ancestors.
//!
//! Every record is ranked in the deletion tiers, so volumes come out before
//! sections and heads. A successful volume is released as one MarcXchange
//! collection holding its head, its section (if the parent is a section) and
//! the volume itself. Ancestors stay buffered and are released on their own
//! afterwards.

use super::{ReorderStrategy, Scratchpad, ScratchpadEntry, SortOrder};
use crate::chunk_item::{ChunkItem, ChunkItemType};
use crate::error::{PartitionResult, PartitionerError};
use crate::marcxchange;
use crate::partitioner::DataPartitionerResult;
use crate::record::Record;
use crate::record_info::{RecordInfo, RecordType};
use log::debug;

/// Releases each volume together with its parents.
#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeIncludeParents;

impl VolumeIncludeParents {
    /// Buffered ancestors of `volume`, outermost first.
    fn ancestors(
        scratchpad: &dyn Scratchpad,
        volume: &ScratchpadEntry,
    ) -> PartitionResult<Vec<ScratchpadEntry>> {
        let mut ancestors = Vec::new();
        let Some(parent_id) = volume.record_info.parent_relation.as_deref() else {
            return Ok(ancestors);
        };
        let Some(parent) = scratchpad.find_by_id(volume.job_id, parent_id)? else {
            debug!("Volume {} has no buffered parent {parent_id}", volume.record_info.id);
            return Ok(ancestors);
        };
        if parent.record_info.is_section() {
            if let Some(head_id) = parent.record_info.parent_relation.as_deref() {
                if let Some(head) = scratchpad.find_by_id(volume.job_id, head_id)? {
                    ancestors.push(head);
                }
            }
        }
        ancestors.push(parent);
        Ok(ancestors)
    }
}

fn decode(entry: &ScratchpadEntry) -> PartitionResult<Vec<Record>> {
    let item = entry.chunk_item.as_ref().ok_or_else(|| {
        PartitionerError::Reorder(format!("Record {} has no chunk item", entry.record_info.id))
    })?;
    marcxchange::parse_bytes(&item.data).map_err(|e| {
        PartitionerError::Reorder(format!(
            "Unable to decode record {}: {e}",
            entry.record_info.id
        ))
    })
}

impl ReorderStrategy for VolumeIncludeParents {
    fn sort_key(&self, info: &RecordInfo) -> SortOrder {
        match info.record_type {
            RecordType::Head => SortOrder::HeadDelete,
            RecordType::Section => SortOrder::SectionDelete,
            RecordType::Volume | RecordType::Standalone => SortOrder::VolumeDelete,
        }
    }

    fn release(
        &self,
        scratchpad: &dyn Scratchpad,
        entry: ScratchpadEntry,
    ) -> PartitionResult<DataPartitionerResult> {
        let is_successful_volume = entry.record_info.is_volume()
            && entry.chunk_item.as_ref().is_some_and(ChunkItem::is_success);
        if !is_successful_volume {
            return Ok(entry.into_result());
        }

        let mut records = Vec::new();
        for ancestor in Self::ancestors(scratchpad, &entry)? {
            records.extend(decode(&ancestor)?);
        }
        records.extend(decode(&entry)?);

        let collection = marcxchange::records_to_collection(&records).map_err(|e| {
            PartitionerError::Reorder(format!(
                "Unable to merge volume {} with its parents: {e}",
                entry.record_info.id
            ))
        })?;
        let tracking_id = entry.chunk_item.and_then(|item| item.tracking_id);
        Ok(DataPartitionerResult::new(
            ChunkItem::successful(collection, ChunkItemType::Marcxchange).with_tracking_id(tracking_id),
            Some(entry.record_info),
            entry.position,
        ))
    }

    fn wants_collection_wrapper(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leader::Leader;
    use crate::record::Field;
    use crate::reorder::{InMemoryScratchpad, ItemReorderer, JobItemReorderer};

    fn record_result(id: &str, kind: &str, parent: Option<&str>, position: u64) -> DataPartitionerResult {
        let mut builder = Record::builder(Leader::default())
            .field(Field::builder("001".to_string(), '0', '0').subfield_str('a', id).build())
            .field(Field::builder("004".to_string(), '0', '0').subfield_str('r', kind).build());
        if let Some(parent) = parent {
            builder = builder
                .field(Field::builder("014".to_string(), '0', '0').subfield_str('a', parent).build());
        }
        let record = builder.build();
        DataPartitionerResult::new(
            ChunkItem::successful(
                marcxchange::records_to_collection(std::slice::from_ref(&record)).unwrap(),
                ChunkItemType::Marcxchange,
            ),
            RecordInfo::from_record(&record),
            position,
        )
    }

    fn ids(result: &DataPartitionerResult) -> Vec<String> {
        marcxchange::parse_bytes(&result.chunk_item.as_ref().unwrap().data)
            .unwrap()
            .iter()
            .map(|record| record.subfield_value("001", 'a').unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_volume_is_merged_with_section_and_head() {
        let mut scratchpad = InMemoryScratchpad::new();
        let mut reorderer = JobItemReorderer::new(3, VolumeIncludeParents, &mut scratchpad).unwrap();
        assert!(reorderer.wants_collection_wrapper());

        for result in [
            record_result("vol", "b", Some("sec"), 0),
            record_result("head", "h", None, 1),
            record_result("sec", "s", Some("head"), 2),
        ] {
            assert!(reorderer.next(result).unwrap().unwrap().is_empty());
        }

        assert_eq!(reorderer.buffered_count(), 3);

        let merged = reorderer.next(DataPartitionerResult::EMPTY).unwrap().unwrap();
        assert_eq!(merged.position, 0);
        assert_eq!(ids(&merged), vec!["head", "sec", "vol"]);
        assert_eq!(reorderer.buffered_count(), 2);
        assert_eq!(reorderer.scratchpad().count(3).unwrap(), 2);

        let section = reorderer.next(DataPartitionerResult::EMPTY).unwrap().unwrap();
        assert_eq!(ids(&section), vec!["sec"]);
        let head = reorderer.next(DataPartitionerResult::EMPTY).unwrap().unwrap();
        assert_eq!(ids(&head), vec!["head"]);
        assert!(reorderer.next(DataPartitionerResult::EMPTY).unwrap().is_none());
        drop(reorderer);
        assert!(scratchpad.is_empty());
    }

    #[test]
    fn test_volume_with_head_parent() {
        let mut reorderer =
            JobItemReorderer::new(3, VolumeIncludeParents, InMemoryScratchpad::new()).unwrap();
        reorderer.next(record_result("head", "h", None, 0)).unwrap();
        reorderer.next(record_result("vol", "b", Some("head"), 1)).unwrap();

        let merged = reorderer.next(DataPartitionerResult::EMPTY).unwrap().unwrap();
        assert_eq!(ids(&merged), vec!["head", "vol"]);
    }

    #[test]
    fn test_orphan_volume_is_released_alone() {
        let mut reorderer =
            JobItemReorderer::new(3, VolumeIncludeParents, InMemoryScratchpad::new()).unwrap();
        reorderer.next(record_result("vol", "b", Some("missing"), 0)).unwrap();
        let released = reorderer.next(DataPartitionerResult::EMPTY).unwrap().unwrap();
        assert_eq!(ids(&released), vec!["vol"]);
    }

    #[test]
    fn test_undecodable_volume_is_fatal_and_stays_buffered() {
        let mut reorderer =
            JobItemReorderer::new(3, VolumeIncludeParents, InMemoryScratchpad::new()).unwrap();
        let mut broken = record_result("vol", "b", None, 0);
        if let Some(item) = broken.chunk_item.as_mut() {
            item.data = b"not xml".to_vec();
        }
        reorderer.next(broken).unwrap();
        assert!(matches!(
            reorderer.next(DataPartitionerResult::EMPTY),
            Err(PartitionerError::Reorder(_))
        ));
        assert_eq!(reorderer.buffered_count(), 1);
        assert_eq!(reorderer.scratchpad().count(3).unwrap(), 1);
        assert!(reorderer.scratchpad().find_by_id(3, "vol").unwrap().is_some());
    }
}
