//! Integration tests for the format partitioners, built through the factory.

mod common;

use common::{addi_unit, collect_results, danmarc_record, info_id, iso2709, line_format, payload_ids};
use dataio_partitioner::job::JobSpecification;
use dataio_partitioner::marcxchange;
use dataio_partitioner::partitioner::factory::{create_data_partitioner, RecordSplitter};
use dataio_partitioner::partitioner::DataPartitioner;
use dataio_partitioner::reorder::InMemoryScratchpad;
use dataio_partitioner::{ChunkItemStatus, ChunkItemType, PartitionerError, RecordType};
use std::io::Cursor;

fn spec(splitter: RecordSplitter, charset: &str) -> JobSpecification {
    JobSpecification {
        record_splitter: splitter,
        charset: charset.to_string(),
        ..JobSpecification::default()
    }
}

fn partitioner(
    input: Vec<u8>,
    splitter: RecordSplitter,
    charset: &str,
) -> Box<dyn DataPartitioner> {
    create_data_partitioner(Cursor::new(input), &spec(splitter, charset), InMemoryScratchpad::new())
        .expect("Failed to create partitioner")
}

fn statuses(results: &[dataio_partitioner::DataPartitionerResult]) -> Vec<ChunkItemStatus> {
    results
        .iter()
        .map(|r| r.chunk_item.as_ref().expect("No chunk item").status)
        .collect()
}

#[test]
fn test_iso2709_broken_record_is_isolated() {
    let mut input = iso2709(&[danmarc_record("first", None, None)]);
    input.extend_from_slice(b"garbage\x1D\r\n");
    input.extend(iso2709(&[danmarc_record("second", Some("h"), None)]));
    let length = input.len() as u64;

    let mut partitioner = partitioner(input, RecordSplitter::Iso2709, "utf-8");
    let results = collect_results(&mut partitioner);

    assert_eq!(
        statuses(&results),
        vec![
            ChunkItemStatus::Success,
            ChunkItemStatus::Failure,
            ChunkItemStatus::Success
        ]
    );
    assert_eq!(results.iter().map(|r| r.position).collect::<Vec<_>>(), vec![0, 1, 2]);

    let failed = results[1].chunk_item.as_ref().unwrap();
    assert_eq!(failed.data, b"garbage\x1D");
    assert_eq!(failed.diagnostics.len(), 1);
    assert!(results[1].record_info.is_none());

    assert_eq!(payload_ids(&results[2]), vec!["second"]);
    assert_eq!(results[2].record_info.as_ref().unwrap().record_type, RecordType::Head);
    assert_eq!(partitioner.bytes_read(), length);
}

#[test]
fn test_iso2709_truncated_stream_is_an_error() {
    let mut input = iso2709(&[danmarc_record("first", None, None)]);
    input.extend_from_slice(b"00123nam  22");

    let mut partitioner = partitioner(input, RecordSplitter::Iso2709, "utf-8");
    assert!(partitioner.next_result().unwrap().is_some());
    assert!(matches!(
        partitioner.next_result(),
        Err(PartitionerError::PrematureEndOfData(_))
    ));
}

#[test]
fn test_iso2709_collection_variant_wraps_records() {
    let input = iso2709(&[danmarc_record("only", None, None)]);
    let mut partitioner = partitioner(input, RecordSplitter::Iso2709Collection, "utf-8");
    let results = collect_results(&mut partitioner);

    let payload = results[0].chunk_item.as_ref().unwrap().data_as_string();
    assert!(payload.contains("collection"));
    assert_eq!(payload_ids(&results[0]), vec!["only"]);
}

#[test]
fn test_line_format_danmarc2_diacritics_are_composed() {
    let mut input = b"001 00 *a1*b870970\n245 00 *aB".to_vec();
    input.extend_from_slice(&[0xC8, b'a']);
    input.extend_from_slice(b"r\n$\n");

    let mut partitioner = partitioner(input, RecordSplitter::DanMarc2LineFormat, "danmarc2");
    let results = collect_results(&mut partitioner);
    assert_eq!(results.len(), 1);

    let item = results[0].chunk_item.as_ref().unwrap();
    let records = marcxchange::parse_bytes(&item.data).unwrap();
    assert_eq!(records[0].subfield_value("245", 'a'), Some("B\u{e4}r"));
}

#[test]
fn test_line_format_bytes_read_matches_input() {
    let input = [
        line_format("a", None, None),
        "\n\n".to_string(),
        line_format("b", Some("s"), Some("a")),
    ]
    .concat();
    let length = input.len() as u64;

    let mut partitioner =
        partitioner(input.into_bytes(), RecordSplitter::DanMarc2LineFormat, "utf-8");
    let results = collect_results(&mut partitioner);

    assert_eq!(results.iter().map(info_id).collect::<Vec<_>>(), vec!["a", "b"]);
    assert_eq!(
        results[1].record_info.as_ref().unwrap().parent_relation.as_deref(),
        Some("a")
    );
    assert_eq!(partitioner.bytes_read(), length);
}

#[test]
fn test_addi_marcxchange_records_are_classified() {
    let content = marcxchange::record_to_marcxchange(&danmarc_record("vol", Some("b"), Some("head")))
        .unwrap();
    let input = [
        addi_unit(r#"{"trackingId": "t-1"}"#, &content),
        addi_unit("{}", "not marcxchange"),
    ]
    .concat();
    let length = input.len() as u64;

    let mut partitioner =
        partitioner(input.into_bytes(), RecordSplitter::AddiMarcXchange, "utf-8");
    let results = collect_results(&mut partitioner);

    assert_eq!(
        statuses(&results),
        vec![ChunkItemStatus::Success, ChunkItemStatus::Failure]
    );
    let item = results[0].chunk_item.as_ref().unwrap();
    assert_eq!(item.tracking_id.as_deref(), Some("t-1"));
    assert_eq!(item.types, vec![ChunkItemType::Addi, ChunkItemType::Marcxchange]);

    let info = results[0].record_info.as_ref().unwrap();
    assert_eq!(info.id, "vol");
    assert_eq!(info.record_type, RecordType::Volume);
    assert_eq!(partitioner.bytes_read(), length);
}

#[test]
fn test_addi_drain_resumes_at_position() {
    let input = [
        addi_unit("{}", "one"),
        addi_unit("{}", "two"),
        addi_unit("{}", "three"),
    ]
    .concat();

    let mut partitioner = partitioner(input.into_bytes(), RecordSplitter::Addi, "utf-8");
    partitioner.drain_items(2).unwrap();
    let next = partitioner.next_result().unwrap().unwrap();
    assert_eq!(next.position, 2);
    assert!(next.record_info.is_none());
    assert!(partitioner.next_result().unwrap().is_none());
}

#[test]
fn test_xml_children_become_documents() {
    let input = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
                 <records xmlns=\"urn:test\">\n  <record id=\"1\">one</record>\n  <record id=\"2\"/>\n</records>\n";

    let mut partitioner = partitioner(input.as_bytes().to_vec(), RecordSplitter::Xml, "utf-8");
    let results = collect_results(&mut partitioner);
    assert_eq!(results.len(), 2);

    let first = results[0].chunk_item.as_ref().unwrap().data_as_string();
    assert!(first.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
    assert!(first.contains("<record id=\"1\">one</record>"));
    assert!(!first.contains("id=\"2\""));
    assert!(first.ends_with("</records>"));
    assert!(results.iter().all(|r| r.record_info.is_none()));
}

#[test]
fn test_xml_encoding_mismatch_is_an_error() {
    let input = "<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><r><a/></r>";
    let mut partitioner = partitioner(input.as_bytes().to_vec(), RecordSplitter::Xml, "utf-8");
    assert!(matches!(
        partitioner.next_result(),
        Err(PartitionerError::InvalidEncoding(_))
    ));
}

#[test]
fn test_json_lines() {
    let input = "{\"a\": 1}\n\n{broken\n[1, 2]\n";
    let mut partitioner = partitioner(input.as_bytes().to_vec(), RecordSplitter::Json, "utf-8");
    let results = collect_results(&mut partitioner);

    assert_eq!(
        statuses(&results),
        vec![
            ChunkItemStatus::Success,
            ChunkItemStatus::Ignore,
            ChunkItemStatus::Failure,
            ChunkItemStatus::Success
        ]
    );
    assert_eq!(results[0].chunk_item.as_ref().unwrap().data_as_string(), "{\"a\":1}");
}

#[test]
fn test_dsd_header_does_not_take_a_position() {
    let input = "title,author\nA,B\nC,D\n";
    let mut partitioner = partitioner(input.as_bytes().to_vec(), RecordSplitter::DsdCsv, "utf-8");
    let results = collect_results(&mut partitioner);

    assert_eq!(results.iter().map(|r| r.position).collect::<Vec<_>>(), vec![0, 1]);
    assert_eq!(
        results[0].chunk_item.as_ref().unwrap().data_as_string(),
        "<csv><line><C0>A</C0><C1>B</C1></line></csv>"
    );
    assert_eq!(partitioner.bytes_read(), input.len() as u64);
}

#[test]
fn test_every_splitter_rejects_unknown_encoding() {
    for splitter in RecordSplitter::ALL {
        let result = create_data_partitioner(
            Cursor::new(Vec::new()),
            &spec(splitter, "no-such-charset"),
            InMemoryScratchpad::new(),
        );
        assert!(
            matches!(result, Err(PartitionerError::InvalidEncoding(_))),
            "{splitter:?} accepted an unknown encoding"
        );
    }
}
