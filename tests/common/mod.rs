//! Common test helpers shared across the integration tests.

#![allow(dead_code)]

use dataio_partitioner::marcxchange;
use dataio_partitioner::partitioner::DataPartitioner;
use dataio_partitioner::{DataPartitionerResult, Field, Leader, MarcWriter, Record};

/// Builds a danMARC2 style record: `001 *a<id>*b870970`, an optional
/// `004 *r<kind>*ae` and an optional `014 *a<parent>`.
pub fn danmarc_record(id: &str, kind: Option<&str>, parent: Option<&str>) -> Record {
    let mut record = Record::new(Leader::default());

    let mut field_001 = Field::new("001".to_string(), '0', '0');
    field_001.add_subfield('a', id.to_string());
    field_001.add_subfield('b', "870970".to_string());
    record.add_field(field_001);

    if let Some(kind) = kind {
        let mut field_004 = Field::new("004".to_string(), '0', '0');
        field_004.add_subfield('r', kind.to_string());
        field_004.add_subfield('a', "e".to_string());
        record.add_field(field_004);
    }

    if let Some(parent) = parent {
        let mut field_014 = Field::new("014".to_string(), '0', '0');
        field_014.add_subfield('a', parent.to_string());
        record.add_field(field_014);
    }

    let mut field_245 = Field::new("245".to_string(), '0', '0');
    field_245.add_subfield('a', format!("Title of {id}"));
    record.add_field(field_245);

    record
}

/// The same record in danMARC2 line format, `$` terminated.
pub fn line_format(id: &str, kind: Option<&str>, parent: Option<&str>) -> String {
    let mut lines = format!("001 00 *a{id}*b870970\n");
    if let Some(kind) = kind {
        lines.push_str(&format!("004 00 *r{kind}*ae\n"));
    }
    if let Some(parent) = parent {
        lines.push_str(&format!("014 00 *a{parent}\n"));
    }
    lines.push_str(&format!("245 00 *aTitle of {id}\n$\n"));
    lines
}

/// Serializes records to ISO 2709.
pub fn iso2709(records: &[Record]) -> Vec<u8> {
    let mut buffer = Vec::new();
    {
        let mut writer = MarcWriter::new(&mut buffer);
        for record in records {
            writer.write_record(record).expect("Failed to write record");
        }
    }
    buffer
}

/// Frames one Addi unit.
pub fn addi_unit(meta: &str, content: &str) -> String {
    format!("{}\n{meta}\n{}\n{content}\n", meta.len(), content.len())
}

/// Drains a partitioner, panicking on stream errors.
pub fn collect_results<P: DataPartitioner>(partitioner: &mut P) -> Vec<DataPartitionerResult> {
    partitioner
        .results()
        .map(|result| result.expect("Partitioning failed"))
        .collect()
}

/// Record ids (`001 *a`) of every record in a MarcXchange payload.
pub fn payload_ids(result: &DataPartitionerResult) -> Vec<String> {
    let item = result.chunk_item.as_ref().expect("No chunk item");
    marcxchange::parse_bytes(&item.data)
        .expect("Payload is not MarcXchange")
        .iter()
        .filter_map(|record| record.subfield_value("001", 'a').map(str::to_string))
        .collect()
}

/// Record id from the record info of a result.
pub fn info_id(result: &DataPartitionerResult) -> String {
    result
        .record_info
        .as_ref()
        .map(|info| info.id.clone())
        .expect("No record info")
}
