//! MarcXchange serialization and deserialization of MARC records.
//!
//! MarcXchange (ISO 25577) shares its element layout with MARCXML: `tag`,
//! `ind1`, `ind2` and `code` are XML attributes, the root `<record>` (or
//! `<collection>`) element carries the `info:lc/xmlns/marcxchange-v1`
//! namespace. Partitioners emit every parsed record in this form.
//!
//! For deserialization any namespace (default or prefixed) is accepted, so
//! MARC21 slim documents read just as well.

use crate::error::{MarcError, Result};
use crate::leader::Leader;
use crate::record::{Field, Record};
use quick_xml::de::from_str as xml_from_str;
use quick_xml::se::to_string as xml_to_string;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// The MarcXchange namespace URI.
pub const MARCXCHANGE_NS: &str = "info:lc/xmlns/marcxchange-v1";

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>";

/// MarcXchange record representation for serialization.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "record")]
pub struct MarcxchangeRecord {
    /// Leader string, absent in some danMARC2 exports
    #[serde(default)]
    pub leader: String,
    /// Control fields (tags 001-009 without subfields)
    #[serde(default)]
    pub controlfield: Vec<MarcxchangeControlField>,
    /// Data fields
    #[serde(default)]
    pub datafield: Vec<MarcxchangeDataField>,
}

/// Control field representation.
#[derive(Debug, Serialize, Deserialize)]
pub struct MarcxchangeControlField {
    /// Field tag attribute
    #[serde(rename = "@tag")]
    pub tag: String,
    /// Text content
    #[serde(rename = "$value", default)]
    pub value: String,
}

/// Data field representation.
#[derive(Debug, Serialize, Deserialize)]
pub struct MarcxchangeDataField {
    /// Field tag attribute
    #[serde(rename = "@tag")]
    pub tag: String,
    /// First indicator attribute
    #[serde(rename = "@ind1", default)]
    pub ind1: String,
    /// Second indicator attribute
    #[serde(rename = "@ind2", default)]
    pub ind2: String,
    /// Subfields
    #[serde(default)]
    pub subfield: Vec<MarcxchangeSubfield>,
}

/// Subfield representation.
#[derive(Debug, Serialize, Deserialize)]
pub struct MarcxchangeSubfield {
    /// Subfield code attribute
    #[serde(rename = "@code")]
    pub code: String,
    /// Text content
    #[serde(rename = "$value", default)]
    pub value: String,
}

/// Collection wrapper for multiple records.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "collection")]
pub struct MarcxchangeCollection {
    /// Records in the collection
    #[serde(default, rename = "record")]
    pub records: Vec<MarcxchangeRecord>,
}

fn namespace_patterns() -> Result<&'static (Regex, Regex)> {
    static PATTERNS: OnceLock<std::result::Result<(Regex, Regex), regex::Error>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Ok((
                Regex::new(r#"\s+xmlns(?::\w+)?="[^"]*""#)?,
                Regex::new(r"<(/?)(\w+):")?,
            ))
        })
        .as_ref()
        .map_err(|e| MarcError::ParseError(format!("Invalid namespace pattern: {e}")))
}

/// Strip namespace prefixes and declarations.
///
/// `marc:record` becomes `record`; `xmlns="..."` and `xmlns:marc="..."` are
/// removed.
fn strip_namespaces(xml: &str) -> Result<String> {
    let (xmlns, prefix) = namespace_patterns()?;
    let stripped = xmlns.replace_all(xml, "");
    Ok(prefix.replace_all(&stripped, "<$1").to_string())
}

/// Name of the document element, skipping declaration, comments and
/// processing instructions.
fn root_element_name(xml: &str) -> Option<&str> {
    let mut rest = xml;
    loop {
        let start = rest.find('<')?;
        rest = &rest[start + 1..];
        if rest.starts_with('?') || rest.starts_with('!') {
            continue;
        }
        let end = rest
            .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .unwrap_or(rest.len());
        return Some(&rest[..end]);
    }
}

// ---------------------------------------------------------------------------
// Serialization: Record -> MarcXchange
// ---------------------------------------------------------------------------

fn to_marcxchange_record(record: &Record) -> Result<MarcxchangeRecord> {
    let leader_bytes = record.leader.as_bytes()?;

    let controlfield = record
        .control_fields
        .iter()
        .map(|(tag, value)| MarcxchangeControlField {
            tag: tag.clone(),
            value: value.clone(),
        })
        .collect();

    let datafield = record
        .fields()
        .map(|field| MarcxchangeDataField {
            tag: field.tag.clone(),
            ind1: field.indicator1.to_string(),
            ind2: field.indicator2.to_string(),
            subfield: field
                .subfields
                .iter()
                .map(|sf| MarcxchangeSubfield {
                    code: sf.code.to_string(),
                    value: sf.value.clone(),
                })
                .collect(),
        })
        .collect();

    Ok(MarcxchangeRecord {
        leader: String::from_utf8_lossy(&leader_bytes).to_string(),
        controlfield,
        datafield,
    })
}

fn record_body(record: &Record) -> Result<String> {
    xml_to_string(&to_marcxchange_record(record)?)
        .map_err(|e| MarcError::ParseError(format!("Failed to serialize to MarcXchange: {e}")))
}

/// Convert a record to a MarcXchange document.
///
/// # Errors
///
/// Returns an error if the record cannot be serialized.
pub fn record_to_marcxchange(record: &Record) -> Result<String> {
    let body = record_body(record)?;
    let body = body.replacen("<record>", &format!("<record xmlns=\"{MARCXCHANGE_NS}\">"), 1);
    Ok(format!("{XML_DECLARATION}{body}"))
}

/// Convert records to a MarcXchange `<collection>` document, keeping their
/// order.
///
/// # Errors
///
/// Returns an error if any record cannot be serialized.
pub fn records_to_collection(records: &[Record]) -> Result<String> {
    let mut xml = format!("{XML_DECLARATION}<collection xmlns=\"{MARCXCHANGE_NS}\">");
    for record in records {
        xml.push_str(&record_body(record)?);
    }
    xml.push_str("</collection>");
    Ok(xml)
}

// ---------------------------------------------------------------------------
// Deserialization: MarcXchange -> Record
// ---------------------------------------------------------------------------

/// Parse a single MarcXchange `<record>` document.
///
/// # Errors
///
/// Returns an error if the XML is invalid or not a record.
pub fn marcxchange_to_record(xml: &str) -> Result<Record> {
    let cleaned = strip_namespaces(xml)?;
    let xml_record: MarcxchangeRecord = xml_from_str(&cleaned)
        .map_err(|e| MarcError::ParseError(format!("Failed to parse MarcXchange: {e}")))?;
    from_marcxchange_record(xml_record)
}

/// Parse a MarcXchange document whose root is either `<record>` or
/// `<collection>`.
///
/// # Errors
///
/// Returns an error if the XML is invalid or the root is neither element.
pub fn marcxchange_to_records(xml: &str) -> Result<Vec<Record>> {
    let cleaned = strip_namespaces(xml)?;
    match root_element_name(&cleaned) {
        Some("record") => {
            let xml_record: MarcxchangeRecord = xml_from_str(&cleaned).map_err(|e| {
                MarcError::ParseError(format!("Failed to parse MarcXchange: {e}"))
            })?;
            Ok(vec![from_marcxchange_record(xml_record)?])
        },
        Some("collection") => {
            let collection: MarcxchangeCollection = xml_from_str(&cleaned).map_err(|e| {
                MarcError::ParseError(format!("Failed to parse MarcXchange collection: {e}"))
            })?;
            collection
                .records
                .into_iter()
                .map(from_marcxchange_record)
                .collect()
        },
        Some(other) => Err(MarcError::ParseError(format!(
            "Unexpected MarcXchange root element <{other}>"
        ))),
        None => Err(MarcError::ParseError(
            "No root element in MarcXchange document".to_string(),
        )),
    }
}

/// Parse MarcXchange bytes (UTF-8), record or collection.
///
/// # Errors
///
/// Returns an error if the bytes are not UTF-8 or not MarcXchange.
pub fn parse_bytes(bytes: &[u8]) -> Result<Vec<Record>> {
    let xml = std::str::from_utf8(bytes)
        .map_err(|e| MarcError::EncodingError(format!("MarcXchange is not UTF-8: {e}")))?;
    marcxchange_to_records(xml)
}

fn from_marcxchange_record(xml_record: MarcxchangeRecord) -> Result<Record> {
    let leader_text = xml_record.leader.trim_matches(|c| c == '\n' || c == '\r');
    let leader = if leader_text.trim().is_empty() {
        Leader::default()
    } else {
        Leader::from_bytes(leader_text.as_bytes())?
    };
    let mut record = Record::new(leader);

    for cf in xml_record.controlfield {
        record.add_control_field(cf.tag, cf.value);
    }

    for df in xml_record.datafield {
        let ind1 = df.ind1.chars().next().unwrap_or(' ');
        let ind2 = df.ind2.chars().next().unwrap_or(' ');
        let mut field = Field::new(df.tag, ind1, ind2);

        for sf in df.subfield {
            let code = sf
                .code
                .chars()
                .next()
                .ok_or_else(|| MarcError::InvalidField("Missing subfield code".to_string()))?;
            field.add_subfield(code, sf.value);
        }

        record.add_field(field);
    }

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume_record() -> Record {
        Record::builder(Leader::default())
            .field(
                Field::builder("001".to_string(), '0', '0')
                    .subfield_str('a', "33445566")
                    .subfield_str('b', "870970")
                    .build(),
            )
            .field(
                Field::builder("004".to_string(), '0', '0')
                    .subfield_str('r', "b")
                    .subfield_str('a', "e")
                    .build(),
            )
            .field(
                Field::builder("245".to_string(), '0', '0')
                    .subfield_str('a', "Bind 1 & 2")
                    .build(),
            )
            .build()
    }

    #[test]
    fn test_record_output_format() {
        let xml = record_to_marcxchange(&volume_record()).unwrap();

        assert!(xml.starts_with(XML_DECLARATION));
        assert!(xml.contains(&format!("<record xmlns=\"{MARCXCHANGE_NS}\">")));
        assert!(xml.contains("<leader>00000n    2200000   4500</leader>"));
        assert!(xml.contains("<datafield tag=\"004\" ind1=\"0\" ind2=\"0\">"));
        assert!(xml.contains("<subfield code=\"r\">b</subfield>"));
        assert!(xml.contains("Bind 1 &amp; 2"));
    }

    #[test]
    fn test_record_roundtrip() {
        let xml = record_to_marcxchange(&volume_record()).unwrap();
        let restored = marcxchange_to_record(&xml).unwrap();

        assert_eq!(restored.subfield_value("001", 'a'), Some("33445566"));
        assert_eq!(restored.subfield_value("004", 'r'), Some("b"));
        assert_eq!(restored.subfield_value("245", 'a'), Some("Bind 1 & 2"));
    }

    #[test]
    fn test_collection_keeps_order() {
        let mut head = volume_record();
        head.fields.clear();
        head.add_field(
            Field::builder("001".to_string(), '0', '0')
                .subfield_str('a', "11223344")
                .build(),
        );

        let xml = records_to_collection(&[head, volume_record()]).unwrap();
        assert!(xml.contains(&format!("<collection xmlns=\"{MARCXCHANGE_NS}\"><record>")));

        let records = marcxchange_to_records(&xml).unwrap();
        let ids: Vec<_> = records
            .iter()
            .filter_map(|r| r.subfield_value("001", 'a'))
            .collect();
        assert_eq!(ids, vec!["11223344", "33445566"]);
    }

    #[test]
    fn test_records_accepts_single_record_root() {
        let xml = record_to_marcxchange(&volume_record()).unwrap();
        assert_eq!(marcxchange_to_records(&xml).unwrap().len(), 1);
    }

    #[test]
    fn test_prefixed_namespace_without_leader() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
        <marcx:record xmlns:marcx="info:lc/xmlns/marcxchange-v1">
            <marcx:datafield tag="001" ind1="0" ind2="0">
                <marcx:subfield code="a">44556677</marcx:subfield>
            </marcx:datafield>
        </marcx:record>"#;

        let records = parse_bytes(xml.as_bytes()).unwrap();
        assert_eq!(records[0].leader, Leader::default());
        assert_eq!(records[0].subfield_value("001", 'a'), Some("44556677"));
    }

    #[test]
    fn test_unexpected_root_is_error() {
        assert!(marcxchange_to_records("<addi><x/></addi>").is_err());
        assert!(marcxchange_to_records("not xml").is_err());
    }
}
