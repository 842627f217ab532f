//! Splitting XML documents into one document per child of the root.
//!
//! Every child element of the document root becomes a stand-alone document
//! made of the prolog (XML declaration rewritten to UTF-8, processing
//! instructions), the root start tag, the child subtree and the root end
//! tag. Text and comments between children are dropped.

use super::{DataPartitioner, DataPartitionerResult};
use crate::chunk_item::{ChunkItem, ChunkItemType};
use crate::counting::CountingReader;
use crate::encoding::Charset;
use crate::error::{PartitionResult, PartitionerError};
use log::debug;
use quick_xml::events::{BytesDecl, BytesEnd, Event};
use quick_xml::{Reader, Writer};
use std::fmt::Display;
use std::io::{BufReader, Read, Take};

/// Everything written before a child element.
#[derive(Debug)]
struct Prolog {
    events: Vec<Event<'static>>,
    root_name: String,
}

/// Partitioner producing one XML document per child of the root element.
pub struct XmlDataPartitioner<R: Read> {
    reader: Reader<CountingReader<BufReader<R>>>,
    charset: Charset,
    buf: Vec<u8>,
    prolog: Option<Prolog>,
    finished: bool,
    position: u64,
}

impl<R: Read> std::fmt::Debug for XmlDataPartitioner<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlDataPartitioner")
            .field("charset", &self.charset)
            .field("prolog", &self.prolog)
            .field("finished", &self.finished)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

impl<R: Read> XmlDataPartitioner<R> {
    /// Partitioner for a document expected in `encoding`.
    ///
    /// # Errors
    ///
    /// Returns [`PartitionerError::InvalidEncoding`] for an unknown encoding.
    pub fn new(input: R, encoding: &str) -> PartitionResult<Self> {
        Self::starting_at(input, encoding, 0)
    }

    /// Partitioner numbering its results from `position`.
    ///
    /// # Errors
    ///
    /// Returns [`PartitionerError::InvalidEncoding`] for an unknown encoding.
    pub fn starting_at(input: R, encoding: &str, position: u64) -> PartitionResult<Self> {
        let mut reader = Reader::from_reader(CountingReader::new(BufReader::new(input)));
        reader.trim_text(false);
        Ok(XmlDataPartitioner {
            reader,
            charset: Charset::for_name(encoding)?,
            buf: Vec::new(),
            prolog: None,
            finished: false,
            position,
        })
    }

    /// Borrow the source.
    pub fn get_ref(&self) -> &R {
        self.reader.get_ref().get_ref().get_ref()
    }

    /// Recover the source. Bytes buffered but not yet parsed are lost.
    pub fn into_inner(self) -> R {
        self.reader.into_inner().into_inner().into_inner()
    }

    fn next_event(&mut self) -> PartitionResult<Event<'static>> {
        self.buf.clear();
        self.reader
            .read_event_into(&mut self.buf)
            .map(Event::into_owned)
            .map_err(xml_error)
    }

    /// Read up to and including the root start tag. `None` for a document
    /// without children.
    fn read_prolog(&mut self) -> PartitionResult<Option<Prolog>> {
        let mut events = Vec::new();
        let mut declared: Option<String> = None;

        loop {
            match self.next_event()? {
                Event::Decl(decl) => {
                    if let Some(encoding) = decl.encoding() {
                        let encoding = encoding.map_err(xml_error)?;
                        declared = Some(String::from_utf8_lossy(&encoding).into_owned());
                    }
                    events.push(utf8_declaration());
                },
                Event::PI(pi) => events.push(Event::PI(pi)),
                Event::Start(root) => {
                    self.check_encoding(declared.as_deref())?;
                    if !matches!(events.first(), Some(Event::Decl(_))) {
                        events.insert(0, utf8_declaration());
                    }
                    let root_name = String::from_utf8_lossy(root.name().as_ref()).into_owned();
                    debug!("XML root element <{root_name}>");
                    events.push(Event::Start(root));
                    return Ok(Some(Prolog { events, root_name }));
                },
                Event::Empty(_) | Event::Eof => {
                    self.check_encoding(declared.as_deref())?;
                    return Ok(None);
                },
                _ => {},
            }
        }
    }

    fn check_encoding(&self, declared: Option<&str>) -> PartitionResult<()> {
        let declared = declared.unwrap_or("UTF-8");
        if self.charset.is_equivalent(declared) {
            Ok(())
        } else {
            Err(PartitionerError::InvalidEncoding(format!(
                "Document declares encoding '{declared}' but '{}' was expected",
                self.charset.name()
            )))
        }
    }

    /// Collect the subtree opened by `start`.
    fn read_subtree(&mut self, start: Event<'static>) -> PartitionResult<Vec<Event<'static>>> {
        let mut depth = usize::from(matches!(start, Event::Start(_)));
        let mut events = vec![start];
        while depth > 0 {
            let event = self.next_event()?;
            match event {
                Event::Start(_) => depth += 1,
                Event::End(_) => depth -= 1,
                Event::Eof => {
                    return Err(PartitionerError::PrematureEndOfData(
                        "XML document ends inside an element".to_string(),
                    ))
                },
                _ => {},
            }
            events.push(event);
        }
        Ok(events)
    }

    fn finish(&mut self) -> PartitionResult<()> {
        self.finished = true;
        while !matches!(self.next_event()?, Event::Eof) {}
        Ok(())
    }
}

impl<R: Read> XmlDataPartitioner<Take<R>> {
    /// Partitioner reading at most `limit` bytes of `input`, numbering its
    /// results from `position`.
    ///
    /// # Errors
    ///
    /// Returns [`PartitionerError::InvalidEncoding`] for an unknown encoding.
    pub fn bounded(input: R, encoding: &str, limit: u64, position: u64) -> PartitionResult<Self> {
        Self::starting_at(input.take(limit), encoding, position)
    }
}

impl<R: Read + std::fmt::Debug> DataPartitioner for XmlDataPartitioner<R> {
    fn encoding(&self) -> Charset {
        Charset::Utf8
    }

    fn bytes_read(&self) -> u64 {
        self.reader.get_ref().bytes_read()
    }

    fn next_result(&mut self) -> PartitionResult<Option<DataPartitionerResult>> {
        if self.finished {
            return Ok(None);
        }
        if self.prolog.is_none() {
            match self.read_prolog()? {
                Some(prolog) => self.prolog = Some(prolog),
                None => {
                    self.finish()?;
                    return Ok(None);
                },
            }
        }

        let record = loop {
            match self.next_event()? {
                start @ (Event::Start(_) | Event::Empty(_)) => break self.read_subtree(start)?,
                Event::End(_) => {
                    self.finish()?;
                    return Ok(None);
                },
                Event::Eof => {
                    return Err(PartitionerError::PrematureEndOfData(
                        "XML document ends before the root element is closed".to_string(),
                    ))
                },
                _ => {},
            }
        };

        let Some(prolog) = &self.prolog else {
            return Ok(None);
        };
        let bytes = render(prolog, &record)?;
        let xml = self.charset.decode(&bytes)?;

        let result = DataPartitionerResult::new(
            ChunkItem::successful(xml, ChunkItemType::GenericXml),
            None,
            self.position,
        );
        self.position += 1;
        Ok(Some(result))
    }
}

fn utf8_declaration() -> Event<'static> {
    Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None))
}

fn render(prolog: &Prolog, record: &[Event<'static>]) -> PartitionResult<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    for event in prolog.events.iter().chain(record) {
        writer.write_event(event).map_err(xml_write_error)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(prolog.root_name.as_str())))
        .map_err(xml_write_error)?;
    Ok(writer.into_inner())
}

fn xml_error(e: quick_xml::Error) -> PartitionerError {
    match e {
        quick_xml::Error::Io(e) => PartitionerError::PrematureEndOfData(e.to_string()),
        quick_xml::Error::UnexpectedEof(what) => {
            PartitionerError::PrematureEndOfData(format!("XML ends inside {what}"))
        },
        other => PartitionerError::InvalidData(format!("Malformed XML: {other}")),
    }
}

fn xml_write_error(e: impl Display) -> PartitionerError {
    PartitionerError::InvalidData(format!("Unable to write XML document: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const DECL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

    fn documents(partitioner: &mut XmlDataPartitioner<impl Read + std::fmt::Debug>) -> Vec<String> {
        partitioner
            .results()
            .map(|r| r.unwrap().chunk_item.unwrap().data_as_string())
            .collect()
    }

    #[test]
    fn test_each_child_becomes_a_document() {
        let input = r#"<?xml version="1.0" encoding="UTF-8"?><records xmlns="urn:x"><a>1</a><b/><c><d>2</d></c></records>"#;
        let mut partitioner = XmlDataPartitioner::new(Cursor::new(input), "utf-8").unwrap();
        assert_eq!(
            documents(&mut partitioner),
            vec![
                format!(r#"{DECL}<records xmlns="urn:x"><a>1</a></records>"#),
                format!(r#"{DECL}<records xmlns="urn:x"><b/></records>"#),
                format!(r#"{DECL}<records xmlns="urn:x"><c><d>2</d></c></records>"#),
            ]
        );
        assert_eq!(partitioner.bytes_read(), input.len() as u64);
    }

    #[test]
    fn test_results_are_generic_xml_without_record_info() {
        let mut partitioner = XmlDataPartitioner::new(Cursor::new("<r><a/></r>"), "utf-8").unwrap();
        let result = partitioner.next_result().unwrap().unwrap();
        assert_eq!(result.position, 0);
        assert!(result.record_info.is_none());
        assert_eq!(result.chunk_item.unwrap().types, vec![ChunkItemType::GenericXml]);
        assert!(partitioner.next_result().unwrap().is_none());
    }

    #[test]
    fn test_whitespace_between_children_is_dropped() {
        let input = "<r>\n  <a> 1 </a>\n  <!-- note -->\n</r>\n";
        let mut partitioner = XmlDataPartitioner::new(Cursor::new(input), "utf-8").unwrap();
        assert_eq!(documents(&mut partitioner), vec![format!("{DECL}<r><a> 1 </a></r>")]);
        assert_eq!(partitioner.bytes_read(), input.len() as u64);
    }

    #[test]
    fn test_processing_instructions_are_kept() {
        let input = r#"<?xml version="1.0"?><?xml-stylesheet href="s.xsl"?><r><a/></r>"#;
        let mut partitioner = XmlDataPartitioner::new(Cursor::new(input), "utf-8").unwrap();
        assert_eq!(
            documents(&mut partitioner),
            vec![format!(r#"{DECL}<?xml-stylesheet href="s.xsl"?><r><a/></r>"#)]
        );
    }

    #[test]
    fn test_latin1_document_is_transcoded() {
        let mut input = br#"<?xml version="1.0" encoding="ISO-8859-1"?><r><a>"#.to_vec();
        input.push(0xF8);
        input.extend_from_slice(b"</a></r>");
        let mut partitioner = XmlDataPartitioner::new(Cursor::new(input), "latin1").unwrap();
        assert_eq!(documents(&mut partitioner), vec![format!("{DECL}<r><a>ø</a></r>")]);
    }

    #[test]
    fn test_encoding_mismatch() {
        let input = r#"<?xml version="1.0" encoding="ISO-8859-1"?><r><a/></r>"#;
        let mut partitioner = XmlDataPartitioner::new(Cursor::new(input), "utf-8").unwrap();
        assert!(matches!(
            partitioner.next_result(),
            Err(PartitionerError::InvalidEncoding(_))
        ));

        let mut undeclared = XmlDataPartitioner::new(Cursor::new("<r><a/></r>"), "latin1").unwrap();
        assert!(matches!(
            undeclared.next_result(),
            Err(PartitionerError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn test_truncated_document() {
        let mut partitioner =
            XmlDataPartitioner::new(Cursor::new("<r><a>1</a><b>2"), "utf-8").unwrap();
        assert!(partitioner.next_result().unwrap().is_some());
        assert!(matches!(
            partitioner.next_result(),
            Err(PartitionerError::PrematureEndOfData(_))
        ));
    }

    #[test]
    fn test_mismatched_tags_are_invalid() {
        let mut partitioner = XmlDataPartitioner::new(Cursor::new("<r><a>1</b></r>"), "utf-8").unwrap();
        assert!(matches!(
            partitioner.next_result(),
            Err(PartitionerError::InvalidData(_))
        ));
    }

    #[test]
    fn test_empty_input_and_empty_root() {
        let mut empty = XmlDataPartitioner::new(Cursor::new(""), "utf-8").unwrap();
        assert!(empty.next_result().unwrap().is_none());
        let mut childless = XmlDataPartitioner::new(Cursor::new("<r/>"), "utf-8").unwrap();
        assert!(childless.next_result().unwrap().is_none());
    }

    #[test]
    fn test_bounded_reads_only_its_share() {
        let first = "<r><a/><b/></r>";
        let input = format!("{first}<ignored><c/></ignored>");
        let mut partitioner =
            XmlDataPartitioner::bounded(Cursor::new(input), "utf-8", first.len() as u64, 5).unwrap();
        let positions: Vec<_> = partitioner
            .results()
            .map(|r| r.unwrap().position)
            .collect();
        assert_eq!(positions, vec![5, 6]);
        assert_eq!(partitioner.bytes_read(), first.len() as u64);
        assert_eq!(partitioner.into_inner().into_inner().position(), first.len() as u64);
    }
}
