//! XML partitioning of tar and zip archives.
//!
//! An archive partitioner is a partitioner of partitioners: entries are
//! walked in stream order and each regular file is handed to a bounded
//! [`XmlDataPartitioner`] numbering its results from the running position.
//! The archive is never seeked, so zip entries must carry their sizes in the
//! local file header.

use super::{DataPartitioner, DataPartitionerResult, XmlDataPartitioner};
use crate::counting::CountingReader;
use crate::encoding::Charset;
use crate::error::{PartitionResult, PartitionerError};
use flate2::read::DeflateDecoder;
use log::debug;
use std::io::{self, Read, Take};

const TAR_BLOCK_LEN: usize = 512;

const ZIP_LOCAL_HEADER: u32 = 0x0403_4b50;
const ZIP_CENTRAL_HEADER: u32 = 0x0201_4b50;
const ZIP_END_OF_CENTRAL_DIR: u32 = 0x0605_4b50;
/// Local file header length without the signature.
const ZIP_LOCAL_HEADER_REST: usize = 26;

/// How an entry's bytes are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Uncompressed
    Stored,
    /// Raw deflate
    Deflated,
}

/// Header of one archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Entry path as stored in the archive
    pub name: String,
    /// Bytes of entry data following the header
    pub size: u64,
    /// Storage method of the data
    pub compression: Compression,
    /// Regular file (as opposed to directory, link or metadata record)
    pub is_file: bool,
}

/// Entry framing of an archive format.
pub trait ArchiveFormat: std::fmt::Debug + Default {
    /// Read the next entry header. `None` at the end of the archive.
    ///
    /// # Errors
    ///
    /// Returns an error for truncated or malformed headers.
    fn next_entry<R: Read>(&mut self, source: &mut R) -> PartitionResult<Option<ArchiveEntry>>;

    /// Consume whatever follows the entry data.
    ///
    /// # Errors
    ///
    /// Returns an error if the trailer is truncated.
    fn end_entry<R: Read>(&mut self, _source: &mut R, _entry: &ArchiveEntry) -> PartitionResult<()> {
        Ok(())
    }
}

/// POSIX tar framing: 512 byte headers, data padded to the block size.
#[derive(Debug, Default)]
pub struct Tar;

impl ArchiveFormat for Tar {
    fn next_entry<R: Read>(&mut self, source: &mut R) -> PartitionResult<Option<ArchiveEntry>> {
        let mut header = [0u8; TAR_BLOCK_LEN];
        if !read_exact_or_eof(source, &mut header)? {
            return Ok(None);
        }
        if header.iter().all(|&b| b == 0) {
            // End of archive marker; a second zero block may follow.
            if !read_exact_or_eof(source, &mut header)? || header.iter().all(|&b| b == 0) {
                return Ok(None);
            }
        }

        let size = parse_octal(&header[124..136])
            .ok_or_else(|| PartitionerError::InvalidData("Invalid tar entry size".to_string()))?;
        let typeflag = header[156];
        Ok(Some(ArchiveEntry {
            name: String::from_utf8_lossy(cstr(&header[0..100])).into_owned(),
            size,
            compression: Compression::Stored,
            is_file: typeflag == 0 || typeflag == b'0',
        }))
    }

    fn end_entry<R: Read>(&mut self, source: &mut R, entry: &ArchiveEntry) -> PartitionResult<()> {
        skip_exact(source, tar_padding(entry.size))
    }
}

/// Zip framing read through local file headers only.
#[derive(Debug, Default)]
pub struct Zip;

impl ArchiveFormat for Zip {
    fn next_entry<R: Read>(&mut self, source: &mut R) -> PartitionResult<Option<ArchiveEntry>> {
        let mut signature = [0u8; 4];
        if !read_exact_or_eof(source, &mut signature)? {
            return Ok(None);
        }
        match u32::from_le_bytes(signature) {
            ZIP_LOCAL_HEADER => {},
            ZIP_CENTRAL_HEADER | ZIP_END_OF_CENTRAL_DIR => return Ok(None),
            other => {
                return Err(PartitionerError::InvalidData(format!(
                    "Unexpected zip signature {other:#010x}"
                )))
            },
        }

        let mut header = [0u8; ZIP_LOCAL_HEADER_REST];
        read_exact(source, &mut header)?;
        let flags = le_u16(&header[2..4]);
        let method = le_u16(&header[4..6]);
        let size = u64::from(le_u32(&header[14..18]));
        let name_len = usize::from(le_u16(&header[22..24]));
        let extra_len = u64::from(le_u16(&header[24..26]));

        let mut name = vec![0u8; name_len];
        read_exact(source, &mut name)?;
        skip_exact(source, extra_len)?;
        let name = String::from_utf8_lossy(&name).into_owned();

        if flags & 0x0001 != 0 {
            return Err(PartitionerError::InvalidData(format!(
                "Zip entry '{name}' is encrypted"
            )));
        }
        if flags & 0x0008 != 0 {
            return Err(PartitionerError::InvalidData(format!(
                "Zip entry '{name}' has no size in its local header"
            )));
        }
        let compression = match method {
            0 => Compression::Stored,
            8 => Compression::Deflated,
            other => {
                return Err(PartitionerError::InvalidData(format!(
                    "Zip entry '{name}' uses unsupported compression method {other}"
                )))
            },
        };

        Ok(Some(ArchiveEntry {
            is_file: !name.ends_with('/'),
            name,
            size,
            compression,
        }))
    }
}

/// Decompressing reader over the data of one entry.
pub enum EntryReader<R: Read> {
    /// Stored entry
    Stored(Take<R>),
    /// Deflated entry
    Deflated(DeflateDecoder<Take<R>>),
}

impl<R: Read> EntryReader<R> {
    fn new(data: Take<R>, compression: Compression) -> Self {
        match compression {
            Compression::Stored => EntryReader::Stored(data),
            Compression::Deflated => EntryReader::Deflated(DeflateDecoder::new(data)),
        }
    }

    /// The raw, still compressed, entry data.
    pub fn get_ref(&self) -> &Take<R> {
        match self {
            EntryReader::Stored(data) => data,
            EntryReader::Deflated(decoder) => decoder.get_ref(),
        }
    }

    fn into_data(self) -> Take<R> {
        match self {
            EntryReader::Stored(data) => data,
            EntryReader::Deflated(decoder) => decoder.into_inner(),
        }
    }
}

impl<R: Read> Read for EntryReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            EntryReader::Stored(data) => data.read(buf),
            EntryReader::Deflated(decoder) => decoder.read(buf),
        }
    }
}

impl<R: Read> std::fmt::Debug for EntryReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (method, remaining) = match self {
            EntryReader::Stored(data) => ("Stored", data.limit()),
            EntryReader::Deflated(decoder) => ("Deflated", decoder.get_ref().limit()),
        };
        f.debug_struct("EntryReader")
            .field("method", &method)
            .field("remaining", &remaining)
            .finish()
    }
}

type EntryPartitioner<R> = XmlDataPartitioner<EntryReader<CountingReader<R>>>;

/// Partitioner splitting every XML file of an archive.
#[derive(Debug)]
pub struct ArchiveXmlDataPartitioner<R: Read, F: ArchiveFormat> {
    format: F,
    encoding: String,
    source: Option<CountingReader<R>>,
    current: Option<(ArchiveEntry, EntryPartitioner<R>)>,
    bytes_read: u64,
    position: u64,
}

/// XML files in a tar archive.
pub type TarredXmlDataPartitioner<R> = ArchiveXmlDataPartitioner<R, Tar>;

/// XML files in a zip archive.
pub type ZippedXmlDataPartitioner<R> = ArchiveXmlDataPartitioner<R, Zip>;

impl<R: Read + std::fmt::Debug, F: ArchiveFormat> ArchiveXmlDataPartitioner<R, F> {
    /// Partitioner for an archive of XML documents in `encoding`.
    ///
    /// # Errors
    ///
    /// Returns [`PartitionerError::InvalidEncoding`] for an unknown encoding.
    pub fn new(input: R, encoding: &str) -> PartitionResult<Self> {
        Charset::for_name(encoding)?;
        Ok(ArchiveXmlDataPartitioner {
            format: F::default(),
            encoding: encoding.to_string(),
            source: Some(CountingReader::new(input)),
            current: None,
            bytes_read: 0,
            position: 0,
        })
    }

    /// Position the source at the next regular file. Returns `false` at the
    /// end of the archive.
    fn open_next_entry(&mut self) -> PartitionResult<bool> {
        let mut source = self.source.take().ok_or_else(|| {
            PartitionerError::InvalidData("Archive source lost after a failed entry".to_string())
        })?;

        loop {
            let Some(entry) = self.format.next_entry(&mut source)? else {
                self.bytes_read = source.bytes_read();
                self.source = Some(source);
                return Ok(false);
            };
            if !entry.is_file {
                debug!("Skipping archive entry '{}'", entry.name);
                skip_exact(&mut source, entry.size)?;
                self.format.end_entry(&mut source, &entry)?;
                continue;
            }

            debug!("Partitioning archive entry '{}' from position {}", entry.name, self.position);
            let data = EntryReader::new(source.take(entry.size), entry.compression);
            let partitioner = XmlDataPartitioner::starting_at(data, &self.encoding, self.position)?;
            self.current = Some((entry, partitioner));
            return Ok(true);
        }
    }

    fn close_entry(&mut self) -> PartitionResult<()> {
        let Some((entry, partitioner)) = self.current.take() else {
            return Ok(());
        };
        let mut data = partitioner.into_inner().into_data();
        io::copy(&mut data, &mut io::sink())?;
        if data.limit() > 0 {
            return Err(PartitionerError::PrematureEndOfData(format!(
                "Archive ends inside entry '{}'",
                entry.name
            )));
        }
        let mut source = data.into_inner();
        self.format.end_entry(&mut source, &entry)?;
        self.bytes_read = source.bytes_read();
        self.source = Some(source);
        Ok(())
    }
}

impl<R: Read + std::fmt::Debug, F: ArchiveFormat> DataPartitioner for ArchiveXmlDataPartitioner<R, F> {
    fn encoding(&self) -> Charset {
        Charset::Utf8
    }

    fn bytes_read(&self) -> u64 {
        match &self.current {
            Some((_, partitioner)) => partitioner.get_ref().get_ref().get_ref().bytes_read(),
            None => self.bytes_read,
        }
    }

    fn next_result(&mut self) -> PartitionResult<Option<DataPartitionerResult>> {
        loop {
            let Some((_, partitioner)) = self.current.as_mut() else {
                if !self.open_next_entry()? {
                    return Ok(None);
                }
                continue;
            };
            if let Some(result) = partitioner.next_result()? {
                self.position = result.position + 1;
                return Ok(Some(result));
            }
            self.close_entry()?;
        }
    }
}

fn read_exact_or_eof<R: Read>(source: &mut R, buf: &mut [u8]) -> PartitionResult<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(PartitionerError::PrematureEndOfData(
                    "Archive ends inside a header".to_string(),
                ))
            },
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}

fn read_exact<R: Read>(source: &mut R, buf: &mut [u8]) -> PartitionResult<()> {
    if read_exact_or_eof(source, buf)? || buf.is_empty() {
        Ok(())
    } else {
        Err(PartitionerError::PrematureEndOfData(
            "Archive ends inside a header".to_string(),
        ))
    }
}

fn skip_exact<R: Read>(source: &mut R, n: u64) -> PartitionResult<()> {
    let skipped = io::copy(&mut source.take(n), &mut io::sink())?;
    if skipped < n {
        return Err(PartitionerError::PrematureEndOfData(format!(
            "Archive ends {} bytes early",
            n - skipped
        )));
    }
    Ok(())
}

fn tar_padding(size: u64) -> u64 {
    let block = TAR_BLOCK_LEN as u64;
    (block - size % block) % block
}

fn cstr(field: &[u8]) -> &[u8] {
    memchr::memchr(0, field).map_or(field, |end| &field[..end])
}

/// NUL/space padded octal number.
fn parse_octal(field: &[u8]) -> Option<u64> {
    let digits = cstr(field);
    let digits = std::str::from_utf8(digits).ok()?.trim();
    if digits.is_empty() {
        return Some(0);
    }
    u64::from_str_radix(digits, 8).ok()
}

fn le_u16(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::DeflateEncoder;
    use flate2::Compression as Level;
    use std::io::{Cursor, Write};

    fn tar_header(name: &str, size: usize, typeflag: u8) -> [u8; TAR_BLOCK_LEN] {
        let mut header = [0u8; TAR_BLOCK_LEN];
        header[..name.len()].copy_from_slice(name.as_bytes());
        header[100..108].copy_from_slice(b"0000644\0");
        header[124..136].copy_from_slice(format!("{size:011o}\0").as_bytes());
        header[156] = typeflag;
        header[257..263].copy_from_slice(b"ustar\0");
        header
    }

    fn tar(entries: &[(&str, &str, u8)]) -> Vec<u8> {
        let mut archive = Vec::new();
        for (name, content, typeflag) in entries {
            archive.extend_from_slice(&tar_header(name, content.len(), *typeflag));
            archive.extend_from_slice(content.as_bytes());
            archive.resize(archive.len() + tar_padding(content.len() as u64) as usize, 0);
        }
        archive.extend_from_slice(&[0u8; 2 * TAR_BLOCK_LEN]);
        archive
    }

    fn zip_entry(archive: &mut Vec<u8>, name: &str, content: &str, deflate: bool) {
        let data = if deflate {
            let mut encoder = DeflateEncoder::new(Vec::new(), Level::default());
            encoder.write_all(content.as_bytes()).unwrap();
            encoder.finish().unwrap()
        } else {
            content.as_bytes().to_vec()
        };
        archive.extend_from_slice(&ZIP_LOCAL_HEADER.to_le_bytes());
        archive.extend_from_slice(&20u16.to_le_bytes());
        archive.extend_from_slice(&0u16.to_le_bytes());
        archive.extend_from_slice(&(if deflate { 8u16 } else { 0u16 }).to_le_bytes());
        archive.extend_from_slice(&[0u8; 8]);
        archive.extend_from_slice(&(data.len() as u32).to_le_bytes());
        archive.extend_from_slice(&(content.len() as u32).to_le_bytes());
        archive.extend_from_slice(&(name.len() as u16).to_le_bytes());
        archive.extend_from_slice(&0u16.to_le_bytes());
        archive.extend_from_slice(name.as_bytes());
        archive.extend_from_slice(&data);
    }

    fn payloads(partitioner: &mut impl DataPartitioner) -> Vec<(u64, String)> {
        let mut out = Vec::new();
        while let Some(result) = partitioner.next_result().unwrap() {
            out.push((result.position, result.chunk_item.unwrap().data_as_string()));
        }
        out
    }

    #[test]
    fn test_tar_entries_continue_positions() {
        let archive = tar(&[
            ("a.xml", "<r><x>1</x><x>2</x></r>", b'0'),
            ("dir/", "", b'5'),
            ("b.xml", "<r><x>3</x></r>\n", b'0'),
        ]);
        let mut partitioner = TarredXmlDataPartitioner::new(Cursor::new(archive.clone()), "utf-8").unwrap();
        let results = payloads(&mut partitioner);

        let positions: Vec<_> = results.iter().map(|(p, _)| *p).collect();
        assert_eq!(positions, vec![0, 1, 2]);
        assert!(results[2].1.ends_with("<r><x>3</x></r>"));
        assert_eq!(partitioner.bytes_read(), archive.len() as u64);
    }

    #[test]
    fn test_tar_truncated_entry() {
        let mut archive = tar(&[("a.xml", "<r><x>1</x></r>", b'0')]);
        archive.truncate(TAR_BLOCK_LEN + 5);
        let mut partitioner = TarredXmlDataPartitioner::new(Cursor::new(archive), "utf-8").unwrap();
        assert!(matches!(
            partitioner.next_result(),
            Err(PartitionerError::PrematureEndOfData(_))
        ));
    }

    #[test]
    fn test_empty_tar() {
        let mut partitioner = TarredXmlDataPartitioner::new(Cursor::new(Vec::new()), "utf-8").unwrap();
        assert!(partitioner.next_result().unwrap().is_none());
    }

    #[test]
    fn test_zip_stored_and_deflated_entries() {
        let mut archive = Vec::new();
        zip_entry(&mut archive, "a.xml", "<r><x>1</x></r>", false);
        zip_entry(&mut archive, "sub/", "", false);
        zip_entry(&mut archive, "b.xml", "<r><x>2</x><x>3</x></r>", true);
        archive.extend_from_slice(&ZIP_CENTRAL_HEADER.to_le_bytes());
        archive.extend_from_slice(&[0u8; 42]);

        let mut partitioner = ZippedXmlDataPartitioner::new(Cursor::new(archive), "utf-8").unwrap();
        let results = payloads(&mut partitioner);
        assert_eq!(
            results,
            vec![
                (0, r#"<?xml version="1.0" encoding="UTF-8"?><r><x>1</x></r>"#.to_string()),
                (1, r#"<?xml version="1.0" encoding="UTF-8"?><r><x>2</x></r>"#.to_string()),
                (2, r#"<?xml version="1.0" encoding="UTF-8"?><r><x>3</x></r>"#.to_string()),
            ]
        );
    }

    #[test]
    fn test_zip_unknown_signature() {
        let mut partitioner =
            ZippedXmlDataPartitioner::new(Cursor::new(b"not a zip".to_vec()), "utf-8").unwrap();
        assert!(matches!(
            partitioner.next_result(),
            Err(PartitionerError::InvalidData(_))
        ));
    }

    #[test]
    fn test_tar_helpers() {
        assert_eq!(parse_octal(b"00000000010\0"), Some(8));
        assert_eq!(parse_octal(b"        \0"), Some(0));
        assert_eq!(tar_padding(0), 0);
        assert_eq!(tar_padding(1), 511);
        assert_eq!(tar_padding(512), 0);
    }
}
