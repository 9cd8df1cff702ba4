//! Patch archive container: an 8-byte magic followed by a zstd stream of
//! bincode records. Entries are written and read one at a time.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::PatchError;

pub const MAGIC: &[u8; 8] = b"FKPTCH01";

const COMPRESSION_LEVEL: i32 = 3;

#[derive(Debug, Serialize, Deserialize)]
enum Record {
    Entry { name: String, data: Vec<u8> },
    End,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub data: Vec<u8>,
}

pub struct ArchiveWriter<W: Write> {
    encoder: zstd::Encoder<'static, W>,
    names: HashSet<String>,
}

impl ArchiveWriter<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self, PatchError> {
        Self::new(BufWriter::new(File::create(path)?))
    }
}

impl<W: Write> ArchiveWriter<W> {
    pub fn new(mut inner: W) -> Result<Self, PatchError> {
        inner.write_all(MAGIC)?;
        Ok(Self {
            encoder: zstd::Encoder::new(inner, COMPRESSION_LEVEL)?,
            names: HashSet::new(),
        })
    }

    /// Append one entry. Names must be unique within the archive.
    pub fn add(&mut self, name: &str, data: &[u8]) -> Result<(), PatchError> {
        if !self.names.insert(name.to_string()) {
            return Err(PatchError::DuplicateEntry(name.to_string()));
        }
        log::trace!("archive: writing {name} ({} bytes)", data.len());
        write_record(
            &mut self.encoder,
            &Record::Entry {
                name: name.to_string(),
                data: data.to_vec(),
            },
        )
    }

    /// Write the end marker, finish the zstd frame and flush.
    pub fn finish(mut self) -> Result<W, PatchError> {
        write_record(&mut self.encoder, &Record::End)?;
        let mut inner = self.encoder.finish()?;
        inner.flush()?;
        Ok(inner)
    }
}

fn write_record<W: Write>(out: &mut W, record: &Record) -> Result<(), PatchError> {
    bincode::serialize_into(out, record)
        .map_err(|e| PatchError::invalid_archive(format!("failed to encode record: {e}")))
}

pub struct ArchiveReader<R: Read> {
    decoder: zstd::Decoder<'static, BufReader<R>>,
    names: HashSet<String>,
    done: bool,
}

impl ArchiveReader<File> {
    pub fn open(path: &Path) -> Result<Self, PatchError> {
        Self::new(File::open(path)?)
    }
}

impl<R: Read> ArchiveReader<R> {
    pub fn new(mut inner: R) -> Result<Self, PatchError> {
        let mut magic = [0u8; 8];
        inner
            .read_exact(&mut magic)
            .map_err(|_| PatchError::invalid_archive("missing magic header"))?;
        if &magic != MAGIC {
            return Err(PatchError::invalid_archive("missing magic header"));
        }
        Ok(Self {
            decoder: zstd::Decoder::new(inner)?,
            names: HashSet::new(),
            done: false,
        })
    }

    /// Read the next entry, or `None` once the end marker is reached.
    pub fn next_entry(&mut self) -> Result<Option<ArchiveEntry>, PatchError> {
        if self.done {
            return Ok(None);
        }
        let record: Record = bincode::deserialize_from(&mut self.decoder)
            .map_err(|e| PatchError::invalid_archive(format!("truncated or corrupt archive: {e}")))?;
        match record {
            Record::End => {
                self.done = true;
                Ok(None)
            }
            Record::Entry { name, data } => {
                if !self.names.insert(name.clone()) {
                    return Err(PatchError::DuplicateEntry(name));
                }
                log::trace!("archive: read {name} ({} bytes)", data.len());
                Ok(Some(ArchiveEntry { name, data }))
            }
        }
    }
}

impl<R: Read> Iterator for ArchiveReader<R> {
    type Item = Result<ArchiveEntry, PatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ArchiveWriter::new(Vec::new()).unwrap();
        for (name, data) in entries {
            writer.add(name, data).unwrap();
        }
        writer.finish().unwrap()
    }

    #[test]
    fn test_entries_preserve_order_and_bytes() {
        let bytes = build(&[("manifest", b"1"), ("new/a.bin", &[0, 13, 10, 255]), ("same/b", b"b")]);
        assert_eq!(&bytes[..8], MAGIC);

        let entries: Vec<_> = ArchiveReader::new(&bytes[..])
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["manifest", "new/a.bin", "same/b"]);
        assert_eq!(entries[1].data, vec![0, 13, 10, 255]);
    }

    #[test]
    fn test_duplicate_name_rejected_on_write() {
        let mut writer = ArchiveWriter::new(Vec::new()).unwrap();
        writer.add("new/a", b"x").unwrap();
        assert!(matches!(writer.add("new/a", b"y"), Err(PatchError::DuplicateEntry(_))));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = build(&[("manifest", b"1")]);
        bytes[0] = b'X';
        assert!(matches!(
            ArchiveReader::new(&bytes[..]),
            Err(PatchError::InvalidArchive(_))
        ));
        assert!(ArchiveReader::new(&b"FK"[..]).is_err());
    }

    #[test]
    fn test_truncated_archive_is_an_error() {
        let mut encoder = zstd::Encoder::new(Vec::new(), 3).unwrap();
        write_record(
            &mut encoder,
            &Record::Entry {
                name: "manifest".to_string(),
                data: b"1".to_vec(),
            },
        )
        .unwrap();
        let mut bytes = MAGIC.to_vec();
        bytes.extend(encoder.finish().unwrap());

        let mut reader = ArchiveReader::new(&bytes[..]).unwrap();
        assert!(reader.next_entry().unwrap().is_some());
        assert!(matches!(reader.next_entry(), Err(PatchError::InvalidArchive(_))));
    }
}
