//! Archive handling for OOXML packages
//!
//! DOCX, XLSX and PPTX files are ZIP archives containing XML parts and
//! resources. Entries are kept in their original order together with their
//! compression method, so a rewritten package lists its parts exactly as the
//! input did.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use zip::read::ZipArchive;
use zip::write::{SimpleFileOptions, ZipWriter};
use zip::CompressionMethod;

use crate::error::{OoxmlError, Result};

/// Signature of an OLE compound file, used for encrypted OOXML packages
const OLE_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// A single archive entry
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Path inside the archive
    pub name: String,
    /// Uncompressed contents
    pub data: Vec<u8>,
    /// Compression used by the source archive
    pub compression: CompressionMethod,
}

impl ArchiveEntry {
    /// Whether the entry is a directory marker
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }
}

/// Represents an unpacked OOXML package
#[derive(Debug, Default, Clone)]
pub struct OoxmlArchive {
    /// Entries in archive order
    entries: Vec<ArchiveEntry>,
    /// Entry position by path
    index: HashMap<String, usize>,
}

impl OoxmlArchive {
    /// Open and unpack a package file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    /// Unpack a package held in memory
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_reader(Cursor::new(bytes))
    }

    /// Create from any reader that implements Read + Seek
    pub fn from_reader<R: Read + Seek>(mut reader: R) -> Result<Self> {
        let mut signature = [0u8; 8];
        let read = read_prefix(&mut reader, &mut signature)?;
        if read == OLE_SIGNATURE.len() && signature == OLE_SIGNATURE {
            return Err(OoxmlError::EncryptedPackage);
        }
        reader.seek(SeekFrom::Start(0))?;

        let mut archive = ZipArchive::new(reader)?;
        let mut result = Self::default();

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            let name = file.name().to_string();
            let compression = file.compression();

            let mut data = Vec::new();
            file.read_to_end(&mut data)?;
            result.push(ArchiveEntry {
                name,
                data,
                compression,
            });
        }

        Ok(result)
    }

    fn push(&mut self, entry: ArchiveEntry) {
        self.index.insert(entry.name.clone(), self.entries.len());
        self.entries.push(entry);
    }

    /// Get a file's contents by path
    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.index
            .get(path)
            .map(|&i| self.entries[i].data.as_slice())
    }

    /// Get a file's contents as a string
    pub fn get_string(&self, path: &str) -> Result<Option<String>> {
        match self.get(path) {
            Some(bytes) => {
                let s = String::from_utf8_lossy(bytes).into_owned();
                Ok(Some(s))
            }
            None => Ok(None),
        }
    }

    /// Get a required file's contents
    pub fn require(&self, path: &str) -> Result<&[u8]> {
        self.get(path)
            .ok_or_else(|| OoxmlError::MissingFile(path.to_string()))
    }

    /// Check if a file exists in the archive
    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    /// List all file paths in archive order, directories excluded
    pub fn file_list(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|e| !e.is_dir())
            .map(|e| e.name.as_str())
    }

    /// All entries in archive order
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// Set or update a file's contents
    ///
    /// Existing entries keep their position and compression; new entries
    /// are appended and deflated.
    pub fn set(&mut self, path: impl Into<String>, contents: Vec<u8>) {
        let path = path.into();
        match self.index.get(&path) {
            Some(&i) => self.entries[i].data = contents,
            None => self.push(ArchiveEntry {
                name: path,
                data: contents,
                compression: CompressionMethod::Deflated,
            }),
        }
    }

    /// Set a file's contents from a string
    pub fn set_string(&mut self, path: impl Into<String>, contents: impl Into<String>) {
        self.set(path, contents.into().into_bytes());
    }

    /// Write the archive to a file
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        self.write_to(file)
    }

    /// Write the archive to a byte vector
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        self.write_to(&mut buffer)?;
        Ok(buffer.into_inner())
    }

    /// Write the archive to any writer, in original entry order
    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<()> {
        let mut zip = ZipWriter::new(writer);

        for entry in &self.entries {
            let options = SimpleFileOptions::default()
                .compression_method(writable_compression(entry.compression));
            if entry.is_dir() {
                zip.add_directory(entry.name.as_str(), options)?;
                continue;
            }
            zip.start_file(entry.name.as_str(), options)?;
            zip.write_all(&entry.data)?;
        }

        zip.finish()?;
        Ok(())
    }
}

/// Compression methods the writer reproduces; anything exotic is deflated
fn writable_compression(method: CompressionMethod) -> CompressionMethod {
    match method {
        CompressionMethod::Stored => CompressionMethod::Stored,
        _ => CompressionMethod::Deflated,
    }
}

fn read_prefix<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_operations() {
        let mut archive = OoxmlArchive::default();

        archive.set_string("test.xml", "<root/>");
        assert!(archive.contains("test.xml"));
        assert_eq!(
            archive.get_string("test.xml").unwrap(),
            Some("<root/>".to_string())
        );
        assert!(archive.require("missing.xml").is_err());
    }

    #[test]
    fn test_order_and_compression_preserved() {
        let mut archive = OoxmlArchive::default();
        archive.push(ArchiveEntry {
            name: "[Content_Types].xml".into(),
            data: b"<Types/>".to_vec(),
            compression: CompressionMethod::Stored,
        });
        archive.push(ArchiveEntry {
            name: "word/".into(),
            data: Vec::new(),
            compression: CompressionMethod::Stored,
        });
        archive.push(ArchiveEntry {
            name: "word/document.xml".into(),
            data: b"<w:document/>".to_vec(),
            compression: CompressionMethod::Deflated,
        });
        archive.push(ArchiveEntry {
            name: "docProps/app.xml".into(),
            data: b"<Properties/>".to_vec(),
            compression: CompressionMethod::Deflated,
        });

        let bytes = archive.to_bytes().unwrap();
        let restored = OoxmlArchive::from_bytes(&bytes).unwrap();

        let names: Vec<_> = restored.file_list().collect();
        assert_eq!(
            names,
            vec!["[Content_Types].xml", "word/document.xml", "docProps/app.xml"]
        );
        assert_eq!(restored.entries()[0].compression, CompressionMethod::Stored);
        assert_eq!(restored.entries()[2].compression, CompressionMethod::Deflated);
        assert_eq!(restored.get("word/document.xml"), Some(&b"<w:document/>"[..]));
    }

    #[test]
    fn test_set_keeps_position() {
        let mut archive = OoxmlArchive::default();
        archive.set_string("a.xml", "<a/>");
        archive.set_string("b.xml", "<b/>");
        archive.set_string("a.xml", "<a>changed</a>");

        let names: Vec<_> = archive.file_list().collect();
        assert_eq!(names, vec!["a.xml", "b.xml"]);
        assert_eq!(archive.get("a.xml"), Some(&b"<a>changed</a>"[..]));
    }

    #[test]
    fn test_encrypted_package_detected() {
        let mut bytes = OLE_SIGNATURE.to_vec();
        bytes.extend_from_slice(&[0u8; 512]);
        let err = OoxmlArchive::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, OoxmlError::EncryptedPackage));
    }

    #[test]
    fn test_not_a_zip() {
        let err = OoxmlArchive::from_bytes(b"plain text").unwrap_err();
        assert!(matches!(err, OoxmlError::Archive(_)));
    }
}
