//! Zip packaging of composed images.

use std::io::{self, Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::config::Compression;
use crate::error::{ExportError, ExportResult};

/// In-memory zip writer. Entries keep their insertion order.
pub struct ZipArchiveBuilder {
    writer: ZipWriter<Cursor<Vec<u8>>>,
    method: CompressionMethod,
    names: Vec<String>,
}

impl ZipArchiveBuilder {
    pub fn new(compression: Compression) -> Self {
        let method = match compression {
            Compression::Deflate => CompressionMethod::Deflated,
            Compression::Stored => CompressionMethod::Stored,
        };
        Self {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
            method,
            names: vec![],
        }
    }

    pub fn insert(&mut self, name: &str, bytes: &[u8]) -> ExportResult<()> {
        let options = SimpleFileOptions::default()
            .compression_method(self.method)
            .unix_permissions(0o644);
        self.writer
            .start_file(name, options)
            .map_err(|e| ExportError::BlobEncoding(format!("archive entry {}: {}", name, e)))?;
        self.writer.write_all(bytes)?;
        self.names.push(name.to_string());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn entry_names(&self) -> &[String] {
        &self.names
    }

    /// Writes the central directory and returns the archive bytes.
    pub fn finish(mut self) -> ExportResult<Vec<u8>> {
        let bytes = self
            .writer
            .finish()
            .map_err(|e| ExportError::BlobEncoding(format!("archive: {}", e)))?
            .into_inner();
        if bytes.is_empty() {
            return Err(ExportError::BlobEncoding("archive is empty".to_string()));
        }
        Ok(bytes)
    }
}

fn open(bytes: &[u8]) -> ExportResult<ZipArchive<Cursor<&[u8]>>> {
    ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ExportError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
}

/// Entry names in archive order.
pub fn read_entry_names(bytes: &[u8]) -> ExportResult<Vec<String>> {
    let mut archive = open(bytes)?;
    let mut names = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .map_err(|e| ExportError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        names.push(entry.name().to_string());
    }
    Ok(names)
}

pub fn read_entry(bytes: &[u8], name: &str) -> ExportResult<Vec<u8>> {
    let mut archive = open(bytes)?;
    let mut entry = archive
        .by_name(name)
        .map_err(|e| ExportError::Io(io::Error::new(io::ErrorKind::NotFound, e)))?;
    // The declared size comes from the archive itself and is not trusted.
    let mut data = Vec::new();
    entry.read_to_end(&mut data)?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_keep_insertion_order() {
        let mut builder = ZipArchiveBuilder::new(Compression::Deflate);
        builder.insert("02_b.png", b"second").unwrap();
        builder.insert("01_a.png", b"first").unwrap();
        builder.insert("03_c.png", b"third").unwrap();
        assert_eq!(builder.len(), 3);

        let bytes = builder.finish().unwrap();
        assert_eq!(
            read_entry_names(&bytes).unwrap(),
            vec!["02_b.png", "01_a.png", "03_c.png"]
        );
        assert_eq!(read_entry(&bytes, "01_a.png").unwrap(), b"first");
    }

    #[test]
    fn test_stored_entries_are_readable() {
        let mut builder = ZipArchiveBuilder::new(Compression::Stored);
        builder.insert("01_x.png", &[0u8; 64]).unwrap();
        let bytes = builder.finish().unwrap();
        assert_eq!(read_entry(&bytes, "01_x.png").unwrap().len(), 64);
    }

    #[test]
    fn test_empty_archive_still_serializes() {
        let builder = ZipArchiveBuilder::new(Compression::Deflate);
        assert!(builder.is_empty());
        let bytes = builder.finish().unwrap();
        assert!(read_entry_names(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_declared_size_does_not_drive_allocation() {
        let mut builder = ZipArchiveBuilder::new(Compression::Stored);
        builder.insert("01_x.png", &[7u8; 64]).unwrap();
        let mut bytes = builder.finish().unwrap();

        // claim ~4 GiB uncompressed in both the local and central headers
        let huge = 0xFFFF_FFF0u32.to_le_bytes();
        for (signature, offset) in [(*b"PK\x03\x04", 22), (*b"PK\x01\x02", 24)] {
            let at = bytes.windows(4).position(|w| w == signature).unwrap();
            bytes[at + offset..at + offset + 4].copy_from_slice(&huge);
        }

        if let Ok(data) = read_entry(&bytes, "01_x.png") {
            assert_eq!(data, vec![7u8; 64]);
        }
    }

    #[test]
    fn test_missing_entry_and_garbage_input() {
        let bytes = ZipArchiveBuilder::new(Compression::Deflate).finish().unwrap();
        assert!(read_entry(&bytes, "nope.png").is_err());
        assert!(read_entry_names(b"definitely not a zip").is_err());
    }
}
