//! In-memory zip assembly for the archive delivery mode.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Failed to add {filename} to archive: {message}")]
    Entry { filename: String, message: String },
    #[error("Failed to finalize archive: {0}")]
    Finalize(String),
}

/// Accepts (filename, bytes) pairs and produces a single zip blob.
pub struct ArchiveBuilder {
    writer: ZipWriter<Cursor<Vec<u8>>>,
    entries: usize,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
            entries: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub fn add_file(&mut self, filename: &str, data: &[u8]) -> Result<(), ArchiveError> {
        let entry_error = |e: String| ArchiveError::Entry {
            filename: filename.to_string(),
            message: e,
        };

        self.writer
            .start_file(filename, SimpleFileOptions::default())
            .map_err(|e| entry_error(e.to_string()))?;
        self.writer
            .write_all(data)
            .map_err(|e| entry_error(e.to_string()))?;
        self.entries += 1;
        Ok(())
    }

    /// Close the archive and return the combined bytes.
    pub fn finish(self) -> Result<Vec<u8>, ArchiveError> {
        let cursor = self
            .writer
            .finish()
            .map_err(|e| ArchiveError::Finalize(e.to_string()))?;
        Ok(cursor.into_inner())
    }
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}
