//! JSON array writer for exports
//!
//! Writes a top-level JSON array incrementally, one document per line:
//!
//! ```text
//! [
//! {"id":"a"},
//! {"id":"b"}
//! ]
//! ```
//!
//! The caller decides whether a separator follows each document, so the
//! writer never needs to buffer more than the document being written.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::document::Document;
use crate::error::{ConfigError, Result};

const SEPARATOR: &[u8] = b",\n";

/// Incremental writer for a JSON array file.
pub struct JsonArrayWriter {
    /// Buffered file writer
    writer: BufWriter<File>,
    /// Path to the output file
    path: PathBuf,
    /// Number of documents written
    written: u64,
    /// Reused serialization buffer
    scratch: Vec<u8>,
}

impl JsonArrayWriter {
    /// Create the output file and open the array.
    ///
    /// # Arguments
    /// * `path` - Output file path; its parent directory must exist
    pub async fn create(path: &Path) -> Result<Self> {
        validate_path(path)?;
        let file = File::create(path).await?;
        let mut writer = BufWriter::with_capacity(1024 * 1024, file);
        writer.write_all(b"[\n").await?;

        debug!("Created JSON array writer for: {}", path.display());

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            written: 0,
            scratch: Vec::with_capacity(4096),
        })
    }

    /// Append one document, followed by `,\n` when `more_follow` is set.
    pub async fn write_document(&mut self, doc: &Document, more_follow: bool) -> Result<()> {
        self.scratch.clear();
        serde_json::to_writer(&mut self.scratch, doc)?;
        self.writer.write_all(&self.scratch).await?;
        if more_follow {
            self.writer.write_all(SEPARATOR).await?;
        }
        self.written += 1;
        Ok(())
    }

    /// Push buffered output to the file.
    pub async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await?;
        Ok(())
    }

    /// Close the array and return the final file size in bytes.
    pub async fn finish(mut self) -> Result<u64> {
        self.writer.write_all(b"\n]\n").await?;
        self.writer.flush().await?;

        let size = tokio::fs::metadata(&self.path).await?.len();
        debug!(
            "Finalized JSON array file: {} ({} documents)",
            self.path.display(),
            self.written
        );
        Ok(size)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

/// Check that the parent directory of `path` exists.
fn validate_path(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        return Err(ConfigError::FileNotFound(format!(
            "directory does not exist: {}",
            parent.display()
        ))
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        Document::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_writes_one_document_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");

        let mut writer = JsonArrayWriter::create(&path).await.unwrap();
        writer.write_document(&doc(json!({"id": "a"})), true).await.unwrap();
        writer.write_document(&doc(json!({"id": "b", "n": 1})), false).await.unwrap();
        assert_eq!(writer.written(), 2);
        let size = writer.finish().await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, "[\n{\"id\":\"a\"},\n{\"id\":\"b\",\"n\":1}\n]\n");
        assert_eq!(size, content.len() as u64);

        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_array_is_valid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");

        let writer = JsonArrayWriter::create(&path).await.unwrap();
        writer.finish().await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert!(parsed.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_directory() {
        let result = JsonArrayWriter::create(Path::new("/nonexistent/directory/out.json")).await;
        assert!(result.is_err());
    }
}
