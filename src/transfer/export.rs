//! Export stream
//!
//! Counts the matching documents, then writes every page of the filtered
//! query into a JSON array file:
//!
//! 1. Run the count query; on failure stop before any file is created
//! 2. Create the output file and open the array
//! 3. Write each page, flushing the file after every page
//! 4. Close the array and report the totals
//!
//! A failed page request leaves the partially written file on disk and
//! surfaces as [`TransferError::ExportIncomplete`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::error::{Result, ShuttleError, TransferError};
use crate::store::{DocumentContainer, TimeFilter};

use super::progress::ProgressTracker;
use super::writer::JsonArrayWriter;

/// Default number of documents requested per page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Name of the export file for a container at a given moment.
///
/// `cosmos-export-<database>-<container>-<yyyy-MM-ddTHH-mm-ss>.json`
pub fn export_file_name(database: &str, container: &str, at: DateTime<Local>) -> String {
    format!(
        "cosmos-export-{}-{}-{}.json",
        database,
        container,
        at.format("%Y-%m-%dT%H-%M-%S")
    )
}

/// Full path of a new export file in `directory`, stamped with the current time.
pub fn export_path(directory: &Path, database: &str, container: &str) -> PathBuf {
    directory.join(export_file_name(database, container, Local::now()))
}

/// Settings for one export run.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Time filter applied to both the count and the query
    pub filter: TimeFilter,
    /// Documents requested per page
    pub page_size: usize,
    /// File the array is written to
    pub output: PathBuf,
    /// Whether to draw a progress bar
    pub show_progress: bool,
}

impl ExportOptions {
    pub fn new(output: PathBuf) -> Self {
        Self {
            filter: TimeFilter::None,
            page_size: DEFAULT_PAGE_SIZE,
            output,
            show_progress: false,
        }
    }

    pub fn with_filter(mut self, filter: TimeFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }
}

/// Result of a completed export.
#[derive(Debug, Clone)]
pub struct ExportSummary {
    /// Documents written to the file
    pub documents_exported: u64,
    /// Documents the count query reported
    pub expected: u64,
    /// Output file
    pub path: PathBuf,
    /// Final file size in bytes
    pub file_size_bytes: u64,
    /// Wall time of the run
    pub elapsed: Duration,
}

/// Streams one container's documents to a JSON array file.
pub struct ExportStream {
    container: Arc<dyn DocumentContainer>,
    options: ExportOptions,
}

impl ExportStream {
    pub fn new(container: Arc<dyn DocumentContainer>, options: ExportOptions) -> Self {
        Self { container, options }
    }

    /// Run the export.
    ///
    /// # Returns
    /// * `Result<ExportSummary>` - Totals, or the reason the export stopped
    pub async fn execute(&self) -> Result<ExportSummary> {
        let start_time = Instant::now();
        let filter = &self.options.filter;
        let path = &self.options.output;

        info!("Counting documents in {}", self.container.label());
        let expected = self
            .container
            .count(filter)
            .await
            .map_err(|e| TransferError::CountFailed(e.to_string()))?;
        info!("Starting export of {} documents", expected);

        let mut writer = JsonArrayWriter::create(path).await?;
        let tracker = ProgressTracker::new(Some(expected), self.options.show_progress);

        let mut pages = match self.container.query(filter, self.options.page_size).await {
            Ok(pages) => pages,
            Err(e) => {
                writer.flush().await?;
                tracker.finish();
                return Err(incomplete(path, 0, e));
            }
        };

        let mut exported = 0u64;
        let mut page_count = 0u32;
        loop {
            let page = match pages.next_page().await {
                Ok(Some(page)) => page,
                Ok(None) => break,
                Err(e) => {
                    writer.flush().await?;
                    tracker.finish();
                    return Err(incomplete(path, exported, e));
                }
            };

            page_count += 1;
            let count = page.documents.len();
            debug!(
                "Writing page #{} ({} documents, more: {})",
                page_count, count, page.has_more
            );

            for (i, doc) in page.documents.iter().enumerate() {
                let more_follow = i + 1 < count || page.has_more;
                writer.write_document(doc, more_follow).await?;
            }
            writer.flush().await?;

            exported += count as u64;
            tracker.update(exported);

            if page_count % 10 == 0 {
                info!(
                    "Progress: {} documents exported ({} pages)",
                    exported, page_count
                );
            }
        }

        let file_size_bytes = writer.finish().await?;
        tracker.finish();

        if exported != expected {
            warn!(
                "Exported {} documents but the count query reported {}",
                exported, expected
            );
        }

        let elapsed = start_time.elapsed();
        info!(
            "Export completed: {} documents, {} bytes, {} ms",
            exported,
            file_size_bytes,
            elapsed.as_millis()
        );

        Ok(ExportSummary {
            documents_exported: exported,
            expected,
            path: path.clone(),
            file_size_bytes,
            elapsed,
        })
    }
}

fn incomplete(path: &Path, written: u64, cause: ShuttleError) -> ShuttleError {
    let reason = match cause {
        ShuttleError::Transfer(TransferError::QueryFailed(status)) => status,
        other => other.to_string(),
    };
    TransferError::ExportIncomplete {
        path: path.display().to_string(),
        written,
        reason,
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::store::MemoryContainer;
    use chrono::TimeZone;
    use serde_json::{Value, json};

    fn docs(n: usize) -> Vec<Document> {
        (0..n)
            .map(|i| Document::from_value(json!({"id": format!("d{i}"), "_ts": i as i64})).unwrap())
            .collect()
    }

    #[test]
    fn test_export_file_name() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(
            export_file_name("shop", "orders", at),
            "cosmos-export-shop-orders-2024-03-09T07-05-01.json"
        );
    }

    #[tokio::test]
    async fn test_export_writes_valid_array() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.json");
        let container = Arc::new(MemoryContainer::new("items").with_documents(docs(5)));

        let options = ExportOptions::new(output.clone()).with_page_size(2);
        let summary = ExportStream::new(container, options).execute().await.unwrap();

        assert_eq!(summary.documents_exported, 5);
        assert_eq!(summary.expected, 5);

        let content = std::fs::read_to_string(&output).unwrap();
        let parsed: Value = serde_json::from_str(&content).unwrap();
        let ids: Vec<_> = parsed
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["d0", "d1", "d2", "d3", "d4"]);
        assert_eq!(content.lines().count(), 7);
        assert_eq!(summary.file_size_bytes, content.len() as u64);
    }

    #[tokio::test]
    async fn test_export_applies_filter() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.json");
        let container = Arc::new(MemoryContainer::new("items").with_documents(docs(6)));

        let options = ExportOptions::new(output.clone())
            .with_filter(TimeFilter::Range { start: 2, end: 3 });
        let summary = ExportStream::new(container, options).execute().await.unwrap();
        assert_eq!(summary.documents_exported, 2);

        let parsed: Value = serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_export() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.json");
        let container = Arc::new(MemoryContainer::new("items"));

        let summary = ExportStream::new(container, ExportOptions::new(output.clone()))
            .execute()
            .await
            .unwrap();
        assert_eq!(summary.documents_exported, 0);

        let parsed: Value = serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(parsed, json!([]));
    }

    #[tokio::test]
    async fn test_count_failure_creates_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.json");
        let container = Arc::new(
            MemoryContainer::new("items")
                .with_documents(docs(3))
                .with_count_failure(),
        );

        let err = ExportStream::new(container, ExportOptions::new(output.clone()))
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ShuttleError::Transfer(TransferError::CountFailed(_))
        ));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_page_failure_leaves_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.json");
        let container = Arc::new(
            MemoryContainer::new("items")
                .with_documents(docs(5))
                .with_page_failure(1),
        );

        let options = ExportOptions::new(output.clone()).with_page_size(2);
        let err = ExportStream::new(container, options).execute().await.unwrap_err();
        match err {
            ShuttleError::Transfer(TransferError::ExportIncomplete { path, written, reason }) => {
                assert_eq!(path, output.display().to_string());
                assert_eq!(written, 2);
                assert!(reason.contains("503"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let content = std::fs::read_to_string(&output).unwrap();
        assert!(content.starts_with("[\n{\"id\":\"d0\""));
        assert!(!content.trim_end().ends_with(']'));
    }
}
