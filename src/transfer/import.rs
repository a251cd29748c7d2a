//! Import stream
//!
//! Reads a JSON array file element by element and upserts each object into
//! the destination container through a [`BatchCoordinator`]. Problems with a
//! single element (no identity field, bad partition value, not an object)
//! skip that element and the run continues. Only connection-level failures
//! and broken JSON syntax end a run early.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::io::AsyncBufRead;
use tracing::{debug, info, warn};

use crate::document::{Document, ID_FIELD, KeyNormalizer, identity_text};
use crate::error::{ConfigError, Result};
use crate::store::DocumentContainer;

use super::batch::{BatchCoordinator, DEFAULT_BATCH_SIZE};
use super::progress::ProgressTracker;
use super::reader::{ArrayElement, JsonArrayReader};

/// Settings for one import run.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Concurrent upserts per batch
    pub batch_size: usize,
    /// Normalize every uppercase-leading field name, not just the identity
    pub camel_case: bool,
    /// Partition key field of the destination, `None` when unpartitioned
    pub partition_key: Option<String>,
    /// Whether to draw a progress spinner
    pub show_progress: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            camel_case: false,
            partition_key: None,
            show_progress: false,
        }
    }
}

impl ImportOptions {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_camel_case(mut self, camel_case: bool) -> Self {
        self.camel_case = camel_case;
        self
    }

    pub fn with_partition_key(mut self, partition_key: Option<String>) -> Self {
        self.partition_key = partition_key;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }
}

/// Result of a completed import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    /// Array elements read from the input
    pub read: u64,
    /// Upserts that settled (`succeeded + failed`)
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Elements skipped before submission
    pub skipped: u64,
    /// Non-empty batches flushed
    pub batches: u64,
    pub elapsed: Duration,
}

/// Why an element was not submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NotAnObject,
    MissingId,
    MissingPartitionKey(String),
    InvalidPartitionKey(String),
    /// Renaming would leave two fields with this name
    DuplicateField(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotAnObject => write!(f, "element is not a JSON object"),
            SkipReason::MissingId => write!(f, "no '{ID_FIELD}' field"),
            SkipReason::MissingPartitionKey(key) => {
                write!(f, "missing partition key field '{key}'")
            }
            SkipReason::InvalidPartitionKey(key) => {
                write!(f, "partition key field '{key}' is not a non-null string")
            }
            SkipReason::DuplicateField(name) => {
                write!(f, "renaming fields would produce a second '{name}' field")
            }
        }
    }
}

/// An element ready to be upserted.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedItem {
    pub identity: String,
    pub document: Document,
    pub partition: Option<String>,
}

/// An element that will not be upserted.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedItem {
    pub index: u64,
    pub identity: Option<String>,
    pub reason: SkipReason,
}

/// Streams a JSON array file into one container.
pub struct ImportStream {
    container: Arc<dyn DocumentContainer>,
    options: ImportOptions,
    normalizer: KeyNormalizer,
}

impl ImportStream {
    pub fn new(container: Arc<dyn DocumentContainer>, options: ImportOptions) -> Self {
        Self {
            container,
            options,
            normalizer: KeyNormalizer::new(),
        }
    }

    /// Import the array stored at `path`.
    pub async fn import_file(&mut self, path: &Path) -> Result<ImportSummary> {
        if !path.is_file() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }
        let reader = JsonArrayReader::open(path).await?;
        self.run(reader).await
    }

    /// Import every element the reader yields.
    ///
    /// A syntax error in the input stops the run, but only after the batch
    /// already in flight has settled.
    pub async fn run<R>(&mut self, mut reader: JsonArrayReader<R>) -> Result<ImportSummary>
    where
        R: AsyncBufRead + Unpin,
    {
        let start_time = Instant::now();
        let tracker = ProgressTracker::new(None, self.options.show_progress);
        let mut batches = BatchCoordinator::new(
            Arc::clone(&self.container),
            self.options.batch_size,
            tracker,
        );
        let mut skipped = 0u64;

        info!(
            "Starting import into {} with batch size {}",
            self.container.label(),
            batches.capacity()
        );

        loop {
            let element = match reader.next_element().await {
                Ok(Some(element)) => element,
                Ok(None) => break,
                Err(e) => {
                    batches.flush().await;
                    let (tally, flushes) = batches.finish();
                    warn!(
                        "Import stopped after {} elements ({} succeeded, {} failed, {} batches)",
                        reader.elements_read(),
                        tally.succeeded,
                        tally.failed,
                        flushes
                    );
                    return Err(e);
                }
            };

            match self.prepare(element) {
                Ok(item) => {
                    batches.submit(Some(item.identity), item.document, item.partition);
                    if batches.is_full() {
                        batches.flush().await;
                    }
                }
                Err(skip) => {
                    skipped += 1;
                    warn!(
                        "Skipping item {} at index {}: {}",
                        skip.identity.as_deref().unwrap_or("<no id>"),
                        skip.index,
                        skip.reason
                    );
                }
            }
        }

        batches.flush().await;
        let (tally, flushes) = batches.finish();

        let summary = ImportSummary {
            read: reader.elements_read(),
            processed: tally.processed,
            succeeded: tally.succeeded,
            failed: tally.failed,
            skipped,
            batches: flushes,
            elapsed: start_time.elapsed(),
        };
        info!(
            "Import completed: {} processed ({} succeeded, {} failed), {} skipped in {} ms",
            summary.processed,
            summary.succeeded,
            summary.failed,
            summary.skipped,
            summary.elapsed.as_millis()
        );
        Ok(summary)
    }

    /// Shape one element for upsert, or explain why it is skipped.
    pub fn prepare(&mut self, element: ArrayElement) -> std::result::Result<PreparedItem, SkippedItem> {
        let index = element.index;
        let skip = |identity: Option<String>, reason: SkipReason| SkippedItem {
            index,
            identity,
            reason,
        };

        let Some(original) = Document::from_value(element.value) else {
            return Err(skip(None, SkipReason::NotAnObject));
        };
        let Some(id_field) = original.find_ignore_case(ID_FIELD) else {
            return Err(skip(None, SkipReason::MissingId));
        };
        let identity = identity_text(id_field.value);
        let id_index = id_field.index;
        let id_name = id_field.name.to_string();

        // The partition value comes from the element as read, before any renaming
        let partition = match self.options.partition_key.as_deref() {
            None => None,
            Some(key) => match original.get(key) {
                Some(Value::String(value)) => Some(value.clone()),
                Some(_) => {
                    return Err(skip(
                        Some(identity),
                        SkipReason::InvalidPartitionKey(key.to_string()),
                    ));
                }
                None => {
                    return Err(skip(
                        Some(identity),
                        SkipReason::MissingPartitionKey(key.to_string()),
                    ));
                }
            },
        };

        // The partition key field keeps its exact name so upserts stay scoped to it
        let partition_key = self.options.partition_key.as_deref();
        let mut document = if self.options.camel_case {
            let renamed = {
                let renamable: Vec<&str> = original
                    .keys()
                    .filter(|name| Some(*name) != partition_key)
                    .collect();
                self.normalizer.normalize(&original, Some(renamable.as_slice()))
            };
            renamed.unwrap_or(original)
        } else if id_name == ID_FIELD {
            original
        } else {
            self.normalizer
                .normalize(&original, Some(&[id_name.as_str()]))
                .unwrap_or(original)
        };

        // Normalizing only lowers the first character, so `ID` still arrives as `iD`
        if document.name_at(id_index) != Some(ID_FIELD) {
            document.rename_at(id_index, ID_FIELD);
        }
        if let Some(name) = document.duplicate_name() {
            return Err(skip(
                Some(identity),
                SkipReason::DuplicateField(name.to_string()),
            ));
        }

        debug!("Prepared item {} (index {})", identity, index);
        Ok(PreparedItem {
            identity,
            document,
            partition,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ShuttleError, TransferError};
    use crate::store::MemoryContainer;
    use serde_json::json;
    use std::io;
    use std::sync::Mutex;
    use tracing_subscriber::fmt::MakeWriter;

    /// Collects formatted log output in memory.
    #[derive(Clone, Default)]
    struct LogCapture(Arc<Mutex<Vec<u8>>>);

    impl LogCapture {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for LogCapture {
        type Writer = LogCapture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn element(index: u64, value: Value) -> ArrayElement {
        ArrayElement {
            index,
            offset: 0,
            value,
        }
    }

    fn stream(options: ImportOptions) -> ImportStream {
        ImportStream::new(Arc::new(MemoryContainer::new("items")), options)
    }

    fn keys(document: &Document) -> Vec<&str> {
        document.keys().collect()
    }

    async fn import_text(
        container: Arc<MemoryContainer>,
        options: ImportOptions,
        text: &str,
    ) -> Result<ImportSummary> {
        let mut import = ImportStream::new(container, options);
        import.run(JsonArrayReader::new(text.as_bytes())).await
    }

    #[test]
    fn test_identity_only_rename_by_default() {
        let mut import = stream(ImportOptions::default());
        let item = import
            .prepare(element(0, json!({"Name": "x", "Id": "a", "Count": 1})))
            .unwrap();
        assert_eq!(item.identity, "a");
        assert_eq!(keys(&item.document), vec!["Name", "id", "Count"]);
    }

    #[test]
    fn test_exact_id_is_untouched() {
        let mut import = stream(ImportOptions::default());
        let item = import
            .prepare(element(0, json!({"id": 7, "Name": "x"})))
            .unwrap();
        assert_eq!(item.identity, "7");
        assert_eq!(keys(&item.document), vec!["id", "Name"]);
    }

    #[test]
    fn test_upper_case_id_becomes_id() {
        let mut import = stream(ImportOptions::default());
        let item = import.prepare(element(0, json!({"ID": "a"}))).unwrap();
        assert_eq!(keys(&item.document), vec!["id"]);

        let mut import = stream(ImportOptions::default().with_camel_case(true));
        let item = import.prepare(element(0, json!({"iD": "a", "Other": 1}))).unwrap();
        assert_eq!(keys(&item.document), vec!["id", "other"]);
    }

    #[test]
    fn test_camel_case_renames_all_fields_in_place() {
        let mut import = stream(ImportOptions::default().with_camel_case(true));
        let item = import
            .prepare(element(0, json!({"Id": "a", "PartitionKey": "p", "nested": {"Inner": 1}})))
            .unwrap();
        assert_eq!(
            serde_json::to_value(&item.document).unwrap(),
            json!({"id": "a", "partitionKey": "p", "nested": {"Inner": 1}})
        );
    }

    #[test]
    fn test_partition_value_read_from_original_element() {
        let options = ImportOptions::default()
            .with_camel_case(true)
            .with_partition_key(Some("Partition".to_string()));
        let mut import = stream(options);
        let item = import
            .prepare(element(0, json!({"Id": "a", "Partition": "p1"})))
            .unwrap();
        assert_eq!(item.partition.as_deref(), Some("p1"));
        assert_eq!(keys(&item.document), vec!["id", "Partition"]);
    }

    #[test]
    fn test_camel_case_keeps_partition_key_name() {
        let options = ImportOptions::default()
            .with_camel_case(true)
            .with_partition_key(Some("TenantId".to_string()));
        let mut import = stream(options);
        let item = import
            .prepare(element(0, json!({"Id": "a", "TenantId": "t1", "Total": 3})))
            .unwrap();
        assert_eq!(keys(&item.document), vec!["id", "TenantId", "total"]);
    }

    #[test]
    fn test_rename_collision_is_skipped() {
        let mut import = stream(ImportOptions::default().with_camel_case(true));
        let skip = import
            .prepare(element(2, json!({"Id": "a", "id": "b"})))
            .unwrap_err();
        assert_eq!(skip.index, 2);
        assert_eq!(skip.identity.as_deref(), Some("b"));
        assert_eq!(skip.reason, SkipReason::DuplicateField("id".to_string()));

        let skip = import
            .prepare(element(3, json!({"id": "c", "Name": "x", "name": "y"})))
            .unwrap_err();
        assert_eq!(skip.reason, SkipReason::DuplicateField("name".to_string()));

        // Without camelCase the exact `id` wins and `Id` is left alone
        let mut import = stream(ImportOptions::default());
        let item = import
            .prepare(element(0, json!({"Id": "a", "id": "b"})))
            .unwrap();
        assert_eq!(item.identity, "b");
        assert_eq!(keys(&item.document), vec!["Id", "id"]);
    }

    #[tokio::test]
    async fn test_colliding_item_is_not_written() {
        let container = Arc::new(MemoryContainer::new("items"));
        let summary = import_text(
            container.clone(),
            ImportOptions::default().with_camel_case(true),
            r#"[{"Id":"a","id":"b"},{"Id":"c"}]"#,
        )
        .await
        .unwrap();

        assert_eq!((summary.processed, summary.skipped), (1, 1));
        assert!(container.get("a").await.is_none());
        assert!(container.get("b").await.is_none());
        assert_eq!(keys(&container.get("c").await.unwrap()), vec!["id"]);
    }

    #[test]
    fn test_skip_reasons() {
        let options = ImportOptions::default().with_partition_key(Some("pk".to_string()));
        let mut import = stream(options);

        let skip = import.prepare(element(3, json!({"name": "x"}))).unwrap_err();
        assert_eq!((skip.index, skip.reason), (3, SkipReason::MissingId));

        let skip = import.prepare(element(4, json!({"id": "b"}))).unwrap_err();
        assert_eq!(skip.identity.as_deref(), Some("b"));
        assert_eq!(skip.reason, SkipReason::MissingPartitionKey("pk".to_string()));

        for bad in [json!(null), json!(5), json!({"k": 1})] {
            let skip = import
                .prepare(element(5, json!({"id": "c", "pk": bad})))
                .unwrap_err();
            assert_eq!(skip.reason, SkipReason::InvalidPartitionKey("pk".to_string()));
        }

        let skip = import.prepare(element(6, json!([1, 2]))).unwrap_err();
        assert_eq!(skip.reason, SkipReason::NotAnObject);
    }

    #[tokio::test]
    async fn test_partitioned_import_example() {
        let container = Arc::new(MemoryContainer::new("items"));
        let options = ImportOptions::default().with_partition_key(Some("Partition".to_string()));
        let summary = import_text(
            container.clone(),
            options,
            r#"[{"Id":"a","Partition":"p1"},{"id":"b"}]"#,
        )
        .await
        .unwrap();

        assert_eq!(summary.read, 2);
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.skipped, 1);

        let stored = container.get("a").await.unwrap();
        assert_eq!(keys(&stored), vec!["id", "Partition"]);
        assert_eq!(container.partition_of("a").await.as_deref(), Some("p1"));
        assert!(container.get("b").await.is_none());
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_fatal() {
        let container = Arc::new(MemoryContainer::new("items").with_rejected_ids(["b"]));
        let summary = import_text(
            container.clone(),
            ImportOptions::default().with_batch_size(2),
            r#"[{"id":"a"},{"id":"b"},{"id":"c"},]"#,
        )
        .await
        .unwrap();

        assert_eq!(summary.processed, 3);
        assert_eq!(summary.processed, summary.succeeded + summary.failed);
        assert_eq!((summary.succeeded, summary.failed), (2, 1));
        assert_eq!(summary.batches, 2);
    }

    #[tokio::test]
    async fn test_malformed_input_flushes_open_batch() {
        let container = Arc::new(MemoryContainer::new("items"));
        let err = import_text(
            container.clone(),
            ImportOptions::default().with_batch_size(10),
            r#"[{"id":"a"},{"id":"b"} {"id":"c"}]"#,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            ShuttleError::Transfer(TransferError::MalformedInput { .. })
        ));
        assert_eq!(container.documents().await.len(), 2);
    }

    #[tokio::test]
    async fn test_diagnostics_name_item_and_reason() {
        let capture = LogCapture::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let container = Arc::new(MemoryContainer::new("items").with_rejected_ids(["c"]));
        let options = ImportOptions::default().with_partition_key(Some("pk".to_string()));
        let summary = import_text(
            container,
            options,
            r#"[{"name":"x"},{"id":"b"},{"id":"c","pk":"p"},{"id":"d","pk":"p"}]"#,
        )
        .await
        .unwrap();
        assert_eq!((summary.succeeded, summary.failed, summary.skipped), (1, 1, 2));

        let logs = capture.text();
        assert!(logs.contains("Skipping item <no id> at index 0: no 'id' field"));
        assert!(logs.contains("Skipping item b at index 1: missing partition key field 'pk'"));
        assert!(logs.contains(
            "Failed to import item with id 'c', response status: \
             DocumentValidationFailure (121): document failed validation"
        ));
        assert!(!logs.contains("'d'"));
    }

    #[tokio::test]
    async fn test_missing_source_file() {
        let mut import = stream(ImportOptions::default());
        let err = import
            .import_file(Path::new("/nonexistent/input.json"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ShuttleError::Config(ConfigError::FileNotFound(_))
        ));
    }
}
