//! In-process container
//!
//! Keeps documents in insertion order behind an async mutex. Failures can be
//! injected per document id, for the count query, or for a given query page,
//! which makes it the backing store for the stream tests.
//!
//! With a partition key field configured, upserts match the way a
//! replace-with-upsert does on a real collection: by id, and by the partition
//! field's value when the incoming document carries that field.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::document::{Document, ID_FIELD, identity_text};
use crate::error::{ErrorInfo, Result, ShuttleError, TransferError};
use crate::error::mongo::get_error_name;

use super::{DocumentContainer, DocumentPage, PageStream, TIMESTAMP_FIELD, TimeFilter, WriteStatus};

#[derive(Debug, Clone, PartialEq)]
struct StoredDocument {
    id: String,
    partition: Option<String>,
    document: Document,
}

/// In-memory [`DocumentContainer`].
#[derive(Debug, Default)]
pub struct MemoryContainer {
    name: String,
    partition_key: Option<String>,
    documents: Mutex<Vec<StoredDocument>>,
    rejected_ids: HashSet<String>,
    fail_count: bool,
    fail_page: Option<usize>,
    write_delay: Option<Duration>,
    upserts: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MemoryContainer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Seed the container; documents keep the given order.
    pub fn with_documents(self, documents: Vec<Document>) -> Self {
        let stored = documents
            .into_iter()
            .map(|document| StoredDocument {
                id: document.get(ID_FIELD).map(identity_text).unwrap_or_default(),
                partition: None,
                document,
            })
            .collect();
        Self {
            documents: Mutex::new(stored),
            ..self
        }
    }

    /// Scope upserts by the value of this top-level field.
    pub fn with_partition_key(mut self, key: impl Into<String>) -> Self {
        self.partition_key = Some(key.into());
        self
    }

    /// Reject upserts of documents with these ids.
    pub fn with_rejected_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rejected_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Make the count query fail.
    pub fn with_count_failure(mut self) -> Self {
        self.fail_count = true;
        self
    }

    /// Make the query fail when page number `page` (zero based) is requested.
    pub fn with_page_failure(mut self, page: usize) -> Self {
        self.fail_page = Some(page);
        self
    }

    /// Hold each upsert open for `delay` so overlapping writes are observable.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    /// Snapshot of the stored documents in insertion order.
    pub async fn documents(&self) -> Vec<Document> {
        self.documents
            .lock()
            .await
            .iter()
            .map(|stored| stored.document.clone())
            .collect()
    }

    /// Stored document with the given id, if any.
    pub async fn get(&self, id: &str) -> Option<Document> {
        self.documents
            .lock()
            .await
            .iter()
            .find(|stored| stored.id == id)
            .map(|stored| stored.document.clone())
    }

    /// Partition value a document was last written with.
    pub async fn partition_of(&self, id: &str) -> Option<String> {
        self.documents
            .lock()
            .await
            .iter()
            .find(|stored| stored.id == id)
            .and_then(|stored| stored.partition.clone())
    }

    /// Total upsert calls received.
    pub fn upsert_calls(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    /// Largest number of upserts observed running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn matching(&self, filter: &TimeFilter) -> Vec<Document> {
        self.documents
            .lock()
            .await
            .iter()
            .filter(|stored| {
                let ts = stored.document.get(TIMESTAMP_FIELD).and_then(|ts| ts.as_i64());
                filter.matches(ts)
            })
            .map(|stored| stored.document.clone())
            .collect()
    }

    fn rejection(code: i32, message: &str) -> WriteStatus {
        WriteStatus::Rejected(ErrorInfo {
            error_type: Some("memory.write_error".to_string()),
            code: Some(code),
            name: get_error_name(code),
            message: Some(message.to_string()),
        })
    }

    fn same_partition(
        &self,
        stored: &StoredDocument,
        incoming: &Document,
        partition: &Option<String>,
    ) -> bool {
        let Some(key) = self.partition_key.as_deref() else {
            return stored.partition == *partition;
        };
        match partition {
            Some(value) if incoming.get(key).is_some() => {
                stored.document.get(key).and_then(Value::as_str) == Some(value.as_str())
            }
            _ => true,
        }
    }

    async fn store(&self, document: Document, partition: Option<String>) -> WriteStatus {
        let Some(id) = document.get(ID_FIELD).map(identity_text) else {
            return Self::rejection(2, "document is missing the 'id' field");
        };
        if self.rejected_ids.contains(&id) {
            return Self::rejection(121, "document failed validation");
        }

        let mut documents = self.documents.lock().await;
        let existing = documents
            .iter_mut()
            .find(|stored| stored.id == id && self.same_partition(stored, &document, &partition));
        match existing {
            Some(stored) => {
                stored.document = document;
                WriteStatus::Ok
            }
            None => {
                documents.push(StoredDocument {
                    id,
                    partition,
                    document,
                });
                WriteStatus::Created
            }
        }
    }
}

#[async_trait]
impl DocumentContainer for MemoryContainer {
    fn label(&self) -> String {
        format!("memory/{}", self.name)
    }

    async fn count(&self, filter: &TimeFilter) -> Result<u64> {
        if self.fail_count {
            return Err(ShuttleError::Generic("ServiceUnavailable (503)".to_string()));
        }
        Ok(self.matching(filter).await.len() as u64)
    }

    async fn query(&self, filter: &TimeFilter, page_size: usize) -> Result<Box<dyn PageStream>> {
        Ok(Box::new(MemoryPageStream {
            remaining: self.matching(filter).await,
            page_size: page_size.max(1),
            page: 0,
            fail_page: self.fail_page,
        }))
    }

    async fn upsert(&self, document: Document, partition: Option<String>) -> WriteStatus {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        let status = self.store(document, partition).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        status
    }
}

/// Pages over a snapshot taken when the query started.
struct MemoryPageStream {
    remaining: Vec<Document>,
    page_size: usize,
    page: usize,
    fail_page: Option<usize>,
}

#[async_trait]
impl PageStream for MemoryPageStream {
    async fn next_page(&mut self) -> Result<Option<DocumentPage>> {
        if self.fail_page == Some(self.page) {
            return Err(TransferError::QueryFailed("ServiceUnavailable (503)".to_string()).into());
        }
        if self.remaining.is_empty() {
            return Ok(None);
        }

        let take = self.page_size.min(self.remaining.len());
        let documents: Vec<Document> = self.remaining.drain(..take).collect();
        self.page += 1;
        Ok(Some(DocumentPage {
            documents,
            has_more: !self.remaining.is_empty(),
        }))
    }
}
