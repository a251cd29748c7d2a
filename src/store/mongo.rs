//! MongoDB-protocol container
//!
//! Backs [`DocumentContainer`] with a collection reached through the MongoDB
//! wire protocol (Cosmos DB's MongoDB API, or any compatible server).
//! Documents cross the boundary as relaxed extended JSON, so values such as
//! `ObjectId` survive an export followed by an import.

use async_trait::async_trait;
use bson::{self, Bson, doc};
use futures::{Stream, TryStreamExt};
use mongodb::Collection;
use mongodb::error::ErrorKind;
use tracing::{debug, info};

use crate::document::{Document, ID_FIELD};
use crate::error::{ErrorInfo, Result, ShuttleError, TransferError, extract_error_info};
use crate::error::mongo::get_error_name;

use super::{DocumentContainer, DocumentPage, PageStream, TIMESTAMP_FIELD, TimeFilter, WriteStatus};

/// A collection used as a shuttle container.
#[derive(Debug, Clone)]
pub struct MongoContainer {
    collection: Collection<bson::Document>,
    partition_key: Option<String>,
}

impl MongoContainer {
    /// Wrap a collection.
    ///
    /// # Arguments
    /// * `collection` - Target collection
    /// * `partition_key` - Top-level partition (shard) key field, if the
    ///   container is partitioned
    pub fn new(collection: Collection<bson::Document>, partition_key: Option<String>) -> Self {
        Self {
            collection,
            partition_key,
        }
    }

    /// Partition key field used to scope upserts.
    pub fn partition_key(&self) -> Option<&str> {
        self.partition_key.as_deref()
    }
}

/// Translate a time filter into a query document over `_ts`.
pub fn filter_document(filter: &TimeFilter) -> bson::Document {
    match filter {
        TimeFilter::None => doc! {},
        TimeFilter::After(after) => doc! { TIMESTAMP_FIELD: { "$gte": *after } },
        TimeFilter::Before(before) => doc! { TIMESTAMP_FIELD: { "$lte": *before } },
        TimeFilter::Range { start, end } => {
            doc! { TIMESTAMP_FIELD: { "$gte": *start, "$lte": *end } }
        }
    }
}

/// Convert a shuttle document to BSON, parsing extended JSON values.
pub fn to_bson_document(document: Document) -> std::result::Result<bson::Document, String> {
    let mut out = bson::Document::new();
    for (key, value) in document.into_fields() {
        let value = Bson::try_from(value).map_err(|e| format!("field '{key}': {e}"))?;
        out.insert(key, value);
    }
    Ok(out)
}

/// Convert a BSON document to a shuttle document as relaxed extended JSON.
pub fn from_bson_document(document: bson::Document) -> Document {
    document
        .into_iter()
        .map(|(key, value)| (key, value.into_relaxed_extjson()))
        .collect()
}

/// Match on id, plus the partition field when the replacement carries it.
///
/// A replace does not copy filter fields into an inserted document, so
/// filtering on a field the replacement lacks would never match it again.
fn upsert_filter(
    id: Bson,
    partition_key: Option<&str>,
    partition: Option<String>,
    replacement: &bson::Document,
) -> bson::Document {
    let mut filter = doc! { ID_FIELD: id };
    if let (Some(key), Some(value)) = (partition_key, partition) {
        if replacement.contains_key(key) {
            filter.insert(key, value);
        } else {
            debug!("Replacement has no '{}' field, matching on id only", key);
        }
    }
    filter
}

fn bad_value(message: String) -> WriteStatus {
    WriteStatus::Rejected(ErrorInfo {
        error_type: Some("shuttle.invalid_document".to_string()),
        code: Some(2),
        name: get_error_name(2),
        message: Some(message),
    })
}

/// Split driver errors into store rejections and transport failures.
fn classify_write_error(error: &mongodb::error::Error) -> WriteStatus {
    match error.kind.as_ref() {
        ErrorKind::Io(_)
        | ErrorKind::ServerSelection { .. }
        | ErrorKind::ConnectionPoolCleared { .. } => WriteStatus::Transport(error.to_string()),
        _ => WriteStatus::Rejected(extract_error_info(error)),
    }
}

fn query_failed(error: &mongodb::error::Error) -> ShuttleError {
    let info = extract_error_info(error);
    let status = match (info.name(), info.code()) {
        (Some(name), Some(code)) => format!("{name} ({code}): {}", info.message()),
        (None, Some(code)) => format!("{code}: {}", info.message()),
        _ => info.message().to_string(),
    };
    TransferError::QueryFailed(status).into()
}

#[async_trait]
impl DocumentContainer for MongoContainer {
    fn label(&self) -> String {
        format!(
            "{}/{}",
            self.collection.namespace().db,
            self.collection.name()
        )
    }

    async fn count(&self, filter: &TimeFilter) -> Result<u64> {
        debug!("Running count query: {}", filter.count_query());
        Ok(self.collection.count_documents(filter_document(filter)).await?)
    }

    async fn query(&self, filter: &TimeFilter, page_size: usize) -> Result<Box<dyn PageStream>> {
        debug!("Running query: {}", filter.select_query());
        let batch_size = u32::try_from(page_size.max(1)).unwrap_or(u32::MAX);
        let cursor = self
            .collection
            .find(filter_document(filter))
            .batch_size(batch_size)
            .await
            .map_err(|e| query_failed(&e))?;
        Ok(Box::new(CursorPageStream::new(cursor, page_size)))
    }

    async fn upsert(&self, document: Document, partition: Option<String>) -> WriteStatus {
        let Some(id) = document.get(ID_FIELD).cloned() else {
            return bad_value("document is missing the 'id' field".to_string());
        };
        let id = match Bson::try_from(id) {
            Ok(id) => id,
            Err(e) => return bad_value(format!("invalid id: {e}")),
        };

        let replacement = match to_bson_document(document) {
            Ok(replacement) => replacement,
            Err(message) => return bad_value(message),
        };
        let filter = upsert_filter(id, self.partition_key.as_deref(), partition, &replacement);

        match self.collection.replace_one(filter, replacement).upsert(true).await {
            Ok(result) if result.upserted_id.is_some() => WriteStatus::Created,
            Ok(_) => WriteStatus::Ok,
            Err(e) => classify_write_error(&e),
        }
    }
}

/// Cursor-backed page stream.
///
/// Reads one document past the end of each page so `has_more` is exact. A
/// read failure after some documents of a page arrived hands back that
/// partial page and reports the failure on the next call.
pub struct CursorPageStream<S = mongodb::Cursor<bson::Document>> {
    cursor: Option<S>,
    lookahead: Option<bson::Document>,
    deferred: Option<ShuttleError>,
    page_size: usize,
    total_fetched: u64,
}

impl<S> CursorPageStream<S>
where
    S: Stream<Item = mongodb::error::Result<bson::Document>> + Unpin + Send,
{
    pub fn new(cursor: S, page_size: usize) -> Self {
        Self {
            cursor: Some(cursor),
            lookahead: None,
            deferred: None,
            page_size: page_size.max(1),
            total_fetched: 0,
        }
    }

    async fn pull(&mut self) -> Result<Option<bson::Document>> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };
        match cursor.try_next().await {
            Ok(Some(doc)) => Ok(Some(doc)),
            Ok(None) => {
                self.cursor = None;
                Ok(None)
            }
            Err(e) => {
                // Release server resources before surfacing the failure
                self.cursor = None;
                Err(query_failed(&e))
            }
        }
    }
}

#[async_trait]
impl<S> PageStream for CursorPageStream<S>
where
    S: Stream<Item = mongodb::error::Result<bson::Document>> + Unpin + Send,
{
    async fn next_page(&mut self) -> Result<Option<DocumentPage>> {
        if let Some(error) = self.deferred.take() {
            return Err(error);
        }

        let mut documents = Vec::with_capacity(self.page_size);
        if let Some(doc) = self.lookahead.take() {
            documents.push(from_bson_document(doc));
        }

        while documents.len() < self.page_size {
            match self.pull().await {
                Ok(Some(doc)) => documents.push(from_bson_document(doc)),
                Ok(None) => break,
                Err(e) if documents.is_empty() => return Err(e),
                Err(e) => {
                    self.deferred = Some(e);
                    break;
                }
            }
        }

        if documents.is_empty() {
            info!(
                "Query exhausted after fetching {} documents",
                self.total_fetched
            );
            return Ok(None);
        }

        if self.deferred.is_none() {
            match self.pull().await {
                Ok(next) => self.lookahead = next,
                Err(e) => self.deferred = Some(e),
            }
        }
        self.total_fetched += documents.len() as u64;
        debug!(
            "Fetched page of {} documents (total: {})",
            documents.len(),
            self.total_fetched
        );

        Ok(Some(DocumentPage {
            documents,
            has_more: self.lookahead.is_some() || self.deferred.is_some(),
        }))
    }
}
