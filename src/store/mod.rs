//! Document store abstraction
//!
//! The export and import streams talk to a container only through
//! [`DocumentContainer`]. A container answers three requests:
//!
//! 1. A count of the documents matching a [`TimeFilter`]
//! 2. A paginated query over the same documents, consumed through a
//!    [`PageStream`]
//! 3. An upsert of a single document, optionally scoped to a partition value
//!
//! Upserts never return `Err`: rejections and transport failures come back
//! as a [`WriteStatus`] so the batch coordinator can count them.

use std::fmt;

use async_trait::async_trait;

use crate::document::Document;
use crate::error::{ConfigError, ErrorInfo, Result};

pub mod memory;
pub mod mongo;

pub use memory::MemoryContainer;
pub use mongo::MongoContainer;

/// Name of the store-assigned last-modified field (epoch seconds).
pub const TIMESTAMP_FIELD: &str = "_ts";

/// Restricts an export to documents by last-modified timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeFilter {
    /// Every document
    #[default]
    None,
    /// `_ts >= after`
    After(i64),
    /// `_ts <= before`
    Before(i64),
    /// `_ts >= start AND _ts <= end`
    Range { start: i64, end: i64 },
}

impl TimeFilter {
    /// Build a filter from the mutually exclusive export options.
    ///
    /// Supplying more than one of the three options is rejected.
    pub fn from_options(
        after: Option<i64>,
        before: Option<i64>,
        range: Option<(i64, i64)>,
    ) -> Result<Self> {
        let supplied = [after.is_some(), before.is_some(), range.is_some()]
            .iter()
            .filter(|set| **set)
            .count();
        if supplied > 1 {
            return Err(ConfigError::ConflictingFilters.into());
        }

        Ok(match (after, before, range) {
            (Some(after), _, _) => TimeFilter::After(after),
            (_, Some(before), _) => TimeFilter::Before(before),
            (_, _, Some((start, end))) => {
                if start > end {
                    return Err(ConfigError::InvalidValue {
                        field: "range".to_string(),
                        value: format!("{start} {end}"),
                    }
                    .into());
                }
                TimeFilter::Range { start, end }
            }
            _ => TimeFilter::None,
        })
    }

    /// SQL predicate over `c._ts`, or `None` for an unfiltered query.
    pub fn predicate(&self) -> Option<String> {
        match self {
            TimeFilter::None => None,
            TimeFilter::After(after) => Some(format!("{TIMESTAMP_FIELD} >= {after}")),
            TimeFilter::Before(before) => Some(format!("{TIMESTAMP_FIELD} <= {before}")),
            TimeFilter::Range { start, end } => Some(format!(
                "{TIMESTAMP_FIELD} >= {start} AND {TIMESTAMP_FIELD} <= {end}"
            )),
        }
    }

    /// The pre-flight count query.
    pub fn count_query(&self) -> String {
        self.with_where("SELECT VALUE COUNT(1) FROM c")
    }

    /// The paginated export query.
    pub fn select_query(&self) -> String {
        self.with_where("SELECT * FROM c")
    }

    fn with_where(&self, base: &str) -> String {
        match self.predicate() {
            Some(predicate) => format!("{base} WHERE {predicate}"),
            None => base.to_string(),
        }
    }

    /// Whether a document with last-modified time `ts` passes the filter.
    ///
    /// Documents without a timestamp only pass an unfiltered query.
    pub fn matches(&self, ts: Option<i64>) -> bool {
        match (self, ts) {
            (TimeFilter::None, _) => true,
            (_, None) => false,
            (TimeFilter::After(after), Some(ts)) => ts >= *after,
            (TimeFilter::Before(before), Some(ts)) => ts <= *before,
            (TimeFilter::Range { start, end }, Some(ts)) => ts >= *start && ts <= *end,
        }
    }
}

/// One page of query results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentPage {
    /// Documents in store order
    pub documents: Vec<Document>,
    /// True only if at least one further non-empty page follows
    pub has_more: bool,
}

/// Outcome of a single upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteStatus {
    /// An existing document was replaced.
    Ok,
    /// A new document was inserted.
    Created,
    /// The store refused the write.
    Rejected(ErrorInfo),
    /// The request never completed (network failure, task failure).
    Transport(String),
}

impl WriteStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, WriteStatus::Ok | WriteStatus::Created)
    }
}

impl fmt::Display for WriteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteStatus::Ok => write!(f, "OK"),
            WriteStatus::Created => write!(f, "Created"),
            WriteStatus::Rejected(info) => {
                match (info.name(), info.code()) {
                    (Some(name), Some(code)) => write!(f, "{name} ({code})")?,
                    (None, Some(code)) => write!(f, "error {code}")?,
                    _ => write!(f, "rejected")?,
                }
                write!(f, ": {}", info.message())
            }
            WriteStatus::Transport(reason) => write!(f, "transport failure: {reason}"),
        }
    }
}

/// Streams the pages of one export query.
#[async_trait]
pub trait PageStream: Send {
    /// Fetch the next page, or `None` once the query is exhausted.
    ///
    /// An `Err` means the page request failed; the stream must not be
    /// polled again afterwards.
    async fn next_page(&mut self) -> Result<Option<DocumentPage>>;
}

/// A handle to one container in the document store.
#[async_trait]
pub trait DocumentContainer: Send + Sync {
    /// Human readable `database/container` label for logs.
    fn label(&self) -> String;

    /// Count documents matching `filter`.
    async fn count(&self, filter: &TimeFilter) -> Result<u64>;

    /// Start a paginated query over documents matching `filter`.
    async fn query(&self, filter: &TimeFilter, page_size: usize) -> Result<Box<dyn PageStream>>;

    /// Insert or replace `document`, keyed by its `id` field and, for
    /// partitioned containers, `partition`.
    async fn upsert(&self, document: Document, partition: Option<String>) -> WriteStatus;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShuttleError;

    #[test]
    fn test_filters_are_mutually_exclusive() {
        let err = TimeFilter::from_options(Some(1), Some(2), None).unwrap_err();
        assert!(matches!(
            err,
            ShuttleError::Config(ConfigError::ConflictingFilters)
        ));
        assert!(TimeFilter::from_options(Some(1), None, Some((1, 2))).is_err());
        assert!(TimeFilter::from_options(None, Some(1), Some((1, 2))).is_err());
    }

    #[test]
    fn test_single_filter_options() {
        assert_eq!(
            TimeFilter::from_options(None, None, None).unwrap(),
            TimeFilter::None
        );
        assert_eq!(
            TimeFilter::from_options(Some(10), None, None).unwrap(),
            TimeFilter::After(10)
        );
        assert_eq!(
            TimeFilter::from_options(None, None, Some((5, 9))).unwrap(),
            TimeFilter::Range { start: 5, end: 9 }
        );
        assert!(TimeFilter::from_options(None, None, Some((9, 5))).is_err());
    }

    #[test]
    fn test_query_text() {
        assert_eq!(TimeFilter::None.count_query(), "SELECT VALUE COUNT(1) FROM c");
        assert_eq!(
            TimeFilter::After(100).select_query(),
            "SELECT * FROM c WHERE _ts >= 100"
        );
        assert_eq!(
            TimeFilter::Range { start: 1, end: 2 }.count_query(),
            "SELECT VALUE COUNT(1) FROM c WHERE _ts >= 1 AND _ts <= 2"
        );
    }

    #[test]
    fn test_filter_matches() {
        assert!(TimeFilter::None.matches(None));
        assert!(!TimeFilter::After(5).matches(None));
        assert!(TimeFilter::After(5).matches(Some(5)));
        assert!(!TimeFilter::Before(5).matches(Some(6)));
        let range = TimeFilter::Range { start: 2, end: 4 };
        assert!(range.matches(Some(2)) && range.matches(Some(4)));
        assert!(!range.matches(Some(5)));
    }

    #[test]
    fn test_write_status_display() {
        assert!(WriteStatus::Created.is_success());
        let rejected = WriteStatus::Rejected(ErrorInfo {
            code: Some(16500),
            name: Some("TooManyRequests".into()),
            message: Some("Request rate is large".into()),
            ..Default::default()
        });
        assert!(!rejected.is_success());
        assert_eq!(
            rejected.to_string(),
            "TooManyRequests (16500): Request rate is large"
        );
    }
}
