use std::{fmt, io};

use crate::error::mongo::format_mongodb_error;

/// Crate-wide `Result` type using [`ShuttleError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, ShuttleError>;

/// Top-level error type for shuttle runs.
///
/// Only failures that end a run are represented here. Per-document problems
/// during import are tallied and logged instead of being returned.
#[derive(Debug)]
pub enum ShuttleError {
    /// Connection-related errors.
    Connection(ConnectionError),

    /// Configuration errors.
    Config(ConfigError),

    /// Export or import stream errors.
    Transfer(TransferError),

    /// I/O errors.
    Io(io::Error),

    /// MongoDB driver errors.
    MongoDb(mongodb::error::Error),

    /// JSON serialization errors.
    Json(serde_json::Error),

    /// Generic error with a free-form message.
    Generic(String),
}

/// Connection-specific errors.
#[derive(Debug)]
pub enum ConnectionError {
    /// Failed to establish a connection.
    ConnectionFailed(String),

    /// Invalid connection URI.
    InvalidUri(String),

    /// The named database does not exist.
    DatabaseNotFound(String),

    /// The named container does not exist in the database.
    ContainerNotFound(String),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config or source file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Missing required field.
    MissingField(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },

    /// More than one export time filter was supplied.
    ConflictingFilters,

    /// Generic configuration error.
    Generic(String),
}

/// Errors that abort an export or import stream.
#[derive(Debug)]
pub enum TransferError {
    /// The pre-flight count query failed.
    CountFailed(String),

    /// A page of the export query came back with a non-success status.
    QueryFailed(String),

    /// The export stopped part way; the file at `path` is incomplete.
    ExportIncomplete {
        path: String,
        written: u64,
        reason: String,
    },

    /// The import file is not a well-formed JSON array.
    MalformedInput { offset: u64, message: String },
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for ShuttleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShuttleError::Connection(e) => write!(f, "Connection error: {e}"),
            ShuttleError::Config(e) => write!(f, "Configuration error: {e}"),
            ShuttleError::Transfer(e) => write!(f, "Transfer error: {e}"),
            ShuttleError::Io(e) => write!(f, "I/O error: {e}"),
            ShuttleError::MongoDb(e) => format_mongodb_error(f, e),
            ShuttleError::Json(e) => write!(f, "JSON error: {e}"),
            ShuttleError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::ConnectionFailed(msg) => write!(f, "Failed to connect: {msg}"),
            ConnectionError::InvalidUri(uri) => write!(f, "Invalid connection URI: {uri}"),
            ConnectionError::DatabaseNotFound(name) => {
                write!(f, "No database found with name: {name}")
            }
            ConnectionError::ContainerNotFound(name) => {
                write!(f, "No container found with name: {name}")
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "File not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::MissingField(field) => write!(f, "Missing required option: {field}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for '{field}'")
            }
            ConfigError::ConflictingFilters => write!(
                f,
                "Only one of --after, --before or --range may be supplied"
            ),
            ConfigError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::CountFailed(status) => {
                write!(f, "Count operation failed with status: {status}")
            }
            TransferError::QueryFailed(status) => write!(f, "Query failed with status: {status}"),
            TransferError::ExportIncomplete {
                path,
                written,
                reason,
            } => write!(
                f,
                "Export did not complete after {written} documents ({reason}); partial file left at {path}"
            ),
            TransferError::MalformedInput { offset, message } => {
                write!(f, "Malformed JSON input at byte {offset}: {message}")
            }
        }
    }
}

impl std::error::Error for ShuttleError {}
impl std::error::Error for ConnectionError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for TransferError {}

/* ========================= Conversions to ShuttleError ========================= */

impl From<io::Error> for ShuttleError {
    fn from(err: io::Error) -> Self {
        ShuttleError::Io(err)
    }
}

impl From<mongodb::error::Error> for ShuttleError {
    fn from(err: mongodb::error::Error) -> Self {
        ShuttleError::MongoDb(err)
    }
}

impl From<serde_json::Error> for ShuttleError {
    fn from(err: serde_json::Error) -> Self {
        ShuttleError::Json(err)
    }
}

impl From<ConnectionError> for ShuttleError {
    fn from(err: ConnectionError) -> Self {
        ShuttleError::Connection(err)
    }
}

impl From<ConfigError> for ShuttleError {
    fn from(err: ConfigError) -> Self {
        ShuttleError::Config(err)
    }
}

impl From<TransferError> for ShuttleError {
    fn from(err: TransferError) -> Self {
        ShuttleError::Transfer(err)
    }
}

impl From<String> for ShuttleError {
    fn from(msg: String) -> Self {
        ShuttleError::Generic(msg)
    }
}

impl From<&str> for ShuttleError {
    fn from(msg: &str) -> Self {
        ShuttleError::Generic(msg.to_owned())
    }
}
