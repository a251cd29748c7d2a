//! Error handling for shuttle runs.
//!
//! Errors fall into three groups:
//! - Configuration and connection failures, which stop a run before or
//!   while it talks to the store
//! - Transfer failures (failed count query, failed export page, malformed
//!   import file), which stop the stream that hit them
//! - Per-document problems, which are never returned as errors; the import
//!   stream tallies and logs them and keeps going
//!
//! Driver errors are rendered through [`ErrorInfo`], a structured summary
//! extracted from `mongodb::error::Error`.

pub mod kinds;
pub mod mongo;

// Re-export commonly used types
pub use kinds::{ConfigError, ConnectionError, Result, ShuttleError, TransferError};
pub use mongo::{ErrorInfo, extract_error_info};
