//! cosmos-shuttle library
//!
//! Streams documents between a Cosmos DB container and a JSON array file.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `config`: Configuration management
//! - `connection`: Store connection and container discovery
//! - `document`: Ordered JSON documents and field name normalization
//! - `error`: Error types and handling
//! - `store`: Container abstraction with MongoDB and in-memory backends
//! - `transfer`: Export and import streams
//! - `utils`: Utility functions and helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cosmos_shuttle::store::MemoryContainer;
//! use cosmos_shuttle::transfer::{ImportOptions, ImportStream};
//!
//! #[tokio::main]
//! async fn main() -> cosmos_shuttle::Result<()> {
//!     let container = Arc::new(MemoryContainer::new("orders"));
//!     let mut import = ImportStream::new(container, ImportOptions::default());
//!     let summary = import.import_file("orders.json".as_ref()).await?;
//!     println!("{} succeeded, {} failed", summary.succeeded, summary.failed);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod connection;
pub mod document;
pub mod error;
pub mod store;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use connection::ConnectionManager;
pub use document::{Document, KeyNormalizer};
pub use error::{Result, ShuttleError};
pub use store::{DocumentContainer, TimeFilter, WriteStatus};
pub use transfer::{ExportStream, ImportStream};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
