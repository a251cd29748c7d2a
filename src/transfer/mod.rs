//! Export and import streams
//!
//! - [`export`]: container to JSON array file, page by page
//! - [`import`]: JSON array file to container, batch by batch
//!
//! The remaining modules are the pieces both streams are built from.

pub mod batch;
pub mod export;
pub mod import;
pub mod progress;
pub mod reader;
pub mod writer;

pub use batch::{BatchCoordinator, DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE, RunTally};
pub use export::{DEFAULT_PAGE_SIZE, ExportOptions, ExportStream, ExportSummary, export_path};
pub use import::{ImportOptions, ImportStream, ImportSummary, SkipReason};
pub use progress::ProgressTracker;
pub use reader::{ArrayElement, JsonArrayReader};
pub use writer::JsonArrayWriter;
