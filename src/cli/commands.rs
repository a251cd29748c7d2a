//! Export and import subcommands
//!
//! Connects to the store, runs the stream, and prints the run banner and
//! summary on stdout. Diagnostics go through `tracing` on stderr.

use std::path::Path;

use tracing::info;

use crate::config::Config;
use crate::connection::{ConnectionManager, ContainerConnection};
use crate::error::{ConfigError, Result};
use crate::store::TimeFilter;
use crate::transfer::{
    ExportOptions, ExportStream, ExportSummary, ImportOptions, ImportStream, ImportSummary,
    export_path,
};
use crate::utils::format::{format_bytes, format_duration};
use crate::utils::validate;

use super::{TargetArgs, check_source};

/// Export the target container into `output_dir`.
pub async fn export(
    config: &Config,
    target: &TargetArgs,
    filter: TimeFilter,
    output_dir: &Path,
) -> Result<ExportSummary> {
    validate_target(target)?;
    let connection = connect(config, target).await?;

    let path = export_path(output_dir, &connection.database, &connection.name);
    println!(
        "Exporting {}/{} to {}",
        connection.database,
        connection.name,
        path.display()
    );
    if let Some(predicate) = filter.predicate() {
        println!("Filter: {predicate}");
    }

    let options = ExportOptions::new(path)
        .with_filter(filter)
        .with_page_size(config.transfer.page_size)
        .with_progress(config.transfer.progress);
    let summary = ExportStream::new(connection.container, options)
        .execute()
        .await?;

    print_export_summary(&summary);
    Ok(summary)
}

/// Import `source` into the target container.
pub async fn import(
    config: &Config,
    target: &TargetArgs,
    source: Option<&Path>,
) -> Result<ImportSummary> {
    let source = check_source(source)?;
    validate_target(target)?;
    let connection = connect(config, target).await?;

    println!(
        "Importing {} into {}/{} (batch size {})",
        source.display(),
        connection.database,
        connection.name,
        config.transfer.batch_size
    );

    let options = ImportOptions::default()
        .with_batch_size(config.transfer.batch_size)
        .with_camel_case(config.transfer.camel_case)
        .with_partition_key(connection.partition_key.clone())
        .with_progress(config.transfer.progress);
    let summary = ImportStream::new(connection.container, options)
        .import_file(&source)
        .await?;

    print_import_summary(&summary);
    Ok(summary)
}

fn validate_target(target: &TargetArgs) -> Result<()> {
    if !validate::is_valid_database_name(&target.database) {
        return Err(ConfigError::InvalidValue {
            field: "--db".to_string(),
            value: target.database.clone(),
        }
        .into());
    }
    if !validate::is_valid_container_name(&target.container) {
        return Err(ConfigError::InvalidValue {
            field: "--container".to_string(),
            value: target.container.clone(),
        }
        .into());
    }
    Ok(())
}

async fn connect(config: &Config, target: &TargetArgs) -> Result<ContainerConnection> {
    let uri = config
        .connection
        .uri
        .as_deref()
        .ok_or_else(|| ConfigError::MissingField("--connection".to_string()))?;

    let mut manager = ConnectionManager::new(uri, config.request_timeout());
    info!("Connecting (timeout {}s)", manager.timeout().as_secs());
    manager.connect().await?;
    manager
        .open_container(
            &target.database,
            &target.container,
            target.partition_key.as_deref(),
        )
        .await
}

fn print_export_summary(summary: &ExportSummary) {
    println!(
        "Exported {} documents ({}) in {}",
        summary.documents_exported,
        format_bytes(summary.file_size_bytes),
        format_duration(summary.elapsed)
    );
    println!("Created file: {}", summary.path.display());
}

fn print_import_summary(summary: &ImportSummary) {
    println!(
        "Imported {} documents in {}: {} succeeded, {} failed, {} skipped",
        summary.processed,
        format_duration(summary.elapsed),
        summary.succeeded,
        summary.failed,
        summary.skipped
    );
}
