//! cosmos-shuttle
//!
//! Moves documents between a Cosmos DB container and a JSON array file.
//!
//! # Usage
//!
//! ```bash
//! # Export documents modified since an epoch second
//! cosmos-shuttle export --connection emulator --db shop --container orders --after 1700000000
//!
//! # Import a file in batches of 100
//! cosmos-shuttle import --connection emulator --db shop --container orders \
//!     --source cosmos-export-shop-orders-2024-03-09T07-05-01.json --batch-size 100
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use cosmos_shuttle::cli::CliInterface;
use cosmos_shuttle::error::Result;

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Parse arguments, set up logging, and run the selected subcommand
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;
    initialize_logging(&cli);
    cli.run().await
}

/// Install the stderr subscriber.
///
/// `RUST_LOG` takes precedence over the configured and command-line level.
fn initialize_logging(cli: &CliInterface) {
    let level = cli.config().logging.level.to_tracing_level();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::default().add_directive(LevelFilter::from_level(level).into())
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
