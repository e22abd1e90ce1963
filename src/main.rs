//! CLI entry point for the real-estate ETL pipeline.

use anyhow::{Result, anyhow};
use clap::Parser;
use dotenv::dotenv;
use estate_etl::notify::{LogNotifier, Notifier, TelegramNotifier};
use estate_etl::{DbConfig, EtlConfig, EtlPipeline, LoadOutcome, RunReport};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Real-estate listings ETL pipeline",
    long_about = "Extracts listing data from Postgres, cleans and filters it, and loads\n\
                  the result into a destination table exactly once.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  DATABASE_URL             Postgres connection string, or\n  \
                  DB_DESTINATION_HOST/PORT/NAME/USER/PASSWORD  assembled alternative\n  \
                  TELEGRAM_BOT_TOKEN       bot token for run notifications (optional)\n  \
                  TELEGRAM_CHAT_ID         chat receiving run notifications (optional)\n\n\
                  EXAMPLES:\n  \
                  # Full run with defaults\n  \
                  estate-etl\n\n  \
                  # Preview without writing\n  \
                  estate-etl --dry-run\n\n  \
                  # Custom destination\n  \
                  estate-etl --destination-table listings_clean"
)]
struct Args {
    /// Pipeline identifier reported in notifications
    #[arg(long, default_value = "real_estate_etl")]
    dag_id: String,

    /// Destination table for cleaned listings
    #[arg(long, default_value = "real_estate_listings")]
    destination_table: String,

    /// Extract and transform only; skip the load and notifications
    #[arg(long)]
    dry_run: bool,

    /// Disable outcome notifications even when Telegram credentials are set
    #[arg(long)]
    no_notify: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show warnings and errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Initialize the tracing subscriber for logging.
fn init_logging(level: &str, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.quiet);

    // Load environment variables from .env file
    dotenv().ok();

    let config = EtlConfig::builder()
        .dag_id(&args.dag_id)
        .destination_table(&args.destination_table)
        .build()?;

    let db = DbConfig::from_env()?;
    info!("connecting to the destination database");
    let pool = db.connect().await?;

    let mut builder = EtlPipeline::builder().config(config).pool(pool);

    if !args.no_notify {
        let notifier: Arc<dyn Notifier> = match TelegramNotifier::from_env()? {
            Some(telegram) => Arc::new(telegram),
            None => {
                warn!("telegram credentials not set, run outcomes go to the log only");
                Arc::new(LogNotifier)
            }
        };
        builder = builder.notifier(notifier);
    }

    let pipeline = builder.build()?;

    let report = if args.dry_run {
        pipeline.dry_run().await
    } else {
        pipeline.run().await
    }
    .map_err(|e| anyhow!("pipeline run failed: {e}"))?;

    print_run_summary(&report);
    Ok(())
}

/// Print a human-readable summary of the run.
///
/// This uses `println!` intentionally: the summary is the binary's primary
/// output and should be visible regardless of log level.
fn print_run_summary(report: &RunReport) {
    println!();
    println!("{}", "=".repeat(72));
    println!("ETL RUN COMPLETE");
    println!("{}", "=".repeat(72));
    println!();
    println!("Pipeline: {}  (run {})", report.dag_id, report.run_id);
    println!("Started:  {}", report.started_at.to_rfc3339());
    println!("Duration: {}ms", report.duration_ms);
    println!();
    println!("Rows extracted:      {}", report.rows_extracted);
    println!(
        "Duplicates removed:  {}",
        report.transform.duplicates_removed
    );
    println!(
        "Out of price range:  {}",
        report.transform.out_of_range_removed
    );
    println!(
        "Anomalies removed:   {}",
        report.transform.anomalies_removed
    );
    println!("Rows after cleaning: {}", report.transform.rows_out);
    println!();
    match &report.load {
        LoadOutcome::Loaded { rows } => println!("Loaded {rows} rows"),
        LoadOutcome::SkippedNonEmpty { existing } => {
            println!("Destination already held {existing} rows, nothing loaded")
        }
        LoadOutcome::NotAttempted => println!("Dry run, load skipped"),
    }
    println!("{}", "=".repeat(72));
}
