use anyhow::{Context, Result};
use std::sync::Arc;
use timeline_service::column_store::RedisColumnStore;
use timeline_service::migration::{BackendVerifier, ColumnBackfill};
use timeline_service::repository::{connect_pool, ColumnGraphBackend, GraphBackend, PostgresGraphBackend};
use timeline_service::Config;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "column_store_migrate=info,timeline_service=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");
    if !matches!(command, "backfill" | "verify" | "check") {
        print_usage();
        return Ok(());
    }

    dotenvy::dotenv().ok();
    let config = Config::from_env().context("Failed to load configuration")?;

    let database = config.database_service();
    let pool = connect_pool(&config.database.url, config.database.max_connections, &database)
        .await
        .context("Failed to connect to PostgreSQL")?;
    let relational = Arc::new(PostgresGraphBackend::new(pool, database.timeout.duration));

    let store = RedisColumnStore::connect(&config.column_store.url, config.column_store_service())
        .await
        .context("Failed to connect to the column store")?;
    let column = Arc::new(ColumnGraphBackend::new(Arc::new(store)));

    match command {
        "backfill" => {
            let batch_size = std::env::var("BACKFILL_BATCH_SIZE")
                .ok()
                .map(|v| v.parse::<usize>())
                .transpose()
                .context("BACKFILL_BATCH_SIZE must be a positive integer")?
                .unwrap_or(ColumnBackfill::DEFAULT_BATCH_SIZE);

            let stats = ColumnBackfill::new(relational.clone(), column.clone())
                .with_batch_size(batch_size)
                .run()
                .await
                .context("Backfill failed")?;
            info!(
                "Backfill done: {} batches, {} edges written, {} already present",
                stats.batches, stats.edges_written, stats.edges_skipped
            );
        }

        "verify" => {
            let report = BackendVerifier::new(relational.clone(), relational.clone(), column.clone())
                .run()
                .await
                .context("Verification failed")?;
            if report.is_consistent() {
                info!(users = report.users_checked, "Backends agree");
            } else {
                error!(
                    users = report.users_checked,
                    mismatches = report.mismatches.len(),
                    "Backends disagree"
                );
                anyhow::bail!("{} mismatches between backends", report.mismatches.len());
            }
        }

        _ => {
            relational
                .health_check()
                .await
                .context("PostgreSQL health check failed")?;
            info!("PostgreSQL connection OK");

            column
                .following_count(Uuid::nil())
                .await
                .context("Column store health check failed")?;
            info!("Column store connection OK");
        }
    }

    Ok(())
}

fn print_usage() {
    println!("Usage: column-store-migrate <command>");
    println!();
    println!("Commands:");
    println!("  backfill   - Copy relational follow edges into the column store");
    println!("  verify     - Compare both graph backends user by user");
    println!("  check      - Check database and column store connections");
    println!();
    println!("Environment Variables:");
    println!("  DATABASE_URL         - PostgreSQL connection string (required)");
    println!("  COLUMN_STORE_URL     - Column store Redis URL (default: REDIS_URL)");
    println!("  BACKFILL_BATCH_SIZE  - Edges per export batch (default: 1000)");
}
