/// Delete expired access and refresh token records.
/// Run periodically (e.g., via cron job: 0 * * * * /app/purge-tokens)
///
/// Usage: purge-tokens

use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use marketplace_api::{db::PgStore, services::cron::CronService};

#[derive(Parser)]
#[command(name = "purge-tokens", about = "Purge expired token records from the marketplace database")]
struct Args {}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let _args = Args::parse();

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable not set"))?;

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await?;

    tracing::info!("Starting token purge...");
    let stats = CronService::purge_expired_tokens(&PgStore::new(pool)).await?;
    tracing::info!(
        "Token purge completed: {} access, {} refresh",
        stats.access_tokens,
        stats.refresh_tokens
    );

    Ok(())
}
