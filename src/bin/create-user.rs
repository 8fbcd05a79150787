/// Create a user (or reset an existing user's password), optionally granting a company role.
///
/// Usage: create-user --identifier ID --password PW [--display-name NAME]
///                    [--company-id N --role owner|manager|staff|viewer]

use clap::Parser;
use marketplace_api::{
    config::Config,
    db::{self, PgStore},
    models::user::{normalize_identifier, TenantRole},
    services::password::PasswordHasher,
};

#[derive(Parser)]
#[command(name = "create-user", about = "Create a marketplace user")]
struct Args {
    #[arg(long)]
    identifier: String,

    #[arg(long)]
    password: String,

    #[arg(long)]
    display_name: Option<String>,

    /// Company to grant a role in (requires --role)
    #[arg(long, requires = "role")]
    company_id: Option<i64>,

    #[arg(long, requires = "company_id")]
    role: Option<TenantRole>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;

    let identifier = normalize_identifier(&args.identifier);
    if identifier.is_empty() {
        anyhow::bail!("identifier must not be empty");
    }

    let hasher = PasswordHasher::new(
        config.argon2_memory_kib,
        config.argon2_iterations,
        config.argon2_parallelism,
    )
    .map_err(|e| anyhow::anyhow!("Invalid argon2 parameters: {e}"))?;
    let hash = hasher
        .hash(&args.password)
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {e}"))?;

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    let store = PgStore::new(pool);

    let user_id = store
        .upsert_user(&identifier, &hash, args.display_name.as_deref())
        .await?;
    tracing::info!("User {} ready (id {})", identifier, user_id);

    if let (Some(company_id), Some(role)) = (args.company_id, args.role) {
        store.grant_role(user_id, company_id, role).await?;
        tracing::info!("Granted {} on company {}", role, company_id);
    }

    Ok(())
}
