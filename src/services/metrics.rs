use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_counter, register_gauge, Counter, CounterVec, Gauge};
use sqlx::PgPool;
use tracing::{info, warn};

lazy_static! {
    // ── Event counters (increment on each event) ────────────────────────────
    pub static ref LOGINS_COUNTER: CounterVec = register_counter_vec!(
        "api_logins_total",
        "Login attempts by outcome",
        &["status"]
    ).expect("register api_logins_total");

    pub static ref REFRESHES_COUNTER: CounterVec = register_counter_vec!(
        "api_token_refreshes_total",
        "Refresh token exchanges by outcome",
        &["status"]
    ).expect("register api_token_refreshes_total");

    pub static ref TENANT_DENIALS_COUNTER: Counter = register_counter!(
        "api_tenant_denials_total",
        "Company-scoped mutations refused for insufficient role"
    ).expect("register api_tenant_denials_total");

    // ── Business metrics ────────────────────────────────────────────────────
    pub static ref ACTIVE_SESSIONS_GAUGE: Gauge = register_gauge!(
        "marketplace_active_access_tokens",
        "Unexpired access token records"
    ).expect("register marketplace_active_access_tokens");

    pub static ref COMPANIES_GAUGE: Gauge = register_gauge!(
        "marketplace_companies_total",
        "Registered companies"
    ).expect("register marketplace_companies_total");

    pub static ref LIVE_DISCOUNTS_GAUGE: Gauge = register_gauge!(
        "marketplace_live_discounts_total",
        "Discounts whose window contains now"
    ).expect("register marketplace_live_discounts_total");
}

/// Spawn the background metrics collector (refreshes every 5 minutes).
pub fn start(pool: PgPool) {
    tokio::spawn(async move {
        if let Err(e) = collect(&pool).await {
            warn!("Metrics: initial collection failed: {}", e);
        }
        loop {
            tokio::time::sleep(tokio::time::Duration::from_secs(300)).await;
            if let Err(e) = collect(&pool).await {
                warn!("Metrics: collection failed: {}", e);
            }
        }
    });
}

async fn collect(pool: &PgPool) -> anyhow::Result<()> {
    let sessions: i64 =
        sqlx::query_scalar("SELECT COUNT(*)::BIGINT FROM access_tokens WHERE expires_at > NOW()")
            .fetch_one(pool)
            .await?;
    ACTIVE_SESSIONS_GAUGE.set(sessions as f64);

    let companies: i64 = sqlx::query_scalar("SELECT COUNT(*)::BIGINT FROM companies")
        .fetch_one(pool)
        .await?;
    COMPANIES_GAUGE.set(companies as f64);

    let live: i64 = sqlx::query_scalar(
        "SELECT COUNT(*)::BIGINT FROM discounts WHERE starts_at <= NOW() AND ends_at > NOW()",
    )
    .fetch_one(pool)
    .await?;
    LIVE_DISCOUNTS_GAUGE.set(live as f64);

    info!("Metrics: collected ({} sessions, {} companies)", sessions, companies);
    Ok(())
}
