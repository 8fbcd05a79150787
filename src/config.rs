use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub jwt_expiry_seconds: u64,
    pub jwt_refresh_expiry_days: u64,
    pub login_max_attempts: u64,
    pub login_window_seconds: u64,
    pub page_default_limit: i64,
    pub page_max_limit: i64,
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub argon2_parallelism: u32,
    pub token_purge_interval_seconds: u64,
    pub host: String,
    pub port: u16,
    pub app_base_url: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
            jwt_secret: required("JWT_SECRET")?,
            jwt_expiry_seconds: parsed("JWT_EXPIRY_SECONDS", "3600")?,
            jwt_refresh_expiry_days: parsed("JWT_REFRESH_EXPIRY_DAYS", "14")?,
            login_max_attempts: parsed("LOGIN_MAX_ATTEMPTS", "5")?,
            login_window_seconds: parsed("LOGIN_WINDOW_SECONDS", "900")?,
            page_default_limit: parsed("PAGE_DEFAULT_LIMIT", "50")?,
            page_max_limit: parsed("PAGE_MAX_LIMIT", "500")?,
            argon2_memory_kib: parsed("ARGON2_MEMORY_KIB", "19456")?,
            argon2_iterations: parsed("ARGON2_ITERATIONS", "2")?,
            argon2_parallelism: parsed("ARGON2_PARALLELISM", "1")?,
            token_purge_interval_seconds: parsed("TOKEN_PURGE_INTERVAL_SECONDS", "3600")?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: parsed("PORT", "8080")?,
            app_base_url: env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost".into()),
        })
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required env var: {}", key))
}

fn parsed<T>(key: &str, default: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env::var(key).unwrap_or_else(|_| default.into());
    raw.parse()
        .map_err(|e| anyhow::anyhow!("Invalid value for {}: {} ({})", key, raw, e))
}
