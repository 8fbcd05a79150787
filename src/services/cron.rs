/// Token record retention.
///
/// Access token and refresh token rows are useless once expired: authorization
/// already refuses them. They are hard-deleted on a fixed interval by the API
/// process, and on demand by the `purge-tokens` binary.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::db::store::{AuthStore, PurgeStats};
use crate::error::StoreError;

pub struct CronService;

impl CronService {
    /// Delete every expired access token and refresh token record.
    pub async fn purge_expired_tokens(store: &dyn AuthStore) -> Result<PurgeStats, StoreError> {
        let stats = store.purge_expired(Utc::now()).await?;

        if stats.access_tokens > 0 || stats.refresh_tokens > 0 {
            tracing::info!(
                "Purged {} expired access tokens and {} expired refresh tokens",
                stats.access_tokens,
                stats.refresh_tokens
            );
        }

        Ok(stats)
    }

    /// Run the purge every `every`, forever. Failures are logged and retried on the next tick.
    pub fn spawn_token_purge(store: Arc<dyn AuthStore>, every: Duration) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                if let Err(e) = Self::purge_expired_tokens(store.as_ref()).await {
                    tracing::warn!("Token purge failed: {}", e);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::db::store::{NewAccessToken, NewRefreshToken};
    use chrono::Duration as ChronoDuration;
    use uuid::Uuid;

    #[tokio::test]
    async fn purges_only_expired_records() {
        let store = MemoryStore::new();
        let now = Utc::now();

        for (hash, expires_at) in [
            ("a-live", now + ChronoDuration::hours(1)),
            ("a-dead", now - ChronoDuration::hours(1)),
        ] {
            store
                .insert_access_token(&NewAccessToken {
                    token_hash: hash.into(),
                    jti: Uuid::new_v4(),
                    user_id: 1,
                    expires_at,
                })
                .await
                .unwrap();
        }
        store
            .insert_refresh_token(&NewRefreshToken {
                token_hash: "r-dead".into(),
                user_id: 1,
                expires_at: now - ChronoDuration::days(1),
            })
            .await
            .unwrap();

        let stats = CronService::purge_expired_tokens(&store).await.unwrap();
        assert_eq!(
            stats,
            PurgeStats {
                access_tokens: 1,
                refresh_tokens: 1
            }
        );
        assert_eq!(store.access_token_count(), 1);

        let again = CronService::purge_expired_tokens(&store).await.unwrap();
        assert_eq!(again, PurgeStats::default());
    }
}
