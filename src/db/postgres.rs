use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::db::store::{AuthStore, NewAccessToken, NewRefreshToken, PurgeStats, RefreshTokenRecord};
use crate::error::StoreError;
use crate::models::user::{TenantRole, User};

const USER_COLUMNS: &str = "id, identifier, password_hash, display_name, created_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the user or replace the password of an existing one. Returns the user id.
    pub async fn upsert_user(
        &self,
        identifier: &str,
        password_hash: &str,
        display_name: Option<&str>,
    ) -> Result<i64, StoreError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO users (identifier, password_hash, display_name)
             VALUES ($1, $2, $3)
             ON CONFLICT (identifier)
             DO UPDATE SET password_hash = EXCLUDED.password_hash,
                           display_name = COALESCE(EXCLUDED.display_name, users.display_name)
             RETURNING id",
        )
        .bind(identifier)
        .bind(password_hash)
        .bind(display_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn grant_role(
        &self,
        user_id: i64,
        company_id: i64,
        role: TenantRole,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO company_roles (user_id, company_id, role)
             VALUES ($1, $2, $3)
             ON CONFLICT (user_id, company_id) DO UPDATE SET role = EXCLUDED.role",
        )
        .bind(user_id)
        .bind(company_id)
        .bind(role.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AuthStore for PgStore {
    async fn find_user_by_identifier(&self, identifier: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE identifier = $1"
        ))
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn update_password_hash(
        &self,
        user_id: i64,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_access_token(&self, token: &NewAccessToken) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO access_tokens (token_hash, jti, user_id, expires_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&token.token_hash)
        .bind(token.jti)
        .bind(token.user_id)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn access_token_active(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let active: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM access_tokens WHERE token_hash = $1 AND expires_at > $2)",
        )
        .bind(token_hash)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(active)
    }

    async fn delete_access_token(&self, token_hash: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM access_tokens WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_refresh_token(&self, token: &NewRefreshToken) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO refresh_tokens (token_hash, user_id, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(&token.token_hash)
        .bind(token.user_id)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_refresh_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            "SELECT token_hash, user_id, revoked, replaced_by, expires_at
             FROM refresh_tokens WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn rotate_refresh_token(
        &self,
        old_hash: &str,
        replacement: &NewRefreshToken,
        access: &NewAccessToken,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO refresh_tokens (token_hash, user_id, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(&replacement.token_hash)
        .bind(replacement.user_id)
        .bind(replacement.expires_at)
        .execute(&mut *tx)
        .await?;

        // The row lock taken here serialises concurrent rotations of the same token;
        // the loser re-reads revoked = TRUE and matches nothing.
        let revoked = sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE, replaced_by = $1
             WHERE token_hash = $2 AND revoked = FALSE AND expires_at > $3",
        )
        .bind(&replacement.token_hash)
        .bind(old_hash)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if revoked.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO access_tokens (token_hash, jti, user_id, expires_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&access.token_hash)
        .bind(access.jti)
        .bind(access.user_id)
        .bind(access.expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn revoke_refresh_token(&self, token_hash: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE WHERE token_hash = $1 AND revoked = FALSE",
        )
        .bind(token_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_refresh_tokens(&self, user_id: i64) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = $1 AND revoked = FALSE",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn find_role(
        &self,
        user_id: i64,
        company_id: i64,
    ) -> Result<Option<TenantRole>, StoreError> {
        let role: Option<String> = sqlx::query_scalar(
            "SELECT role FROM company_roles WHERE user_id = $1 AND company_id = $2",
        )
        .bind(user_id)
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(role.and_then(|r| match r.parse() {
            Ok(role) => Some(role),
            Err(e) => {
                tracing::warn!(user_id, company_id, "ignoring stored role: {e}");
                None
            }
        }))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<PurgeStats, StoreError> {
        let access = sqlx::query("DELETE FROM access_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        let refresh = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(PurgeStats {
            access_tokens: access.rows_affected(),
            refresh_tokens: refresh.rows_affected(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::tokens::TokenIssuer;
    use chrono::Duration;
    use uuid::Uuid;

    async fn seed_user(store: &PgStore) -> i64 {
        store
            .upsert_user("alice@example.com", "$argon2id$unused", None)
            .await
            .unwrap()
    }

    fn refresh_token(seed: &str, user_id: i64, ttl: Duration) -> NewRefreshToken {
        NewRefreshToken {
            token_hash: TokenIssuer::hash_token(seed),
            user_id,
            expires_at: Utc::now() + ttl,
        }
    }

    fn access_token(seed: &str, user_id: i64) -> NewAccessToken {
        NewAccessToken {
            token_hash: TokenIssuer::hash_token(seed),
            jti: Uuid::new_v4(),
            user_id,
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    async fn count(pool: &PgPool, sql: &str) -> i64 {
        sqlx::query_scalar(sql).fetch_one(pool).await.unwrap()
    }

    #[sqlx::test]
    async fn concurrent_rotation_has_one_winner(pool: PgPool) {
        let store = PgStore::new(pool.clone());
        let user = seed_user(&store).await;
        store
            .insert_refresh_token(&refresh_token("old", user, Duration::days(1)))
            .await
            .unwrap();

        let old = TokenIssuer::hash_token("old");
        let now = Utc::now();
        let (a_new, a_access) = (
            refresh_token("a", user, Duration::days(14)),
            access_token("a-access", user),
        );
        let (b_new, b_access) = (
            refresh_token("b", user, Duration::days(14)),
            access_token("b-access", user),
        );

        let (a, b) = tokio::join!(
            store.rotate_refresh_token(&old, &a_new, &a_access, now),
            store.rotate_refresh_token(&old, &b_new, &b_access, now),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(a ^ b, "exactly one rotation must win (a={a}, b={b})");

        // the loser's replacement and access record were rolled back
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM refresh_tokens").await, 2);
        assert_eq!(
            count(&pool, "SELECT COUNT(*) FROM refresh_tokens WHERE revoked = FALSE").await,
            1
        );
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM access_tokens").await, 1);

        let winner = if a { &a_new } else { &b_new };
        let old_record = store.find_refresh_token(&old).await.unwrap().unwrap();
        assert!(old_record.revoked);
        assert_eq!(
            old_record.replaced_by.as_deref(),
            Some(winner.token_hash.as_str())
        );
    }

    #[sqlx::test]
    async fn expired_or_spent_token_is_not_rotated(pool: PgPool) {
        let store = PgStore::new(pool.clone());
        let user = seed_user(&store).await;
        store
            .insert_refresh_token(&refresh_token("stale", user, Duration::seconds(-1)))
            .await
            .unwrap();

        let rotated = store
            .rotate_refresh_token(
                &TokenIssuer::hash_token("stale"),
                &refresh_token("next", user, Duration::days(14)),
                &access_token("next-access", user),
                Utc::now(),
            )
            .await
            .unwrap();
        assert!(!rotated);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM refresh_tokens").await, 1);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM access_tokens").await, 0);
    }

    #[sqlx::test]
    async fn access_token_lifecycle(pool: PgPool) {
        let store = PgStore::new(pool);
        let user = seed_user(&store).await;
        let token = access_token("session", user);
        store.insert_access_token(&token).await.unwrap();

        let now = Utc::now();
        assert!(store.access_token_active(&token.token_hash, now).await.unwrap());
        assert!(!store
            .access_token_active(&token.token_hash, now + Duration::hours(2))
            .await
            .unwrap());

        store.delete_access_token(&token.token_hash).await.unwrap();
        store.delete_access_token(&token.token_hash).await.unwrap();
        assert!(!store.access_token_active(&token.token_hash, now).await.unwrap());
    }

    #[sqlx::test]
    async fn roles_are_read_per_company(pool: PgPool) {
        let store = PgStore::new(pool.clone());
        let user = seed_user(&store).await;
        let company: i64 =
            sqlx::query_scalar("INSERT INTO companies (name) VALUES ('Acme') RETURNING id")
                .fetch_one(&pool)
                .await
                .unwrap();

        assert_eq!(store.find_role(user, company).await.unwrap(), None);
        store.grant_role(user, company, TenantRole::Staff).await.unwrap();
        assert_eq!(
            store.find_role(user, company).await.unwrap(),
            Some(TenantRole::Staff)
        );
        store.grant_role(user, company, TenantRole::Manager).await.unwrap();
        assert_eq!(
            store.find_role(user, company).await.unwrap(),
            Some(TenantRole::Manager)
        );
        assert_eq!(store.find_role(user, company + 1).await.unwrap(), None);
    }
}
