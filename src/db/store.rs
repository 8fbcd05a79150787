//! Store seams consumed by the authorizer.
//!
//! Every piece of cross-request state (token records, roles, attempt counters) lives
//! behind these traits so that workers share nothing but the backing store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::user::{TenantRole, User};

#[derive(Debug, Clone)]
pub struct NewAccessToken {
    pub token_hash: String,
    pub jti: Uuid,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub token_hash: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct RefreshTokenRecord {
    pub token_hash: String,
    pub user_id: i64,
    pub revoked: bool,
    pub replaced_by: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at > now
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeStats {
    pub access_tokens: u64,
    pub refresh_tokens: u64,
}

#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn find_user_by_identifier(&self, identifier: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<User>, StoreError>;

    async fn update_password_hash(&self, user_id: i64, password_hash: &str)
        -> Result<(), StoreError>;

    async fn insert_access_token(&self, token: &NewAccessToken) -> Result<(), StoreError>;

    /// True while the record exists and has not expired.
    async fn access_token_active(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Idempotent.
    async fn delete_access_token(&self, token_hash: &str) -> Result<(), StoreError>;

    async fn insert_refresh_token(&self, token: &NewRefreshToken) -> Result<(), StoreError>;

    async fn find_refresh_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Revoke `old_hash`, activate `replacement` and record `access` as one atomic step.
    ///
    /// The revoke is conditional on the old token still being live; when it is not
    /// (already rotated, revoked or expired) nothing is written and `false` is returned.
    /// Of two concurrent rotations of the same token at most one returns `true`.
    async fn rotate_refresh_token(
        &self,
        old_hash: &str,
        replacement: &NewRefreshToken,
        access: &NewAccessToken,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn revoke_refresh_token(&self, token_hash: &str) -> Result<bool, StoreError>;

    async fn revoke_all_refresh_tokens(&self, user_id: i64) -> Result<u64, StoreError>;

    async fn find_role(
        &self,
        user_id: i64,
        company_id: i64,
    ) -> Result<Option<TenantRole>, StoreError>;

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<PurgeStats, StoreError>;
}

/// Shared attempt counter used for login throttling.
#[async_trait]
pub trait AttemptLimiter: Send + Sync {
    /// Atomically count one attempt against `key` and return the new total.
    /// The first hit opens a window of `window_secs`; later hits do not extend it.
    async fn hit(&self, key: &str, window_secs: u64) -> Result<u64, StoreError>;

    async fn reset(&self, key: &str) -> Result<(), StoreError>;
}
