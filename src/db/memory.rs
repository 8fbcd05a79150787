//! In-process store used by the unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::store::{
    AttemptLimiter, AuthStore, NewAccessToken, NewRefreshToken, PurgeStats, RefreshTokenRecord,
};
use crate::error::StoreError;
use crate::models::user::{TenantRole, User};

#[derive(Default)]
struct State {
    users: HashMap<i64, User>,
    next_user_id: i64,
    access_tokens: HashMap<String, NewAccessToken>,
    refresh_tokens: HashMap<String, RefreshTokenRecord>,
    roles: HashMap<(i64, i64), TenantRole>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, identifier: &str, password_hash: &str) -> i64 {
        let mut state = self.state.lock().unwrap();
        state.next_user_id += 1;
        let id = state.next_user_id;
        state.users.insert(
            id,
            User {
                id,
                identifier: identifier.to_string(),
                password_hash: password_hash.to_string(),
                display_name: None,
                created_at: Utc::now(),
            },
        );
        id
    }

    pub fn remove_user(&self, user_id: i64) {
        self.state.lock().unwrap().users.remove(&user_id);
    }

    pub fn set_role(&self, user_id: i64, company_id: i64, role: TenantRole) {
        self.state
            .lock()
            .unwrap()
            .roles
            .insert((user_id, company_id), role);
    }

    pub fn refresh_record(&self, token_hash: &str) -> Option<RefreshTokenRecord> {
        self.state
            .lock()
            .unwrap()
            .refresh_tokens
            .get(token_hash)
            .cloned()
    }

    pub fn access_token_count(&self) -> usize {
        self.state.lock().unwrap().access_tokens.len()
    }

    pub fn expire_access_token(&self, token_hash: &str) {
        if let Some(t) = self.state.lock().unwrap().access_tokens.get_mut(token_hash) {
            t.expires_at = Utc::now() - chrono::Duration::seconds(1);
        }
    }

    pub fn expire_refresh_token(&self, token_hash: &str) {
        if let Some(t) = self.state.lock().unwrap().refresh_tokens.get_mut(token_hash) {
            t.expires_at = Utc::now() - chrono::Duration::seconds(1);
        }
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn find_user_by_identifier(&self, identifier: &str) -> Result<Option<User>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .users
            .values()
            .find(|u| u.identifier == identifier)
            .cloned())
    }

    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.state.lock().unwrap().users.get(&user_id).cloned())
    }

    async fn update_password_hash(
        &self,
        user_id: i64,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        if let Some(u) = self.state.lock().unwrap().users.get_mut(&user_id) {
            u.password_hash = password_hash.to_string();
        }
        Ok(())
    }

    async fn insert_access_token(&self, token: &NewAccessToken) -> Result<(), StoreError> {
        self.state
            .lock()
            .unwrap()
            .access_tokens
            .insert(token.token_hash.clone(), token.clone());
        Ok(())
    }

    async fn access_token_active(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .access_tokens
            .get(token_hash)
            .is_some_and(|t| t.expires_at > now))
    }

    async fn delete_access_token(&self, token_hash: &str) -> Result<(), StoreError> {
        self.state.lock().unwrap().access_tokens.remove(token_hash);
        Ok(())
    }

    async fn insert_refresh_token(&self, token: &NewRefreshToken) -> Result<(), StoreError> {
        self.state.lock().unwrap().refresh_tokens.insert(
            token.token_hash.clone(),
            RefreshTokenRecord {
                token_hash: token.token_hash.clone(),
                user_id: token.user_id,
                revoked: false,
                replaced_by: None,
                expires_at: token.expires_at,
            },
        );
        Ok(())
    }

    async fn find_refresh_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        Ok(self.refresh_record(token_hash))
    }

    async fn rotate_refresh_token(
        &self,
        old_hash: &str,
        replacement: &NewRefreshToken,
        access: &NewAccessToken,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        // the whole check-and-swap happens under one lock
        let mut state = self.state.lock().unwrap();
        match state.refresh_tokens.get_mut(old_hash) {
            Some(old) if old.is_live(now) => {
                old.revoked = true;
                old.replaced_by = Some(replacement.token_hash.clone());
            }
            _ => return Ok(false),
        }
        state.refresh_tokens.insert(
            replacement.token_hash.clone(),
            RefreshTokenRecord {
                token_hash: replacement.token_hash.clone(),
                user_id: replacement.user_id,
                revoked: false,
                replaced_by: None,
                expires_at: replacement.expires_at,
            },
        );
        state
            .access_tokens
            .insert(access.token_hash.clone(), access.clone());
        Ok(true)
    }

    async fn revoke_refresh_token(&self, token_hash: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        match state.refresh_tokens.get_mut(token_hash) {
            Some(t) if !t.revoked => {
                t.revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_refresh_tokens(&self, user_id: i64) -> Result<u64, StoreError> {
        let mut state = self.state.lock().unwrap();
        let mut count = 0;
        for t in state.refresh_tokens.values_mut() {
            if t.user_id == user_id && !t.revoked {
                t.revoked = true;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn find_role(
        &self,
        user_id: i64,
        company_id: i64,
    ) -> Result<Option<TenantRole>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .roles
            .get(&(user_id, company_id))
            .copied())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<PurgeStats, StoreError> {
        let mut state = self.state.lock().unwrap();
        let access_before = state.access_tokens.len();
        state.access_tokens.retain(|_, t| t.expires_at > now);
        let refresh_before = state.refresh_tokens.len();
        state.refresh_tokens.retain(|_, t| t.expires_at > now);

        Ok(PurgeStats {
            access_tokens: (access_before - state.access_tokens.len()) as u64,
            refresh_tokens: (refresh_before - state.refresh_tokens.len()) as u64,
        })
    }
}

/// Counter without a real clock: windows never expire on their own.
#[derive(Default)]
pub struct MemoryLimiter {
    counts: Mutex<HashMap<String, u64>>,
}

impl MemoryLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, key: &str) -> u64 {
        self.counts.lock().unwrap().get(key).copied().unwrap_or(0)
    }
}

#[async_trait]
impl AttemptLimiter for MemoryLimiter {
    async fn hit(&self, key: &str, _window_secs: u64) -> Result<u64, StoreError> {
        let mut counts = self.counts.lock().unwrap();
        let count = counts.entry(key.to_string()).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    async fn reset(&self, key: &str) -> Result<(), StoreError> {
        self.counts.lock().unwrap().remove(key);
        Ok(())
    }
}
