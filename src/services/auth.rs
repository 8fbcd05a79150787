use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    db::store::{AttemptLimiter, AuthStore, NewAccessToken, NewRefreshToken},
    error::AuthError,
    models::{
        auth::{AuthenticatedUser, TokenPair, CLAIMS_VERSION},
        user::{normalize_identifier, User},
    },
    services::{
        metrics::{LOGINS_COUNTER, REFRESHES_COUNTER, TENANT_DENIALS_COUNTER},
        password::PasswordHasher,
        tokens::TokenIssuer,
    },
};

#[derive(Debug, Clone, Copy)]
pub struct LoginThrottle {
    pub max_attempts: u64,
    pub window_secs: u64,
}

/// Authenticates requests, authorizes company-scoped mutations and owns the
/// access/refresh token lifecycle. All state lives in the injected store and limiter.
pub struct TenantAuthorizer {
    store: Arc<dyn AuthStore>,
    limiter: Arc<dyn AttemptLimiter>,
    tokens: TokenIssuer,
    passwords: PasswordHasher,
    throttle: LoginThrottle,
    // verified against when the identifier is unknown so both failures cost the same
    dummy_hash: String,
}

impl TenantAuthorizer {
    pub fn new(
        store: Arc<dyn AuthStore>,
        limiter: Arc<dyn AttemptLimiter>,
        tokens: TokenIssuer,
        passwords: PasswordHasher,
        throttle: LoginThrottle,
    ) -> Result<Self, AuthError> {
        let dummy_hash = passwords
            .hash("timing-equaliser")
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        Ok(Self {
            store,
            limiter,
            tokens,
            passwords,
            throttle,
            dummy_hash,
        })
    }

    pub fn from_config(
        config: &Config,
        store: Arc<dyn AuthStore>,
        limiter: Arc<dyn AttemptLimiter>,
    ) -> anyhow::Result<Self> {
        let passwords = PasswordHasher::new(
            config.argon2_memory_kib,
            config.argon2_iterations,
            config.argon2_parallelism,
        )
        .map_err(|e| anyhow::anyhow!("Invalid argon2 parameters: {e}"))?;

        let tokens = TokenIssuer::new(
            config.jwt_secret.as_bytes(),
            config.jwt_expiry_seconds,
            config.jwt_refresh_expiry_days,
        );

        let throttle = LoginThrottle {
            max_attempts: config.login_max_attempts,
            window_secs: config.login_window_seconds,
        };

        Ok(Self::new(store, limiter, tokens, passwords, throttle)?)
    }

    /// Exchange credentials for a token pair.
    ///
    /// Every attempt counts against the identifier's throttle before the password is
    /// looked at; a successful login clears the counter.
    pub async fn authorize(&self, identifier: &str, password: &str) -> Result<TokenPair, AuthError> {
        let identifier = normalize_identifier(identifier);
        let rate_key = format!("rate:login:{identifier}");

        let attempts = self
            .limiter
            .hit(&rate_key, self.throttle.window_secs)
            .await?;
        if attempts > self.throttle.max_attempts {
            LOGINS_COUNTER.with_label_values(&["throttled"]).inc();
            warn!(identifier = %identifier, attempts, "login throttled");
            return Err(AuthError::TooManyAttempts);
        }

        let user = self.store.find_user_by_identifier(&identifier).await?;
        let user = match user {
            Some(user) if self.check_password(password, &user.password_hash) => user,
            Some(_) => return Err(self.login_failed(&identifier)),
            None => {
                self.check_password(password, &self.dummy_hash);
                return Err(self.login_failed(&identifier));
            }
        };

        self.limiter.reset(&rate_key).await?;

        let refresh_token = TokenIssuer::new_refresh_token();
        self.store
            .insert_refresh_token(&NewRefreshToken {
                token_hash: TokenIssuer::hash_token(&refresh_token),
                user_id: user.id,
                expires_at: Utc::now() + self.tokens.refresh_ttl(),
            })
            .await?;
        let (token, access) = self.new_access_token(&user)?;
        self.store.insert_access_token(&access).await?;

        LOGINS_COUNTER.with_label_values(&["success"]).inc();
        info!(user_id = user.id, "login succeeded");

        Ok(TokenPair {
            token,
            refresh_token,
            expires_in: self.tokens.access_ttl_secs(),
        })
    }

    /// Rotate a refresh token: the presented token is revoked (pointing at its
    /// replacement) and a new pair is issued. A token can be exchanged at most once.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let now = Utc::now();
        let old_hash = TokenIssuer::hash_token(refresh_token);

        let record = match self.store.find_refresh_token(&old_hash).await? {
            Some(record) if record.is_live(now) => record,
            Some(record) => {
                if record.revoked {
                    warn!(user_id = record.user_id, "revoked refresh token presented again");
                }
                return Err(refresh_failed());
            }
            None => return Err(refresh_failed()),
        };

        let user = self
            .store
            .find_user_by_id(record.user_id)
            .await?
            .ok_or_else(refresh_failed)?;

        let new_refresh = TokenIssuer::new_refresh_token();
        let replacement = NewRefreshToken {
            token_hash: TokenIssuer::hash_token(&new_refresh),
            user_id: user.id,
            expires_at: now + self.tokens.refresh_ttl(),
        };

        let (token, access) = self.new_access_token(&user)?;

        // the access record is written in the same step, so a revoked old token
        // always comes with a usable replacement pair
        if !self
            .store
            .rotate_refresh_token(&old_hash, &replacement, &access, now)
            .await?
        {
            // lost a race against a concurrent exchange of the same token
            warn!(user_id = user.id, "refresh token rotated concurrently");
            return Err(refresh_failed());
        }

        REFRESHES_COUNTER.with_label_values(&["success"]).inc();
        debug!(user_id = user.id, "refresh token rotated");

        Ok(TokenPair {
            token,
            refresh_token: new_refresh,
            expires_in: self.tokens.access_ttl_secs(),
        })
    }

    /// Verify the bearer token's signature and expiry, then require its server-side
    /// record to still exist so that logout takes effect immediately.
    pub async fn authorize_request(&self, bearer: &str) -> Result<AuthenticatedUser, AuthError> {
        let claims = self.tokens.verify_access_token(bearer).map_err(|e| {
            debug!("bearer token rejected: {e}");
            AuthError::Unauthorized
        })?;

        if claims.ver != CLAIMS_VERSION {
            debug!(ver = claims.ver, "bearer token has unsupported claims version");
            return Err(AuthError::Unauthorized);
        }

        let hash = TokenIssuer::hash_token(bearer);
        if !self.store.access_token_active(&hash, Utc::now()).await? {
            debug!(user_id = claims.sub, "bearer token revoked or expired server-side");
            return Err(AuthError::Unauthorized);
        }

        Ok(AuthenticatedUser {
            user_id: claims.sub,
            identifier: claims.idn,
            token_id: claims.jti,
        })
    }

    /// Delete the access token's record and, when given, revoke the session's refresh
    /// token. Idempotent, and works with an access token that has already expired or
    /// been logged out: the refresh token's owner is taken from the bearer's verified
    /// signature alone.
    pub async fn logout(&self, bearer: &str, refresh_token: Option<&str>) -> Result<(), AuthError> {
        self.store
            .delete_access_token(&TokenIssuer::hash_token(bearer))
            .await?;

        let Some(refresh_token) = refresh_token else {
            return Ok(());
        };

        match self.tokens.verify_signature(bearer) {
            Ok(claims) => {
                if !self.revoke_refresh_token(claims.sub, refresh_token).await? {
                    debug!(user_id = claims.sub, "logout: refresh token already gone or not owned");
                }
            }
            Err(e) => debug!("logout: bearer signature rejected, refresh token kept: {e}"),
        }

        Ok(())
    }

    /// Revoke one refresh token, but only if it belongs to `user_id`.
    pub async fn revoke_refresh_token(
        &self,
        user_id: i64,
        refresh_token: &str,
    ) -> Result<bool, AuthError> {
        let hash = TokenIssuer::hash_token(refresh_token);
        match self.store.find_refresh_token(&hash).await? {
            Some(record) if record.user_id == user_id => {
                Ok(self.store.revoke_refresh_token(&hash).await?)
            }
            _ => Ok(false),
        }
    }

    pub async fn revoke_all_refresh_tokens(&self, user_id: i64) -> Result<u64, AuthError> {
        let revoked = self.store.revoke_all_refresh_tokens(user_id).await?;
        info!(user_id, revoked, "revoked all refresh tokens");
        Ok(revoked)
    }

    /// Allow iff the user is Owner or Manager of the company. The role is read fresh
    /// on every call.
    pub async fn authorize_tenant_mutation(
        &self,
        user_id: i64,
        company_id: i64,
    ) -> Result<(), AuthError> {
        match self.store.find_role(user_id, company_id).await? {
            Some(role) if role.can_mutate() => Ok(()),
            role => {
                TENANT_DENIALS_COUNTER.inc();
                info!(user_id, company_id, role = ?role, "tenant mutation denied");
                Err(AuthError::Forbidden)
            }
        }
    }

    /// Verify the current password, store the new hash and revoke every refresh token.
    pub async fn change_password(
        &self,
        user_id: i64,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::Unauthorized)?;

        if !self.check_password(current_password, &user.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }

        let new_hash = self
            .passwords
            .hash(new_password)
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        self.store.update_password_hash(user_id, &new_hash).await?;
        self.revoke_all_refresh_tokens(user_id).await?;

        Ok(())
    }

    fn new_access_token(&self, user: &User) -> Result<(String, NewAccessToken), AuthError> {
        let (token, claims) = self
            .tokens
            .issue_access_token(user.id, &user.identifier)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        let expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0)
            .ok_or_else(|| AuthError::Internal("access token expiry out of range".into()))?;

        let record = NewAccessToken {
            token_hash: TokenIssuer::hash_token(&token),
            jti: claims.jti,
            user_id: user.id,
            expires_at,
        };
        Ok((token, record))
    }

    fn check_password(&self, password: &str, hash: &str) -> bool {
        match self.passwords.verify(password, hash) {
            Ok(valid) => valid,
            Err(e) => {
                warn!("unreadable password hash: {e}");
                false
            }
        }
    }

    fn login_failed(&self, identifier: &str) -> AuthError {
        LOGINS_COUNTER.with_label_values(&["failure"]).inc();
        info!(identifier = %identifier, "login failed");
        AuthError::InvalidCredentials
    }
}

fn refresh_failed() -> AuthError {
    REFRESHES_COUNTER.with_label_values(&["failure"]).inc();
    AuthError::InvalidRefreshToken
}
