use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CLAIMS_VERSION: u8 = 1;

/// Claims embedded in the JWT access token.
///
/// The layout is fixed and versioned; tokens carrying any other `ver` are rejected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub ver: u8,
    pub sub: i64,     // user id
    pub idn: String,  // login identifier
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
}

/// Extracted from a verified, non-revoked access token. Available as an Axum extractor.
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    pub identifier: String,
    pub token_id: Uuid,
}

/// Body returned by login and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}
