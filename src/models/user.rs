use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A user's role within one company.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TenantRole {
    Owner,
    Manager,
    Staff,
    Viewer,
}

impl TenantRole {
    /// Only owners and managers may create, update or delete company-scoped resources.
    pub fn can_mutate(self) -> bool {
        matches!(self, TenantRole::Owner | TenantRole::Manager)
    }
}

impl std::fmt::Display for TenantRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TenantRole::Owner => "owner",
            TenantRole::Manager => "manager",
            TenantRole::Staff => "staff",
            TenantRole::Viewer => "viewer",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TenantRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(TenantRole::Owner),
            "manager" => Ok(TenantRole::Manager),
            "staff" => Ok(TenantRole::Staff),
            "viewer" => Ok(TenantRole::Viewer),
            _ => Err(anyhow::anyhow!("Unknown role: {s}")),
        }
    }
}

/// DB row struct.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub identifier: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Normalise a login identifier before lookup or throttling.
pub fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

// Request/Response DTOs
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}
