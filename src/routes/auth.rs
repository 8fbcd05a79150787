use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::{
    error::AppError,
    middleware::auth::BearerToken,
    models::{
        auth::{AuthenticatedUser, TokenPair},
        user::{ChangePasswordRequest, LoginRequest, LogoutRequest, RefreshTokenRequest},
    },
    AppState,
};

const MIN_PASSWORD_LEN: usize = 8;

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<TokenPair>, AppError> {
    let pair = state
        .authorizer
        .authorize(&body.identifier, &body.password)
        .await?;
    Ok(Json(pair))
}

pub async fn refresh_token(
    State(state): State<AppState>,
    Json(body): Json<RefreshTokenRequest>,
) -> Result<Json<TokenPair>, AppError> {
    let pair = state.authorizer.refresh(&body.refresh_token).await?;
    Ok(Json(pair))
}

/// Ends the session of the presented bearer token. Always succeeds once a bearer
/// is presented, even if it already expired or was logged out. The body may carry
/// the session's refresh token so it cannot be exchanged afterwards.
pub async fn logout(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    body: Option<Json<LogoutRequest>>,
) -> Result<Json<Value>, AppError> {
    let refresh_token = body.and_then(|Json(b)| b.refresh_token);
    state
        .authorizer
        .logout(&token, refresh_token.as_deref())
        .await?;

    Ok(Json(json!({ "message": "Logged out" })))
}

pub async fn me(user: AuthenticatedUser) -> Json<AuthenticatedUser> {
    Json(user)
}

pub async fn change_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<Json<Value>, AppError> {
    if body.new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "new_password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    state
        .authorizer
        .change_password(user.user_id, &body.current_password, &body.new_password)
        .await?;

    Ok(Json(json!({ "message": "Password changed" })))
}

pub async fn revoke_sessions(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Value>, AppError> {
    let revoked = state
        .authorizer
        .revoke_all_refresh_tokens(user.user_id)
        .await?;
    Ok(Json(json!({ "revoked": revoked })))
}
