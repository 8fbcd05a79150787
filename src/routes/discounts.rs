use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppError,
    models::{
        auth::AuthenticatedUser,
        catalog::{CreateDiscountRequest, Discount, ListQuery, UpdateDiscountRequest},
    },
    services::{catalog::DiscountService, pager::Page},
    AppState,
};

pub async fn list_discounts(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(company_id): Path<i64>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<Discount>>, AppError> {
    let page = state.pager.request(query.limit, query.cursor.as_deref());
    let discounts = DiscountService::list(&state.db, company_id, &page).await?;
    Ok(Json(discounts))
}

/// GET /feed/discounts: public, no bearer token required.
pub async fn discount_feed(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<Discount>>, AppError> {
    let page = state.pager.request(query.limit, query.cursor.as_deref());
    let discounts = DiscountService::list_active(&state.db, &page).await?;
    Ok(Json(discounts))
}

pub async fn create_discount(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(company_id): Path<i64>,
    Json(body): Json<CreateDiscountRequest>,
) -> Result<(StatusCode, Json<Discount>), AppError> {
    state
        .authorizer
        .authorize_tenant_mutation(user.user_id, company_id)
        .await?;
    body.validate().map_err(AppError::BadRequest)?;

    let discount = DiscountService::create(&state.db, company_id, &body).await?;
    tracing::info!(user_id = user.user_id, company_id, discount_id = discount.id, "discount created");
    Ok((StatusCode::CREATED, Json(discount)))
}

pub async fn update_discount(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((company_id, discount_id)): Path<(i64, i64)>,
    Json(body): Json<UpdateDiscountRequest>,
) -> Result<Json<Discount>, AppError> {
    state
        .authorizer
        .authorize_tenant_mutation(user.user_id, company_id)
        .await?;
    body.validate().map_err(AppError::BadRequest)?;

    let discount = DiscountService::update(&state.db, company_id, discount_id, &body).await?;
    Ok(Json(discount))
}

pub async fn delete_discount(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((company_id, discount_id)): Path<(i64, i64)>,
) -> Result<StatusCode, AppError> {
    state
        .authorizer
        .authorize_tenant_mutation(user.user_id, company_id)
        .await?;

    DiscountService::delete(&state.db, company_id, discount_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
