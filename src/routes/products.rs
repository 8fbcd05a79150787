use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppError,
    models::{
        auth::AuthenticatedUser,
        catalog::{CreateProductRequest, ListQuery, Product, UpdateProductRequest},
    },
    services::{catalog::ProductService, pager::Page},
    AppState,
};

pub async fn list_products(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(company_id): Path<i64>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<Product>>, AppError> {
    let page = state.pager.request(query.limit, query.cursor.as_deref());
    let products = ProductService::list(&state.db, company_id, &page).await?;
    Ok(Json(products))
}

pub async fn create_product(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(company_id): Path<i64>,
    Json(body): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    state
        .authorizer
        .authorize_tenant_mutation(user.user_id, company_id)
        .await?;
    body.validate().map_err(AppError::BadRequest)?;

    let product = ProductService::create(&state.db, company_id, &body).await?;
    tracing::info!(user_id = user.user_id, company_id, product_id = product.id, "product created");
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update_product(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((company_id, product_id)): Path<(i64, i64)>,
    Json(body): Json<UpdateProductRequest>,
) -> Result<Json<Product>, AppError> {
    state
        .authorizer
        .authorize_tenant_mutation(user.user_id, company_id)
        .await?;
    body.validate().map_err(AppError::BadRequest)?;

    let product = ProductService::update(&state.db, company_id, product_id, &body).await?;
    Ok(Json(product))
}

pub async fn delete_product(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((company_id, product_id)): Path<(i64, i64)>,
) -> Result<StatusCode, AppError> {
    state
        .authorizer
        .authorize_tenant_mutation(user.user_id, company_id)
        .await?;

    ProductService::delete(&state.db, company_id, product_id).await?;
    tracing::info!(user_id = user.user_id, company_id, product_id, "product deleted");
    Ok(StatusCode::NO_CONTENT)
}
