use sqlx::PgPool;

use crate::{
    error::AppError,
    models::catalog::{
        CreateDiscountRequest, CreateProductRequest, Discount, Product, UpdateDiscountRequest,
        UpdateProductRequest,
    },
    services::pager::{Page, PageRequest},
};

// Postgres check_violation
const CHECK_VIOLATION: &str = "23514";

pub struct ProductService;

impl ProductService {
    /// One page of a company's products, newest first.
    pub async fn list(
        pool: &PgPool,
        company_id: i64,
        page: &PageRequest,
    ) -> Result<Page<Product>, AppError> {
        let (after_ts, after_id) = page.after_timestamp();
        let rows = sqlx::query_as::<_, Product>(
            "SELECT * FROM products
             WHERE company_id = $1
               AND ($2::timestamptz IS NULL OR (created_at, id) < ($2, $3))
             ORDER BY created_at DESC, id DESC
             LIMIT $4",
        )
        .bind(company_id)
        .bind(after_ts)
        .bind(after_id)
        .bind(page.limit)
        .fetch_all(pool)
        .await?;
        Ok(page.finish(rows))
    }

    pub async fn create(
        pool: &PgPool,
        company_id: i64,
        req: &CreateProductRequest,
    ) -> Result<Product, AppError> {
        let product = sqlx::query_as::<_, Product>(
            "INSERT INTO products (company_id, name, description, price_cents)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(company_id)
        .bind(req.name.trim())
        .bind(&req.description)
        .bind(req.price_cents)
        .fetch_one(pool)
        .await?;
        Ok(product)
    }

    pub async fn update(
        pool: &PgPool,
        company_id: i64,
        id: i64,
        req: &UpdateProductRequest,
    ) -> Result<Product, AppError> {
        let product = sqlx::query_as::<_, Product>(
            "UPDATE products
             SET name = COALESCE($1, name),
                 description = COALESCE($2, description),
                 price_cents = COALESCE($3, price_cents),
                 updated_at = NOW()
             WHERE id = $4 AND company_id = $5
             RETURNING *",
        )
        .bind(req.name.as_deref().map(str::trim))
        .bind(&req.description)
        .bind(req.price_cents)
        .bind(id)
        .bind(company_id)
        .fetch_one(pool)
        .await?;
        Ok(product)
    }

    pub async fn delete(pool: &PgPool, company_id: i64, id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1 AND company_id = $2")
            .bind(id)
            .bind(company_id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}

pub struct DiscountService;

impl DiscountService {
    pub async fn list(
        pool: &PgPool,
        company_id: i64,
        page: &PageRequest,
    ) -> Result<Page<Discount>, AppError> {
        let (after_ts, after_id) = page.after_timestamp();
        let rows = sqlx::query_as::<_, Discount>(
            "SELECT * FROM discounts
             WHERE company_id = $1
               AND ($2::timestamptz IS NULL OR (created_at, id) < ($2, $3))
             ORDER BY created_at DESC, id DESC
             LIMIT $4",
        )
        .bind(company_id)
        .bind(after_ts)
        .bind(after_id)
        .bind(page.limit)
        .fetch_all(pool)
        .await?;
        Ok(page.finish(rows))
    }

    /// Public feed: discounts of every company whose window contains now.
    pub async fn list_active(pool: &PgPool, page: &PageRequest) -> Result<Page<Discount>, AppError> {
        let (after_ts, after_id) = page.after_timestamp();
        let rows = sqlx::query_as::<_, Discount>(
            "SELECT * FROM discounts
             WHERE starts_at <= NOW() AND ends_at > NOW()
               AND ($1::timestamptz IS NULL OR (created_at, id) < ($1, $2))
             ORDER BY created_at DESC, id DESC
             LIMIT $3",
        )
        .bind(after_ts)
        .bind(after_id)
        .bind(page.limit)
        .fetch_all(pool)
        .await?;
        Ok(page.finish(rows))
    }

    pub async fn create(
        pool: &PgPool,
        company_id: i64,
        req: &CreateDiscountRequest,
    ) -> Result<Discount, AppError> {
        if let Some(product_id) = req.product_id {
            let owned: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM products WHERE id = $1 AND company_id = $2)",
            )
            .bind(product_id)
            .bind(company_id)
            .fetch_one(pool)
            .await?;
            if !owned {
                return Err(AppError::BadRequest(
                    "product_id does not belong to this company".into(),
                ));
            }
        }

        let discount = sqlx::query_as::<_, Discount>(
            "INSERT INTO discounts (company_id, product_id, title, percent_off, starts_at, ends_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING *",
        )
        .bind(company_id)
        .bind(req.product_id)
        .bind(req.title.trim())
        .bind(req.percent_off)
        .bind(req.starts_at)
        .bind(req.ends_at)
        .fetch_one(pool)
        .await?;
        Ok(discount)
    }

    pub async fn update(
        pool: &PgPool,
        company_id: i64,
        id: i64,
        req: &UpdateDiscountRequest,
    ) -> Result<Discount, AppError> {
        sqlx::query_as::<_, Discount>(
            "UPDATE discounts
             SET title = COALESCE($1, title),
                 percent_off = COALESCE($2, percent_off),
                 starts_at = COALESCE($3, starts_at),
                 ends_at = COALESCE($4, ends_at),
                 updated_at = NOW()
             WHERE id = $5 AND company_id = $6
             RETURNING *",
        )
        .bind(req.title.as_deref().map(str::trim))
        .bind(req.percent_off)
        .bind(req.starts_at)
        .bind(req.ends_at)
        .bind(id)
        .bind(company_id)
        .fetch_one(pool)
        .await
        .map_err(window_violation)
    }

    pub async fn delete(pool: &PgPool, company_id: i64, id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM discounts WHERE id = $1 AND company_id = $2")
            .bind(id)
            .bind(company_id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}

/// A partial update can move one end of the window past the other; the table
/// constraint catches it and the caller gets a 400 instead of a 500.
fn window_violation(e: sqlx::Error) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(CHECK_VIOLATION) => {
            AppError::BadRequest("ends_at must be after starts_at".into())
        }
        _ => e.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::pager::CursorPager;
    use chrono::{DateTime, Duration, Utc};

    async fn seed_company(pool: &PgPool) -> i64 {
        sqlx::query_scalar("INSERT INTO companies (name) VALUES ('Acme') RETURNING id")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    fn product(name: &str) -> CreateProductRequest {
        CreateProductRequest {
            name: name.into(),
            description: None,
            price_cents: 100,
        }
    }

    fn discount(starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> CreateDiscountRequest {
        CreateDiscountRequest {
            product_id: None,
            title: "Spring sale".into(),
            percent_off: 10,
            starts_at,
            ends_at,
        }
    }

    #[sqlx::test]
    async fn walk_splits_shared_timestamps_and_skips_newer_rows(pool: PgPool) {
        let company = seed_company(&pool).await;
        let created_at: DateTime<Utc> = "2020-01-01T00:00:00Z".parse().unwrap();
        let mut expected = Vec::new();
        for i in 0..7 {
            let id: i64 = sqlx::query_scalar(
                "INSERT INTO products (company_id, name, price_cents, created_at)
                 VALUES ($1, $2, 100, $3) RETURNING id",
            )
            .bind(company)
            .bind(format!("Item {i}"))
            .bind(created_at)
            .fetch_one(&pool)
            .await
            .unwrap();
            expected.push(id);
        }
        expected.sort_unstable_by(|a, b| b.cmp(a));

        let pager = CursorPager::new(3, 500);
        let mut seen = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0;
        loop {
            let page = ProductService::list(&pool, company, &pager.request(None, cursor.as_deref()))
                .await
                .unwrap();
            seen.extend(page.items.iter().map(|p| p.id));
            pages += 1;
            if pages == 1 {
                ProductService::create(&pool, company, &product("Late arrival"))
                    .await
                    .unwrap();
            }
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        assert_eq!(pages, 3);
        assert_eq!(seen, expected);
    }

    #[sqlx::test]
    async fn pages_stay_inside_their_company(pool: PgPool) {
        let acme = seed_company(&pool).await;
        let other = seed_company(&pool).await;
        ProductService::create(&pool, acme, &product("Coffee")).await.unwrap();
        ProductService::create(&pool, other, &product("Tea")).await.unwrap();

        let page = ProductService::list(&pool, acme, &CursorPager::new(10, 10).request(None, None))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].name, "Coffee");
        assert!(page.cursor.is_none());
    }

    #[sqlx::test]
    async fn partial_update_crossing_the_window_is_bad_request(pool: PgPool) {
        let company = seed_company(&pool).await;
        let starts_at = Utc::now();
        let created = DiscountService::create(
            &pool,
            company,
            &discount(starts_at, starts_at + Duration::days(7)),
        )
        .await
        .unwrap();

        let err = DiscountService::update(
            &pool,
            company,
            created.id,
            &UpdateDiscountRequest {
                title: None,
                percent_off: None,
                starts_at: None,
                ends_at: Some(starts_at - Duration::days(1)),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[sqlx::test]
    async fn update_in_another_company_is_not_found(pool: PgPool) {
        let acme = seed_company(&pool).await;
        let other = seed_company(&pool).await;
        let now = Utc::now();
        let created = DiscountService::create(&pool, acme, &discount(now, now + Duration::days(1)))
            .await
            .unwrap();

        let err = DiscountService::update(
            &pool,
            other,
            created.id,
            &UpdateDiscountRequest {
                title: Some("Stolen".into()),
                percent_off: None,
                starts_at: None,
                ends_at: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }

    #[sqlx::test]
    async fn feed_lists_only_running_discounts(pool: PgPool) {
        let company = seed_company(&pool).await;
        let now = Utc::now();
        let running = DiscountService::create(
            &pool,
            company,
            &discount(now - Duration::days(1), now + Duration::days(1)),
        )
        .await
        .unwrap();
        DiscountService::create(
            &pool,
            company,
            &discount(now + Duration::days(1), now + Duration::days(2)),
        )
        .await
        .unwrap();
        DiscountService::create(
            &pool,
            company,
            &discount(now - Duration::days(2), now - Duration::days(1)),
        )
        .await
        .unwrap();

        let page = DiscountService::list_active(&pool, &CursorPager::new(10, 10).request(None, None))
            .await
            .unwrap();
        let ids: Vec<i64> = page.items.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![running.id]);
    }

    #[test]
    fn missing_row_maps_to_not_found() {
        assert!(matches!(
            window_violation(sqlx::Error::RowNotFound),
            AppError::NotFound
        ));
    }
}
