use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::services::pager::{timestamp_key, Watermarked};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: i64,
    pub company_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Watermarked for Product {
    fn watermark(&self) -> (String, i64) {
        (timestamp_key(&self.created_at), self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Discount {
    pub id: i64,
    pub company_id: i64,
    pub product_id: Option<i64>,
    pub title: String,
    pub percent_off: i32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Watermarked for Discount {
    fn watermark(&self) -> (String, i64) {
        (timestamp_key(&self.created_at), self.id)
    }
}

/// Query string accepted by every list endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDiscountRequest {
    pub product_id: Option<i64>,
    pub title: String,
    pub percent_off: i32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDiscountRequest {
    pub title: Option<String>,
    pub percent_off: Option<i32>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

impl CreateProductRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Product name is required".into());
        }
        validate_price(self.price_cents)
    }
}

impl UpdateProductRequest {
    pub fn validate(&self) -> Result<(), String> {
        if matches!(&self.name, Some(n) if n.trim().is_empty()) {
            return Err("Product name cannot be empty".into());
        }
        self.price_cents.map_or(Ok(()), validate_price)
    }
}

impl CreateDiscountRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Discount title is required".into());
        }
        validate_percent(self.percent_off)?;
        validate_window(self.starts_at, self.ends_at)
    }
}

impl UpdateDiscountRequest {
    /// Validates the fields that are present; the window is re-checked against the
    /// merged row by the database constraint.
    pub fn validate(&self) -> Result<(), String> {
        if matches!(&self.title, Some(t) if t.trim().is_empty()) {
            return Err("Discount title cannot be empty".into());
        }
        if let Some(p) = self.percent_off {
            validate_percent(p)?;
        }
        if let (Some(s), Some(e)) = (self.starts_at, self.ends_at) {
            validate_window(s, e)?;
        }
        Ok(())
    }
}

fn validate_price(price_cents: i64) -> Result<(), String> {
    if price_cents < 0 {
        return Err("price_cents must be >= 0".into());
    }
    Ok(())
}

fn validate_percent(percent_off: i32) -> Result<(), String> {
    if !(1..=100).contains(&percent_off) {
        return Err("percent_off must be between 1 and 100".into());
    }
    Ok(())
}

fn validate_window(starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> Result<(), String> {
    if ends_at <= starts_at {
        return Err("ends_at must be after starts_at".into());
    }
    Ok(())
}
