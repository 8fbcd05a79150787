pub mod auth;
pub mod discounts;
pub mod health;
pub mod metrics;
pub mod products;
