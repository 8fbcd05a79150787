pub mod auth;
pub mod catalog;
pub mod cron;
pub mod metrics;
pub mod pager;
pub mod password;
pub mod tokens;
