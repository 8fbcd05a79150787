//! Opaque cursor pagination over `(ordering_key DESC, id DESC)` result sets.
//!
//! A cursor is the URL-safe, unpadded base64 encoding of `"<key>|<id>"` taken from the
//! last row of a full page. The next page is every row strictly below that watermark,
//! so rows inserted above it after the first page never show up and rows sharing a
//! key are split deterministically by id.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// Rows that can be paged expose their `(ordering_key, id)` pair.
pub trait Watermarked {
    fn watermark(&self) -> (String, i64);
}

/// Position of the last row already returned. Ordered lexicographically by key then id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Watermark {
    pub key: String,
    pub id: i64,
}

impl Watermark {
    /// Interpret the key as a timestamp watermark. `None` if the key is not one.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.key)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }
}

/// Render a timestamp ordering key with fixed precision so string order matches time order.
pub fn timestamp_key(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Debug, Clone, Copy)]
pub struct CursorPager {
    default_limit: i64,
    max_limit: i64,
}

impl CursorPager {
    pub fn new(default_limit: i64, max_limit: i64) -> Self {
        let max_limit = max_limit.max(1);
        Self {
            default_limit: default_limit.clamp(1, max_limit),
            max_limit,
        }
    }

    pub fn encode(key: &str, id: i64) -> String {
        URL_SAFE_NO_PAD.encode(format!("{key}|{id}"))
    }

    /// Never fails loudly: anything the encoder could not have produced yields `None`.
    pub fn decode(cursor: &str) -> Option<Watermark> {
        let bytes = URL_SAFE_NO_PAD.decode(cursor).ok()?;
        let text = String::from_utf8(bytes).ok()?;
        // keys may contain '|', the id never does
        let (key, id) = text.rsplit_once('|')?;
        if key.is_empty() {
            return None;
        }
        let id = id.parse().ok()?;
        Some(Watermark {
            key: key.to_string(),
            id,
        })
    }

    /// Missing limit falls back to the default; anything else is clamped into `1..=max`.
    pub fn clamp_limit(&self, requested: Option<i64>) -> i64 {
        match requested {
            None => self.default_limit,
            Some(n) => n.clamp(1, self.max_limit),
        }
    }

    pub fn request(&self, limit: Option<i64>, cursor: Option<&str>) -> PageRequest {
        let after = cursor.filter(|c| !c.is_empty()).and_then(|c| {
            let decoded = Self::decode(c);
            if decoded.is_none() {
                tracing::debug!("ignoring malformed cursor, restarting from first page");
            }
            decoded
        });

        PageRequest {
            limit: self.clamp_limit(limit),
            after,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageRequest {
    pub limit: i64,
    pub after: Option<Watermark>,
}

impl PageRequest {
    /// Watermark bound for timestamp-ordered tables. A cursor whose key is not a
    /// timestamp is treated like no cursor at all.
    pub fn after_timestamp(&self) -> (Option<DateTime<Utc>>, i64) {
        match self.after.as_ref().and_then(|w| w.timestamp().map(|ts| (ts, w.id))) {
            Some((ts, id)) => (Some(ts), id),
            None => (None, 0),
        }
    }

    /// Build the page; a next cursor is only emitted when the page came back full.
    pub fn finish<T: Watermarked>(&self, mut rows: Vec<T>) -> Page<T> {
        let limit = self.limit.max(1) as usize;
        rows.truncate(limit);

        let cursor = if rows.len() == limit {
            rows.last().map(|row| {
                let (key, id) = row.watermark();
                CursorPager::encode(&key, id)
            })
        } else {
            None
        };

        Page {
            items: rows,
            cursor,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub cursor: Option<String>,
    pub limit: i64,
}
