use async_trait::async_trait;

use crate::db::store::AttemptLimiter;
use crate::error::StoreError;

// INCR and the TTL check run as one server-side step, so a counter can never be
// left without an expiry. A key that somehow lost its TTL gets one on the next hit.
const HIT_SCRIPT: &str = r"
local count = redis.call('INCR', KEYS[1])
if redis.call('TTL', KEYS[1]) < 0 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return count
";

/// Attempt counter shared through Redis so every worker sees the same totals.
///
/// - Increments a counter for `key`
/// - Sets the TTL to `window_secs` only when the key has none, so retries don't slide the window
/// - Redis failures propagate; a broken cache never lets an attempt through uncounted
#[derive(Clone)]
pub struct RedisAttemptLimiter {
    conn: redis::aio::MultiplexedConnection,
    hit: redis::Script,
}

impl RedisAttemptLimiter {
    pub fn new(conn: redis::aio::MultiplexedConnection) -> Self {
        Self {
            conn,
            hit: redis::Script::new(HIT_SCRIPT),
        }
    }
}

#[async_trait]
impl AttemptLimiter for RedisAttemptLimiter {
    async fn hit(&self, key: &str, window_secs: u64) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let count: u64 = self
            .hit
            .key(key)
            .arg(window_secs)
            .invoke_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn reset(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }
}
