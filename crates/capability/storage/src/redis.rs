//! Redis 限流窗口实现
//!
//! 每个键对应两个 Redis 键：
//! - `gate:ratelimit:{key}:log`：ZSET，score 为尝试时间（毫秒）
//! - `gate:ratelimit:{key}:block`：封禁截止时间（毫秒）
//!
//! 检查与记录在一个 Lua 脚本内完成，多实例共享同一份窗口时仍保持原子性。

use crate::error::StorageError;
use crate::traits::RateLimitStore;
use domain::{RateLimitDecision, RateLimitPolicy};

const CHECK_AND_RECORD_SCRIPT: &str = r#"
local log = KEYS[1]
local block = KEYS[2]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local max = tonumber(ARGV[3])
local block_ms = tonumber(ARGV[4])
local member = ARGV[5]
local blocked_until = redis.call('GET', block)
if blocked_until then
  blocked_until = tonumber(blocked_until)
  if now < blocked_until then
    return {0, 0, blocked_until}
  end
  redis.call('DEL', block, log)
end
redis.call('ZREMRANGEBYSCORE', log, '-inf', now - window)
local count = redis.call('ZCARD', log)
if count >= max then
  local until_ms = now + block_ms
  redis.call('SET', block, until_ms, 'PX', block_ms + window)
  return {0, 0, until_ms}
end
redis.call('ZADD', log, now, member)
redis.call('PEXPIRE', log, window)
return {1, max - count - 1, -1}
"#;

const PEEK_SCRIPT: &str = r#"
local log = KEYS[1]
local block = KEYS[2]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local max = tonumber(ARGV[3])
local blocked_until = redis.call('GET', block)
if blocked_until then
  blocked_until = tonumber(blocked_until)
  if now < blocked_until then
    return {0, 0, blocked_until}
  end
  return {1, max, -1}
end
local count = redis.call('ZCOUNT', log, '(' .. (now - window), '+inf')
local remaining = max - count
if remaining < 0 then
  remaining = 0
end
if count < max then
  return {1, remaining, -1}
end
return {0, remaining, -1}
"#;

fn log_key(key: &str) -> String {
    format!("gate:ratelimit:{key}:log")
}

fn block_key(key: &str) -> String {
    format!("gate:ratelimit:{key}:block")
}

fn decision_from_reply(reply: &[i64]) -> Result<RateLimitDecision, StorageError> {
    let [allowed, remaining, blocked_until] = reply else {
        return Err(StorageError::new("unexpected rate limit script reply"));
    };
    Ok(RateLimitDecision {
        allowed: *allowed == 1,
        remaining_attempts: (*remaining).max(0) as u32,
        blocked_until_ms: (*blocked_until >= 0).then_some(*blocked_until),
        degraded: false,
    })
}

/// Redis 限流窗口存储
pub struct RedisRateLimitStore {
    client: redis::Client,
    check_script: redis::Script,
    peek_script: redis::Script,
}

impl RedisRateLimitStore {
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            check_script: redis::Script::new(CHECK_AND_RECORD_SCRIPT),
            peek_script: redis::Script::new(PEEK_SCRIPT),
        }
    }

    pub fn connect(redis_url: &str) -> Result<Self, StorageError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self::new(client))
    }
}

#[async_trait::async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn check_and_record(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
        now_ms: i64,
    ) -> Result<RateLimitDecision, StorageError> {
        let mut connection = self.client.get_multiplexed_tokio_connection().await?;
        let member = format!("{now_ms}-{}", uuid::Uuid::new_v4());
        let reply: Vec<i64> = self
            .check_script
            .key(log_key(key))
            .key(block_key(key))
            .arg(now_ms)
            .arg(policy.window_ms)
            .arg(policy.max_attempts)
            .arg(policy.block_ms)
            .arg(member)
            .invoke_async(&mut connection)
            .await?;
        decision_from_reply(&reply)
    }

    async fn peek(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
        now_ms: i64,
    ) -> Result<RateLimitDecision, StorageError> {
        let mut connection = self.client.get_multiplexed_tokio_connection().await?;
        let reply: Vec<i64> = self
            .peek_script
            .key(log_key(key))
            .key(block_key(key))
            .arg(now_ms)
            .arg(policy.window_ms)
            .arg(policy.max_attempts)
            .invoke_async(&mut connection)
            .await?;
        decision_from_reply(&reply)
    }

    async fn reset(&self, key: &str) -> Result<bool, StorageError> {
        let mut connection = self.client.get_multiplexed_tokio_connection().await?;
        let removed: i64 = redis::cmd("DEL")
            .arg(log_key(key))
            .arg(block_key(key))
            .query_async(&mut connection)
            .await?;
        Ok(removed > 0)
    }
}
