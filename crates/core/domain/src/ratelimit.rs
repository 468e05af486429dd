//! 滑动窗口限流算法（纯数据结构，存储实现负责原子性）。

use std::collections::VecDeque;

/// 单个动作的限流策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_attempts: u32,
    pub window_ms: i64,
    pub block_ms: i64,
}

impl RateLimitPolicy {
    pub const fn new(max_attempts: u32, window_ms: i64, block_ms: i64) -> Self {
        Self {
            max_attempts,
            window_ms,
            block_ms,
        }
    }
}

/// 一次限流判定。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining_attempts: u32,
    pub blocked_until_ms: Option<i64>,
    /// 存储不可用时由服务层按动作的失败模式合成。
    pub degraded: bool,
}

impl RateLimitDecision {
    pub fn retry_after_ms(&self, now_ms: i64) -> Option<i64> {
        self.blocked_until_ms
            .map(|until| (until - now_ms).max(0))
            .filter(|_| !self.allowed)
    }
}

/// 单个 `(subject, action)` 键的窗口状态。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitWindow {
    /// 窗口内的尝试时间戳（升序）。
    pub attempts: VecDeque<i64>,
    pub blocked_until_ms: Option<i64>,
}

impl RateLimitWindow {
    /// 检查并记录一次尝试。
    ///
    /// 封禁期内直接拒绝且不延长封禁；封禁到期后清空日志重新计数。
    /// 窗口内已达上限时设置 `blocked_until = now + block_ms` 并拒绝，本次不计入日志。
    pub fn check_and_record(&mut self, policy: &RateLimitPolicy, now_ms: i64) -> RateLimitDecision {
        if let Some(until) = self.blocked_until_ms {
            if now_ms < until {
                return RateLimitDecision {
                    allowed: false,
                    remaining_attempts: 0,
                    blocked_until_ms: Some(until),
                    degraded: false,
                };
            }
            self.blocked_until_ms = None;
            self.attempts.clear();
        }

        self.prune(policy, now_ms);

        if self.attempts.len() as u32 >= policy.max_attempts {
            let until = now_ms + policy.block_ms;
            self.blocked_until_ms = Some(until);
            return RateLimitDecision {
                allowed: false,
                remaining_attempts: 0,
                blocked_until_ms: Some(until),
                degraded: false,
            };
        }

        self.attempts.push_back(now_ms);
        RateLimitDecision {
            allowed: true,
            remaining_attempts: policy.max_attempts - self.attempts.len() as u32,
            blocked_until_ms: None,
            degraded: false,
        }
    }

    /// 只读查询当前状态，不记录尝试。
    pub fn peek(&self, policy: &RateLimitPolicy, now_ms: i64) -> RateLimitDecision {
        if let Some(until) = self.blocked_until_ms.filter(|until| now_ms < *until) {
            return RateLimitDecision {
                allowed: false,
                remaining_attempts: 0,
                blocked_until_ms: Some(until),
                degraded: false,
            };
        }
        let window_start = now_ms - policy.window_ms;
        let recent = if self.blocked_until_ms.is_some() {
            0
        } else {
            self.attempts.iter().filter(|ts| **ts > window_start).count() as u32
        };
        RateLimitDecision {
            allowed: recent < policy.max_attempts,
            remaining_attempts: policy.max_attempts.saturating_sub(recent),
            blocked_until_ms: None,
            degraded: false,
        }
    }

    /// 窗口已空且未封禁，可以回收。
    pub fn is_idle(&self, policy: &RateLimitPolicy, now_ms: i64) -> bool {
        let blocked = self.blocked_until_ms.is_some_and(|until| now_ms < until);
        let window_start = now_ms - policy.window_ms;
        !blocked && self.attempts.iter().all(|ts| *ts <= window_start)
    }

    fn prune(&mut self, policy: &RateLimitPolicy, now_ms: i64) {
        let window_start = now_ms - policy.window_ms;
        while self.attempts.front().is_some_and(|ts| *ts <= window_start) {
            self.attempts.pop_front();
        }
    }
}
