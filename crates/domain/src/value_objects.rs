use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 集群的重试簿记，是本服务唯一写入的共享可变状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RetryState {
    pub retry_count: u32,
    pub last_retry_time: Option<DateTime<Utc>>,
}

impl RetryState {
    /// 记录一次新的尝试
    ///
    /// `retry_count` 只增不减；`last_retry_time` 不会早于已记录的值，
    /// 即使调用方的时钟发生回拨。
    pub fn advance(&self, now: DateTime<Utc>) -> Self {
        let last_retry_time = match self.last_retry_time {
            Some(previous) if previous > now => previous,
            _ => now,
        };

        Self {
            retry_count: self.retry_count.saturating_add(1),
            last_retry_time: Some(last_retry_time),
        }
    }
}
