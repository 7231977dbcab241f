use chrono::{DateTime, Utc};

use courier_domain::DeliveryCluster;

use crate::settings::ReassignmentSettings;

/// 重试策略判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryVerdict {
    /// 仍在重试间隔内，本轮跳过
    Skip,
    /// 本轮可以尝试分配
    Eligible,
    /// 已达到最大重试次数
    Exhausted,
}

impl RetryVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetryVerdict::Skip => "skip",
            RetryVerdict::Eligible => "eligible",
            RetryVerdict::Exhausted => "exhausted",
        }
    }
}

/// 判定集群本轮是否应当尝试分配
///
/// 纯函数：只依赖传入的集群、时间和设置。
/// - `retry_count >= max_retries` 时为 `Exhausted`，与上次尝试时间无关
/// - 否则若上次尝试距今不足 `retry_delay` 则为 `Skip`（时钟回拨同样视为不足）
/// - 其余情况为 `Eligible`
pub fn classify(
    cluster: &DeliveryCluster,
    now: DateTime<Utc>,
    settings: &ReassignmentSettings,
) -> RetryVerdict {
    if cluster.retry_count >= settings.max_retries {
        return RetryVerdict::Exhausted;
    }

    if let Some(last_retry_time) = cluster.last_retry_time {
        let within_delay = match (now - last_retry_time).to_std() {
            Ok(elapsed) => elapsed < settings.retry_delay,
            Err(_) => true,
        };
        if within_delay {
            return RetryVerdict::Skip;
        }
    }

    RetryVerdict::Eligible
}
