use std::time::Duration;

use courier_config::ReassignmentConfig;

/// 重新分配循环在整个生命周期内使用的不可变设置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReassignmentSettings {
    /// 两轮扫描之间的休眠时间
    pub check_interval: Duration,
    /// 达到该次数后集群视为耗尽
    pub max_retries: u32,
    /// 同一集群两次尝试之间的最小间隔
    pub retry_delay: Duration,
    /// 广播告警的目标角色
    pub admin_role: String,
}

impl Default for ReassignmentSettings {
    fn default() -> Self {
        Self::from(&ReassignmentConfig::default())
    }
}

impl From<&ReassignmentConfig> for ReassignmentSettings {
    fn from(config: &ReassignmentConfig) -> Self {
        Self {
            check_interval: config.check_interval(),
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
            admin_role: config.admin_role.clone(),
        }
    }
}
