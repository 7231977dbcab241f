use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 配送集群重新分配循环配置
///
/// 进程启动时加载一次，循环运行期间不再修改。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReassignmentConfig {
    pub enabled: bool,
    /// 两轮扫描之间的休眠时间（秒）
    pub check_interval_seconds: u64,
    /// 最大重试次数，达到后集群视为耗尽
    pub max_retries: u32,
    /// 同一集群两次尝试之间的最小间隔（秒）
    pub retry_delay_seconds: u64,
    /// 接收广播告警的角色
    pub admin_role: String,
}

impl Default for ReassignmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_seconds: 30,
            max_retries: 5,
            retry_delay_seconds: 60,
            admin_role: "Admin".to_string(),
        }
    }
}

impl ReassignmentConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.check_interval_seconds == 0 {
            return Err(anyhow::anyhow!("检查间隔必须大于0"));
        }

        if self.max_retries == 0 {
            return Err(anyhow::anyhow!("最大重试次数必须大于0"));
        }

        if self.admin_role.trim().is_empty() {
            return Err(anyhow::anyhow!("管理员角色不能为空"));
        }

        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }
}
