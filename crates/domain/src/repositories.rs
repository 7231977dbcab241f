//! 协作方抽象
//!
//! 重新分配循环只通过这些接口访问外部系统，遵循依赖倒置原则

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_errors::DispatchResult;
use uuid::Uuid;

use crate::entities::{Delivery, DeliveryCluster, DriverCandidate};
use crate::notification::Notification;

/// 配送集群仓储抽象
#[async_trait]
pub trait ClusterRepository: Send + Sync {
    /// 获取所有尚未分配配送员的集群，顺序即处理顺序
    async fn find_unassigned(&self) -> DispatchResult<Vec<DeliveryCluster>>;

    /// 持久化集群的重试簿记
    async fn persist_retry_state(
        &self,
        cluster_id: Uuid,
        retry_count: u32,
        last_retry_time: DateTime<Utc>,
    ) -> DispatchResult<()>;
}

/// 配送员可用性查询
#[async_trait]
pub trait DriverAvailability: Send + Sync {
    async fn available_drivers(&self) -> DispatchResult<Vec<DriverCandidate>>;
}

/// 配送单仓储抽象
#[async_trait]
pub trait DeliveryRepository: Send + Sync {
    /// 加载包含报价、商家和子配送单的完整聚合
    async fn load_with_relations(&self, delivery_id: Uuid) -> DispatchResult<Option<Delivery>>;
}

/// 外部分配算法：创建报价并完成实际匹配
///
/// 幂等性和匹配结果的持久化由实现方负责。
#[async_trait]
pub trait DeliveryAssigner: Send + Sync {
    async fn auto_assign(&self, delivery: &mut Delivery, cluster_id: Uuid) -> DispatchResult<()>;
}

/// 通知投递
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn notify_role(&self, role: &str, notification: &Notification) -> DispatchResult<()>;

    async fn notify_user(&self, user_id: Uuid, notification: &Notification) -> DispatchResult<()>;
}
