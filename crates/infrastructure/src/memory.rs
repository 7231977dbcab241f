use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use courier_domain::{
    ClusterRepository, Delivery, DeliveryAssigner, DeliveryCluster, DeliveryRepository,
    DriverAvailability, DriverCandidate,
};
use courier_errors::{DispatchError, DispatchResult};

#[derive(Debug, Default)]
struct StoreState {
    /// 按插入顺序保存，作为未分配集合的返回顺序
    clusters: Vec<DeliveryCluster>,
    assigned_clusters: HashSet<Uuid>,
    deliveries: HashMap<Uuid, Delivery>,
    drivers: Vec<DriverCandidate>,
}

/// 内存配送数据存储
///
/// 同时实现集群、配送员、配送单和分配四个协作方接口，适用于本地运行和测试。
/// 分配规则很简单：优先选择待处理报价中的配送员，否则取第一个可用配送员。
#[derive(Debug, Default)]
pub struct InMemoryDeliveryStore {
    state: RwLock<StoreState>,
}

impl InMemoryDeliveryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_delivery(&self, delivery: Delivery) {
        let mut state = self.state.write().await;
        state.deliveries.insert(delivery.id, delivery);
    }

    pub async fn insert_cluster(&self, cluster: DeliveryCluster) {
        let mut state = self.state.write().await;
        state.assigned_clusters.remove(&cluster.id);
        match state.clusters.iter_mut().find(|c| c.id == cluster.id) {
            Some(existing) => *existing = cluster,
            None => state.clusters.push(cluster),
        }
    }

    pub async fn add_driver(&self, driver: DriverCandidate) {
        let mut state = self.state.write().await;
        state.drivers.push(driver);
    }

    pub async fn remove_driver(&self, driver_id: Uuid) {
        let mut state = self.state.write().await;
        state.drivers.retain(|d| d.id != driver_id);
    }

    pub async fn cluster(&self, cluster_id: Uuid) -> Option<DeliveryCluster> {
        let state = self.state.read().await;
        state.clusters.iter().find(|c| c.id == cluster_id).cloned()
    }

    pub async fn delivery(&self, delivery_id: Uuid) -> Option<Delivery> {
        let state = self.state.read().await;
        state.deliveries.get(&delivery_id).cloned()
    }

    pub async fn is_cluster_assigned(&self, cluster_id: Uuid) -> bool {
        let state = self.state.read().await;
        state.assigned_clusters.contains(&cluster_id)
    }

    pub async fn unassigned_count(&self) -> usize {
        let state = self.state.read().await;
        state
            .clusters
            .iter()
            .filter(|c| !state.assigned_clusters.contains(&c.id))
            .count()
    }
}

#[async_trait]
impl ClusterRepository for InMemoryDeliveryStore {
    async fn find_unassigned(&self) -> DispatchResult<Vec<DeliveryCluster>> {
        let state = self.state.read().await;
        Ok(state
            .clusters
            .iter()
            .filter(|c| !state.assigned_clusters.contains(&c.id))
            .cloned()
            .collect())
    }

    async fn persist_retry_state(
        &self,
        cluster_id: Uuid,
        retry_count: u32,
        last_retry_time: DateTime<Utc>,
    ) -> DispatchResult<()> {
        let mut state = self.state.write().await;
        let cluster = state
            .clusters
            .iter_mut()
            .find(|c| c.id == cluster_id)
            .ok_or_else(|| DispatchError::cluster_not_found(cluster_id))?;

        cluster.retry_count = cluster.retry_count.max(retry_count);
        cluster.last_retry_time = match cluster.last_retry_time {
            Some(previous) if previous > last_retry_time => Some(previous),
            _ => Some(last_retry_time),
        };

        debug!(
            "更新集群 {} 重试状态: {} 次，最后尝试 {}",
            cluster_id, cluster.retry_count, last_retry_time
        );
        Ok(())
    }
}

#[async_trait]
impl DriverAvailability for InMemoryDeliveryStore {
    async fn available_drivers(&self) -> DispatchResult<Vec<DriverCandidate>> {
        let state = self.state.read().await;
        Ok(state.drivers.clone())
    }
}

#[async_trait]
impl DeliveryRepository for InMemoryDeliveryStore {
    async fn load_with_relations(&self, delivery_id: Uuid) -> DispatchResult<Option<Delivery>> {
        let state = self.state.read().await;
        Ok(state.deliveries.get(&delivery_id).cloned())
    }
}

#[async_trait]
impl DeliveryAssigner for InMemoryDeliveryStore {
    async fn auto_assign(&self, delivery: &mut Delivery, cluster_id: Uuid) -> DispatchResult<()> {
        let mut state = self.state.write().await;

        if !delivery.is_assigned() {
            let driver_id = delivery
                .pending_offers()
                .find_map(|offer| offer.driver_id)
                .or_else(|| state.drivers.first().map(|d| d.id))
                .ok_or_else(|| {
                    DispatchError::assignment(format!("配送单 {} 没有可分配的配送员", delivery.id))
                })?;
            delivery.assign_driver(driver_id);
        }

        state.deliveries.insert(delivery.id, delivery.clone());
        state.assigned_clusters.insert(cluster_id);

        info!(
            "集群 {} 的配送单 {} 已分配给配送员 {:?}",
            cluster_id, delivery.id, delivery.assigned_driver_id
        );
        Ok(())
    }
}
