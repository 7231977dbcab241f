use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use courier_domain::{
    ClusterRepository, DeliveryAssigner, DeliveryCluster, DeliveryRepository, DriverAvailability,
    DriverCandidate, RetryState,
};
use courier_errors::DispatchResult;

/// 一次分配尝试的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// 已完成分配，`driver` 为实际分配到的配送员
    Assigned { driver: DriverCandidate },
    /// 当前没有可用配送员
    NoDriverAvailable,
    /// 集群引用的配送单不存在
    DeliveryMissing,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Assigned { .. } => "assigned",
            AttemptOutcome::NoDriverAvailable => "no_driver",
            AttemptOutcome::DeliveryMissing => "delivery_missing",
        }
    }
}

/// 对单个可分配集群执行一次分配尝试
pub struct AssignmentAttempt {
    cluster_repo: Arc<dyn ClusterRepository>,
    drivers: Arc<dyn DriverAvailability>,
    deliveries: Arc<dyn DeliveryRepository>,
    assigner: Arc<dyn DeliveryAssigner>,
}

impl AssignmentAttempt {
    pub fn new(
        cluster_repo: Arc<dyn ClusterRepository>,
        drivers: Arc<dyn DriverAvailability>,
        deliveries: Arc<dyn DeliveryRepository>,
        assigner: Arc<dyn DeliveryAssigner>,
    ) -> Self {
        Self {
            cluster_repo,
            drivers,
            deliveries,
            assigner,
        }
    }

    /// 执行分配尝试
    ///
    /// 除 `DeliveryMissing` 外，每个结果都会在返回前把重试次数加一并记录尝试时间。
    /// 分配前任一协作方出错时直接返回错误，不写入重试簿记。
    /// 分配完成后簿记写入失败只记录日志，集群已离开未分配集合，结果仍为 `Assigned`。
    pub async fn attempt(&self, cluster: &DeliveryCluster) -> DispatchResult<AttemptOutcome> {
        let candidates = self.drivers.available_drivers().await?;

        // 取可用性服务返回顺序中的第一个
        let Some(candidate) = candidates.first().cloned() else {
            let state = self.record_attempt(cluster).await?;
            info!(
                "集群 {} 暂无可用配送员，重试次数: {}",
                cluster.id, state.retry_count
            );
            return Ok(AttemptOutcome::NoDriverAvailable);
        };

        let Some(mut delivery) = self
            .deliveries
            .load_with_relations(cluster.delivery_id)
            .await?
        else {
            warn!(
                "集群 {} 引用的配送单 {} 不存在，跳过",
                cluster.id, cluster.delivery_id
            );
            return Ok(AttemptOutcome::DeliveryMissing);
        };

        debug!(
            "集群 {} 委托自动分配，候选配送员: {} ({})",
            cluster.id, candidate.display_name, candidate.id
        );
        self.assigner.auto_assign(&mut delivery, cluster.id).await?;

        // 分配算法可能选中报价中的配送员，通知对象以实际分配结果为准
        let driver = match delivery.assigned_driver_id {
            Some(id) if id != candidate.id => candidates
                .into_iter()
                .find(|c| c.id == id)
                .unwrap_or_else(|| DriverCandidate::new(id, id.to_string())),
            _ => candidate,
        };

        match self.record_attempt(cluster).await {
            Ok(state) => info!(
                "集群 {} 已分配给配送员 {}，重试次数: {}",
                cluster.id, driver.id, state.retry_count
            ),
            Err(e) => error!("集群 {} 已分配但重试簿记写入失败: {}", cluster.id, e),
        }

        Ok(AttemptOutcome::Assigned { driver })
    }

    async fn record_attempt(&self, cluster: &DeliveryCluster) -> DispatchResult<RetryState> {
        let now = Utc::now();
        let state = cluster.retry_state().advance(now);

        self.cluster_repo
            .persist_retry_state(
                cluster.id,
                state.retry_count,
                state.last_retry_time.unwrap_or(now),
            )
            .await?;

        Ok(state)
    }
}
