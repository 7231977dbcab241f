use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::{broadcast, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, info_span, warn, Instrument};

use courier_domain::{
    ClusterRepository, DeliveryAssigner, DeliveryCluster, DeliveryRepository, DriverAvailability,
    NotificationSender,
};
use courier_errors::{DispatchError, DispatchResult};

use crate::assignment::{AssignmentAttempt, AttemptOutcome};
use crate::metrics::ReassignmentMetrics;
use crate::notifier::ReassignmentNotifier;
use crate::retry_policy::{classify, RetryVerdict};
use crate::settings::ReassignmentSettings;

/// 单个集群在一轮扫描中的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterOutcome {
    Skipped,
    Exhausted,
    Attempted(AttemptOutcome),
}

/// 一轮扫描的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// 本轮获取到的未分配集群数
    pub scanned: usize,
    pub skipped: usize,
    pub exhausted: usize,
    pub assigned: usize,
    pub no_driver: usize,
    pub delivery_missing: usize,
    /// 处理过程中出错的集群数
    pub failed: usize,
    /// 是否因停止信号提前结束
    pub interrupted: bool,
    pub duration: Duration,
}

impl CycleReport {
    fn record(&mut self, outcome: &ClusterOutcome) {
        match outcome {
            ClusterOutcome::Skipped => self.skipped += 1,
            ClusterOutcome::Exhausted => self.exhausted += 1,
            ClusterOutcome::Attempted(AttemptOutcome::Assigned { .. }) => self.assigned += 1,
            ClusterOutcome::Attempted(AttemptOutcome::NoDriverAvailable) => self.no_driver += 1,
            ClusterOutcome::Attempted(AttemptOutcome::DeliveryMissing) => {
                self.delivery_missing += 1
            }
        }
    }

    /// 本轮实际处理（含出错）的集群数
    pub fn processed(&self) -> usize {
        self.skipped
            + self.exhausted
            + self.assigned
            + self.no_driver
            + self.delivery_missing
            + self.failed
    }
}

/// 配送集群重新分配服务
///
/// 单个后台任务周期性扫描未分配的集群，按获取顺序逐个处理。
/// 单个集群的失败只记录日志，整轮扫描的失败在下一轮自行恢复，
/// 任何错误都不会终止循环。
pub struct ReassignmentService {
    cluster_repo: Arc<dyn ClusterRepository>,
    attempt: AssignmentAttempt,
    notifier: ReassignmentNotifier,
    settings: ReassignmentSettings,
    metrics: Arc<ReassignmentMetrics>,
    report_tx: watch::Sender<Option<CycleReport>>,
}

impl ReassignmentService {
    pub fn new(
        cluster_repo: Arc<dyn ClusterRepository>,
        drivers: Arc<dyn DriverAvailability>,
        deliveries: Arc<dyn DeliveryRepository>,
        assigner: Arc<dyn DeliveryAssigner>,
        notifications: Arc<dyn NotificationSender>,
        settings: ReassignmentSettings,
        metrics: Arc<ReassignmentMetrics>,
    ) -> Self {
        let attempt = AssignmentAttempt::new(cluster_repo.clone(), drivers, deliveries, assigner);
        let notifier = ReassignmentNotifier::new(notifications, settings.admin_role.clone());
        let (report_tx, _) = watch::channel(None);

        Self {
            cluster_repo,
            attempt,
            notifier,
            settings,
            metrics,
            report_tx,
        }
    }

    pub fn settings(&self) -> &ReassignmentSettings {
        &self.settings
    }

    /// 订阅每轮扫描结束后发布的统计
    pub fn subscribe_reports(&self) -> watch::Receiver<Option<CycleReport>> {
        self.report_tx.subscribe()
    }

    /// 在后台任务中运行循环
    pub fn spawn(self: Arc<Self>, shutdown_rx: broadcast::Receiver<()>) -> ReassignmentHandle {
        let reports = self.subscribe_reports();
        let join = tokio::spawn(async move { self.run(shutdown_rx).await });

        ReassignmentHandle { join, reports }
    }

    /// 运行循环直到收到停止信号
    ///
    /// 停止信号在每轮开始前、集群之间以及休眠期间都会被检查。
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "启动配送集群重新分配循环，检查间隔: {:?}，最大重试次数: {}，重试间隔: {:?}",
            self.settings.check_interval, self.settings.max_retries, self.settings.retry_delay
        );

        loop {
            if shutdown_requested(&mut shutdown_rx) {
                info!("收到停止信号，退出配送集群重新分配循环");
                break;
            }

            let cycle = self
                .scan(Some(&mut shutdown_rx))
                .instrument(info_span!("reassignment_cycle"));

            match AssertUnwindSafe(cycle).catch_unwind().await {
                Ok(Ok(report)) => {
                    let interrupted = report.interrupted;
                    self.finish_cycle(report);
                    if interrupted {
                        info!("扫描被停止信号中断，退出配送集群重新分配循环");
                        break;
                    }
                }
                Ok(Err(e)) => {
                    self.metrics.record_cycle_failure();
                    error!("获取未分配集群失败，本轮跳过: {}", e);
                }
                Err(_) => {
                    self.metrics.record_cycle_failure();
                    error!("重新分配扫描发生panic，本轮跳过");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.check_interval) => {}
                _ = shutdown_rx.recv() => {
                    info!("收到停止信号，退出配送集群重新分配循环");
                    break;
                }
            }
        }

        info!("配送集群重新分配循环已停止");
    }

    /// 执行一轮完整扫描
    ///
    /// 获取未分配集群失败时直接返回错误，不处理任何集群。
    pub async fn run_cycle(&self) -> DispatchResult<CycleReport> {
        self.scan(None).await
    }

    async fn scan(
        &self,
        mut shutdown_rx: Option<&mut broadcast::Receiver<()>>,
    ) -> DispatchResult<CycleReport> {
        let started = Instant::now();
        let clusters = self.cluster_repo.find_unassigned().await?;

        let mut report = CycleReport {
            scanned: clusters.len(),
            ..Default::default()
        };
        debug!("本轮发现 {} 个未分配集群", clusters.len());

        for cluster in &clusters {
            if let Some(rx) = shutdown_rx.as_deref_mut() {
                if shutdown_requested(rx) {
                    warn!(
                        "收到停止信号，本轮剩余 {} 个集群未处理",
                        clusters.len() - report.processed()
                    );
                    report.interrupted = true;
                    break;
                }
            }

            let span = info_span!(
                "reassign_cluster",
                cluster_id = %cluster.id,
                retry_count = cluster.retry_count
            );
            let processing = self.process_cluster(cluster).instrument(span);

            match AssertUnwindSafe(processing).catch_unwind().await {
                Ok(Ok(outcome)) => report.record(&outcome),
                Ok(Err(e)) => {
                    report.failed += 1;
                    log_cluster_failure(cluster, &e);
                }
                Err(_) => {
                    report.failed += 1;
                    error!("处理集群 {} 时发生panic", cluster.id);
                }
            }
        }

        report.duration = started.elapsed();
        Ok(report)
    }

    async fn process_cluster(&self, cluster: &DeliveryCluster) -> DispatchResult<ClusterOutcome> {
        match classify(cluster, Utc::now(), &self.settings) {
            RetryVerdict::Exhausted => {
                warn!(
                    "集群 {} 已达到最大重试次数 {}，通知管理员",
                    cluster.id, self.settings.max_retries
                );
                self.notifier
                    .retries_exhausted(cluster, self.settings.max_retries)
                    .await?;
                Ok(ClusterOutcome::Exhausted)
            }
            RetryVerdict::Skip => {
                debug!("集群 {} 仍在重试间隔内，跳过", cluster.id);
                Ok(ClusterOutcome::Skipped)
            }
            RetryVerdict::Eligible => {
                let outcome = self.attempt.attempt(cluster).await?;
                match &outcome {
                    AttemptOutcome::Assigned { driver } => {
                        self.notifier.assignment_succeeded(cluster, driver).await?;
                    }
                    AttemptOutcome::NoDriverAvailable => {
                        self.notifier.no_driver_available(cluster).await?;
                    }
                    AttemptOutcome::DeliveryMissing => {}
                }
                Ok(ClusterOutcome::Attempted(outcome))
            }
        }
    }

    fn finish_cycle(&self, report: CycleReport) {
        if report.scanned > 0 {
            info!(
                "本轮扫描完成: 共 {} 个集群，分配 {}，无配送员 {}，耗尽 {}，跳过 {}，配送单缺失 {}，失败 {}，耗时 {:?}",
                report.scanned,
                report.assigned,
                report.no_driver,
                report.exhausted,
                report.skipped,
                report.delivery_missing,
                report.failed,
                report.duration
            );
        } else {
            debug!("本轮没有未分配的集群");
        }

        self.metrics.record_cycle(&report);
        self.report_tx.send_replace(Some(report));
    }
}

/// 后台循环任务句柄
pub struct ReassignmentHandle {
    join: JoinHandle<()>,
    reports: watch::Receiver<Option<CycleReport>>,
}

impl ReassignmentHandle {
    /// 最近一轮完成的扫描统计
    pub fn last_report(&self) -> Option<CycleReport> {
        self.reports.borrow().clone()
    }

    pub fn reports(&self) -> watch::Receiver<Option<CycleReport>> {
        self.reports.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// 等待循环退出
    pub async fn join(self) -> Result<(), JoinError> {
        self.join.await
    }
}

/// 按错误类别记录单个集群的失败，集群在下一轮仍会被重新获取
fn log_cluster_failure(cluster: &DeliveryCluster, e: &DispatchError) {
    if e.is_integrity_violation() {
        warn!("集群 {} 的数据不完整，跳过: {}", cluster.id, e);
    } else if e.is_retryable() {
        warn!("处理集群 {} 时出现临时故障，下一轮重试: {}", cluster.id, e);
    } else {
        error!("处理集群 {} 失败: {}", cluster.id, e);
    }
}

/// 非阻塞地检查停止信号；发送端关闭也视为停止
fn shutdown_requested(shutdown_rx: &mut broadcast::Receiver<()>) -> bool {
    !matches!(
        shutdown_rx.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    )
}
