//! 协作方的测试替身
//!
//! 所有实现都在内存中保存状态，并支持按调用序号注入失败或 panic，
//! 用于验证重新分配循环的故障隔离。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use courier_domain::{
    ClusterRepository, Delivery, DeliveryAssigner, DeliveryCluster, DeliveryRepository,
    DriverAvailability, DriverCandidate, Notification, NotificationKind, NotificationSender,
    NotificationTarget,
};
use courier_errors::{DispatchError, DispatchResult};

/// 注入的故障类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Error,
    Panic,
}

/// 按调用序号（从 1 开始）触发的故障表
#[derive(Debug, Default)]
struct FaultPlan {
    calls: AtomicUsize,
    faults: Mutex<HashMap<usize, Fault>>,
    always: Mutex<Option<Fault>>,
}

impl FaultPlan {
    fn on_call(&self, call: usize, fault: Fault) {
        self.faults.lock().unwrap().insert(call, fault);
    }

    fn always(&self, fault: Option<Fault>) {
        *self.always.lock().unwrap() = fault;
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self, what: &str) -> DispatchResult<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let fault = self
            .faults
            .lock()
            .unwrap()
            .get(&call)
            .copied()
            .or(*self.always.lock().unwrap());

        match fault {
            Some(Fault::Error) => Err(DispatchError::Internal(format!(
                "{what} 第 {call} 次调用注入失败"
            ))),
            Some(Fault::Panic) => panic!("{what} 第 {call} 次调用注入 panic"),
            None => Ok(()),
        }
    }
}

/// Mock implementation of ClusterRepository
///
/// 记录每一次重试簿记写入，`find_unassigned` 可整体失败。
#[derive(Debug, Clone, Default)]
pub struct MockClusterRepository {
    clusters: Arc<Mutex<Vec<DeliveryCluster>>>,
    persisted: Arc<Mutex<Vec<(Uuid, u32, DateTime<Utc>)>>>,
    fetch_faults: Arc<FaultPlan>,
    persist_faults: Arc<FaultPlan>,
}

impl MockClusterRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clusters(clusters: Vec<DeliveryCluster>) -> Self {
        let repo = Self::new();
        *repo.clusters.lock().unwrap() = clusters;
        repo
    }

    pub fn fail_fetch(&self, fault: Option<Fault>) {
        self.fetch_faults.always(fault);
    }

    pub fn fail_persist_on_call(&self, call: usize, fault: Fault) {
        self.persist_faults.on_call(call, fault);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_faults.calls()
    }

    pub fn cluster(&self, id: Uuid) -> Option<DeliveryCluster> {
        self.clusters
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    pub fn persisted(&self) -> Vec<(Uuid, u32, DateTime<Utc>)> {
        self.persisted.lock().unwrap().clone()
    }

    /// 模拟集群被其他流程分配后从未分配集合中消失
    pub fn remove(&self, id: Uuid) {
        self.clusters.lock().unwrap().retain(|c| c.id != id);
    }
}

#[async_trait]
impl ClusterRepository for MockClusterRepository {
    async fn find_unassigned(&self) -> DispatchResult<Vec<DeliveryCluster>> {
        self.fetch_faults.check("find_unassigned")?;
        Ok(self.clusters.lock().unwrap().clone())
    }

    async fn persist_retry_state(
        &self,
        cluster_id: Uuid,
        retry_count: u32,
        last_retry_time: DateTime<Utc>,
    ) -> DispatchResult<()> {
        self.persist_faults.check("persist_retry_state")?;

        let mut clusters = self.clusters.lock().unwrap();
        let cluster = clusters
            .iter_mut()
            .find(|c| c.id == cluster_id)
            .ok_or_else(|| DispatchError::cluster_not_found(cluster_id))?;
        cluster.retry_count = retry_count;
        cluster.last_retry_time = Some(last_retry_time);

        self.persisted
            .lock()
            .unwrap()
            .push((cluster_id, retry_count, last_retry_time));
        Ok(())
    }
}

/// Mock implementation of DriverAvailability
#[derive(Debug, Clone, Default)]
pub struct MockDriverAvailability {
    drivers: Arc<Mutex<Vec<DriverCandidate>>>,
    faults: Arc<FaultPlan>,
}

impl MockDriverAvailability {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_drivers(drivers: Vec<DriverCandidate>) -> Self {
        let mock = Self::new();
        mock.set_drivers(drivers);
        mock
    }

    pub fn set_drivers(&self, drivers: Vec<DriverCandidate>) {
        *self.drivers.lock().unwrap() = drivers;
    }

    pub fn fail_on_call(&self, call: usize, fault: Fault) {
        self.faults.on_call(call, fault);
    }

    pub fn call_count(&self) -> usize {
        self.faults.calls()
    }
}

#[async_trait]
impl DriverAvailability for MockDriverAvailability {
    async fn available_drivers(&self) -> DispatchResult<Vec<DriverCandidate>> {
        self.faults.check("available_drivers")?;
        Ok(self.drivers.lock().unwrap().clone())
    }
}

/// Mock implementation of DeliveryRepository and DeliveryAssigner
#[derive(Debug, Clone, Default)]
pub struct MockDeliveryStore {
    deliveries: Arc<Mutex<HashMap<Uuid, Delivery>>>,
    assigned_clusters: Arc<Mutex<HashSet<Uuid>>>,
    load_faults: Arc<FaultPlan>,
    assign_faults: Arc<FaultPlan>,
}

impl MockDeliveryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deliveries(deliveries: Vec<Delivery>) -> Self {
        let store = Self::new();
        for delivery in deliveries {
            store.insert(delivery);
        }
        store
    }

    pub fn insert(&self, delivery: Delivery) {
        self.deliveries.lock().unwrap().insert(delivery.id, delivery);
    }

    pub fn delivery(&self, id: Uuid) -> Option<Delivery> {
        self.deliveries.lock().unwrap().get(&id).cloned()
    }

    pub fn fail_load_on_call(&self, call: usize, fault: Fault) {
        self.load_faults.on_call(call, fault);
    }

    pub fn fail_assign(&self, fault: Option<Fault>) {
        self.assign_faults.always(fault);
    }

    pub fn assign_count(&self) -> usize {
        self.assign_faults.calls()
    }

    pub fn is_cluster_assigned(&self, cluster_id: Uuid) -> bool {
        self.assigned_clusters.lock().unwrap().contains(&cluster_id)
    }
}

#[async_trait]
impl DeliveryRepository for MockDeliveryStore {
    async fn load_with_relations(&self, delivery_id: Uuid) -> DispatchResult<Option<Delivery>> {
        self.load_faults.check("load_with_relations")?;
        Ok(self.deliveries.lock().unwrap().get(&delivery_id).cloned())
    }
}

#[async_trait]
impl DeliveryAssigner for MockDeliveryStore {
    async fn auto_assign(&self, delivery: &mut Delivery, cluster_id: Uuid) -> DispatchResult<()> {
        self.assign_faults.check("auto_assign")?;

        // 只有报价中的配送员会被写入配送单，否则仅标记集群已分配
        if !delivery.is_assigned() {
            let driver_id = delivery.pending_offers().find_map(|offer| offer.driver_id);
            if let Some(driver_id) = driver_id {
                delivery.assign_driver(driver_id);
            }
        }
        self.insert(delivery.clone());
        self.assigned_clusters.lock().unwrap().insert(cluster_id);
        Ok(())
    }
}

/// 记录所有发出通知的发送器
#[derive(Debug, Clone, Default)]
pub struct RecordingNotificationSender {
    sent: Arc<Mutex<Vec<(NotificationTarget, Notification)>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingNotificationSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// 之后的发送全部失败，失败的通知不会被记录
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(NotificationTarget, Notification)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn kinds(&self) -> Vec<NotificationKind> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, n)| n.kind)
            .collect()
    }

    pub fn count_of(&self, kind: NotificationKind) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }

    pub fn for_subject(&self, subject_id: Uuid) -> Vec<(NotificationTarget, Notification)> {
        self.sent()
            .into_iter()
            .filter(|(_, n)| n.subject_id == subject_id)
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    fn record(&self, target: NotificationTarget, notification: &Notification) -> DispatchResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DispatchError::notification("通知发送注入失败"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((target, notification.clone()));
        Ok(())
    }
}

#[async_trait]
impl NotificationSender for RecordingNotificationSender {
    async fn notify_role(&self, role: &str, notification: &Notification) -> DispatchResult<()> {
        self.record(NotificationTarget::Role(role.to_string()), notification)
    }

    async fn notify_user(&self, user_id: Uuid, notification: &Notification) -> DispatchResult<()> {
        self.record(NotificationTarget::User(user_id), notification)
    }
}
