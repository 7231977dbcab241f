use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::timeout;
use uuid::Uuid;

use courier_dispatcher::{ReassignmentMetrics, ReassignmentService, ReassignmentSettings};
use courier_domain::{Notification, NotificationSender};
use courier_errors::DispatchResult;
use courier_testing_utils::{
    ClusterBuilder, Fault, MockClusterRepository, MockDeliveryStore, MockDriverAvailability,
    RecordingNotificationSender, TestEnv,
};

fn settings(check_interval: Duration) -> ReassignmentSettings {
    ReassignmentSettings {
        check_interval,
        max_retries: 3,
        retry_delay: Duration::from_secs(60),
        admin_role: "Admin".to_string(),
    }
}

fn service(
    clusters: &MockClusterRepository,
    sender: Arc<dyn NotificationSender>,
    check_interval: Duration,
) -> Arc<ReassignmentService> {
    let deliveries = MockDeliveryStore::new();
    Arc::new(ReassignmentService::new(
        Arc::new(clusters.clone()),
        Arc::new(MockDriverAvailability::new()),
        Arc::new(deliveries.clone()),
        Arc::new(deliveries),
        sender,
        settings(check_interval),
        Arc::new(ReassignmentMetrics::new()),
    ))
}

/// 第一次发送通知时触发停止信号
struct ShutdownOnNotify {
    inner: RecordingNotificationSender,
    shutdown_tx: broadcast::Sender<()>,
}

#[async_trait]
impl NotificationSender for ShutdownOnNotify {
    async fn notify_role(&self, role: &str, notification: &Notification) -> DispatchResult<()> {
        let _ = self.shutdown_tx.send(());
        self.inner.notify_role(role, notification).await
    }

    async fn notify_user(&self, user_id: Uuid, notification: &Notification) -> DispatchResult<()> {
        let _ = self.shutdown_tx.send(());
        self.inner.notify_user(user_id, notification).await
    }
}

#[tokio::test]
async fn test_shutdown_during_sleep_stops_promptly() {
    let clusters = MockClusterRepository::with_clusters(vec![ClusterBuilder::new().build()]);
    let sender = RecordingNotificationSender::new();
    let service = service(
        &clusters,
        Arc::new(sender.clone()),
        Duration::from_secs(3600),
    );

    let (shutdown_tx, shutdown_rx) = TestEnv::shutdown_channel();
    let handle = service.spawn(shutdown_rx);

    let mut reports = handle.reports();
    timeout(Duration::from_secs(1), reports.changed())
        .await
        .expect("first cycle should finish")
        .unwrap();
    let report = handle.last_report().unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.no_driver, 1);
    assert!(!report.interrupted);

    shutdown_tx.send(()).unwrap();
    timeout(Duration::from_secs(1), handle.join())
        .await
        .expect("loop should stop within the timeout")
        .unwrap();

    // 停止之后不再发出新的通知
    assert_eq!(sender.count(), 1);
}

#[tokio::test]
async fn test_dropped_shutdown_sender_stops_loop() {
    let clusters = MockClusterRepository::new();
    let service = service(
        &clusters,
        Arc::new(RecordingNotificationSender::new()),
        Duration::from_secs(3600),
    );

    let (shutdown_tx, shutdown_rx) = TestEnv::shutdown_channel();
    let handle = service.spawn(shutdown_rx);
    let mut reports = handle.reports();
    timeout(Duration::from_secs(1), reports.changed())
        .await
        .unwrap()
        .unwrap();

    drop(shutdown_tx);
    timeout(Duration::from_secs(1), handle.join())
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_shutdown_between_clusters_leaves_rest_untouched() {
    let first = ClusterBuilder::new().build();
    let second = ClusterBuilder::new().build();
    let clusters = MockClusterRepository::with_clusters(vec![first.clone(), second.clone()]);

    let (shutdown_tx, shutdown_rx) = TestEnv::shutdown_channel();
    let recorder = RecordingNotificationSender::new();
    let sender = ShutdownOnNotify {
        inner: recorder.clone(),
        shutdown_tx: shutdown_tx.clone(),
    };
    let service = service(&clusters, Arc::new(sender), Duration::from_secs(3600));

    let handle = service.clone().spawn(shutdown_rx);
    timeout(Duration::from_secs(1), handle.join())
        .await
        .expect("loop should stop after the interrupted cycle")
        .unwrap();

    assert_eq!(recorder.count(), 1);
    assert_eq!(recorder.sent()[0].1.subject_id, first.id);
    assert_eq!(clusters.cluster(first.id).unwrap().retry_count, 1);
    assert_eq!(clusters.cluster(second.id).unwrap().retry_count, 0);

    let report = service.subscribe_reports().borrow().clone().unwrap();
    assert!(report.interrupted);
    assert_eq!(report.scanned, 2);
    assert_eq!(report.processed(), 1);
}

#[tokio::test]
async fn test_shutdown_before_start_runs_no_cycle() {
    let clusters = MockClusterRepository::with_clusters(vec![ClusterBuilder::new().build()]);
    let service = service(
        &clusters,
        Arc::new(RecordingNotificationSender::new()),
        Duration::from_secs(3600),
    );

    let (shutdown_tx, shutdown_rx) = TestEnv::shutdown_channel();
    shutdown_tx.send(()).unwrap();
    timeout(Duration::from_secs(1), service.run(shutdown_rx))
        .await
        .unwrap();

    assert_eq!(clusters.fetch_count(), 0);
}

#[tokio::test]
async fn test_failing_fetch_does_not_stop_loop() {
    let clusters = MockClusterRepository::with_clusters(vec![ClusterBuilder::new().build()]);
    clusters.fail_fetch(Some(Fault::Error));
    let sender = RecordingNotificationSender::new();
    let service = service(
        &clusters,
        Arc::new(sender.clone()),
        Duration::from_millis(10),
    );

    let (shutdown_tx, shutdown_rx) = TestEnv::shutdown_channel();
    let handle = service.spawn(shutdown_rx);

    let probe = clusters.clone();
    assert!(
        TestEnv::wait_for(
            || {
                let probe = probe.clone();
                async move { probe.fetch_count() >= 3 }
            },
            Duration::from_secs(2)
        )
        .await
    );
    assert!(handle.last_report().is_none());
    assert_eq!(sender.count(), 0);

    // 恢复后下一轮照常处理
    clusters.fail_fetch(None);
    let mut reports = handle.reports();
    timeout(Duration::from_secs(1), reports.changed())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sender.count(), 1);

    shutdown_tx.send(()).unwrap();
    timeout(Duration::from_secs(1), handle.join())
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_panicking_fetch_does_not_stop_loop() {
    let clusters = MockClusterRepository::new();
    clusters.fail_fetch(Some(Fault::Panic));
    let service = service(
        &clusters,
        Arc::new(RecordingNotificationSender::new()),
        Duration::from_millis(10),
    );

    let (shutdown_tx, shutdown_rx) = TestEnv::shutdown_channel();
    let handle = service.spawn(shutdown_rx);

    let probe = clusters.clone();
    assert!(
        TestEnv::wait_for(
            || {
                let probe = probe.clone();
                async move { probe.fetch_count() >= 2 }
            },
            Duration::from_secs(2)
        )
        .await
    );
    assert!(!handle.is_finished());

    shutdown_tx.send(()).unwrap();
    timeout(Duration::from_secs(1), handle.join())
        .await
        .unwrap()
        .unwrap();
}
