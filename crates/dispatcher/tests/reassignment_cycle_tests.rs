use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use courier_dispatcher::{ReassignmentMetrics, ReassignmentService, ReassignmentSettings};
use courier_domain::{NotificationKind, NotificationTarget};
use courier_infrastructure::InMemoryDeliveryStore;
use courier_testing_utils::{
    ClusterBuilder, DeliveryBuilder, DriverBuilder, Fault, MockClusterRepository,
    MockDeliveryStore, MockDriverAvailability, RecordingNotificationSender,
};

fn settings(max_retries: u32, retry_delay_seconds: u64) -> ReassignmentSettings {
    ReassignmentSettings {
        check_interval: Duration::from_secs(3600),
        max_retries,
        retry_delay: Duration::from_secs(retry_delay_seconds),
        admin_role: "Admin".to_string(),
    }
}

fn memory_service(
    store: Arc<InMemoryDeliveryStore>,
    sender: RecordingNotificationSender,
    settings: ReassignmentSettings,
) -> ReassignmentService {
    ReassignmentService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store,
        Arc::new(sender),
        settings,
        Arc::new(ReassignmentMetrics::new()),
    )
}

fn mock_service(
    clusters: &MockClusterRepository,
    drivers: &MockDriverAvailability,
    deliveries: &MockDeliveryStore,
    sender: &RecordingNotificationSender,
    settings: ReassignmentSettings,
) -> ReassignmentService {
    ReassignmentService::new(
        Arc::new(clusters.clone()),
        Arc::new(drivers.clone()),
        Arc::new(deliveries.clone()),
        Arc::new(deliveries.clone()),
        Arc::new(sender.clone()),
        settings,
        Arc::new(ReassignmentMetrics::new()),
    )
}

#[tokio::test]
async fn test_fresh_cluster_is_assigned_and_both_parties_notified() {
    let store = Arc::new(InMemoryDeliveryStore::new());
    let driver = DriverBuilder::new().with_name("Ana").build();
    let delivery = DeliveryBuilder::new().with_company(Uuid::new_v4()).build();
    let cluster = ClusterBuilder::new().for_delivery(delivery.id).build();

    store.add_driver(driver.clone()).await;
    store.insert_delivery(delivery.clone()).await;
    store.insert_cluster(cluster.clone()).await;

    let sender = RecordingNotificationSender::new();
    let service = memory_service(store.clone(), sender.clone(), settings(3, 60));

    let report = service.run_cycle().await.unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.assigned, 1);

    let sent = sender.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].0, NotificationTarget::Role("Admin".to_string()));
    assert_eq!(sent[0].1.kind, NotificationKind::AssignmentSucceededAdmin);
    assert!(sent[0].1.message.contains("Ana"));
    assert_eq!(sent[1].0, NotificationTarget::User(driver.id));
    assert_eq!(sent[1].1.kind, NotificationKind::AssignmentSucceededDriver);
    assert!(sent.iter().all(|(_, n)| n.subject_id == cluster.id));
    assert!(sent.iter().all(|(_, n)| n.subject_type == "DeliveryCluster"));

    let stored = store.cluster(cluster.id).await.unwrap();
    assert_eq!(stored.retry_count, 1);
    assert!(stored.last_retry_time.is_some());
    assert!(store.is_cluster_assigned(cluster.id).await);
    assert_eq!(
        store.delivery(delivery.id).await.unwrap().assigned_driver_id,
        Some(driver.id)
    );

    // 已分配的集群不再出现在下一轮中
    sender.clear();
    let report = service.run_cycle().await.unwrap();
    assert_eq!(report.scanned, 0);
    assert_eq!(sender.count(), 0);
}

#[tokio::test]
async fn test_no_driver_then_exhausted() {
    let store = Arc::new(InMemoryDeliveryStore::new());
    let delivery = DeliveryBuilder::new().build();
    let cluster = ClusterBuilder::new()
        .for_delivery(delivery.id)
        .with_retry_count(2)
        .retried_seconds_ago(120)
        .build();
    store.insert_delivery(delivery).await;
    store.insert_cluster(cluster.clone()).await;

    let sender = RecordingNotificationSender::new();
    let service = memory_service(store.clone(), sender.clone(), settings(3, 60));

    let report = service.run_cycle().await.unwrap();
    assert_eq!(report.no_driver, 1);
    assert_eq!(sender.kinds(), vec![NotificationKind::NoDriverAvailable]);
    assert_eq!(
        sender.sent()[0].0,
        NotificationTarget::Role("Admin".to_string())
    );
    assert_eq!(store.cluster(cluster.id).await.unwrap().retry_count, 3);

    sender.clear();
    let report = service.run_cycle().await.unwrap();
    assert_eq!(report.exhausted, 1);
    assert_eq!(sender.kinds(), vec![NotificationKind::ExhaustedRetries]);
    assert!(sender.sent()[0].1.message.contains('3'));
    assert_eq!(store.cluster(cluster.id).await.unwrap().retry_count, 3);
}

#[tokio::test]
async fn test_exhausted_cluster_alerts_every_cycle_without_bookkeeping() {
    let cluster = ClusterBuilder::new()
        .with_retry_count(5)
        .retried_seconds_ago(1)
        .build();
    let clusters = MockClusterRepository::with_clusters(vec![cluster.clone()]);
    let drivers = MockDriverAvailability::with_drivers(vec![DriverBuilder::new().build()]);
    let deliveries = MockDeliveryStore::new();
    let sender = RecordingNotificationSender::new();
    let service = mock_service(&clusters, &drivers, &deliveries, &sender, settings(5, 60));

    for _ in 0..3 {
        let report = service.run_cycle().await.unwrap();
        assert_eq!(report.exhausted, 1);
    }

    assert_eq!(sender.count_of(NotificationKind::ExhaustedRetries), 3);
    assert_eq!(sender.count(), 3);
    assert!(clusters.persisted().is_empty());
    assert_eq!(drivers.call_count(), 0);
    assert_eq!(clusters.cluster(cluster.id).unwrap(), cluster);
}

#[tokio::test]
async fn test_cluster_within_retry_delay_is_skipped() {
    let cluster = ClusterBuilder::new()
        .with_retry_count(1)
        .retried_seconds_ago(10)
        .build();
    let clusters = MockClusterRepository::with_clusters(vec![cluster.clone()]);
    let drivers = MockDriverAvailability::with_drivers(vec![DriverBuilder::new().build()]);
    let deliveries = MockDeliveryStore::new();
    let sender = RecordingNotificationSender::new();
    let service = mock_service(&clusters, &drivers, &deliveries, &sender, settings(3, 60));

    let report = service.run_cycle().await.unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(sender.count(), 0);
    assert_eq!(drivers.call_count(), 0);
    assert!(clusters.persisted().is_empty());
}

#[tokio::test]
async fn test_fetch_failure_processes_nothing() {
    let cluster = ClusterBuilder::new().build();
    let clusters = MockClusterRepository::with_clusters(vec![cluster.clone()]);
    clusters.fail_fetch(Some(Fault::Error));
    let drivers = MockDriverAvailability::with_drivers(vec![DriverBuilder::new().build()]);
    let deliveries = MockDeliveryStore::new();
    let sender = RecordingNotificationSender::new();
    let service = mock_service(&clusters, &drivers, &deliveries, &sender, settings(3, 60));

    assert!(service.run_cycle().await.is_err());
    assert_eq!(sender.count(), 0);
    assert!(clusters.persisted().is_empty());
    assert_eq!(drivers.call_count(), 0);
    assert_eq!(clusters.cluster(cluster.id).unwrap().retry_count, 0);
}

#[tokio::test]
async fn test_missing_delivery_neither_alerts_nor_counts() {
    let cluster = ClusterBuilder::new().build();
    let clusters = MockClusterRepository::with_clusters(vec![cluster.clone()]);
    let drivers = MockDriverAvailability::with_drivers(vec![DriverBuilder::new().build()]);
    let deliveries = MockDeliveryStore::new();
    let sender = RecordingNotificationSender::new();
    let service = mock_service(&clusters, &drivers, &deliveries, &sender, settings(3, 60));

    let report = service.run_cycle().await.unwrap();

    assert_eq!(report.delivery_missing, 1);
    assert_eq!(sender.count(), 0);
    assert!(clusters.persisted().is_empty());
    assert_eq!(deliveries.assign_count(), 0);
}

#[tokio::test]
async fn test_first_available_driver_is_notified() {
    let first = DriverBuilder::new().with_name("first").build();
    let second = DriverBuilder::new().with_name("second").build();
    let delivery = DeliveryBuilder::new().build();
    let cluster = ClusterBuilder::new().for_delivery(delivery.id).build();

    let clusters = MockClusterRepository::with_clusters(vec![cluster.clone()]);
    let drivers = MockDriverAvailability::with_drivers(vec![first.clone(), second]);
    let deliveries = MockDeliveryStore::with_deliveries(vec![delivery]);
    let sender = RecordingNotificationSender::new();
    let service = mock_service(&clusters, &drivers, &deliveries, &sender, settings(3, 60));

    service.run_cycle().await.unwrap();

    let users: Vec<_> = sender
        .sent()
        .into_iter()
        .filter_map(|(target, _)| match target {
            NotificationTarget::User(id) => Some(id),
            NotificationTarget::Role(_) => None,
        })
        .collect();
    assert_eq!(users, vec![first.id]);
    assert!(deliveries.is_cluster_assigned(cluster.id));

    let persisted = clusters.persisted();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].0, cluster.id);
    assert_eq!(persisted[0].1, 1);
}

#[tokio::test]
async fn test_failing_cluster_does_not_block_the_rest() {
    let built: Vec<_> = (0..3)
        .map(|_| {
            let delivery = DeliveryBuilder::new().build();
            let cluster = ClusterBuilder::new().for_delivery(delivery.id).build();
            (delivery, cluster)
        })
        .collect();
    let clusters =
        MockClusterRepository::with_clusters(built.iter().map(|(_, c)| c.clone()).collect());
    let deliveries =
        MockDeliveryStore::with_deliveries(built.iter().map(|(d, _)| d.clone()).collect());
    let drivers = MockDriverAvailability::with_drivers(vec![DriverBuilder::new().build()]);
    drivers.fail_on_call(2, Fault::Error);
    let sender = RecordingNotificationSender::new();
    let service = mock_service(&clusters, &drivers, &deliveries, &sender, settings(3, 60));

    let report = service.run_cycle().await.unwrap();

    assert_eq!(report.scanned, 3);
    assert_eq!(report.assigned, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(sender.count(), 4);
    assert!(sender.for_subject(built[1].1.id).is_empty());
    assert_eq!(clusters.cluster(built[1].1.id).unwrap().retry_count, 0);
    assert_eq!(clusters.cluster(built[2].1.id).unwrap().retry_count, 1);
}

#[tokio::test]
async fn test_panicking_cluster_does_not_block_the_rest() {
    let first = ClusterBuilder::new().build();
    let second = ClusterBuilder::new().build();
    let clusters = MockClusterRepository::with_clusters(vec![first.clone(), second.clone()]);
    let drivers = MockDriverAvailability::new();
    drivers.fail_on_call(1, Fault::Panic);
    let deliveries = MockDeliveryStore::new();
    let sender = RecordingNotificationSender::new();
    let service = mock_service(&clusters, &drivers, &deliveries, &sender, settings(3, 60));

    let report = service.run_cycle().await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.no_driver, 1);
    assert_eq!(sender.kinds(), vec![NotificationKind::NoDriverAvailable]);
    assert_eq!(sender.sent()[0].1.subject_id, second.id);
    assert_eq!(clusters.cluster(first.id).unwrap().retry_count, 0);
    assert_eq!(clusters.cluster(second.id).unwrap().retry_count, 1);
}

#[tokio::test]
async fn test_assignment_failure_skips_bookkeeping() {
    let delivery = DeliveryBuilder::new().build();
    let cluster = ClusterBuilder::new().for_delivery(delivery.id).build();
    let clusters = MockClusterRepository::with_clusters(vec![cluster.clone()]);
    let drivers = MockDriverAvailability::with_drivers(vec![DriverBuilder::new().build()]);
    let deliveries = MockDeliveryStore::with_deliveries(vec![delivery]);
    deliveries.fail_assign(Some(Fault::Error));
    let sender = RecordingNotificationSender::new();
    let service = mock_service(&clusters, &drivers, &deliveries, &sender, settings(3, 60));

    let report = service.run_cycle().await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(sender.count(), 0);
    assert!(clusters.persisted().is_empty());
}

#[tokio::test]
async fn test_notification_failure_is_isolated_to_cluster() {
    let first = ClusterBuilder::new().with_retry_count(3).build();
    let second = ClusterBuilder::new().with_retry_count(3).build();
    let clusters = MockClusterRepository::with_clusters(vec![first, second]);
    let drivers = MockDriverAvailability::new();
    let deliveries = MockDeliveryStore::new();
    let sender = RecordingNotificationSender::new();
    sender.set_failing(true);
    let service = mock_service(&clusters, &drivers, &deliveries, &sender, settings(3, 60));

    let report = service.run_cycle().await.unwrap();

    assert_eq!(report.scanned, 2);
    assert_eq!(report.failed, 2);
    assert_eq!(report.processed(), 2);
}

#[tokio::test]
async fn test_clusters_processed_in_fetch_order() {
    let clusters_in_order: Vec<_> = (0..4).map(|_| ClusterBuilder::new().build()).collect();
    let clusters = MockClusterRepository::with_clusters(clusters_in_order.clone());
    let drivers = MockDriverAvailability::new();
    let deliveries = MockDeliveryStore::new();
    let sender = RecordingNotificationSender::new();
    let service = mock_service(&clusters, &drivers, &deliveries, &sender, settings(3, 60));

    service.run_cycle().await.unwrap();

    let notified: Vec<Uuid> = sender.sent().iter().map(|(_, n)| n.subject_id).collect();
    let expected: Vec<Uuid> = clusters_in_order.iter().map(|c| c.id).collect();
    assert_eq!(notified, expected);
}

#[tokio::test]
async fn test_courier_chosen_from_offer_is_the_one_notified() {
    let store = Arc::new(InMemoryDeliveryStore::new());
    let available = DriverBuilder::new().with_name("available").build();
    let offered = DriverBuilder::new().with_name("offered").build();
    let delivery = DeliveryBuilder::new().with_offer_from(offered.id).build();
    let cluster = ClusterBuilder::new().for_delivery(delivery.id).build();

    store.add_driver(available.clone()).await;
    store.add_driver(offered.clone()).await;
    store.insert_delivery(delivery.clone()).await;
    store.insert_cluster(cluster.clone()).await;

    let sender = RecordingNotificationSender::new();
    let service = memory_service(store.clone(), sender.clone(), settings(3, 60));
    service.run_cycle().await.unwrap();

    let assigned = store
        .delivery(delivery.id)
        .await
        .unwrap()
        .assigned_driver_id;
    assert_eq!(assigned, Some(offered.id));

    let sent = sender.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent[0].1.message.contains("offered"));
    assert_eq!(sent[1].0, NotificationTarget::User(offered.id));
}

#[tokio::test]
async fn test_offered_courier_outside_available_list_is_notified() {
    let store = Arc::new(InMemoryDeliveryStore::new());
    let available = DriverBuilder::new().build();
    let offered_id = Uuid::new_v4();
    let delivery = DeliveryBuilder::new().with_offer_from(offered_id).build();
    let cluster = ClusterBuilder::new().for_delivery(delivery.id).build();

    store.add_driver(available.clone()).await;
    store.insert_delivery(delivery).await;
    store.insert_cluster(cluster).await;

    let sender = RecordingNotificationSender::new();
    let service = memory_service(store, sender.clone(), settings(3, 60));
    service.run_cycle().await.unwrap();

    let sent = sender.sent();
    assert!(sent[0].1.message.contains(&offered_id.to_string()));
    assert_eq!(sent[1].0, NotificationTarget::User(offered_id));
    assert!(sent
        .iter()
        .all(|(target, _)| *target != NotificationTarget::User(available.id)));
}

#[tokio::test]
async fn test_bookkeeping_failure_after_assignment_still_notifies() {
    let driver = DriverBuilder::new().build();
    let delivery = DeliveryBuilder::new().build();
    let cluster = ClusterBuilder::new().for_delivery(delivery.id).build();
    let clusters = MockClusterRepository::with_clusters(vec![cluster.clone()]);
    clusters.fail_persist_on_call(1, Fault::Error);
    let drivers = MockDriverAvailability::with_drivers(vec![driver.clone()]);
    let deliveries = MockDeliveryStore::with_deliveries(vec![delivery]);
    let sender = RecordingNotificationSender::new();
    let service = mock_service(&clusters, &drivers, &deliveries, &sender, settings(3, 60));

    let report = service.run_cycle().await.unwrap();

    assert_eq!(report.assigned, 1);
    assert_eq!(report.failed, 0);
    assert!(deliveries.is_cluster_assigned(cluster.id));
    assert!(clusters.persisted().is_empty());
    assert_eq!(
        sender.kinds(),
        vec![
            NotificationKind::AssignmentSucceededAdmin,
            NotificationKind::AssignmentSucceededDriver
        ]
    );
    assert_eq!(sender.sent()[1].0, NotificationTarget::User(driver.id));
}

#[tokio::test]
async fn test_bookkeeping_failure_without_driver_fails_cluster() {
    let cluster = ClusterBuilder::new().build();
    let clusters = MockClusterRepository::with_clusters(vec![cluster.clone()]);
    clusters.fail_persist_on_call(1, Fault::Error);
    let drivers = MockDriverAvailability::new();
    let deliveries = MockDeliveryStore::new();
    let sender = RecordingNotificationSender::new();
    let service = mock_service(&clusters, &drivers, &deliveries, &sender, settings(3, 60));

    let report = service.run_cycle().await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.no_driver, 0);
    assert_eq!(sender.count(), 0);
    assert_eq!(clusters.cluster(cluster.id).unwrap().retry_count, 0);
}
