use std::sync::Arc;

use anyhow::{Context, Result};
use courier_config::{AppConfig, StorageBackend};
use courier_dispatcher::{ReassignmentMetrics, ReassignmentService, ReassignmentSettings};
use courier_domain::{
    ClusterRepository, DeliveryAssigner, DeliveryRepository, DriverAvailability,
    NotificationSender,
};
use courier_infrastructure::{
    DatabaseManager, InMemoryDeliveryStore, LoggingNotificationSender, PostgresClusterRepository,
    PostgresDeliveryRepository, PostgresDriverAvailability, PostgresNotificationSender,
};
use tokio::sync::broadcast;
use tracing::{info, warn};

/// 按存储后端组装好的协作方
struct Collaborators {
    clusters: Arc<dyn ClusterRepository>,
    drivers: Arc<dyn DriverAvailability>,
    deliveries: Arc<dyn DeliveryRepository>,
    assigner: Arc<dyn DeliveryAssigner>,
    notifications: Arc<dyn NotificationSender>,
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    service: Option<Arc<ReassignmentService>>,
    database: Option<DatabaseManager>,
    memory_store: Option<Arc<InMemoryDeliveryStore>>,
}

impl Application {
    /// 创建新的应用实例
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("初始化应用程序，存储后端: {:?}", config.storage.backend);

        let mut database = None;
        let mut memory_store = None;

        let collaborators = match config.storage.backend {
            StorageBackend::Memory => {
                let store = Arc::new(InMemoryDeliveryStore::new());
                memory_store = Some(store.clone());
                Collaborators {
                    clusters: store.clone(),
                    drivers: store.clone(),
                    deliveries: store.clone(),
                    assigner: store,
                    notifications: Arc::new(LoggingNotificationSender::new()),
                }
            }
            StorageBackend::Postgres => {
                let manager = DatabaseManager::new(&config.database)
                    .await
                    .context("连接数据库失败")?;
                if config.database.run_migrations {
                    manager.migrate().await.context("执行数据库迁移失败")?;
                }

                let pool = manager.pool();
                let deliveries = Arc::new(PostgresDeliveryRepository::new(pool.clone()));
                let collaborators = Collaborators {
                    clusters: Arc::new(PostgresClusterRepository::new(pool.clone())),
                    drivers: Arc::new(PostgresDriverAvailability::new(pool.clone())),
                    deliveries: deliveries.clone(),
                    assigner: deliveries,
                    notifications: Arc::new(PostgresNotificationSender::new(pool)),
                };
                database = Some(manager);
                collaborators
            }
        };

        let service = if config.reassignment.enabled {
            let settings = ReassignmentSettings::from(&config.reassignment);
            Some(Arc::new(ReassignmentService::new(
                collaborators.clusters,
                collaborators.drivers,
                collaborators.deliveries,
                collaborators.assigner,
                collaborators.notifications,
                settings,
                Arc::new(ReassignmentMetrics::new()),
            )))
        } else {
            warn!("配送集群重新分配已在配置中禁用");
            None
        };

        Ok(Self {
            config,
            service,
            database,
            memory_store,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn service(&self) -> Option<Arc<ReassignmentService>> {
        self.service.clone()
    }

    /// 内存后端的数据存储，PostgreSQL 后端时为 `None`
    pub fn memory_store(&self) -> Option<Arc<InMemoryDeliveryStore>> {
        self.memory_store.clone()
    }

    /// 运行应用程序直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        match &self.service {
            Some(service) => {
                let handle = Arc::clone(service).spawn(shutdown_rx);
                handle.join().await.context("重新分配循环异常退出")?;
            }
            None => {
                let _ = shutdown_rx.recv().await;
            }
        }

        if let Some(database) = &self.database {
            database.close().await;
            info!("数据库连接池已关闭");
        }

        info!("应用程序已停止");
        Ok(())
    }
}
