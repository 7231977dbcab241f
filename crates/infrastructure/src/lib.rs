//! 重新分配循环协作方的具体实现
//!
//! `memory` 为本地运行和测试提供的内存存储，`database` 为 PostgreSQL 适配器，
//! `notification` 为只写日志的通知发送器。

pub mod database;
pub mod memory;
pub mod notification;

pub use database::postgres::{
    PostgresClusterRepository, PostgresDeliveryRepository, PostgresDriverAvailability,
    PostgresNotificationSender,
};
pub use database::DatabaseManager;
pub use memory::InMemoryDeliveryStore;
pub use notification::LoggingNotificationSender;
