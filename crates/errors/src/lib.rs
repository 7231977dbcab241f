use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),
    #[error("配送集群未找到: {id}")]
    ClusterNotFound { id: Uuid },
    #[error("配送单未找到: {id}")]
    DeliveryNotFound { id: Uuid },
    #[error("自动分配失败: {0}")]
    Assignment(String),
    #[error("通知发送失败: {0}")]
    Notification(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type DispatchResult<T> = Result<T, DispatchError>;

impl DispatchError {
    pub fn database_error<S: Into<String>>(msg: S) -> Self {
        Self::DatabaseOperation(msg.into())
    }
    pub fn cluster_not_found(id: Uuid) -> Self {
        Self::ClusterNotFound { id }
    }
    pub fn delivery_not_found(id: Uuid) -> Self {
        Self::DeliveryNotFound { id }
    }
    pub fn assignment<S: Into<String>>(msg: S) -> Self {
        Self::Assignment(msg.into())
    }
    pub fn notification<S: Into<String>>(msg: S) -> Self {
        Self::Notification(msg.into())
    }
    /// 临时性故障，下一轮扫描可能自行恢复
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::Database(_)
                | DispatchError::DatabaseOperation(_)
                | DispatchError::Notification(_)
        )
    }
    /// 数据完整性问题，重试无法修复
    pub fn is_integrity_violation(&self) -> bool {
        matches!(
            self,
            DispatchError::ClusterNotFound { .. } | DispatchError::DeliveryNotFound { .. }
        )
    }
}
