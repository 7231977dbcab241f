use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 通知所引用实体的类型标签
pub const DELIVERY_CLUSTER_SUBJECT: &str = "DeliveryCluster";

/// 重新分配循环可以发出的通知事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    #[serde(rename = "EXHAUSTED_RETRIES")]
    ExhaustedRetries,
    #[serde(rename = "NO_DRIVER_AVAILABLE")]
    NoDriverAvailable,
    #[serde(rename = "ASSIGNMENT_SUCCEEDED_ADMIN")]
    AssignmentSucceededAdmin,
    #[serde(rename = "ASSIGNMENT_SUCCEEDED_DRIVER")]
    AssignmentSucceededDriver,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::ExhaustedRetries => "EXHAUSTED_RETRIES",
            NotificationKind::NoDriverAvailable => "NO_DRIVER_AVAILABLE",
            NotificationKind::AssignmentSucceededAdmin => "ASSIGNMENT_SUCCEEDED_ADMIN",
            NotificationKind::AssignmentSucceededDriver => "ASSIGNMENT_SUCCEEDED_DRIVER",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl sqlx::Type<sqlx::Postgres> for NotificationKind {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("VARCHAR")
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for NotificationKind {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
    }
}

/// 通知接收方：角色广播或指定用户
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationTarget {
    Role(String),
    User(Uuid),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub subject_id: Uuid,
    pub subject_type: String,
    pub message: String,
}

impl Notification {
    pub fn for_cluster(kind: NotificationKind, cluster_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            kind,
            subject_id: cluster_id,
            subject_type: DELIVERY_CLUSTER_SUBJECT.to_string(),
            message: message.into(),
        }
    }
}
