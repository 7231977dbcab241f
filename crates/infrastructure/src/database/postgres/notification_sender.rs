use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use courier_domain::{Notification, NotificationSender};
use courier_errors::DispatchResult;

/// 把通知写入 `notifications` 表，由下游服务投递
pub struct PostgresNotificationSender {
    pool: PgPool,
}

impl PostgresNotificationSender {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert(
        &self,
        role: Option<&str>,
        user_id: Option<Uuid>,
        notification: &Notification,
    ) -> DispatchResult<()> {
        sqlx::query(
            "INSERT INTO notifications
                 (id, recipient_role, recipient_user_id, kind, subject_id, subject_type, message)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(Uuid::new_v4())
        .bind(role)
        .bind(user_id)
        .bind(notification.kind)
        .bind(notification.subject_id)
        .bind(&notification.subject_type)
        .bind(&notification.message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl NotificationSender for PostgresNotificationSender {
    #[instrument(skip(self, notification), fields(kind = %notification.kind))]
    async fn notify_role(&self, role: &str, notification: &Notification) -> DispatchResult<()> {
        self.insert(Some(role), None, notification).await
    }

    #[instrument(skip(self, notification), fields(kind = %notification.kind))]
    async fn notify_user(&self, user_id: Uuid, notification: &Notification) -> DispatchResult<()> {
        self.insert(None, Some(user_id), notification).await
    }
}
