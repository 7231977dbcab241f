use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use courier_domain::{Notification, NotificationSender};
use courier_errors::DispatchResult;

/// 只把通知写入日志的发送器，用于内存后端
#[derive(Debug, Clone, Default)]
pub struct LoggingNotificationSender;

impl LoggingNotificationSender {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationSender for LoggingNotificationSender {
    async fn notify_role(&self, role: &str, notification: &Notification) -> DispatchResult<()> {
        info!(
            target: "courier::notification",
            role = role,
            kind = %notification.kind,
            subject_id = %notification.subject_id,
            "{}",
            notification.message
        );
        Ok(())
    }

    async fn notify_user(&self, user_id: Uuid, notification: &Notification) -> DispatchResult<()> {
        info!(
            target: "courier::notification",
            user_id = %user_id,
            kind = %notification.kind,
            subject_id = %notification.subject_id,
            "{}",
            notification.message
        );
        Ok(())
    }
}
