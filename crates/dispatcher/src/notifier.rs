use std::sync::Arc;

use tracing::debug;

use courier_domain::{
    DeliveryCluster, DriverCandidate, Notification, NotificationKind, NotificationSender,
};
use courier_errors::DispatchResult;

/// 重新分配循环的通知出口
///
/// 只负责在规定条件下各发出一次固定的事件，投递由 `NotificationSender` 完成。
pub struct ReassignmentNotifier {
    sender: Arc<dyn NotificationSender>,
    admin_role: String,
}

impl ReassignmentNotifier {
    pub fn new(sender: Arc<dyn NotificationSender>, admin_role: impl Into<String>) -> Self {
        Self {
            sender,
            admin_role: admin_role.into(),
        }
    }

    pub fn admin_role(&self) -> &str {
        &self.admin_role
    }

    pub async fn retries_exhausted(
        &self,
        cluster: &DeliveryCluster,
        max_retries: u32,
    ) -> DispatchResult<()> {
        let notification = Notification::for_cluster(
            NotificationKind::ExhaustedRetries,
            cluster.id,
            format!(
                "Delivery cluster {} reached the maximum of {} assignment attempts and needs manual assignment.",
                cluster.id, max_retries
            ),
        );
        self.to_admins(&notification).await
    }

    pub async fn no_driver_available(&self, cluster: &DeliveryCluster) -> DispatchResult<()> {
        let notification = Notification::for_cluster(
            NotificationKind::NoDriverAvailable,
            cluster.id,
            format!(
                "No delivery person is available for delivery cluster {}.",
                cluster.id
            ),
        );
        self.to_admins(&notification).await
    }

    /// 分配成功：先通知管理员，再直接通知选中的配送员
    pub async fn assignment_succeeded(
        &self,
        cluster: &DeliveryCluster,
        driver: &DriverCandidate,
    ) -> DispatchResult<()> {
        let admin_notice = Notification::for_cluster(
            NotificationKind::AssignmentSucceededAdmin,
            cluster.id,
            format!(
                "Delivery cluster {} was assigned to {}.",
                cluster.id, driver.display_name
            ),
        );
        self.to_admins(&admin_notice).await?;

        let driver_notice = Notification::for_cluster(
            NotificationKind::AssignmentSucceededDriver,
            cluster.id,
            format!(
                "You have been assigned delivery cluster {}.",
                cluster.id
            ),
        );
        debug!("通知配送员 {}: {}", driver.id, driver_notice.kind);
        self.sender.notify_user(driver.id, &driver_notice).await
    }

    async fn to_admins(&self, notification: &Notification) -> DispatchResult<()> {
        debug!("通知角色 {}: {}", self.admin_role, notification.kind);
        self.sender
            .notify_role(&self.admin_role, notification)
            .await
    }
}
