use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::instrument;

use courier_domain::{DriverAvailability, DriverCandidate};
use courier_errors::DispatchResult;

/// 从 `delivery_persons` 表读取当前在线的配送员
///
/// 返回顺序按最近活跃时间倒序，调用方取第一个作为通知对象。
pub struct PostgresDriverAvailability {
    pool: PgPool,
}

impl PostgresDriverAvailability {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DriverAvailability for PostgresDriverAvailability {
    #[instrument(skip(self))]
    async fn available_drivers(&self) -> DispatchResult<Vec<DriverCandidate>> {
        let rows = sqlx::query(
            "SELECT id, display_name
             FROM delivery_persons
             WHERE is_available = TRUE
             ORDER BY last_seen_at DESC NULLS LAST, id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(DriverCandidate {
                    id: row.try_get("id")?,
                    display_name: row.try_get("display_name")?,
                })
            })
            .collect()
    }
}
