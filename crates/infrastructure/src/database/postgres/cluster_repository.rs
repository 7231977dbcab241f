use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use courier_domain::{ClusterRepository, DeliveryCluster};
use courier_errors::{DispatchError, DispatchResult};

pub struct PostgresClusterRepository {
    pool: PgPool,
}

impl PostgresClusterRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_cluster(row: &sqlx::postgres::PgRow) -> DispatchResult<DeliveryCluster> {
        let retry_count: i32 = row.try_get("retry_count")?;
        let retry_count = u32::try_from(retry_count).map_err(|_| {
            DispatchError::database_error(format!("非法的重试次数: {retry_count}"))
        })?;

        Ok(DeliveryCluster {
            id: row.try_get("id")?,
            delivery_id: row.try_get("delivery_id")?,
            retry_count,
            last_retry_time: row.try_get("last_retry_time")?,
        })
    }
}

#[async_trait]
impl ClusterRepository for PostgresClusterRepository {
    #[instrument(skip(self))]
    async fn find_unassigned(&self) -> DispatchResult<Vec<DeliveryCluster>> {
        let rows = sqlx::query(
            "SELECT id, delivery_id, retry_count, last_retry_time
             FROM delivery_clusters
             WHERE assigned_at IS NULL
             ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;

        let clusters = rows
            .iter()
            .map(Self::row_to_cluster)
            .collect::<DispatchResult<Vec<_>>>()?;
        debug!("查询到 {} 个未分配集群", clusters.len());
        Ok(clusters)
    }

    #[instrument(skip(self))]
    async fn persist_retry_state(
        &self,
        cluster_id: Uuid,
        retry_count: u32,
        last_retry_time: DateTime<Utc>,
    ) -> DispatchResult<()> {
        let retry_count = i32::try_from(retry_count).unwrap_or(i32::MAX);

        // 只允许计数和时间向前推进
        let result = sqlx::query(
            "UPDATE delivery_clusters
             SET retry_count = GREATEST(retry_count, $2),
                 last_retry_time = GREATEST(COALESCE(last_retry_time, $3), $3)
             WHERE id = $1",
        )
        .bind(cluster_id)
        .bind(retry_count)
        .bind(last_retry_time)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DispatchError::cluster_not_found(cluster_id));
        }
        Ok(())
    }
}
