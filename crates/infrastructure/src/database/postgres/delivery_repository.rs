use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use courier_domain::{
    Delivery, DeliveryAssigner, DeliveryOffer, DeliveryRepository, DeliveryStatus, SubDelivery,
};
use courier_errors::{DispatchError, DispatchResult};

/// 配送单聚合的读取与自动分配
pub struct PostgresDeliveryRepository {
    pool: PgPool,
}

impl PostgresDeliveryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_offer(row: &sqlx::postgres::PgRow) -> DispatchResult<DeliveryOffer> {
        Ok(DeliveryOffer {
            id: row.try_get("id")?,
            delivery_id: row.try_get("delivery_id")?,
            cluster_id: row.try_get("cluster_id")?,
            driver_id: row.try_get("driver_id")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_sub_delivery(row: &sqlx::postgres::PgRow) -> DispatchResult<SubDelivery> {
        Ok(SubDelivery {
            id: row.try_get("id")?,
            delivery_id: row.try_get("delivery_id")?,
            company_id: row.try_get("company_id")?,
            status: row.try_get("status")?,
        })
    }

    /// 待处理报价中的配送员优先，否则取当前在线的第一个配送员
    async fn pick_driver(
        tx: &mut Transaction<'_, Postgres>,
        delivery: &Delivery,
    ) -> DispatchResult<Uuid> {
        if let Some(driver_id) = delivery.pending_offers().find_map(|offer| offer.driver_id) {
            return Ok(driver_id);
        }

        let driver_id: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM delivery_persons
             WHERE is_available = TRUE
             ORDER BY last_seen_at DESC NULLS LAST, id
             LIMIT 1",
        )
        .fetch_optional(&mut **tx)
        .await?;

        driver_id.ok_or_else(|| {
            DispatchError::assignment(format!("配送单 {} 没有可分配的配送员", delivery.id))
        })
    }
}

#[async_trait]
impl DeliveryRepository for PostgresDeliveryRepository {
    #[instrument(skip(self))]
    async fn load_with_relations(&self, delivery_id: Uuid) -> DispatchResult<Option<Delivery>> {
        let Some(row) = sqlx::query(
            "SELECT id, order_id, status, assigned_driver_id, created_at
             FROM deliveries WHERE id = $1",
        )
        .bind(delivery_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let offers = sqlx::query(
            "SELECT id, delivery_id, cluster_id, driver_id, status, created_at
             FROM delivery_offers WHERE delivery_id = $1
             ORDER BY created_at, id",
        )
        .bind(delivery_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(Self::row_to_offer)
        .collect::<DispatchResult<Vec<_>>>()?;

        let company_ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT company_id FROM delivery_companies WHERE delivery_id = $1 ORDER BY company_id",
        )
        .bind(delivery_id)
        .fetch_all(&self.pool)
        .await?;

        let sub_deliveries = sqlx::query(
            "SELECT id, delivery_id, company_id, status
             FROM sub_deliveries WHERE delivery_id = $1 ORDER BY id",
        )
        .bind(delivery_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(Self::row_to_sub_delivery)
        .collect::<DispatchResult<Vec<_>>>()?;

        debug!(
            "加载配送单 {}: {} 个报价，{} 个子配送单",
            delivery_id,
            offers.len(),
            sub_deliveries.len()
        );

        Ok(Some(Delivery {
            id: row.try_get("id")?,
            order_id: row.try_get("order_id")?,
            status: row.try_get("status")?,
            offers,
            company_ids,
            sub_deliveries,
            assigned_driver_id: row.try_get("assigned_driver_id")?,
            created_at: row.try_get("created_at")?,
        }))
    }
}

#[async_trait]
impl DeliveryAssigner for PostgresDeliveryRepository {
    #[instrument(skip(self, delivery), fields(delivery_id = %delivery.id))]
    async fn auto_assign(&self, delivery: &mut Delivery, cluster_id: Uuid) -> DispatchResult<()> {
        let mut tx = self.pool.begin().await?;

        let current: Option<Option<Uuid>> = sqlx::query_scalar(
            "SELECT assigned_driver_id FROM deliveries WHERE id = $1 FOR UPDATE",
        )
        .bind(delivery.id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(current) = current else {
            return Err(DispatchError::delivery_not_found(delivery.id));
        };

        // 其他进程已完成分配时只补记集群状态
        if let Some(driver_id) = current {
            delivery.assign_driver(driver_id);
        } else {
            let driver_id = Self::pick_driver(&mut tx, delivery).await?;
            delivery.assign_driver(driver_id);

            sqlx::query(
                "UPDATE deliveries
                 SET status = $2, assigned_driver_id = $3, updated_at = NOW()
                 WHERE id = $1",
            )
            .bind(delivery.id)
            .bind(DeliveryStatus::Assigned)
            .bind(driver_id)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "UPDATE delivery_offers SET status = 'ACCEPTED'
                 WHERE delivery_id = $1 AND driver_id = $2",
            )
            .bind(delivery.id)
            .bind(driver_id)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "UPDATE sub_deliveries SET status = 'ASSIGNED'
                 WHERE delivery_id = $1 AND status = 'PENDING'",
            )
            .bind(delivery.id)
            .execute(&mut *tx)
            .await?;
        }

        let result = sqlx::query(
            "UPDATE delivery_clusters SET assigned_at = NOW()
             WHERE id = $1 AND assigned_at IS NULL",
        )
        .bind(cluster_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            "集群 {} 已分配 (更新 {} 行)，配送员: {:?}",
            cluster_id,
            result.rows_affected(),
            delivery.assigned_driver_id
        );
        Ok(())
    }
}
