//! 测试数据构建器

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use courier_domain::{
    Delivery, DeliveryCluster, DeliveryOffer, DeliveryStatus, DriverCandidate, OfferStatus,
    SubDelivery,
};

/// Builder for creating test DeliveryCluster entities
pub struct ClusterBuilder {
    cluster: DeliveryCluster,
}

impl ClusterBuilder {
    pub fn new() -> Self {
        Self {
            cluster: DeliveryCluster::new(Uuid::new_v4()),
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.cluster.id = id;
        self
    }

    pub fn for_delivery(mut self, delivery_id: Uuid) -> Self {
        self.cluster.delivery_id = delivery_id;
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.cluster.retry_count = retry_count;
        self
    }

    pub fn with_last_retry_time(mut self, last_retry_time: DateTime<Utc>) -> Self {
        self.cluster.last_retry_time = Some(last_retry_time);
        self
    }

    /// 上次尝试发生在 `seconds` 秒之前
    pub fn retried_seconds_ago(self, seconds: i64) -> Self {
        self.with_last_retry_time(Utc::now() - Duration::seconds(seconds))
    }

    pub fn build(self) -> DeliveryCluster {
        self.cluster
    }
}

impl Default for ClusterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test Delivery aggregates
pub struct DeliveryBuilder {
    delivery: Delivery,
}

impl DeliveryBuilder {
    pub fn new() -> Self {
        Self {
            delivery: Delivery::new(Uuid::new_v4()),
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.delivery.id = id;
        self
    }

    pub fn with_status(mut self, status: DeliveryStatus) -> Self {
        self.delivery.status = status;
        self
    }

    /// 添加一个待处理的报价
    pub fn with_offer_from(mut self, driver_id: Uuid) -> Self {
        self.delivery.offers.push(DeliveryOffer {
            id: Uuid::new_v4(),
            delivery_id: self.delivery.id,
            cluster_id: None,
            driver_id: Some(driver_id),
            status: OfferStatus::Pending,
            created_at: Utc::now(),
        });
        self
    }

    pub fn with_company(mut self, company_id: Uuid) -> Self {
        self.delivery.company_ids.push(company_id);
        self.delivery.sub_deliveries.push(SubDelivery {
            id: Uuid::new_v4(),
            delivery_id: self.delivery.id,
            company_id,
            status: DeliveryStatus::Pending,
        });
        self
    }

    pub fn assigned_to(mut self, driver_id: Uuid) -> Self {
        self.delivery.assign_driver(driver_id);
        self
    }

    pub fn build(self) -> Delivery {
        self.delivery
    }
}

impl Default for DeliveryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct DriverBuilder {
    driver: DriverCandidate,
}

impl DriverBuilder {
    pub fn new() -> Self {
        Self {
            driver: DriverCandidate::new(Uuid::new_v4(), "test_driver"),
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.driver.id = id;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.driver.display_name = name.to_string();
        self
    }

    pub fn build(self) -> DriverCandidate {
        self.driver
    }
}

impl Default for DriverBuilder {
    fn default() -> Self {
        Self::new()
    }
}
