use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::RetryState;

/// 配送集群：同一配送单下等待配送员的一组待处理报价
///
/// 集群是否"未分配"由查询结果隐式决定，分配成功后即不再出现在未分配集合中。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryCluster {
    pub id: Uuid,
    pub delivery_id: Uuid,
    pub retry_count: u32,
    pub last_retry_time: Option<DateTime<Utc>>,
}

impl DeliveryCluster {
    pub fn new(delivery_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            delivery_id,
            retry_count: 0,
            last_retry_time: None,
        }
    }

    pub fn retry_state(&self) -> RetryState {
        RetryState {
            retry_count: self.retry_count,
            last_retry_time: self.last_retry_time,
        }
    }

    pub fn apply_retry_state(&mut self, state: RetryState) {
        self.retry_count = state.retry_count;
        self.last_retry_time = state.last_retry_time;
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DeliveryStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "ASSIGNED")]
    Assigned,
    #[serde(rename = "IN_TRANSIT")]
    InTransit,
    #[serde(rename = "DELIVERED")]
    Delivered,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "PENDING",
            DeliveryStatus::Assigned => "ASSIGNED",
            DeliveryStatus::InTransit => "IN_TRANSIT",
            DeliveryStatus::Delivered => "DELIVERED",
            DeliveryStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(DeliveryStatus::Pending),
            "ASSIGNED" => Ok(DeliveryStatus::Assigned),
            "IN_TRANSIT" => Ok(DeliveryStatus::InTransit),
            "DELIVERED" => Ok(DeliveryStatus::Delivered),
            "CANCELLED" => Ok(DeliveryStatus::Cancelled),
            _ => Err(format!("Invalid delivery status: {s}")),
        }
    }
}

impl sqlx::Type<sqlx::Postgres> for DeliveryStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("VARCHAR")
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <&str as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for DeliveryStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        s.parse::<DeliveryStatus>().map_err(Into::into)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for DeliveryStatus {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OfferStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "ACCEPTED")]
    Accepted,
    #[serde(rename = "REJECTED")]
    Rejected,
    #[serde(rename = "EXPIRED")]
    Expired,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Pending => "PENDING",
            OfferStatus::Accepted => "ACCEPTED",
            OfferStatus::Rejected => "REJECTED",
            OfferStatus::Expired => "EXPIRED",
        }
    }
}

impl std::str::FromStr for OfferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OfferStatus::Pending),
            "ACCEPTED" => Ok(OfferStatus::Accepted),
            "REJECTED" => Ok(OfferStatus::Rejected),
            "EXPIRED" => Ok(OfferStatus::Expired),
            _ => Err(format!("Invalid offer status: {s}")),
        }
    }
}

impl sqlx::Type<sqlx::Postgres> for OfferStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("VARCHAR")
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <&str as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for OfferStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        s.parse::<OfferStatus>().map_err(Into::into)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for OfferStatus {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
    }
}

/// 配送报价，由外部分配算法创建
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOffer {
    pub id: Uuid,
    pub delivery_id: Uuid,
    pub cluster_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
    pub status: OfferStatus,
    pub created_at: DateTime<Utc>,
}

/// 按商家拆分的子配送单
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubDelivery {
    pub id: Uuid,
    pub delivery_id: Uuid,
    pub company_id: Uuid,
    pub status: DeliveryStatus,
}

/// 完整的配送聚合，仅在一次分配尝试期间被加载
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: DeliveryStatus,
    pub offers: Vec<DeliveryOffer>,
    pub company_ids: Vec<Uuid>,
    pub sub_deliveries: Vec<SubDelivery>,
    pub assigned_driver_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Delivery {
    pub fn new(order_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            status: DeliveryStatus::Pending,
            offers: Vec::new(),
            company_ids: Vec::new(),
            sub_deliveries: Vec::new(),
            assigned_driver_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.assigned_driver_id.is_some()
    }

    /// 记录配送员并把该配送员的报价标记为已接受
    pub fn assign_driver(&mut self, driver_id: Uuid) {
        self.assigned_driver_id = Some(driver_id);
        self.status = DeliveryStatus::Assigned;
        for offer in self.offers.iter_mut() {
            if offer.driver_id == Some(driver_id) {
                offer.status = OfferStatus::Accepted;
            }
        }
        for sub in self.sub_deliveries.iter_mut() {
            if sub.status == DeliveryStatus::Pending {
                sub.status = DeliveryStatus::Assigned;
            }
        }
    }

    pub fn pending_offers(&self) -> impl Iterator<Item = &DeliveryOffer> {
        self.offers
            .iter()
            .filter(|offer| offer.status == OfferStatus::Pending)
    }
}

/// 可用配送员投影，仅用于选择通知对象
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverCandidate {
    pub id: Uuid,
    pub display_name: String,
}

impl DriverCandidate {
    pub fn new(id: Uuid, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }
}
