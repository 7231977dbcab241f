mod cluster_repository;
mod delivery_repository;
mod driver_availability;
mod notification_sender;

pub use cluster_repository::PostgresClusterRepository;
pub use delivery_repository::PostgresDeliveryRepository;
pub use driver_availability::PostgresDriverAvailability;
pub use notification_sender::PostgresNotificationSender;
