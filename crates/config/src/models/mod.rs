pub mod app_config;
pub mod database;
pub mod observability;
pub mod reassignment;

// Re-export main types for easier imports
pub use app_config::AppConfig;
pub use database::{DatabaseConfig, StorageBackend, StorageConfig};
pub use observability::ObservabilityConfig;
pub use reassignment::ReassignmentConfig;
