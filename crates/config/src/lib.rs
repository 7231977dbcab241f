pub mod models;

pub use models::{
    AppConfig, DatabaseConfig, ObservabilityConfig, ReassignmentConfig, StorageBackend,
    StorageConfig,
};
