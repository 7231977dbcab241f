use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    database::{DatabaseConfig, StorageBackend, StorageConfig},
    observability::ObservabilityConfig,
    reassignment::ReassignmentConfig,
};

/// Default config file search paths, tried in order
pub const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/courier-dispatch.toml",
    "courier-dispatch.toml",
    "/etc/courier-dispatch/config.toml",
];

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub reassignment: ReassignmentConfig,
    pub observability: ObservabilityConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgresql://localhost/courier".to_string(),
                max_connections: 10,
                min_connections: 1,
                connection_timeout_seconds: 30,
                idle_timeout_seconds: 600,
                run_migrations: true,
            },
            storage: StorageConfig {
                backend: StorageBackend::Postgres,
            },
            reassignment: ReassignmentConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Built-in defaults
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: COURIER_, nesting separator: __)
    ///
    /// # Arguments
    ///
    /// * `config_path` - Config file path, if None the default paths are searched
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults = Self::default();
        let mut builder = ConfigBuilder::builder()
            .set_default("database.url", defaults.database.url.as_str())?
            .set_default("database.max_connections", defaults.database.max_connections)?
            .set_default("database.min_connections", defaults.database.min_connections)?
            .set_default(
                "database.connection_timeout_seconds",
                defaults.database.connection_timeout_seconds,
            )?
            .set_default(
                "database.idle_timeout_seconds",
                defaults.database.idle_timeout_seconds,
            )?
            .set_default("database.run_migrations", defaults.database.run_migrations)?
            .set_default("storage.backend", "postgres")?
            .set_default("reassignment.enabled", defaults.reassignment.enabled)?
            .set_default(
                "reassignment.check_interval_seconds",
                defaults.reassignment.check_interval_seconds,
            )?
            .set_default("reassignment.max_retries", defaults.reassignment.max_retries)?
            .set_default(
                "reassignment.retry_delay_seconds",
                defaults.reassignment.retry_delay_seconds,
            )?
            .set_default(
                "reassignment.admin_role",
                defaults.reassignment.admin_role.as_str(),
            )?
            .set_default(
                "observability.log_level",
                defaults.observability.log_level.as_str(),
            )?
            .set_default(
                "observability.log_format",
                defaults.observability.log_format.as_str(),
            )?
            .set_default(
                "observability.metrics_enabled",
                defaults.observability.metrics_enabled,
            )?
            .set_default(
                "observability.metrics_bind_address",
                defaults.observability.metrics_bind_address.as_str(),
            )?;

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else if let Some(path) = DEFAULT_CONFIG_PATHS
            .iter()
            .find(|path| Path::new(path).exists())
        {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        // Environment variable overrides - highest priority
        builder = builder.add_source(
            Environment::with_prefix("COURIER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    /// Validate configuration effectiveness
    pub fn validate(&self) -> Result<()> {
        if self.storage.backend == StorageBackend::Postgres {
            self.database.validate().context("数据库配置验证失败")?;
        }

        self.reassignment
            .validate()
            .context("重新分配配置验证失败")?;

        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        Ok(())
    }
}
