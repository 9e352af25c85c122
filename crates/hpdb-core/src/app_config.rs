use std::net::SocketAddr;
use std::path::PathBuf;

use crate::comparison::{AggregateMethod, ComparisonPolicy};
use crate::validation::ValidationOptions;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub rules_path: PathBuf,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    /// Provider names in the order used for deviation and comment selection.
    pub provider_priority: Vec<String>,
    pub benchmark_aggregate: AggregateMethod,
    /// Used when an OM address carries no "city, state" suffix.
    pub default_geography: String,
    pub default_asset_type: String,
    pub ingest_concurrency: usize,
    pub strict_units: bool,
}

impl AppConfig {
    #[must_use]
    pub fn comparison_policy(&self) -> ComparisonPolicy {
        ComparisonPolicy {
            provider_priority: self.provider_priority.clone(),
            aggregate: self.benchmark_aggregate,
        }
    }

    #[must_use]
    pub fn validation_options(&self) -> ValidationOptions {
        ValidationOptions {
            strict_units: self.strict_units,
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("rules_path", &self.rules_path)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("provider_priority", &self.provider_priority)
            .field("benchmark_aggregate", &self.benchmark_aggregate)
            .field("default_geography", &self.default_geography)
            .field("default_asset_type", &self.default_asset_type)
            .field("ingest_concurrency", &self.ingest_concurrency)
            .field("strict_units", &self.strict_units)
            .finish()
    }
}
