use crate::app_config::{AppConfig, Environment};
use crate::comparison::AggregateMethod;
use crate::ConfigError;

/// Read `.env` if present, then build [`AppConfig`] from `HPDB_*` variables.
///
/// # Errors
///
/// Fails when `DATABASE_URL` is unset or any `HPDB_*` value does not parse.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Same as [`load_app_config`] without touching `.env`.
///
/// # Errors
///
/// Fails when `DATABASE_URL` is unset or any `HPDB_*` value does not parse.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_bool = |var: &str, default: &str| -> Result<bool, ConfigError> {
        match or_default(var, default).trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(invalid(var, format!("expected a boolean, got '{other}'"))),
        }
    };

    let database_url = require("DATABASE_URL")?;

    let env = parse_environment(&or_default("HPDB_ENV", "development"));
    let bind_addr = parse_addr("HPDB_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("HPDB_LOG_LEVEL", "info");
    let rules_path = PathBuf::from(or_default("HPDB_RULES_PATH", "./config/rules.yaml"));

    let db_max_connections = parse_u32("HPDB_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("HPDB_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("HPDB_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let provider_priority = parse_provider_priority(&or_default(
        "HPDB_PROVIDER_PRIORITY",
        "CREXi,Realtor.com",
    ));
    if provider_priority.is_empty() {
        return Err(invalid(
            "HPDB_PROVIDER_PRIORITY",
            "at least one provider is required".to_string(),
        ));
    }

    let benchmark_aggregate = or_default("HPDB_BENCHMARK_AGGREGATE", "mean")
        .parse::<AggregateMethod>()
        .map_err(|e| invalid("HPDB_BENCHMARK_AGGREGATE", e.to_string()))?;

    let default_geography = or_default("HPDB_DEFAULT_GEOGRAPHY", "Tampa, FL");
    let default_asset_type = or_default("HPDB_DEFAULT_ASSET_TYPE", "Multifamily");

    let ingest_concurrency = or_default("HPDB_INGEST_CONCURRENCY", "4")
        .parse::<usize>()
        .map_err(|e| invalid("HPDB_INGEST_CONCURRENCY", e.to_string()))?;
    if ingest_concurrency == 0 {
        return Err(invalid(
            "HPDB_INGEST_CONCURRENCY",
            "must be at least 1".to_string(),
        ));
    }

    let strict_units = parse_bool("HPDB_STRICT_UNITS", "false")?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        rules_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        provider_priority,
        benchmark_aggregate,
        default_geography,
        default_asset_type,
        ingest_concurrency,
        strict_units,
    })
}

/// Anything unrecognized is development.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

fn parse_provider_priority(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
