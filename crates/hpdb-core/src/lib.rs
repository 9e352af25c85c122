pub mod app_config;
pub mod comparison;
pub mod config;
pub mod metrics;
pub mod om;
pub mod rules;
pub mod validation;

pub use app_config::{AppConfig, Environment};
pub use comparison::{
    aggregate_benchmarks, compare, AggregateMethod, BenchmarkBucket, BenchmarkKey, Comment,
    ComparisonPolicy, ComparisonRow, MarketBenchmark, ProviderBenchmark,
};
pub use config::{load_app_config, load_app_config_from_env};
pub use metrics::{FlagKind, MetricValue, NewMetric, Severity, SubmittedMetric};
pub use om::{
    csv_template, expand_sheets, read_om_sheets, CsvTemplate, OmContext, OmError, OmSheet,
};
pub use rules::{load_rules, Rule, RuleBook, RuleStore, RulesFile};
pub use validation::{validate, validate_with, Finding, ValidationOptions};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid flag kind: {0}")]
    InvalidFlagKind(String),
    #[error("invalid severity: {0}")]
    InvalidSeverity(String),
    #[error("invalid aggregate method: {0}")]
    InvalidAggregateMethod(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
    #[error("failed to read rules file {path}: {source}")]
    RulesFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse rules file: {0}")]
    RulesFileParse(#[source] serde_yaml::Error),
    #[error("rules validation failed: {0}")]
    Validation(String),
}
