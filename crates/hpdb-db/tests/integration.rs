//! Offline unit tests for hpdb-db pool configuration and row conversions.
//! These tests do not require a live database connection.

use chrono::{NaiveDate, Utc};
use hpdb_core::{AggregateMethod, AppConfig, Environment, MarketBenchmark, Rule, SubmittedMetric};
use hpdb_db::{BenchmarkRow, FlagRow, MetricRow, PoolConfig, RuleRow};
use rust_decimal::Decimal;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let app_config = AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
        log_level: "info".to_string(),
        rules_path: PathBuf::from("./config/rules.yaml"),
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        provider_priority: vec!["CREXi".to_string()],
        benchmark_aggregate: AggregateMethod::Mean,
        default_geography: "Tampa, FL".to_string(),
        default_asset_type: "Multifamily".to_string(),
        ingest_concurrency: 4,
        strict_units: false,
    };

    let pool_config = PoolConfig::from_app_config(&app_config);
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

#[test]
fn rule_row_converts_to_core_rule() {
    let row = RuleRow {
        id: 1,
        metric_name: "cap_rate_pct".to_string(),
        unit: Some("%".to_string()),
        min_value: Some(Decimal::new(25, 1)),
        max_value: Some(Decimal::from(15)),
        must_be_nonzero: true,
        is_percentage: true,
        notes: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    let rule = Rule::from(row);
    assert_eq!(rule.metric_name, "cap_rate_pct");
    assert_eq!(rule.min_value, Some(Decimal::new(25, 1)));
    assert!(rule.is_percentage);
    assert!(rule.must_be_nonzero);
}

#[test]
fn metric_row_converts_to_submitted_metric() {
    let row = MetricRow {
        id: 9,
        deal_id: "OM_1_Main_St_Tampa_FL".to_string(),
        geography: "Tampa, FL".to_string(),
        asset_type: "Multifamily".to_string(),
        metric_name: "avg_rent_usd_month".to_string(),
        unit_type: Some("2BR".to_string()),
        value: Some(Decimal::from(2100)),
        unit: Some("USD/month".to_string()),
        period: None,
        source_uri: None,
        created_at: Utc::now(),
    };

    let metric = SubmittedMetric::from(row);
    assert_eq!(metric.id, 9);
    assert_eq!(metric.unit_type(), Some("2BR"));
    assert_eq!(metric.value, Some(Decimal::from(2100)));
}

#[test]
fn benchmark_row_converts_to_market_benchmark() {
    let row = BenchmarkRow {
        id: 3,
        provider: "CREXi".to_string(),
        geography: "Tampa, FL".to_string(),
        asset_type: "Multifamily".to_string(),
        metric_name: "price_per_sf_usd".to_string(),
        unit_type: None,
        value: Decimal::from(314),
        unit: Some("$/sf".to_string()),
        filtered: true,
        observed_on: NaiveDate::from_ymd_opt(2026, 9, 1),
        source_uri: None,
        created_at: Utc::now(),
    };

    let benchmark = MarketBenchmark::from(row);
    assert!(benchmark.filtered);
    assert_eq!(benchmark.value, Decimal::from(314));
    assert_eq!(benchmark.unit_type(), None);
}

#[test]
fn flag_row_parses_stored_text() {
    let mut row = FlagRow {
        id: 1,
        metric_id: 2,
        flag_type: "range_violation".to_string(),
        severity: "warn".to_string(),
        message: "price_per_sf_usd = 10 is below minimum 25".to_string(),
        created_at: Utc::now(),
    };
    assert_eq!(row.kind().unwrap(), hpdb_core::FlagKind::RangeViolation);
    assert_eq!(row.severity().unwrap(), hpdb_core::Severity::Warn);

    row.severity = "critical".to_string();
    assert!(matches!(
        row.severity(),
        Err(hpdb_db::DbError::InvalidStoredValue(_))
    ));
}
