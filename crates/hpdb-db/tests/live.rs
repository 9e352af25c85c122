//! Live integration tests for hpdb-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/hpdb-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory.

use std::str::FromStr;

use hpdb_core::{
    AggregateMethod, Comment, ComparisonPolicy, FlagKind, MarketBenchmark, NewMetric, Rule,
    Severity, ValidationOptions,
};
use hpdb_db::{
    compare_deal, delete_metric, get_rule, health_check, insert_benchmark, list_deal_flags,
    list_deal_metrics, list_market_benchmarks, list_metric_flags, list_rules, load_benchmarks,
    load_rule_book, record_and_validate, seed_rules, update_rule, BenchmarkFilter, DbError,
};
use rust_decimal::Decimal;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const TAMPA: &str = "Tampa, FL";
const MULTIFAMILY: &str = "Multifamily";

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap_or_else(|e| panic!("bad decimal literal '{s}': {e}"))
}

fn demo_rules() -> Vec<Rule> {
    vec![
        Rule {
            unit: Some("$/sf".to_string()),
            min_value: Some(dec("25")),
            max_value: Some(dec("2500")),
            must_be_nonzero: true,
            ..Rule::new("price_per_sf_usd")
        },
        Rule {
            unit: Some("%".to_string()),
            min_value: Some(dec("2")),
            max_value: Some(dec("15")),
            is_percentage: true,
            ..Rule::new("cap_rate_pct")
        },
    ]
}

fn metric(deal_id: &str, name: &str, value: Option<&str>, unit: &str) -> NewMetric {
    NewMetric::new(deal_id, TAMPA, MULTIFAMILY, name)
        .with_value(value.map(dec))
        .with_unit(unit)
}

fn benchmark(provider: &str, name: &str, value: &str, filtered: bool) -> MarketBenchmark {
    MarketBenchmark {
        provider: provider.to_string(),
        geography: TAMPA.to_string(),
        asset_type: MULTIFAMILY.to_string(),
        metric_name: name.to_string(),
        unit_type: None,
        value: dec(value),
        unit: None,
        filtered,
        observed_on: None,
        source_uri: None,
    }
}

// ---------------------------------------------------------------------------
// Section 1: Rule store
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn health_check_succeeds_on_fresh_database(pool: sqlx::PgPool) {
    health_check(&pool).await.expect("health_check failed");
}

#[sqlx::test(migrations = "../../migrations")]
async fn seeding_twice_keeps_edited_bounds(pool: sqlx::PgPool) {
    let inserted = seed_rules(&pool, &demo_rules()).await.expect("first seed");
    assert_eq!(inserted, 2);

    let edited = Rule {
        min_value: Some(dec("50")),
        ..demo_rules().remove(0)
    };
    let row = update_rule(&pool, &edited).await.expect("update_rule");
    assert_eq!(row.min_value, Some(dec("50")));
    assert!(row.updated_at >= row.created_at);

    let inserted_again = seed_rules(&pool, &demo_rules()).await.expect("second seed");
    assert_eq!(inserted_again, 0);

    let stored = get_rule(&pool, "price_per_sf_usd")
        .await
        .expect("get_rule")
        .expect("rule exists");
    assert_eq!(stored.min_value, Some(dec("50")));
    assert_eq!(stored.max_value, Some(dec("2500")));

    assert_eq!(list_rules(&pool).await.expect("list_rules").len(), 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn update_rule_for_unknown_metric_is_not_found(pool: sqlx::PgPool) {
    let result = update_rule(&pool, &Rule::new("does_not_exist")).await;
    assert!(matches!(result, Err(DbError::NotFound)));
}

#[sqlx::test(migrations = "../../migrations")]
async fn load_rule_book_reflects_stored_rules(pool: sqlx::PgPool) {
    seed_rules(&pool, &demo_rules()).await.expect("seed");
    let book = load_rule_book(&pool).await.expect("load_rule_book");
    assert_eq!(book.len(), 2);
}

// ---------------------------------------------------------------------------
// Section 2: Record and validate
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn missing_value_is_stored_with_single_missing_flag(pool: sqlx::PgPool) {
    seed_rules(&pool, &demo_rules()).await.expect("seed");

    let recorded = record_and_validate(
        &pool,
        &metric("deal-1", "cap_rate_pct", None, "%"),
        ValidationOptions::default(),
    )
    .await
    .expect("record_and_validate");

    assert_eq!(recorded.findings.len(), 1);
    assert_eq!(recorded.findings[0].kind, FlagKind::Missing);

    let flags = list_metric_flags(&pool, recorded.metric_id)
        .await
        .expect("list_metric_flags");
    assert_eq!(flags.len(), 1);
    assert_eq!(flags[0].kind().expect("kind"), FlagKind::Missing);
    assert_eq!(flags[0].severity().expect("severity"), Severity::Warn);

    let metrics = list_deal_metrics(&pool, "deal-1").await.expect("list");
    assert_eq!(metrics.len(), 1);
    assert!(metrics[0].value.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn violations_do_not_block_the_insert(pool: sqlx::PgPool) {
    seed_rules(&pool, &demo_rules()).await.expect("seed");

    let recorded = record_and_validate(
        &pool,
        &metric("deal-1", "price_per_sf_usd", Some("0"), "$/sf"),
        ValidationOptions::default(),
    )
    .await
    .expect("record_and_validate");

    let kinds: Vec<FlagKind> = recorded.findings.iter().map(|f| f.kind).collect();
    assert_eq!(kinds, vec![FlagKind::Incoherent, FlagKind::RangeViolation]);

    let stored = list_metric_flags(&pool, recorded.metric_id)
        .await
        .expect("list_metric_flags");
    assert_eq!(stored.len(), 2);
    assert!(stored[1].message.contains("minimum 25"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn empty_unit_type_is_stored_as_null(pool: sqlx::PgPool) {
    let recorded = record_and_validate(
        &pool,
        &NewMetric {
            unit_type: Some(String::new()),
            ..metric("deal-1", "noi_usd", Some("1890000"), "USD")
        },
        ValidationOptions::default(),
    )
    .await
    .expect("record_and_validate");

    let rows = list_deal_metrics(&pool, "deal-1").await.expect("list");
    assert_eq!(rows[0].id, recorded.metric_id);
    assert!(rows[0].unit_type.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn concurrent_records_keep_their_own_flags(pool: sqlx::PgPool) {
    seed_rules(&pool, &demo_rules()).await.expect("seed");
    let options = ValidationOptions::default();

    let low = metric("deal-1", "price_per_sf_usd", Some("0"), "$/sf");
    let high = metric("deal-1", "cap_rate_pct", Some("140"), "%");
    let (low, high) = tokio::join!(
        record_and_validate(&pool, &low, options),
        record_and_validate(&pool, &high, options),
    );
    let low = low.expect("low metric");
    let high = high.expect("high metric");

    assert_eq!(
        list_metric_flags(&pool, low.metric_id).await.expect("low flags").len(),
        2
    );
    assert_eq!(
        list_metric_flags(&pool, high.metric_id).await.expect("high flags").len(),
        2
    );
    assert_eq!(list_deal_flags(&pool, "deal-1").await.expect("deal flags").len(), 4);
}

#[sqlx::test(migrations = "../../migrations")]
async fn deleting_a_metric_cascades_to_flags(pool: sqlx::PgPool) {
    let recorded = record_and_validate(
        &pool,
        &metric("deal-1", "noi_usd", None, "USD"),
        ValidationOptions::default(),
    )
    .await
    .expect("record_and_validate");

    assert!(delete_metric(&pool, recorded.metric_id).await.expect("delete"));
    assert!(!delete_metric(&pool, recorded.metric_id).await.expect("second delete"));

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM metric_flags")
        .fetch_one(&pool)
        .await
        .expect("count flags");
    assert_eq!(remaining, 0);
}

// ---------------------------------------------------------------------------
// Section 3: Benchmarks and comparison
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn market_listing_honours_filters(pool: sqlx::PgPool) {
    let loaded = load_benchmarks(
        &pool,
        &[
            benchmark("CREXi", "price_per_sf_usd", "314", true),
            benchmark("CREXi", "price_per_sf_usd", "900", false),
        ],
    )
    .await
    .expect("load_benchmarks");
    assert_eq!(loaded, 2);

    let mut office = benchmark("Realtor.com", "price_per_sf_usd", "410", true);
    office.asset_type = "Office".to_string();
    insert_benchmark(&pool, &office).await.expect("insert_benchmark");

    let all = list_market_benchmarks(&pool, TAMPA, BenchmarkFilter::default())
        .await
        .expect("list all");
    assert_eq!(all.len(), 3);

    let filtered_multifamily = list_market_benchmarks(
        &pool,
        TAMPA,
        BenchmarkFilter {
            asset_type: Some(MULTIFAMILY),
            filtered_only: true,
        },
    )
    .await
    .expect("list filtered");
    assert_eq!(filtered_multifamily.len(), 1);
    assert_eq!(filtered_multifamily[0].value, dec("314"));

    let elsewhere = list_market_benchmarks(&pool, "Austin, TX", BenchmarkFilter::default())
        .await
        .expect("list other geography");
    assert!(elsewhere.is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn price_above_crexi_reports_positive_deviation(pool: sqlx::PgPool) {
    load_benchmarks(
        &pool,
        &[
            benchmark("CREXi", "price_per_sf_usd", "314", true),
            benchmark("CREXi", "cap_rate_pct", "5.4", true),
            benchmark("CREXi", "price_per_sf_usd", "1000", false),
        ],
    )
    .await
    .expect("load_benchmarks");

    for m in [
        metric("deal-1", "price_per_sf_usd", Some("315"), "$/sf"),
        metric("deal-1", "cap_rate_pct", Some("5.4"), "%"),
        metric("deal-1", "noi_usd", Some("1890000"), "USD"),
    ] {
        record_and_validate(&pool, &m, ValidationOptions::default())
            .await
            .expect("record_and_validate");
    }

    let rows = compare_deal(&pool, "deal-1", &ComparisonPolicy::default())
        .await
        .expect("compare_deal");
    assert_eq!(rows.len(), 3);

    let price = rows
        .iter()
        .find(|r| r.metric_name == "price_per_sf_usd")
        .expect("price row");
    assert_eq!(price.deviation.map(|d| d.to_string()).as_deref(), Some("1.00"));
    assert_eq!(price.comment, Comment::Above("CREXi".to_string()));

    let cap = rows
        .iter()
        .find(|r| r.metric_name == "cap_rate_pct")
        .expect("cap row");
    assert_eq!(cap.deviation.map(|d| d.to_string()).as_deref(), Some("0.00"));
    assert_eq!(cap.comment, Comment::MatchesMarket);

    let noi = rows
        .iter()
        .find(|r| r.metric_name == "noi_usd")
        .expect("noi row");
    assert_eq!(noi.deviation, None);
    assert_eq!(noi.comment, Comment::NoMarketMatch);
}

#[sqlx::test(migrations = "../../migrations")]
async fn compare_uses_latest_submission_and_aggregate(pool: sqlx::PgPool) {
    load_benchmarks(
        &pool,
        &[
            benchmark("Realtor.com", "price_per_sf_usd", "300", true),
            benchmark("Realtor.com", "price_per_sf_usd", "320", true),
        ],
    )
    .await
    .expect("load_benchmarks");

    for value in ["200", "305"] {
        record_and_validate(
            &pool,
            &metric("deal-1", "price_per_sf_usd", Some(value), "$/sf"),
            ValidationOptions::default(),
        )
        .await
        .expect("record_and_validate");
    }

    let mean = compare_deal(&pool, "deal-1", &ComparisonPolicy::default())
        .await
        .expect("compare mean");
    assert_eq!(mean.len(), 1);
    assert_eq!(mean[0].value, Some(dec("305")));
    assert_eq!(mean[0].deviation, Some(dec("-5")));
    assert_eq!(mean[0].comment, Comment::Below("Realtor.com".to_string()));

    let max = compare_deal(
        &pool,
        "deal-1",
        &ComparisonPolicy {
            aggregate: AggregateMethod::Max,
            ..ComparisonPolicy::default()
        },
    )
    .await
    .expect("compare max");
    assert_eq!(max[0].deviation, Some(dec("-15")));
}

#[sqlx::test(migrations = "../../migrations")]
async fn unknown_deal_compares_to_empty_report(pool: sqlx::PgPool) {
    let rows = compare_deal(&pool, "nope", &ComparisonPolicy::default())
        .await
        .expect("compare_deal");
    assert!(rows.is_empty());
}
